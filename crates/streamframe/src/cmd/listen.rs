use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use streamframe_conn::{Connection, ConnectionListener};
use tracing::{debug, info};

use crate::cmd::{accepts_command, install_ctrlc_handler, Context, ListenArgs, Stop};
use crate::exit::{conn_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_frame, Origin};

pub fn run(args: ListenArgs, ctx: &Context) -> CliResult<i32> {
    let listener = ConnectionListener::bind(args.addr.as_str())
        .map_err(|err| conn_error("bind failed", err))?
        .with_config(ctx.connection_config());
    info!(addr = %listener.local_addr(), "waiting for connections");

    let (stop_tx, stop_rx) = mpsc::channel();
    install_ctrlc_handler(stop_tx.clone())?;

    let open = Arc::new(Mutex::new(Vec::new()));
    let printer = Printer {
        commands: args.commands.map(Arc::from),
        count: args.count,
        printed: Arc::new(AtomicUsize::new(0)),
        stop: stop_tx.clone(),
        ctx: *ctx,
    };

    let accepted = Arc::clone(&open);
    thread::Builder::new()
        .name("streamframe-accept".to_string())
        .spawn(move || accept_loop(listener, printer, accepted, stop_tx))
        .map_err(|err| CliError::new(INTERNAL, format!("accept thread failed: {err}")))?;

    let outcome = stop_rx.recv().unwrap_or(Stop::Done);
    for connection in open.lock().unwrap_or_else(PoisonError::into_inner).iter() {
        connection.close();
    }

    match outcome {
        Stop::Done => Ok(SUCCESS),
        Stop::Failed(err) => Err(err),
    }
}

#[derive(Clone)]
struct Printer {
    commands: Option<Arc<[i32]>>,
    count: Option<usize>,
    printed: Arc<AtomicUsize>,
    stop: Sender<Stop>,
    ctx: Context,
}

impl Printer {
    fn attach(&self, connection: &Connection) {
        let printer = self.clone();
        let peer = connection.peer_addr().to_string();
        let id = connection.id();
        connection.on_message(move |frame| {
            if !accepts_command(printer.commands.as_deref(), frame.command) {
                return;
            }
            let seen = printer.printed.fetch_add(1, Ordering::SeqCst) + 1;
            if printer.count.is_some_and(|count| seen > count) {
                return;
            }

            let origin = Origin {
                peer: &peer,
                connection: id,
            };
            print_frame(&frame, origin, printer.ctx.format);

            if printer.count == Some(seen) {
                let _ = printer.stop.send(Stop::Done);
            }
        });

        let peer = connection.peer_addr().to_string();
        connection.on_disconnected(move || debug!(%peer, "peer disconnected"));
    }
}

fn accept_loop(
    listener: ConnectionListener,
    printer: Printer,
    open: Arc<Mutex<Vec<Connection>>>,
    stop: Sender<Stop>,
) {
    for accepted in listener {
        let connection = match accepted {
            Ok(connection) => connection,
            Err(err) => {
                let _ = stop.send(Stop::Failed(conn_error("accept failed", err)));
                return;
            }
        };

        printer.attach(&connection);
        if let Err(err) = connection.start() {
            let _ = stop.send(Stop::Failed(conn_error("receive failed", err)));
            return;
        }

        let mut open = open.lock().unwrap_or_else(PoisonError::into_inner);
        open.retain(|c| !c.is_closed());
        open.push(connection);
    }
}
