use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use streamframe_conn::{Connection, ConnectionListener};
use tracing::{info, warn};

use crate::cmd::{accepts_command, install_ctrlc_handler, Context, EchoArgs, Stop};
use crate::exit::{conn_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: EchoArgs, ctx: &Context) -> CliResult<i32> {
    let listener = ConnectionListener::bind(args.addr.as_str())
        .map_err(|err| conn_error("bind failed", err))?
        .with_config(ctx.connection_config());
    info!(addr = %listener.local_addr(), "echo server ready");

    let (stop_tx, stop_rx) = mpsc::channel();
    install_ctrlc_handler(stop_tx.clone())?;

    let open = Arc::new(Mutex::new(Vec::new()));
    let accepted = Arc::clone(&open);
    let filter: Option<Arc<[i32]>> = args.commands.map(Arc::from);
    thread::Builder::new()
        .name("streamframe-accept".to_string())
        .spawn(move || accept_loop(listener, filter, accepted, stop_tx))
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

fn accept_loop(
    listener: ConnectionListener,
    filter: Option<Arc<[i32]>>,
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

        attach_echo(&connection, filter.clone());
        if let Err(err) = connection.start() {
            let _ = stop.send(Stop::Failed(conn_error("receive failed", err)));
            return;
        }

        let mut open = open.lock().unwrap_or_else(PoisonError::into_inner);
        open.retain(|c| !c.is_closed());
        open.push(connection);
    }
}

/// Reply to every accepted frame on the connection it arrived on.
fn attach_echo(connection: &Connection, filter: Option<Arc<[i32]>>) {
    let replier = connection.clone();
    connection.on_message(move |frame| {
        if !accepts_command(filter.as_deref(), frame.command) {
            return;
        }
        tracing::debug!(
            id = replier.id(),
            command = frame.command,
            size = frame.payload.len(),
            "echoing frame"
        );
        if let Err(err) = replier.send_frame(frame.command, &frame.payload) {
            warn!(id = replier.id(), error = %err, "echo rejected");
        }
    });

    let id = connection.id();
    let peer = connection.peer_addr().to_string();
    connection.on_disconnected(move || info!(id, %peer, "peer disconnected"));
}
