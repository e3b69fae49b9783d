use std::fs;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use streamframe_conn::connect_with_config;
use streamframe_frame::Frame;
use tracing::debug;

use crate::cmd::{parse_duration, Context, SendArgs};
use crate::exit::{conn_error, frame_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_frame, Origin};

enum Reply {
    Frame(Frame),
    Disconnected,
}

pub fn run(args: SendArgs, ctx: &Context) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let connection = connect_with_config(args.addr.as_str(), ctx.connection_config())
        .map_err(|err| conn_error("connect failed", err))?;

    let (reply_tx, reply_rx) = mpsc::channel();
    if args.wait {
        let frames = reply_tx.clone();
        connection.on_message(move |frame| {
            let _ = frames.send(Reply::Frame(frame));
        });
    }
    connection.on_disconnected(move || {
        let _ = reply_tx.send(Reply::Disconnected);
    });
    connection
        .start()
        .map_err(|err| conn_error("connect failed", err))?;

    connection
        .send_frame(args.command, &payload)
        .map_err(|err| frame_error("send failed", err))?;
    if let Some(reason) = connection.disconnect_reason() {
        return Err(CliError::new(FAILURE, format!("send failed: {reason}")));
    }
    debug!(command = args.command, size = payload.len(), "frame sent");

    let result = if args.wait {
        wait_for_reply(&reply_rx, wait_timeout).map(|frame| {
            let origin = Origin {
                peer: connection.peer_addr(),
                connection: connection.id(),
            };
            print_frame(&frame, origin, ctx.format);
        })
    } else {
        Ok(())
    };

    connection.close();
    connection.join();
    result.map(|()| SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

fn wait_for_reply(replies: &Receiver<Reply>, timeout: Duration) -> CliResult<Frame> {
    match replies.recv_timeout(timeout) {
        Ok(Reply::Frame(frame)) => Ok(frame),
        Ok(Reply::Disconnected) | Err(RecvTimeoutError::Disconnected) => Err(CliError::new(
            FAILURE,
            "receive failed: peer disconnected before replying",
        )),
        Err(RecvTimeoutError::Timeout) => Err(CliError::new(
            TIMEOUT,
            format!("receive failed: no reply within {timeout:?}"),
        )),
    }
}
