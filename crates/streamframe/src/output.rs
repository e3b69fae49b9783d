use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use streamframe_frame::Frame;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    command: i32,
    payload_size: usize,
    payload: String,
    peer: &'a str,
    connection: u64,
    timestamp: String,
}

/// Where a frame came from.
#[derive(Clone, Copy, Debug)]
pub struct Origin<'a> {
    pub peer: &'a str,
    pub connection: u64,
}

pub fn print_frame(frame: &Frame, origin: Origin<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", frame_json(frame, origin)),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    frame.command.to_string(),
                    frame.payload.len().to_string(),
                    origin.peer.to_string(),
                    payload_preview(frame.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} size={} peer={} payload={}",
                frame.command,
                frame.payload.len(),
                origin.peer,
                payload_preview(frame.payload.as_ref())
            );
        }
        OutputFormat::Raw => print_raw(frame.payload.as_ref()),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn frame_json(frame: &Frame, origin: Origin<'_>) -> String {
    let out = FrameOutput {
        command: frame.command,
        payload_size: frame.payload.len(),
        payload: payload_preview(frame.payload.as_ref()),
        peer: origin.peer,
        connection: origin.connection,
        timestamp: now_unix_seconds(),
    };
    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
