use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Text
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    session: &'a str,
    size: usize,
    payload: String,
    payload_hex: String,
    timestamp: String,
}

/// Print one stamped frame to stdout in the selected format.
pub fn print_frame(session: &str, frame: &Bytes, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                session,
                size: frame.len(),
                payload: payload_preview(frame),
                payload_hex: hex::encode(frame),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Text => {
            println!(
                "[{}] {} {}B {}",
                now_unix_seconds(),
                session,
                frame.len(),
                payload_preview(frame)
            );
        }
        OutputFormat::Raw => {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(frame);
            let _ = stdout.write_all(b"\n");
            let _ = stdout.flush();
        }
    }
}

const PREVIEW_MAX: usize = 256;

fn payload_preview(payload: &[u8]) -> String {
    let shown = &payload[..payload.len().min(PREVIEW_MAX)];
    let mut preview = String::with_capacity(shown.len());
    for &byte in shown {
        match byte {
            0x20..=0x7e => preview.push(byte as char),
            _ => preview.push('.'),
        }
    }
    if payload.len() > PREVIEW_MAX {
        preview.push_str("...");
    }
    preview
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
