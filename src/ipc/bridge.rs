//! IPC bridge: stdin reader and stdout event emitter.
//!
//! A blocking stdin reader thread sends deserialized commands through an mpsc
//! channel, plus a helper to emit JSON-line events to stdout.

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{DaemonCommand, DaemonEvent};

/// Emit a `DaemonEvent` as a JSON line on stdout and flush.
pub fn emit_event(event: &DaemonEvent) {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            return;
        }
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // The reader may have gone away
    let _ = writeln!(handle, "{}", json);
    let _ = handle.flush();
}

/// Convenience helper for emitting error events.
pub fn emit_error(message: &str) {
    emit_event(&DaemonEvent::Error {
        message: message.to_string(),
    });
}

fn parse_command(line: &str) -> Option<Result<DaemonCommand, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str::<DaemonCommand>(trimmed))
}

/// Spawn a blocking thread that reads JSON lines from stdin, deserializes
/// them into `DaemonCommand`, and forwards them through the returned channel.
///
/// The thread exits when stdin is closed or on unrecoverable read error.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<DaemonCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(text) => match parse_command(&text) {
                    None => continue,
                    Some(Ok(cmd)) => {
                        debug!(?cmd, "Received command");
                        if tx.send(cmd).is_err() {
                            break; // main task is gone
                        }
                    }
                    Some(Err(e)) => {
                        error!(input = text.trim(), "Invalid JSON command: {}", e);
                        emit_error(&format!("Invalid JSON command: {}", e));
                    }
                },
                Err(e) => {
                    error!("stdin read error: {}", e);
                    break;
                }
            }
        }
        debug!("stdin reader thread exiting");
    });

    rx
}
