//! Commands sent from the console front end to the scan session

use crossbeam_channel::{unbounded, Receiver};
use std::io::BufRead;
use tracing::debug;

/// One-line command reference shown to the user
pub const COMMAND_HELP: &str =
    "camera, scan, read, send [field], set [field] <value>, reset [field], status, quit";

/// User actions on a running session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Turn the camera on or off
    ToggleCamera,
    /// Turn periodic scanning on or off
    ToggleScanning,
    /// Read the current frame once
    ReadOnce,
    /// Submit a field's confirmed value (first field when None)
    Submit(Option<String>),
    /// Replace a field's confirmed value (first field when None)
    SetManual { field_id: Option<String>, value: String },
    /// Forget the reading history of a field (every field when None)
    Reset(Option<String>),
    /// Print the pipeline flags and confirmed values
    Status,
    /// End the session
    Quit,
}

impl SessionCommand {
    /// Parse one console line; None for blank or unknown input
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = words.next()?.to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        match (command.as_str(), args.as_slice()) {
            ("camera" | "c", []) => Some(Self::ToggleCamera),
            ("scan" | "s", []) => Some(Self::ToggleScanning),
            ("read" | "r", []) => Some(Self::ReadOnce),
            ("send", []) => Some(Self::Submit(None)),
            ("send", [field]) => Some(Self::Submit(Some(field.to_string()))),
            ("set", [value]) => Some(Self::SetManual {
                field_id: None,
                value: value.to_string(),
            }),
            ("set", [field, value]) => Some(Self::SetManual {
                field_id: Some(field.to_string()),
                value: value.to_string(),
            }),
            ("reset", []) => Some(Self::Reset(None)),
            ("reset", [field]) => Some(Self::Reset(Some(field.to_string()))),
            ("status", []) => Some(Self::Status),
            ("quit" | "q" | "exit", []) => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Read commands from stdin on a background thread
///
/// The channel closes when stdin reaches EOF.
pub fn spawn_stdin_reader() -> Receiver<SessionCommand> {
    let (tx, rx) = unbounded();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match SessionCommand::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("Unknown command {:?} ({})", line.trim(), COMMAND_HELP),
            }
        }
        debug!("Command reader finished");
    });

    rx
}
