//! Command interpreter.
//!
//! Maps one trimmed client line to a canned reply:
//!
//! ```text
//! hello  -> Hello! Welcome to the telnet test server.
//! time   -> Current time: 2024-03-09 08:30:00
//! exit   -> Bye! Closing connection.      (then the session closes)
//! other  -> unknown command: <input> — supported: hello, time, exit
//! ```
//!
//! Matching is case-insensitive on the whole line. There are no arguments.

use crate::clock::Clock;
use crate::message::{SECONDS_FORMAT, SUPPORTED_COMMANDS};

/// Parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Hello,
    Time,
    Exit,
    /// Anything else, kept verbatim for the reply.
    Unknown(String),
}

/// What the session should do with a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Write the text and keep going.
    Respond(String),
    /// Write the text, then close the connection.
    Terminate(String),
}

impl Outcome {
    /// The reply text, without line terminator.
    pub fn text(&self) -> &str {
        match self {
            Outcome::Respond(text) | Outcome::Terminate(text) => text,
        }
    }
}

impl Command {
    /// Parse a trimmed line.
    pub fn parse(line: &str) -> Command {
        if line.eq_ignore_ascii_case("hello") {
            Command::Hello
        } else if line.eq_ignore_ascii_case("time") {
            Command::Time
        } else if line.eq_ignore_ascii_case("exit") {
            Command::Exit
        } else {
            Command::Unknown(line.to_string())
        }
    }
}

/// Interpret a non-empty trimmed line.
///
/// Empty lines are filtered by the caller. The `time` reply reads the clock
/// on every call.
pub fn interpret(line: &str, clock: &dyn Clock) -> Outcome {
    match Command::parse(line) {
        Command::Hello => Outcome::Respond("Hello! Welcome to the telnet test server.".to_string()),
        Command::Time => Outcome::Respond(format!(
            "Current time: {}",
            clock.now().format(SECONDS_FORMAT)
        )),
        Command::Exit => Outcome::Terminate("Bye! Closing connection.".to_string()),
        Command::Unknown(input) => Outcome::Respond(format!(
            "unknown command: {input} — supported: {SUPPORTED_COMMANDS}"
        )),
    }
}
