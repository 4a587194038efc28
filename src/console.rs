//! Line-oriented console for driving the curtain by hand
//!
//! Accepted lines: `open`, `close`, `move <p>` or a bare number, `status`
//! and `quit`. Anything else is logged and ignored.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, warn};

use crate::curtain::{CurtainError, CurtainHandle};

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    MoveTo(f64),
    Status,
    Quit,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Missing position after 'move'")]
    MissingPosition,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, ParseError> {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Err(ParseError::Empty);
    };

    let command = match first.to_ascii_lowercase().as_str() {
        "open" => ConsoleCommand::MoveTo(1.0),
        "close" => ConsoleCommand::MoveTo(0.0),
        "status" => ConsoleCommand::Status,
        "quit" | "exit" => ConsoleCommand::Quit,
        "move" => {
            let position = words.next().ok_or(ParseError::MissingPosition)?;
            ConsoleCommand::MoveTo(parse_position(position)?)
        }
        other => match other.parse::<f64>() {
            Ok(_) => ConsoleCommand::MoveTo(parse_position(first)?),
            Err(_) => return Err(ParseError::Unknown(first.to_string())),
        },
    };

    if let Some(extra) = words.next() {
        return Err(ParseError::Unknown(extra.to_string()));
    }
    Ok(command)
}

fn parse_position(word: &str) -> Result<f64, ParseError> {
    match word.parse::<f64>() {
        Ok(p) if (0.0..=1.0).contains(&p) => Ok(p),
        _ => Err(ParseError::InvalidPosition(word.to_string())),
    }
}

/// Reads commands until `quit`, end of input or a closed controller.
pub async fn run<R>(handle: CurtainHandle, reader: R) -> Result<(), CurtainError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    info!("Console ready: open | close | move <0..1> | status | quit");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Console input closed");
                return Ok(());
            }
            Err(e) => {
                error!("Failed to read console input: {}", e);
                return Ok(());
            }
        };

        match parse_command(&line) {
            Ok(ConsoleCommand::MoveTo(target)) => {
                let outcome = handle.move_to(target).await?;
                info!(
                    "Reached {:.3} after {:?} ({:?})",
                    outcome.position, outcome.elapsed, outcome.stopped_by
                );
            }
            Ok(ConsoleCommand::Status) => info!("Status: {:?}", handle.status()),
            Ok(ConsoleCommand::Quit) => return Ok(()),
            Err(ParseError::Empty) => {}
            Err(e) => warn!("{}", e),
        }
    }
}
