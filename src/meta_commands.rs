use std::{fmt::Display, io::Write, str::FromStr};

use crate::simulator::Simulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCommand {
    Exit,
    Dump,
    Stats,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommandError {
    UnrecognizedCommand(String),
    Output(String),
}

impl Display for MetaCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnrecognizedCommand(input) => write!(f, "unrecognized command '{}'", input),
            Self::Output(reason) => write!(f, "cannot write output: {}", reason),
        }
    }
}

impl std::error::Error for MetaCommandError {}

impl FromStr for MetaCommand {
    type Err = MetaCommandError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            ".exit" => Ok(MetaCommand::Exit),
            ".dump" => Ok(MetaCommand::Dump),
            ".stats" => Ok(MetaCommand::Stats),
            ".help" => Ok(MetaCommand::Help),
            _ => Err(MetaCommandError::UnrecognizedCommand(input.to_string())),
        }
    }
}

const HELP: &str = "\
C <process> <bytes>    create a process
A <process> <address>  access a virtual byte
M <process> <bytes>    grow a process
T <process>            terminate a process
.dump                  show page tables and frames
.stats                 show counters
.exit                  leave";

/// Runs the meta command in `input`, returning which one it was.
pub fn handle_meta_command<W: Write>(
    input: &str,
    simulator: &Simulator,
    out: &mut W,
) -> Result<MetaCommand, MetaCommandError> {
    let command = input.parse::<MetaCommand>()?;
    let written = match command {
        MetaCommand::Exit => Ok(()),
        MetaCommand::Dump => simulator.write_state(out),
        MetaCommand::Stats => writeln!(out, "{}", simulator.stats()),
        MetaCommand::Help => writeln!(out, "{}", HELP),
    };
    written.map_err(|e| MetaCommandError::Output(e.to_string()))?;
    Ok(command)
}

#[cfg(test)]
mod tests {
    use memory_manager::{Geometry, MemoryManager};

    use super::*;

    fn simulator() -> Simulator {
        let geometry = Geometry {
            page_size: 4,
            memory_size: 16,
            swap_size: 0,
        };
        Simulator::new(MemoryManager::init(geometry, "lru").unwrap())
    }

    #[test]
    fn recognized_commands() {
        let sim = simulator();
        let mut out = Vec::new();
        assert_eq!(
            handle_meta_command(".stats", &sim, &mut out),
            Ok(MetaCommand::Stats)
        );
        assert_eq!(
            handle_meta_command(".exit", &sim, &mut out),
            Ok(MetaCommand::Exit)
        );
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("0 commands"));
    }

    #[test]
    fn dump_shows_frames() {
        let sim = simulator();
        let mut out = Vec::new();
        handle_meta_command(".dump", &sim, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "ram:  [-- -- -- --]\nswap: []\n"
        );
    }

    #[test]
    fn unrecognized_command() {
        let sim = simulator();
        assert_eq!(
            handle_meta_command(".quit", &sim, &mut Vec::new()),
            Err(MetaCommandError::UnrecognizedCommand(".quit".to_string()))
        );
    }
}
