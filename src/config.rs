//! Loading of simulation input files.
//!
//! ```text
//! sequential      < mode
//! lru             < replacement policy
//! 4               < page size
//! 32              < physical memory in bytes
//! 16              < swap area in bytes
//! C p1 16
//! A p1 3
//! ```

use std::{fmt::Display, fs, path::Path, str::FromStr};

use log::debug;
use memory_manager::{
    Command, CommandError, Geometry, ManagerError, MemoryManager, RecencyTracker,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sequential,
    Random,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" | "sequencial" | "manual" => Ok(Mode::Sequential),
            "random" | "aleatorio" | "aleatório" => Ok(Mode::Random),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Sequential => write!(f, "sequential"),
            Mode::Random => write!(f, "random"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io { path: String, reason: String },
    MissingValue(&'static str),
    InvalidNumber { field: &'static str, value: String },
    UnknownMode(String),
    Command { line: usize, error: CommandError },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, reason } => write!(f, "cannot read {}: {}", path, reason),
            Self::MissingValue(field) => write!(f, "input ends before the {}", field),
            Self::InvalidNumber { field, value } => {
                write!(f, "{} '{}' is not a number", field, value)
            }
            Self::UnknownMode(mode) => write!(f, "unknown mode '{}'", mode),
            Self::Command { line, error } => write!(f, "line {}: {}", line, error),
        }
    }
}

impl std::error::Error for ConfigError {}

const HEADER: [&str; 5] = [
    "mode",
    "replacement policy",
    "page size",
    "memory size",
    "swap size",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    pub mode: Mode,
    pub policy: String,
    pub geometry: Geometry,
    pub commands: Vec<Command>,
}

impl SimulationConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut lines = meaningful_lines(text);
        let mut header = Vec::with_capacity(HEADER.len());
        for field in HEADER {
            let (_, value) = lines.next().ok_or(ConfigError::MissingValue(field))?;
            header.push(value);
        }

        let mode = header[0].parse::<Mode>()?;
        let policy = header[1].to_string();
        let geometry = Geometry {
            page_size: number(HEADER[2], header[2])?,
            memory_size: number(HEADER[3], header[3])?,
            swap_size: number(HEADER[4], header[4])?,
        };
        let commands = lines
            .map(|(line, value)| {
                value
                    .parse::<Command>()
                    .map_err(|error| ConfigError::Command { line, error })
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "loaded {} mode, {} policy, {:?}, {} commands",
            mode,
            policy,
            geometry,
            commands.len()
        );

        Ok(SimulationConfig {
            mode,
            policy,
            geometry,
            commands,
        })
    }

    /// Builds the manager described by this configuration.
    pub fn build_manager(&self, seed: Option<u64>) -> Result<MemoryManager, ManagerError> {
        let tracker = RecencyTracker::from_name(&self.policy, seed)?;
        MemoryManager::with_tracker(self.geometry, tracker)
    }

    /// Processes created by the command stream, with their initial sizes.
    pub fn workload(&self) -> Vec<(String, usize)> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::Create { pid, size } => Some((pid.clone(), *size)),
                _ => None,
            })
            .collect()
    }
}

/// Non-comment lines with their 1-based line numbers, comments stripped.
fn meaningful_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.is_empty() && !line.starts_with(char::is_whitespace))
        .map(|(i, line)| {
            let end = line.find('<').unwrap_or(line.len());
            (i + 1, line[..end].trim())
        })
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn number(field: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
