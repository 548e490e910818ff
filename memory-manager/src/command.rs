use std::{fmt::Display, str::FromStr};

/// One request of the command stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { pid: String, size: usize },
    Access { pid: String, address: usize },
    Grow { pid: String, size: usize },
    Terminate { pid: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    UnknownOperation(String),
    MissingArgument { op: char, argument: &'static str },
    InvalidAmount(String),
    TrailingInput(String),
}

impl Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::UnknownOperation(op) => write!(f, "unknown operation '{}'", op),
            Self::MissingArgument { op, argument } => {
                write!(f, "'{}' is missing its {}", op, argument)
            }
            Self::InvalidAmount(amount) => write!(f, "'{}' is not a valid amount", amount),
            Self::TrailingInput(rest) => write!(f, "unexpected input '{}'", rest),
        }
    }
}

impl std::error::Error for CommandError {}

impl Command {
    pub fn pid(&self) -> &str {
        match self {
            Command::Create { pid, .. }
            | Command::Access { pid, .. }
            | Command::Grow { pid, .. }
            | Command::Terminate { pid } => pid,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Command::Create { .. } => 'C',
            Command::Access { .. } => 'A',
            Command::Grow { .. } => 'M',
            Command::Terminate { .. } => 'T',
        }
    }
}

/// Parses `C|A|M|T <process> [amount]`, e.g. `C p1 16`.
impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let op = tokens.next().ok_or(CommandError::Empty)?;
        let letter = match op.to_uppercase().as_str() {
            "C" => 'C',
            "A" => 'A',
            "M" => 'M',
            "T" => 'T',
            _ => return Err(CommandError::UnknownOperation(op.to_string())),
        };
        let pid = tokens
            .next()
            .ok_or(CommandError::MissingArgument {
                op: letter,
                argument: "process",
            })?
            .to_string();

        let command = if letter == 'T' {
            Command::Terminate { pid }
        } else {
            let raw = tokens.next().ok_or(CommandError::MissingArgument {
                op: letter,
                argument: if letter == 'A' { "address" } else { "size" },
            })?;
            let amount: usize = raw
                .parse()
                .map_err(|_| CommandError::InvalidAmount(raw.to_string()))?;
            match letter {
                'C' => Command::Create { pid, size: amount },
                'A' => Command::Access {
                    pid,
                    address: amount,
                },
                _ => Command::Grow { pid, size: amount },
            }
        };

        let rest: Vec<&str> = tokens.collect();
        if !rest.is_empty() {
            return Err(CommandError::TrailingInput(rest.join(" ")));
        }
        Ok(command)
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Create { pid, size } | Command::Grow { pid, size } => {
                write!(f, "{} {} {}", self.letter(), pid, size)
            }
            Command::Access { pid, address } => write!(f, "A {} {}", pid, address),
            Command::Terminate { pid } => write!(f, "T {}", pid),
        }
    }
}
