pub mod config;
pub mod meta_commands;
pub mod repl;
pub mod simulator;
pub mod traffic;

pub use config::{ConfigError, Mode, SimulationConfig};
pub use simulator::Simulator;
