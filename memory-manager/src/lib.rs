pub mod command;
pub mod dump;
pub mod manager;
pub mod page_table;
pub mod recency;
pub mod translation;

pub use command::{Command, CommandError};
pub use dump::{Dump, OccupancyMap, PageTableDump};
pub use manager::{Access, Geometry, ManagerError, MemoryManager, Outcome, Shortage, Stats};
pub use page_table::{Location, PageTable, PageTableError};
pub use recency::{RecencyError, RecencyTracker, ReplacementPolicy};
