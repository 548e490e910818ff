use std::fmt::Display;

use memory::FramePool;

use crate::page_table::{Location, PageTable};

/// Page table of one process as captured in a dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTableDump {
    pub pid: String,
    pub size: usize,
    pub pages: Vec<(usize, Location)>,
}

/// Snapshot of the whole memory state when a page fault happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dump {
    pub pid: String,
    pub address: usize,
    pub page_tables: Vec<PageTableDump>,
    pub ram: Vec<Option<String>>,
    pub swap: Vec<Option<String>>,
}

impl PageTableDump {
    /// Copies of every page table, in process creation order.
    pub fn all(table: &PageTable) -> Vec<Self> {
        table
            .processes()
            .map(|record| PageTableDump {
                pid: record.pid().to_string(),
                size: record.size(),
                pages: record
                    .iter()
                    .map(|(page, entry)| (page, entry.location()))
                    .collect(),
            })
            .collect()
    }
}

impl Display for PageTableDump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page table of {} ({} bytes):", self.pid, self.size)?;
        for (page, location) in &self.pages {
            write!(f, "\n  {:>4} -> {}", page, location)?;
        }
        Ok(())
    }
}

impl Dump {
    pub fn capture(
        pid: &str,
        address: usize,
        table: &PageTable,
        ram: &FramePool,
        swap: &FramePool,
    ) -> Self {
        Dump {
            pid: pid.to_string(),
            address,
            page_tables: PageTableDump::all(table),
            ram: ram.occupancy(),
            swap: swap.occupancy(),
        }
    }

    pub fn page_table(&self, pid: &str) -> Option<&PageTableDump> {
        self.page_tables.iter().find(|t| t.pid == pid)
    }
}

impl Display for Dump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "==== PAGE FAULT: process {} at address {} ====",
            self.pid, self.address
        )?;
        for table in &self.page_tables {
            writeln!(f, "{}", table)?;
        }
        writeln!(f, "ram:  {}", OccupancyMap(&self.ram))?;
        write!(f, "swap: {}", OccupancyMap(&self.swap))
    }
}

/// One-line rendering of frame owners, `--` for free frames.
pub struct OccupancyMap<'a>(pub &'a [Option<String>]);

impl<'a> Display for OccupancyMap<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, owner) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match owner {
                Some(pid) => write!(f, "{}", pid)?,
                None => write!(f, "--")?,
            }
        }
        write!(f, "]")
    }
}
