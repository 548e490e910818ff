//! Sequential driver: runs commands one by one and shows the memory after each.

use std::io::{self, Write};

use memory_manager::{Command, ManagerError, MemoryManager, OccupancyMap, Outcome, Stats};

pub struct Simulator {
    manager: MemoryManager,
    quiet: bool,
}

impl Simulator {
    pub fn new(manager: MemoryManager) -> Self {
        Simulator {
            manager,
            quiet: false,
        }
    }

    /// Only outcomes and errors are printed, no occupancy maps or dumps.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn manager(&self) -> &MemoryManager {
        &self.manager
    }

    pub fn stats(&self) -> Stats {
        self.manager.stats()
    }

    /// Executes `command` and writes what happened to `out`.
    pub fn step<W: Write>(
        &mut self,
        command: &Command,
        out: &mut W,
    ) -> io::Result<Result<Outcome, ManagerError>> {
        writeln!(out, "> {}", command)?;
        let result = self.manager.execute(command);
        match &result {
            Ok(outcome) => {
                if let Outcome::Accessed(access) = outcome {
                    if let (Some(dump), false) = (&access.fault, self.quiet) {
                        writeln!(out, "{}", dump)?;
                    }
                }
                writeln!(out, "{}", outcome)?;
            }
            Err(e) => writeln!(out, "error: {}", e)?,
        }
        if !self.quiet {
            self.write_occupancy(out)?;
        }
        Ok(result)
    }

    /// Runs every command in order. Failed commands do not stop the run.
    pub fn run<W: Write>(&mut self, commands: &[Command], out: &mut W) -> io::Result<Stats> {
        for command in commands {
            // failures are already reported to `out`
            let _ = self.step(command, out)?;
        }
        writeln!(out, "{}", self.stats())?;
        Ok(self.stats())
    }

    pub fn write_occupancy<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "ram:  {}", OccupancyMap(&self.manager.ram().occupancy()))?;
        writeln!(out, "swap: {}", OccupancyMap(&self.manager.swap().occupancy()))
    }

    /// Every page table followed by both occupancy maps.
    pub fn write_state<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for table in self.manager.page_tables() {
            writeln!(out, "{}", table)?;
        }
        self.write_occupancy(out)
    }
}

#[cfg(test)]
mod tests {
    use memory_manager::Geometry;

    use super::*;

    fn simulator() -> Simulator {
        let manager = MemoryManager::init(
            Geometry {
                page_size: 4,
                memory_size: 8,
                swap_size: 8,
            },
            "lru",
        )
        .unwrap();
        Simulator::new(manager)
    }

    fn commands(lines: &[&str]) -> Vec<Command> {
        lines.iter().map(|l| l.parse().unwrap()).collect()
    }

    #[test]
    fn run_prints_outcomes_and_maps() {
        let mut sim = simulator();
        let mut out = Vec::new();
        let stats = sim
            .run(&commands(&["C p1 8", "C p2 4", "A p1 1", "A p1 9"]), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("> C p1 8"));
        assert!(text.contains("ram:  [p1 p1]"));
        assert!(text.contains("swap: [p1 --]"));
        assert!(text.contains("==== PAGE FAULT: process p1 at address 1 ===="));
        assert!(text.contains("error: access error: p1 has no address 9"));
        assert_eq!(stats.page_faults, 1);
        assert_eq!(stats.failures, 1);
    }

    #[test]
    fn quiet_run_skips_maps_and_dumps() {
        let mut sim = simulator().quiet(true);
        let mut out = Vec::new();
        sim.run(&commands(&["C p1 8", "C p2 4", "A p1 1"]), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("ram:"));
        assert!(!text.contains("PAGE FAULT"));
        assert!(text.contains("after page fault"));
    }

    #[test]
    fn state_lists_page_tables() {
        let mut sim = simulator();
        let mut out = Vec::new();
        sim.step(&"C p1 6".parse().unwrap(), &mut io::sink())
            .unwrap()
            .unwrap();
        sim.write_state(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("page table of p1 (6 bytes):"));
        assert!(text.contains("1 -> ram[1]"));
    }
}
