mod iter;
mod page_table_entry;

use std::{
    collections::{HashMap, VecDeque},
    fmt::Display,
    ops::Range,
};

use log::debug;

pub use iter::PageTableIterator;
pub use page_table_entry::{Location, PageTableEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageTableError {
    UnknownProcess(String),
    ProcessExists(String),
    UnmappedAddress { pid: String, address: usize },
    UnmappedPage { pid: String, page: usize },
    DuplicateMapping { pid: String, page: usize, location: Location },
    NonContiguous { pid: String, page: usize },
    SizeMismatch { pid: String, size: usize, pages: usize },
}

impl Display for PageTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownProcess(pid) => write!(f, "process {} does not exist", pid),
            Self::ProcessExists(pid) => write!(f, "process {} already exists", pid),
            Self::UnmappedAddress { pid, address } => {
                write!(f, "address {} is not mapped for process {}", address, pid)
            }
            Self::UnmappedPage { pid, page } => {
                write!(f, "page {} is not mapped for process {}", page, pid)
            }
            Self::DuplicateMapping {
                pid,
                page,
                location,
            } => write!(
                f,
                "page {} of process {} cannot be mapped to {}: already mapped elsewhere",
                page, pid, location
            ),
            Self::NonContiguous { pid, page } => write!(
                f,
                "page {} of process {} would leave a hole in its page run",
                page, pid
            ),
            Self::SizeMismatch { pid, size, pages } => write!(
                f,
                "{} bytes do not match the {} pages of process {}",
                size, pages, pid
            ),
        }
    }
}

impl std::error::Error for PageTableError {}

/// Page table of a single process plus its residency order.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pid: String,
    size: usize,
    entries: Vec<PageTableEntry>,
    /// Resident pages, in the order they acquired their current RAM frame.
    resident: VecDeque<usize>,
}

impl ProcessRecord {
    fn new(pid: &str) -> Self {
        ProcessRecord {
            pid: pid.to_string(),
            size: 0,
            entries: Vec::new(),
            resident: VecDeque::new(),
        }
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    /// Allocated bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Last valid virtual byte, `None` while nothing is allocated.
    pub fn high_water_mark(&self) -> Option<usize> {
        self.size.checked_sub(1)
    }

    pub fn page_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, page: usize) -> Option<&PageTableEntry> {
        self.entries.get(page)
    }

    pub fn iter(&self) -> PageTableIterator<'_> {
        PageTableIterator::new(&self.entries)
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    /// The resident page that has held its RAM frame the longest.
    pub fn oldest_resident(&self) -> Option<usize> {
        self.resident.front().copied()
    }

    fn track_residency(&mut self, page: usize, old: Option<Location>, new: Location) {
        if old.map_or(false, |l| l.is_resident()) {
            self.resident.retain(|&p| p != page);
        }
        if new.is_resident() {
            self.resident.push_back(page);
        }
    }
}

/// Page tables of every process, plus a reverse map from frame location to
/// the page using it.
#[derive(Debug, Clone)]
pub struct PageTable {
    page_size: usize,
    processes: Vec<ProcessRecord>,
    owners: HashMap<Location, (String, usize)>,
}

impl PageTable {
    pub fn init(page_size: usize) -> Self {
        PageTable {
            page_size,
            processes: Vec::new(),
            owners: HashMap::new(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn contains(&self, pid: &str) -> bool {
        self.process(pid).is_some()
    }

    pub fn process(&self, pid: &str) -> Option<&ProcessRecord> {
        self.processes.iter().find(|p| p.pid == pid)
    }

    fn process_mut(&mut self, pid: &str) -> Result<&mut ProcessRecord, PageTableError> {
        self.processes
            .iter_mut()
            .find(|p| p.pid == pid)
            .ok_or_else(|| PageTableError::UnknownProcess(pid.to_string()))
    }

    /// Processes in creation order.
    pub fn processes(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.processes.iter()
    }

    /// Page currently using `location`, if any.
    pub fn owner_of(&self, location: Location) -> Option<(&str, usize)> {
        self.owners
            .get(&location)
            .map(|(pid, page)| (pid.as_str(), *page))
    }

    pub fn register(&mut self, pid: &str) -> Result<(), PageTableError> {
        if self.contains(pid) {
            return Err(PageTableError::ProcessExists(pid.to_string()));
        }
        self.processes.push(ProcessRecord::new(pid));
        Ok(())
    }

    /// Drops the process record together with whatever it still maps.
    pub fn remove(&mut self, pid: &str) -> Result<ProcessRecord, PageTableError> {
        let index = self
            .processes
            .iter()
            .position(|p| p.pid == pid)
            .ok_or_else(|| PageTableError::UnknownProcess(pid.to_string()))?;
        let record = self.processes.remove(index);
        for entry in &record.entries {
            self.owners.remove(&entry.location());
        }
        Ok(record)
    }

    /// Maps `page` of `pid` to `location`.
    ///
    /// Only the next page after the current run can be added. Mapping an
    /// existing page again is accepted when the location is unchanged.
    pub fn map(&mut self, pid: &str, page: usize, location: Location) -> Result<(), PageTableError> {
        if let Some((owner, owner_page)) = self.owner_of(location) {
            if owner == pid && owner_page == page {
                return Ok(());
            }
            return Err(PageTableError::DuplicateMapping {
                pid: pid.to_string(),
                page,
                location,
            });
        }
        let record = self.process_mut(pid)?;
        if page < record.entries.len() {
            return Err(PageTableError::DuplicateMapping {
                pid: pid.to_string(),
                page,
                location,
            });
        }
        if page > record.entries.len() {
            return Err(PageTableError::NonContiguous {
                pid: pid.to_string(),
                page,
            });
        }
        record.entries.push(PageTableEntry::new(location));
        record.track_residency(page, None, location);
        self.owners.insert(location, (pid.to_string(), page));
        debug!("mapped page {} of {} to {}", page, pid, location);
        Ok(())
    }

    /// Entry of the page holding `address`.
    pub fn translate(
        &self,
        pid: &str,
        address: usize,
    ) -> Result<(usize, PageTableEntry), PageTableError> {
        let record = self
            .process(pid)
            .ok_or_else(|| PageTableError::UnmappedAddress {
                pid: pid.to_string(),
                address,
            })?;
        if address >= record.size {
            return Err(PageTableError::UnmappedAddress {
                pid: pid.to_string(),
                address,
            });
        }
        let page = address / self.page_size;
        let entry = record
            .entries
            .get(page)
            .ok_or_else(|| PageTableError::UnmappedAddress {
                pid: pid.to_string(),
                address,
            })?;
        Ok((page, *entry))
    }

    /// Points an existing page at `location`, returning where it was before.
    pub fn relocate(
        &mut self,
        pid: &str,
        page: usize,
        location: Location,
    ) -> Result<Location, PageTableError> {
        let old = self.location(pid, page)?;
        if old == location {
            return Ok(old);
        }
        if self.owners.contains_key(&location) {
            return Err(PageTableError::DuplicateMapping {
                pid: pid.to_string(),
                page,
                location,
            });
        }
        let record = self.process_mut(pid)?;
        record.entries[page].set_location(location);
        record.track_residency(page, Some(old), location);
        self.owners.remove(&old);
        self.owners.insert(location, (pid.to_string(), page));
        debug!("relocated page {} of {} from {} to {}", page, pid, old, location);
        Ok(old)
    }

    /// Removes the tail run `pages` of `pid`, returning the removed entries.
    pub fn unmap_range(
        &mut self,
        pid: &str,
        pages: Range<usize>,
    ) -> Result<Vec<PageTableEntry>, PageTableError> {
        let page_size = self.page_size;
        let record = self.process_mut(pid)?;
        if pages.start > pages.end || pages.end != record.entries.len() {
            return Err(PageTableError::NonContiguous {
                pid: pid.to_string(),
                page: pages.start,
            });
        }
        let removed: Vec<PageTableEntry> = record.entries.drain(pages.clone()).collect();
        record.resident.retain(|&p| p < pages.start);
        record.size = record.size.min(pages.start * page_size);
        for entry in &removed {
            self.owners.remove(&entry.location());
        }
        debug!("unmapped pages {:?} of {}", pages, pid);
        Ok(removed)
    }

    /// Records `size` bytes as allocated; the page run must already cover them exactly.
    pub fn set_size(&mut self, pid: &str, size: usize) -> Result<(), PageTableError> {
        let page_size = self.page_size;
        let record = self.process_mut(pid)?;
        let pages = record.entries.len();
        if size.div_ceil(page_size) != pages {
            return Err(PageTableError::SizeMismatch {
                pid: pid.to_string(),
                size,
                pages,
            });
        }
        record.size = size;
        Ok(())
    }

    pub fn location(&self, pid: &str, page: usize) -> Result<Location, PageTableError> {
        let record = self
            .process(pid)
            .ok_or_else(|| PageTableError::UnknownProcess(pid.to_string()))?;
        record
            .entry(page)
            .map(|entry| entry.location())
            .ok_or_else(|| PageTableError::UnmappedPage {
                pid: pid.to_string(),
                page,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{Location, PageTable, PageTableError};

    #[test]
    fn create_mapping() {
        let mut table = PageTable::init(4);
        table.register("p1").unwrap();
        table.map("p1", 0, Location::Resident(43)).unwrap();
        table.map("p1", 1, Location::Resident(45)).unwrap();
        let record = table.process("p1").unwrap();
        assert_eq!(record.entry(0).unwrap().get_frame_number(), 43);
        assert_eq!(record.entry(1).unwrap().get_frame_number(), 45);
        assert_eq!(table.owner_of(Location::Resident(45)), Some(("p1", 1)));
    }

    #[test]
    fn map_same_location_twice_is_accepted() {
        let mut table = PageTable::init(4);
        table.register("p1").unwrap();
        table.map("p1", 0, Location::Resident(3)).unwrap();
        table.map("p1", 0, Location::Resident(3)).unwrap();
        assert_eq!(table.process("p1").unwrap().page_count(), 1);
    }

    #[test]
    fn duplicate_mapping() {
        let mut table = PageTable::init(4);
        table.register("p1").unwrap();
        table.register("p2").unwrap();
        table.map("p1", 0, Location::Resident(3)).unwrap();
        assert_eq!(
            table.map("p2", 0, Location::Resident(3)),
            Err(PageTableError::DuplicateMapping {
                pid: "p2".to_string(),
                page: 0,
                location: Location::Resident(3)
            })
        );
        assert!(matches!(
            table.map("p1", 0, Location::Resident(4)),
            Err(PageTableError::DuplicateMapping { .. })
        ));
        assert_eq!(table.process("p2").unwrap().page_count(), 0);
    }

    #[test]
    fn map_past_the_run_is_rejected() {
        let mut table = PageTable::init(4);
        table.register("p1").unwrap();
        assert_eq!(
            table.map("p1", 1, Location::Resident(0)),
            Err(PageTableError::NonContiguous {
                pid: "p1".to_string(),
                page: 1
            })
        );
    }

    #[test]
    fn translate_respects_high_water_mark() {
        let mut table = PageTable::init(4);
        table.register("p1").unwrap();
        table.map("p1", 0, Location::Resident(2)).unwrap();
        table.map("p1", 1, Location::Swapped(0)).unwrap();
        table.set_size("p1", 6).unwrap();

        let (page, entry) = table.translate("p1", 5).unwrap();
        assert_eq!(page, 1);
        assert_eq!(entry.location(), Location::Swapped(0));
        assert!(matches!(
            table.translate("p1", 6),
            Err(PageTableError::UnmappedAddress { address: 6, .. })
        ));
        assert_eq!(
            table.translate("p9", 0),
            Err(PageTableError::UnmappedAddress {
                pid: "p9".to_string(),
                address: 0
            })
        );
    }

    #[test]
    fn relocate_updates_residency_order() {
        let mut table = PageTable::init(4);
        table.register("p1").unwrap();
        for page in 0..3 {
            table.map("p1", page, Location::Resident(page)).unwrap();
        }
        assert_eq!(table.process("p1").unwrap().oldest_resident(), Some(0));

        let old = table.relocate("p1", 0, Location::Swapped(0)).unwrap();
        assert_eq!(old, Location::Resident(0));
        assert_eq!(table.owner_of(Location::Resident(0)), None);
        assert_eq!(table.process("p1").unwrap().oldest_resident(), Some(1));

        table.relocate("p1", 0, Location::Resident(7)).unwrap();
        let record = table.process("p1").unwrap();
        assert_eq!(record.resident_count(), 3);
        assert_eq!(record.oldest_resident(), Some(1));

        assert!(matches!(
            table.relocate("p1", 1, Location::Resident(2)),
            Err(PageTableError::DuplicateMapping { .. })
        ));
    }

    #[test]
    fn unmap_tail_only() {
        let mut table = PageTable::init(4);
        table.register("p1").unwrap();
        for page in 0..3 {
            table.map("p1", page, Location::Resident(page)).unwrap();
        }
        table.set_size("p1", 10).unwrap();
        assert!(matches!(
            table.unmap_range("p1", 0..1),
            Err(PageTableError::NonContiguous { .. })
        ));

        let removed = table.unmap_range("p1", 1..3).unwrap();
        assert_eq!(removed.len(), 2);
        let record = table.process("p1").unwrap();
        assert_eq!(record.page_count(), 1);
        assert_eq!(record.size(), 4);
        assert_eq!(record.resident_count(), 1);
        assert_eq!(table.owner_of(Location::Resident(2)), None);
    }

    #[test]
    fn set_size_must_match_pages() {
        let mut table = PageTable::init(4);
        table.register("p1").unwrap();
        table.map("p1", 0, Location::Resident(0)).unwrap();
        assert!(table.set_size("p1", 5).is_err());
        table.set_size("p1", 4).unwrap();
        assert_eq!(table.process("p1").unwrap().high_water_mark(), Some(3));
    }

    #[test]
    fn iterate_entries() {
        let mut table = PageTable::init(4);
        table.register("p1").unwrap();
        table.map("p1", 0, Location::Resident(6)).unwrap();
        table.map("p1", 1, Location::Swapped(2)).unwrap();
        let pages: Vec<_> = table
            .process("p1")
            .unwrap()
            .iter()
            .map(|(page, entry)| (page, entry.location()))
            .collect();
        assert_eq!(
            pages,
            vec![(0, Location::Resident(6)), (1, Location::Swapped(2))]
        );
    }
}
