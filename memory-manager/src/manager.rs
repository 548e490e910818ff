//! The memory manager: owns both frame pools, the page tables and the
//! replacement policy, and runs the page-fault protocol.

use std::{collections::HashSet, fmt::Display, ops::Range};

use log::{debug, info, warn};
use memory::{FrameId, FramePool, MemoryError};

use crate::{
    command::Command,
    dump::{Dump, PageTableDump},
    page_table::{Location, PageTable, PageTableError},
    recency::{RecencyError, RecencyTracker},
    translation,
};


/// Sizes in bytes. Memory and swap must be whole multiples of the page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub page_size: usize,
    pub memory_size: usize,
    pub swap_size: usize,
}

impl Geometry {
    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.page_size == 0 {
            return Err(ManagerError::InvalidGeometry(
                "page size must be positive".to_string(),
            ));
        }
        if self.memory_size == 0 || self.memory_size % self.page_size != 0 {
            return Err(ManagerError::InvalidGeometry(format!(
                "memory size {} is not a positive multiple of the page size {}",
                self.memory_size, self.page_size
            )));
        }
        if self.swap_size % self.page_size != 0 {
            return Err(ManagerError::InvalidGeometry(format!(
                "swap size {} is not a multiple of the page size {}",
                self.swap_size, self.page_size
            )));
        }
        Ok(())
    }

    pub fn memory_frames(&self) -> usize {
        self.memory_size / self.page_size
    }

    pub fn swap_frames(&self) -> usize {
        self.swap_size / self.page_size
    }
}

/// Why a request could not get the frames it needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortage {
    SwapExhausted,
    NoEvictablePage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    InvalidGeometry(String),
    UnknownPolicy(String),
    ProcessExists(String),
    UnknownProcess(String),
    AccessError {
        pid: String,
        address: usize,
    },
    OutOfMemory {
        pid: String,
        frames: usize,
        cause: Shortage,
    },
    DuplicateMapping {
        pid: String,
        page: usize,
    },
    PageTable(PageTableError),
    Recency(RecencyError),
    Memory(MemoryError),
}

impl Display for ManagerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidGeometry(reason) => write!(f, "invalid geometry: {}", reason),
            Self::UnknownPolicy(name) => write!(f, "unknown replacement policy '{}'", name),
            Self::ProcessExists(pid) => write!(f, "process {} already exists", pid),
            Self::UnknownProcess(pid) => write!(f, "process {} does not exist", pid),
            Self::AccessError { pid, address } => {
                write!(f, "access error: {} has no address {}", pid, address)
            }
            Self::OutOfMemory { pid, frames, cause } => {
                let cause = match cause {
                    Shortage::SwapExhausted => "swap exhausted",
                    Shortage::NoEvictablePage => "no page can be evicted",
                };
                write!(
                    f,
                    "out of memory: {} needs {} frames ({})",
                    pid, frames, cause
                )
            }
            Self::DuplicateMapping { pid, page } => {
                write!(f, "page {} of {} is already mapped", page, pid)
            }
            Self::PageTable(e) => write!(f, "{}", e),
            Self::Recency(e) => write!(f, "{}", e),
            Self::Memory(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ManagerError {}

impl From<MemoryError> for ManagerError {
    fn from(e: MemoryError) -> Self {
        ManagerError::Memory(e)
    }
}

impl From<RecencyError> for ManagerError {
    fn from(e: RecencyError) -> Self {
        match e {
            RecencyError::UnknownPolicy(name) => ManagerError::UnknownPolicy(name),
            other => ManagerError::Recency(other),
        }
    }
}

impl From<PageTableError> for ManagerError {
    fn from(e: PageTableError) -> Self {
        match e {
            PageTableError::UnknownProcess(pid) => ManagerError::UnknownProcess(pid),
            PageTableError::ProcessExists(pid) => ManagerError::ProcessExists(pid),
            PageTableError::UnmappedAddress { pid, address } => {
                ManagerError::AccessError { pid, address }
            }
            PageTableError::DuplicateMapping { pid, page, .. } => {
                ManagerError::DuplicateMapping { pid, page }
            }
            other => ManagerError::PageTable(other),
        }
    }
}

/// Result of a successful access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub pid: String,
    pub address: usize,
    pub page: usize,
    pub frame: FrameId,
    pub offset: usize,
    pub physical_address: usize,
    /// Memory state right before the fault, when the page was not resident.
    pub fault: Option<Box<Dump>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created {
        pid: String,
        frames: Vec<FrameId>,
        evicted: usize,
    },
    Grown {
        pid: String,
        packed: usize,
        frames: Vec<FrameId>,
        evicted: usize,
    },
    Accessed(Access),
    Terminated {
        pid: String,
        released: usize,
    },
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Created {
                pid,
                frames,
                evicted,
            } => write!(
                f,
                "created {} in frames {:?} ({} pages evicted)",
                pid, frames, evicted
            ),
            Outcome::Grown {
                pid,
                packed,
                frames,
                evicted,
            } => write!(
                f,
                "grew {}: {} bytes packed into its last page, new frames {:?} ({} pages evicted)",
                pid, packed, frames, evicted
            ),
            Outcome::Accessed(access) => write!(
                f,
                "{} address {} -> page {} -> frame {} offset {} (physical {}){}",
                access.pid,
                access.address,
                access.page,
                access.frame,
                access.offset,
                access.physical_address,
                if access.fault.is_some() {
                    " after page fault"
                } else {
                    ""
                }
            ),
            Outcome::Terminated { pid, released } => {
                write!(f, "terminated {}, {} frames released", pid, released)
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub commands: usize,
    pub accesses: usize,
    pub page_faults: usize,
    pub evictions: usize,
    pub swap_ins: usize,
    pub failures: usize,
}

impl Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} commands, {} accesses, {} page faults, {} evictions, {} swap-ins, {} failures",
            self.commands,
            self.accesses,
            self.page_faults,
            self.evictions,
            self.swap_ins,
            self.failures
        )
    }
}

type FaultHook = Box<dyn FnMut(&Dump) + Send>;

pub struct MemoryManager {
    page_size: usize,
    ram: FramePool,
    swap: FramePool,
    page_table: PageTable,
    recency: RecencyTracker,
    stats: Stats,
    fault_hook: Option<FaultHook>,
}

impl MemoryManager {
    pub fn init(geometry: Geometry, policy: &str) -> Result<Self, ManagerError> {
        Self::with_tracker(geometry, RecencyTracker::from_name(policy, None)?)
    }

    pub fn with_tracker(geometry: Geometry, recency: RecencyTracker) -> Result<Self, ManagerError> {
        geometry.validate()?;
        info!(
            "memory manager: {} ram frames, {} swap frames of {} bytes, {} policy",
            geometry.memory_frames(),
            geometry.swap_frames(),
            geometry.page_size,
            recency.policy_name()
        );
        Ok(MemoryManager {
            page_size: geometry.page_size,
            ram: FramePool::new("ram", geometry.page_size, geometry.memory_frames()),
            swap: FramePool::new("swap", geometry.page_size, geometry.swap_frames()),
            page_table: PageTable::init(geometry.page_size),
            recency,
            stats: Stats::default(),
            fault_hook: None,
        })
    }

    /// Registers a callback that sees every dump before its fault is resolved.
    pub fn on_fault<F>(&mut self, hook: F)
    where
        F: FnMut(&Dump) + Send + 'static,
    {
        self.fault_hook = Some(Box::new(hook));
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn ram(&self) -> &FramePool {
        &self.ram
    }

    pub fn swap(&self) -> &FramePool {
        &self.swap
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn policy_name(&self) -> &'static str {
        self.recency.policy_name()
    }

    pub fn recency_order(&self) -> Vec<String> {
        self.recency.tracked()
    }

    pub fn execute(&mut self, command: &Command) -> Result<Outcome, ManagerError> {
        self.stats.commands += 1;
        let result = match command {
            Command::Create { pid, size } => self.create(pid, *size),
            Command::Access { pid, address } => self.access(pid, *address).map(Outcome::Accessed),
            Command::Grow { pid, size } => self.grow(pid, *size),
            Command::Terminate { pid } => self.terminate(pid),
        };
        match &result {
            Ok(outcome) => info!("{}: {}", command, outcome),
            Err(e) => {
                self.stats.failures += 1;
                info!("{}: {}", command, e);
            }
        }
        debug_assert_eq!(self.check_consistency(), Ok(()));
        result
    }

    fn pages_for(&self, bytes: usize) -> usize {
        bytes.div_ceil(self.page_size)
    }

    /// Bytes of `page` covered by an allocation of `size` bytes.
    fn bytes_in_page(&self, size: usize, page: usize) -> Range<usize> {
        0..(size - page * self.page_size).min(self.page_size)
    }

    pub fn create(&mut self, pid: &str, size: usize) -> Result<Outcome, ManagerError> {
        if self.page_table.contains(pid) {
            return Err(ManagerError::ProcessExists(pid.to_string()));
        }
        let evictions = self.stats.evictions;
        let needed = self.pages_for(size);
        let frames = self.reserve_frames(pid, needed)?;

        self.page_table.register(pid)?;
        for (page, &frame) in frames.iter().enumerate() {
            if let Err(e) = self.page_table.map(pid, page, Location::Resident(frame)) {
                self.page_table.remove(pid)?;
                return Err(e.into());
            }
        }
        for (page, &frame) in frames.iter().enumerate() {
            let bytes = self.bytes_in_page(size, page);
            self.ram.claim(frame, pid)?;
            self.ram.write(frame, bytes, pid)?;
        }
        self.page_table.set_size(pid, size)?;
        self.recency.touch(pid);

        Ok(Outcome::Created {
            pid: pid.to_string(),
            frames,
            evicted: self.stats.evictions - evictions,
        })
    }

    pub fn access(&mut self, pid: &str, address: usize) -> Result<Access, ManagerError> {
        let translation = match translation::translate(&self.page_table, pid, address) {
            Ok(translation) => translation,
            Err(e) => {
                debug!("rejected access: {}", e);
                return Err(ManagerError::AccessError {
                    pid: pid.to_string(),
                    address,
                });
            }
        };
        let page = translation.virtual_address.page;
        self.stats.accesses += 1;

        let (frame, fault) = match translation.location {
            Location::Resident(frame) => (frame, None),
            Location::Swapped(swap_frame) => {
                self.stats.page_faults += 1;
                let dump = self.dump(pid, address);
                warn!("{}", dump);
                if let Some(hook) = self.fault_hook.as_mut() {
                    hook(&dump);
                }
                let frame = self.swap_in(pid, page, swap_frame)?;
                (frame, Some(Box::new(dump)))
            }
        };
        self.recency.touch(pid);

        let resolved = translation.resolved(frame);
        let physical_address = resolved
            .physical_address(self.page_size)
            .ok_or_else(|| ManagerError::PageTable(PageTableError::UnmappedPage {
                pid: pid.to_string(),
                page,
            }))?;
        Ok(Access {
            pid: pid.to_string(),
            address,
            page,
            frame: resolved.frame(),
            offset: resolved.offset(),
            physical_address,
            fault,
        })
    }

    pub fn grow(&mut self, pid: &str, added: usize) -> Result<Outcome, ManagerError> {
        let record = self
            .page_table
            .process(pid)
            .ok_or_else(|| ManagerError::UnknownProcess(pid.to_string()))?;
        let size = record.size();
        let pages = record.page_count();
        let packed = added.min(pages * self.page_size - size);
        let rest = added - packed;

        let evictions = self.stats.evictions;
        let needed = self.pages_for(rest);
        let frames = self.reserve_frames(pid, needed)?;

        for (i, &frame) in frames.iter().enumerate() {
            if let Err(e) = self
                .page_table
                .map(pid, pages + i, Location::Resident(frame))
            {
                self.page_table.unmap_range(pid, pages..pages + i)?;
                return Err(e.into());
            }
        }
        if packed > 0 {
            // Reserving frames may have moved the last page to swap; pack it wherever it is.
            let last = pages - 1;
            let used = size - last * self.page_size;
            match self.page_table.location(pid, last)? {
                Location::Resident(frame) => self.ram.write(frame, used..used + packed, pid)?,
                Location::Swapped(frame) => self.swap.write(frame, used..used + packed, pid)?,
            }
        }
        for (i, &frame) in frames.iter().enumerate() {
            let bytes = self.bytes_in_page(rest, i);
            self.ram.claim(frame, pid)?;
            self.ram.write(frame, bytes, pid)?;
        }
        self.page_table.set_size(pid, size + added)?;
        self.recency.touch(pid);

        Ok(Outcome::Grown {
            pid: pid.to_string(),
            packed,
            frames,
            evicted: self.stats.evictions - evictions,
        })
    }

    pub fn terminate(&mut self, pid: &str) -> Result<Outcome, ManagerError> {
        let pages = self
            .page_table
            .process(pid)
            .map(|record| record.page_count())
            .ok_or_else(|| ManagerError::UnknownProcess(pid.to_string()))?;
        let entries = self.page_table.unmap_range(pid, 0..pages)?;
        for entry in &entries {
            match entry.location() {
                Location::Resident(frame) => self.ram.release(frame)?,
                Location::Swapped(frame) => self.swap.release(frame)?,
            }
        }
        self.page_table.remove(pid)?;
        self.recency.remove(pid);
        Ok(Outcome::Terminated {
            pid: pid.to_string(),
            released: entries.len(),
        })
    }

    pub fn page_tables(&self) -> Vec<PageTableDump> {
        PageTableDump::all(&self.page_table)
    }

    /// Snapshot of every page table and both pools.
    pub fn dump(&self, pid: &str, address: usize) -> Dump {
        Dump::capture(pid, address, &self.page_table, &self.ram, &self.swap)
    }

    /// Returns `count` free RAM frames, evicting pages first if RAM is short.
    ///
    /// Nothing is evicted unless every needed eviction can succeed.
    fn reserve_frames(&mut self, pid: &str, count: usize) -> Result<Vec<FrameId>, ManagerError> {
        let free = self.ram.free_count();
        if free < count {
            let shortfall = count - free;
            let cause = if shortfall > self.evictable_pages() {
                Some(Shortage::NoEvictablePage)
            } else if shortfall > self.swap.free_count() {
                Some(Shortage::SwapExhausted)
            } else {
                None
            };
            if let Some(cause) = cause {
                warn!(
                    "{} needs {} frames, {} free, {} swap frames free",
                    pid,
                    count,
                    free,
                    self.swap.free_count()
                );
                return Err(ManagerError::OutOfMemory {
                    pid: pid.to_string(),
                    frames: count,
                    cause,
                });
            }
            info!("{} needs {} frames, evicting {} pages", pid, count, shortfall);
            for _ in 0..shortfall {
                self.evict(pid)?;
            }
        }
        Ok(self.ram.find_free(count))
    }

    fn evictable_pages(&self) -> usize {
        self.page_table
            .processes()
            .map(|record| record.resident_count())
            .sum()
    }

    /// Least recently used eligible process and its oldest resident page.
    fn select_victim(&mut self, exclude: Option<&str>) -> Option<(String, usize)> {
        let table = &self.page_table;
        let victim = self
            .recency
            .select(&|pid: &str| {
                Some(pid) != exclude
                    && table
                        .process(pid)
                        .map_or(false, |record| record.resident_count() > 0)
            })
            .ok()?;
        let page = table.process(&victim)?.oldest_resident()?;
        Some((victim, page))
    }

    /// One round of the eviction protocol. Returns the RAM frame it freed.
    fn evict(&mut self, pid: &str) -> Result<FrameId, ManagerError> {
        let (victim, page) = self
            .select_victim(None)
            .ok_or_else(|| ManagerError::OutOfMemory {
                pid: pid.to_string(),
                frames: 1,
                cause: Shortage::NoEvictablePage,
            })?;
        let swap_frame = *self
            .swap
            .find_free(1)
            .first()
            .ok_or_else(|| ManagerError::OutOfMemory {
                pid: pid.to_string(),
                frames: 1,
                cause: Shortage::SwapExhausted,
            })?;
        self.evict_page(&victim, page, swap_frame)
    }

    fn evict_page(
        &mut self,
        victim: &str,
        page: usize,
        swap_frame: FrameId,
    ) -> Result<FrameId, ManagerError> {
        let frame = self.resident_frame(victim, page)?;
        let content = self.ram.take(frame)?;
        self.swap.place(swap_frame, content)?;
        self.page_table
            .relocate(victim, page, Location::Swapped(swap_frame))?;
        self.stats.evictions += 1;
        info!(
            "evicted page {} of {} from ram frame {} to swap frame {}",
            page, victim, frame, swap_frame
        );
        Ok(frame)
    }

    fn resident_frame(&self, pid: &str, page: usize) -> Result<FrameId, ManagerError> {
        match self.page_table.location(pid, page)? {
            Location::Resident(frame) => Ok(frame),
            Location::Swapped(_) => Err(ManagerError::PageTable(PageTableError::UnmappedPage {
                pid: pid.to_string(),
                page,
            })),
        }
    }

    /// Brings `page` of `pid` back from `swap_frame` into RAM.
    fn swap_in(
        &mut self,
        pid: &str,
        page: usize,
        swap_frame: FrameId,
    ) -> Result<FrameId, ManagerError> {
        let frame = if let Some(&frame) = self.ram.find_free(1).first() {
            self.move_to_ram(pid, page, swap_frame, frame)?;
            frame
        } else {
            // A process never evicts its own pages to satisfy its own fault.
            let (victim, victim_page) =
                self.select_victim(Some(pid))
                    .ok_or_else(|| ManagerError::OutOfMemory {
                        pid: pid.to_string(),
                        frames: 1,
                        cause: Shortage::NoEvictablePage,
                    })?;
            let free_swap = *self.swap.find_free(1).first().ok_or_else(|| {
                warn!(
                    "cannot swap in page {} of {}: no swap frame for {}",
                    page, pid, victim
                );
                ManagerError::OutOfMemory {
                    pid: pid.to_string(),
                    frames: 1,
                    cause: Shortage::SwapExhausted,
                }
            })?;
            let frame = self.evict_page(&victim, victim_page, free_swap)?;
            self.move_to_ram(pid, page, swap_frame, frame)?;
            frame
        };
        self.stats.swap_ins += 1;
        Ok(frame)
    }

    fn move_to_ram(
        &mut self,
        pid: &str,
        page: usize,
        swap_frame: FrameId,
        frame: FrameId,
    ) -> Result<(), ManagerError> {
        let content = self.swap.take(swap_frame)?;
        self.ram.place(frame, content)?;
        self.page_table
            .relocate(pid, page, Location::Resident(frame))?;
        info!(
            "swapped in page {} of {} from swap frame {} to ram frame {}",
            page, pid, swap_frame, frame
        );
        Ok(())
    }

    /// Checks that page tables and frame pools agree with each other.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut ram_frames = HashSet::new();
        let mut swap_frames = HashSet::new();
        for record in self.page_table.processes() {
            let expected = self.pages_for(record.size());
            if record.page_count() != expected {
                return Err(format!(
                    "{} has {} pages for {} bytes, expected {}",
                    record.pid(),
                    record.page_count(),
                    record.size(),
                    expected
                ));
            }
            let mut resident = 0;
            for (page, entry) in record.iter() {
                let frame = entry.get_frame_number();
                let (pool, seen) = if entry.is_resident() {
                    resident += 1;
                    (&self.ram, ram_frames.insert(frame))
                } else {
                    (&self.swap, swap_frames.insert(frame))
                };
                if !seen {
                    return Err(format!(
                        "{} frame {} is mapped twice (page {} of {})",
                        pool.name(),
                        frame,
                        page,
                        record.pid()
                    ));
                }
                if pool.owner(frame) != Some(record.pid()) {
                    return Err(format!(
                        "page {} of {} points at {} frame {} owned by {:?}",
                        page,
                        record.pid(),
                        pool.name(),
                        frame,
                        pool.owner(frame)
                    ));
                }
            }
            if resident != record.resident_count() {
                return Err(format!(
                    "{} has {} resident pages but tracks {}",
                    record.pid(),
                    resident,
                    record.resident_count()
                ));
            }
        }
        if ram_frames.len() != self.ram.used_count() {
            return Err(format!(
                "{} ram frames in use but {} mapped",
                self.ram.used_count(),
                ram_frames.len()
            ));
        }
        if swap_frames.len() != self.swap.used_count() {
            return Err(format!(
                "{} swap frames in use but {} mapped",
                self.swap.used_count(),
                swap_frames.len()
            ));
        }
        Ok(())
    }
}
