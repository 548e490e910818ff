//! Random traffic: one thread per process hammering a shared manager.

use std::{
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

use log::{debug, info};
use memory_manager::{Command, MemoryManager, OccupancyMap, Stats};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// One growth request every this many operations, on average.
const GROWTH_ONE_IN: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficOptions {
    /// Operations issued by every process after it was created.
    pub accesses: usize,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub pid: String,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct TrafficReport {
    pub workers: Vec<WorkerReport>,
    pub stats: Stats,
    pub ram: Vec<Option<String>>,
    pub swap: Vec<Option<String>>,
}

impl Display for TrafficReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for worker in &self.workers {
            writeln!(
                f,
                "{}: {} requests served, {} failed",
                worker.pid, worker.succeeded, worker.failed
            )?;
        }
        writeln!(f, "{}", self.stats)?;
        writeln!(f, "ram:  {}", OccupancyMap(&self.ram))?;
        write!(f, "swap: {}", OccupancyMap(&self.swap))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrafficError {
    WorkerPanicked(String),
}

impl Display for TrafficError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorkerPanicked(pid) => write!(f, "worker for {} panicked", pid),
        }
    }
}

impl std::error::Error for TrafficError {}

/// `count` processes named `p1`, `p2`, ... with random sizes up to half of RAM.
pub fn generate_workload(
    count: usize,
    page_size: usize,
    memory_size: usize,
    seed: Option<u64>,
) -> Vec<(String, usize)> {
    let mut rng = rng_for(seed, u64::MAX);
    let largest = (memory_size / 2).max(page_size);
    (1..=count)
        .map(|i| (format!("p{}", i), rng.gen_range(1..=largest)))
        .collect()
}

fn rng_for(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15)),
        None => StdRng::from_entropy(),
    }
}

fn lock(manager: &Mutex<MemoryManager>) -> MutexGuard<'_, MemoryManager> {
    manager.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs every process of `workload` on its own thread until all are done.
pub fn run(
    manager: MemoryManager,
    workload: Vec<(String, usize)>,
    options: TrafficOptions,
) -> Result<TrafficReport, TrafficError> {
    let manager = Arc::new(Mutex::new(manager));
    info!(
        "starting {} workers, {} operations each",
        workload.len(),
        options.accesses
    );

    let handles: Vec<_> = workload
        .into_iter()
        .enumerate()
        .map(|(i, (pid, size))| {
            let manager = Arc::clone(&manager);
            let mut rng = rng_for(options.seed, i as u64);
            let worker_pid = pid.clone();
            let handle = thread::spawn(move || {
                worker(&manager, worker_pid, size, options.accesses, &mut rng)
            });
            (pid, handle)
        })
        .collect();

    let mut workers = Vec::with_capacity(handles.len());
    for (pid, handle) in handles {
        let report = handle
            .join()
            .map_err(|_| TrafficError::WorkerPanicked(pid))?;
        workers.push(report);
    }

    let manager = lock(&manager);
    Ok(TrafficReport {
        workers,
        stats: manager.stats(),
        ram: manager.ram().occupancy(),
        swap: manager.swap().occupancy(),
    })
}

fn worker(
    manager: &Mutex<MemoryManager>,
    pid: String,
    size: usize,
    operations: usize,
    rng: &mut StdRng,
) -> WorkerReport {
    let mut report = WorkerReport {
        pid: pid.clone(),
        ..Default::default()
    };
    let mut issue = |command: Command| {
        let result = lock(manager).execute(&command);
        match result {
            Ok(_) => report.succeeded += 1,
            Err(e) => {
                debug!("{}: {}", command, e);
                report.failed += 1;
            }
        }
    };

    issue(Command::Create {
        pid: pid.clone(),
        size,
    });
    for _ in 0..operations {
        let current = lock(manager)
            .page_table()
            .process(&pid)
            .map_or(0, |record| record.size());
        let command = if rng.gen_ratio(1, GROWTH_ONE_IN) {
            Command::Grow {
                pid: pid.clone(),
                size: rng.gen_range(1..=size.max(1)),
            }
        } else {
            // a slice past the end keeps out-of-range accesses in the mix
            let upper = current + current / 8 + 1;
            Command::Access {
                pid: pid.clone(),
                address: rng.gen_range(0..upper),
            }
        };
        issue(command);
        thread::yield_now();
    }
    drop(issue);
    report
}
