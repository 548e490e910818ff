//! Replacement policies deciding whose page leaves RAM next.
//!
//! The manager only talks to a [`RecencyTracker`], which wraps whichever
//! [`ReplacementPolicy`] the configuration names.

use std::{collections::VecDeque, fmt::Display};

use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecencyError {
    Empty,
    NoEligibleProcess,
    UnknownPolicy(String),
}

impl Display for RecencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "no process is tracked"),
            Self::NoEligibleProcess => write!(f, "no tracked process can give up a page"),
            Self::UnknownPolicy(name) => write!(f, "unknown replacement policy '{}'", name),
        }
    }
}

impl std::error::Error for RecencyError {}

pub trait ReplacementPolicy: Send {
    fn name(&self) -> &'static str;

    /// Records a use of `pid`, starting to track it if needed.
    fn touch(&mut self, pid: &str);

    fn remove(&mut self, pid: &str);

    /// The process this policy would pick first, ignoring eligibility.
    fn oldest(&self) -> Option<&str>;

    /// Picks a process among those accepted by `eligible`.
    fn select(&mut self, eligible: &dyn Fn(&str) -> bool) -> Option<String>;

    /// Tracked processes, next candidate first.
    fn tracked(&self) -> Vec<String>;
}

/// Least recently used. Ties keep insertion order.
#[derive(Debug, Default)]
pub struct Lru {
    order: VecDeque<String>,
}

impl ReplacementPolicy for Lru {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn touch(&mut self, pid: &str) {
        self.remove(pid);
        self.order.push_back(pid.to_string());
    }

    fn remove(&mut self, pid: &str) {
        self.order.retain(|p| p != pid);
    }

    fn oldest(&self) -> Option<&str> {
        self.order.front().map(|p| p.as_str())
    }

    fn select(&mut self, eligible: &dyn Fn(&str) -> bool) -> Option<String> {
        self.order.iter().find(|p| eligible(p.as_str())).cloned()
    }

    fn tracked(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}

/// First in, first out: uses do not reorder.
#[derive(Debug, Default)]
pub struct Fifo {
    order: VecDeque<String>,
}

impl ReplacementPolicy for Fifo {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn touch(&mut self, pid: &str) {
        if !self.order.iter().any(|p| p == pid) {
            self.order.push_back(pid.to_string());
        }
    }

    fn remove(&mut self, pid: &str) {
        self.order.retain(|p| p != pid);
    }

    fn oldest(&self) -> Option<&str> {
        self.order.front().map(|p| p.as_str())
    }

    fn select(&mut self, eligible: &dyn Fn(&str) -> bool) -> Option<String> {
        self.order.iter().find(|p| eligible(p.as_str())).cloned()
    }

    fn tracked(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}

/// Uniformly random among the eligible processes.
#[derive(Debug)]
pub struct RandomPolicy {
    processes: Vec<String>,
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        RandomPolicy {
            processes: Vec::new(),
            rng,
        }
    }
}

impl ReplacementPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn touch(&mut self, pid: &str) {
        if !self.processes.iter().any(|p| p == pid) {
            self.processes.push(pid.to_string());
        }
    }

    fn remove(&mut self, pid: &str) {
        self.processes.retain(|p| p != pid);
    }

    fn oldest(&self) -> Option<&str> {
        self.processes.first().map(|p| p.as_str())
    }

    fn select(&mut self, eligible: &dyn Fn(&str) -> bool) -> Option<String> {
        let candidates: Vec<&String> = self
            .processes
            .iter()
            .filter(|p| eligible(p.as_str()))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let pick = self.rng.gen_range(0..candidates.len());
        Some(candidates[pick].clone())
    }

    fn tracked(&self) -> Vec<String> {
        self.processes.clone()
    }
}

pub struct RecencyTracker {
    policy: Box<dyn ReplacementPolicy>,
}

impl RecencyTracker {
    pub const POLICIES: [&'static str; 3] = ["lru", "fifo", "random"];

    pub fn new(policy: Box<dyn ReplacementPolicy>) -> Self {
        RecencyTracker { policy }
    }

    /// Builds the policy called `name`; `seed` only matters for `random`.
    pub fn from_name(name: &str, seed: Option<u64>) -> Result<Self, RecencyError> {
        let policy: Box<dyn ReplacementPolicy> = match name.trim().to_lowercase().as_str() {
            "lru" => Box::new(Lru::default()),
            "fifo" => Box::new(Fifo::default()),
            "random" => Box::new(RandomPolicy::new(seed)),
            _ => return Err(RecencyError::UnknownPolicy(name.to_string())),
        };
        Ok(Self::new(policy))
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn touch(&mut self, pid: &str) {
        self.policy.touch(pid);
    }

    pub fn remove(&mut self, pid: &str) {
        self.policy.remove(pid);
    }

    pub fn oldest(&self) -> Result<&str, RecencyError> {
        self.policy.oldest().ok_or(RecencyError::Empty)
    }

    pub fn select(&mut self, eligible: &dyn Fn(&str) -> bool) -> Result<String, RecencyError> {
        if self.policy.oldest().is_none() {
            return Err(RecencyError::Empty);
        }
        self.policy
            .select(eligible)
            .ok_or(RecencyError::NoEligibleProcess)
    }

    pub fn tracked(&self) -> Vec<String> {
        self.policy.tracked()
    }
}

impl std::fmt::Debug for RecencyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecencyTracker")
            .field("policy", &self.policy.name())
            .field("tracked", &self.policy.tracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_moves_touched_to_the_back() {
        let mut tracker = RecencyTracker::from_name("lru", None).unwrap();
        tracker.touch("p1");
        tracker.touch("p2");
        tracker.touch("p3");
        assert_eq!(tracker.oldest(), Ok("p1"));
        tracker.touch("p1");
        assert_eq!(tracker.oldest(), Ok("p2"));
        assert_eq!(tracker.tracked(), vec!["p2", "p3", "p1"]);
    }

    #[test]
    fn empty_tracker() {
        let mut tracker = RecencyTracker::from_name("LRU", None).unwrap();
        assert_eq!(tracker.oldest(), Err(RecencyError::Empty));
        assert_eq!(tracker.select(&|_| true), Err(RecencyError::Empty));
    }

    #[test]
    fn select_skips_ineligible() {
        let mut tracker = RecencyTracker::from_name("lru", None).unwrap();
        tracker.touch("p1");
        tracker.touch("p2");
        assert_eq!(tracker.select(&|p| p != "p1"), Ok("p2".to_string()));
        assert_eq!(
            tracker.select(&|_| false),
            Err(RecencyError::NoEligibleProcess)
        );
        assert_eq!(tracker.oldest(), Ok("p1"), "select does not consume");
    }

    #[test]
    fn fifo_ignores_uses() {
        let mut tracker = RecencyTracker::from_name("fifo", None).unwrap();
        tracker.touch("p1");
        tracker.touch("p2");
        tracker.touch("p1");
        assert_eq!(tracker.oldest(), Ok("p1"));
        tracker.remove("p1");
        assert_eq!(tracker.oldest(), Ok("p2"));
    }

    #[test]
    fn random_picks_only_eligible() {
        let mut tracker = RecencyTracker::from_name("random", Some(7)).unwrap();
        for pid in ["p1", "p2", "p3", "p4"] {
            tracker.touch(pid);
        }
        for _ in 0..50 {
            let pick = tracker.select(&|p| p == "p2" || p == "p4").unwrap();
            assert!(pick == "p2" || pick == "p4");
        }
    }

    #[test]
    fn unknown_policy() {
        assert_eq!(
            RecencyTracker::from_name("clock", None).unwrap_err(),
            RecencyError::UnknownPolicy("clock".to_string())
        );
    }
}
