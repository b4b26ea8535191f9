//! Check scheduler
//!
//! A time-ordered set of `(due, id)` entries. Each tick pops due entries
//! oldest first (ties broken by id) and issues check requests until the
//! admission limit on outstanding checks is reached. Entries that cannot be
//! admitted stay due for the next tick.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::contracts::{CheckRequest, CheckResult};
use crate::model::{Checkable, CheckableId, CheckableKind, Generation, Timestamp};
use crate::registry::Registry;

/// State reported for services whose check timed out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutState {
    #[default]
    Critical,
    Unknown,
}

impl TimeoutState {
    fn return_code(&self, kind: CheckableKind) -> i32 {
        match (kind, self) {
            (CheckableKind::Host, _) => 1,
            (CheckableKind::Service, TimeoutState::Critical) => 2,
            (CheckableKind::Service, TimeoutState::Unknown) => 3,
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum outstanding checks (`None` = unlimited)
    pub max_concurrent_checks: Option<usize>,
    /// Upper bound of the per-entry jitter in seconds
    pub max_jitter: u64,
    /// Timeout for checkables without their own
    pub default_check_timeout: u64,
    pub timeout_state: TimeoutState,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_checks: Some(64),
            max_jitter: 30,
            default_check_timeout: 60,
            timeout_state: TimeoutState::Critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Outstanding {
    generation: Generation,
    deadline: Timestamp,
    timeout_secs: u64,
    expired: bool,
}

/// Admission counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionSnapshot {
    pub limit: Option<usize>,
    pub outstanding: usize,
    pub throttled: u64,
}

/// Why a result was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// No check is outstanding for this checkable
    NotOutstanding,
    /// The result answers an older request
    GenerationMismatch,
}

impl StaleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaleReason::NotOutstanding => "not_outstanding",
            StaleReason::GenerationMismatch => "generation_mismatch",
        }
    }
}

/// Time-ordered check queue with admission control
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
    queue: BTreeSet<(Timestamp, CheckableId)>,
    due_by_id: HashMap<CheckableId, Timestamp>,
    outstanding: HashMap<CheckableId, Outstanding>,
    forced: HashSet<CheckableId>,
    throttled: u64,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Schedule every checkable of the registry
    ///
    /// A checkable keeps a future `next_check` it already has; otherwise the
    /// first check is spread over `[now, now + max_jitter]`.
    pub fn populate(&mut self, registry: &mut Registry, now: Timestamp) {
        for id in registry.checkable_ids() {
            let jitter = self.jitter(&id, now);
            if let Some(checkable) = registry.checkable_mut(&id) {
                let due = match checkable.next_check {
                    Some(next) if next > now => next,
                    _ => now + jitter,
                };
                checkable.next_check = Some(due);
                self.schedule(id, due);
            }
        }
        tracing::debug!(entries = self.queue.len(), "Scheduler populated");
    }

    /// Rebuild the queue after the registry was replaced
    ///
    /// Outstanding checks are forgotten; their late results no longer match
    /// and are discarded.
    pub fn rebuild(&mut self, registry: &mut Registry, now: Timestamp) {
        self.queue.clear();
        self.due_by_id.clear();
        self.outstanding.clear();
        self.forced.clear();
        self.populate(registry, now);
    }

    /// Insert or move the entry of `id`
    pub fn schedule(&mut self, id: CheckableId, at: Timestamp) {
        if let Some(previous) = self.due_by_id.insert(id.clone(), at) {
            self.queue.remove(&(previous, id.clone()));
        }
        self.queue.insert((at, id));
    }

    pub fn unschedule(&mut self, id: &CheckableId) {
        if let Some(previous) = self.due_by_id.remove(id) {
            self.queue.remove(&(previous, id.clone()));
        }
        self.outstanding.remove(id);
        self.forced.remove(id);
    }

    pub fn next_due(&self, id: &CheckableId) -> Option<Timestamp> {
        self.due_by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_outstanding(&self, id: &CheckableId) -> bool {
        self.outstanding.contains_key(id)
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    pub fn admission(&self) -> AdmissionSnapshot {
        AdmissionSnapshot {
            limit: self.config.max_concurrent_checks,
            outstanding: self.outstanding.len(),
            throttled: self.throttled,
        }
    }

    /// Pop due entries and issue check requests
    ///
    /// Commands are returned unrendered; the caller expands macros.
    pub fn tick(&mut self, registry: &mut Registry, now: Timestamp) -> Vec<CheckRequest> {
        let due: Vec<(Timestamp, CheckableId)> = self
            .queue
            .iter()
            .take_while(|(at, _)| *at <= now)
            .cloned()
            .collect();

        let mut requests = Vec::new();
        for (due_at, id) in due {
            let Some(checkable) = registry.checkable_mut(&id) else {
                self.unschedule(&id);
                continue;
            };

            if self.outstanding.contains_key(&id) {
                continue;
            }

            let runnable = checkable.checks_enabled || self.forced.contains(&id);
            let command = match checkable.check_command.clone() {
                Some(command) if runnable => command,
                _ => {
                    let next = self.next_check_time(checkable, now);
                    checkable.next_check = Some(next);
                    self.forced.remove(&id);
                    self.schedule(id, next);
                    continue;
                }
            };

            if !self.has_capacity() {
                self.throttled += 1;
                tracing::debug!(
                    checkable = %id,
                    outstanding = self.outstanding.len(),
                    "Check admission deferred"
                );
                continue;
            }

            let timeout_secs = checkable
                .check_timeout
                .unwrap_or(self.config.default_check_timeout);
            let generation = checkable.generation;
            requests.push(CheckRequest {
                id: id.clone(),
                generation,
                command,
                timeout_secs,
                scheduled_at: due_at,
            });
            self.outstanding.insert(
                id.clone(),
                Outstanding {
                    generation,
                    deadline: now + timeout_secs as i64,
                    timeout_secs,
                    expired: false,
                },
            );

            let next = self.next_check_time(checkable, now);
            checkable.next_check = Some(next);
            self.forced.remove(&id);
            self.schedule(id, next);
        }

        if !requests.is_empty() {
            tracing::debug!(issued = requests.len(), "Checks issued");
        }
        requests
    }

    /// Accept or discard a result
    ///
    /// Passive results are always accepted here. Active and timeout results
    /// must answer the outstanding request of the checkable's current
    /// generation; accepting one frees its admission slot.
    pub fn accept_result(
        &mut self,
        result: &CheckResult,
        current: Generation,
    ) -> Result<(), StaleReason> {
        if result.is_passive() {
            return Ok(());
        }
        let outstanding = self
            .outstanding
            .get(&result.id)
            .ok_or(StaleReason::NotOutstanding)?;
        if result.generation != Some(outstanding.generation) || outstanding.generation != current {
            return Err(StaleReason::GenerationMismatch);
        }
        self.outstanding.remove(&result.id);
        Ok(())
    }

    /// Synthesize terminal results for outstanding checks past their deadline
    pub fn expire(&mut self, now: Timestamp) -> Vec<CheckResult> {
        let mut expired = Vec::new();
        for (id, outstanding) in self.outstanding.iter_mut() {
            if outstanding.expired || outstanding.deadline > now {
                continue;
            }
            outstanding.expired = true;
            tracing::warn!(
                checkable = %id,
                generation = %outstanding.generation,
                timeout_secs = outstanding.timeout_secs,
                "Check timed out"
            );
            expired.push(CheckResult::timed_out(
                id.clone(),
                outstanding.generation,
                self.config.timeout_state.return_code(id.kind()),
                outstanding.timeout_secs,
            ));
        }
        expired.sort_by(|a, b| a.id.cmp(&b.id));
        expired
    }

    /// Move the next check of a checkable to `at`
    ///
    /// Bumps the generation so a result of a check already in flight is
    /// discarded. A forced check runs even when active checks are disabled.
    pub fn reschedule(
        &mut self,
        registry: &mut Registry,
        id: &CheckableId,
        at: Timestamp,
        forced: bool,
    ) -> Option<Generation> {
        let generation = registry.bump_generation(id)?;
        if let Some(checkable) = registry.checkable_mut(id) {
            checkable.next_check = Some(at);
        }
        self.outstanding.remove(id);
        if forced {
            self.forced.insert(id.clone());
        }
        self.schedule(id.clone(), at);
        tracing::debug!(checkable = %id, at, forced, generation = %generation, "Check rescheduled");
        Some(generation)
    }

    /// Reschedule from `now` with the interval of the checkable's current state
    pub fn reschedule_after_result(&mut self, checkable: &mut Checkable, now: Timestamp) {
        if self.forced.contains(&checkable.id) {
            return;
        }
        let next = self.next_check_time(checkable, now);
        checkable.next_check = Some(next);
        self.schedule(checkable.id.clone(), next);
    }

    /// Due entries in service order
    pub fn entries(&self) -> Vec<(Timestamp, CheckableId)> {
        self.queue.iter().cloned().collect()
    }

    fn has_capacity(&self) -> bool {
        match self.config.max_concurrent_checks {
            Some(limit) => self.outstanding.len() < limit,
            None => true,
        }
    }

    fn next_check_time(&self, checkable: &Checkable, now: Timestamp) -> Timestamp {
        now + checkable.interval().max(1) + self.jitter(&checkable.id, now)
    }

    /// Deterministic jitter in `[0, max_jitter]` derived from `(id, due)`
    fn jitter(&self, id: &CheckableId, due: Timestamp) -> i64 {
        if self.config.max_jitter == 0 {
            return 0;
        }
        let mut hasher = Sha256::new();
        hasher.update(id.to_string().as_bytes());
        hasher.update(due.to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(bytes) % (self.config.max_jitter + 1)) as i64
    }
}
