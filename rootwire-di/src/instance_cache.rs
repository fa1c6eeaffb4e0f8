//! Storage of singleton instances with an at-most-once construction guarantee.
//!
//! Each singleton binding gets a [DependencyRecord] on its first resolution. Resolved records are
//! read without locking. Otherwise, a thread claims the record by moving it into
//! [LifecyclePhase::Resolving], runs the supplier with no lock held, publishes the result and wakes
//! all threads which wanted the same instance in the meantime. Those threads block on that single
//! construction instead of creating their own instances.
//!
//! Waiting can deadlock if two threads build parts of a dependency cycle at the same time: thread 1
//! builds `A` and waits for `B`, while thread 2 builds `B` and waits for `A`. To prevent that, the
//! cache tracks which thread owns which construction and which construction each thread is waiting
//! for. A wait which would close a loop in this wait-for graph fails with
//! [ResolutionError::CircularDependency].

use crate::component_key::ComponentKey;
use crate::component_registry::BindingPtr;
use crate::error::ResolutionError;
use crate::instance_provider::ComponentInstanceAnyPtr;
use crate::resolver::ResolutionStack;
use fxhash::FxHashMap;
use itertools::Itertools;
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::SystemTime;
use tracing::{debug, trace};

/// Lifecycle phase of a [DependencyRecord].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LifecyclePhase {
    Unresolved,
    Resolving,
    Resolved,
    /// The last construction attempt failed; the next request retries.
    Failed,
}

/// Debug information about a [DependencyRecord].
#[derive(Clone, Debug)]
pub struct RecordInfo {
    pub key: ComponentKey,
    pub phase: LifecyclePhase,
    pub created_at: Option<SystemTime>,
    /// Position in the global creation order of the owning cache.
    pub creation_sequence: Option<u64>,
    pub resolving_thread: Option<ThreadId>,
    /// Number of construction attempts, including the current one.
    pub attempts: u64,
    pub last_error: Option<ResolutionError>,
}

#[derive(Debug)]
struct ResolvedInstance {
    instance: ComponentInstanceAnyPtr,
    created_at: SystemTime,
    sequence: u64,
}

#[derive(Debug)]
struct RecordState {
    phase: LifecyclePhase,
    owner: Option<ThreadId>,
    attempt: u64,
    last_error: Option<ResolutionError>,
}

/// Runtime state of a single singleton binding.
#[derive(Debug)]
pub struct DependencyRecord {
    id: u64,
    key: ComponentKey,
    binding: BindingPtr,
    resolved: OnceCell<ResolvedInstance>,
    state: Mutex<RecordState>,
    state_changed: Condvar,
}

impl DependencyRecord {
    fn new(id: u64, key: ComponentKey, binding: BindingPtr) -> Self {
        Self {
            id,
            key,
            binding,
            resolved: OnceCell::new(),
            state: Mutex::new(RecordState {
                phase: LifecyclePhase::Unresolved,
                owner: None,
                attempt: 0,
                last_error: None,
            }),
            state_changed: Condvar::new(),
        }
    }

    #[inline]
    pub fn key(&self) -> &ComponentKey {
        &self.key
    }

    /// The binding this record was created for.
    #[inline]
    pub fn binding(&self) -> &BindingPtr {
        &self.binding
    }

    /// Returns the cached instance, if resolved.
    #[inline]
    pub fn instance(&self) -> Option<&ComponentInstanceAnyPtr> {
        self.resolved.get().map(|resolved| &resolved.instance)
    }

    #[inline]
    pub fn creation_sequence(&self) -> Option<u64> {
        self.resolved.get().map(|resolved| resolved.sequence)
    }

    pub fn info(&self) -> RecordInfo {
        let state = self.state.lock();
        let resolved = self.resolved.get();

        RecordInfo {
            key: self.key.clone(),
            phase: state.phase,
            created_at: resolved.map(|resolved| resolved.created_at),
            creation_sequence: resolved.map(|resolved| resolved.sequence),
            resolving_thread: state.owner,
            attempts: state.attempt,
            last_error: state.last_error.clone(),
        }
    }
}

pub type DependencyRecordPtr = Arc<DependencyRecord>;

#[derive(Default, Debug)]
struct WaitForGraph {
    // record id -> (constructing thread, record key)
    owners: FxHashMap<u64, (ThreadId, ComponentKey)>,
    // thread -> record id it waits for
    waiting: FxHashMap<ThreadId, u64>,
}

impl WaitForGraph {
    /// Follows the chain of owners and awaited records starting at `record_id`. Returns the keys
    /// along the chain if it leads back to `thread`.
    fn find_cycle(&self, thread: ThreadId, record_id: u64) -> Option<Vec<ComponentKey>> {
        let mut path = vec![];
        let mut current = record_id;

        // every wait is checked before being registered, so a loop not including `thread` cannot
        // exist - the bound only protects against a corrupted graph
        for _ in 0..=self.owners.len() {
            let (owner, key) = self.owners.get(&current)?;
            path.push(key.clone());

            if *owner == thread {
                return Some(path);
            }

            current = *self.waiting.get(owner)?;
        }

        None
    }
}

enum Claim {
    Resolved(ComponentInstanceAnyPtr),
    Owned,
}

/// Cache of singleton [DependencyRecord]s.
#[derive(Default, Debug)]
pub struct InstanceCache {
    records: RwLock<FxHashMap<ComponentKey, DependencyRecordPtr>>,
    wait_for: Mutex<WaitForGraph>,
    last_record_id: AtomicU64,
    last_sequence: AtomicU64,
}

impl InstanceCache {
    /// Returns the cached instance for given key or creates it with `supplier`. Only one thread
    /// runs the supplier for a given record at a time; concurrent callers wait for its result.
    pub fn get_or_create<F>(
        &self,
        key: &ComponentKey,
        binding: &BindingPtr,
        stack: &mut ResolutionStack,
        supplier: F,
    ) -> Result<ComponentInstanceAnyPtr, ResolutionError>
    where
        F: FnOnce(&mut ResolutionStack) -> Result<ComponentInstanceAnyPtr, ResolutionError>,
    {
        let record = self.record(key, binding);

        if let Some(instance) = record.instance() {
            trace!(%key, "Returning cached instance.");
            return Ok(instance.clone());
        }

        match self.claim(&record, stack)? {
            Claim::Resolved(instance) => Ok(instance),
            Claim::Owned => {
                let construction = Construction {
                    cache: self,
                    record: &record,
                    finished: false,
                };
                construction.finish(supplier(stack))
            }
        }
    }

    /// Removes the record for given key, so the next request creates a new instance. A
    /// construction in progress finishes, but its result is not visible to later requests.
    pub fn invalidate(&self, key: &ComponentKey) -> bool {
        let removed = self.records.write().remove(key).is_some();
        if removed {
            debug!(%key, "Invalidated cached instance.");
        }

        removed
    }

    /// Removes all records, returning the ones holding resolved instances ordered by creation.
    pub fn invalidate_all(&self) -> Vec<DependencyRecordPtr> {
        let records = std::mem::take(&mut *self.records.write());
        debug!(count = records.len(), "Invalidated all cached instances.");

        Self::sorted_resolved(records.into_values())
    }

    /// Returns records holding resolved instances, ordered by creation.
    pub fn resolved_records(&self) -> Vec<DependencyRecordPtr> {
        Self::sorted_resolved(self.records.read().values().cloned())
    }

    pub fn record_info(&self, key: &ComponentKey) -> Option<RecordInfo> {
        self.records.read().get(key).map(|record| record.info())
    }

    pub fn is_resolved(&self, key: &ComponentKey) -> bool {
        self.records
            .read()
            .get(key)
            .map(|record| record.instance().is_some())
            .unwrap_or(false)
    }

    fn sorted_resolved(
        records: impl Iterator<Item = DependencyRecordPtr>,
    ) -> Vec<DependencyRecordPtr> {
        records
            .filter_map(|record| record.creation_sequence().map(|sequence| (sequence, record)))
            .sorted_by_key(|(sequence, _)| *sequence)
            .map(|(_, record)| record)
            .collect()
    }

    fn record(&self, key: &ComponentKey, binding: &BindingPtr) -> DependencyRecordPtr {
        if let Some(record) = self.records.read().get(key) {
            if record.binding.revision() == binding.revision() {
                return record.clone();
            }
        }

        let mut records = self.records.write();
        match records.get(key) {
            Some(record) if record.binding.revision() == binding.revision() => record.clone(),
            Some(record) if record.binding.revision() > binding.revision() => {
                // the caller looked the binding up before it was replaced - let it finish
                // without touching the cache of the newer binding
                debug!(%key, "Resolving a replaced binding outside of the cache.");
                Arc::new(self.new_record(key, binding))
            }
            _ => {
                let record = Arc::new(self.new_record(key, binding));
                records.insert(key.clone(), record.clone());
                record
            }
        }
    }

    fn new_record(&self, key: &ComponentKey, binding: &BindingPtr) -> DependencyRecord {
        DependencyRecord::new(
            self.last_record_id.fetch_add(1, Ordering::Relaxed),
            key.clone(),
            binding.clone(),
        )
    }

    fn claim(
        &self,
        record: &DependencyRecord,
        stack: &ResolutionStack,
    ) -> Result<Claim, ResolutionError> {
        let current_thread = thread::current().id();
        let mut state = record.state.lock();

        loop {
            if let Some(instance) = record.instance() {
                return Ok(Claim::Resolved(instance.clone()));
            }

            match state.phase {
                LifecyclePhase::Unresolved | LifecyclePhase::Failed => {
                    state.phase = LifecyclePhase::Resolving;
                    state.owner = Some(current_thread);
                    state.attempt += 1;

                    self.wait_for
                        .lock()
                        .owners
                        .insert(record.id, (current_thread, record.key.clone()));

                    return Ok(Claim::Owned);
                }
                LifecyclePhase::Resolving => {
                    let attempt = state.attempt;

                    {
                        let mut wait_for = self.wait_for.lock();
                        if let Some(chain) = wait_for.find_cycle(current_thread, record.id) {
                            return Err(cycle_error(stack, &record.key, chain));
                        }

                        wait_for.waiting.insert(current_thread, record.id);
                    }

                    trace!(key = %record.key, "Waiting for concurrent construction.");

                    while state.phase == LifecyclePhase::Resolving && state.attempt == attempt {
                        record.state_changed.wait(&mut state);
                    }

                    self.wait_for.lock().waiting.remove(&current_thread);

                    if state.phase == LifecyclePhase::Failed && state.attempt == attempt {
                        if let Some(error) = &state.last_error {
                            return Err(error.clone());
                        }
                    }
                }
                // the instance is published before the phase changes, so it's present here
                LifecyclePhase::Resolved => state.phase = LifecyclePhase::Unresolved,
            }
        }
    }
}

// the chain starts with the awaited key and ends with a key owned by the current thread
fn cycle_error(
    stack: &ResolutionStack,
    key: &ComponentKey,
    chain: Vec<ComponentKey>,
) -> ResolutionError {
    let mut path = stack.keys().to_vec();
    if path.last() != Some(key) {
        path.push(key.clone());
    }

    path.extend(chain.into_iter().skip(1));
    if path.len() == 1 {
        path.push(key.clone());
    }

    ResolutionError::CircularDependency {
        key: path.first().cloned().unwrap_or_else(|| key.clone()),
        path,
    }
}

/// An owned construction of a record. Dropping it without finishing (e.g. when the supplier
/// panics) releases the claim, so other threads don't wait forever.
struct Construction<'a> {
    cache: &'a InstanceCache,
    record: &'a DependencyRecord,
    finished: bool,
}

impl Construction<'_> {
    fn finish(
        mut self,
        result: Result<ComponentInstanceAnyPtr, ResolutionError>,
    ) -> Result<ComponentInstanceAnyPtr, ResolutionError> {
        self.finished = true;

        let mut state = self.record.state.lock();
        self.release_owner();

        let result = match result {
            Ok(instance) => {
                let sequence = self.cache.last_sequence.fetch_add(1, Ordering::Relaxed);
                let _ = self.record.resolved.set(ResolvedInstance {
                    instance: instance.clone(),
                    created_at: SystemTime::now(),
                    sequence,
                });

                debug!(key = %self.record.key, sequence, "Created singleton instance.");

                state.phase = LifecyclePhase::Resolved;
                state.last_error = None;
                Ok(instance)
            }
            Err(error) => {
                debug!(key = %self.record.key, %error, "Singleton construction failed.");

                state.phase = LifecyclePhase::Failed;
                state.last_error = Some(error.clone());
                Err(error)
            }
        };

        state.owner = None;
        self.record.state_changed.notify_all();

        result
    }

    fn release_owner(&self) {
        self.cache.wait_for.lock().owners.remove(&self.record.id);
    }
}

impl Drop for Construction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let mut state = self.record.state.lock();
        self.release_owner();

        state.phase = LifecyclePhase::Unresolved;
        state.owner = None;
        self.record.state_changed.notify_all();
    }
}
