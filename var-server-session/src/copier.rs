//! Double-buffered hand-off between the copy step and the writer
//!
//! The simulation side (producer) snapshots every binding into its input
//! buffer and marks the session staged. The writer (consumer) swaps input and
//! output buffers under the session lock and hands owned snapshots of the
//! output side to the encoder, so formatting and socket writes never hold
//! the lock.
//!
//! The writer only ever *tries* the lock. When the producer holds it, the
//! write cycle is dropped: a missed sample is acceptable for a periodic
//! stream, stalling the simulation's real-time loop is not.

use crate::binding::VariableBinding;
use crate::external::SymbolResolver;
use crate::registry::SubscriptionRegistry;
use crate::wire::WireValue;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of a commit attempt on the subscribed set
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Buffers swapped; snapshots in registry order
    Committed(Vec<WireValue>),
    /// No fresh data since the last commit
    NothingStaged,
    /// The copy lock was busy; this cycle is skipped
    Contended,
}

struct CopyShared {
    staged: AtomicBool,
    registry: Mutex<SubscriptionRegistry>,
}

/// Session-scoped copy lock plus the registry it guards
///
/// Cloning yields another handle to the same session; hand one to the
/// simulation thread.
#[derive(Clone)]
pub struct DoubleBufferCopier {
    shared: Arc<CopyShared>,
}

impl Default for DoubleBufferCopier {
    fn default() -> Self {
        Self::new()
    }
}

impl DoubleBufferCopier {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(CopyShared {
                staged: AtomicBool::new(false),
                registry: Mutex::new(SubscriptionRegistry::new()),
            }),
        }
    }

    /// Blocking access to the registry, for command handlers
    pub fn registry(&self) -> MutexGuard<'_, SubscriptionRegistry> {
        self.shared.registry.lock()
    }

    /// Non-blocking acquisition of the copy lock
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, SubscriptionRegistry>> {
        self.shared.registry.try_lock()
    }

    /// Whether the producer has staged data that has not been committed
    pub fn is_staged(&self) -> bool {
        self.shared.staged.load(Ordering::Acquire)
    }

    /// Producer copy step over the subscribed set
    ///
    /// Waits for the lock; the writer never holds it for longer than a swap.
    pub fn stage_registry(&self, resolver: &dyn SymbolResolver) {
        let mut registry = self.shared.registry.lock();
        Self::copy_all(&mut registry, resolver);
        self.shared.staged.store(true, Ordering::Release);
    }

    /// Producer copy step that gives up instead of waiting for the lock
    pub fn try_stage_registry(&self, resolver: &dyn SymbolResolver) -> bool {
        match self.shared.registry.try_lock() {
            Some(mut registry) => {
                Self::copy_all(&mut registry, resolver);
                self.shared.staged.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    fn copy_all(registry: &mut SubscriptionRegistry, resolver: &dyn SymbolResolver) {
        for binding in registry.iter_mut() {
            binding.copy_from_storage(resolver);
        }
    }

    /// Bulk path: swap every binding's buffers and snapshot the output side
    pub fn commit(&self) -> CommitOutcome {
        if !self.is_staged() {
            return CommitOutcome::NothingStaged;
        }

        let mut registry = match self.shared.registry.try_lock() {
            Some(registry) => registry,
            None => {
                log::trace!("Copy lock busy, skipping write cycle");
                return CommitOutcome::Contended;
            }
        };

        let values = registry
            .iter_mut()
            .map(|binding| {
                binding.prepare_for_write();
                binding.take_wire_value()
            })
            .collect();
        self.shared.staged.store(false, Ordering::Release);
        drop(registry);

        CommitOutcome::Committed(values)
    }

    /// Copy step for a transient, caller-owned list of bindings
    pub fn stage_transient(bindings: &mut [VariableBinding], resolver: &dyn SymbolResolver) {
        for binding in bindings.iter_mut() {
            binding.copy_from_storage(resolver);
        }
    }

    /// Ad hoc path: swap a transient list under the copy lock
    ///
    /// Returns `None` when the lock is busy.
    pub fn commit_transient(&self, bindings: &mut [VariableBinding]) -> Option<Vec<WireValue>> {
        let guard = self.shared.registry.try_lock()?;
        for binding in bindings.iter_mut() {
            binding.prepare_for_write();
        }
        drop(guard);

        Some(bindings.iter_mut().map(VariableBinding::take_wire_value).collect())
    }
}
