//! Mutation guard for collections dispatching callbacks.
//!
//! One guard is shared by a root collection and every view derived from it.
//! While a guarded callback runs, structural mutation through any of those
//! collections is rejected. Guarded regions are scoped tokens: dropping the
//! token restores the previous state on every exit path.

use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

use crate::action::Action;
use crate::error::{CollectionError, Result};

#[derive(Debug, Default)]
pub struct MutationGuard {
  /// Number of guarded regions currently entered.
  depth: Cell<usize>,
}

impl MutationGuard {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_mutation_allowed(&self) -> bool {
    self.depth.get() == 0
  }

  /// Fails with [`CollectionError::IllegalMutation`] inside a guarded region.
  pub fn assert_mutation_allowed(&self, operation: &str, collection: &str) -> Result<()> {
    if self.is_mutation_allowed() {
      return Ok(());
    }
    trace!(operation, collection, "rejected mutation inside guarded callback");
    Err(CollectionError::illegal_mutation(operation, collection))
  }

  /// Enters a guarded region that lasts until the returned token is dropped.
  pub fn disable(&self) -> MutationDisabled<'_> {
    self.depth.set(self.depth.get() + 1);
    MutationDisabled { guard: self }
  }

  /// Wraps `action` so that it runs inside a guarded region.
  pub fn with_mutation_disabled<T: 'static>(self: &Rc<Self>, action: Action<T>) -> Action<T> {
    let guard = Rc::clone(self);
    action.adapt(move |value: &T, inner| {
      let _disabled = guard.disable();
      inner.execute(value)
    })
  }
}

/// Scoped token for a guarded region.
#[must_use = "mutation is re-enabled as soon as the token is dropped"]
pub struct MutationDisabled<'a> {
  guard: &'a MutationGuard,
}

impl Drop for MutationDisabled<'_> {
  fn drop(&mut self) {
    self.guard.depth.set(self.guard.depth.get() - 1);
  }
}
