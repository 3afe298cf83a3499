//! Collection callbacks and ordered action sets.
//!
//! Subscribers are stored as [`Action`]s with a stable [`ActionId`]. An
//! [`ActionSet`] is the immutable, ordered group of actions fired for one
//! event; merging two sets keeps the receiver's order and appends actions it
//! does not already contain.

mod decorator;
mod types;

pub use decorator::{CallbackDecorator, NoopDecorator, TracingDecorator};
pub(crate) use decorator::decorate;
pub use types::*;

use std::rc::Rc;

use crate::error::Result;

/// An immutable, ordered set of actions. Cloning is cheap.
pub struct ActionSet<T> {
  actions: Rc<[Action<T>]>,
}

impl<T> Clone for ActionSet<T> {
  fn clone(&self) -> Self {
    Self {
      actions: Rc::clone(&self.actions),
    }
  }
}

impl<T: 'static> Default for ActionSet<T> {
  fn default() -> Self {
    Self::empty()
  }
}

impl<T: 'static> ActionSet<T> {
  pub fn empty() -> Self {
    Self {
      actions: Rc::from(Vec::new()),
    }
  }

  pub(crate) fn from_vec(actions: Vec<Action<T>>) -> Self {
    Self {
      actions: Rc::from(actions),
    }
  }

  pub fn len(&self) -> usize {
    self.actions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }

  pub fn contains(&self, id: ActionId) -> bool {
    self.actions.iter().any(|a| a.id() == id)
  }

  /// Returns a set with `action` appended, unless it is already present.
  pub fn add(&self, action: Action<T>) -> Self {
    if self.contains(action.id()) {
      return self.clone();
    }
    let mut actions = self.actions.to_vec();
    actions.push(action);
    Self::from_vec(actions)
  }

  /// Returns a set with every action of `other` not already present appended
  /// in `other`'s order.
  pub fn merge_from(&self, other: &ActionSet<T>) -> Self {
    let missing: Vec<_> = other.iter().filter(|a| !self.contains(a.id())).cloned().collect();
    if missing.is_empty() {
      return self.clone();
    }
    let mut actions = self.actions.to_vec();
    actions.extend(missing);
    Self::from_vec(actions)
  }

  /// Runs every action in order, stopping at the first failure.
  pub fn execute(&self, value: &T) -> Result<()> {
    for action in self.actions.iter() {
      action.execute(value)?;
    }
    Ok(())
  }

  pub fn iter(&self) -> impl Iterator<Item = &Action<T>> {
    self.actions.iter()
  }

  /// Adapts every action to another element type, keeping identities.
  pub(crate) fn adapt<U: 'static>(&self, adapter: impl Fn(&U) -> Option<T> + Clone + 'static) -> ActionSet<U> {
    let actions = self
      .iter()
      .map(|action| {
        let adapter = adapter.clone();
        action.adapt(move |value: &U, inner| match adapter(value) {
          Some(converted) => inner.execute(&converted),
          None => Ok(()),
        })
      })
      .collect();
    ActionSet::from_vec(actions)
  }
}
