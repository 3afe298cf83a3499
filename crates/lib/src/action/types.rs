use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

/// Identity of a registered callback.
///
/// Adapting an action to a view's element type keeps its id, so an action
/// reached through several views is still recognized as the same action when
/// action sets are merged. Ids increase with registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(u64);

impl ActionId {
  pub(crate) fn next() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    Self(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

/// A callback invoked with a collection element.
///
/// Callbacks return `Result` so that failures, including rejected mutations
/// attempted from inside the callback, reach the caller of the operation that
/// dispatched them.
pub struct Action<T> {
  id: ActionId,
  callback: Rc<dyn Fn(&T) -> Result<()>>,
}

impl<T> Clone for Action<T> {
  fn clone(&self) -> Self {
    Self {
      id: self.id,
      callback: Rc::clone(&self.callback),
    }
  }
}

impl<T: 'static> Action<T> {
  pub fn new(callback: impl Fn(&T) -> Result<()> + 'static) -> Self {
    Self {
      id: ActionId::next(),
      callback: Rc::new(callback),
    }
  }

  pub fn id(&self) -> ActionId {
    self.id
  }

  pub fn execute(&self, value: &T) -> Result<()> {
    (self.callback)(value)
  }

  /// Builds an action over another element type that keeps this action's
  /// identity. `adapter` receives the foreign value and this action.
  pub(crate) fn adapt<U: 'static>(&self, adapter: impl Fn(&U, &Action<T>) -> Result<()> + 'static) -> Action<U> {
    let inner = self.clone();
    Action {
      id: self.id,
      callback: Rc::new(move |value: &U| adapter(value, &inner)),
    }
  }
}

impl<T> fmt::Debug for Action<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Action").field(&self.id.0).finish()
  }
}
