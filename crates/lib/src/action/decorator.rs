//! Decoration of user callbacks at registration time.

use std::fmt;
use std::rc::Rc;

use tracing::trace_span;

use super::Action;
use crate::error::Result;

/// Wraps every user callback registered with an event register.
///
/// The decorator sees the invocation, not the element, so one decorator
/// serves collections of every element type.
pub trait CallbackDecorator {
  fn invoke(&self, callback: &dyn Fn() -> Result<()>) -> Result<()>;
}

/// Runs callbacks unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDecorator;

impl CallbackDecorator for NoopDecorator {
  fn invoke(&self, callback: &dyn Fn() -> Result<()>) -> Result<()> {
    callback()
  }
}

/// Runs each callback inside a `collection_callback` span, so log events
/// emitted by user code are attributed to the collection that dispatched them.
#[derive(Debug, Clone)]
pub struct TracingDecorator {
  collection: String,
}

impl TracingDecorator {
  pub fn new(collection: impl Into<String>) -> Self {
    Self {
      collection: collection.into(),
    }
  }
}

impl CallbackDecorator for TracingDecorator {
  fn invoke(&self, callback: &dyn Fn() -> Result<()>) -> Result<()> {
    let span = trace_span!("collection_callback", collection = %self.collection);
    let _entered = span.enter();
    callback()
  }
}

/// Applies `decorator` to `action`, keeping the action's identity.
pub(crate) fn decorate<T: 'static>(decorator: &Rc<dyn CallbackDecorator>, action: Action<T>) -> Action<T> {
  let decorator = Rc::clone(decorator);
  action.adapt(move |value: &T, inner| decorator.invoke(&|| inner.execute(value)))
}

impl fmt::Debug for dyn CallbackDecorator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("CallbackDecorator")
  }
}
