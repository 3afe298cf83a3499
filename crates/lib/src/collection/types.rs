//! Configuration and diagnostics types for collections.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::action::{CallbackDecorator, NoopDecorator};
use crate::events::SubscriberCounts;

/// Configuration for a root collection.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
  /// Name used in error messages and logs.
  /// If None, uses "<element type> collection".
  pub display_name: Option<String>,

  /// Whether the contents may change. When false every add/remove/clear
  /// fails with `ReadOnlyContents`; subscriptions are still allowed.
  pub mutable_contents: bool,

  /// Wraps every callback registered with the collection's event register.
  pub decorator: Rc<dyn CallbackDecorator>,
}

impl Default for CollectionConfig {
  fn default() -> Self {
    Self {
      display_name: None,
      mutable_contents: true,
      decorator: Rc::new(NoopDecorator),
    }
  }
}

impl CollectionConfig {
  pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
    self.display_name = Some(name.into());
    self
  }

  pub fn with_mutable_contents(mut self, mutable: bool) -> Self {
    self.mutable_contents = mutable;
    self
  }

  pub fn with_decorator(mut self, decorator: impl CallbackDecorator + 'static) -> Self {
    self.decorator = Rc::new(decorator);
    self
  }
}

/// Point-in-time description of a collection, for diagnostics output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
  pub name: String,
  pub element_type: String,
  /// Realized elements the collection exposes.
  pub realized: usize,
  /// Pending producers that may produce elements of this collection's type.
  pub pending: usize,
  pub subscribers: SubscriberCounts,
}
