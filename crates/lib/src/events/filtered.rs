use std::rc::Rc;

use super::{EventRegister, SubscriberCounts};
use crate::action::{Action, ActionSet};
use crate::error::Result;
use crate::source::CollectionFilter;
use crate::types::{Element, Subtype, TypeLineage};

/// A view's register: a type-narrowed window onto its parent's.
///
/// Subscriptions are stored in the parent, wrapped so they only run for
/// elements the view's filter exposes. Events fired through the view are
/// widened and fired on the parent, reaching subscribers of every view.
pub struct FilteredEventRegister<T: Element, S> {
  parent: Rc<dyn EventRegister<T>>,
  filter: CollectionFilter<T, S>,
}

impl<T: Element, S: Element + Subtype<T>> FilteredEventRegister<T, S> {
  pub fn new(parent: Rc<dyn EventRegister<T>>, filter: CollectionFilter<T, S>) -> Self {
    Self { parent, filter }
  }

  /// Wraps a view action so the parent can store it.
  fn narrowing(&self, action: Action<S>) -> Action<T> {
    let filter = self.filter.clone();
    action.adapt(move |value: &T, inner| match filter.filter(value) {
      Some(narrowed) => inner.execute(&narrowed),
      None => Ok(()),
    })
  }

  /// Presents a stored parent action as a view action.
  fn widening(action: Action<T>) -> Action<S> {
    action.adapt(|value: &S, inner| inner.execute(&<S as Subtype<T>>::widen(value.clone())))
  }
}

impl<T: Element, S: Element + Subtype<T>> EventRegister<S> for FilteredEventRegister<T, S> {
  fn add_actions(&self) -> ActionSet<S> {
    self
      .parent
      .add_actions()
      .adapt(|value: &S| Some(<S as Subtype<T>>::widen(value.clone())))
  }

  fn is_subscribed(&self, ty: &TypeLineage) -> bool {
    self.parent.is_subscribed(ty)
  }

  fn register_eager_add(&self, ty: &TypeLineage, action: Action<S>) -> Action<S> {
    Self::widening(self.parent.register_eager_add(ty, self.narrowing(action)))
  }

  fn register_lazy_add(&self, ty: &TypeLineage, action: Action<S>) -> Action<S> {
    Self::widening(self.parent.register_lazy_add(ty, self.narrowing(action)))
  }

  fn register_remove(&self, ty: &TypeLineage, action: Action<S>) -> Action<S> {
    Self::widening(self.parent.register_remove(ty, self.narrowing(action)))
  }

  fn fire_removed(&self, value: &S) -> Result<()> {
    self.parent.fire_removed(&<S as Subtype<T>>::widen(value.clone()))
  }

  fn subscriber_counts(&self, ty: Option<&TypeLineage>) -> SubscriberCounts {
    self.parent.subscriber_counts(Some(ty.unwrap_or(self.filter.lineage())))
  }
}
