//! Add and remove subscribers for domain object collections.
//!
//! A root collection owns a [`DefaultEventRegister`]; each view wraps its
//! parent's register in a [`FilteredEventRegister`], so every subscription
//! lands in the root and sees additions made through any view.

mod filtered;

pub use filtered::FilteredEventRegister;

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::action::{Action, ActionSet, CallbackDecorator, NoopDecorator, decorate};
use crate::error::Result;
use crate::types::{Element, TypeLineage};

/// Number of subscribers of each kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberCounts {
  pub eager_add: usize,
  pub lazy_add: usize,
  pub remove: usize,
}

/// Registry of add and remove subscribers.
pub trait EventRegister<T: Element> {
  /// Every add subscriber, eager and lazy, in registration order.
  fn add_actions(&self) -> ActionSet<T>;

  /// Whether any add subscriber, eager or lazy, accepts elements declared
  /// with type `ty`.
  fn is_subscribed(&self, ty: &TypeLineage) -> bool;

  /// Registers an add subscriber that expects to see every element of `ty`.
  /// Returns the action as it will be invoked (decorated).
  fn register_eager_add(&self, ty: &TypeLineage, action: Action<T>) -> Action<T>;

  /// Registers an add subscriber that only runs for elements that get realized.
  fn register_lazy_add(&self, ty: &TypeLineage, action: Action<T>) -> Action<T>;

  fn register_remove(&self, ty: &TypeLineage, action: Action<T>) -> Action<T>;

  /// Runs every remove subscriber for `value`, in registration order.
  fn fire_removed(&self, value: &T) -> Result<()>;

  /// Subscriber counts, restricted to subscribers whose type overlaps `ty`.
  fn subscriber_counts(&self, ty: Option<&TypeLineage>) -> SubscriberCounts;
}

struct Subscription<T> {
  declared: TypeLineage,
  action: Action<T>,
}

impl<T> Clone for Subscription<T> {
  fn clone(&self) -> Self {
    Self {
      declared: self.declared.clone(),
      action: self.action.clone(),
    }
  }
}

fn count_overlapping<T>(subscriptions: &[Subscription<T>], ty: Option<&TypeLineage>) -> usize {
  subscriptions
    .iter()
    .filter(|s| ty.is_none_or(|ty| ty.overlaps(&s.declared)))
    .count()
}

/// The register owned by a root collection.
///
/// Eager and lazy add subscribers are kept in two ordered lists and merged by
/// registration order when an add event is dispatched.
pub struct DefaultEventRegister<T: Element> {
  decorator: Rc<dyn CallbackDecorator>,
  eager_add: RefCell<Vec<Subscription<T>>>,
  lazy_add: RefCell<Vec<Subscription<T>>>,
  remove: RefCell<Vec<Subscription<T>>>,
  /// Merged add actions, rebuilt after each add registration.
  merged: RefCell<Option<ActionSet<T>>>,
}

impl<T: Element> Default for DefaultEventRegister<T> {
  fn default() -> Self {
    Self::new(Rc::new(NoopDecorator))
  }
}

impl<T: Element> DefaultEventRegister<T> {
  pub fn new(decorator: Rc<dyn CallbackDecorator>) -> Self {
    Self {
      decorator,
      eager_add: RefCell::new(Vec::new()),
      lazy_add: RefCell::new(Vec::new()),
      remove: RefCell::new(Vec::new()),
      merged: RefCell::new(None),
    }
  }

  fn register(&self, list: &RefCell<Vec<Subscription<T>>>, ty: &TypeLineage, action: Action<T>) -> Action<T> {
    let action = decorate(&self.decorator, action);
    list.borrow_mut().push(Subscription {
      declared: ty.clone(),
      action: action.clone(),
    });
    self.merged.borrow_mut().take();
    action
  }

  fn merge(&self) -> ActionSet<T> {
    let eager = self.eager_add.borrow();
    let lazy = self.lazy_add.borrow();
    let mut actions = Vec::with_capacity(eager.len() + lazy.len());
    let (mut e, mut l) = (eager.iter().peekable(), lazy.iter().peekable());
    loop {
      let next = match (e.peek(), l.peek()) {
        (Some(a), Some(b)) if a.action.id() <= b.action.id() => e.next(),
        (Some(_), Some(_)) => l.next(),
        (Some(_), None) => e.next(),
        (None, Some(_)) => l.next(),
        (None, None) => break,
      };
      if let Some(subscription) = next {
        actions.push(subscription.action.clone());
      }
    }
    ActionSet::from_vec(actions)
  }
}

impl<T: Element> EventRegister<T> for DefaultEventRegister<T> {
  fn add_actions(&self) -> ActionSet<T> {
    if let Some(merged) = self.merged.borrow().as_ref() {
      return merged.clone();
    }
    let merged = self.merge();
    *self.merged.borrow_mut() = Some(merged.clone());
    merged
  }

  fn is_subscribed(&self, ty: &TypeLineage) -> bool {
    let accepts = |s: &Subscription<T>| s.declared.is_assignable_from(ty);
    self.eager_add.borrow().iter().any(accepts) || self.lazy_add.borrow().iter().any(accepts)
  }

  fn register_eager_add(&self, ty: &TypeLineage, action: Action<T>) -> Action<T> {
    trace!(element_type = ty.name(), action = ?action.id(), "registered eager add action");
    self.register(&self.eager_add, ty, action)
  }

  fn register_lazy_add(&self, ty: &TypeLineage, action: Action<T>) -> Action<T> {
    trace!(element_type = ty.name(), action = ?action.id(), "registered lazy add action");
    self.register(&self.lazy_add, ty, action)
  }

  fn register_remove(&self, ty: &TypeLineage, action: Action<T>) -> Action<T> {
    trace!(element_type = ty.name(), action = ?action.id(), "registered remove action");
    let action = decorate(&self.decorator, action);
    self.remove.borrow_mut().push(Subscription {
      declared: ty.clone(),
      action: action.clone(),
    });
    action
  }

  fn fire_removed(&self, value: &T) -> Result<()> {
    let subscriptions = self.remove.borrow().clone();
    trace!(subscribers = subscriptions.len(), "dispatching remove event");
    for subscription in &subscriptions {
      subscription.action.execute(value)?;
    }
    Ok(())
  }

  fn subscriber_counts(&self, ty: Option<&TypeLineage>) -> SubscriberCounts {
    SubscriberCounts {
      eager_add: count_overlapping(&self.eager_add.borrow(), ty),
      lazy_add: count_overlapping(&self.lazy_add.borrow(), ty),
      remove: count_overlapping(&self.remove.borrow(), ty),
    }
  }
}
