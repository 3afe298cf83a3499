//! Lazy domain object collections.
//!
//! A [`DomainObjectCollection`] holds configuration objects (tasks, artifacts,
//! dependencies...) that may be declared long before they are created.
//! Elements added with [`add_later`](DomainObjectCollection::add_later) stay
//! pending until something needs them: iteration, an eager subscriber, or an
//! explicit [`DeferredElement::get`].
//!
//! # Architecture
//!
//! ```text
//! DomainObjectCollection<T> ──► ElementSource<T>   (realized + pending, ordered)
//!          │                 └► EventRegister<T>   (add / remove subscribers)
//!          │
//!          └─ with_type::<S>() ──► DomainObjectCollection<S>
//!                                    FilteredSource / FilteredEventRegister
//!                                    over the same store and register
//! ```
//!
//! Views never copy: they narrow the parent's elements on read and widen
//! values into the parent on write, so a change made through any view is
//! seen by every other view of the same root.

mod deferred;
mod iter;
mod types;

pub use deferred::DeferredElement;
pub use iter::CollectionIter;
pub use types::{CollectionConfig, CollectionSummary};

use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::action::Action;
use crate::error::{CollectionError, Result};
use crate::events::{DefaultEventRegister, EventRegister, FilteredEventRegister};
use crate::guard::MutationGuard;
use crate::source::{CollectionFilter, ElementSource, FilteredSource, ListElementSource, PendingCollection};
use crate::types::{Element, Subtype, TypeLineage};

use deferred::DeferredBatch;

/// A live, ordered collection of domain objects with deferred creation and
/// add/remove events.
///
/// Cloning is cheap and yields a handle to the same collection.
pub struct DomainObjectCollection<T: Element> {
  element_type: TypeLineage,
  store: Rc<dyn ElementSource<T>>,
  events: Rc<dyn EventRegister<T>>,
  display_name: Rc<str>,
  mutable_contents: bool,
}

impl<T: Element> Clone for DomainObjectCollection<T> {
  fn clone(&self) -> Self {
    Self {
      element_type: self.element_type.clone(),
      store: Rc::clone(&self.store),
      events: Rc::clone(&self.events),
      display_name: Rc::clone(&self.display_name),
      mutable_contents: self.mutable_contents,
    }
  }
}

impl<T: Element> Default for DomainObjectCollection<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Element> DomainObjectCollection<T> {
  /// An empty collection backed by a [`ListElementSource`].
  pub fn new() -> Self {
    Self::with_config(CollectionConfig::default())
  }

  pub fn with_config(config: CollectionConfig) -> Self {
    Self::from_store(Rc::new(ListElementSource::new()), config)
  }

  /// A collection over `store`, with a fresh event register using the
  /// configured callback decorator.
  pub fn from_store(store: Rc<dyn ElementSource<T>>, config: CollectionConfig) -> Self {
    let events: Rc<dyn EventRegister<T>> = Rc::new(DefaultEventRegister::new(Rc::clone(&config.decorator)));
    Self::from_parts(store, events, config)
  }

  /// A collection over an existing store and event register. The config's
  /// decorator is not used: `events` decorates its own callbacks.
  pub fn from_parts(store: Rc<dyn ElementSource<T>>, events: Rc<dyn EventRegister<T>>, config: CollectionConfig) -> Self {
    let element_type = TypeLineage::root::<T>();
    let display_name: Rc<str> = match config.display_name {
      Some(name) => Rc::from(name),
      None => Rc::from(format!("{} collection", element_type.name())),
    };

    // Elements realized from pending batches are announced like plain adds.
    let register = Rc::clone(&events);
    store.on_realize(Action::new(move |value: &T| register.add_actions().execute(value)));

    Self {
      element_type,
      store,
      events,
      display_name,
      mutable_contents: config.mutable_contents,
    }
  }

  /// Adds `value`. Returns false, firing nothing, when an equal element is
  /// already present; otherwise fires every add subscriber before returning.
  pub fn add(&self, value: T) -> Result<bool> {
    self.assert_mutable("add(T)")?;
    self.assert_mutable_contents("add(T)")?;
    self.do_add(value)
  }

  /// Adds each value in turn. Returns true if any was added. Not atomic: a
  /// failure leaves earlier values in place.
  pub fn add_all(&self, values: impl IntoIterator<Item = T>) -> Result<bool> {
    self.assert_mutable("addAll(Collection<T>)")?;
    self.assert_mutable_contents("addAll(Collection<T>)")?;
    let mut changed = false;
    for value in values {
      changed |= self.do_add(value)?;
    }
    Ok(changed)
  }

  /// Declares an element created by `factory` on first use.
  ///
  /// If an add subscriber already accepts this collection's type, the
  /// element is created before this returns.
  pub fn add_later(&self, factory: impl FnOnce() -> Result<T> + 'static) -> Result<DeferredElement<T>> {
    self.assert_mutable("addLater(Provider)")?;
    self.assert_mutable_contents("addLater(Provider)")?;
    let element = DeferredElement::new(self, Box::new(factory));
    self.store.add_pending(element.as_pending());
    trace!(element = %element, collection = %self.display_name, "declared deferred element");
    if self.events.is_subscribed(element.declared_type()) {
      element.get()?;
    }
    Ok(element)
  }

  /// Declares a batch of elements produced together by `factory`.
  ///
  /// If an add subscriber already accepts this collection's type, every
  /// element is realized before this returns, each firing its own add event.
  pub fn add_all_later<I>(&self, factory: impl FnOnce() -> Result<I> + 'static) -> Result<()>
  where
    I: IntoIterator<Item = T>,
  {
    self.assert_mutable("addAllLater(Provider)")?;
    self.assert_mutable_contents("addAllLater(Provider)")?;
    let batch = DeferredBatch::new(
      self.element_type.clone(),
      Box::new(move || -> Result<Vec<T>> { Ok(factory()?.into_iter().collect()) }),
    );
    let id = batch.id();
    self.store.add_pending_collection(Rc::new(batch));
    if self.events.is_subscribed(&self.element_type) {
      self.store.realize_pending_collection(id)?;
    }
    Ok(())
  }

  /// Removes an equal element, firing the remove subscribers.
  pub fn remove(&self, value: &T) -> Result<bool> {
    self.assert_mutable("remove(Object)")?;
    self.assert_mutable_contents("remove(Object)")?;
    self.do_remove(value)
  }

  /// Removes the element behind a deferred handle.
  ///
  /// A still-pending element is cancelled: its factory never runs and no
  /// event fires. A realized element is removed like any other. An element
  /// whose creation failed already left the store, so removing it returns
  /// false without error.
  pub fn remove_deferred(&self, element: &DeferredElement<T>) -> Result<bool> {
    self.assert_mutable("remove(Object)")?;
    self.assert_mutable_contents("remove(Object)")?;
    if element.is_pending() {
      return Ok(self.store.remove_pending(element.id()));
    }
    if element.has_failed() {
      return Ok(false);
    }
    if !self.element_type.is_assignable_from(element.declared_type()) || !element.is_realized() || !element.is_present() {
      return Ok(false);
    }
    match element.get_or_none()? {
      Some(value) => self.do_remove(&value),
      None => Ok(false),
    }
  }

  pub fn remove_all(&self, values: &[T]) -> Result<bool> {
    self.assert_mutable("removeAll(Collection)")?;
    self.assert_mutable_contents("removeAll(Collection)")?;
    if self.store.constant_time_is_empty() {
      return Ok(false);
    }
    let mut changed = false;
    for value in values {
      changed |= self.do_remove(value)?;
    }
    Ok(changed)
  }

  /// Removes every element not equal to one of `keep`. Flushes first.
  pub fn retain_all(&self, keep: &[T]) -> Result<bool> {
    self.assert_mutable("retainAll(Collection)")?;
    self.assert_mutable_contents("retainAll(Collection)")?;
    let mut changed = false;
    for value in self.store.iter()? {
      if !keep.contains(&value) {
        changed |= self.do_remove(&value)?;
      }
    }
    Ok(changed)
  }

  /// Removes every element and cancels every pending producer, then fires one
  /// remove event per realized element in order.
  pub fn clear(&self) -> Result<()> {
    self.assert_mutable("clear()")?;
    self.assert_mutable_contents("clear()")?;
    if self.store.constant_time_is_empty() {
      return Ok(());
    }
    let removed = self.store.iter_no_flush();
    self.store.clear();
    debug!(count = removed.len(), collection = %self.display_name, "cleared collection");
    for value in &removed {
      self.events.fire_removed(value)?;
    }
    Ok(())
  }

  /// Realizes every pending element and iterates over a snapshot.
  pub fn iter(&self) -> Result<CollectionIter<T>> {
    Ok(CollectionIter::new(self.clone(), self.store.iter()?))
  }

  /// Realizes every pending element and returns the elements in order.
  pub fn to_vec(&self) -> Result<Vec<T>> {
    self.store.iter()
  }

  /// Number of distinct elements, counting pending ones without creating them.
  ///
  /// Pending batches are evaluated, and their values count only when no
  /// equal element is already counted. A pending single element counts as
  /// one until it is realized, even if it will turn out to be a duplicate.
  pub fn size(&self) -> Result<usize> {
    self.store.size()
  }

  /// A cheap upper bound on [`size`](Self::size).
  pub fn estimated_size(&self) -> usize {
    self.store.estimated_size()
  }

  pub fn is_empty(&self) -> Result<bool> {
    self.store.is_empty()
  }

  pub fn contains(&self, value: &T) -> Result<bool> {
    self.store.realize_pending(None)?;
    Ok(self.store.contains(value))
  }

  pub fn contains_all(&self, values: &[T]) -> Result<bool> {
    self.store.realize_pending(None)?;
    Ok(values.iter().all(|value| self.store.contains(value)))
  }

  /// Realizes every pending element and returns those matching `predicate`.
  pub fn find_all(&self, predicate: impl Fn(&T) -> bool + 'static) -> Result<Vec<T>> {
    if self.store.constant_time_is_empty() {
      return Ok(Vec::new());
    }
    self.matching(predicate).to_vec()
  }

  /// A live view of the elements matching `predicate`.
  pub fn matching(&self, predicate: impl Fn(&T) -> bool + 'static) -> DomainObjectCollection<T> {
    self.filtered(CollectionFilter::<T, T>::of_type(&self.element_type).with_predicate(predicate))
  }

  /// A live view of the elements that are instances of `S`.
  pub fn with_type<S>(&self) -> DomainObjectCollection<S>
  where
    S: Element + Subtype<T>,
  {
    self.filtered(CollectionFilter::<T, S>::of_type(&self.element_type))
  }

  /// [`with_type`](Self::with_type) followed by [`all`](Self::all) on the view.
  pub fn with_type_all<S>(&self, action: impl Fn(&S) -> Result<()> + 'static) -> Result<DomainObjectCollection<S>>
  where
    S: Element + Subtype<T>,
  {
    self.assert_mutable("withType(Class, Action)")?;
    let view = self.with_type::<S>();
    view.all(action)?;
    Ok(view)
  }

  fn filtered<S>(&self, filter: CollectionFilter<T, S>) -> DomainObjectCollection<S>
  where
    S: Element + Subtype<T>,
  {
    DomainObjectCollection {
      element_type: filter.lineage().clone(),
      store: Rc::new(FilteredSource::new(Rc::clone(&self.store), filter.clone())),
      events: Rc::new(FilteredEventRegister::new(Rc::clone(&self.events), filter)),
      display_name: Rc::clone(&self.display_name),
      mutable_contents: self.mutable_contents,
    }
  }

  /// Runs `action` for every current element and every element added later.
  ///
  /// Pending elements are realized first. Elements added by `action` itself
  /// are seen through the subscription, not revisited by the replay.
  pub fn all(&self, action: impl Fn(&T) -> Result<()> + 'static) -> Result<Action<T>> {
    self.assert_mutable("all(Action)")?;
    let current = if self.store.constant_time_is_empty() {
      Vec::new()
    } else {
      self.store.iter()?
    };
    let action = self.events.register_eager_add(&self.element_type, Action::new(action));
    for value in &current {
      action.execute(value)?;
    }
    Ok(action)
  }

  /// Runs `action` for every element as it is realized, without forcing any
  /// pending element to be created. Mutation is disabled while it runs.
  pub fn configure_each(&self, action: impl Fn(&T) -> Result<()> + 'static) -> Result<Action<T>> {
    self.assert_mutable("configureEach(Action)")?;
    let guard = self.store.mutation_guard();
    let wrapped = guard.with_mutation_disabled(Action::new(action));
    let action = self.events.register_lazy_add(&self.element_type, wrapped);
    for value in &self.store.iter_no_flush() {
      action.execute(value)?;
    }
    Ok(action)
  }

  /// Subscribes to future additions. Pending elements of this collection's
  /// type are realized before this returns, so `action` sees them too.
  pub fn when_object_added(&self, action: impl Fn(&T) -> Result<()> + 'static) -> Result<Action<T>> {
    self.assert_mutable("whenObjectAdded(Action)")?;
    let action = self.events.register_eager_add(&self.element_type, Action::new(action));
    self.store.realize_pending(Some(&self.element_type))?;
    Ok(action)
  }

  /// Subscribes to removals. Never realizes anything.
  pub fn when_object_removed(&self, action: impl Fn(&T) -> Result<()> + 'static) -> Action<T> {
    self.events.register_remove(&self.element_type, Action::new(action))
  }

  pub fn element_type(&self) -> &TypeLineage {
    &self.element_type
  }

  pub fn display_name(&self) -> &str {
    &self.display_name
  }

  /// The guard shared by this collection and every view of its root.
  pub fn mutation_guard(&self) -> Rc<MutationGuard> {
    self.store.mutation_guard()
  }

  /// Counts describing the collection without realizing anything.
  pub fn summary(&self) -> CollectionSummary {
    CollectionSummary {
      name: self.display_name.to_string(),
      element_type: self.element_type.name().to_string(),
      realized: self.store.iter_no_flush().len(),
      pending: self.store.pending_count(Some(&self.element_type)),
      subscribers: self.events.subscriber_counts(Some(&self.element_type)),
    }
  }

  fn assert_mutable(&self, operation: &str) -> Result<()> {
    self.store.mutation_guard().assert_mutation_allowed(operation, &self.display_name)
  }

  fn assert_mutable_contents(&self, operation: &str) -> Result<()> {
    if self.mutable_contents {
      return Ok(());
    }
    Err(CollectionError::ReadOnlyContents {
      operation: operation.to_string(),
      collection: self.display_name.to_string(),
    })
  }

  fn do_add(&self, value: T) -> Result<bool> {
    if !self.store.add(value.clone())? {
      return Ok(false);
    }
    let actions = self.events.add_actions();
    trace!(subscribers = actions.len(), collection = %self.display_name, "dispatching add event");
    actions.execute(&value)?;
    Ok(true)
  }

  fn do_remove(&self, value: &T) -> Result<bool> {
    if !self.store.remove(value) {
      return Ok(false);
    }
    self.events.fire_removed(value)?;
    Ok(true)
  }
}

impl<T: Element> fmt::Display for DomainObjectCollection<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.display_name)
  }
}

impl<T: Element> fmt::Debug for DomainObjectCollection<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DomainObjectCollection")
      .field("name", &self.display_name)
      .field("element_type", &self.element_type)
      .field("realized", &self.store.iter_no_flush().len())
      .finish()
  }
}
