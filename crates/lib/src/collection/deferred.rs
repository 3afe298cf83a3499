//! Deferred elements: handles to elements whose creation is postponed until
//! something needs them.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use super::DomainObjectCollection;
use crate::action::{Action, ActionSet};
use crate::error::{CollectionError, Result};
use crate::events::EventRegister;
use crate::guard::MutationGuard;
use crate::source::{ElementSource, PendingCollection, PendingElement, ProducerId};
use crate::types::{Element, TypeLineage};

type Factory<T> = Box<dyn FnOnce() -> Result<T>>;

enum DeferredState<T> {
  Pending(Factory<T>),
  /// The factory or the creation callbacks are running.
  Realizing,
  Realized(T),
  Failed(CollectionError),
  /// Removed from the container before it was realized.
  Cancelled,
}

impl<T> DeferredState<T> {
  fn label(&self) -> &'static str {
    match self {
      DeferredState::Pending(_) => "pending",
      DeferredState::Realizing => "realizing",
      DeferredState::Realized(_) => "realized",
      DeferredState::Failed(_) => "failed",
      DeferredState::Cancelled => "cancelled",
    }
  }
}

struct DeferredInner<T: Element> {
  id: ProducerId,
  declared: TypeLineage,
  collection_type: &'static str,
  display_name: Rc<str>,
  store: Rc<dyn ElementSource<T>>,
  events: Rc<dyn EventRegister<T>>,
  guard: Rc<MutationGuard>,
  state: RefCell<DeferredState<T>>,
  /// Callbacks to run once the element is created: the container's add
  /// subscribers plus anything queued through `configure`.
  on_create: RefCell<ActionSet<T>>,
}

impl<T: Element> DeferredInner<T> {
  fn no_longer_present(&self) -> CollectionError {
    CollectionError::NoLongerPresent {
      type_name: self.declared.name().to_string(),
    }
  }

  fn circular(&self) -> CollectionError {
    CollectionError::CircularRealization {
      type_name: self.declared.name().to_string(),
    }
  }

  /// Records a creation failure and drops the producer from the store, so the
  /// container stays usable. Every later resolution returns the same error.
  fn fail(&self, cause: CollectionError) -> CollectionError {
    warn!(
      element_type = self.declared.name(),
      collection = %self.display_name,
      error = %cause,
      "failed to create deferred element"
    );
    let failure = CollectionError::creation_failed(self.declared.name(), cause);
    *self.state.borrow_mut() = DeferredState::Failed(failure.clone());
    self.store.discard_failed(self.id);
    failure
  }

  /// Creates the element on first call; later calls return the cached outcome.
  fn resolve(&self) -> Result<T> {
    match &*self.state.borrow() {
      DeferredState::Pending(_) => {}
      DeferredState::Realized(value) => return Ok(value.clone()),
      DeferredState::Failed(err) => return Err(err.clone()),
      DeferredState::Cancelled => return Err(self.no_longer_present()),
      DeferredState::Realizing => return Err(self.circular()),
    }

    let previous = std::mem::replace(&mut *self.state.borrow_mut(), DeferredState::Realizing);
    let DeferredState::Pending(factory) = previous else {
      return Err(self.circular());
    };

    debug!(
      element_type = self.declared.name(),
      collection = %self.display_name,
      "realizing deferred element"
    );
    let value = match factory() {
      Ok(value) => value,
      Err(cause) => return Err(self.fail(cause)),
    };

    // Subscribers registered after the last `configure` call are picked up here.
    let on_create = std::mem::take(&mut *self.on_create.borrow_mut()).merge_from(&self.events.add_actions());
    *self.state.borrow_mut() = DeferredState::Realized(value.clone());

    if self.store.add_realized(self.id, value.clone())
      && let Err(cause) = on_create.execute(&value)
    {
      return Err(self.fail(cause));
    }
    Ok(value)
  }

  fn was_removed(&self) -> bool {
    match &*self.state.borrow() {
      DeferredState::Cancelled => true,
      DeferredState::Realized(value) => !self.store.contains(value),
      _ => false,
    }
  }
}

impl<T: Element> PendingElement for DeferredInner<T> {
  fn id(&self) -> ProducerId {
    self.id
  }

  fn declared_type(&self) -> &TypeLineage {
    &self.declared
  }

  fn realize(&self) -> Result<()> {
    if matches!(*self.state.borrow(), DeferredState::Cancelled) {
      return Ok(());
    }
    self.resolve().map(|_| ())
  }

  fn cancel(&self) {
    let mut state = self.state.borrow_mut();
    if matches!(*state, DeferredState::Pending(_)) {
      debug!(element_type = self.declared.name(), "cancelled deferred element");
      *state = DeferredState::Cancelled;
      *self.on_create.borrow_mut() = ActionSet::empty();
    }
  }
}

/// Handle to an element added with
/// [`add_later`](DomainObjectCollection::add_later).
///
/// The element is created at most once: when the handle is resolved, when
/// the collection is iterated or queried, or immediately if the collection
/// has an eager subscriber for its type. Cloning the handle is cheap.
pub struct DeferredElement<T: Element> {
  inner: Rc<DeferredInner<T>>,
}

impl<T: Element> Clone for DeferredElement<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Rc::clone(&self.inner),
    }
  }
}

impl<T: Element> DeferredElement<T> {
  pub(super) fn new(collection: &DomainObjectCollection<T>, factory: Factory<T>) -> Self {
    let events = Rc::clone(&collection.events);
    let on_create = events.add_actions();
    Self {
      inner: Rc::new(DeferredInner {
        id: ProducerId::next(),
        declared: collection.element_type.clone(),
        collection_type: collection.element_type.name(),
        display_name: Rc::clone(&collection.display_name),
        store: Rc::clone(&collection.store),
        guard: collection.store.mutation_guard(),
        events,
        state: RefCell::new(DeferredState::Pending(factory)),
        on_create: RefCell::new(on_create),
      }),
    }
  }

  pub(super) fn id(&self) -> ProducerId {
    self.inner.id
  }

  pub(super) fn as_pending(&self) -> Rc<dyn PendingElement> {
    self.inner.clone()
  }

  pub(super) fn is_pending(&self) -> bool {
    matches!(*self.inner.state.borrow(), DeferredState::Pending(_))
  }

  pub(super) fn has_failed(&self) -> bool {
    matches!(*self.inner.state.borrow(), DeferredState::Failed(_))
  }

  /// Resolves the element, creating it if needed.
  ///
  /// Fails with [`CollectionError::NoLongerPresent`] once the element has
  /// been removed, and with the cached [`CollectionError::CreationFailed`] if
  /// creation failed.
  pub fn get(&self) -> Result<T> {
    if self.inner.was_removed() {
      return Err(self.inner.no_longer_present());
    }
    self.inner.resolve()
  }

  /// Like [`get`](Self::get), but a removed element resolves to `None`.
  pub fn get_or_none(&self) -> Result<Option<T>> {
    if self.inner.was_removed() {
      return Ok(None);
    }
    self.inner.resolve().map(Some)
  }

  /// Whether the element is, or will be once created, in the container.
  pub fn is_present(&self) -> bool {
    match &*self.inner.state.borrow() {
      DeferredState::Pending(_) | DeferredState::Realizing => true,
      DeferredState::Realized(value) => self.inner.store.contains(value),
      DeferredState::Failed(_) | DeferredState::Cancelled => false,
    }
  }

  pub fn is_realized(&self) -> bool {
    matches!(*self.inner.state.borrow(), DeferredState::Realized(_))
  }

  /// Whether the element was removed from its container, before or after
  /// it was created.
  pub fn was_removed(&self) -> bool {
    self.inner.was_removed()
  }

  /// Runs `action` against the element: now if it already exists, otherwise
  /// right after it is created, following the container's add subscribers
  /// registered so far. Does not create the element.
  ///
  /// The action runs with mutation of the container disabled. A handle whose
  /// creation failed returns that failure instead of queueing the action.
  pub fn configure(&self, action: impl Fn(&T) -> Result<()> + 'static) -> Result<()> {
    let inner = &self.inner;
    inner
      .guard
      .assert_mutation_allowed("DomainObjectProvider.configure(Action)", &inner.display_name)?;
    let wrapped = inner.guard.with_mutation_disabled(Action::new(action));

    let realized = match &*inner.state.borrow() {
      DeferredState::Realized(value) => Some(value.clone()),
      DeferredState::Failed(err) => return Err(err.clone()),
      DeferredState::Cancelled => return Err(inner.no_longer_present()),
      DeferredState::Pending(_) | DeferredState::Realizing => None,
    };
    match realized {
      Some(value) => wrapped.execute(&value),
      None => {
        let queued = inner.on_create.borrow().merge_from(&inner.events.add_actions()).add(wrapped);
        *inner.on_create.borrow_mut() = queued;
        Ok(())
      }
    }
  }

  /// The type the element was declared with.
  pub fn declared_type(&self) -> &TypeLineage {
    &self.inner.declared
  }
}

impl<T: Element> fmt::Display for DeferredElement<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "provider({}, {})", self.inner.collection_type, self.inner.declared.name())
  }
}

impl<T: Element> fmt::Debug for DeferredElement<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DeferredElement")
      .field("id", &self.inner.id)
      .field("type", &self.inner.declared)
      .field("state", &self.inner.state.borrow().label())
      .finish()
  }
}

enum BatchState<T> {
  Unevaluated(Factory<Vec<T>>),
  Evaluating,
  Evaluated(Vec<T>),
  Failed(CollectionError),
}

/// A batch added with [`add_all_later`](DomainObjectCollection::add_all_later).
/// The factory runs at most once; its outcome is kept for later flushes.
pub(super) struct DeferredBatch<T> {
  id: ProducerId,
  declared: TypeLineage,
  state: RefCell<BatchState<T>>,
}

impl<T: Element> DeferredBatch<T> {
  pub(super) fn new(declared: TypeLineage, factory: Factory<Vec<T>>) -> Self {
    Self {
      id: ProducerId::next(),
      declared,
      state: RefCell::new(BatchState::Unevaluated(factory)),
    }
  }
}

impl<T: Element> PendingCollection<T> for DeferredBatch<T> {
  fn id(&self) -> ProducerId {
    self.id
  }

  fn declared_type(&self) -> &TypeLineage {
    &self.declared
  }

  fn values(&self) -> Result<Vec<T>> {
    match &*self.state.borrow() {
      BatchState::Unevaluated(_) => {}
      BatchState::Evaluated(values) => return Ok(values.clone()),
      BatchState::Failed(err) => return Err(err.clone()),
      BatchState::Evaluating => {
        return Err(CollectionError::CircularRealization {
          type_name: self.declared.name().to_string(),
        });
      }
    }

    let previous = std::mem::replace(&mut *self.state.borrow_mut(), BatchState::Evaluating);
    let BatchState::Unevaluated(factory) = previous else {
      return Ok(Vec::new());
    };
    debug!(element_type = self.declared.name(), "evaluating deferred batch");
    match factory() {
      Ok(values) => {
        *self.state.borrow_mut() = BatchState::Evaluated(values.clone());
        Ok(values)
      }
      Err(cause) => {
        warn!(element_type = self.declared.name(), error = %cause, "failed to create deferred batch");
        let failure = CollectionError::creation_failed(self.declared.name(), cause);
        *self.state.borrow_mut() = BatchState::Failed(failure.clone());
        Err(failure)
      }
    }
  }
}
