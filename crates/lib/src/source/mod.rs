//! Ordered element storage behind domain object collections.
//!
//! An [`ElementSource`] holds realized elements and pending producers in
//! declaration order. Collections consume it through this trait only, so a
//! filtered view is just another source wrapping its parent's.
//!
//! - [`ListElementSource`]: the default insertion-ordered store
//! - [`FilteredSource`]: a type/predicate projection over a parent source

mod filtered;
mod list;

pub use filtered::{CollectionFilter, FilteredSource};
pub use list::ListElementSource;

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::action::Action;
use crate::error::Result;
use crate::guard::MutationGuard;
use crate::types::{Element, TypeLineage};

/// Identity of a pending producer within its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProducerId(u64);

impl ProducerId {
  pub(crate) fn next() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    Self(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

/// A producer of one element whose creation is deferred.
///
/// Realizing the producer creates the element and installs it into the store
/// through [`ElementSource::add_realized`], at the producer's position.
pub trait PendingElement {
  fn id(&self) -> ProducerId;

  fn declared_type(&self) -> &TypeLineage;

  fn realize(&self) -> Result<()>;

  /// Called when the store drops the producer without realizing it.
  fn cancel(&self);
}

/// A producer of a batch of elements whose creation is deferred.
///
/// The batch is evaluated at most once. Evaluating it (to count it) does not
/// realize it: the store installs the values and fires its realize action
/// only when the batch is flushed.
pub trait PendingCollection<T> {
  fn id(&self) -> ProducerId;

  fn declared_type(&self) -> &TypeLineage;

  fn values(&self) -> Result<Vec<T>>;
}

/// Insertion-ordered storage for realized elements and pending producers.
///
/// Every element is either realized or pending, never both. Methods take
/// `&self`: a source is shared between a collection and all of its views, and
/// implementations must not hold interior borrows while calling producers or
/// the realize action.
pub trait ElementSource<T: Element> {
  /// Inserts a realized element. Returns false when an equal element is
  /// already present.
  fn add(&self, value: T) -> Result<bool>;

  /// Installs the value produced by pending producer `id` in its place.
  /// Returns false when an equal element is already present; the producer
  /// entry is dropped either way.
  fn add_realized(&self, id: ProducerId, value: T) -> bool;

  fn add_pending(&self, producer: Rc<dyn PendingElement>);

  fn add_pending_collection(&self, producer: Rc<dyn PendingCollection<T>>);

  fn remove(&self, value: &T) -> bool;

  /// Drops a still-pending producer and cancels it.
  fn remove_pending(&self, id: ProducerId) -> bool;

  /// Drops the entry of a producer, single or batch, whose creation failed.
  /// The producer is not cancelled: it keeps reporting its failure.
  fn discard_failed(&self, id: ProducerId) -> bool;

  /// Whether an equal element is realized. Never realizes anything.
  fn contains(&self, value: &T) -> bool;

  /// Drops every element and cancels every pending producer.
  fn clear(&self);

  /// Cancels pending producers declared with a type assignable to `ty`, or
  /// all of them.
  fn cancel_pending(&self, ty: Option<&TypeLineage>);

  /// Realizes pending producers declared with a type assignable to `ty`, or
  /// all of them, in declaration order. A failing producer does not stop the
  /// others; the first failure is returned once all have run.
  fn realize_pending(&self, ty: Option<&TypeLineage>) -> Result<()>;

  fn realize_pending_collection(&self, id: ProducerId) -> Result<()>;

  /// Sets the action fired for each element realized from a pending batch.
  fn on_realize(&self, action: Action<T>);

  /// Realizes every pending producer and returns the elements in order.
  fn iter(&self) -> Result<Vec<T>>;

  /// Returns the realized elements in order without realizing anything.
  fn iter_no_flush(&self) -> Vec<T>;

  /// Number of distinct elements. Pending batches are evaluated (not
  /// realized) and count only values not already present; a pending single
  /// counts as one until it is realized.
  fn size(&self) -> Result<usize>;

  /// A cheap upper bound on the size, used for pre-sizing.
  fn estimated_size(&self) -> usize;

  fn is_empty(&self) -> Result<bool>;

  /// True only when emptiness can be answered without evaluating anything.
  fn constant_time_is_empty(&self) -> bool;

  /// Number of pending producers whose declared type overlaps `ty`.
  fn pending_count(&self, ty: Option<&TypeLineage>) -> usize;

  fn mutation_guard(&self) -> Rc<MutationGuard>;
}
