use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::{ElementSource, PendingCollection, PendingElement, ProducerId};
use crate::action::Action;
use crate::error::{CollectionError, Result};
use crate::guard::MutationGuard;
use crate::types::{Element, Subtype, TypeLineage};

/// Type and predicate narrowing a view of a parent collection.
pub struct CollectionFilter<T, S> {
  lineage: TypeLineage,
  predicate: Option<Rc<dyn Fn(&S) -> bool>>,
  _parent: PhantomData<fn(&T)>,
}

impl<T, S> Clone for CollectionFilter<T, S> {
  fn clone(&self) -> Self {
    Self {
      lineage: self.lineage.clone(),
      predicate: self.predicate.clone(),
      _parent: PhantomData,
    }
  }
}

impl<T: Element, S: Element + Subtype<T>> CollectionFilter<T, S> {
  /// Narrows a parent of lineage `parent` to the instances of `S`.
  pub fn of_type(parent: &TypeLineage) -> Self {
    Self {
      lineage: parent.narrow::<S>(),
      predicate: None,
      _parent: PhantomData,
    }
  }

  /// Additionally requires `predicate` to hold.
  pub fn with_predicate(self, predicate: impl Fn(&S) -> bool + 'static) -> Self {
    let combined: Rc<dyn Fn(&S) -> bool> = match self.predicate {
      Some(existing) => Rc::new(move |value: &S| existing(value) && predicate(value)),
      None => Rc::new(predicate),
    };
    Self {
      lineage: self.lineage,
      predicate: Some(combined),
      _parent: PhantomData,
    }
  }

  pub fn lineage(&self) -> &TypeLineage {
    &self.lineage
  }

  /// Whether an instance of `S` passes the predicate.
  pub fn accepts(&self, value: &S) -> bool {
    self.predicate.as_ref().is_none_or(|predicate| predicate(value))
  }

  /// Narrows a parent element, or `None` when the view does not expose it.
  pub fn filter(&self, value: &T) -> Option<S> {
    S::narrow(value).filter(|narrowed| self.accepts(narrowed))
  }
}

impl<T, S> fmt::Debug for CollectionFilter<T, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CollectionFilter")
      .field("lineage", &self.lineage)
      .field("predicate", &self.predicate.is_some())
      .finish()
  }
}

/// Presents a batch declared through a view as a batch of the parent type.
struct WidenedBatch<S> {
  inner: Rc<dyn PendingCollection<S>>,
}

impl<T, S: Subtype<T>> PendingCollection<T> for WidenedBatch<S> {
  fn id(&self) -> ProducerId {
    self.inner.id()
  }

  fn declared_type(&self) -> &TypeLineage {
    self.inner.declared_type()
  }

  fn values(&self) -> Result<Vec<T>> {
    Ok(self.inner.values()?.into_iter().map(<S as Subtype<T>>::widen).collect())
  }
}

/// A live projection of a parent source.
///
/// Owns no storage: reads narrow the parent's elements through the filter and
/// writes widen values into the parent, so every view of one root observes
/// the same contents.
pub struct FilteredSource<T: Element, S> {
  parent: Rc<dyn ElementSource<T>>,
  filter: CollectionFilter<T, S>,
}

impl<T: Element, S: Element + Subtype<T>> FilteredSource<T, S> {
  pub fn new(parent: Rc<dyn ElementSource<T>>, filter: CollectionFilter<T, S>) -> Self {
    Self { parent, filter }
  }

  fn widen(value: S) -> T {
    <S as Subtype<T>>::widen(value)
  }

  fn narrow_all(&self, values: Vec<T>) -> Vec<S> {
    values.iter().filter_map(|value| self.filter.filter(value)).collect()
  }
}

impl<T: Element, S: Element + Subtype<T>> ElementSource<S> for FilteredSource<T, S> {
  fn add(&self, value: S) -> Result<bool> {
    if !self.filter.accepts(&value) {
      return Err(CollectionError::FilterRejected {
        element: format!("{value:?}"),
        collection: format!("filtered collection of {}", self.filter.lineage().name()),
      });
    }
    self.parent.add(Self::widen(value))
  }

  fn add_realized(&self, id: ProducerId, value: S) -> bool {
    self.parent.add_realized(id, Self::widen(value))
  }

  fn add_pending(&self, producer: Rc<dyn PendingElement>) {
    self.parent.add_pending(producer);
  }

  fn add_pending_collection(&self, producer: Rc<dyn PendingCollection<S>>) {
    self.parent.add_pending_collection(Rc::new(WidenedBatch { inner: producer }));
  }

  fn remove(&self, value: &S) -> bool {
    self.filter.accepts(value) && self.parent.remove(&Self::widen(value.clone()))
  }

  fn remove_pending(&self, id: ProducerId) -> bool {
    self.parent.remove_pending(id)
  }

  fn discard_failed(&self, id: ProducerId) -> bool {
    self.parent.discard_failed(id)
  }

  fn contains(&self, value: &S) -> bool {
    self.filter.accepts(value) && self.parent.contains(&Self::widen(value.clone()))
  }

  fn clear(&self) {
    for value in self.iter_no_flush() {
      self.parent.remove(&Self::widen(value));
    }
    self.parent.cancel_pending(Some(self.filter.lineage()));
  }

  fn cancel_pending(&self, ty: Option<&TypeLineage>) {
    self.parent.cancel_pending(Some(ty.unwrap_or(self.filter.lineage())));
  }

  fn realize_pending(&self, ty: Option<&TypeLineage>) -> Result<()> {
    self.parent.realize_pending(ty)
  }

  fn realize_pending_collection(&self, id: ProducerId) -> Result<()> {
    self.parent.realize_pending_collection(id)
  }

  fn on_realize(&self, _action: Action<S>) {
    // Batches realize through the root source, whose action reaches every
    // view's subscribers.
  }

  fn iter(&self) -> Result<Vec<S>> {
    Ok(self.narrow_all(self.parent.iter()?))
  }

  fn iter_no_flush(&self) -> Vec<S> {
    self.narrow_all(self.parent.iter_no_flush())
  }

  fn size(&self) -> Result<usize> {
    Ok(self.iter()?.len())
  }

  fn estimated_size(&self) -> usize {
    self.parent.estimated_size()
  }

  fn is_empty(&self) -> Result<bool> {
    if self.constant_time_is_empty() {
      return Ok(true);
    }
    Ok(self.iter()?.is_empty())
  }

  fn constant_time_is_empty(&self) -> bool {
    self.parent.constant_time_is_empty()
  }

  fn pending_count(&self, ty: Option<&TypeLineage>) -> usize {
    self.parent.pending_count(Some(ty.unwrap_or(self.filter.lineage())))
  }

  fn mutation_guard(&self) -> Rc<MutationGuard> {
    self.parent.mutation_guard()
  }
}
