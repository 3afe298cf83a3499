use super::DomainObjectCollection;
use crate::error::Result;
use crate::types::Element;

/// Iterator over a snapshot of a flushed collection.
///
/// The snapshot is taken when the iterator is created; elements added
/// afterwards are not visited. [`remove_current`](Self::remove_current)
/// removes the last returned element from the collection and fires the
/// removal event.
pub struct CollectionIter<T: Element> {
  collection: DomainObjectCollection<T>,
  items: std::vec::IntoIter<T>,
  current: Option<T>,
}

impl<T: Element> CollectionIter<T> {
  pub(super) fn new(collection: DomainObjectCollection<T>, items: Vec<T>) -> Self {
    Self {
      collection,
      items: items.into_iter(),
      current: None,
    }
  }

  /// Removes the element most recently returned by `next`. Returns false if
  /// there is none, or it was already removed.
  pub fn remove_current(&mut self) -> Result<bool> {
    self.collection.assert_mutable("iterator().remove()")?;
    self.collection.assert_mutable_contents("iterator().remove()")?;
    match self.current.take() {
      Some(value) => self.collection.do_remove(&value),
      None => Ok(false),
    }
  }

  /// Number of elements left to visit.
  pub fn estimated_size(&self) -> usize {
    self.items.len()
  }
}

impl<T: Element> Iterator for CollectionIter<T> {
  type Item = T;

  fn next(&mut self) -> Option<T> {
    self.current = self.items.next();
    self.current.clone()
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    self.items.size_hint()
  }
}

impl<T: Element> ExactSizeIterator for CollectionIter<T> {}
