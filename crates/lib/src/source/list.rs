use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use super::{ElementSource, PendingCollection, PendingElement, ProducerId};
use crate::action::Action;
use crate::error::Result;
use crate::guard::MutationGuard;
use crate::types::{Element, TypeLineage};

enum Entry<T> {
  Realized(T),
  Pending(Rc<dyn PendingElement>),
  PendingBatch(Rc<dyn PendingCollection<T>>),
}

impl<T: Element> Entry<T> {
  fn producer_id(&self) -> Option<ProducerId> {
    match self {
      Entry::Realized(_) => None,
      Entry::Pending(p) => Some(p.id()),
      Entry::PendingBatch(b) => Some(b.id()),
    }
  }

  fn declared_type(&self) -> Option<&TypeLineage> {
    match self {
      Entry::Realized(_) => None,
      Entry::Pending(p) => Some(p.declared_type()),
      Entry::PendingBatch(b) => Some(b.declared_type()),
    }
  }

  fn holds(&self, value: &T) -> bool {
    matches!(self, Entry::Realized(v) if v == value)
  }
}

/// Producers selected for realization, captured so that no borrow of the
/// entry list is held while they run.
enum Selected<T> {
  Single(Rc<dyn PendingElement>),
  Batch(Rc<dyn PendingCollection<T>>),
}

fn assignable(ty: Option<&TypeLineage>, declared: &TypeLineage) -> bool {
  ty.is_none_or(|ty| ty.is_assignable_from(declared))
}

/// Insertion-ordered element store.
///
/// Realized elements and pending producers share one list, so a flushed
/// collection enumerates elements in declaration order whether or not they
/// were deferred. Duplicate checks use element equality.
pub struct ListElementSource<T: Element> {
  entries: RefCell<Vec<Entry<T>>>,
  on_realize: RefCell<Option<Action<T>>>,
  guard: Rc<MutationGuard>,
}

impl<T: Element> Default for ListElementSource<T> {
  fn default() -> Self {
    Self {
      entries: RefCell::new(Vec::new()),
      on_realize: RefCell::new(None),
      guard: Rc::new(MutationGuard::new()),
    }
  }
}

impl<T: Element> ListElementSource<T> {
  pub fn new() -> Self {
    Self::default()
  }

  fn select(&self, ty: Option<&TypeLineage>) -> Vec<Selected<T>> {
    self
      .entries
      .borrow()
      .iter()
      .filter_map(|entry| match entry {
        Entry::Pending(p) if assignable(ty, p.declared_type()) => Some(Selected::Single(Rc::clone(p))),
        Entry::PendingBatch(b) if assignable(ty, b.declared_type()) => Some(Selected::Batch(Rc::clone(b))),
        _ => None,
      })
      .collect()
  }
}

impl<T: Element> ElementSource<T> for ListElementSource<T> {
  fn add(&self, value: T) -> Result<bool> {
    let mut entries = self.entries.borrow_mut();
    if entries.iter().any(|e| e.holds(&value)) {
      return Ok(false);
    }
    entries.push(Entry::Realized(value));
    Ok(true)
  }

  fn add_realized(&self, id: ProducerId, value: T) -> bool {
    let mut entries = self.entries.borrow_mut();
    let slot = entries.iter().position(|e| e.producer_id() == Some(id));
    let duplicate = entries.iter().any(|e| e.holds(&value));
    match (slot, duplicate) {
      (Some(index), true) => {
        entries.remove(index);
        false
      }
      (Some(index), false) => {
        entries[index] = Entry::Realized(value);
        true
      }
      (None, true) => false,
      (None, false) => {
        entries.push(Entry::Realized(value));
        true
      }
    }
  }

  fn add_pending(&self, producer: Rc<dyn PendingElement>) {
    self.entries.borrow_mut().push(Entry::Pending(producer));
  }

  fn add_pending_collection(&self, producer: Rc<dyn PendingCollection<T>>) {
    self.entries.borrow_mut().push(Entry::PendingBatch(producer));
  }

  fn remove(&self, value: &T) -> bool {
    let mut entries = self.entries.borrow_mut();
    match entries.iter().position(|e| e.holds(value)) {
      Some(index) => {
        entries.remove(index);
        true
      }
      None => false,
    }
  }

  fn remove_pending(&self, id: ProducerId) -> bool {
    let removed = {
      let mut entries = self.entries.borrow_mut();
      let index = entries
        .iter()
        .position(|e| matches!(e, Entry::Pending(p) if p.id() == id));
      index.map(|i| entries.remove(i))
    };
    match removed {
      Some(Entry::Pending(producer)) => {
        producer.cancel();
        true
      }
      _ => false,
    }
  }

  fn discard_failed(&self, id: ProducerId) -> bool {
    let mut entries = self.entries.borrow_mut();
    let before = entries.len();
    entries.retain(|e| e.producer_id() != Some(id));
    let discarded = entries.len() != before;
    if discarded {
      trace!(?id, "discarded failed producer");
    }
    discarded
  }

  fn contains(&self, value: &T) -> bool {
    self.entries.borrow().iter().any(|e| e.holds(value))
  }

  fn clear(&self) {
    let drained = std::mem::take(&mut *self.entries.borrow_mut());
    for entry in drained {
      if let Entry::Pending(producer) = entry {
        producer.cancel();
      }
    }
  }

  fn cancel_pending(&self, ty: Option<&TypeLineage>) {
    let mut cancelled = Vec::new();
    self.entries.borrow_mut().retain(|entry| match entry {
      Entry::Pending(p) if assignable(ty, p.declared_type()) => {
        cancelled.push(Rc::clone(p));
        false
      }
      Entry::PendingBatch(b) => !assignable(ty, b.declared_type()),
      _ => true,
    });
    for producer in cancelled {
      producer.cancel();
    }
  }

  fn realize_pending(&self, ty: Option<&TypeLineage>) -> Result<()> {
    let selected = self.select(ty);
    if selected.is_empty() {
      return Ok(());
    }
    debug!(
      count = selected.len(),
      element_type = ty.map_or("*", |t| t.name()),
      "realizing pending elements"
    );
    let mut failure = None;
    for producer in selected {
      let outcome = match producer {
        Selected::Single(p) => p.realize(),
        Selected::Batch(b) => self.realize_pending_collection(b.id()),
      };
      if let Err(err) = outcome {
        failure.get_or_insert(err);
      }
    }
    failure.map_or(Ok(()), Err)
  }

  fn realize_pending_collection(&self, id: ProducerId) -> Result<()> {
    let producer = self.entries.borrow().iter().find_map(|e| match e {
      Entry::PendingBatch(b) if b.id() == id => Some(Rc::clone(b)),
      _ => None,
    });
    let Some(producer) = producer else {
      return Ok(());
    };

    let values = match producer.values() {
      Ok(values) => values,
      Err(err) => {
        self.discard_failed(id);
        return Err(err);
      }
    };
    let inserted = {
      let mut entries = self.entries.borrow_mut();
      // Evaluation may have removed or realized the batch already.
      let Some(mut at) = entries.iter().position(|e| e.producer_id() == Some(id)) else {
        return Ok(());
      };
      entries.remove(at);
      let mut inserted = Vec::with_capacity(values.len());
      for value in values {
        if entries.iter().any(|e| e.holds(&value)) {
          continue;
        }
        entries.insert(at, Entry::Realized(value.clone()));
        at += 1;
        inserted.push(value);
      }
      inserted
    };
    debug!(
      count = inserted.len(),
      element_type = producer.declared_type().name(),
      "realized pending batch"
    );

    let on_realize = self.on_realize.borrow().clone();
    if let Some(action) = on_realize {
      for value in &inserted {
        action.execute(value)?;
      }
    }
    Ok(())
  }

  fn on_realize(&self, action: Action<T>) {
    *self.on_realize.borrow_mut() = Some(action);
  }

  fn iter(&self) -> Result<Vec<T>> {
    self.realize_pending(None)?;
    Ok(self.iter_no_flush())
  }

  fn iter_no_flush(&self) -> Vec<T> {
    self
      .entries
      .borrow()
      .iter()
      .filter_map(|e| match e {
        Entry::Realized(v) => Some(v.clone()),
        _ => None,
      })
      .collect()
  }

  fn size(&self) -> Result<usize> {
    let (mut distinct, singles, batches) = {
      let entries = self.entries.borrow();
      let mut distinct = Vec::new();
      let mut singles = 0;
      let mut batches = Vec::new();
      for entry in entries.iter() {
        match entry {
          Entry::Realized(v) => distinct.push(v.clone()),
          Entry::Pending(_) => singles += 1,
          Entry::PendingBatch(b) => batches.push(Rc::clone(b)),
        }
      }
      (distinct, singles, batches)
    };

    let mut failure = None;
    for batch in batches {
      match batch.values() {
        Ok(values) => {
          for value in values {
            if !distinct.contains(&value) {
              distinct.push(value);
            }
          }
        }
        Err(err) => {
          self.discard_failed(batch.id());
          failure.get_or_insert(err);
        }
      }
    }
    match failure {
      Some(err) => Err(err),
      None => Ok(distinct.len() + singles),
    }
  }

  fn estimated_size(&self) -> usize {
    self.entries.borrow().len()
  }

  fn is_empty(&self) -> Result<bool> {
    if self.constant_time_is_empty() {
      return Ok(true);
    }
    Ok(self.size()? == 0)
  }

  fn constant_time_is_empty(&self) -> bool {
    self.entries.borrow().is_empty()
  }

  fn pending_count(&self, ty: Option<&TypeLineage>) -> usize {
    self
      .entries
      .borrow()
      .iter()
      .filter_map(|e| e.declared_type())
      .filter(|declared| ty.is_none_or(|ty| ty.overlaps(declared)))
      .count()
  }

  fn mutation_guard(&self) -> Rc<MutationGuard> {
    Rc::clone(&self.guard)
  }
}
