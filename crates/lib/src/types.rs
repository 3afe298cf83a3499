//! Element types and the runtime type relation between collection views.
//!
//! A collection is parameterized by a Rust element type, but views created
//! with `with_type` narrow that type at runtime. [`TypeLineage`] records the
//! chain of element types from a root collection down to a view, which is
//! what pending producers and subscribers are compared by before any value
//! exists to inspect.

use std::any::{TypeId, type_name};
use std::fmt;
use std::rc::Rc;

/// A value that can live in a domain object collection.
///
/// Equality is what the store uses to reject duplicate insertions.
pub trait Element: Clone + PartialEq + fmt::Debug + 'static {}

impl<T: Clone + PartialEq + fmt::Debug + 'static> Element for T {}

/// Narrowing and widening between a collection's element type and a view's.
///
/// Element hierarchies are usually enums; each variant payload that should be
/// addressable through `with_type` implements `Subtype<TheEnum>`. Every type
/// is a subtype of itself.
pub trait Subtype<T>: Sized {
  /// Returns the narrowed value when `value` is an instance of `Self`.
  fn narrow(value: &T) -> Option<Self>;

  /// Converts back into the wider element type.
  fn widen(self) -> T;
}

impl<T: Clone> Subtype<T> for T {
  fn narrow(value: &T) -> Option<Self> {
    Some(value.clone())
  }

  fn widen(self) -> T {
    self
  }
}

/// Runtime identity of an element type.
#[derive(Clone, Copy)]
pub struct ElementType {
  id: TypeId,
  name: &'static str,
}

impl ElementType {
  pub fn of<T: 'static>() -> Self {
    Self {
      id: TypeId::of::<T>(),
      name: simple_name(type_name::<T>()),
    }
  }

  /// Short display name, without the module path.
  pub fn name(&self) -> &'static str {
    self.name
  }
}

impl PartialEq for ElementType {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for ElementType {}

impl fmt::Debug for ElementType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name)
  }
}

impl fmt::Display for ElementType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name)
  }
}

/// Strips the module path from a type name. Generic names are kept whole.
///
/// `my_crate::model::Task` becomes `Task`.
fn simple_name(full: &'static str) -> &'static str {
  if full.contains('<') {
    return full;
  }
  full.rsplit("::").next().unwrap_or(full)
}

/// The chain of element types from a root collection down to a view.
///
/// The last entry is the view's own type. Cloning is cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct TypeLineage {
  chain: Rc<[ElementType]>,
}

impl TypeLineage {
  /// Lineage of a root collection of `T`.
  pub fn root<T: 'static>() -> Self {
    Self {
      chain: Rc::from(vec![ElementType::of::<T>()]),
    }
  }

  /// Lineage of a view narrowed to `S`. Narrowing to the same type (a
  /// predicate-only filter) keeps the lineage unchanged.
  pub fn narrow<S: 'static>(&self) -> Self {
    let next = ElementType::of::<S>();
    if self.leaf() == next {
      return self.clone();
    }
    let mut chain = self.chain.to_vec();
    chain.push(next);
    Self { chain: Rc::from(chain) }
  }

  /// The most specific type in the lineage.
  pub fn leaf(&self) -> ElementType {
    // A lineage is never constructed empty.
    self.chain[self.chain.len() - 1]
  }

  /// Whether something declared with lineage `other` is an instance of this
  /// lineage's leaf type.
  pub fn is_assignable_from(&self, other: &TypeLineage) -> bool {
    let leaf = self.leaf();
    other.chain.iter().any(|ty| *ty == leaf)
  }

  /// Whether either lineage is assignable from the other. A pending producer
  /// declared with a wider type than a view may still produce a value that
  /// view exposes.
  pub fn overlaps(&self, other: &TypeLineage) -> bool {
    self.is_assignable_from(other) || other.is_assignable_from(self)
  }

  pub fn name(&self) -> &'static str {
    self.leaf().name()
  }
}

impl fmt::Debug for TypeLineage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.chain.iter()).finish()
  }
}
