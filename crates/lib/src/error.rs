//! Error types for domain object collections.

use std::fmt;

use thiserror::Error;

/// Errors raised by collections, their views, and deferred elements.
///
/// Errors are `Clone` because a deferred element caches its creation failure
/// and hands the same error back on every later resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
  /// Structural mutation attempted while the collection is dispatching a
  /// callback that forbids it.
  #[error("{operation} on {collection} cannot be executed in the current context")]
  IllegalMutation { operation: String, collection: String },

  /// Content mutation on a collection whose contents are read-only.
  #[error("cannot {operation} on {collection}: its contents are read-only")]
  ReadOnlyContents { operation: String, collection: String },

  /// The factory of a deferred element failed. Re-raised on every resolution.
  #[error("could not create domain object ({type_name})")]
  CreationFailed {
    type_name: String,
    #[source]
    source: Box<CollectionError>,
  },

  /// The deferred element was removed from its container.
  #[error("the domain object ({type_name}) for this provider is no longer present in its container")]
  NoLongerPresent { type_name: String },

  /// A factory resolved the element it was in the middle of creating.
  #[error("the domain object ({type_name}) is already being created")]
  CircularRealization { type_name: String },

  /// An element added through a filtered view does not match its filter.
  #[error("cannot add {element} to {collection}: it does not match the collection filter")]
  FilterRejected { element: String, collection: String },

  /// A user callback or factory failed.
  #[error("{message}")]
  Action { message: String },
}

impl CollectionError {
  /// Wraps a failure from user code (a callback or a factory).
  pub fn action(message: impl fmt::Display) -> Self {
    Self::Action {
      message: message.to_string(),
    }
  }

  pub(crate) fn illegal_mutation(operation: &str, collection: &str) -> Self {
    Self::IllegalMutation {
      operation: operation.to_string(),
      collection: collection.to_string(),
    }
  }

  pub(crate) fn creation_failed(type_name: &str, cause: CollectionError) -> Self {
    Self::CreationFailed {
      type_name: type_name.to_string(),
      source: Box::new(cause),
    }
  }
}

/// Result type for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;
