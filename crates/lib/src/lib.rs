//! kiln-lib: Domain object collections for kiln
//!
//! This crate provides the live, lazily populated collections that kiln
//! build scripts declare their configuration objects into:
//! - `DomainObjectCollection`: ordered collection with add/remove events and filtered views
//! - `DeferredElement`: handle to an element created on first use
//! - `ElementSource`: ordered storage of realized elements and pending producers
//! - `EventRegister`: eager and lazy add subscribers, remove subscribers
//! - `MutationGuard`: rejects structural changes made from inside guarded callbacks

pub mod action;
pub mod collection;
mod error;
pub mod events;
pub mod guard;
pub mod source;
pub mod types;

pub use action::{Action, ActionSet, CallbackDecorator, NoopDecorator, TracingDecorator};
pub use collection::{CollectionConfig, CollectionIter, CollectionSummary, DeferredElement, DomainObjectCollection};
pub use error::{CollectionError, Result};
pub use types::{Element, Subtype, TypeLineage};
