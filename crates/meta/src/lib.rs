//! Document-type schemas and typed field values.
//!
//! * [`Meta`]: immutable description of one document type's fields and flags
//! * [`Value`]: tagged field value validated against a [`FieldDescriptor`]
//! * [`MetaRegistry`]: process-wide cache of metas with coalesced fetching

#![warn(missing_docs)]

pub mod error;
pub mod field;
pub mod meta;
pub mod registry;
pub mod value;

pub use error::{FieldError, MetaError, Result};
pub use field::{FieldDescriptor, FieldKind};
pub use meta::{Meta, MetaSpec, RESERVED_EVENTS};
pub use registry::{MetaRegistry, MetaSource};
pub use value::{FieldValues, Value};
