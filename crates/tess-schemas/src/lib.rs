//! tess-schemas
//!
//! Canonical shapes shared by every tess crate:
//! - [`EntityId`]: normalized photometer hardware identifier (MAC)
//! - [`IntervalRecord`]: one version of one attribute with a half-open
//!   validity window `[valid_since, valid_until)`
//! - [`AttributeStream`]: the ordered history of one attribute of one entity
//! - [`Violation`]: an invariant breach found by validation
//! - [`TemporalError`]: the error vocabulary of the engine and adapters
//!
//! Pure data. No IO.

mod entity;
mod error;
mod record;
mod violation;

pub use entity::EntityId;
pub use error::TemporalError;
pub use record::*;
pub use violation::Violation;
