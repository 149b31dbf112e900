//! tess-store
//!
//! Interval store adapters behind one contract, [`IntervalStore`]:
//! - [`DocumentStore`]: one JSON document per photometer, persisted as an export file
//! - [`PgStore`]: the relational store (`interval_records` table) via sqlx
//!
//! Both adapters enforce the same write rules (single Current record, no
//! duplicate `valid_since`, close not before the Current record starts) so the
//! engine sees identical behaviour whichever store is primary.

mod adapter;
mod document;
mod pg;
mod rules;

pub use adapter::{IntervalStore, StoreKind};
pub use document::{DocumentExport, DocumentStore, PhotometerDocument};
pub use pg::{connect_from_env, connect_url, migrate, status, DbStatus, PgStore, ENV_DB_URL};
