//! Shunt - Routing
//!
//! The routing table maps regex rule patterns to ordered backend lists
//! and owns the canonical backend registry keyed by identity triple.
//!
//! # Publication Discipline
//!
//! The table is many-reader / rare-writer. Readers take a snapshot
//! through an [`arc_swap::ArcSwap`] load - no locks on the hot path - and
//! writers build a new snapshot under an async update lock before
//! swapping it in. A reader therefore observes either the pre-update
//! table or a superset of it, never a torn append.
//!
//! # Merge-Only Updates
//!
//! [`RoutingTable::update`] only ever extends the table: unknown patterns
//! are added, unknown backends are constructed and registered, and
//! backends missing from a rule's list are appended. Nothing is removed;
//! backends that fall out of use keep running until global shutdown.

mod error;
mod table;


pub use error::{Result, RoutingError};
pub use table::{RoutingTable, Rule, TableSnapshot};
