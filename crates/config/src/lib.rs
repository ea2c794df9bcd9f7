//! Shunt - Configuration
//!
//! The routing rules document, backend node identities, and the JSON file
//! persistence behind the control plane's merge-write semantics.
//!
//! # Document Shape
//!
//! ```json
//! {
//!   "rules": {
//!     "^frontend\\.": [
//!       { "host": "statsd-1.internal", "port": 8125, "mgmt_port": 8126 }
//!     ]
//!   }
//! }
//! ```
//!
//! Writes are merge-only: new patterns are added and new nodes appended,
//! existing entries are never removed.

mod error;
mod node;
mod rules;

pub use error::{ConfigError, Result};
pub use node::NodeSpec;
pub use rules::{RulesDocument, RulesStore};
