//! Shunt - Control API
//!
//! The HTTP control plane over the routing rules. Built on Axum; no
//! authentication and no TLS - the API is meant for trusted operator
//! networks only.
//!
//! # Endpoints
//!
//! - `GET /rules` - the persisted rules document
//! - `POST /rules` - merge a desired document into the routing table and
//!   the persisted file; succeeds only when both stages succeed
//! - `GET /health` - control-plane liveness
//!
//! # Errors
//!
//! Failures are reported as structured JSON naming the stage that failed:
//!
//! ```json
//! { "code": 500, "stage": "routing", "message": "failed to compile rule pattern '(['..." }
//! ```

mod error;
mod routes;


pub use error::ApiError;
pub use routes::{AppState, build_router, serve};
