//! HTTP surface of the CommonTable realtime core.
//!
//! Three kinds of traffic meet here: browsers holding long-lived stream
//! connections (`/sse`), marketplace producers publishing domain events
//! (`/internal/events`), and the offline-first shell pages served as the
//! static fallback. Routing, parameter validation, and error-to-status
//! mapping live in this crate; connection bookkeeping and fan-out live in
//! the `sse` crate underneath.

pub mod controller;
pub mod error;
pub mod params;
pub mod router;
pub mod stream;

pub use error::{Error, Result};
pub use service::AppState;
