//! Client side of the portal: HTTP API wrapper, session storage and
//! role-gated routing.

pub mod api;
pub mod routes;
pub mod session;

pub use api::{ApiClient, ClientError};
pub use routes::{dashboard_for, resolve, Route};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
