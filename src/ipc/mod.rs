pub mod error;
pub(crate) mod handlers;
pub(crate) mod helpers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
