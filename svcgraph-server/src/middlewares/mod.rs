//! Middlewares for the HTTP server.
//!
//! See [`make_app`](crate::server::make_app) for where these middlewares are registered.

mod handle_panic;
mod metrics;
mod trace;

pub use self::handle_panic::*;
pub use self::metrics::*;
pub use self::trace::*;
