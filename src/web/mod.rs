//! Web API for Betafarm.
//!
//! JSON endpoints for links, follows and activity timelines, plus the
//! PubSubHubbub callback hubs talk to.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_health_router, create_router};
pub use server::WebServer;
