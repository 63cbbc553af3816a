pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;
pub mod session;
pub mod state;

pub use config::{AppConfig, LoggingConfig, ServerConfig};
pub use error::ApiError;
pub use observability::init_tracing;
pub use server::{ServerBuilder, StratumServer, build_app, router};
pub use session::{CurrentSession, MaybeSession};
pub use state::AppState;
