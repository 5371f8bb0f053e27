pub mod clock;
pub mod dirs;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod server;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: engine::ShareEngine,
}

pub use engine::{CreatedShare, EngineSettings, OpenedShare, ShareEngine};
pub use error::ShareError;
pub use server::{resolve_data_dir, router, run, ServerConfig};
