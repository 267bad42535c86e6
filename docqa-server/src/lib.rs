//! `docqa-server` exposes a [`docqa_rag::RagPipeline`] over HTTP.
//! It indexes documents with `POST /index` and answers questions with `POST /query`.

pub mod config;
pub mod protocol;
pub mod server;
pub mod telemetry;

pub use config::{ConfigError, LogFormat, ServiceConfig};
pub use server::{AppState, app_router, build_pipeline, run_server};
pub use telemetry::init_tracing;
