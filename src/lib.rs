//! BlogSphere: descriptor-driven REST backend for categories, posts, series, users and roles.

pub mod config;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{builtin_config, load_from_path, resolve, Deployment, ModelConfig, ResolvedModel};
pub use error::{AppError, ConfigError};
pub use migration::apply_migrations;
pub use routes::app;
pub use service::{CrudService, RequestValidator};
pub use settings::{Settings, StorageBackend};
pub use state::AppState;
pub use store::{connect, MemoryStore, PgStore, Store};
