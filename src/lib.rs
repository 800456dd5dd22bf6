//! # bookshelf-api
//!
//! A books and authors REST API with cached, tag-invalidated listings and
//! `Accept`-header API versioning.
//!
//! ## Features
//!
//! - **Tagged list cache:** paginated listings are serialized once per
//!   `(endpoint, page, limit)` and dropped by tag when either resource changes
//! - **Pluggable backends:** in-memory by default, memcached behind the
//!   `memcached` feature
//! - **Versioned responses:** `Accept: application/json; version=2.0` selects
//!   which fields a book exposes
//! - **Role guard:** creating books requires `ROLE_ADMIN`
//!
//! ## Quick Start
//!
//! ```ignore
//! use bookshelf_api::{api, AppConfig};
//!
//! let config = AppConfig::load()?;
//! let state = api::AppState::from_config(&config).await?;
//! let app = api::router(state);
//!
//! let listener = tokio::net::TcpListener::bind(config.server.address).await?;
//! axum::serve(listener, app).await?;
//! ```

#[macro_use]
extern crate log;

pub mod api;
pub mod auth;
pub mod backend;
pub mod builder;
pub mod config;
pub mod entity;
pub mod error;
pub mod expander;
pub mod gateway;
pub mod key;
pub mod observability;
pub mod repository;
pub mod serialization;
pub mod store;
pub mod url;
pub mod validation;
pub mod versioning;
pub mod view;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use builder::CacheOperationBuilder;
pub use crate::config::AppConfig;
pub use entity::{Author, Book, Entity};
pub use error::{Error, Result};
pub use expander::CacheExpander;
pub use gateway::QueryGateway;
pub use repository::DataRepository;
pub use store::MemoryStore;
pub use versioning::VersionResolver;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
