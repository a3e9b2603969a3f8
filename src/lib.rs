//! CC Helper Storage - catalog and guided call-flow storage for call-center agents
//!
//! ## Architecture
//!
//! - **Categories**: one forest per content kind (`product`, `script`),
//!   arbitrary depth, rendered as `"Root / Child / Leaf"` paths
//! - **Content items**: products and scripts filed under one category of
//!   the same kind, addressed by a slug unique per kind
//! - **Breaking news**: announcements pointing at a content item
//! - **Guide**: one forest per main type (`call`, `info`, `request`,
//!   `complaint`) of menu and step nodes
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/cchelper-storage/
//! ├── catalog.db             # SQLite database (WAL mode)
//! └── config.toml            # Configuration
//! ```

pub mod config;
pub mod error;
pub mod text;
pub mod slug;
pub mod db;
pub mod services;
pub mod cli;

// Re-exports
pub use config::Config;
pub use error::StorageError;
pub use db::CatalogDb;
pub use services::Services;
