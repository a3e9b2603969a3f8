//! Service layer for cchelper-storage
//!
//! Services hold the business rules between a caller (the CLI here, a
//! request layer elsewhere) and the repositories. Each service wraps
//! database operations with:
//! - Input validation and normalization
//! - Cross-entity checks (kinds, parents, dependents)
//! - Event emission for audit logging
//! - Transaction boundaries
//!
//! ## Architecture
//!
//! ```text
//! CLI / request handlers
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod category_service;
pub mod content_service;
pub mod breaking_news_service;
pub mod guide_service;

// Re-exports
pub use events::{spawn_logging_listener, EventBus, EventListener, StorageEvent};
pub use category_service::{CategoryService, CategoryTreeNode};
pub use content_service::{
    ContentService, CreateContentInput, CreatedContent, SearchResults, UpdateContentInput,
};
pub use breaking_news_service::BreakingNewsService;
pub use guide_service::{GuideService, GuideTreeNode};

use std::sync::Arc;

use crate::config::Config;
use crate::db::CatalogDb;

/// Service container for dependency injection
///
/// Holds all services over one shared database and event bus.
pub struct Services {
    pub categories: Arc<CategoryService>,
    pub content: Arc<ContentService>,
    pub breaking_news: Arc<BreakingNewsService>,
    pub guide: Arc<GuideService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(db: Arc<CatalogDb>, config: &Config) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            categories: Arc::new(CategoryService::new(
                db.clone(),
                events.clone(),
                config.reject_duplicate_category_names,
            )),
            content: Arc::new(ContentService::new(
                db.clone(),
                events.clone(),
                config.slug_conflict_retries,
            )),
            breaking_news: Arc::new(BreakingNewsService::new(db.clone(), events.clone())),
            guide: Arc::new(GuideService::new(db, events.clone())),
            events,
        }
    }
}
