//! Breaking news service

use std::sync::Arc;

use tracing::info;

use crate::db::breaking_news::{self, BreakingNewsRow};
use crate::db::{content_items, CatalogDb};
use crate::error::StorageError;

use super::events::{EventBus, StorageEvent};

pub struct BreakingNewsService {
    db: Arc<CatalogDb>,
    events: Arc<EventBus>,
}

impl BreakingNewsService {
    pub fn new(db: Arc<CatalogDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    pub fn get(&self, id: i64) -> Result<BreakingNewsRow, StorageError> {
        self.db
            .with_conn(|conn| breaking_news::get_news(conn, id))?
            .ok_or_else(|| StorageError::NotFound(format!("breaking news {}", id)))
    }

    /// Active entries, newest first
    pub fn list_active(&self) -> Result<Vec<BreakingNewsRow>, StorageError> {
        self.db.with_conn(breaking_news::list_active)
    }

    pub fn list_all(&self) -> Result<Vec<BreakingNewsRow>, StorageError> {
        self.db.with_conn(breaking_news::list_all)
    }

    /// Announce an existing item. A blank `title` uses the item's title.
    pub fn create(&self, content_item_id: i64, title: Option<&str>) -> Result<BreakingNewsRow, StorageError> {
        let id = self.db.with_conn(|conn| {
            let item = content_items::get_item(conn, content_item_id)?.ok_or_else(|| {
                StorageError::NotFound(format!("content item {}", content_item_id))
            })?;
            let title = title
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(&item.title);
            breaking_news::insert_news(conn, item.kind, item.id, title)
        })?;

        info!(id, content_item_id, "Created breaking news");
        self.events.emit(StorageEvent::BreakingNewsCreated { id, content_item_id });
        self.get(id)
    }

    pub fn set_active(&self, id: i64, active: bool) -> Result<(), StorageError> {
        if !self.db.with_conn(|conn| breaking_news::set_active(conn, id, active))? {
            return Err(StorageError::NotFound(format!("breaking news {}", id)));
        }
        self.events.emit(StorageEvent::BreakingNewsToggled { id, active });
        Ok(())
    }

    /// Delete an entry; the content item is untouched
    pub fn delete(&self, id: i64) -> Result<(), StorageError> {
        if !self.db.with_conn(|conn| breaking_news::delete_news(conn, id))? {
            return Err(StorageError::NotFound(format!("breaking news {}", id)));
        }
        self.events.emit(StorageEvent::BreakingNewsDeleted { id });
        Ok(())
    }
}
