//! Content service - business logic for products and scripts
//!
//! Wraps the content item repository with:
//! - category kind checks
//! - slug generation, retried on a storage-level `(kind, slug)` conflict
//! - the optional breaking-news side record on create
//! - category path enrichment on reads

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::categories::{self, CategoryIndex};
use crate::db::content_items::{self, ContentItemRow, ContentQuery, ItemWrite};
use crate::db::{breaking_news, CatalogDb, ContentBlock, ContentKind};
use crate::error::{db_err, StorageError};
use crate::slug::generate_unique_slug;

use super::events::{EventBus, StorageEvent};

/// Input for creating a content item
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContentInput {
    pub kind: ContentKind,
    pub title: String,
    pub category_id: i64,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub is_breaking: bool,
    /// Falls back to the item title when empty
    #[serde(default)]
    pub breaking_title: Option<String>,
}

/// Input for replacing a content item
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContentInput {
    pub kind: ContentKind,
    pub title: String,
    pub category_id: i64,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
}

/// Result of a create. `warnings` lists side records that could not be written.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedContent {
    pub id: i64,
    pub slug: String,
    pub breaking_news_id: Option<i64>,
    pub warnings: Vec<String>,
}

/// Search hits across both kinds
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub products: Vec<ContentItemRow>,
    pub scripts: Vec<ContentItemRow>,
}

/// Content service for business logic
pub struct ContentService {
    db: Arc<CatalogDb>,
    events: Arc<EventBus>,
    slug_conflict_retries: u32,
}

impl ContentService {
    pub fn new(db: Arc<CatalogDb>, events: Arc<EventBus>, slug_conflict_retries: u32) -> Self {
        Self {
            db,
            events,
            slug_conflict_retries,
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get content item by ID, with its category path
    pub fn get(&self, id: i64) -> Result<ContentItemRow, StorageError> {
        self.db.with_conn(|conn| {
            let item = content_items::get_item(conn, id)?
                .ok_or_else(|| StorageError::NotFound(format!("content item {}", id)))?;
            with_category_path(conn, item)
        })
    }

    /// Get content item by `(kind, slug)`, with its category path
    pub fn get_by_slug(&self, kind: ContentKind, slug: &str) -> Result<ContentItemRow, StorageError> {
        self.db.with_conn(|conn| {
            let item = content_items::get_item_by_slug(conn, kind, slug)?
                .ok_or_else(|| StorageError::NotFound(format!("{} '{}'", kind, slug)))?;
            with_category_path(conn, item)
        })
    }

    /// List items of one kind, each carrying its category path.
    ///
    /// Paths come from one category query per call rather than one per item.
    pub fn list(&self, query: &ContentQuery) -> Result<Vec<ContentItemRow>, StorageError> {
        self.db.with_conn(|conn| {
            let index = CategoryIndex::load(conn, query.kind)?;
            let category_ids = match query.category_id {
                Some(id) if query.include_descendants => index.subtree_ids(id),
                Some(id) => vec![id],
                None => Vec::new(),
            };

            let mut items = content_items::list_items(conn, query, &category_ids)?;
            for item in &mut items {
                match index.path(item.category_id) {
                    Ok(path) => item.category_path = Some(path),
                    Err(e) => warn!(id = item.id, error = %e, "Category path unavailable"),
                }
            }
            Ok(items)
        })
    }

    /// Search products and scripts at once
    pub fn search_all(&self, search: &str) -> Result<SearchResults, StorageError> {
        let search = search.trim();
        if search.is_empty() {
            return Err(StorageError::InvalidInput("query is required".into()));
        }

        let run = |kind| {
            let mut query = ContentQuery::new(kind);
            query.search = Some(search.to_string());
            self.list(&query)
        };

        Ok(SearchResults {
            products: run(ContentKind::Product)?,
            scripts: run(ContentKind::Script)?,
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a content item, plus a breaking-news entry when asked.
    ///
    /// The breaking-news entry is best effort: its failure is logged and
    /// reported in `warnings`, the item itself stays created.
    pub fn create(&self, input: CreateContentInput) -> Result<CreatedContent, StorageError> {
        let title = validate_title(&input.title)?;
        validate_blocks(&input.blocks)?;

        let (id, slug) = self.with_slug_retry(|| {
            self.db.with_conn_mut(|conn| {
                let tx = conn
                    .transaction()
                    .map_err(db_err("Failed to begin transaction"))?;

                check_category(&tx, input.category_id, input.kind)?;
                let slug = generate_unique_slug(&tx, input.kind, &title, None);
                let id = content_items::insert_item(
                    &tx,
                    &ItemWrite {
                        kind: input.kind,
                        slug: &slug,
                        title: &title,
                        category_id: input.category_id,
                        blocks: &input.blocks,
                    },
                )?;

                tx.commit().map_err(db_err("Failed to commit"))?;
                Ok((id, slug))
            })
        })?;

        info!(id, kind = %input.kind, slug = %slug, "Created content item");
        self.events.emit(StorageEvent::ContentCreated {
            id,
            kind: input.kind,
            slug: slug.clone(),
        });

        let mut created = CreatedContent {
            id,
            slug,
            breaking_news_id: None,
            warnings: Vec::new(),
        };

        if input.is_breaking {
            let news_title = input
                .breaking_title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(&title);

            match self
                .db
                .with_conn(|conn| breaking_news::insert_news(conn, input.kind, id, news_title))
            {
                Ok(news_id) => {
                    created.breaking_news_id = Some(news_id);
                    self.events.emit(StorageEvent::BreakingNewsCreated {
                        id: news_id,
                        content_item_id: id,
                    });
                }
                Err(e) => {
                    warn!(id, error = %e, "Breaking news entry not created");
                    created
                        .warnings
                        .push(format!("breaking news not created: {}", e));
                }
            }
        }

        Ok(created)
    }

    /// Replace an item's fields and return its (possibly new) slug.
    ///
    /// An unchanged title keeps the current slug.
    pub fn update(&self, id: i64, input: UpdateContentInput) -> Result<String, StorageError> {
        let title = validate_title(&input.title)?;
        validate_blocks(&input.blocks)?;

        let slug = self.with_slug_retry(|| {
            self.db.with_conn_mut(|conn| {
                let tx = conn
                    .transaction()
                    .map_err(db_err("Failed to begin transaction"))?;

                if content_items::get_item(&tx, id)?.is_none() {
                    return Err(StorageError::NotFound(format!("content item {}", id)));
                }
                check_category(&tx, input.category_id, input.kind)?;

                let slug = generate_unique_slug(&tx, input.kind, &title, Some(id));
                content_items::update_item(
                    &tx,
                    id,
                    &ItemWrite {
                        kind: input.kind,
                        slug: &slug,
                        title: &title,
                        category_id: input.category_id,
                        blocks: &input.blocks,
                    },
                )?;
                breaking_news::sync_kind_for_item(&tx, id, input.kind)?;

                tx.commit().map_err(db_err("Failed to commit"))?;
                Ok(slug)
            })
        })?;

        self.events.emit(StorageEvent::ContentUpdated {
            id,
            slug: slug.clone(),
        });
        Ok(slug)
    }

    /// Delete an item not referenced by any breaking-news entry
    pub fn delete(&self, id: i64) -> Result<(), StorageError> {
        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;

            if content_items::get_item(&tx, id)?.is_none() {
                return Err(StorageError::NotFound(format!("content item {}", id)));
            }

            let refs = breaking_news::count_for_item(&tx, id)?;
            if refs > 0 {
                return Err(StorageError::Constraint(format!(
                    "content item {} is referenced by {} breaking news entries",
                    id, refs
                )));
            }

            content_items::delete_item(&tx, id)?;
            tx.commit().map_err(db_err("Failed to commit"))
        })?;

        info!(id, "Deleted content item");
        self.events.emit(StorageEvent::ContentDeleted { id });
        Ok(())
    }

    /// Delete an item together with its breaking-news entries.
    /// Returns how many entries went with it.
    pub fn delete_cascade(&self, id: i64) -> Result<usize, StorageError> {
        let removed = self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;

            if content_items::get_item(&tx, id)?.is_none() {
                return Err(StorageError::NotFound(format!("content item {}", id)));
            }

            let removed = breaking_news::delete_for_item(&tx, id)?;
            content_items::delete_item(&tx, id)?;
            tx.commit().map_err(db_err("Failed to commit"))?;
            Ok(removed)
        })?;

        info!(id, breaking_news = removed, "Deleted content item with breaking news");
        self.events.emit(StorageEvent::ContentDeleted { id });
        Ok(removed)
    }

    /// Run a slug-assigning write, again after a `(kind, slug)` conflict
    fn with_slug_retry<T>(
        &self,
        mut write: impl FnMut() -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut attempt = 0;
        loop {
            match write() {
                Err(e) if e.is_duplicate() && attempt < self.slug_conflict_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Slug conflict on write, regenerating");
                }
                result => return result,
            }
        }
    }
}

fn with_category_path(
    conn: &rusqlite::Connection,
    mut item: ContentItemRow,
) -> Result<ContentItemRow, StorageError> {
    item.category_path = Some(categories::category_path(conn, item.category_id)?);
    Ok(item)
}

/// The category must exist and belong to `kind`
fn check_category(
    conn: &rusqlite::Connection,
    category_id: i64,
    kind: ContentKind,
) -> Result<(), StorageError> {
    let category = categories::get_category(conn, category_id)?
        .ok_or_else(|| StorageError::NotFound(format!("category {}", category_id)))?;
    if category.kind != kind {
        return Err(StorageError::InvalidInput("category kind mismatch".into()));
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<String, StorageError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StorageError::InvalidInput("title is required".into()));
    }
    if title.chars().count() > 500 {
        return Err(StorageError::InvalidInput(
            "title must be <= 500 characters".into(),
        ));
    }
    Ok(title.to_string())
}

fn validate_blocks(blocks: &[ContentBlock]) -> Result<(), StorageError> {
    for (i, block) in blocks.iter().enumerate() {
        match block {
            ContentBlock::Text { text } if text.trim().is_empty() => {
                return Err(StorageError::InvalidInput(format!(
                    "blocks[{}]: text is required",
                    i
                )));
            }
            ContentBlock::Image { image_url, .. } if image_url.trim().is_empty() => {
                return Err(StorageError::InvalidInput(format!(
                    "blocks[{}]: imageUrl is required",
                    i
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewCategory;

    struct Fixture {
        db: Arc<CatalogDb>,
        svc: ContentService,
        product_leaf: i64,
        product_root: i64,
        script_root: i64,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(CatalogDb::open_in_memory().unwrap());
        let (product_root, product_leaf, script_root) = db
            .with_conn(|conn| {
                let insert = |kind, name: &str, parent_id| {
                    categories::insert_category(
                        conn,
                        &NewCategory {
                            kind,
                            name: name.into(),
                            parent_id,
                        },
                    )
                };
                let root = insert(ContentKind::Product, "Kredit", None)?;
                let leaf = insert(ContentKind::Product, "KGB", Some(root))?;
                let script = insert(ContentKind::Script, "Salam", None)?;
                Ok((root, leaf, script))
            })
            .unwrap();

        let svc = ContentService::new(db.clone(), Arc::new(EventBus::new()), 1);
        Fixture {
            db,
            svc,
            product_leaf,
            product_root,
            script_root,
        }
    }

    fn input(kind: ContentKind, title: &str, category_id: i64) -> CreateContentInput {
        CreateContentInput {
            kind,
            title: title.into(),
            category_id,
            blocks: vec![ContentBlock::text("Isi")],
            is_breaking: false,
            breaking_title: None,
        }
    }

    #[test]
    fn test_create_and_get_by_slug_with_path() {
        let f = fixture();
        let created = f
            .svc
            .create(input(ContentKind::Product, "BJB T Samsat", f.product_leaf))
            .unwrap();
        assert_eq!(created.slug, "bjb-t-samsat");
        assert!(created.warnings.is_empty());

        let item = f.svc.get_by_slug(ContentKind::Product, "bjb-t-samsat").unwrap();
        assert_eq!(item.id, created.id);
        assert_eq!(item.category_path.as_deref(), Some("Kredit / KGB"));
    }

    #[test]
    fn test_kind_mismatch_writes_nothing() {
        let f = fixture();
        let err = f
            .svc
            .create(input(ContentKind::Product, "Salah", f.script_root))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(ref m) if m == "category kind mismatch"));
        assert_eq!(f.db.stats().unwrap().content_item_count, 0);
    }

    #[test]
    fn test_update_slug_stability_and_collision() {
        let f = fixture();
        let a = f
            .svc
            .create(input(ContentKind::Product, "Tabungan", f.product_leaf))
            .unwrap();
        let b = f
            .svc
            .create(input(ContentKind::Product, "Deposito", f.product_leaf))
            .unwrap();

        let update = |title: &str| UpdateContentInput {
            kind: ContentKind::Product,
            title: title.into(),
            category_id: f.product_leaf,
            blocks: vec![],
        };

        assert_eq!(f.svc.update(a.id, update("Tabungan")).unwrap(), "tabungan");
        let moved = f.svc.update(b.id, update("Tabungan")).unwrap();
        assert_eq!(moved, "tabungan-2");
        assert_ne!(moved, a.slug);

        assert!(f.svc.update(999, update("X")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_breaking_news_side_record() {
        let f = fixture();
        let mut with_news = input(ContentKind::Product, "Promo KGB", f.product_leaf);
        with_news.is_breaking = true;
        with_news.breaking_title = Some("  ".into());

        let created = f.svc.create(with_news).unwrap();
        let news_id = created.breaking_news_id.unwrap();
        let news = f
            .db
            .with_conn(|conn| breaking_news::get_news(conn, news_id))
            .unwrap()
            .unwrap();
        assert_eq!(news.title, "Promo KGB");

        // Referenced items are protected until the cascade is asked for
        let err = f.svc.delete(created.id).unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)));
        assert_eq!(f.svc.delete_cascade(created.id).unwrap(), 1);
        assert!(f.svc.get(created.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_breaking_news_failure_is_reported_not_fatal() {
        let f = fixture();
        f.db
            .with_conn(|conn| {
                conn.execute("DROP TABLE breaking_news", [])
                    .map_err(db_err("drop"))
            })
            .unwrap();

        let mut with_news = input(ContentKind::Product, "Promo", f.product_leaf);
        with_news.is_breaking = true;
        let created = f.svc.create(with_news).unwrap();

        assert_eq!(created.breaking_news_id, None);
        assert_eq!(created.warnings.len(), 1);
        assert!(f.svc.get(created.id).is_ok());
    }

    #[test]
    fn test_list_filters_and_enriches() {
        let f = fixture();
        f.svc
            .create(input(ContentKind::Product, "Di Root", f.product_root))
            .unwrap();
        f.svc
            .create(input(ContentKind::Product, "di leaf", f.product_leaf))
            .unwrap();
        f.svc
            .create(input(ContentKind::Script, "Salam Pembuka", f.script_root))
            .unwrap();

        let mut query = ContentQuery::new(ContentKind::Product);
        query.category_id = Some(f.product_root);
        let exact = f.svc.list(&query).unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].category_path.as_deref(), Some("Kredit"));

        query.include_descendants = true;
        let titles: Vec<_> = f
            .svc
            .list(&query)
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(titles, vec!["di leaf", "Di Root"]);

        // Search matches the category name too
        let mut by_category = ContentQuery::new(ContentKind::Product);
        by_category.search = Some("kgb".into());
        assert_eq!(f.svc.list(&by_category).unwrap().len(), 1);

        let mut paged = ContentQuery::new(ContentKind::Product);
        paged.limit = Some(1);
        paged.offset = 1;
        assert_eq!(f.svc.list(&paged).unwrap()[0].title, "Di Root");
    }

    #[test]
    fn test_search_all_splits_by_kind() {
        let f = fixture();
        f.svc
            .create(input(ContentKind::Product, "Salam Produk", f.product_leaf))
            .unwrap();
        f.svc
            .create(input(ContentKind::Script, "Salam Pembuka", f.script_root))
            .unwrap();

        let results = f.svc.search_all("salam").unwrap();
        assert_eq!(results.products.len(), 1);
        // "Salam" is also the script category name
        assert_eq!(results.scripts.len(), 1);

        assert!(matches!(
            f.svc.search_all("  ").unwrap_err(),
            StorageError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_block_validation() {
        let f = fixture();
        let mut bad = input(ContentKind::Product, "Gambar", f.product_leaf);
        bad.blocks = vec![ContentBlock::text("ok"), ContentBlock::image(" ", None)];
        let err = f.svc.create(bad).unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: blocks[1]: imageUrl is required");
    }

    #[test]
    fn test_title_limit_counts_characters() {
        let f = fixture();
        let wide = "あ".repeat(300);
        assert!(wide.len() > 500);
        assert!(f
            .svc
            .create(input(ContentKind::Product, &wide, f.product_leaf))
            .is_ok());

        let long = "a".repeat(501);
        let err = f
            .svc
            .create(input(ContentKind::Product, &long, f.product_leaf))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[test]
    fn test_slug_retry_regenerates_once_then_succeeds() {
        let f = fixture();
        let mut calls = 0;
        let result = f.svc.with_slug_retry(|| {
            calls += 1;
            if calls == 1 {
                Err(StorageError::Duplicate("content_items.kind, content_items.slug".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_slug_retry_gives_up_after_budget() {
        let f = fixture();
        let mut calls = 0;
        let err = f
            .svc
            .with_slug_retry(|| -> Result<(), StorageError> {
                calls += 1;
                Err(StorageError::Duplicate("slug".into()))
            })
            .unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(calls, 2);

        // Zero retries surfaces the first conflict
        let strict = ContentService::new(f.db.clone(), Arc::new(EventBus::new()), 0);
        let mut calls = 0;
        let err = strict
            .with_slug_retry(|| -> Result<(), StorageError> {
                calls += 1;
                Err(StorageError::Duplicate("slug".into()))
            })
            .unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_slug_retry_ignores_other_errors() {
        let f = fixture();
        let mut calls = 0;
        let err = f
            .svc
            .with_slug_retry(|| -> Result<(), StorageError> {
                calls += 1;
                Err(StorageError::Constraint("fk".into()))
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_kind_change_moves_breaking_news() {
        let f = fixture();
        let mut with_news = input(ContentKind::Product, "Promo Salam", f.product_leaf);
        with_news.is_breaking = true;
        let created = f.svc.create(with_news).unwrap();
        let news_id = created.breaking_news_id.unwrap();

        f.svc
            .update(
                created.id,
                UpdateContentInput {
                    kind: ContentKind::Script,
                    title: "Promo Salam".into(),
                    category_id: f.script_root,
                    blocks: vec![],
                },
            )
            .unwrap();

        let news = f
            .db
            .with_conn(|conn| breaking_news::get_news(conn, news_id))
            .unwrap()
            .unwrap();
        assert_eq!(news.kind, ContentKind::Script);
        assert_eq!(news.item_kind, ContentKind::Script);
        assert_eq!(news.item_slug, "promo-salam");
    }
}
