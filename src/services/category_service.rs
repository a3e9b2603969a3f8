//! Category service - business logic for the category forest
//!
//! Wraps the category repository with name normalization, the
//! parent-kind check, the optional sibling duplicate policy and
//! dependency checks on delete.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::db::categories::{self, CategoryIndex, CategoryRow, NewCategory};
use crate::db::{content_items, CatalogDb, ContentKind};
use crate::error::{db_err, StorageError};
use crate::text::require_name;

use super::events::{EventBus, StorageEvent};

/// Category with its children, as rendered by [`CategoryService::tree`]
#[derive(Debug, Clone, Serialize)]
pub struct CategoryTreeNode {
    #[serde(flatten)]
    pub category: CategoryRow,
    pub children: Vec<CategoryTreeNode>,
}

/// Category service for business logic
pub struct CategoryService {
    db: Arc<CatalogDb>,
    events: Arc<EventBus>,
    reject_duplicate_names: bool,
}

impl CategoryService {
    pub fn new(db: Arc<CatalogDb>, events: Arc<EventBus>, reject_duplicate_names: bool) -> Self {
        Self {
            db,
            events,
            reject_duplicate_names,
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, id: i64) -> Result<CategoryRow, StorageError> {
        self.db
            .with_conn(|conn| categories::get_category(conn, id))?
            .ok_or_else(|| StorageError::NotFound(format!("category {}", id)))
    }

    /// Roots when `parent_id` is `None`, otherwise direct children
    pub fn list_by_parent(
        &self,
        kind: ContentKind,
        parent_id: Option<i64>,
    ) -> Result<Vec<CategoryRow>, StorageError> {
        self.db
            .with_conn(|conn| categories::list_by_parent(conn, kind, parent_id))
    }

    pub fn list_all(&self, kind: ContentKind) -> Result<Vec<CategoryRow>, StorageError> {
        self.db.with_conn(|conn| categories::list_by_kind(conn, kind))
    }

    /// `"Root / Child / Leaf"` for one category
    pub fn build_path_string(&self, id: i64) -> Result<String, StorageError> {
        self.db.with_conn(|conn| categories::category_path(conn, id))
    }

    /// Path of every category of `kind`, from a single query.
    ///
    /// Nodes whose chain is broken or cyclic are left out and logged.
    pub fn paths_for_kind(&self, kind: ContentKind) -> Result<HashMap<i64, String>, StorageError> {
        let rows = self.list_all(kind)?;
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let index = CategoryIndex::from_rows(rows);

        let mut paths = HashMap::with_capacity(ids.len());
        for id in ids {
            match index.path(id) {
                Ok(path) => {
                    paths.insert(id, path);
                }
                Err(e) => warn!(id, error = %e, "Skipping category with unresolvable path"),
            }
        }
        Ok(paths)
    }

    /// Whole forest of `kind`, children in display order
    pub fn tree(&self, kind: ContentKind) -> Result<Vec<CategoryTreeNode>, StorageError> {
        let index = self
            .db
            .with_conn(|conn| CategoryIndex::load(conn, kind))?;
        Ok(build_tree(&index, None))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a category and return its id
    pub fn create(
        &self,
        kind: ContentKind,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<i64, StorageError> {
        let name = require_name(name, "name")?;

        let id = self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;

            if let Some(parent_id) = parent_id {
                let parent = categories::get_category(&tx, parent_id)?.ok_or_else(|| {
                    StorageError::NotFound(format!("parent category {}", parent_id))
                })?;
                if parent.kind != kind {
                    return Err(StorageError::InvalidInput(
                        "parent category kind mismatch".into(),
                    ));
                }
            }

            self.check_sibling_name(&tx, kind, parent_id, &name, None)?;

            let id = categories::insert_category(
                &tx,
                &NewCategory {
                    kind,
                    name: name.clone(),
                    parent_id,
                },
            )?;
            tx.commit().map_err(db_err("Failed to commit"))?;
            Ok(id)
        })?;

        info!(id, kind = %kind, name = %name, parent_id = ?parent_id, "Created category");
        self.events.emit(StorageEvent::CategoryCreated { id, kind, name });

        Ok(id)
    }

    /// Rename a category in place
    pub fn rename(&self, id: i64, name: &str) -> Result<(), StorageError> {
        let name = require_name(name, "name")?;

        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;
            let existing = categories::get_category(&tx, id)?
                .ok_or_else(|| StorageError::NotFound(format!("category {}", id)))?;

            self.check_sibling_name(&tx, existing.kind, existing.parent_id, &name, Some(id))?;

            categories::rename_category(&tx, id, &name)?;
            tx.commit().map_err(db_err("Failed to commit"))
        })?;

        self.events.emit(StorageEvent::CategoryRenamed { id, name });
        Ok(())
    }

    /// Delete a category with no children and no content filed under it
    pub fn delete(&self, id: i64) -> Result<(), StorageError> {
        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;

            if categories::get_category(&tx, id)?.is_none() {
                return Err(StorageError::NotFound(format!("category {}", id)));
            }

            let children = categories::count_children(&tx, id)?;
            if children > 0 {
                return Err(StorageError::Constraint(format!(
                    "category {} has {} child categories",
                    id, children
                )));
            }

            let items = content_items::count_in_category(&tx, id)?;
            if items > 0 {
                return Err(StorageError::Constraint(format!(
                    "category {} has {} content items",
                    id, items
                )));
            }

            categories::delete_category(&tx, id)?;
            tx.commit().map_err(db_err("Failed to commit"))
        })?;

        info!(id, "Deleted category");
        self.events.emit(StorageEvent::CategoryDeleted { id });
        Ok(())
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn check_sibling_name(
        &self,
        conn: &rusqlite::Connection,
        kind: ContentKind,
        parent_id: Option<i64>,
        name: &str,
        exclude_id: Option<i64>,
    ) -> Result<(), StorageError> {
        if !self.reject_duplicate_names {
            return Ok(());
        }
        if categories::find_sibling_by_name(conn, kind, parent_id, name, exclude_id)?.is_some() {
            return Err(StorageError::Duplicate(format!(
                "category '{}' already exists here",
                name
            )));
        }
        Ok(())
    }
}

fn build_tree(index: &CategoryIndex, parent_id: Option<i64>) -> Vec<CategoryTreeNode> {
    index
        .children_of(parent_id)
        .iter()
        .filter_map(|id| index.get(*id))
        .map(|category| CategoryTreeNode {
            category: category.clone(),
            children: build_tree(index, Some(category.id)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(reject_duplicates: bool) -> CategoryService {
        let db = Arc::new(CatalogDb::open_in_memory().unwrap());
        CategoryService::new(db, Arc::new(EventBus::new()), reject_duplicates)
    }

    #[test]
    fn test_create_trims_and_rejects_blank() {
        let svc = service(true);
        let id = svc.create(ContentKind::Product, "  Kredit   Usaha ", None).unwrap();
        assert_eq!(svc.get(id).unwrap().name, "Kredit Usaha");

        let err = svc.create(ContentKind::Product, "   ", None).unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[test]
    fn test_create_checks_parent() {
        let svc = service(true);
        let script_root = svc.create(ContentKind::Script, "Salam", None).unwrap();

        let err = svc
            .create(ContentKind::Product, "KGB", Some(script_root))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)), "got {:?}", err);

        let err = svc.create(ContentKind::Product, "KGB", Some(404)).unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(svc.list_all(ContentKind::Product).unwrap().len(), 0);
    }

    #[test]
    fn test_duplicate_sibling_policy() {
        let strict = service(true);
        let root = strict.create(ContentKind::Product, "Kredit", None).unwrap();
        strict.create(ContentKind::Product, "KGB", Some(root)).unwrap();
        let err = strict.create(ContentKind::Product, "kgb", Some(root)).unwrap_err();
        assert!(err.is_duplicate());
        // Same name under a different parent is fine
        strict.create(ContentKind::Product, "KGB", None).unwrap();

        let relaxed = service(false);
        relaxed.create(ContentKind::Product, "Kredit", None).unwrap();
        relaxed.create(ContentKind::Product, "Kredit", None).unwrap();
    }

    #[test]
    fn test_duplicate_sibling_check_folds_accents_case() {
        let svc = service(true);
        svc.create(ContentKind::Product, "Émas", None).unwrap();
        let err = svc.create(ContentKind::Product, "émas", None).unwrap_err();
        assert!(err.is_duplicate());
        assert!(svc
            .create(ContentKind::Product, "ÜBER", None)
            .and_then(|_| svc.create(ContentKind::Product, "über", None))
            .unwrap_err()
            .is_duplicate());
    }

    #[test]
    fn test_rename_keeps_own_name_and_rejects_sibling_clash() {
        let svc = service(true);
        let a = svc.create(ContentKind::Product, "Tabungan", None).unwrap();
        svc.create(ContentKind::Product, "Giro", None).unwrap();

        svc.rename(a, "TABUNGAN").unwrap();
        assert_eq!(svc.get(a).unwrap().name, "TABUNGAN");

        assert!(svc.rename(a, "giro").unwrap_err().is_duplicate());
        assert!(svc.rename(999, "x").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_rejects_node_with_children() {
        let svc = service(true);
        let root = svc.create(ContentKind::Product, "Kredit", None).unwrap();
        let leaf = svc.create(ContentKind::Product, "KGB", Some(root)).unwrap();

        let err = svc.delete(root).unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)));

        svc.delete(leaf).unwrap();
        svc.delete(root).unwrap();
        assert!(svc.delete(root).unwrap_err().is_not_found());
    }

    #[test]
    fn test_tree_and_paths() {
        let svc = service(true);
        let root = svc.create(ContentKind::Product, "Informasi", None).unwrap();
        let mid = svc.create(ContentKind::Product, "Kredit", Some(root)).unwrap();
        let leaf = svc.create(ContentKind::Product, "KGB", Some(mid)).unwrap();
        svc.create(ContentKind::Product, "Dana", None).unwrap();

        let tree = svc.tree(ContentKind::Product).unwrap();
        let roots: Vec<_> = tree.iter().map(|n| n.category.name.as_str()).collect();
        assert_eq!(roots, vec!["Dana", "Informasi"]);
        assert_eq!(tree[1].children[0].children[0].category.id, leaf);

        let paths = svc.paths_for_kind(ContentKind::Product).unwrap();
        assert_eq!(paths[&leaf], "Informasi / Kredit / KGB");
        assert_eq!(svc.build_path_string(leaf).unwrap(), paths[&leaf]);
    }

    #[tokio::test]
    async fn test_create_emits_event() {
        let svc = service(true);
        let mut rx = svc.events.subscribe();
        let id = svc.create(ContentKind::Script, "Salam", None).unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            StorageEvent::CategoryCreated {
                id,
                kind: ContentKind::Script,
                name: "Salam".into(),
            }
        );
    }
}
