//! Category CRUD operations

use std::collections::{HashMap, HashSet};

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::models::ContentKind;
use crate::error::{db_err, StorageError};

/// Category row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub id: i64,
    pub kind: ContentKind,
    pub name: String,
    pub parent_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl CategoryRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            kind: row.get("kind")?,
            name: row.get("name")?,
            parent_id: row.get("parent_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Input for inserting a category
#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub kind: ContentKind,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

const SELECT_CATEGORY: &str =
    "SELECT id, kind, name, parent_id, created_at, updated_at FROM categories";

/// Insert a category and return its id
pub fn insert_category(conn: &Connection, input: &NewCategory) -> Result<i64, StorageError> {
    let now = super::now();
    conn.execute(
        "INSERT INTO categories (kind, name, parent_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
        params![input.kind, input.name, input.parent_id, now, now],
    )
    .map_err(db_err("Insert category failed"))?;

    Ok(conn.last_insert_rowid())
}

/// Get category by ID
pub fn get_category(conn: &Connection, id: i64) -> Result<Option<CategoryRow>, StorageError> {
    conn.query_row(
        &format!("{} WHERE id = ?", SELECT_CATEGORY),
        params![id],
        CategoryRow::from_row,
    )
    .optional()
    .map_err(db_err("Get category failed"))
}

/// Roots of `kind` when `parent_id` is `None`, otherwise direct children,
/// ordered by case-insensitive name
pub fn list_by_parent(
    conn: &Connection,
    kind: ContentKind,
    parent_id: Option<i64>,
) -> Result<Vec<CategoryRow>, StorageError> {
    debug!(kind = %kind, parent_id = ?parent_id, "Listing categories by parent");
    match parent_id {
        None => query_categories(
            conn,
            &format!(
                "{} WHERE kind = ? AND parent_id IS NULL ORDER BY fold(name), id",
                SELECT_CATEGORY
            ),
            params![kind],
        ),
        Some(parent) => query_categories(
            conn,
            &format!(
                "{} WHERE kind = ? AND parent_id = ? ORDER BY fold(name), id",
                SELECT_CATEGORY
            ),
            params![kind, parent],
        ),
    }
}

/// All categories of a kind, ordered by case-insensitive name
pub fn list_by_kind(conn: &Connection, kind: ContentKind) -> Result<Vec<CategoryRow>, StorageError> {
    query_categories(
        conn,
        &format!("{} WHERE kind = ? ORDER BY fold(name), id", SELECT_CATEGORY),
        params![kind],
    )
}

fn query_categories(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<CategoryRow>, StorageError> {
    let mut stmt = conn.prepare(sql).map_err(db_err("Prepare failed"))?;
    let rows = stmt
        .query_map(params, CategoryRow::from_row)
        .map_err(db_err("Query failed"))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(db_err("Row parse failed"))
}

/// Find a sibling with the same name (case-insensitive), ignoring `exclude_id`
pub fn find_sibling_by_name(
    conn: &Connection,
    kind: ContentKind,
    parent_id: Option<i64>,
    name: &str,
    exclude_id: Option<i64>,
) -> Result<Option<i64>, StorageError> {
    conn.query_row(
        "SELECT id FROM categories
         WHERE kind = ? AND parent_id IS ? AND fold(name) = fold(?) AND id IS NOT ?
         LIMIT 1",
        params![kind, parent_id, name, exclude_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(db_err("Sibling lookup failed"))
}

/// Rename a category; returns false when the id does not exist
pub fn rename_category(conn: &Connection, id: i64, name: &str) -> Result<bool, StorageError> {
    let changes = conn
        .execute(
            "UPDATE categories SET name = ?, updated_at = ? WHERE id = ?",
            params![name, super::now(), id],
        )
        .map_err(db_err("Rename category failed"))?;
    Ok(changes > 0)
}

/// Delete a category by ID
pub fn delete_category(conn: &Connection, id: i64) -> Result<bool, StorageError> {
    let changes = conn
        .execute("DELETE FROM categories WHERE id = ?", params![id])
        .map_err(db_err("Delete category failed"))?;
    Ok(changes > 0)
}

/// Number of direct children
pub fn count_children(conn: &Connection, id: i64) -> Result<u64, StorageError> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM categories WHERE parent_id = ?",
            params![id],
            |row| row.get(0),
        )
        .map_err(db_err("Count children failed"))?;
    Ok(n as u64)
}

/// Render the ancestor chain of `id` as `"Root / Child / Leaf"`.
///
/// Walks one lookup per level. A missing link yields `NotFound`, a revisited
/// node yields `Constraint`.
pub fn category_path(conn: &Connection, id: i64) -> Result<String, StorageError> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut next = Some(id);

    while let Some(current_id) = next {
        if !seen.insert(current_id) {
            return Err(StorageError::Constraint(format!(
                "category cycle detected at {}",
                current_id
            )));
        }
        let current = get_category(conn, current_id)?.ok_or_else(|| {
            StorageError::NotFound(format!("category {}", current_id))
        })?;
        names.push(current.name);
        next = current.parent_id;
    }

    names.reverse();
    Ok(names.join(" / "))
}

/// In-memory view of one kind's categories, keyed by id
///
/// Built from a single `list_by_kind` query so paths and subtrees can be
/// computed for many nodes without a round trip per ancestor.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    nodes: HashMap<i64, CategoryRow>,
    children: HashMap<Option<i64>, Vec<i64>>,
}

impl CategoryIndex {
    pub fn load(conn: &Connection, kind: ContentKind) -> Result<Self, StorageError> {
        Ok(Self::from_rows(list_by_kind(conn, kind)?))
    }

    /// Rows are expected in display order; children keep that order.
    pub fn from_rows(rows: Vec<CategoryRow>) -> Self {
        let mut index = Self::default();
        for row in rows {
            index.children.entry(row.parent_id).or_default().push(row.id);
            index.nodes.insert(row.id, row);
        }
        index
    }

    pub fn get(&self, id: i64) -> Option<&CategoryRow> {
        self.nodes.get(&id)
    }

    pub fn children_of(&self, parent_id: Option<i64>) -> &[i64] {
        self.children
            .get(&parent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Same rendering and failure modes as [`category_path`]
    pub fn path(&self, id: i64) -> Result<String, StorageError> {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id);

        while let Some(current_id) = next {
            if !seen.insert(current_id) {
                return Err(StorageError::Constraint(format!(
                    "category cycle detected at {}",
                    current_id
                )));
            }
            let current = self
                .get(current_id)
                .ok_or_else(|| StorageError::NotFound(format!("category {}", current_id)))?;
            names.push(current.name.as_str());
            next = current.parent_id;
        }

        names.reverse();
        Ok(names.join(" / "))
    }

    /// `id` plus every node below it
    pub fn subtree_ids(&self, id: i64) -> Vec<i64> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children_of(Some(current)).iter().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CatalogDb;

    fn insert(conn: &Connection, name: &str, parent_id: Option<i64>) -> i64 {
        insert_category(
            conn,
            &NewCategory {
                kind: ContentKind::Product,
                name: name.into(),
                parent_id,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_path_three_levels() {
        let db = CatalogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let root = insert(conn, "Informasi", None);
            let mid = insert(conn, "Kredit", Some(root));
            let leaf = insert(conn, "KGB", Some(mid));

            assert_eq!(category_path(conn, leaf)?, "Informasi / Kredit / KGB");
            assert_eq!(category_path(conn, root)?, "Informasi");

            let index = CategoryIndex::load(conn, ContentKind::Product)?;
            assert_eq!(index.path(leaf)?, "Informasi / Kredit / KGB");
            assert_eq!(index.subtree_ids(mid).len(), 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_path_missing_node() {
        let db = CatalogDb::open_in_memory().unwrap();
        let err = db.with_conn(|conn| category_path(conn, 99)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_path_detects_cycle() {
        let db = CatalogDb::open_in_memory().unwrap();
        let err = db
            .with_conn(|conn| {
                let a = insert(conn, "A", None);
                let b = insert(conn, "B", Some(a));
                conn.execute("UPDATE categories SET parent_id = ? WHERE id = ?", params![b, a])
                    .unwrap();
                category_path(conn, b)
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)));
    }

    #[test]
    fn test_list_by_parent_orders_case_insensitively() {
        let db = CatalogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let root = insert(conn, "Root", None);
            insert(conn, "beta", Some(root));
            insert(conn, "Alpha", Some(root));
            insert(conn, "Other root", None);

            let children = list_by_parent(conn, ContentKind::Product, Some(root))?;
            let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, vec!["Alpha", "beta"]);

            let roots = list_by_parent(conn, ContentKind::Product, None)?;
            assert_eq!(roots.len(), 2);
            assert!(roots.iter().all(|c| c.parent_id.is_none()));

            assert!(list_by_parent(conn, ContentKind::Script, None)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_find_sibling_by_name() {
        let db = CatalogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let root = insert(conn, "Kredit", None);
            let child = insert(conn, "KGB", Some(root));

            assert_eq!(
                find_sibling_by_name(conn, ContentKind::Product, Some(root), "kgb", None)?,
                Some(child)
            );
            assert_eq!(
                find_sibling_by_name(conn, ContentKind::Product, Some(root), "kgb", Some(child))?,
                None
            );
            assert_eq!(
                find_sibling_by_name(conn, ContentKind::Product, None, "KREDIT", None)?,
                Some(root)
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_non_ascii_names_fold_case() {
        let db = CatalogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let emas = insert(conn, "Émas", None);
            insert(conn, "Éz", None);
            insert(conn, "éa", None);

            assert_eq!(
                find_sibling_by_name(conn, ContentKind::Product, None, "émas", None)?,
                Some(emas)
            );

            let roots = list_by_parent(conn, ContentKind::Product, None)?;
            let names: Vec<_> = roots.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, vec!["éa", "Émas", "Éz"]);
            Ok(())
        })
        .unwrap();
    }
}
