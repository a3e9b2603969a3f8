//! Breaking news records pointing at content items

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::models::ContentKind;
use crate::error::{db_err, StorageError};

/// Breaking news row, joined with the slug, title and kind of its item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakingNewsRow {
    pub id: i64,
    pub kind: ContentKind,
    pub content_item_id: i64,
    pub title: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub item_slug: String,
    pub item_title: String,
    pub item_kind: ContentKind,
}

impl BreakingNewsRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            kind: row.get("kind")?,
            content_item_id: row.get("content_item_id")?,
            title: row.get("title")?,
            is_active: row.get::<_, i64>("is_active")? != 0,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            item_slug: row.get("item_slug")?,
            item_title: row.get("item_title")?,
            item_kind: row.get("item_kind")?,
        })
    }
}

const SELECT_NEWS: &str = "SELECT n.id, n.kind, n.content_item_id, n.title, n.is_active,
            n.created_at, n.updated_at, i.slug AS item_slug, i.title AS item_title,
            i.kind AS item_kind
     FROM breaking_news n
     JOIN content_items i ON i.id = n.content_item_id";

/// Insert an active entry and return its id
pub fn insert_news(
    conn: &Connection,
    kind: ContentKind,
    content_item_id: i64,
    title: &str,
) -> Result<i64, StorageError> {
    let now = super::now();
    conn.execute(
        "INSERT INTO breaking_news (kind, content_item_id, title, is_active, created_at, updated_at)
         VALUES (?, ?, ?, 1, ?, ?)",
        params![kind, content_item_id, title, now, now],
    )
    .map_err(db_err("Insert breaking news failed"))?;

    Ok(conn.last_insert_rowid())
}

/// Get breaking news entry by ID
pub fn get_news(conn: &Connection, id: i64) -> Result<Option<BreakingNewsRow>, StorageError> {
    conn.query_row(
        &format!("{} WHERE n.id = ?", SELECT_NEWS),
        params![id],
        BreakingNewsRow::from_row,
    )
    .optional()
    .map_err(db_err("Get breaking news failed"))
}

/// Toggle visibility; returns false when the id does not exist
pub fn set_active(conn: &Connection, id: i64, active: bool) -> Result<bool, StorageError> {
    let changes = conn
        .execute(
            "UPDATE breaking_news SET is_active = ?, updated_at = ? WHERE id = ?",
            params![active, super::now(), id],
        )
        .map_err(db_err("Update breaking news failed"))?;
    Ok(changes > 0)
}

/// Delete breaking news entry by ID
pub fn delete_news(conn: &Connection, id: i64) -> Result<bool, StorageError> {
    let changes = conn
        .execute("DELETE FROM breaking_news WHERE id = ?", params![id])
        .map_err(db_err("Delete breaking news failed"))?;
    Ok(changes > 0)
}

/// Remove every entry referencing an item, returning how many went
pub fn delete_for_item(conn: &Connection, content_item_id: i64) -> Result<usize, StorageError> {
    conn.execute(
        "DELETE FROM breaking_news WHERE content_item_id = ?",
        params![content_item_id],
    )
    .map_err(db_err("Delete breaking news for item failed"))
}

/// Follow an item that moved to another kind
pub fn sync_kind_for_item(
    conn: &Connection,
    content_item_id: i64,
    kind: ContentKind,
) -> Result<usize, StorageError> {
    conn.execute(
        "UPDATE breaking_news SET kind = ?, updated_at = ? WHERE content_item_id = ? AND kind != ?",
        params![kind, super::now(), content_item_id, kind],
    )
    .map_err(db_err("Sync breaking news kind failed"))
}

pub fn count_for_item(conn: &Connection, content_item_id: i64) -> Result<u64, StorageError> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM breaking_news WHERE content_item_id = ?",
            params![content_item_id],
            |row| row.get(0),
        )
        .map_err(db_err("Count breaking news failed"))?;
    Ok(n as u64)
}

/// Active entries, newest first
pub fn list_active(conn: &Connection) -> Result<Vec<BreakingNewsRow>, StorageError> {
    query_news(
        conn,
        &format!(
            "{} WHERE n.is_active = 1 ORDER BY n.created_at DESC, n.id DESC",
            SELECT_NEWS
        ),
    )
}

/// Every entry, newest first
pub fn list_all(conn: &Connection) -> Result<Vec<BreakingNewsRow>, StorageError> {
    query_news(
        conn,
        &format!("{} ORDER BY n.created_at DESC, n.id DESC", SELECT_NEWS),
    )
}

fn query_news(conn: &Connection, sql: &str) -> Result<Vec<BreakingNewsRow>, StorageError> {
    let mut stmt = conn.prepare(sql).map_err(db_err("Prepare failed"))?;
    let rows = stmt
        .query_map([], BreakingNewsRow::from_row)
        .map_err(db_err("Query failed"))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(db_err("Row parse failed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::categories::{insert_category, NewCategory};
    use crate::db::content_items::{delete_item, insert_item, ItemWrite};
    use crate::db::CatalogDb;

    fn seed_item(conn: &Connection, slug: &str) -> i64 {
        let category_id = insert_category(
            conn,
            &NewCategory {
                kind: ContentKind::Script,
                name: "Promo".into(),
                parent_id: None,
            },
        )
        .unwrap();
        insert_item(
            conn,
            &ItemWrite {
                kind: ContentKind::Script,
                slug,
                title: "Promo Akhir Tahun",
                category_id,
                blocks: &[],
            },
        )
        .unwrap()
    }

    #[test]
    fn test_insert_list_and_deactivate() {
        let db = CatalogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let item_id = seed_item(conn, "promo");
            let first = insert_news(conn, ContentKind::Script, item_id, "Promo Akhir Tahun")?;
            let second = insert_news(conn, ContentKind::Script, item_id, "Promo diperpanjang")?;

            let active = list_active(conn)?;
            assert_eq!(active.len(), 2);
            assert_eq!(active[0].id, second);
            assert_eq!(active[0].item_slug, "promo");

            assert!(set_active(conn, first, false)?);
            assert_eq!(list_active(conn)?.len(), 1);
            assert_eq!(list_all(conn)?.len(), 2);
            assert!(!get_news(conn, first)?.unwrap().is_active);

            assert!(!set_active(conn, 999, true)?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_referenced_item_cannot_be_deleted() {
        let db = CatalogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let item_id = seed_item(conn, "promo");
            insert_news(conn, ContentKind::Script, item_id, "Promo")?;

            let err = delete_item(conn, item_id).unwrap_err();
            assert!(matches!(err, StorageError::Constraint(_)), "got {:?}", err);

            assert_eq!(count_for_item(conn, item_id)?, 1);
            assert_eq!(delete_for_item(conn, item_id)?, 1);
            assert!(delete_item(conn, item_id)?);
            Ok(())
        })
        .unwrap();
    }
}
