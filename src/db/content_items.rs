//! Content item (product / script) CRUD operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::models::{ContentBlock, ContentKind};
use crate::error::{db_err, StorageError};

/// Content item row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItemRow {
    pub id: i64,
    pub kind: ContentKind,
    pub slug: String,
    pub title: String,
    pub category_id: i64,
    pub blocks: Vec<ContentBlock>,
    pub created_at: String,
    pub updated_at: String,
    /// Root-to-leaf category names, filled in by the service layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_path: Option<String>,
}

impl ContentItemRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let blocks_json: String = row.get("blocks_json")?;
        let blocks = serde_json::from_str(&blocks_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

        Ok(Self {
            id: row.get("id")?,
            kind: row.get("kind")?,
            slug: row.get("slug")?,
            title: row.get("title")?,
            category_id: row.get("category_id")?,
            blocks,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            category_path: None,
        })
    }
}

/// Column values written on insert and update
#[derive(Debug, Clone)]
pub struct ItemWrite<'a> {
    pub kind: ContentKind,
    pub slug: &'a str,
    pub title: &'a str,
    pub category_id: i64,
    pub blocks: &'a [ContentBlock],
}

/// Query parameters for listing content items
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentQuery {
    pub kind: ContentKind,
    /// Case-insensitive substring over title, category name and block text
    #[serde(default, alias = "q")]
    pub search: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    /// Widen `category_id` to the whole subtree below it
    #[serde(default)]
    pub include_descendants: bool,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

impl ContentQuery {
    pub fn new(kind: ContentKind) -> Self {
        Self {
            kind,
            search: None,
            category_id: None,
            include_descendants: false,
            limit: None,
            offset: 0,
        }
    }
}

const SELECT_ITEM: &str = "SELECT i.id, i.kind, i.slug, i.title, i.category_id, i.blocks_json,
            i.created_at, i.updated_at
     FROM content_items i";

/// Insert a content item and return its id
pub fn insert_item(conn: &Connection, item: &ItemWrite<'_>) -> Result<i64, StorageError> {
    let blocks_json = serde_json::to_string(item.blocks)?;
    let now = super::now();
    conn.execute(
        "INSERT INTO content_items (kind, slug, title, category_id, blocks_json, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![item.kind, item.slug, item.title, item.category_id, blocks_json, now, now],
    )
    .map_err(db_err("Insert content item failed"))?;

    Ok(conn.last_insert_rowid())
}

/// Overwrite a content item; returns false when the id does not exist
pub fn update_item(conn: &Connection, id: i64, item: &ItemWrite<'_>) -> Result<bool, StorageError> {
    let blocks_json = serde_json::to_string(item.blocks)?;
    let changes = conn
        .execute(
            "UPDATE content_items
             SET kind = ?, slug = ?, title = ?, category_id = ?, blocks_json = ?, updated_at = ?
             WHERE id = ?",
            params![
                item.kind,
                item.slug,
                item.title,
                item.category_id,
                blocks_json,
                super::now(),
                id
            ],
        )
        .map_err(db_err("Update content item failed"))?;
    Ok(changes > 0)
}

/// Delete a content item by ID
pub fn delete_item(conn: &Connection, id: i64) -> Result<bool, StorageError> {
    let changes = conn
        .execute("DELETE FROM content_items WHERE id = ?", params![id])
        .map_err(db_err("Delete content item failed"))?;
    Ok(changes > 0)
}

/// Get content item by ID
pub fn get_item(conn: &Connection, id: i64) -> Result<Option<ContentItemRow>, StorageError> {
    conn.query_row(
        &format!("{} WHERE i.id = ?", SELECT_ITEM),
        params![id],
        ContentItemRow::from_row,
    )
    .optional()
    .map_err(db_err("Get content item failed"))
}

/// Get content item by `(kind, slug)`
pub fn get_item_by_slug(
    conn: &Connection,
    kind: ContentKind,
    slug: &str,
) -> Result<Option<ContentItemRow>, StorageError> {
    conn.query_row(
        &format!("{} WHERE i.kind = ? AND i.slug = ?", SELECT_ITEM),
        params![kind, slug],
        ContentItemRow::from_row,
    )
    .optional()
    .map_err(db_err("Get content item by slug failed"))
}

/// Id of the item of `kind` currently holding `slug`
pub fn find_slug_owner(
    conn: &Connection,
    kind: ContentKind,
    slug: &str,
) -> Result<Option<i64>, StorageError> {
    conn.query_row(
        "SELECT id FROM content_items WHERE kind = ? AND slug = ?",
        params![kind, slug],
        |row| row.get(0),
    )
    .optional()
    .map_err(db_err("Slug lookup failed"))
}

/// Number of items filed directly under a category
pub fn count_in_category(conn: &Connection, category_id: i64) -> Result<u64, StorageError> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM content_items WHERE category_id = ?",
            params![category_id],
            |row| row.get(0),
        )
        .map_err(db_err("Count content items failed"))?;
    Ok(n as u64)
}

/// List content items of one kind, ordered by case-insensitive title.
///
/// `category_ids` restricts results to those categories when non-empty; the
/// caller decides whether that is one node or a whole subtree.
pub fn list_items(
    conn: &Connection,
    query: &ContentQuery,
    category_ids: &[i64],
) -> Result<Vec<ContentItemRow>, StorageError> {
    let mut sql = format!("{} JOIN categories c ON c.id = i.category_id", SELECT_ITEM);
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];
    let mut conditions = vec!["i.kind = ?".to_string()];
    params.push(Box::new(query.kind));

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push(
            "(fold(i.title) LIKE ? ESCAPE '\\' OR fold(c.name) LIKE ? ESCAPE '\\' OR fold(i.blocks_json) LIKE ? ESCAPE '\\')"
                .to_string(),
        );
        let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
        for _ in 0..3 {
            params.push(Box::new(pattern.clone()));
        }
    }

    if !category_ids.is_empty() {
        let placeholders: Vec<_> = category_ids.iter().map(|_| "?").collect();
        conditions.push(format!("i.category_id IN ({})", placeholders.join(", ")));
        for id in category_ids {
            params.push(Box::new(*id));
        }
    }

    sql.push_str(" WHERE ");
    sql.push_str(&conditions.join(" AND "));
    sql.push_str(" ORDER BY fold(i.title), i.id");

    // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
    sql.push_str(" LIMIT ? OFFSET ?");
    params.push(Box::new(query.limit.map(i64::from).unwrap_or(-1)));
    params.push(Box::new(i64::from(query.offset)));

    debug!("Executing query: {}", sql);

    let mut stmt = conn.prepare(&sql).map_err(db_err("Prepare failed"))?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), ContentItemRow::from_row)
        .map_err(db_err("Query failed"))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(db_err("Row parse failed"))
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
