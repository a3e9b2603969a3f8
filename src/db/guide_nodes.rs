//! Guided call-flow node storage
//!
//! The sum type [`GuideNodeKind`] is spread over nullable columns on write
//! and reassembled on read. Columns that do not belong to the node's kind are
//! always written as NULL.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::models::{ContentKind, GuideNodeKind, GuideStep, MainType, UiMode};
use crate::error::{db_err, StorageError};

/// Guide node as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideNode {
    pub id: i64,
    pub main_type: MainType,
    pub parent_id: Option<i64>,
    pub label: String,
    pub sort_order: i64,
    #[serde(flatten)]
    pub kind: GuideNodeKind,
    pub created_at: String,
    pub updated_at: String,
}

impl GuideNode {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let node_type: String = row.get("node_type")?;
        let kind = match node_type.as_str() {
            "menu" => GuideNodeKind::Menu {
                ui_mode: row.get::<_, Option<UiMode>>("ui_mode")?,
            },
            "step" => GuideNodeKind::Step(step_from_row(row)?),
            other => return Err(bad_column("node_type", other)),
        };

        Ok(Self {
            id: row.get("id")?,
            main_type: row.get("main_type")?,
            parent_id: row.get("parent_id")?,
            label: row.get("label")?,
            sort_order: row.get("sort_order")?,
            kind,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

fn step_from_row(row: &Row) -> Result<GuideStep, rusqlite::Error> {
    let step_kind: Option<String> = row.get("step_kind")?;
    match step_kind.as_deref() {
        // Rows written before step kinds existed are plain scripts
        None | Some("script") => Ok(GuideStep::Script {
            title: row.get("title")?,
            body: row.get("body")?,
        }),
        Some("input") => Ok(GuideStep::Input {
            key: row.get::<_, Option<String>>("input_key")?.unwrap_or_default(),
            label: row.get("input_label")?,
            placeholder: row.get("input_placeholder")?,
            required: row
                .get::<_, Option<bool>>("input_required")?
                .unwrap_or(false),
        }),
        Some("link") => {
            let kind: Option<ContentKind> = row.get("link_kind")?;
            let kind = kind.ok_or_else(|| bad_column("link_kind", "NULL"))?;
            Ok(GuideStep::Link {
                kind,
                slug: row.get::<_, Option<String>>("link_slug")?.unwrap_or_default(),
            })
        }
        Some(other) => Err(bad_column("step_kind", other)),
    }
}

fn bad_column(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(StorageError::Database(format!(
            "unexpected {} value '{}'",
            column, value
        ))),
    )
}

/// Input for creating or replacing a guide node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideNodeInput {
    pub main_type: MainType,
    #[serde(default)]
    pub parent_id: Option<i64>,
    pub label: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(flatten)]
    pub kind: GuideNodeKind,
}

/// Flat column values for one node kind
#[derive(Default)]
struct KindColumns<'a> {
    ui_mode: Option<UiMode>,
    step_kind: Option<&'static str>,
    title: Option<&'a str>,
    body: Option<&'a str>,
    input_key: Option<&'a str>,
    input_label: Option<&'a str>,
    input_placeholder: Option<&'a str>,
    input_required: Option<bool>,
    link_kind: Option<ContentKind>,
    link_slug: Option<&'a str>,
}

impl<'a> KindColumns<'a> {
    fn from_kind(kind: &'a GuideNodeKind) -> Self {
        match kind {
            GuideNodeKind::Menu { ui_mode } => Self {
                ui_mode: *ui_mode,
                ..Self::default()
            },
            GuideNodeKind::Step(step) => {
                let mut cols = Self {
                    step_kind: Some(step.step_kind()),
                    ..Self::default()
                };
                match step {
                    GuideStep::Script { title, body } => {
                        cols.title = title.as_deref();
                        cols.body = body.as_deref();
                    }
                    GuideStep::Input {
                        key,
                        label,
                        placeholder,
                        required,
                    } => {
                        cols.input_key = Some(key);
                        cols.input_label = label.as_deref();
                        cols.input_placeholder = placeholder.as_deref();
                        cols.input_required = Some(*required);
                    }
                    GuideStep::Link { kind, slug } => {
                        cols.link_kind = Some(*kind);
                        cols.link_slug = Some(slug);
                    }
                }
                cols
            }
        }
    }
}

const SELECT_NODE: &str = "SELECT id, main_type, parent_id, node_type, label, ui_mode, step_kind,
            title, body, input_key, input_label, input_placeholder, input_required,
            link_kind, link_slug, sort_order, created_at, updated_at
     FROM guide_nodes";

/// Insert a node and return its id
pub fn insert_node(conn: &Connection, input: &GuideNodeInput) -> Result<i64, StorageError> {
    let cols = KindColumns::from_kind(&input.kind);
    let now = super::now();
    conn.execute(
        "INSERT INTO guide_nodes (
            main_type, parent_id, node_type, label, ui_mode, step_kind,
            title, body, input_key, input_label, input_placeholder, input_required,
            link_kind, link_slug, sort_order, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            input.main_type,
            input.parent_id,
            input.kind.node_type(),
            input.label,
            cols.ui_mode,
            cols.step_kind,
            cols.title,
            cols.body,
            cols.input_key,
            cols.input_label,
            cols.input_placeholder,
            cols.input_required,
            cols.link_kind,
            cols.link_slug,
            input.sort_order,
            now,
            now,
        ],
    )
    .map_err(db_err("Insert guide node failed"))?;

    Ok(conn.last_insert_rowid())
}

/// Replace every column of a node; returns false when the id does not exist
pub fn update_node(conn: &Connection, id: i64, input: &GuideNodeInput) -> Result<bool, StorageError> {
    let cols = KindColumns::from_kind(&input.kind);
    let changes = conn
        .execute(
            "UPDATE guide_nodes SET
                main_type = ?, parent_id = ?, node_type = ?, label = ?, ui_mode = ?, step_kind = ?,
                title = ?, body = ?, input_key = ?, input_label = ?, input_placeholder = ?,
                input_required = ?, link_kind = ?, link_slug = ?, sort_order = ?, updated_at = ?
             WHERE id = ?",
            params![
                input.main_type,
                input.parent_id,
                input.kind.node_type(),
                input.label,
                cols.ui_mode,
                cols.step_kind,
                cols.title,
                cols.body,
                cols.input_key,
                cols.input_label,
                cols.input_placeholder,
                cols.input_required,
                cols.link_kind,
                cols.link_slug,
                input.sort_order,
                super::now(),
                id,
            ],
        )
        .map_err(db_err("Update guide node failed"))?;
    Ok(changes > 0)
}

/// Delete guide node by ID
pub fn delete_node(conn: &Connection, id: i64) -> Result<bool, StorageError> {
    let changes = conn
        .execute("DELETE FROM guide_nodes WHERE id = ?", params![id])
        .map_err(db_err("Delete guide node failed"))?;
    Ok(changes > 0)
}

/// Get guide node by ID
pub fn get_node(conn: &Connection, id: i64) -> Result<Option<GuideNode>, StorageError> {
    conn.query_row(
        &format!("{} WHERE id = ?", SELECT_NODE),
        params![id],
        GuideNode::from_row,
    )
    .optional()
    .map_err(db_err("Get guide node failed"))
}

/// Roots of `main_type` when `parent_id` is `None`, otherwise direct
/// children, ordered by `(sort_order, label)`
pub fn list_by_parent(
    conn: &Connection,
    main_type: MainType,
    parent_id: Option<i64>,
) -> Result<Vec<GuideNode>, StorageError> {
    debug!(main_type = %main_type, parent_id = ?parent_id, "Listing guide nodes by parent");
    query_nodes(
        conn,
        &format!(
            "{} WHERE main_type = ? AND parent_id IS ? ORDER BY sort_order, fold(label), id",
            SELECT_NODE
        ),
        params![main_type, parent_id],
    )
}

/// Every node of one forest, in sibling display order
pub fn list_by_main_type(conn: &Connection, main_type: MainType) -> Result<Vec<GuideNode>, StorageError> {
    query_nodes(
        conn,
        &format!(
            "{} WHERE main_type = ? ORDER BY sort_order, fold(label), id",
            SELECT_NODE
        ),
        params![main_type],
    )
}

pub fn count_children(conn: &Connection, id: i64) -> Result<u64, StorageError> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM guide_nodes WHERE parent_id = ?",
            params![id],
            |row| row.get(0),
        )
        .map_err(db_err("Count children failed"))?;
    Ok(n as u64)
}

fn query_nodes(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<GuideNode>, StorageError> {
    let mut stmt = conn.prepare(sql).map_err(db_err("Prepare failed"))?;
    let rows = stmt
        .query_map(params, GuideNode::from_row)
        .map_err(db_err("Query failed"))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(db_err("Row parse failed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CatalogDb;

    fn menu(main_type: MainType, parent_id: Option<i64>, label: &str, sort_order: i64) -> GuideNodeInput {
        GuideNodeInput {
            main_type,
            parent_id,
            label: label.into(),
            sort_order,
            kind: GuideNodeKind::Menu { ui_mode: None },
        }
    }

    #[test]
    fn test_step_kinds_round_trip_through_columns() {
        let db = CatalogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let root = insert_node(conn, &menu(MainType::Info, None, "Info", 0))?;
            let steps = [
                GuideStep::Script {
                    title: Some("Salam".into()),
                    body: Some("Selamat pagi".into()),
                },
                GuideStep::Input {
                    key: "nik".into(),
                    label: Some("NIK".into()),
                    placeholder: None,
                    required: true,
                },
                GuideStep::Link {
                    kind: ContentKind::Product,
                    slug: "kgb".into(),
                },
            ];

            for (i, step) in steps.iter().enumerate() {
                let id = insert_node(
                    conn,
                    &GuideNodeInput {
                        main_type: MainType::Info,
                        parent_id: Some(root),
                        label: format!("Step {}", i),
                        sort_order: i as i64,
                        kind: GuideNodeKind::Step(step.clone()),
                    },
                )?;
                let node = get_node(conn, id)?.unwrap();
                assert_eq!(node.kind, GuideNodeKind::Step(step.clone()));
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_legacy_rows_read_with_defaults() {
        let db = CatalogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO guide_nodes (main_type, node_type, label, body, created_at, updated_at)
                 VALUES ('call', 'step', 'Old', 'text', 'x', 'x')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO guide_nodes (main_type, node_type, label, step_kind, input_key, created_at, updated_at)
                 VALUES ('call', 'step', 'Field', 'input', 'hp', 'x', 'x')",
                [],
            )
            .unwrap();

            let nodes = list_by_parent(conn, MainType::Call, None)?;
            assert_eq!(
                nodes[0].kind,
                GuideNodeKind::Step(GuideStep::Input {
                    key: "hp".into(),
                    label: None,
                    placeholder: None,
                    required: false,
                })
            );
            assert_eq!(
                nodes[1].kind,
                GuideNodeKind::Step(GuideStep::Script {
                    title: None,
                    body: Some("text".into()),
                })
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_by_parent_orders_by_sort_order_then_label() {
        let db = CatalogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let root = insert_node(conn, &menu(MainType::Request, None, "Request", 0))?;
            insert_node(conn, &menu(MainType::Request, Some(root), "zeta", 1))?;
            insert_node(conn, &menu(MainType::Request, Some(root), "Beta", 2))?;
            insert_node(conn, &menu(MainType::Request, Some(root), "alpha", 2))?;
            insert_node(conn, &menu(MainType::Complaint, None, "Other forest", 0))?;

            let labels: Vec<_> = list_by_parent(conn, MainType::Request, Some(root))?
                .into_iter()
                .map(|n| n.label)
                .collect();
            assert_eq!(labels, vec!["zeta", "alpha", "Beta"]);

            assert_eq!(list_by_parent(conn, MainType::Request, None)?.len(), 1);
            assert_eq!(count_children(conn, root)?, 3);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_node_json_is_flat() {
        let input: GuideNodeInput = serde_json::from_value(serde_json::json!({
            "main_type": "call",
            "label": "Link KGB",
            "node_type": "step",
            "step_kind": "link",
            "link_kind": "product",
            "link_slug": "kgb"
        }))
        .unwrap();
        assert_eq!(input.parent_id, None);
        assert_eq!(
            input.kind,
            GuideNodeKind::Step(GuideStep::Link {
                kind: ContentKind::Product,
                slug: "kgb".into(),
            })
        );
    }
}
