//! Guide service - business logic for the guided call-flow forests
//!
//! One forest per [`MainType`]. Menus branch, steps end a branch. Writes
//! check that the declared step kind carries its fields and that the parent
//! is a menu of the same main type.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::db::content_items::{self, ContentItemRow};
use crate::db::guide_nodes::{self, GuideNode, GuideNodeInput};
use crate::db::{categories, CatalogDb, GuideNodeKind, GuideStep, MainType};
use crate::error::{db_err, StorageError};
use crate::text::require_name;

use super::events::{EventBus, StorageEvent};

/// Node with its children, as rendered by [`GuideService::tree`]
#[derive(Debug, Clone, Serialize)]
pub struct GuideTreeNode {
    #[serde(flatten)]
    pub node: GuideNode,
    pub children: Vec<GuideTreeNode>,
}

pub struct GuideService {
    db: Arc<CatalogDb>,
    events: Arc<EventBus>,
}

impl GuideService {
    pub fn new(db: Arc<CatalogDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get_node(&self, id: i64) -> Result<GuideNode, StorageError> {
        self.db
            .with_conn(|conn| guide_nodes::get_node(conn, id))?
            .ok_or_else(|| StorageError::NotFound(format!("guide node {}", id)))
    }

    /// Roots of `main_type` when `parent_id` is `None`, otherwise direct
    /// children, ordered by `(sort_order, label)`
    pub fn list_by_parent(
        &self,
        main_type: MainType,
        parent_id: Option<i64>,
    ) -> Result<Vec<GuideNode>, StorageError> {
        self.db
            .with_conn(|conn| guide_nodes::list_by_parent(conn, main_type, parent_id))
    }

    /// [`Self::list_by_parent`] with the main type given as text
    pub fn list_by_parent_str(
        &self,
        main_type: &str,
        parent_id: Option<i64>,
    ) -> Result<Vec<GuideNode>, StorageError> {
        self.list_by_parent(main_type.parse()?, parent_id)
    }

    /// Whole forest of `main_type`
    pub fn tree(&self, main_type: MainType) -> Result<Vec<GuideTreeNode>, StorageError> {
        let nodes = self
            .db
            .with_conn(|conn| guide_nodes::list_by_main_type(conn, main_type))?;

        let mut children: HashMap<Option<i64>, Vec<GuideNode>> = HashMap::new();
        for node in nodes {
            children.entry(node.parent_id).or_default().push(node);
        }
        Ok(build_tree(&mut children, None))
    }

    /// Labels from the forest root down to `id`, joined by `" / "`
    pub fn breadcrumb(&self, id: i64) -> Result<String, StorageError> {
        self.db.with_conn(|conn| {
            let labels: Vec<String> = ancestors(conn, id)?
                .into_iter()
                .rev()
                .map(|n| n.label)
                .collect();
            Ok(labels.join(" / "))
        })
    }

    /// Content item a link step points at
    pub fn resolve_link(&self, id: i64) -> Result<ContentItemRow, StorageError> {
        let node = self.get_node(id)?;
        let (kind, slug) = match &node.kind {
            GuideNodeKind::Step(GuideStep::Link { kind, slug }) => (*kind, slug.as_str()),
            _ => {
                return Err(StorageError::InvalidInput(format!(
                    "guide node {} is not a link step",
                    id
                )))
            }
        };

        self.db.with_conn(|conn| {
            let mut item = content_items::get_item_by_slug(conn, kind, slug)?
                .ok_or_else(|| StorageError::NotFound(format!("{} '{}'", kind, slug)))?;
            item.category_path = Some(categories::category_path(conn, item.category_id)?);
            Ok(item)
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a node and return its id
    pub fn create_node(&self, input: GuideNodeInput) -> Result<i64, StorageError> {
        let input = validate_node(input)?;

        let id = self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;
            if let Some(parent_id) = input.parent_id {
                check_parent(&tx, parent_id, input.main_type)?;
            }
            let id = guide_nodes::insert_node(&tx, &input)?;
            tx.commit().map_err(db_err("Failed to commit"))?;
            Ok(id)
        })?;

        info!(id, main_type = %input.main_type, node_type = input.kind.node_type(), "Created guide node");
        self.events.emit(StorageEvent::GuideNodeCreated {
            id,
            main_type: input.main_type,
            label: input.label,
        });
        Ok(id)
    }

    /// Replace a node.
    ///
    /// A node with children must stay a menu in the same main type, and
    /// cannot be moved below itself.
    pub fn update_node(&self, id: i64, input: GuideNodeInput) -> Result<(), StorageError> {
        let input = validate_node(input)?;

        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;

            let existing = guide_nodes::get_node(&tx, id)?
                .ok_or_else(|| StorageError::NotFound(format!("guide node {}", id)))?;

            if let Some(parent_id) = input.parent_id {
                check_parent(&tx, parent_id, input.main_type)?;
                if ancestors(&tx, parent_id)?.iter().any(|n| n.id == id) {
                    return Err(StorageError::InvalidInput(
                        "node cannot be moved under itself or its descendants".into(),
                    ));
                }
            }

            if guide_nodes::count_children(&tx, id)? > 0 {
                if !input.kind.is_menu() {
                    return Err(StorageError::Constraint(format!(
                        "guide node {} has children and must stay a menu",
                        id
                    )));
                }
                if input.main_type != existing.main_type {
                    return Err(StorageError::Constraint(format!(
                        "guide node {} has children and cannot change main type",
                        id
                    )));
                }
            }

            guide_nodes::update_node(&tx, id, &input)?;
            tx.commit().map_err(db_err("Failed to commit"))
        })?;

        self.events.emit(StorageEvent::GuideNodeUpdated { id });
        Ok(())
    }

    /// Delete a node without children
    pub fn delete_node(&self, id: i64) -> Result<(), StorageError> {
        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;

            if guide_nodes::get_node(&tx, id)?.is_none() {
                return Err(StorageError::NotFound(format!("guide node {}", id)));
            }
            let children = guide_nodes::count_children(&tx, id)?;
            if children > 0 {
                return Err(StorageError::Constraint(format!(
                    "guide node {} has {} children",
                    id, children
                )));
            }

            guide_nodes::delete_node(&tx, id)?;
            tx.commit().map_err(db_err("Failed to commit"))
        })?;

        info!(id, "Deleted guide node");
        self.events.emit(StorageEvent::GuideNodeDeleted { id });
        Ok(())
    }

    /// Delete a node and everything below it; returns the number of nodes removed
    pub fn delete_subtree(&self, id: i64) -> Result<usize, StorageError> {
        let removed = self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;

            let root = guide_nodes::get_node(&tx, id)?
                .ok_or_else(|| StorageError::NotFound(format!("guide node {}", id)))?;

            let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
            for node in guide_nodes::list_by_main_type(&tx, root.main_type)? {
                if let Some(parent_id) = node.parent_id {
                    children.entry(parent_id).or_default().push(node.id);
                }
            }

            // Pre-order walk; deleting in reverse removes leaves first
            let mut order = Vec::new();
            let mut seen = HashSet::new();
            let mut stack = vec![id];
            while let Some(current) = stack.pop() {
                if !seen.insert(current) {
                    continue;
                }
                order.push(current);
                if let Some(kids) = children.get(&current) {
                    stack.extend(kids.iter().copied());
                }
            }

            for node_id in order.iter().rev() {
                guide_nodes::delete_node(&tx, *node_id)?;
            }
            tx.commit().map_err(db_err("Failed to commit"))?;
            Ok(order)
        })?;

        info!(id, removed = removed.len(), "Deleted guide subtree");
        for node_id in &removed {
            self.events.emit(StorageEvent::GuideNodeDeleted { id: *node_id });
        }
        Ok(removed.len())
    }
}

/// Normalize the label and check the step carries what its kind needs
fn validate_node(mut input: GuideNodeInput) -> Result<GuideNodeInput, StorageError> {
    input.label = require_name(&input.label, "label")?;

    if let GuideNodeKind::Step(step) = &input.kind {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |v| v.trim().is_empty());
        match step {
            GuideStep::Script { title, body } if blank(title) && blank(body) => {
                return Err(StorageError::InvalidInput(
                    "script step needs a title or body".into(),
                ));
            }
            GuideStep::Input { key, .. } if key.trim().is_empty() => {
                return Err(StorageError::InvalidInput("input step needs input_key".into()));
            }
            GuideStep::Link { slug, .. } if slug.trim().is_empty() => {
                return Err(StorageError::InvalidInput("link step needs link_slug".into()));
            }
            _ => {}
        }
    }
    Ok(input)
}

/// Parent must exist, be a menu and share the main type
fn check_parent(conn: &Connection, parent_id: i64, main_type: MainType) -> Result<(), StorageError> {
    let parent = guide_nodes::get_node(conn, parent_id)?
        .ok_or_else(|| StorageError::NotFound(format!("parent guide node {}", parent_id)))?;
    if parent.main_type != main_type {
        return Err(StorageError::InvalidInput(
            "parent belongs to a different main type".into(),
        ));
    }
    if !parent.kind.is_menu() {
        return Err(StorageError::InvalidInput("parent must be a menu node".into()));
    }
    Ok(())
}

/// `id` and its ancestors, nearest first
fn ancestors(conn: &Connection, id: i64) -> Result<Vec<GuideNode>, StorageError> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut next = Some(id);

    while let Some(current_id) = next {
        if !seen.insert(current_id) {
            return Err(StorageError::Constraint(format!(
                "guide node cycle detected at {}",
                current_id
            )));
        }
        let node = guide_nodes::get_node(conn, current_id)?
            .ok_or_else(|| StorageError::NotFound(format!("guide node {}", current_id)))?;
        next = node.parent_id;
        chain.push(node);
    }
    Ok(chain)
}

fn build_tree(
    children: &mut HashMap<Option<i64>, Vec<GuideNode>>,
    parent_id: Option<i64>,
) -> Vec<GuideTreeNode> {
    let nodes = children.remove(&parent_id).unwrap_or_default();
    nodes
        .into_iter()
        .map(|node| {
            let below = build_tree(children, Some(node.id));
            GuideTreeNode {
                node,
                children: below,
            }
        })
        .collect()
}
