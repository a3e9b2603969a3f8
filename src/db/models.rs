//! Shared domain types stored by the repository modules
//!
//! Enums are stored as lowercase TEXT columns and implement `ToSql`/`FromSql`
//! so rows can be read straight into typed values.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

// ============================================================================
// Content kind
// ============================================================================

/// Top-level partition for categories and content items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Product,
    Script,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Product => "product",
            ContentKind::Script => "script",
        }
    }
}

impl FromStr for ContentKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(ContentKind::Product),
            "script" => Ok(ContentKind::Script),
            other => Err(StorageError::InvalidInput(format!("invalid kind '{}'", other))),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Guide main type
// ============================================================================

/// One forest of the guided call-flow tree exists per main type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MainType {
    Call,
    Info,
    Request,
    Complaint,
}

impl MainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MainType::Call => "call",
            MainType::Info => "info",
            MainType::Request => "request",
            MainType::Complaint => "complaint",
        }
    }
}

impl FromStr for MainType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call" => Ok(MainType::Call),
            "info" => Ok(MainType::Info),
            "request" => Ok(MainType::Request),
            "complaint" => Ok(MainType::Complaint),
            _ => Err(StorageError::InvalidInput("invalid main type".into())),
        }
    }
}

impl fmt::Display for MainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// These enums travel through SQLite as their lowercase names.
macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: StorageError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_column!(ContentKind);
text_column!(MainType);
text_column!(UiMode);

// ============================================================================
// Content blocks
// ============================================================================

/// One block of a content item body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "imageUrl")]
        image_url: String,
        #[serde(rename = "altText", default, skip_serializing_if = "Option::is_none")]
        alt_text: Option<String>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn image(image_url: impl Into<String>, alt_text: Option<String>) -> Self {
        ContentBlock::Image {
            image_url: image_url.into(),
            alt_text,
        }
    }
}

// ============================================================================
// Guide node kinds
// ============================================================================

/// Client rendering hint for menu nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    Tree,
    Accordion,
}

impl UiMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiMode::Tree => "tree",
            UiMode::Accordion => "accordion",
        }
    }
}

impl FromStr for UiMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tree" => Ok(UiMode::Tree),
            "accordion" => Ok(UiMode::Accordion),
            other => Err(StorageError::InvalidInput(format!("invalid ui_mode '{}'", other))),
        }
    }
}

/// What a guide node is: a navigation menu or a terminal step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "lowercase")]
pub enum GuideNodeKind {
    Menu {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ui_mode: Option<UiMode>,
    },
    Step(GuideStep),
}

impl GuideNodeKind {
    pub fn is_menu(&self) -> bool {
        matches!(self, GuideNodeKind::Menu { .. })
    }

    pub fn node_type(&self) -> &'static str {
        match self {
            GuideNodeKind::Menu { .. } => "menu",
            GuideNodeKind::Step(_) => "step",
        }
    }
}

/// Terminal action of a step node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step_kind", rename_all = "lowercase")]
pub enum GuideStep {
    /// Static text read out by the agent
    Script {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        body: Option<String>,
    },
    /// Field the agent fills in during the call
    Input {
        #[serde(rename = "input_key")]
        key: String,
        #[serde(rename = "input_label", default)]
        label: Option<String>,
        #[serde(rename = "input_placeholder", default)]
        placeholder: Option<String>,
        #[serde(rename = "input_required", default)]
        required: bool,
    },
    /// Cross-link to a product or script by slug
    Link {
        #[serde(rename = "link_kind")]
        kind: ContentKind,
        #[serde(rename = "link_slug")]
        slug: String,
    },
}

impl GuideStep {
    pub fn step_kind(&self) -> &'static str {
        match self {
            GuideStep::Script { .. } => "script",
            GuideStep::Input { .. } => "input",
            GuideStep::Link { .. } => "link",
        }
    }
}
