//! Admin CLI - subcommands over the service layer
//!
//! Every command prints its result as JSON so the output can be piped
//! into other tools.

use clap::Subcommand;
use serde_json::{json, Value};

use crate::db::{CatalogDb, ContentBlock, ContentKind, ContentQuery, GuideNodeInput, MainType};
use crate::error::StorageError;
use crate::services::{CreateContentInput, Services, UpdateContentInput};

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database and write a default config if missing
    Init,

    /// Show row counts
    Stats,

    /// Manage the category forests
    #[command(subcommand)]
    Category(CategoryCommands),

    /// Manage products and scripts
    #[command(subcommand)]
    Item(ItemCommands),

    /// Manage breaking news
    #[command(subcommand)]
    News(NewsCommands),

    /// Manage the guided call-flow forests
    #[command(subcommand)]
    Guide(GuideCommands),
}

#[derive(Debug, Subcommand)]
pub enum CategoryCommands {
    /// List roots, or the children of --parent
    List {
        kind: ContentKind,
        #[arg(short, long)]
        parent: Option<i64>,
    },

    /// Print the whole forest of a kind
    Tree { kind: ContentKind },

    /// Add a category
    Add {
        kind: ContentKind,
        name: String,
        #[arg(short, long)]
        parent: Option<i64>,
    },

    Rename { id: i64, name: String },

    /// Delete a category without children or items
    Delete { id: i64 },

    /// Print "Root / Child / Leaf" for a category
    Path { id: i64 },
}

/// Body of an item, from flags
#[derive(Debug, clap::Args)]
pub struct BlockArgs {
    /// Text block (repeatable, kept in order before images)
    #[arg(long = "text")]
    texts: Vec<String>,

    /// Image block URL (repeatable)
    #[arg(long = "image")]
    images: Vec<String>,

    /// Full block list as JSON; replaces --text/--image
    #[arg(long)]
    blocks_json: Option<String>,
}

impl BlockArgs {
    fn into_blocks(self) -> Result<Vec<ContentBlock>, StorageError> {
        if let Some(raw) = self.blocks_json {
            return Ok(serde_json::from_str(&raw)?);
        }
        let mut blocks: Vec<ContentBlock> = self.texts.into_iter().map(ContentBlock::text).collect();
        blocks.extend(self.images.into_iter().map(|url| ContentBlock::image(url, None)));
        Ok(blocks)
    }
}

#[derive(Debug, Subcommand)]
pub enum ItemCommands {
    /// List items of a kind
    List {
        kind: ContentKind,
        /// Substring over title, category name and block text
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short, long)]
        category: Option<i64>,
        /// Include items filed below --category
        #[arg(long)]
        descendants: bool,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Show an item by slug, or by id with --id
    Show {
        kind: ContentKind,
        slug: Option<String>,
        #[arg(long, conflicts_with = "slug")]
        id: Option<i64>,
    },

    /// Create an item
    Create {
        kind: ContentKind,
        title: String,
        #[arg(short, long)]
        category: i64,
        #[command(flatten)]
        blocks: BlockArgs,
        /// Also announce it as breaking news
        #[arg(long)]
        breaking: bool,
        #[arg(long)]
        breaking_title: Option<String>,
    },

    /// Replace an item's title, category and blocks
    Update {
        id: i64,
        kind: ContentKind,
        title: String,
        #[arg(short, long)]
        category: i64,
        #[command(flatten)]
        blocks: BlockArgs,
    },

    /// Delete an item
    Delete {
        id: i64,
        /// Remove breaking news pointing at it too
        #[arg(long)]
        cascade: bool,
    },

    /// Search products and scripts
    Search { query: String },
}

#[derive(Debug, Subcommand)]
pub enum NewsCommands {
    /// List breaking news, newest first
    List {
        /// Include inactive entries
        #[arg(short, long)]
        all: bool,
    },

    /// Announce an existing item
    Add {
        item_id: i64,
        #[arg(short, long)]
        title: Option<String>,
    },

    Activate { id: i64 },

    Deactivate { id: i64 },

    Delete { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum GuideCommands {
    /// List roots, or the children of --parent
    List {
        main_type: MainType,
        #[arg(short, long)]
        parent: Option<i64>,
    },

    /// Print a whole forest
    Tree { main_type: MainType },

    /// Add a node from JSON, e.g.
    /// '{"main_type":"call","label":"Salam","node_type":"step","step_kind":"script","body":"Halo"}'
    Add { node: String },

    /// Replace a node from JSON
    Update { id: i64, node: String },

    /// Delete a node; --recursive also removes everything below it
    Delete {
        id: i64,
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show the item a link step points at
    Resolve { id: i64 },

    /// Print the labels from the root down to a node
    Breadcrumb { id: i64 },
}

/// Execute a command other than `init`
pub fn execute_command(
    db: &CatalogDb,
    services: &Services,
    command: Command,
) -> Result<Value, StorageError> {
    match command {
        Command::Init => Ok(json!({ "initialized": true })),
        Command::Stats => Ok(serde_json::to_value(db.stats()?)?),
        Command::Category(cmd) => execute_category(services, cmd),
        Command::Item(cmd) => execute_item(services, cmd),
        Command::News(cmd) => execute_news(services, cmd),
        Command::Guide(cmd) => execute_guide(services, cmd),
    }
}

fn execute_category(services: &Services, cmd: CategoryCommands) -> Result<Value, StorageError> {
    let categories = &services.categories;
    match cmd {
        CategoryCommands::List { kind, parent } => {
            Ok(serde_json::to_value(categories.list_by_parent(kind, parent)?)?)
        }
        CategoryCommands::Tree { kind } => Ok(serde_json::to_value(categories.tree(kind)?)?),
        CategoryCommands::Add { kind, name, parent } => {
            let id = categories.create(kind, &name, parent)?;
            Ok(serde_json::to_value(categories.get(id)?)?)
        }
        CategoryCommands::Rename { id, name } => {
            categories.rename(id, &name)?;
            Ok(serde_json::to_value(categories.get(id)?)?)
        }
        CategoryCommands::Delete { id } => {
            categories.delete(id)?;
            Ok(json!({ "deleted": id }))
        }
        CategoryCommands::Path { id } => {
            Ok(json!({ "id": id, "path": categories.build_path_string(id)? }))
        }
    }
}

fn execute_item(services: &Services, cmd: ItemCommands) -> Result<Value, StorageError> {
    let content = &services.content;
    match cmd {
        ItemCommands::List {
            kind,
            query,
            category,
            descendants,
            limit,
            offset,
        } => {
            let query = ContentQuery {
                kind,
                search: query,
                category_id: category,
                include_descendants: descendants,
                limit,
                offset,
            };
            Ok(serde_json::to_value(content.list(&query)?)?)
        }
        ItemCommands::Show { kind, slug, id } => {
            let item = match (id, slug) {
                (Some(id), _) => content.get(id)?,
                (None, Some(slug)) => content.get_by_slug(kind, &slug)?,
                (None, None) => {
                    return Err(StorageError::InvalidInput("slug or --id is required".into()))
                }
            };
            Ok(serde_json::to_value(item)?)
        }
        ItemCommands::Create {
            kind,
            title,
            category,
            blocks,
            breaking,
            breaking_title,
        } => {
            let created = content.create(CreateContentInput {
                kind,
                title,
                category_id: category,
                blocks: blocks.into_blocks()?,
                is_breaking: breaking,
                breaking_title,
            })?;
            Ok(serde_json::to_value(created)?)
        }
        ItemCommands::Update {
            id,
            kind,
            title,
            category,
            blocks,
        } => {
            let slug = content.update(
                id,
                UpdateContentInput {
                    kind,
                    title,
                    category_id: category,
                    blocks: blocks.into_blocks()?,
                },
            )?;
            Ok(json!({ "id": id, "slug": slug }))
        }
        ItemCommands::Delete { id, cascade } => {
            if cascade {
                let removed = content.delete_cascade(id)?;
                Ok(json!({ "deleted": id, "breakingNewsRemoved": removed }))
            } else {
                content.delete(id)?;
                Ok(json!({ "deleted": id }))
            }
        }
        ItemCommands::Search { query } => Ok(serde_json::to_value(content.search_all(&query)?)?),
    }
}

fn execute_news(services: &Services, cmd: NewsCommands) -> Result<Value, StorageError> {
    let news = &services.breaking_news;
    match cmd {
        NewsCommands::List { all } => {
            let rows = if all { news.list_all()? } else { news.list_active()? };
            Ok(serde_json::to_value(rows)?)
        }
        NewsCommands::Add { item_id, title } => {
            Ok(serde_json::to_value(news.create(item_id, title.as_deref())?)?)
        }
        NewsCommands::Activate { id } => {
            news.set_active(id, true)?;
            Ok(serde_json::to_value(news.get(id)?)?)
        }
        NewsCommands::Deactivate { id } => {
            news.set_active(id, false)?;
            Ok(serde_json::to_value(news.get(id)?)?)
        }
        NewsCommands::Delete { id } => {
            news.delete(id)?;
            Ok(json!({ "deleted": id }))
        }
    }
}

fn execute_guide(services: &Services, cmd: GuideCommands) -> Result<Value, StorageError> {
    let guide = &services.guide;
    match cmd {
        GuideCommands::List { main_type, parent } => {
            Ok(serde_json::to_value(guide.list_by_parent(main_type, parent)?)?)
        }
        GuideCommands::Tree { main_type } => Ok(serde_json::to_value(guide.tree(main_type)?)?),
        GuideCommands::Add { node } => {
            let input: GuideNodeInput = parse_node(&node)?;
            let id = guide.create_node(input)?;
            Ok(serde_json::to_value(guide.get_node(id)?)?)
        }
        GuideCommands::Update { id, node } => {
            guide.update_node(id, parse_node(&node)?)?;
            Ok(serde_json::to_value(guide.get_node(id)?)?)
        }
        GuideCommands::Delete { id, recursive } => {
            if recursive {
                Ok(json!({ "deleted": id, "removed": guide.delete_subtree(id)? }))
            } else {
                guide.delete_node(id)?;
                Ok(json!({ "deleted": id, "removed": 1 }))
            }
        }
        GuideCommands::Resolve { id } => Ok(serde_json::to_value(guide.resolve_link(id)?)?),
        GuideCommands::Breadcrumb { id } => {
            Ok(json!({ "id": id, "breadcrumb": guide.breadcrumb(id)? }))
        }
    }
}

fn parse_node(raw: &str) -> Result<GuideNodeInput, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::InvalidInput(format!("invalid guide node JSON: {}", e)))
}
