use clap::Subcommand;
use domain_embedding_index::{
    CollectionKind, DropConfirmation, EmbeddingIndex, IndexBackend, Metadata, MetadataFilter,
    WORKSPACE_KEY,
};
use eyre::Result;
use resilience::CancellationToken;
use serde_json::{Value, json};
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// Create the text and image collections if they are missing
    Ensure,

    /// Show collection statistics
    Stats {
        /// Also sample document ids belonging to this workspace
        #[arg(short, long)]
        workspace: Option<String>,
    },

    /// Embed a text and store it in a collection
    Ingest {
        #[arg(short, long)]
        collection: CollectionKind,

        /// Document id; an existing document with this id is replaced
        #[arg(long)]
        id: String,

        #[arg(short, long)]
        text: String,

        #[arg(short, long)]
        workspace: Option<String>,
    },

    /// Find the documents closest to a text
    Search {
        #[arg(short, long)]
        text: String,

        /// Search a single collection. Defaults to both.
        #[arg(short, long)]
        collection: Option<CollectionKind>,

        /// Restrict matches to this workspace (searches the text collection
        /// unless --collection is given)
        #[arg(short, long)]
        workspace: Option<String>,

        #[arg(short, default_value_t = 10)]
        n: usize,
    },

    /// Check that a question retrieves indexed text and preview the matches
    Verify {
        #[arg(short, long)]
        text: String,

        #[arg(short, long)]
        workspace: Option<String>,

        #[arg(short, default_value_t = 10)]
        n: usize,
    },

    /// Print a stored document
    Fetch {
        #[arg(short, long)]
        collection: CollectionKind,

        #[arg(long)]
        id: String,
    },

    /// Delete every document of a workspace
    DeleteWorkspace {
        #[arg(short, long)]
        collection: CollectionKind,

        #[arg(short, long)]
        workspace: String,
    },

    /// Delete documents by id
    DeleteIds {
        #[arg(short, long)]
        collection: CollectionKind,

        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Permanently remove a collection
    Drop {
        #[arg(short, long)]
        collection: CollectionKind,

        /// Required; without it nothing is dropped
        #[arg(long)]
        yes_really_drop: bool,
    },
}

/// Execute `command` and return the JSON document to print.
pub async fn run<B: IndexBackend + ?Sized>(
    command: Commands,
    index: &EmbeddingIndex<B>,
    token: &CancellationToken,
) -> Result<Value> {
    let output = match command {
        Commands::Ensure => {
            let mut outcomes = serde_json::Map::new();
            for kind in CollectionKind::ALL {
                let outcome = index.ensure_collection(kind, token).await?;
                let name = &index.settings().collection(kind).spec.name;
                outcomes.insert(name.clone(), serde_json::to_value(outcome)?);
            }
            Value::Object(outcomes)
        }

        Commands::Stats { workspace } => {
            serde_json::to_value(index.stats(workspace.as_deref()).await?)?
        }

        Commands::Ingest {
            collection,
            id,
            text,
            workspace,
        } => {
            let mut metadata = Metadata::new();
            if let Some(workspace) = workspace {
                metadata.insert(WORKSPACE_KEY.to_string(), Value::String(workspace));
            }
            let outcome = index.ingest_text(collection, &id, &text, metadata).await?;
            json!({ "id": id, "stored": outcome.is_stored() })
        }

        Commands::Search {
            text,
            collection,
            workspace,
            n,
        } => {
            let filter = workspace.as_deref().map(MetadataFilter::workspace);
            let ids = match (collection, filter) {
                (None, None) => index.search_text(&text, n).await?,
                (kind, filter) => {
                    let kind = kind.unwrap_or(CollectionKind::Text);
                    index.search_text_in(kind, &text, filter.as_ref(), n).await?
                }
            };
            json!({ "ids": ids })
        }

        Commands::Verify { text, workspace, n } => {
            serde_json::to_value(index.verify_text(&text, workspace.as_deref(), n).await?)?
        }

        Commands::Fetch { collection, id } => {
            serde_json::to_value(index.fetch_document(collection, &id).await?)?
        }

        Commands::DeleteWorkspace {
            collection,
            workspace,
        } => {
            let deleted = index.delete_by_workspace(collection, &workspace).await?;
            json!({ "deleted": deleted })
        }

        Commands::DeleteIds { collection, ids } => {
            let deleted = index.delete_by_ids(collection, &ids).await?;
            json!({ "deleted": deleted })
        }

        Commands::Drop {
            collection,
            yes_really_drop,
        } => {
            index
                .drop_collection(collection, DropConfirmation::from(yes_really_drop))
                .await?;
            info!(collection = %collection, "Collection dropped");
            json!({ "dropped": index.settings().collection(collection).spec.name })
        }
    };

    Ok(output)
}
