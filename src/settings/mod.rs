use clap::{Parser, Subcommand};
use realmstore::LoaderSettings;
use realmstore::schema::query::DEFAULT_MAX_DEPTH;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "realmstore")]
#[command(version)]
#[command(about = "Inspects how MMORPG aggregates are queried and rebuilt")]
pub struct CliArgs {
    /// Maximum nesting of owned navigations below a root.
    #[arg(long, global = true, env = "REALMSTORE_MAX_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    #[command(subcommand)]
    pub operation_mode: OperationMode,
}

impl CliArgs {
    pub fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings {
            max_depth: self.max_depth,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum OperationMode {
    /// Lists the entity types of the game model.
    Entities,
    /// Prints the query that loads an entity type.
    Query {
        entity: String,
        #[arg(long, help = "Print the single aggregate variant, filtered by $1")]
        by_id: bool,
    },
    /// Rebuilds graphs from a dump with one JSON document per line and prints them.
    Inspect { entity: String, file: PathBuf },
    /// Checks a binary literal as the store renders it, e.g. \x0aff.
    Binary { value: String },
    /// Loads aggregates from a live database.
    #[cfg(feature = "postgres")]
    Load {
        #[arg(long, env = "REALMSTORE_DATABASE_URL")]
        database_url: String,
        entity: String,
        #[arg(long)]
        id: Option<uuid::Uuid>,
    },
}
