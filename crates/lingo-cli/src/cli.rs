use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "lingo",
    about = "Inspect and edit translation storage",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file. Defaults to ./lingo.toml when present.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage root, overriding `[json] base_path`.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Answer reverse lookups by scanning blobs instead of the index.
    #[arg(long, global = true)]
    pub scan: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the attributes of an entity in one language
    Get(GetArgs),
    /// Store a translation, replacing the blob
    #[command(alias = "put")]
    Store(WriteArgs),
    /// Merge attributes into a translation
    Patch(WriteArgs),
    /// Delete translations, languages or attributes of an entity
    Delete(DeleteArgs),
    /// List the languages an entity is translated into
    Languages(EntityArgs),
    /// List entity ids of a type translated into a language
    Models(ModelsArgs),
    /// Apply sync tasks left pending by an earlier run
    #[command(alias = "sync")]
    Drain,
    /// Rebuild the language index from the stored blobs
    #[command(alias = "rebuild")]
    Reindex(ReindexArgs),
    /// Run the conformance checks against registered drivers
    CheckDrivers(CheckDriversArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct EntityArgs {
    /// Entity type, e.g. `App\Models\Article`
    pub entity_type: String,
    pub entity_id: String,
}

#[derive(Args)]
pub struct GetArgs {
    #[command(flatten)]
    pub entity: EntityArgs,
    pub language: String,
}

#[derive(Args)]
pub struct WriteArgs {
    #[command(flatten)]
    pub entity: EntityArgs,
    pub language: String,
    /// JSON object of attributes. Read from stdin when omitted or `-`.
    pub attributes: Option<String>,
}

#[derive(Args)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub entity: EntityArgs,
    /// Restrict the delete to these languages
    #[arg(short, long)]
    pub language: Vec<String>,
    /// Delete only these attributes
    #[arg(short, long)]
    pub attribute: Vec<String>,
}

#[derive(Args)]
pub struct ModelsArgs {
    pub entity_type: String,
    pub language: String,
}

#[derive(Args)]
pub struct ReindexArgs {
    /// Entity types whose index entries are recomputed
    #[arg(required = true)]
    pub entity_types: Vec<String>,
}

#[derive(Args)]
pub struct CheckDriversArgs {
    /// Drivers to check. Defaults to every registered driver.
    pub drivers: Vec<String>,
}
