//! Command-line client for the mnemo associative memory engine.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mnemo_core::manager::{StoreOptions, UpdatePatch};
use mnemo_core::scope::ScopeFilter;
use mnemo_core::search::{SearchMode, SearchOptions};
use mnemo_core::store::Page;
use mnemo_core::sync::MergeStrategy;
use mnemo_core::value::{Metadata, Value};
use mnemo_core::{Config, Engine};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "mnemo",
    author,
    version = env!("CARGO_PKG_VERSION"),
    about = "Associative memory engine: store, search and link memories by meaning",
    long_about = "mnemo keeps a vector-indexed store of memories organised into hierarchical \
                  scopes, links related memories with weighted associations, and catches \
                  near-duplicate content before it is stored."
)]
struct Cli {
    /// Data directory. Defaults to the platform data dir for "mnemo".
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new memory
    Store {
        /// Memory content
        content: String,
        /// Scope, e.g. "work/projects/mnemo"
        #[arg(long, default_value = "default")]
        scope: String,
        /// Tags (comma-separated)
        #[arg(long)]
        tags: Option<String>,
        /// Category
        #[arg(long)]
        category: Option<String>,
        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
        /// Allow storing even if a near-duplicate already exists
        #[arg(long)]
        allow_duplicates: bool,
        /// Reject as a duplicate above this cosine similarity (0.0-1.0)
        #[arg(long)]
        duplicate_threshold: Option<f32>,
        /// Skip automatic association discovery for this memory
        #[arg(long)]
        no_auto_associate: bool,
    },

    /// Fetch a memory by id
    Get {
        id: String,
        /// Include linked associations
        #[arg(long)]
        associations: bool,
        /// Max associations to include
        #[arg(long, default_value_t = 5)]
        association_limit: usize,
    },

    /// Update a memory's content, tags, category or metadata
    Update {
        id: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        metadata: Option<String>,
        /// Drop existing associations instead of preserving them across the edit
        #[arg(long)]
        drop_associations: bool,
    },

    /// Delete a memory by id
    Delete { id: String },

    /// Move one or more memories to a different scope
    Move {
        /// Memory ids to move
        ids: Vec<String>,
        /// Destination scope
        #[arg(long)]
        to: String,
    },

    /// List memories in a scope
    List {
        /// Scope filter: omit for all scopes, or pass a scope prefix
        #[arg(long)]
        scope: Option<String>,
        /// Match only this exact scope, not its descendants
        #[arg(long)]
        exact: bool,
        /// Page size
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Delete memories older than a cutoff
    Cleanup {
        #[arg(long)]
        scope: Option<String>,
        /// Only delete memories last updated more than this many days ago
        #[arg(long)]
        older_than_days: Option<i64>,
    },

    /// Search memories by semantic similarity
    Search {
        query: String,
        /// Scope filter: omit for all scopes
        #[arg(long)]
        scope: Option<String>,
        /// Match only this exact scope, not its descendants
        #[arg(long)]
        exact: bool,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Minimum cosine similarity to admit a result (0.0-1.0)
        #[arg(long)]
        threshold: Option<f32>,
        /// Spread results apart instead of ranking by similarity alone
        #[arg(long)]
        diversified: bool,
        /// Include each result's linked associations
        #[arg(long)]
        with_associations: bool,
    },

    /// Discover memories associated with a given memory, beyond its stored links
    Discover {
        id: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long, default_value_t = 0.5)]
        threshold: f32,
    },

    /// Export memories to a JSON file
    Export {
        output: PathBuf,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        exact: bool,
        /// Omit association edges from the export
        #[arg(long)]
        no_associations: bool,
    },

    /// Import memories from a JSON file produced by `export`
    Import {
        input: PathBuf,
        /// How to handle ids already present in the store
        #[arg(long, value_enum, default_value = "skip-duplicates")]
        merge_strategy: MergeStrategyArg,
        /// Prefix every imported record's scope with this path
        #[arg(long)]
        scope_prefix: Option<String>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum MergeStrategyArg {
    SkipDuplicates,
    Overwrite,
    CreateVersions,
}

impl From<MergeStrategyArg> for MergeStrategy {
    fn from(value: MergeStrategyArg) -> Self {
        match value {
            MergeStrategyArg::SkipDuplicates => MergeStrategy::SkipDuplicates,
            MergeStrategyArg::Overwrite => MergeStrategy::Overwrite,
            MergeStrategyArg::CreateVersions => MergeStrategy::CreateVersions,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let engine = Engine::open(config).await?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    match cli.command {
        Commands::Store {
            content,
            scope,
            tags,
            category,
            metadata,
            allow_duplicates,
            duplicate_threshold,
            no_auto_associate,
        } => run_store(&engine, content, scope, tags, category, metadata, allow_duplicates, duplicate_threshold, no_auto_associate, &cancel).await,
        Commands::Get { id, associations, association_limit } => run_get(&engine, id, associations, association_limit, &cancel).await,
        Commands::Update { id, content, tags, category, metadata, drop_associations } => {
            run_update(&engine, id, content, tags, category, metadata, drop_associations, &cancel).await
        }
        Commands::Delete { id } => run_delete(&engine, id, &cancel).await,
        Commands::Move { ids, to } => run_move(&engine, ids, to, &cancel).await,
        Commands::List { scope, exact, limit } => run_list(&engine, scope, exact, limit, &cancel),
        Commands::Cleanup { scope, older_than_days } => run_cleanup(&engine, scope, older_than_days, &cancel).await,
        Commands::Search { query, scope, exact, limit, threshold, diversified, with_associations } => {
            run_search(&engine, query, scope, exact, limit, threshold, diversified, with_associations, &cancel).await
        }
        Commands::Discover { id, limit, threshold } => run_discover(&engine, id, limit, threshold, &cancel).await,
        Commands::Export { output, scope, exact, no_associations } => run_export(&engine, output, scope, exact, no_associations, &cancel).await,
        Commands::Import { input, merge_strategy, scope_prefix } => run_import(&engine, input, merge_strategy, scope_prefix, &cancel).await,
    }
}

fn parse_scope_filter(scope: Option<String>, exact: bool) -> anyhow::Result<ScopeFilter> {
    Ok(match scope {
        None => ScopeFilter::Any,
        Some(raw) if exact => ScopeFilter::Exact(mnemo_core::scope::parse(&raw)?),
        Some(raw) => ScopeFilter::Prefix(mnemo_core::scope::parse(&raw)?),
    })
}

fn parse_tags(tags: Option<String>) -> Vec<String> {
    tags.map(|raw| raw.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect())
        .unwrap_or_default()
}

fn parse_metadata(raw: Option<String>) -> anyhow::Result<Metadata> {
    match raw {
        None => Ok(Metadata::new()),
        Some(raw) => {
            let json: serde_json::Value = serde_json::from_str(&raw)?;
            match Value::from_json(json) {
                Value::Map(map) => Ok(map),
                _ => anyhow::bail!("--metadata must be a JSON object"),
            }
        }
    }
}

async fn run_store(
    engine: &Engine,
    content: String,
    scope: String,
    tags: Option<String>,
    category: Option<String>,
    metadata: Option<String>,
    allow_duplicates: bool,
    duplicate_threshold: Option<f32>,
    no_auto_associate: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let options = StoreOptions {
        allow_duplicates,
        duplicate_threshold,
        auto_associate: !no_auto_associate,
        ..StoreOptions::default()
    };
    let outcome = engine
        .store(&content, &scope, parse_tags(tags), category, parse_metadata(metadata)?, &options, cancel)
        .await?;
    println!("stored {}", outcome.memory.id);
    println!("  scope: {}", outcome.memory.scope);
    println!("  associations created: {}", outcome.associations_created.len());
    Ok(())
}

async fn run_get(engine: &Engine, id: String, associations: bool, association_limit: usize, cancel: &CancellationToken) -> anyhow::Result<()> {
    let result = engine.get(&id, associations, association_limit, cancel).await?;
    print_memory(&result.memory);
    if associations {
        for (other_id, weight) in &result.associations {
            println!("  -> {other_id} (weight {weight:.3})");
        }
    }
    Ok(())
}

async fn run_update(
    engine: &Engine,
    id: String,
    content: Option<String>,
    tags: Option<String>,
    category: Option<String>,
    metadata: Option<String>,
    drop_associations: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let patch = UpdatePatch {
        content,
        tags: tags.map(|t| parse_tags(Some(t))),
        category: category.map(Some),
        metadata: match metadata {
            Some(raw) => Some(parse_metadata(Some(raw))?),
            None => None,
        },
    };
    let memory = engine.update(&id, &patch, !drop_associations, cancel).await?;
    print_memory(&memory);
    Ok(())
}

async fn run_delete(engine: &Engine, id: String, cancel: &CancellationToken) -> anyhow::Result<()> {
    let deleted = engine.delete(&id, cancel).await?;
    if deleted {
        println!("deleted {id}");
    } else {
        println!("no memory with id {id}");
    }
    Ok(())
}

async fn run_move(engine: &Engine, ids: Vec<String>, to: String, cancel: &CancellationToken) -> anyhow::Result<()> {
    let results = engine.move_memories(&ids, &to, cancel).await?;
    for result in results {
        match result.error {
            Some(err) => println!("{}: failed ({err})", result.id),
            None if result.moved => println!("{}: moved to {to}", result.id),
            None => println!("{}: no memory with that id", result.id),
        }
    }
    Ok(())
}

fn run_list(engine: &Engine, scope: Option<String>, exact: bool, limit: usize, cancel: &CancellationToken) -> anyhow::Result<()> {
    let filter = parse_scope_filter(scope, exact)?;
    let result = engine.list(&filter, &Page::first(limit), cancel)?;
    for memory in &result.items {
        print_memory(memory);
    }
    if result.next_cursor.is_some() {
        println!("... more results available, narrow the scope or raise --limit");
    }
    Ok(())
}

async fn run_cleanup(engine: &Engine, scope: Option<String>, older_than_days: Option<i64>, cancel: &CancellationToken) -> anyhow::Result<()> {
    let filter = parse_scope_filter(scope, false)?;
    let older_than = older_than_days.map(|days| chrono::Utc::now() - chrono::Duration::days(days));
    let deleted = engine.cleanup(&filter, older_than, cancel).await?;
    println!("deleted {deleted} memories");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    engine: &Engine,
    query: String,
    scope: Option<String>,
    exact: bool,
    limit: usize,
    threshold: Option<f32>,
    diversified: bool,
    with_associations: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let filter = parse_scope_filter(scope, exact)?;
    let default_threshold = engine.config().search_default_similarity_threshold;
    let mut options = SearchOptions::new(filter, threshold.unwrap_or(default_threshold));
    options.limit = limit;
    options.mode = if diversified { SearchMode::Diversified } else { SearchMode::Standard };
    options.include_associations = with_associations;

    let hits = engine.search(&query, &options, cancel).await?;
    for hit in hits {
        println!("{:.4}  {}  [{}]", hit.score, hit.memory.id, hit.memory.scope);
        println!("      {}", truncate(&hit.memory.content, 120));
        for (other_id, weight) in &hit.associations {
            println!("      -> {other_id} (weight {weight:.3})");
        }
    }
    Ok(())
}

async fn run_discover(engine: &Engine, id: String, limit: usize, threshold: f32, cancel: &CancellationToken) -> anyhow::Result<()> {
    let hits = engine.discover_associations(&id, limit, threshold, cancel).await?;
    for (other_id, score) in hits {
        println!("{score:.4}  {other_id}");
    }
    Ok(())
}

async fn run_export(engine: &Engine, output: PathBuf, scope: Option<String>, exact: bool, no_associations: bool, cancel: &CancellationToken) -> anyhow::Result<()> {
    let filter = parse_scope_filter(scope, exact)?;
    let payload = engine.export(&filter, !no_associations, cancel).await?;
    let json = serde_json::to_string_pretty(&payload)?;
    std::fs::write(&output, json)?;
    println!("exported {} memories and {} associations to {}", payload.memories.len(), payload.associations.len(), output.display());
    Ok(())
}

async fn run_import(engine: &Engine, input: PathBuf, merge_strategy: MergeStrategyArg, scope_prefix: Option<String>, cancel: &CancellationToken) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(&input)?;
    let payload = serde_json::from_str(&json)?;
    let report = engine.import(&payload, merge_strategy.into(), scope_prefix.as_deref(), cancel).await?;
    println!("created: {}", report.created);
    println!("overwritten: {}", report.overwritten);
    println!("skipped: {}", report.skipped);
    println!("failed: {}", report.failed);
    println!("associations created: {}", report.associations_created);
    println!("associations dropped: {}", report.associations_dropped);
    Ok(())
}

fn print_memory(memory: &mnemo_core::Memory) {
    println!("{}  [{}]", memory.id, memory.scope);
    println!("  {}", truncate(&memory.content, 200));
    if !memory.tags.is_empty() {
        println!("  tags: {}", memory.tags.join(", "));
    }
    if let Some(category) = &memory.category {
        println!("  category: {category}");
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    }
}
