//! FPT command-line tool.
//!
//! Runs the local HTTP API or performs one-shot schema, query and export
//! operations directly against the configured document store.
//!
//! # Security Guarantees
//! - The API binds to loopback unless `serverHost` says otherwise
//! - Document writes require an enabled gate and the shared token
//! - Store URLs are redacted in every log line

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fpt::server::{self, ServerConfig};
use fpt_core::export::{DEFAULT_EXPORT_LIMIT, ExportFormat, ExportRequest, parse_columns};
use fpt_core::logging::{LogFormat, init_logging};
use fpt_core::query::{
    DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT, QueryRequest, SortDirection, parse_where,
};
use fpt_core::schema::DEFAULT_SAMPLE_LIMIT;
use fpt_core::security::generate_write_token;
use fpt_core::{DocumentStore, FptConfig, export_stream, infer_schema, open_store, run_query};
use futures::TryStreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fpt")]
#[command(about = "Document store power tools")]
#[command(version)]
#[command(long_about = "
FPT - Document store power tools

Inspect schema-less document collections through a local HTTP API or
directly from the command line:
- Infer an observed schema from sampled documents
- Run filtered, ordered, paginated queries
- Export collections as NDJSON or CSV
- Merge or delete single documents behind a write token

STORES:
- memory:// (default, optionally seeded with --seed data.ndjson)
- mongodb:// or mongodb+srv:// [if compiled with --features mongodb]

EXAMPLES:
  fpt serve --project demo --seed fixtures.ndjson
  fpt infer --collection users --limit 500
  fpt export --collection users --format csv --columns id,name,email
  fpt setup --project demo --enable-writes
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    quiet: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API
    #[command(visible_aliases = ["up", "start"])]
    Serve(ServeArgs),
    /// Start the HTTP API and print the API and UI URLs
    #[command(visible_alias = "dev")]
    Run(RunArgs),
    /// Infer the observed schema of a collection
    Infer(InferArgs),
    /// Schema operations
    Schema {
        #[command(subcommand)]
        action: SchemaCommand,
    },
    /// Run a paginated query
    Query(QueryArgs),
    /// Export a collection to a file
    Export(ExportArgs),
    /// List root collections
    Collections(StoreArgs),
    /// Write the config file
    Setup(SetupArgs),
}

#[derive(Subcommand)]
enum SchemaCommand {
    /// Infer the observed schema of a collection
    Infer(InferArgs),
}

/// Where the data lives. Flags override `FPT_*` variables and the config file.
#[derive(Args, Clone, Default)]
struct StoreArgs {
    /// Project id
    #[arg(long)]
    project: Option<String>,

    /// Store URL
    #[arg(long, help = "Store URL (credentials will be sanitized in logs)")]
    store_url: Option<String>,

    /// NDJSON seed file for the memory store
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    serve: ServeArgs,

    /// UI address to print
    #[arg(long, default_value = "http://127.0.0.1:5173")]
    ui: String,
}

#[derive(Args)]
struct InferArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Collection to sample
    #[arg(long)]
    collection: String,

    /// Documents to sample
    #[arg(long, default_value_t = DEFAULT_SAMPLE_LIMIT)]
    limit: u32,
}

#[derive(Args)]
struct QueryArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Collection to query
    #[arg(long)]
    collection: String,

    /// Filters as a JSON array of {field, op, value}
    #[arg(long = "where")]
    filters: Option<String>,

    /// Field to order by
    #[arg(long)]
    order_by: Option<String>,

    /// Order descending
    #[arg(long, requires = "order_by")]
    desc: bool,

    /// Page size
    #[arg(long, default_value_t = DEFAULT_QUERY_LIMIT)]
    limit: u32,

    /// Resume after this document id
    #[arg(long)]
    start_after: Option<String>,
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Collection to export
    #[arg(long)]
    collection: String,

    /// jsonl or csv
    #[arg(long, default_value = "jsonl")]
    format: String,

    /// Maximum rows
    #[arg(long, default_value_t = DEFAULT_EXPORT_LIMIT)]
    limit: u32,

    /// Comma-separated CSV columns
    #[arg(long)]
    columns: Option<String>,

    /// Output file; defaults to `firestore-<collection>-<date>.<ext>`
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct SetupArgs {
    /// Project id
    #[arg(long)]
    project: Option<String>,

    /// HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Allow token-gated writes
    #[arg(long, conflicts_with = "disable_writes")]
    enable_writes: bool,

    /// Reject all writes
    #[arg(long)]
    disable_writes: bool,

    /// Replace the write token with a fresh one
    #[arg(long)]
    rotate_token: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format.into())
        .context("Failed to initialize logging")?;

    match cli.command {
        Command::Serve(args) => serve(&args, None).await,
        Command::Run(args) => serve(&args.serve, Some(&args.ui)).await,
        Command::Infer(args)
        | Command::Schema {
            action: SchemaCommand::Infer(args),
        } => infer(&args).await,
        Command::Query(args) => query(&args).await,
        Command::Export(args) => export(&args).await,
        Command::Collections(args) => collections(&args).await,
        Command::Setup(args) => setup(&args).await,
    }
}

/// File, then environment, then flags.
async fn resolve_config(store: &StoreArgs, port: Option<u16>) -> Result<ServerConfig> {
    let mut config = FptConfig::load().await;
    config.apply_env()?;

    if let Some(project) = &store.project {
        config.project_id = Some(project.clone());
    }
    if let Some(url) = &store.store_url {
        config.store_url = Some(url.clone());
    }
    if let Some(port) = port {
        config.port = port;
    }

    let mut server_config = ServerConfig::from_config(&config);
    server_config.store.seed.clone_from(&store.seed);
    Ok(server_config)
}

async fn open(config: &ServerConfig) -> Result<Arc<dyn DocumentStore>> {
    let store = open_store(&config.store)
        .await
        .context("Failed to open document store")?;
    Ok(store)
}

async fn serve(args: &ServeArgs, ui: Option<&str>) -> Result<()> {
    let config = resolve_config(&args.store, args.port).await?;
    if config.write.is_enabled() && !config.write.has_token() {
        warn!("Writes are enabled but no write token is configured; all writes will be rejected");
    }

    let state = server::build_state(&config).await?;
    let router = server::create_router(state, config.request_timeout);
    let listener = server::bind(&config).await?;
    let addr = listener.local_addr().context("Failed to read bound address")?;

    if let Some(ui) = ui {
        println!("API: http://{}", addr);
        println!("UI:  {}", ui);
    }

    server::serve(listener, router, server::wait_for_signal()).await?;
    info!("Server stopped");
    Ok(())
}

async fn infer(args: &InferArgs) -> Result<()> {
    let store = open(&resolve_config(&args.store, None).await?).await?;
    let schema = infer_schema(store.as_ref(), &args.collection, args.limit).await?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

async fn query(args: &QueryArgs) -> Result<()> {
    if args.limit > MAX_QUERY_LIMIT {
        bail!("--limit must be at most {}", MAX_QUERY_LIMIT);
    }

    let mut request = QueryRequest::new(&args.collection).with_limit(args.limit);
    if let Some(raw) = &args.filters {
        request.filters = parse_where(raw)?;
    }
    if let Some(field) = &args.order_by {
        let direction = if args.desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        request = request.with_order_by(field, direction);
    }
    if let Some(id) = &args.start_after {
        request = request.with_start_after(id);
    }

    let store = open(&resolve_config(&args.store, None).await?).await?;
    let response = run_query(store.as_ref(), &request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn export(args: &ExportArgs) -> Result<()> {
    let format = ExportFormat::parse(&args.format)?;
    let mut request = ExportRequest::new(&args.collection, format).with_limit(args.limit);
    if let Some(columns) = parse_columns(args.columns.as_deref()) {
        request = request.with_columns(columns);
    }
    request.validate()?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(request.filename()));

    let config = resolve_config(&args.store, None).await?;
    let store = open(&config).await?;
    let mut stream = export_stream(store, request, config.export_page_size)?;

    let mut file = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut written: u64 = 0;
    while let Some(chunk) = stream.try_next().await? {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        written = written.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
    }
    file.flush().await?;

    info!(bytes = written, "Export written");
    println!("Output: {}", output.display());
    Ok(())
}

async fn collections(args: &StoreArgs) -> Result<()> {
    let store = open(&resolve_config(args, None).await?).await?;
    for name in store.list_collections().await? {
        println!("{}", name);
    }
    Ok(())
}

async fn setup(args: &SetupArgs) -> Result<()> {
    let path = FptConfig::default_path()?;
    let mut config = FptConfig::load_from(&path).await;

    if let Some(project) = &args.project {
        config.project_id = Some(project.clone());
    }
    if let Some(port) = args.port {
        if port == 0 {
            bail!("--port must be between 1 and 65535");
        }
        config.port = port;
    }
    if args.enable_writes {
        config.write_enabled = true;
    }
    if args.disable_writes {
        config.write_enabled = false;
    }

    let needs_token = config.write_enabled && config.write_token.is_none();
    let new_token = (args.rotate_token || needs_token).then(generate_write_token);
    if let Some(token) = &new_token {
        config.write_token = Some(token.clone());
    }

    config.save_to(&path).await?;
    info!(path = %path.display(), "Saved configuration");

    println!("Config: {}", path.display());
    println!("Project: {}", config.project_id.as_deref().unwrap_or("(unset)"));
    println!("Port: {}", config.port);
    println!(
        "Writes: {}",
        if config.write_enabled { "enabled" } else { "disabled" }
    );
    if let Some(token) = new_token {
        println!("Write token: {}", token);
        println!("Send it in the X-FPT-Write-Token header; it will not be shown again.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_aliases() {
        for alias in ["serve", "up", "start"] {
            let cli = Cli::try_parse_from(["fpt", alias, "--port", "5000"]).unwrap();
            assert!(matches!(cli.command, Command::Serve(ServeArgs { port: Some(5000), .. })));
        }
        let cli = Cli::try_parse_from(["fpt", "dev"]).unwrap();
        match cli.command {
            Command::Run(args) => assert_eq!(args.ui, "http://127.0.0.1:5173"),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_schema_infer_subcommand() {
        let cli =
            Cli::try_parse_from(["fpt", "schema", "infer", "--collection", "users"]).unwrap();
        match cli.command {
            Command::Schema {
                action: SchemaCommand::Infer(args),
            } => {
                assert_eq!(args.collection, "users");
                assert_eq!(args.limit, DEFAULT_SAMPLE_LIMIT);
            }
            _ => panic!("expected schema infer"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["fpt", "collections", "-vv", "--log-format", "json"]).unwrap();
        assert_eq!(cli.global.verbose, 2);
        assert_eq!(cli.global.log_format, LogFormatArg::Json);
    }

    #[test]
    fn test_setup_write_flags_conflict() {
        assert!(
            Cli::try_parse_from(["fpt", "setup", "--enable-writes", "--disable-writes"]).is_err()
        );
    }

    #[test]
    fn test_desc_requires_order_by() {
        assert!(Cli::try_parse_from(["fpt", "query", "--collection", "c", "--desc"]).is_err());
    }
}
