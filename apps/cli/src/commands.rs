//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use medcontact_core::{BatchConfig, BatchProgress, RecordResult, run_batch};
use medcontact_shared::{
    AppConfig, EngineConfig, MandatoryPolicy, ProfileKind, TableSchemaKind, expand_home,
    init_config, load_config, load_config_from, validate_credentials_config,
};
use medcontact_storage::{
    CityQuota, DerivedColumns, TableSchema, load_table, normalize_table, select_complete,
    write_table,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// MedContact: fill in physician contact details from web search.
#[derive(Parser)]
#[command(
    name = "medcontact",
    version,
    about = "Enrich physician contact tables (address, phone, e-mail) with a search-grounded model.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.medcontact/medcontact.toml.
    #[arg(long, global = true, env = "MEDCONTACT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich every row of a physician table.
    Enrich(EnrichArgs),

    /// Convert an arbitrary physician list into the extended input layout.
    Normalize {
        /// Source CSV.
        #[arg(short, long)]
        input: PathBuf,

        /// Destination CSV.
        #[arg(short, long, default_value = "input.csv")]
        output: PathBuf,
    },

    /// Extract the most complete rows per city from an enriched table.
    Select {
        /// Enriched CSV.
        #[arg(short, long)]
        input: PathBuf,

        /// Destination CSV.
        #[arg(short, long, default_value = "output-extract.csv")]
        output: PathBuf,

        /// Table layout (legacy or extended). Defaults to the config value.
        #[arg(long)]
        schema: Option<TableSchemaKind>,

        /// Rows to take per city, as City=N. Repeat for several cities.
        #[arg(short, long = "quota", required = true)]
        quotas: Vec<CityQuota>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags of `medcontact enrich`. Every flag overrides the config file.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct EnrichArgs {
    /// Physician table to enrich.
    #[arg(short, long, default_value = "input.csv")]
    pub input: PathBuf,

    /// Directory for the enriched table and transcript.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Table layout: legacy or extended.
    #[arg(long)]
    pub schema: Option<TableSchemaKind>,

    /// Round table: standard or extended.
    #[arg(long)]
    pub profile: Option<ProfileKind>,

    /// Key file (one API key per line). Repeat to add keys.
    #[arg(short, long = "key-file")]
    pub key_files: Vec<PathBuf>,

    /// Mandatory round handling: advisory or enforce.
    #[arg(long)]
    pub mandatory: Option<MandatoryPolicy>,

    /// Attempts per round before giving up on it.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Records per chunk (defaults to an even split across keys).
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Model identifier.
    #[arg(long)]
    pub model: Option<String>,

    /// Use the streaming endpoint.
    #[arg(long)]
    pub stream: bool,

    /// Skip inter-round delays and backoffs.
    #[arg(long, hide = true)]
    pub no_delays: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "medcontact=info",
        1 => "medcontact=debug",
        _ => "medcontact=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Enrich(args) => cmd_enrich(config_path.as_deref(), args).await,
        Command::Normalize { input, output } => cmd_normalize(&input, &output),
        Command::Select {
            input,
            output,
            schema,
            quotas,
        } => cmd_select(config_path.as_deref(), &input, &output, schema, &quotas),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

/// Layer CLI flags over the config file.
fn apply_overrides(config: &mut AppConfig, args: &EnrichArgs) {
    if let Some(dir) = &args.output_dir {
        config.defaults.output_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(schema) = args.schema {
        config.defaults.schema = schema;
    }
    if let Some(profile) = args.profile {
        config.enrichment.profile = profile;
    }
    if !args.key_files.is_empty() {
        config.credentials.files = args
            .key_files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
    }
    if let Some(mandatory) = args.mandatory {
        config.enrichment.mandatory = mandatory;
    }
    if args.max_attempts.is_some() {
        config.enrichment.max_attempts = args.max_attempts;
    }
    if args.chunk_size.is_some() {
        config.enrichment.chunk_size = args.chunk_size;
    }
    if let Some(model) = &args.model {
        config.provider.model = model.clone();
    }
    if args.stream {
        config.provider.stream = true;
    }
}

fn batch_config(config: &AppConfig, args: &EnrichArgs) -> BatchConfig {
    let mut engine = EngineConfig::from(config);
    if args.no_delays {
        engine = engine.without_delays();
    }
    BatchConfig {
        input: args.input.clone(),
        output_dir: expand_home(&config.defaults.output_dir),
        schema: config.defaults.schema,
        key_files: config
            .credentials
            .files
            .iter()
            .filter(|f| !f.trim().is_empty())
            .map(|f| expand_home(f))
            .collect(),
        provider: config.provider.clone(),
        engine,
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_enrich(config_path: Option<&Path>, args: EnrichArgs) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    apply_overrides(&mut config, &args);
    validate_credentials_config(&config)?;

    let batch = batch_config(&config, &args);
    info!(
        input = %batch.input.display(),
        schema = ?batch.schema,
        profile = ?batch.engine.profile,
        keys = batch.key_files.len(),
        model = %batch.provider.model,
        "starting enrichment"
    );

    let progress = Arc::new(CliProgress::new());
    let summary = run_batch(&batch, progress).await?;

    println!();
    println!("  Enrichment finished.");
    println!("  Run:        {}", summary.run_id);
    println!("  Records:    {}", summary.records);
    println!("  Failed:     {}", summary.failed);
    println!("  Table:      {}", summary.paths.table.display());
    println!("  Transcript: {}", summary.paths.transcript.display());
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    println!();
    Ok(())
}

fn cmd_normalize(input: &Path, output: &Path) -> Result<()> {
    if !input.exists() {
        return Err(eyre!("input file '{}' not found", input.display()));
    }
    let rows = normalize_table(input, output)?;
    println!("Normalized {rows} rows into {}", output.display());
    Ok(())
}

fn cmd_select(
    config_path: Option<&Path>,
    input: &Path,
    output: &Path,
    schema: Option<TableSchemaKind>,
    quotas: &[CityQuota],
) -> Result<()> {
    let schema = match schema {
        Some(schema) => schema,
        None => resolve_config(config_path)?.defaults.schema,
    };
    let table = load_table(input, TableSchema::new(schema))?;
    let selection = select_complete(&table.records, quotas);
    write_table(output, &table.with_records(selection.records), DerivedColumns::Include)?;

    println!("Extraction summary:");
    for (city, count) in &selection.counts {
        println!("  {city}: {count} rows");
    }
    println!("Written to {}", output.display());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Progress bar over records, updated from the worker tasks.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Self { bar }
    }
}

impl BatchProgress for CliProgress {
    fn started(&self, records: usize, chunks: usize) {
        self.bar.set_length(records as u64);
        self.bar
            .set_message(format!("{chunks} chunk(s) in flight"));
    }

    fn record_done(&self, result: &RecordResult) {
        self.bar.inc(1);
        let status = if result.is_ok() { "ok" } else { "failed" };
        self.bar
            .set_message(format!("{} {status}", result.original.label()));
    }

    fn chunk_failed(&self, chunk: usize, error: &str) {
        self.bar
            .println(format!("chunk {chunk} kept its original rows: {error}"));
    }

    fn finished(&self) {
        self.bar.finish_and_clear();
    }
}
