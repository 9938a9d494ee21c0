use anyhow::{Context, Result, ensure};
use clap::Parser;
use journal_cursor::{Start, Walk, check, walk};
use journal_reader::{Cursor, CursorState, JournalReader, OpenFlags, ReaderConfig, SystemdBackend};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "journal-cursor")]
#[command(about = "Walks the systemd journal and prints entry cursors", long_about = None)]
struct Args {
    /// YAML reader configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// File holding the last printed cursor (overrides the configuration)
    #[arg(long, value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// Comma-separated open flags, e.g. local-only,system (overrides the configuration)
    #[arg(long)]
    flags: Option<OpenFlags>,

    /// Maximum number of entries to print
    #[arg(long, default_value_t = 10)]
    count: u64,

    /// Walk backward from the end of the journal instead of resuming
    #[arg(long)]
    from_tail: bool,

    /// Walk backward from the entry before CURSOR instead of resuming
    #[arg(long, value_name = "CURSOR", conflicts_with = "from_tail")]
    before: Option<Cursor>,

    /// Only check whether CURSOR still names an entry
    #[arg(long, value_name = "CURSOR", conflicts_with_all = ["from_tail", "before"])]
    check: Option<Cursor>,

    /// Tracing log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> Result<ReaderConfig> {
    let mut config = match &args.config {
        Some(path) => ReaderConfig::from_path(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display()))?,
        None => ReaderConfig::default(),
    };

    if let Some(flags) = args.flags {
        config = config.with_flags(flags);
    }
    if let Some(path) = &args.state_file {
        config = config.with_state_file(path);
    }

    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;

    let backend = SystemdBackend::load().context("Failed to load libsystemd")?;
    let mut reader = JournalReader::open_with_config(backend, &config)
        .context("Failed to open the system journal")?;

    if let Some(cursor) = &args.check {
        let found = check(&mut reader, cursor)?;
        ensure!(found, "cursor {cursor} does not name an entry of this journal");
        println!("{cursor}");
        return Ok(());
    }

    let state = config.state_file.clone().map(CursorState::new);
    let saved = match &state {
        Some(state) => state.load().with_context(|| {
            format!("Failed to read cursor state: {}", state.path().display())
        })?,
        None => None,
    };

    let start = match (&args.before, args.from_tail) {
        (Some(cursor), _) => Start::Before(cursor.clone()),
        (None, true) => Start::Tail,
        (None, false) => Start::Resume,
    };

    let walk_opts = Walk {
        start,
        count: args.count,
    };
    let last = walk(
        &mut reader,
        saved.as_ref(),
        &walk_opts,
        &mut std::io::stdout().lock(),
    )?;

    if let (Start::Resume, Some(state), Some(last)) = (&walk_opts.start, &state, &last) {
        state.save(last).with_context(|| {
            format!("Failed to save cursor state: {}", state.path().display())
        })?;
        info!(cursor = %last, "saved position");
    }

    Ok(())
}
