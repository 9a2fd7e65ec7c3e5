//! GexLab CLI: submit, analyze, plan, snapshot and store commands.
//!
//! Commands:
//! - `submit`: merge one JSON submission into the symbol's stored state and,
//!   once complete, score, rank and archive the analysis
//! - `analyze`: one-shot analysis of complete submissions in parallel
//! - `plan`: observation parameters for the current market regime
//! - `snapshot`: add a key-level snapshot to the day's analysis document
//! - `store status` / `store clear`: inspect or reset accumulated state

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::{Path, PathBuf};

use gexlab_core::fetch_plan::FetchPlan;
use gexlab_core::{MarketParams, PipelineConfig, TargetRecord};
use gexlab_runner::{
    analyze_batch, leaders, save_artifacts, validate_symbol, AnalysisArchive, BatchItem,
    JsonFileStore, Pipeline, PipelineOutcome, RecordStore, Session, SnapshotKind,
};

#[derive(Parser)]
#[command(
    name = "gexlab",
    about = "GexLab CLI: options positioning analysis and strategy ranking"
)]
struct Cli {
    /// Pipeline configuration (TOML). Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct MarketArgs {
    /// VIX level.
    #[arg(long)]
    vix: Option<f64>,

    /// IV rank of the instrument (0-100).
    #[arg(long)]
    ivr: Option<f64>,

    /// 30-day implied volatility.
    #[arg(long)]
    iv30: Option<f64>,

    /// 20-day historical volatility (same units as --iv30).
    #[arg(long)]
    hv20: Option<f64>,

    /// Beta to the index.
    #[arg(long)]
    beta: Option<f64>,

    /// Next earnings date (YYYY-MM-DD).
    #[arg(long)]
    earnings: Option<String>,
}

impl MarketArgs {
    /// All four core parameters or none.
    fn params(&self, as_of: NaiveDate) -> Result<Option<MarketParams>> {
        let (vix, ivr, iv30, hv20) = match (self.vix, self.ivr, self.iv30, self.hv20) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            (None, None, None, None) => return Ok(None),
            _ => bail!("--vix, --ivr, --iv30 and --hv20 must be given together"),
        };
        let mut params = MarketParams::new(vix, ivr, iv30, hv20);
        params.beta = self.beta;
        params.as_of = Some(as_of);
        params.earnings_date = self
            .earnings
            .as_deref()
            .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
            .transpose()
            .context("--earnings must be YYYY-MM-DD")?;
        params.validate()?;
        Ok(Some(params))
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Intraday,
    Close,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a JSON submission into stored state; rank once complete.
    Submit {
        /// Submission file (JSON).
        file: PathBuf,

        /// Symbol to file the submission under. Defaults to the record's.
        #[arg(long)]
        symbol: Option<String>,

        #[command(flatten)]
        market: MarketArgs,

        /// Directory of accumulated state.
        #[arg(long, default_value = "data/state")]
        state_dir: PathBuf,

        /// Directory of analysis documents.
        #[arg(long, default_value = "data/archive")]
        archive_dir: PathBuf,

        /// Write analysis.json, ranking.csv and report.md here when complete.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// One-shot analysis of complete submissions, in parallel.
    Analyze {
        /// Submission files (JSON).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        market: MarketArgs,
    },
    /// Print observation parameters for a market regime.
    Plan {
        #[command(flatten)]
        market: MarketArgs,
    },
    /// Add a key-level snapshot to today's analysis document.
    Snapshot {
        /// Submission file (JSON) holding the refreshed levels.
        file: PathBuf,

        #[arg(long)]
        symbol: Option<String>,

        #[arg(long, value_enum, default_value = "intraday")]
        kind: KindArg,

        #[arg(long, default_value = "")]
        note: String,

        #[arg(long, default_value = "data/archive")]
        archive_dir: PathBuf,
    },
    /// Accumulated state management.
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// List symbols with live state.
    Status {
        #[arg(long, default_value = "data/state")]
        state_dir: PathBuf,
    },
    /// Remove state for one symbol, or all with --all.
    Clear {
        symbol: Option<String>,

        #[arg(long, default_value_t = false)]
        all: bool,

        #[arg(long, default_value = "data/state")]
        state_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let now = chrono::Local::now().naive_local();

    match cli.command {
        Commands::Submit {
            file,
            symbol,
            market,
            state_dir,
            archive_dir,
            output_dir,
        } => run_submit(
            config,
            &file,
            symbol.as_deref(),
            &market,
            &state_dir,
            &archive_dir,
            output_dir.as_deref(),
            now,
        ),
        Commands::Analyze { files, market } => run_analyze(config, &files, &market, now),
        Commands::Plan { market } => run_plan(&market, now),
        Commands::Snapshot {
            file,
            symbol,
            kind,
            note,
            archive_dir,
        } => run_snapshot(&file, symbol.as_deref(), kind, &note, &archive_dir, now),
        Commands::Store { action } => match action {
            StoreAction::Status { state_dir } => run_store_status(&config, &state_dir, now),
            StoreAction::Clear {
                symbol,
                all,
                state_dir,
            } => run_store_clear(&config, symbol.as_deref(), all, &state_dir),
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn read_submission(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

#[allow(clippy::too_many_arguments)]
fn run_submit(
    config: PipelineConfig,
    file: &Path,
    symbol: Option<&str>,
    market: &MarketArgs,
    state_dir: &Path,
    archive_dir: &Path,
    output_dir: Option<&Path>,
    now: NaiveDateTime,
) -> Result<()> {
    let submission = read_submission(file)?;
    let params = market.params(now.date())?;
    log::info!("submit: {} (market params: {})", file.display(), params.is_some());
    let ttl = config.aggregation.ttl_secs;
    let mut store = JsonFileStore::open(state_dir, ttl)?;
    let mut session = Session::new(Pipeline::new(config)?, &mut store);

    let outcome = session.submit(symbol, &submission, params.as_ref(), now)?;
    print_outcome(&outcome);

    if let Some(analysis) = outcome.analysis {
        let archive = AnalysisArchive::open(archive_dir)?;
        let mut doc = archive.load_or_new(&analysis.symbol, now)?;
        doc.record_analysis(analysis);
        let path = archive.save(&doc)?;
        println!("Analysis archived to: {}", path.display());

        if let Some(dir) = output_dir {
            let run_dir = save_artifacts(&doc, dir)?;
            println!("Artifacts saved to: {}", run_dir.display());
        }
    }
    Ok(())
}

fn print_outcome(outcome: &PipelineOutcome) {
    let agg = &outcome.aggregation;
    let s = &agg.validation.summary;
    println!(
        "{}: round {} ({:?}), {}/{} fields ({}%)",
        outcome.symbol().unwrap_or("?"),
        agg.cache.history.len(),
        agg.report.action,
        s.provided,
        s.total_required,
        s.completion_pct
    );
    for check in outcome.calculation_log.flagged() {
        println!("  check: {} = {} ({})", check.field, check.value, check.note);
    }

    let Some(analysis) = &outcome.analysis else {
        if let Some(guide) = outcome.guide() {
            println!("\n{guide}");
        }
        return;
    };

    let sc = &analysis.scoring;
    println!(
        "\nScore {:.1}/10 -> {}  ({} {:.0}%, {:?} bias)",
        sc.total, sc.entry.decision, sc.scenario.kind, sc.scenario.probability, sc.scenario.bias
    );
    println!("  {}", sc.breakdown());
    for w in &sc.risk_warnings {
        println!("  warning: {w}");
    }

    println!("\n{:>3}  {:<18} {:>6} {:>8} {:>7} {:>6}", "#", "Strategy", "Win%", "EV", "RAR", "Score");
    for e in &analysis.ranking.entries {
        println!(
            "{:>3}  {:<18} {:>6.0} {:>8.2} {:>7.3} {:>6.1}{}",
            e.rank,
            e.candidate.name(),
            e.win_probability * 100.0,
            e.ev,
            e.rar,
            e.composite,
            if e.candidate.veto.vetoed { "  (vetoed)" } else { "" }
        );
    }
    for d in &analysis.strategies.dropped {
        println!("  dropped {}: {}", d.archetype, d.reason);
    }
}

fn run_analyze(
    config: PipelineConfig,
    files: &[PathBuf],
    market: &MarketArgs,
    now: NaiveDateTime,
) -> Result<()> {
    let params = market.params(now.date())?;
    let items = files
        .iter()
        .map(|f| {
            Ok(BatchItem {
                submission: read_submission(f)?,
                params: params.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let pipeline = Pipeline::new(config)?;
    let results = analyze_batch(&pipeline, &items, now);

    for r in &results {
        let file = files[r.index].display();
        match &r.outcome {
            Err(e) => eprintln!("{file}: {e}"),
            Ok(o) if !o.is_ready() => println!(
                "{file}: incomplete ({}% of fields)",
                o.aggregation.validation.summary.completion_pct
            ),
            Ok(_) => {}
        }
    }

    let board = leaders(&results);
    if board.is_empty() {
        println!("No complete submissions.");
        return Ok(());
    }
    println!("{:<8} {:<18} {:>6} {:>8} {:>6}", "Symbol", "Best", "Score", "EV", "Regime");
    for l in &board {
        println!(
            "{:<8} {:<18} {:>6.1} {:>8.2} {:>6.1}",
            l.symbol,
            l.archetype.name(),
            l.composite,
            l.ev,
            l.score
        );
    }
    Ok(())
}

fn run_plan(market: &MarketArgs, now: NaiveDateTime) -> Result<()> {
    let plan = match market.params(now.date())? {
        Some(p) => FetchPlan::for_market(&p),
        None => FetchPlan::baseline(),
    };
    println!("Scenario: {:?}", plan.scenario);
    println!("Strikes:  {}", plan.strikes);
    println!("Expiries: {} / {} / {}", plan.dte_short, plan.dte_mid, plan.dte_long);
    println!("Window:   {}", plan.window);
    Ok(())
}

fn run_snapshot(
    file: &Path,
    symbol: Option<&str>,
    kind: KindArg,
    note: &str,
    archive_dir: &Path,
    now: NaiveDateTime,
) -> Result<()> {
    let record = TargetRecord::from_json(&read_submission(file)?)?;
    let Some(raw) = symbol.or_else(|| record.symbol()) else {
        bail!("submission carries no symbol; pass --symbol");
    };
    let symbol = validate_symbol(raw)?;
    let kind = match kind {
        KindArg::Intraday => SnapshotKind::Intraday,
        KindArg::Close => SnapshotKind::Close,
    };

    let archive = AnalysisArchive::open(archive_dir)?;
    let mut doc = archive.load_or_new(&symbol, now)?;
    let snap = doc.add_snapshot(&record, kind, note, now);
    println!("{symbol} snapshot #{} ({:?})", snap.id, snap.kind);
    if snap.changes.is_empty() {
        println!("  no key-level changes");
    }
    for c in &snap.changes {
        match c.change_pct {
            Some(pct) => println!("  {}: {} -> {} ({:+.2}%)", c.level, c.old, c.new, pct),
            None => println!("  {}: {} -> {}", c.level, c.old, c.new),
        }
    }
    archive.save(&doc)?;
    Ok(())
}

fn run_store_status(config: &PipelineConfig, state_dir: &Path, now: NaiveDateTime) -> Result<()> {
    if !state_dir.exists() {
        println!("State directory does not exist: {}", state_dir.display());
        return Ok(());
    }
    let mut store = JsonFileStore::open(state_dir, config.aggregation.ttl_secs)?;
    let symbols = store.symbols()?;
    if symbols.is_empty() {
        println!("No stored state.");
        return Ok(());
    }
    println!("{:<8} {:<14} {:>6} {:<20}", "Symbol", "Status", "Rounds", "Updated");
    for s in symbols {
        // Loading evicts expired entries.
        match store.load(&s, now)? {
            Some(state) => println!(
                "{:<8} {:<14} {:>6} {:<20}",
                s,
                format!("{:?}", state.status),
                state.history.len(),
                state
                    .updated_at
                    .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
            ),
            None => println!("{s:<8} expired"),
        }
    }
    Ok(())
}

fn run_store_clear(
    config: &PipelineConfig,
    symbol: Option<&str>,
    all: bool,
    state_dir: &Path,
) -> Result<()> {
    let mut store = JsonFileStore::open(state_dir, config.aggregation.ttl_secs)?;
    match (symbol, all) {
        (Some(s), false) => {
            let key = validate_symbol(s)?;
            store.remove(&key)?;
            println!("Cleared {key}");
        }
        (None, true) => {
            let n = store.clear()?;
            println!("Cleared {n} symbols");
        }
        _ => bail!("pass either a symbol or --all"),
    }
    Ok(())
}
