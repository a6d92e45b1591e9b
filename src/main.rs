// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use major_income::logging::init_logging;
use major_income::{
    Config, FileSource, HttpSource, IncomeStatistics, IncomeStore, MajorIncomeRecord,
    MirrorStatus, PayloadSource, PayloadStatus, Pipeline, RecordParser, StoreError,
};

#[derive(Parser, Debug)]
#[command(name = "major-income", version, about = "Ingest and query median income by academic major")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, parse and store the dataset
    Run {
        #[arg(long, conflicts_with = "file")]
        url: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        major_column: Option<usize>,
        #[arg(long)]
        income_column: Option<usize>,
        /// Write a JSON mirror of the stored snapshot here
        #[arg(long)]
        mirror: Option<PathBuf>,
    },
    /// All majors, highest income first
    List,
    /// Top N majors by income
    Top {
        #[arg(default_value_t = 10)]
        n: usize,
    },
    /// Majors with min <= income <= max
    Range { min: u64, max: u64 },
    /// Look up one major by exact name
    Show { major: String },
    /// Count, average, min and max income
    Stats,
    /// Delete every stored major
    Clear,
    /// Browse stored majors in the terminal
    View,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = cli.database {
        config.database.path = db;
    }

    let store = config.store();

    match cli.command {
        Command::Run {
            url,
            file,
            major_column,
            income_column,
            mirror,
        } => {
            if let Some(c) = major_column {
                config.parser.major_column = c;
            }
            if let Some(c) = income_column {
                config.parser.income_column = c;
            }
            if let Some(m) = mirror {
                config.mirror.path = Some(m);
            }
            run_pipeline(&config, &store, url, file)
        }
        Command::List => {
            let records = store.get_all().context("Query failed")?;
            println!("✓ Retrieved {} majors", records.len());
            print_records(&records);
            Ok(())
        }
        Command::Top { n } => {
            let records = store.get_top_n(n).context("Query failed")?;
            println!("✓ Top {} majors (showing {})", n, records.len());
            print_records(&records);
            Ok(())
        }
        Command::Range { min, max } => match store.get_by_income_range(min, max) {
            Ok(records) => {
                println!(
                    "✓ Retrieved {} majors in range ${}-${}",
                    records.len(),
                    format_dollars(min),
                    format_dollars(max)
                );
                print_records(&records);
                Ok(())
            }
            Err(e @ StoreError::InvalidRange { .. }) => {
                eprintln!("✗ {}", e);
                eprintln!("   Usage: major-income range <MIN> <MAX> with MIN <= MAX");
                std::process::exit(2);
            }
            Err(e) => Err(e).context("Query failed"),
        },
        Command::Show { major } => {
            match store.get_by_name(&major).context("Query failed")? {
                Some(record) => {
                    println!("✓ Found major: {} (${})", record.major, format_dollars(record.income));
                    println!("   id:      {}", record.id);
                    println!("   updated: {}", record.timestamp.to_rfc3339());
                }
                None => println!("✗ Major '{}' not found", major),
            }
            Ok(())
        }
        Command::Stats => {
            let stats = store.get_statistics().context("Query failed")?;
            print_statistics(&stats);
            Ok(())
        }
        Command::Clear => {
            let removed = store.clear_all().context("Clear failed")?;
            println!("✓ Cleared {} majors from {}", removed, store.path().display());
            Ok(())
        }
        Command::View => run_ui_mode(&store),
    }
}

fn run_pipeline(
    config: &Config,
    store: &dyn IncomeStore,
    url: Option<String>,
    file: Option<PathBuf>,
) -> Result<()> {
    println!("🗄️  Major income import");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let source: Box<dyn PayloadSource> = match (url, file) {
        (_, Some(file)) => Box::new(FileSource::new(file)),
        (Some(url), None) => Box::new(
            HttpSource::new(url, config.fetch_timeout(), &config.source.user_agent)
                .context("Failed to build HTTP client")?,
        ),
        (None, None) => config.payload_source()?,
    };

    let parser = RecordParser::new(config.parser_config()?);
    let mut pipeline = Pipeline::new(source, parser, store);
    if let Some(path) = &config.mirror.path {
        pipeline = pipeline.with_mirror(path.clone());
    }

    let report = pipeline.run().context("Import failed")?;
    println!("{}", report);

    if let Some(digest) = &report.payload_digest {
        println!("   payload sha256: {}", digest);
    }
    match &report.mirror {
        MirrorStatus::Written { path, entries } => {
            println!("✓ Wrote {} entries to {}", entries, path)
        }
        MirrorStatus::Failed(e) => println!("✗ JSON mirror not written: {}", e),
        MirrorStatus::NotConfigured => {}
    }

    if report.payload != PayloadStatus::Received {
        println!("   Nothing was stored this run; the existing snapshot is unchanged.");
    }

    Ok(())
}

fn print_records(records: &[MajorIncomeRecord]) {
    for (i, record) in records.iter().enumerate() {
        println!(
            "{:>4}. {:<45} ${:>12}",
            i + 1,
            truncate(&record.major, 45),
            format_dollars(record.income)
        );
    }
}

fn print_statistics(stats: &IncomeStatistics) {
    println!("✓ Statistics retrieved: {} majors", stats.count);
    let show = |v: Option<u64>| v.map(format_dollars).unwrap_or_else(|| "n/a".to_string());

    println!(
        "   average: {}",
        stats
            .average
            .map(|a| format_dollars(a.round() as u64))
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("   min:     {}", show(stats.min));
    println!("   max:     {}", show(stats.max));
}

/// 1234567 → "1,234,567"
fn format_dollars(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(store: &dyn IncomeStore) -> Result<()> {
    let records = store.get_all().context("Failed to load majors")?;
    let stats = store.get_statistics().context("Failed to load statistics")?;

    if records.is_empty() {
        eprintln!("❌ No majors stored yet!");
        eprintln!("   Run: major-income run --url <URL>");
        eprintln!("   to import the dataset first.");
        std::process::exit(1);
    }

    let mut app = ui::App::new(records, stats);
    ui::run_ui(&mut app)?;
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_store: &dyn IncomeStore) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use web API: cargo run --bin income-server --features server");
    std::process::exit(1);
}
