//! `hagaki` command line: renders the address side of New Year cards from a
//! local address book and keeps the per-year sent marks up to date.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hagaki::postal::format_postal_code;
use hagaki::source::SENT_MARK;
use hagaki::{AddressBook, AddressEntry, Config, DEFAULT_CONFIG_FILE, Hagaki, HagakiBuilder};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "hagaki")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render one card per pending address into a PDF
    Generate {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Include addresses already marked as sent or in mourning
        #[arg(long)]
        all: bool,

        /// Output PDF (overrides output_file in the config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print every address with its markers for the configured year
    List {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Mark every pending address as sent
    MarkSent {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Only show which rows would be marked
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {
        Command::Generate {
            config,
            all,
            output,
        } => run_generate(&config, all, output),
        Command::List { config } => run_list(&config),
        Command::MarkSent { config, dry_run } => run_mark_sent(&config, dry_run),
    }
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn load(config_path: &Path) -> Result<(Config, AddressBook)> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let book = AddressBook::open(&config.source_file).with_context(|| {
        format!(
            "Failed to read address book {}",
            config.source_file.display()
        )
    })?;
    log::debug!(
        "Loaded {} (year {}, source {})",
        config_path.display(),
        config.year,
        config.source_file.display()
    );
    Ok((config, book))
}

fn run_generate(config_path: &Path, all: bool, output: Option<PathBuf>) -> Result<()> {
    let start = Instant::now();
    let (config, book) = load(config_path)?;

    let entries = if all {
        book.entries(config.year)?
    } else {
        book.pending(config.year)?
    };
    if entries.is_empty() {
        println!("no targets");
        return Ok(());
    }
    log::info!("Rendering {} cards", entries.len());

    let hagaki: Hagaki = HagakiBuilder::from_config(&config)
        .build()
        .context("Failed to prepare renderer")?;
    let addresses: Vec<_> = entries.into_iter().map(|entry| entry.record).collect();
    let output = output.unwrap_or_else(|| config.output_file.clone());
    let metrics = hagaki
        .render_to_file(&config.sender, &addresses, &output)
        .with_context(|| format!("Failed to render {}", output.display()))?;

    if metrics.unmeasured_glyphs() > 0 {
        log::warn!(
            "{} glyphs could not be measured and were drawn uncentred",
            metrics.unmeasured_glyphs()
        );
    }
    log::debug!(
        "Wrote {} bytes in {:.1} ms",
        metrics.total_bytes,
        start.elapsed().as_secs_f64() * 1000.0
    );
    println!("{} pages -> {}", metrics.page_count(), output.display());
    Ok(())
}

fn run_list(config_path: &Path) -> Result<()> {
    let (config, book) = load(config_path)?;
    for entry in book.entries(config.year)? {
        println!("{}", list_line(&entry));
    }
    Ok(())
}

fn run_mark_sent(config_path: &Path, dry_run: bool) -> Result<()> {
    let (config, mut book) = load(config_path)?;
    let pending = book.pending(config.year)?;
    if pending.is_empty() {
        println!("no targets");
        return Ok(());
    }
    for entry in &pending {
        println!("row {}: {}", entry.record.row, list_line(entry));
    }
    if dry_run {
        println!("{} rows would be marked (dry run)", pending.len());
        return Ok(());
    }

    let rows: Vec<usize> = pending.iter().map(|entry| entry.record.row).collect();
    let changed = book.mark_sent(config.year, &rows)?;
    book.save()
        .with_context(|| format!("Failed to update {}", config.source_file.display()))?;
    println!("{changed} rows marked as sent");
    Ok(())
}

fn list_line(entry: &AddressEntry) -> String {
    let record = &entry.record;
    let mark = |checked: bool| if checked { SENT_MARK } else { "  " };
    let others = if record.joint_names.is_empty() {
        ""
    } else {
        "(ほか)"
    };
    let address2 = record.address2.as_deref().unwrap_or("");
    format!(
        "[送:{} 受:{} {}] {} {}{}{} 〒{} {}{}",
        mark(entry.status.sent),
        mark(entry.status.received),
        if entry.status.mourning { "喪" } else { "  " },
        record.family_name,
        record.given_name,
        others,
        record.honorific,
        format_postal_code(&record.postal_code),
        record.address1,
        address2
    )
}
