//! CLI entry point for `clickguard`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use clickguard::config::{self, Config};
use clickguard::error::GuardError;
use clickguard::gateway::{Gateway, InvocationEvent, SpoolFlow};
use clickguard::model::tree::MimeTree;
use clickguard::rewrite::{proxied_url, Engine, UrlClassifier};
use clickguard::store::FsContentStore;

#[derive(Parser)]
#[command(
    name = "clickguard",
    version,
    about = "Rewrite email links to pass through a click-time checking service"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (overrides $CLICKGUARD_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite the links of one .eml file
    Rewrite {
        file: PathBuf,
        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print a JSON summary instead of the message
        #[arg(long)]
        json: bool,
    },
    /// Rewrite every .eml file in a directory
    Batch {
        dir: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show how URLs would be treated
    CheckUrl {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Run the mail-flow handler for one invocation event
    Handle {
        event: PathBuf,
        /// Spool directory with incoming/ and outgoing/ messages
        #[arg(long)]
        spool: PathBuf,
        /// Content store directory (defaults to store.root from the config)
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Rewrite { file, output, json } => {
            cmd_rewrite(&config, &file, output.as_deref(), json)
        }
        Commands::Batch { dir, output } => cmd_batch(&config, &dir, &output),
        Commands::CheckUrl { urls } => cmd_check_url(&config, &urls),
        Commands::Handle {
            event,
            spool,
            store,
        } => cmd_handle(&config, &event, &spool, store),
        Commands::InitConfig { force } => cmd_init_config(cli.config.as_deref(), force),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "clickguard.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Rewrite a single message file.
fn cmd_rewrite(config: &Config, path: &Path, output: Option<&Path>, json: bool) -> anyhow::Result<()> {
    if !path.exists() {
        return Err(GuardError::FileNotFound(path.to_path_buf()).into());
    }
    let engine = Engine::from_config(config)?;
    let raw = std::fs::read(path).map_err(|e| GuardError::io(path, e))?;

    let mut tree = MimeTree::parse(&raw)?;
    let modified = engine.process_message(&mut tree);
    let result = if modified { tree.to_bytes() } else { raw.clone() };

    if let Some(out) = output {
        std::fs::write(out, &result).map_err(|e| GuardError::io(out, e))?;
    }

    if json {
        let summary = serde_json::json!({
            "file": path.to_string_lossy(),
            "modified": modified,
            "parts": tree.len(),
            "bytes_in": raw.len(),
            "bytes_out": result.len(),
            "output": output.map(|p| p.to_string_lossy()),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if output.is_none() {
        std::io::Write::write_all(&mut std::io::stdout(), &result)?;
    } else if modified {
        eprintln!("  Rewrote links in {}", path.display());
    } else {
        eprintln!("  No links to rewrite in {}", path.display());
    }
    Ok(())
}

/// Per-run counters for `batch`.
#[derive(Default)]
struct BatchStats {
    rewritten: usize,
    unchanged: usize,
    failed: usize,
    bytes_in: u64,
    bytes_out: u64,
}

/// Rewrite every `.eml` file in a directory.
fn cmd_batch(config: &Config, dir: &Path, output: &Path) -> anyhow::Result<()> {
    if !dir.is_dir() {
        return Err(GuardError::FileNotFound(dir.to_path_buf()).into());
    }
    let engine = Engine::from_config(config)?;

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| GuardError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        println!("  No .eml files found in {}", dir.display());
        return Ok(());
    }
    std::fs::create_dir_all(output).map_err(|e| GuardError::io(output, e))?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Rewriting [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut stats = BatchStats::default();
    for (i, path) in files.iter().enumerate() {
        pb.set_position(i as u64);
        let raw = std::fs::read(path).map_err(|e| GuardError::io(path, e))?;
        stats.bytes_in += raw.len() as u64;

        let result = match engine.rewrite_bytes(&raw) {
            Ok(Some(bytes)) => {
                stats.rewritten += 1;
                bytes
            }
            Ok(None) => {
                stats.unchanged += 1;
                raw
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Copying message unchanged");
                stats.failed += 1;
                raw
            }
        };

        let Some(name) = path.file_name() else {
            continue;
        };
        let target = output.join(name);
        std::fs::write(&target, &result).map_err(|e| GuardError::io(&target, e))?;
        stats.bytes_out += result.len() as u64;
    }
    pb.finish_and_clear();

    print_batch_summary(output, &stats, files.len(), start.elapsed());
    Ok(())
}

fn print_batch_summary(output: &Path, stats: &BatchStats, total: usize, elapsed: std::time::Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  Batch complete:");
    println!("  {:<20} {}", "Messages", total);
    println!("  {:<20} {}", "Rewritten", stats.rewritten);
    println!("  {:<20} {}", "Unchanged", stats.unchanged);
    if stats.failed > 0 {
        println!("  {:<20} {}", "Unparseable", stats.failed);
    }
    println!("  {:<20} {}", "Bytes in", format_size(stats.bytes_in, BINARY));
    println!("  {:<20} {}", "Bytes out", format_size(stats.bytes_out, BINARY));
    println!("  {:<20} {:.2?}", "Time", elapsed);
    println!("  {:<20} {}", "Output directory", output.display());
    println!();
}

/// Print the decision for each URL.
fn cmd_check_url(config: &Config, urls: &[String]) -> anyhow::Result<()> {
    let classifier =
        UrlClassifier::with_patterns(config.rewrite.check_host.clone(), &config.rewrite.skip_patterns)?;

    for url in urls {
        match classifier.skip_reason(url) {
            Some(reason) => println!("  skip     {url}  ({reason})"),
            None => println!(
                "  rewrite  {url}\n           -> {}",
                proxied_url(classifier.check_host(), url)
            ),
        }
    }
    Ok(())
}

/// Handle one invocation event against a spool directory.
fn cmd_handle(config: &Config, event_path: &Path, spool: &Path, store: Option<PathBuf>) -> anyhow::Result<()> {
    let contents =
        std::fs::read_to_string(event_path).map_err(|e| GuardError::io(event_path, e))?;
    let event: InvocationEvent = serde_json::from_str(&contents)?;

    let root = store
        .or_else(|| config.store.root.clone())
        .ok_or(GuardError::StoreNotConfigured)?;
    let store = FsContentStore::open(root)?;
    let flow = SpoolFlow::new(spool, store.clone());

    let gateway = Gateway::from_config(config, flow, Some(store))?;
    let outcome = gateway.handle(&event)?;
    tracing::info!(message_id = %event.message_id, %outcome, "Handled event");

    println!("{}", serde_json::to_string_pretty(&outcome.response())?);
    Ok(())
}

/// Write the default configuration.
fn cmd_init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => config::config_file_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?,
    };
    if target.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            target.display()
        );
    }
    let written = config::save_config(&Config::default(), Some(&target))?;
    println!("  Wrote {}", written.display());
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "clickguard", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
