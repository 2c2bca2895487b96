use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use album_refresh::config::{Config, NotifySink};
use album_refresh::db::SqliteDb;
use album_refresh::logging;
use album_refresh::refresh::{
    AnalyzerRegistry, AssetAccurateRefresh, AssetChangeData, JsonLinesTransport, LogTransport,
    NotificationTransport,
};

struct Args {
    batch: Option<PathBuf>,
    config_path: Option<PathBuf>,
    init: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        batch: None,
        config_path: None,
        init: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("album-refresh {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--batch" | "-b" => {
                if i + 1 < args.len() {
                    parsed.batch = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --batch requires a path argument");
                    std::process::exit(1);
                }
            }
            "--init" => parsed.init = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"album-refresh - apply a batch of asset changes to album counts and covers

USAGE:
    album-refresh --batch FILE [OPTIONS]

OPTIONS:
    --batch, -b FILE    JSON array of asset changes to apply
    --init              Create the album store schema if missing
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    ALBUM_REFRESH_CONFIG   Path to config file (overrides default location)
    ALBUM_REFRESH_LOG      Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/album-refresh/config.toml"#
    );
}

fn read_batch(path: &Path) -> Result<Vec<AssetChangeData>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read change batch {}", path.display()))?;
    let changes = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse change batch {}", path.display()))?;
    Ok(changes)
}

fn main() -> Result<()> {
    let args = parse_args();

    if let Err(e) = logging::init(None) {
        eprintln!("Warning: logging unavailable: {:#}", e);
    }

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if !args.init && !config.db_path.exists() {
        bail!(
            "Album store {} does not exist (run with --init to create it)",
            config.db_path.display()
        );
    }
    let db = SqliteDb::open(&config.db_path).context("Failed to open album store")?;
    if args.init {
        db.initialize().context("Failed to initialize album store")?;
        tracing::info!(path = %config.db_path.display(), "Album store initialized");
    }

    let Some(batch_path) = args.batch else {
        if args.init {
            return Ok(());
        }
        bail!("--batch is required");
    };
    let changes = read_batch(&batch_path)?;

    let mut service = AssetAccurateRefresh::new(db, Arc::new(AnalyzerRegistry::new()), config.refresh.clone());
    service.refresh_album(changes).context("Album refresh failed")?;

    let transport: Box<dyn NotificationTransport> = match config.notify.sink {
        NotifySink::Log => Box::new(LogTransport),
        NotifySink::Stdout => Box::new(JsonLinesTransport::new(std::io::stdout())),
    };
    let delivered = service
        .notify(transport.as_ref())
        .context("Failed to dispatch notifications")?;

    tracing::info!(delivered, "Notifications dispatched");
    Ok(())
}
