//! mvault CLI - Command line interface for model_vault
//!
//! Manages the local model library, its backup destination and the packs
//! that depend on stored blobs. Output is JSON on stdout so the CLI can be
//! driven by other tools; logs go to stderr.

use clap::{Parser, Subcommand};
use model_vault::{
    BlobLocation, BlobStatus, BulkAction, DeleteTarget, Hash, InventoryFilter, OperationState,
    SortKey, SortOrder, StorageRoot, SyncDirection, Vault, VaultConfig,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "mvault")]
#[command(about = "A content-addressed store for model weights with backup")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum StatusArg {
    Referenced,
    Orphan,
    Missing,
    #[value(alias = "backup_only")]
    BackupOnly,
}

impl From<StatusArg> for BlobStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Referenced => BlobStatus::Referenced,
            StatusArg::Orphan => BlobStatus::Orphan,
            StatusArg::Missing => BlobStatus::Missing,
            StatusArg::BackupOnly => BlobStatus::BackupOnly,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LocationArg {
    #[value(alias = "local_only")]
    LocalOnly,
    #[value(alias = "backup_only")]
    BackupOnly,
    Both,
    None,
}

impl From<LocationArg> for BlobLocation {
    fn from(arg: LocationArg) -> Self {
        match arg {
            LocationArg::LocalOnly => BlobLocation::LocalOnly,
            LocationArg::BackupOnly => BlobLocation::BackupOnly,
            LocationArg::Both => BlobLocation::Both,
            LocationArg::None => BlobLocation::None,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum SortArg {
    Name,
    Size,
    Status,
    Kind,
    Hash,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortKey::Name,
            SortArg::Size => SortKey::Size,
            SortArg::Status => SortKey::Status,
            SortArg::Kind => SortKey::Kind,
            SortArg::Hash => SortKey::Hash,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum DirectionArg {
    Backup,
    Restore,
}

impl From<DirectionArg> for SyncDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Backup => SyncDirection::Backup,
            DirectionArg::Restore => SyncDirection::Restore,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum TargetArg {
    Local,
    Backup,
    Both,
}

impl From<TargetArg> for DeleteTarget {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Local => DeleteTarget::Local,
            TargetArg::Backup => DeleteTarget::Backup,
            TargetArg::Both => DeleteTarget::Both,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum BulkArg {
    Backup,
    Restore,
    #[value(alias = "delete_local")]
    DeleteLocal,
    #[value(alias = "delete_backup")]
    DeleteBackup,
    #[value(alias = "delete_both")]
    DeleteBoth,
}

impl From<BulkArg> for BulkAction {
    fn from(arg: BulkArg) -> Self {
        match arg {
            BulkArg::Backup => BulkAction::Backup,
            BulkArg::Restore => BulkAction::Restore,
            BulkArg::DeleteLocal => BulkAction::DeleteLocal,
            BulkArg::DeleteBackup => BulkAction::DeleteBackup,
            BulkArg::DeleteBoth => BulkAction::DeleteBoth,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new config file
    Init {
        /// Local library root
        #[arg(long)]
        library: PathBuf,
        /// Directory holding one sub-directory per pack
        #[arg(long)]
        packs: PathBuf,
    },

    // === Library Commands ===
    /// Import a file into the local library
    Import {
        /// File to import
        file: PathBuf,
        /// Hash the content must have
        #[arg(short, long)]
        expect: Option<String>,
    },

    /// List inventory rows
    List {
        #[arg(short, long)]
        kind: Option<String>,
        #[arg(long)]
        status: Option<StatusArg>,
        #[arg(long)]
        location: Option<LocationArg>,
        /// Substring of name, hash or pack name
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long, default_value = "name")]
        sort: SortArg,
        /// Sort descending
        #[arg(long)]
        desc: bool,
    },

    /// Show counts and bytes per status and location
    Summary,

    /// Show packs that depend on a blob
    Impacts {
        hash: String,
    },

    /// Re-hash one blob and compare with its name
    Verify {
        hash: String,
        /// Check the backup copy instead of the local one
        #[arg(long)]
        backup: bool,
    },

    /// Re-hash every blob of a root
    VerifyAll {
        /// Check the backup root instead of the local one
        #[arg(long)]
        backup: bool,
    },

    /// Delete local copies of orphaned blobs
    Cleanup {
        #[arg(required = true)]
        hashes: Vec<String>,
    },

    // === Backup Commands ===
    /// Copy a local blob to the backup destination
    Backup {
        hash: String,
    },

    /// Copy a backed-up blob to the local library
    Restore {
        hash: String,
    },

    /// Copy everything missing on one side
    Sync {
        direction: DirectionArg,
    },

    /// Delete copies of a blob
    Delete {
        hash: String,
        #[arg(short, long)]
        target: TargetArg,
        /// Skip the last-copy and referenced-blob guards
        #[arg(long)]
        force: bool,
    },

    /// Apply one action to many blobs
    Bulk {
        action: BulkArg,
        #[arg(required = true)]
        hashes: Vec<String>,
        /// Skip the delete guards
        #[arg(long)]
        force: bool,
    },

    /// Show config and backup destination status
    Status,

    /// Change backup settings
    ConfigureBackup {
        /// Backup destination directory
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// Back up newly imported blobs right away
        #[arg(long)]
        auto_backup: Option<bool>,
        /// Refuse to delete a blob's last copy unless forced
        #[arg(long)]
        warn_last_copy: Option<bool>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            let (code, exit_code) = match err.downcast_ref::<model_vault::Error>() {
                Some(vault_err) => (vault_err.code(), vault_err.exit_code()),
                None => ("error", 1),
            };
            let _ = output(
                &cli.format,
                &serde_json::json!({
                    "status": "error",
                    "code": code,
                    "message": err.to_string()
                }),
            );
            std::process::exit(exit_code);
        }
    }
}

/// Run one command; the returned value is the process exit code
fn run(cli: &Cli) -> anyhow::Result<i32> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => VaultConfig::default_path()?,
    };

    match &cli.command {
        Commands::Init { library, packs } => {
            std::fs::create_dir_all(library)?;
            std::fs::create_dir_all(packs)?;
            let config = VaultConfig::new(library.clone(), packs.clone());
            config.save(&config_path)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "config": config_path.display().to_string(),
                    "library_root": config.library_root,
                    "packs_root": config.packs_root
                }),
            )?;
        }

        Commands::Import { file, expect } => {
            let vault = open_vault(&config_path)?;
            let expected = expect.as_deref().map(parse_hash).transpose()?;
            let outcome = vault.import_file(file, expected.as_ref())?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "import": outcome
                }),
            )?;
        }

        Commands::List {
            kind,
            status,
            location,
            search,
            sort,
            desc,
        } => {
            let vault = open_vault(&config_path)?;
            let filter = InventoryFilter {
                kind: kind.clone(),
                status: status.map(Into::into),
                location: location.map(Into::into),
                search: search.clone(),
            };
            let mut order = SortOrder::by((*sort).into());
            if *desc {
                order = order.descending();
            }
            let scan = vault.inventory().list(&filter, order)?;
            output(&cli.format, &scan)?;
        }

        Commands::Summary => {
            let vault = open_vault(&config_path)?;
            output(&cli.format, &vault.inventory().summary()?)?;
        }

        Commands::Impacts { hash } => {
            let vault = open_vault(&config_path)?;
            let hash = parse_hash(hash)?;
            let impacts = vault.inventory().impacts(&hash)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "hash": hash,
                    "impacts": impacts
                }),
            )?;
        }

        Commands::Verify { hash, backup } => {
            let vault = open_vault(&config_path)?;
            let hash = parse_hash(hash)?;
            let root = root_for(*backup);
            vault.inventory().verify_in(root, &hash)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "hash": hash,
                    "root": root
                }),
            )?;
        }

        Commands::VerifyAll { backup } => {
            let vault = open_vault(&config_path)?;
            let root = root_for(*backup);
            let outcomes = vault.inventory().verify_all(root)?;
            let corrupt = outcomes.iter().filter(|o| o.is_failure()).count();
            output(
                &cli.format,
                &serde_json::json!({
                    "root": root,
                    "checked": outcomes.len(),
                    "corrupt": corrupt,
                    "outcomes": outcomes
                }),
            )?;
            if corrupt > 0 {
                return Ok(1);
            }
        }

        Commands::Cleanup { hashes } => {
            let vault = open_vault(&config_path)?;
            let hashes = parse_hashes(hashes)?;
            let outcomes = vault.inventory().cleanup_orphans(&hashes);
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "counts": model_vault::model::OutcomeCounts::tally(&outcomes),
                    "outcomes": outcomes
                }),
            )?;
        }

        Commands::Backup { hash } => {
            let vault = open_vault(&config_path)?;
            let hash = parse_hash(hash)?;
            let transfer = vault.backup().backup(&hash)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "hash": hash,
                    "transfer": transfer
                }),
            )?;
        }

        Commands::Restore { hash } => {
            let vault = open_vault(&config_path)?;
            let hash = parse_hash(hash)?;
            let transfer = vault.backup().restore(&hash)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "hash": hash,
                    "transfer": transfer
                }),
            )?;
        }

        Commands::Sync { direction } => {
            let vault = open_vault(&config_path)?;
            let snapshot = vault.backup().sync_all((*direction).into())?;
            output(&cli.format, &snapshot)?;
        }

        Commands::Delete {
            hash,
            target,
            force,
        } => {
            let vault = open_vault(&config_path)?;
            let hash = parse_hash(hash)?;
            let report = vault.backup().delete(&hash, (*target).into(), *force)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": if report.has_failure() { "partial" } else { "ok" },
                    "bytes_freed": report.bytes_freed(),
                    "report": report
                }),
            )?;
            if report.has_failure() {
                return Ok(1);
            }
        }

        Commands::Bulk {
            action,
            hashes,
            force,
        } => {
            let vault = open_vault(&config_path)?;
            let hashes = parse_hashes(hashes)?;
            let snapshot = vault.backup().apply_bulk(&hashes, (*action).into(), *force);
            output(&cli.format, &snapshot)?;
            if snapshot.state == OperationState::Failed {
                return Ok(1);
            }
        }

        Commands::Status => {
            let vault = open_vault(&config_path)?;
            let config = vault.config();
            output(
                &cli.format,
                &serde_json::json!({
                    "config": config_path.display().to_string(),
                    "library_root": config.library_root,
                    "packs_root": config.packs_root,
                    "backup": config.backup,
                    "destination": vault.backup().status()
                }),
            )?;
        }

        Commands::ConfigureBackup {
            path,
            enable,
            disable,
            auto_backup,
            warn_last_copy,
        } => {
            let mut config = VaultConfig::load(&config_path)?;
            if let Some(path) = path {
                config.backup.destination_path = Some(path.clone());
            }
            if *enable {
                config.backup.enabled = true;
            }
            if *disable {
                config.backup.enabled = false;
            }
            if let Some(auto_backup) = auto_backup {
                config.backup.auto_backup_new = *auto_backup;
            }
            if let Some(warn_last_copy) = warn_last_copy {
                config.backup.warn_before_delete_last_copy = *warn_last_copy;
            }
            config.save(&config_path)?;

            let vault = Vault::open(config)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "backup": vault.config().backup,
                    "destination": vault.backup().status()
                }),
            )?;
        }
    }

    Ok(0)
}

fn open_vault(config_path: &Path) -> anyhow::Result<Vault> {
    let config = VaultConfig::load(config_path)?;
    Ok(Vault::open(config)?)
}

fn parse_hash(s: &str) -> anyhow::Result<Hash> {
    Ok(s.parse::<Hash>()?)
}

fn parse_hashes(hashes: &[String]) -> anyhow::Result<Vec<Hash>> {
    hashes.iter().map(|h| parse_hash(h)).collect()
}

fn root_for(backup: bool) -> StorageRoot {
    if backup {
        StorageRoot::Backup
    } else {
        StorageRoot::Local
    }
}

fn output(format: &OutputFormat, value: &impl Serialize) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(value)?);
        }
        OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}
