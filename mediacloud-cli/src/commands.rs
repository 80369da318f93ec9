use crate::cli::{Args, Command, Selection};
use anyhow::{bail, Context, Result};
use bridge_desktop::{HttpObjectStore, ReqwestHttpClient, TokioFileSystem};
use bridge_traits::storage::{FileSystemAccess, ObjectStore};
use core_imaging::EditorContext;
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{ItemFilter, SqliteCatalogRepository};
use core_migration::{
    BatchKind, BatchState, ImportProcessor, ItemProcessor, ItemProgress, ItemStatus,
    MigrationError, MigrationPipeline, ProgressHandle, RegenerateProcessor, RunReport,
    SqliteBatchStateStore, UnlinkProcessor,
};
use core_runtime::config::{ConfigFile, MediaCloudConfig, StorageSettings};
use sqlx::SqlitePool;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

pub async fn execute(args: Args) -> Result<ExitCode> {
    let file = match &args.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };

    match args.command {
        Command::Status { kind, json } => {
            let handle = progress_handle(&args.database, &file).await?;
            let states = match kind {
                Some(kind) => vec![handle.snapshot(kind.into()).await?],
                None => handle.snapshots().await?,
            };
            print_states(&states, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Cancel { kind } => {
            let kind = BatchKind::from(kind);
            let handle = progress_handle(&args.database, &file).await?;
            if handle.request_cancel(kind).await? {
                println!("Cancellation requested for {}", kind);
                Ok(ExitCode::SUCCESS)
            } else {
                println!("No {} run is active", kind);
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Import(selection) => {
            let config = load_config(&args.database, &args.upload_root, file)?;
            require_storage(&config.storage, "import")?;
            let workspace = Workspace::open(config).await?;

            let filter = if workspace.config.storage.upload_documents {
                ItemFilter::All
            } else {
                ItemFilter::ImagesOnly
            };
            let processor = ImportProcessor::new(
                workspace.catalog.clone(),
                workspace.object_store()?,
                workspace.fs.clone(),
                workspace.editors()?,
                &workspace.config.upload_root,
            );
            workspace.run(selection, filter, &processor).await
        }
        Command::Regenerate(selection) => {
            let config = load_config(&args.database, &args.upload_root, file)?;
            require_storage(&config.storage, "regenerate")?;
            let workspace = Workspace::open(config).await?;

            let processor = RegenerateProcessor::new(
                workspace.catalog.clone(),
                workspace.editors()?,
                &workspace.config.upload_root,
                workspace.config.derivative_sizes.clone(),
            );
            workspace
                .run(selection, ItemFilter::ImagesOnly, &processor)
                .await
        }
        Command::Unlink { selection, yes } => {
            let config = load_config(&args.database, &args.upload_root, file)?;
            if config.storage.enabled {
                return Err(MigrationError::StorageEnabled.into());
            }
            if !yes && !confirm_unlink()? {
                println!("Aborted");
                return Ok(ExitCode::FAILURE);
            }

            let workspace = Workspace::open(config).await?;
            let processor = UnlinkProcessor::new(workspace.catalog.clone());
            workspace.run(selection, ItemFilter::All, &processor).await
        }
    }
}

fn load_config(
    database: &Option<PathBuf>,
    upload_root: &Option<PathBuf>,
    file: ConfigFile,
) -> Result<MediaCloudConfig> {
    let mut builder = MediaCloudConfig::builder();
    if let Some(path) = database {
        builder = builder.database_path(path);
    }
    if let Some(path) = upload_root {
        builder = builder.upload_root(path);
    }
    Ok(builder.merge_file(file).build()?)
}

fn require_storage(storage: &StorageSettings, command: &str) -> Result<()> {
    if !storage.enabled {
        bail!("Remote storage is not enabled; `{}` needs storage settings in the configuration file", command);
    }
    Ok(())
}

async fn open_database(path: &Path) -> Result<SqlitePool> {
    create_pool(DatabaseConfig::new(path))
        .await
        .with_context(|| format!("Failed to open catalog database {}", path.display()))
}

/// `status` and `cancel` need only the database
async fn progress_handle(database: &Option<PathBuf>, file: &ConfigFile) -> Result<ProgressHandle> {
    let path = database
        .clone()
        .or_else(|| file.database_path.clone())
        .context("No catalog database; pass --database or set database_path in the configuration file")?;
    let pool = open_database(&path).await?;
    Ok(ProgressHandle::new(Arc::new(SqliteBatchStateStore::new(pool))))
}

fn confirm_unlink() -> Result<bool> {
    print!("Detach catalog items from remote storage? Remote objects are not deleted. [y/N] ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

// ============================================================================
// Run wiring
// ============================================================================

struct Workspace {
    config: MediaCloudConfig,
    catalog: Arc<SqliteCatalogRepository>,
    batch: Arc<SqliteBatchStateStore>,
    fs: Arc<TokioFileSystem>,
}

impl Workspace {
    async fn open(config: MediaCloudConfig) -> Result<Self> {
        let pool = open_database(&config.database_path).await?;
        Ok(Self {
            catalog: Arc::new(SqliteCatalogRepository::new(pool.clone())),
            batch: Arc::new(SqliteBatchStateStore::new(pool)),
            fs: Arc::new(TokioFileSystem::new()),
            config,
        })
    }

    fn object_store(&self) -> Result<Arc<dyn ObjectStore>> {
        let storage = &self.config.storage;
        let endpoint = storage
            .endpoint
            .as_deref()
            .context("Storage endpoint is not configured")?;

        let http = Arc::new(ReqwestHttpClient::new()?);
        let store = HttpObjectStore::new(http, &storage.provider, endpoint, &storage.bucket)?
            .with_prefix(&storage.prefix);
        Ok(Arc::new(store))
    }

    fn editors(&self) -> Result<EditorContext> {
        let fs: Arc<dyn FileSystemAccess> = self.fs.clone();
        let mut editors = EditorContext::new(fs, &self.config.scratch_dir)
            .with_catalog(self.catalog.clone())
            .with_upload_root(&self.config.upload_root);
        if self.config.storage.enabled {
            editors = editors.with_store(self.object_store()?);
        }
        Ok(editors)
    }

    async fn run(
        &self,
        selection: Selection,
        filter: ItemFilter,
        processor: &dyn ItemProcessor,
    ) -> Result<ExitCode> {
        let bounds = selection.bounds();
        bounds.validate()?;

        let pipeline = MigrationPipeline::new(self.catalog.clone(), self.batch.clone())
            .with_progress(Arc::new(print_progress));

        info!(kind = %processor.kind(), ?bounds, "Starting batch");
        let report = pipeline.run_query(bounds, filter, processor).await?;
        print_summary(&report);
        Ok(ExitCode::SUCCESS)
    }
}

// ============================================================================
// Output
// ============================================================================

fn status_label(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Processed => "ok",
        ItemStatus::Skipped => "skipped",
        ItemStatus::Failed => "failed",
    }
}

fn print_progress(progress: &ItemProgress) {
    println!(
        "[{}/{}] {:<7} #{} {}",
        progress.position,
        progress.total,
        status_label(progress.status),
        progress.item_id,
        progress.file
    );
}

fn print_summary(report: &RunReport) {
    let elapsed = report.finished_at - report.started_at;
    println!(
        "{} {}: {} processed, {} skipped, {} failed of {} ({:.1}s)",
        report.kind,
        report.outcome,
        report.processed,
        report.skipped,
        report.failed,
        report.total,
        elapsed.num_milliseconds() as f64 / 1000.0
    );
}

fn print_states(states: &[BatchState], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(states)?);
        return Ok(());
    }

    for state in states {
        let last = state
            .last_outcome
            .map(|outcome| outcome.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<22} {:<10} {:>6}/{:<6} {:>3}%  last: {:<9} {}",
            state.kind,
            state.status,
            state.current,
            state.total,
            state.percent(),
            last,
            state.current_file_name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_flags_override_file() {
        let file = ConfigFile::from_json(
            r#"{
                "database_path": "/srv/catalog.db",
                "upload_root": "/srv/uploads",
                "storage": { "enabled": true, "endpoint": "https://s3.example.com", "bucket": "media" }
            }"#,
        )
        .unwrap();

        let config = load_config(&Some(PathBuf::from("/tmp/other.db")), &None, file).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.upload_root, PathBuf::from("/srv/uploads"));
        assert!(config.storage.enabled);
        assert!(require_storage(&config.storage, "import").is_ok());
    }

    #[test]
    fn test_missing_upload_root_is_an_error() {
        let result = load_config(&Some(PathBuf::from("/tmp/catalog.db")), &None, ConfigFile::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_storage_required_for_import() {
        assert!(require_storage(&StorageSettings::default(), "import").is_err());
    }

    #[tokio::test]
    async fn test_unlink_refuses_while_storage_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("mediacloud.json");
        std::fs::write(
            &config_path,
            r#"{ "storage": { "enabled": true, "endpoint": "https://s3.example.com", "bucket": "media" } }"#,
        )
        .unwrap();

        let args = Args {
            config: Some(config_path),
            database: Some(dir.path().join("catalog.db")),
            upload_root: Some(dir.path().to_path_buf()),
            verbosity: 0,
            command: Command::Unlink {
                selection: Selection::default(),
                yes: true,
            },
        };

        let err = execute(args).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::StorageEnabled)
        ));
    }

    #[tokio::test]
    async fn test_status_and_cancel_on_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let database = Some(dir.path().join("catalog.db"));

        let handle = progress_handle(&database, &ConfigFile::default())
            .await
            .unwrap();
        let states = handle.snapshots().await.unwrap();
        assert_eq!(states.len(), 3);
        assert!(states.iter().all(|s| !s.running));

        assert!(!handle.request_cancel(BatchKind::Import).await.unwrap());
    }
}
