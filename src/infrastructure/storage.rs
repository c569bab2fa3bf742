use crate::config::RelayConfig;
use crate::services::storage::LocalStorageService;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// Creates the upload directory if needed and pins it to an absolute path.
/// An unusable directory is a startup error, never a per-request one.
pub async fn setup_storage(config: &RelayConfig) -> anyhow::Result<Arc<LocalStorageService>> {
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("cannot create upload dir {}", config.upload_dir.display()))?;

    let root = tokio::fs::canonicalize(&config.upload_dir)
        .await
        .with_context(|| format!("cannot resolve upload dir {}", config.upload_dir.display()))?;

    let metadata = tokio::fs::metadata(&root).await?;
    if !metadata.is_dir() {
        anyhow::bail!("upload dir {} is not a directory", root.display());
    }

    // Fail now rather than on the first upload
    let mut entries = tokio::fs::read_dir(&root)
        .await
        .with_context(|| format!("cannot list upload dir {}", root.display()))?;
    entries
        .next_entry()
        .await
        .with_context(|| format!("cannot read upload dir {}", root.display()))?;

    info!("📁 Upload directory: {}", root.display());
    Ok(Arc::new(LocalStorageService::new(root)))
}
