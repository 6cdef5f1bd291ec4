use std::path::{Path, PathBuf};

use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::{self, File},
    io::{self, AsyncWriteExt},
};
use tracing::warn;

/// Writes data to a file using temp-file-then-rename, so a crash can only leave either the old or
/// the new contents behind. The temp file is synced before it replaces the target.
pub async fn atomic_write(path: &Path, data: &[u8]) -> Result<(), io::Error> {
    let tmp = temp_path(path);
    match write_synced(&tmp, data).await {
        Ok(()) => fs::rename(&tmp, path).await,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                warn!("Failed to remove temporary file {tmp:?}: {cleanup}");
            }
            Err(e)
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_synced(path: &Path, data: &[u8]) -> Result<(), io::Error> {
    let mut file = File::create(path).await?;
    // Semi-safe acquire-release for a file
    file.lock_exclusive()?;
    let result = async {
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_data().await
    }
    .await;
    file.unlock_async().await?;
    result
}
