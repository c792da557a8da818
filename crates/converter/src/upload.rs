use std::path::{Path, PathBuf};
use log::{debug, info};
use uuid::Uuid;

use crate::config::ConverterConfig;
use crate::error::ValidationError;
use crate::format::{allowed_file, dotted_extension, SUPPORTED_INPUT_FORMATS};

/// Check extension allowlist and size limit for a candidate upload
pub async fn validate_upload(path: &Path, max_size: u64) -> Result<u64, ValidationError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    if !allowed_file(name) {
        return Err(ValidationError::UnsupportedInputFormat {
            extension: dotted_extension(name).unwrap_or_default(),
            supported: SUPPORTED_INPUT_FORMATS.join(", "),
        });
    }

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| ValidationError::MissingFile(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(ValidationError::MissingFile(path.to_path_buf()));
    }

    let size = metadata.len();
    if size > max_size {
        return Err(ValidationError::FileTooLarge { size, max: max_size });
    }
    Ok(size)
}

/// Validate and copy a file into the upload directory under a fresh name.
///
/// Returns the stored path, `{upload_dir}/{uuid}{ext}`.
pub async fn ingest_upload(cfg: &ConverterConfig, source: &Path) -> Result<PathBuf, ValidationError> {
    let size = validate_upload(source, cfg.max_file_size).await?;

    let ext = source
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(dotted_extension)
        .unwrap_or_default();
    let stored = cfg.upload_dir.join(format!("{}{}", Uuid::new_v4(), ext));

    let io_err = |source| ValidationError::Io {
        path: stored.clone(),
        source,
    };
    tokio::fs::create_dir_all(&cfg.upload_dir).await.map_err(io_err)?;
    tokio::fs::copy(source, &stored).await.map_err(io_err)?;

    debug!("Stored upload {} as {}", source.display(), stored.display());
    info!("Accepted upload {} ({} bytes)", source.display(), size);
    Ok(stored)
}
