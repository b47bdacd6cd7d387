/// Artifact sink for screenshots and annotated images kept for audit.
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};
use crate::session::EncodedImage;

/// Opaque reference to an uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub location: String,
}

#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn upload(&self, bytes: &[u8], content_type: &str, filename: &str) -> PilotResult<FileRef>;
}

/// `<prefix>-<utc timestamp>.<ext>` with no spaces or colons.
pub fn timestamped_name(prefix: &str, ext: &str) -> String {
    let ts = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S%.6fZ");
    format!("{prefix}-{ts}.{ext}")
}

pub async fn upload_image(
    sink: &dyn ArtifactSink,
    image: &EncodedImage,
    prefix: &str,
) -> PilotResult<FileRef> {
    let format = image.format();
    let filename = timestamped_name(prefix, format.extension());
    sink.upload(image.bytes(), format.mime_type(), &filename).await
}

/// Upload for audit only: failures are logged, never propagated.
pub async fn record_image(sink: &dyn ArtifactSink, image: &EncodedImage, prefix: &str) -> Option<FileRef> {
    match upload_image(sink, image, prefix).await {
        Ok(file) => {
            tracing::debug!(id = %file.id, location = %file.location, "artifact stored");
            Some(file)
        }
        Err(e) => {
            tracing::warn!(error = %e, prefix, "artifact upload failed");
            None
        }
    }
}

/// Writes artifacts into a local directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn upload(&self, bytes: &[u8], content_type: &str, filename: &str) -> PilotResult<FileRef> {
        if filename.is_empty() || filename.contains(|c: char| c == '/' || c == '\\') {
            return Err(PilotError::Artifact(format!("invalid artifact filename: {filename:?}")));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(filename);
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
        Ok(FileRef {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            location: path.display().to_string(),
        })
    }
}

/// Discards everything.
pub struct NullSink;

#[async_trait]
impl ArtifactSink for NullSink {
    async fn upload(&self, _bytes: &[u8], content_type: &str, filename: &str) -> PilotResult<FileRef> {
        Ok(FileRef {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            location: String::new(),
        })
    }
}

/// Keeps uploads in memory; handy for embedding and tests.
#[derive(Default)]
pub struct MemorySink {
    files: Mutex<Vec<(FileRef, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|f| f.iter().map(|(r, _)| r.filename.clone()).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<Vec<u8>> {
        let files = self.files.lock().ok()?;
        files.iter().find(|(r, _)| r.id == id).map(|(_, b)| b.clone())
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn upload(&self, bytes: &[u8], content_type: &str, filename: &str) -> PilotResult<FileRef> {
        let file = FileRef {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            location: format!("memory://{filename}"),
        };
        self.files
            .lock()
            .map_err(|e| PilotError::Artifact(format!("memory sink poisoned: {e}")))?
            .push((file.clone(), bytes.to_vec()));
        Ok(file)
    }
}
