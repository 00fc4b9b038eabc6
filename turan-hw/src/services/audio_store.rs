//! Submitted audio storage
//!
//! Files are written under `<root>/homework_submissions/<YYYY>/<MM>/`. The
//! homework record keeps the path relative to the root.

use chrono::{DateTime, Datelike, Utc};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::error::{HomeworkError, HwResult};

const SUBMISSIONS_DIR: &str = "homework_submissions";

/// Filesystem store for homework audio
#[derive(Debug, Clone)]
pub struct AudioStore {
    root: PathBuf,
}

impl AudioStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File extension for an audio content type
    pub fn extension_for(content_type: &str) -> &'static str {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" => "ogg",
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
            "audio/webm" => "webm",
            _ => "bin",
        }
    }

    /// Write `bytes` and return the stored relative path
    ///
    /// Every call produces a new file name, so a losing concurrent submit
    /// never clobbers the winner's audio.
    pub async fn save(
        &self,
        homework_id: Uuid,
        content_type: &str,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> HwResult<String> {
        let suffix = Uuid::new_v4().simple().to_string();
        let relative = format!(
            "{}/{:04}/{:02}/{}-{}.{}",
            SUBMISSIONS_DIR,
            now.year(),
            now.month(),
            homework_id,
            &suffix[..8],
            Self::extension_for(content_type)
        );

        let full = self.root.join(&relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;

        tracing::debug!(
            homework_id = %homework_id,
            path = %relative,
            bytes = bytes.len(),
            "Stored homework audio"
        );
        Ok(relative)
    }

    pub async fn read(&self, relative: &str) -> HwResult<Vec<u8>> {
        let path = self.resolve(relative)?;
        Ok(tokio::fs::read(path).await?)
    }

    /// Delete a stored file; a missing file is not an error
    pub async fn remove(&self, relative: &str) -> HwResult<()> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, relative: &str) -> HwResult<PathBuf> {
        let rel = Path::new(relative);
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(HomeworkError::Validation(format!(
                "Invalid audio path: {}",
                relative
            )));
        }
        Ok(self.root.join(rel))
    }
}
