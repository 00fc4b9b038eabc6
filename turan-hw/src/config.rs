//! Runtime assessment settings
//!
//! Settings live in the database `settings` table so they can change without
//! a restart. Missing keys are written back with built-in defaults on load.
//! Components read a snapshot (`SettingsHandle::current`) once per operation;
//! `SettingsHandle::reload` swaps in a freshly validated snapshot.

use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::db::settings as settings_db;
use crate::error::{HomeworkError, HwResult};

/// Transcript similarity metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// 2·matches / (len a + len b), matches from the longest common subsequence
    SequenceRatio,
    /// 1 - levenshtein / max(len a, len b)
    NormalizedLevenshtein,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::SequenceRatio => "sequence_ratio",
            SimilarityMetric::NormalizedLevenshtein => "normalized_levenshtein",
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMetric {
    type Err = HomeworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sequence_ratio" => Ok(SimilarityMetric::SequenceRatio),
            "normalized_levenshtein" => Ok(SimilarityMetric::NormalizedLevenshtein),
            other => Err(HomeworkError::Config(format!(
                "Unknown similarity metric: {}",
                other
            ))),
        }
    }
}

/// Upper bound for `max_homework_attempts`
pub const MAX_ATTEMPTS_CEILING: u32 = 10;

/// Upper bound for `max_audio_file_size_mb`
pub const MAX_AUDIO_SIZE_CEILING_MB: u64 = 1024;

/// Upper bound for the transcription retry backoff
pub const TRANSCRIPTION_BACKOFF_CAP_MS: u64 = 8000;

/// Validated snapshot of the runtime settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentSettings {
    pub similarity_threshold: f64,
    pub similarity_metric: SimilarityMetric,
    pub homework_approved_coins: u32,
    pub homework_deadline_hours: u32,
    pub max_homework_attempts: u32,
    pub max_audio_file_size_mb: u64,
    pub supported_audio_formats: Vec<String>,
    pub transcription_timeout_ms: u64,
    pub transcription_max_attempts: u32,
    pub transcription_backoff_ms: u64,
    pub scoring_workers: usize,
    pub scoring_queue_capacity: usize,
    pub deadline_reminder_window_minutes: u32,
    pub overdue_payment_days: u32,
    pub audio_processing_enabled: bool,
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.50,
            similarity_metric: SimilarityMetric::SequenceRatio,
            homework_approved_coins: 10,
            homework_deadline_hours: 24,
            max_homework_attempts: 3,
            max_audio_file_size_mb: 50,
            supported_audio_formats: vec![
                "audio/mpeg".to_string(),
                "audio/wav".to_string(),
                "audio/ogg".to_string(),
                "audio/mp4".to_string(),
            ],
            transcription_timeout_ms: 30_000,
            transcription_max_attempts: 3,
            transcription_backoff_ms: 500,
            scoring_workers: 4,
            scoring_queue_capacity: 256,
            deadline_reminder_window_minutes: 60,
            overdue_payment_days: 5,
            audio_processing_enabled: true,
        }
    }
}

impl AssessmentSettings {
    /// Key/value pairs as stored in the settings table
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("similarity_threshold", self.similarity_threshold.to_string()),
            ("similarity_metric", self.similarity_metric.to_string()),
            ("homework_approved_coins", self.homework_approved_coins.to_string()),
            ("homework_deadline_hours", self.homework_deadline_hours.to_string()),
            ("max_homework_attempts", self.max_homework_attempts.to_string()),
            ("max_audio_file_size_mb", self.max_audio_file_size_mb.to_string()),
            ("supported_audio_formats", self.supported_audio_formats.join(",")),
            ("transcription_timeout_ms", self.transcription_timeout_ms.to_string()),
            ("transcription_max_attempts", self.transcription_max_attempts.to_string()),
            ("transcription_backoff_ms", self.transcription_backoff_ms.to_string()),
            ("scoring_workers", self.scoring_workers.to_string()),
            ("scoring_queue_capacity", self.scoring_queue_capacity.to_string()),
            (
                "deadline_reminder_window_minutes",
                self.deadline_reminder_window_minutes.to_string(),
            ),
            ("overdue_payment_days", self.overdue_payment_days.to_string()),
            ("audio_processing_enabled", self.audio_processing_enabled.to_string()),
        ]
    }

    /// Build a snapshot from raw table values, defaulting absent keys
    pub fn from_map(values: &HashMap<String, String>) -> HwResult<Self> {
        let defaults = Self::default();

        let settings = Self {
            similarity_threshold: parse_or(values, "similarity_threshold", defaults.similarity_threshold)?,
            similarity_metric: parse_or(values, "similarity_metric", defaults.similarity_metric)?,
            homework_approved_coins: parse_or(values, "homework_approved_coins", defaults.homework_approved_coins)?,
            homework_deadline_hours: parse_or(values, "homework_deadline_hours", defaults.homework_deadline_hours)?,
            max_homework_attempts: parse_or(values, "max_homework_attempts", defaults.max_homework_attempts)?,
            max_audio_file_size_mb: parse_or(values, "max_audio_file_size_mb", defaults.max_audio_file_size_mb)?,
            supported_audio_formats: match values.get("supported_audio_formats") {
                Some(raw) => raw
                    .split(',')
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
                None => defaults.supported_audio_formats,
            },
            transcription_timeout_ms: parse_or(values, "transcription_timeout_ms", defaults.transcription_timeout_ms)?,
            transcription_max_attempts: parse_or(values, "transcription_max_attempts", defaults.transcription_max_attempts)?,
            transcription_backoff_ms: parse_or(values, "transcription_backoff_ms", defaults.transcription_backoff_ms)?,
            scoring_workers: parse_or(values, "scoring_workers", defaults.scoring_workers)?,
            scoring_queue_capacity: parse_or(values, "scoring_queue_capacity", defaults.scoring_queue_capacity)?,
            deadline_reminder_window_minutes: parse_or(
                values,
                "deadline_reminder_window_minutes",
                defaults.deadline_reminder_window_minutes,
            )?,
            overdue_payment_days: parse_or(values, "overdue_payment_days", defaults.overdue_payment_days)?,
            audio_processing_enabled: parse_or(values, "audio_processing_enabled", defaults.audio_processing_enabled)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Check value bounds
    pub fn validate(&self) -> HwResult<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(HomeworkError::Config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(1..=MAX_ATTEMPTS_CEILING).contains(&self.max_homework_attempts) {
            return Err(HomeworkError::Config(format!(
                "max_homework_attempts must be within 1..={}, got {}",
                MAX_ATTEMPTS_CEILING, self.max_homework_attempts
            )));
        }
        if self.homework_deadline_hours == 0 {
            return Err(HomeworkError::Config(
                "homework_deadline_hours must be positive".to_string(),
            ));
        }
        if !(1..=MAX_AUDIO_SIZE_CEILING_MB).contains(&self.max_audio_file_size_mb) {
            return Err(HomeworkError::Config(format!(
                "max_audio_file_size_mb must be within 1..={}, got {}",
                MAX_AUDIO_SIZE_CEILING_MB, self.max_audio_file_size_mb
            )));
        }
        if self.supported_audio_formats.is_empty() {
            return Err(HomeworkError::Config(
                "supported_audio_formats must list at least one format".to_string(),
            ));
        }
        if self.transcription_timeout_ms == 0 || self.transcription_max_attempts == 0 {
            return Err(HomeworkError::Config(
                "transcription timeout and attempts must be positive".to_string(),
            ));
        }
        if self.scoring_workers == 0 || self.scoring_queue_capacity == 0 {
            return Err(HomeworkError::Config(
                "scoring_workers and scoring_queue_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Maximum accepted audio size in bytes
    pub fn max_audio_bytes(&self) -> u64 {
        self.max_audio_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// Whether `content_type` is an accepted audio format (parameters ignored)
    pub fn accepts_format(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.supported_audio_formats.iter().any(|f| *f == essence)
    }

    /// Load from the database, writing defaults for missing keys
    pub async fn load(db: &SqlitePool) -> HwResult<Self> {
        let defaults = Self::default().to_pairs();
        let written = settings_db::insert_missing(db, &defaults).await?;
        if written > 0 {
            info!(written, "Initialized missing settings with defaults");
        }

        let values = settings_db::load_all(db).await?;
        Self::from_map(&values)
    }
}

fn parse_or<T>(values: &HashMap<String, String>, key: &str, default: T) -> HwResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match values.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| HomeworkError::Config(format!("Invalid value for {}: {} ({})", key, raw, e))),
        None => Ok(default),
    }
}

/// Shared, reloadable settings snapshot
#[derive(Clone)]
pub struct SettingsHandle {
    db: SqlitePool,
    current: Arc<RwLock<Arc<AssessmentSettings>>>,
}

impl SettingsHandle {
    /// Load settings from the database
    pub async fn load(db: SqlitePool) -> HwResult<Self> {
        let settings = AssessmentSettings::load(&db).await?;
        Ok(Self::with_settings(db, settings))
    }

    /// Start from an explicit snapshot (`reload` still reads the database)
    pub fn with_settings(db: SqlitePool, settings: AssessmentSettings) -> Self {
        Self {
            db,
            current: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    /// Current snapshot
    pub fn current(&self) -> Arc<AssessmentSettings> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Re-read the settings table and swap the snapshot
    ///
    /// An invalid table leaves the previous snapshot active.
    pub async fn reload(&self) -> HwResult<Arc<AssessmentSettings>> {
        let fresh = match AssessmentSettings::load(&self.db).await {
            Ok(settings) => Arc::new(settings),
            Err(e) => {
                warn!("Settings reload rejected, keeping previous values: {}", e);
                return Err(e);
            }
        };

        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::clone(&fresh);
        info!("Settings reloaded");
        Ok(fresh)
    }
}

impl fmt::Debug for SettingsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsHandle")
            .field("current", &self.current())
            .finish()
    }
}
