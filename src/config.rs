//! Worker configuration loaded from environment variables
//!
//! All knobs of the worker process live here: transport connection, worker
//! count, storage layout, separator model and the optional LLM key. Settings
//! are read once at startup and shared read-only for the life of the process.

use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;

/// Default sample rate for all internal processing (Hz)
pub const PROCESSING_SAMPLE_RATE: u32 = 44_100;

/// Application settings loaded from environment variables
#[derive(Debug, Clone)]
pub struct Settings {
    // Transport
    pub transport_host: String,
    pub transport_port: u16,
    pub transport_password: Option<String>,

    // Worker
    pub worker_count: usize,
    pub log_level: String,

    // Storage root where tracks, transitions and mix segments live
    pub storage_root: PathBuf,

    // Stem separation
    pub separator_model: String,

    // LLM planning (optional; rule-based planner is used when absent)
    pub llm_api_key: Option<String>,

    // Queue names (must match the API side)
    pub queue_analyze: String,
    pub queue_transitions: String,
    pub queue_draft_transition: String,
    pub queue_mix: String,
    pub queue_results: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transport_host: "localhost".to_string(),
            transport_port: 6379,
            transport_password: None,
            worker_count: 2,
            log_level: "info".to_string(),
            storage_root: PathBuf::from("storage"),
            separator_model: "htdemucs".to_string(),
            llm_api_key: None,
            queue_analyze: "audio-analyze".to_string(),
            queue_transitions: "audio-transitions".to_string(),
            queue_draft_transition: "draft-transition".to_string(),
            queue_mix: "audio-mix".to_string(),
            queue_results: "results".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        Self {
            transport_host: env_or("SEGUE_TRANSPORT_HOST", &defaults.transport_host),
            transport_port: env::var("SEGUE_TRANSPORT_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.transport_port),
            transport_password: env::var("SEGUE_TRANSPORT_PASSWORD")
                .ok()
                .filter(|v| !v.is_empty()),
            worker_count: env::var("SEGUE_WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.worker_count),
            log_level: env_or("SEGUE_LOG", &defaults.log_level),
            storage_root: env::var("SEGUE_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            separator_model: env_or("SEGUE_SEPARATOR_MODEL", &defaults.separator_model),
            llm_api_key: env::var("SEGUE_LLM_API_KEY").ok().filter(|v| !v.is_empty()),
            queue_analyze: env_or("SEGUE_QUEUE_ANALYZE", &defaults.queue_analyze),
            queue_transitions: env_or("SEGUE_QUEUE_TRANSITIONS", &defaults.queue_transitions),
            queue_draft_transition: env_or(
                "SEGUE_QUEUE_DRAFT_TRANSITION",
                &defaults.queue_draft_transition,
            ),
            queue_mix: env_or("SEGUE_QUEUE_MIX", &defaults.queue_mix),
            queue_results: env_or("SEGUE_QUEUE_RESULTS", &defaults.queue_results),
        }
    }

    /// Convert a storage-relative path into an absolute path under the root
    ///
    /// Leading `storage/` prefixes are stripped since the root already points
    /// at the storage directory.
    pub fn absolute_path(&self, relative: &str) -> PathBuf {
        let trimmed = relative.strip_prefix("storage/").unwrap_or(relative);
        self.storage_root.join(trimmed)
    }

    /// Path for a rendered transition of a project
    pub fn transition_path(&self, project_id: &str, transition_id: &str) -> PathBuf {
        self.storage_root
            .join("transitions")
            .join(project_id)
            .join(format!("{}.mp3", transition_id))
    }

    /// Path for a draft transition render
    pub fn draft_path(&self, draft_id: &str) -> PathBuf {
        self.storage_root
            .join("drafts")
            .join(draft_id)
            .join("transition.mp3")
    }

    /// Path for a mix segment between two tracks of a project
    pub fn mix_segment_path(&self, project_id: &str, track_a: &str, track_b: &str) -> PathBuf {
        self.storage_root
            .join("mix_segments")
            .join(project_id)
            .join(format!("transition_{}_{}.wav", track_a, track_b))
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Process-wide settings, read once on first access
pub static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);
