//! Job payloads and result messages
//!
//! The wire contract with the API side: four ingress queues (analyze,
//! transition, draft transition, mix) and one results queue that also
//! carries progress updates. Field names are camelCase on the wire.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::TrackAnalysis;
use crate::error::SegueError;
use crate::mix::Segment;

/// Analyze-queue payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeJob {
    pub project_id: String,
    pub track_id: String,
    pub file_path: String,
}

/// Transition-queue payload (previews and drafts share the shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionJob {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub transition_id: Option<String>,
    #[serde(default)]
    pub draft_id: Option<String>,

    pub from_track_path: String,
    pub to_track_path: String,
    pub from_track_bpm: f32,
    pub to_track_bpm: f32,
    pub from_track_beats: Vec<f32>,
    pub to_track_beats: Vec<f32>,
    #[serde(default)]
    pub from_track_energy: Option<f32>,
    #[serde(default)]
    pub to_track_energy: Option<f32>,
    pub from_track_duration: f32,
    pub to_track_duration: f32,
    #[serde(default)]
    pub from_track_key: Option<String>,
    #[serde(default)]
    pub to_track_key: Option<String>,
    #[serde(default)]
    pub from_track_outro_start_ms: Option<u64>,
    #[serde(default)]
    pub to_track_intro_end_ms: Option<u64>,
    #[serde(default)]
    pub track_index: Option<usize>,
    #[serde(default)]
    pub total_tracks: Option<usize>,
    pub output_path: String,
}

impl TransitionJob {
    /// Build the track analyses the planner and renderer consume
    pub fn analyses(&self) -> (TrackAnalysis, TrackAnalysis) {
        let make = |bpm: f32,
                    beats: &[f32],
                    duration: f32,
                    key: &Option<String>,
                    energy: Option<f32>,
                    intro_end_ms: Option<u64>,
                    outro_start_ms: Option<u64>| {
            TrackAnalysis {
                duration_seconds: duration,
                bpm,
                bpm_confidence: 1.0,
                beats: beats.to_vec(),
                key: key.clone(),
                camelot: key
                    .as_deref()
                    .and_then(|k| k.parse::<crate::theory::CamelotKey>().ok())
                    .map(|c| c.to_string()),
                energy: energy.unwrap_or(0.5),
                danceability: 0.5,
                loudness: 0.0,
                intro_end_ms,
                outro_start_ms,
                has_vocals: false,
                vocal_sections: Vec::new(),
                phrases: Vec::new(),
                mix_points: Default::default(),
                structure: None,
                mixability: None,
            }
        };

        let a = make(
            self.from_track_bpm,
            &self.from_track_beats,
            self.from_track_duration,
            &self.from_track_key,
            self.from_track_energy,
            None,
            self.from_track_outro_start_ms,
        );
        let b = make(
            self.to_track_bpm,
            &self.to_track_beats,
            self.to_track_duration,
            &self.to_track_key,
            self.to_track_energy,
            self.to_track_intro_end_ms,
            None,
        );
        (a, b)
    }
}

/// Transition-queue result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionJobResult {
    pub transition_file_path: String,
    pub transition_duration_ms: u64,
    pub track_a_play_until_ms: u64,
    pub track_b_start_from_ms: u64,
    pub transition_mode: String,
    pub llm_plan_used: bool,
}

/// One track entry of a mix job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixJobTrack {
    pub id: String,
    pub file_path: String,
    pub analysis: TrackAnalysis,
}

/// Mix-queue payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixJob {
    pub project_id: String,
    pub tracks: Vec<MixJobTrack>,
    #[serde(default)]
    pub transitions: Vec<Value>,
}

/// Mix-queue result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixJobResult {
    pub segments: Vec<Segment>,
    pub transition_files: HashMap<String, String>,
}

/// Error body attached to failed jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error kind
    pub error: String,
    pub details: String,
}

impl From<&SegueError> for ErrorBody {
    fn from(err: &SegueError) -> Self {
        Self {
            error: err.kind().to_string(),
            details: err.to_string(),
        }
    }
}

/// Result or error of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Ok { result: Value },
    Err(ErrorBody),
}

impl Outcome {
    pub fn ok<T: Serialize>(value: &T) -> Self {
        Outcome::Ok {
            result: serde_json::to_value(value).unwrap_or(Value::Null),
        }
    }

    pub fn err(error: &SegueError) -> Self {
        Outcome::Err(error.into())
    }
}

/// Messages on the results queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultMessage {
    Analyze {
        #[serde(rename = "projectId")]
        project_id: String,
        #[serde(rename = "trackId")]
        track_id: String,
        #[serde(flatten)]
        outcome: Outcome,
    },
    TransitionAudio {
        #[serde(rename = "projectId")]
        project_id: Option<String>,
        #[serde(rename = "transitionId")]
        transition_id: String,
        #[serde(flatten)]
        outcome: Outcome,
    },
    DraftTransition {
        #[serde(rename = "draftId")]
        draft_id: String,
        #[serde(flatten)]
        outcome: Outcome,
    },
    Mix {
        #[serde(rename = "projectId")]
        project_id: String,
        #[serde(flatten)]
        outcome: Outcome,
    },
    Progress {
        #[serde(rename = "projectId", skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        #[serde(rename = "transitionId", skip_serializing_if = "Option::is_none")]
        transition_id: Option<String>,
        #[serde(rename = "draftId", skip_serializing_if = "Option::is_none")]
        draft_id: Option<String>,
        stage: String,
        percent: u8,
        message: String,
    },
}
