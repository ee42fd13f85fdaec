//! The worker loop
//!
//! Pulls jobs off the transport, dispatches by queue, and publishes results
//! (or typed errors) on the results queue. The analyze pipeline fans out
//! internally; transition rendering is serial within a job. Cancellation is
//! checked between pipeline stages.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use serde_json::Value;

use crate::analysis::extract::{analyze_track, AnalysisPorts};
use crate::audio;
use crate::config::SETTINGS;
use crate::error::{Result, SegueError};
use crate::mix::{MixTimeline, MixTrack};
use crate::transition::{Planner, SetContext, TransitionRenderer};
use crate::worker::cancel::JobToken;
use crate::worker::jobs::{
    AnalyzeJob, MixJob, MixJobResult, Outcome, ResultMessage, TransitionJob, TransitionJobResult,
};
use crate::worker::queue::{JobEnvelope, JobTransport, QueueName};

/// A worker: transport plus the engine pieces it drives
pub struct Worker {
    transport: Arc<dyn JobTransport>,
    renderer: Arc<TransitionRenderer>,
    planner: Arc<Planner>,
    ports: Arc<AnalysisPorts>,
}

impl Worker {
    /// Worker with default engine wiring (process-wide separator, phase
    /// vocoder stretcher, rule-based planner)
    pub fn new(transport: Arc<dyn JobTransport>) -> Self {
        Self {
            transport,
            renderer: Arc::new(TransitionRenderer::with_defaults()),
            planner: Arc::new(Planner::new()),
            ports: Arc::new(AnalysisPorts::default()),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<TransitionRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_planner(mut self, planner: Arc<Planner>) -> Self {
        self.planner = planner;
        self
    }

    /// Process jobs until the transport shuts down
    pub fn run(&self) {
        while let Some(envelope) = self.transport.next_job() {
            log::info!("job {} on {:?}", envelope.id, envelope.queue);
            self.dispatch(envelope);
        }
        log::info!("transport closed; worker exiting");
    }

    fn dispatch(&self, envelope: JobEnvelope) {
        let JobEnvelope {
            queue,
            payload,
            token,
            id,
        } = envelope;

        let message = match queue {
            QueueName::Analyze => self.dispatch_analyze(&payload, &token),
            QueueName::Transition | QueueName::DraftTransition => {
                self.dispatch_transition(&payload, &token, queue)
            }
            QueueName::Mix => self.dispatch_mix(&payload, &token),
        };

        match message {
            Ok(message) => {
                if let Err(e) = self.transport.publish(message) {
                    log::error!("failed to publish result for job {}: {}", id, e);
                }
            }
            Err(e) => log::error!("job {} dropped: {}", id, e),
        }
    }

    fn dispatch_analyze(&self, payload: &Value, token: &JobToken) -> Result<ResultMessage> {
        let job: AnalyzeJob = serde_json::from_value(payload.clone())
            .map_err(|e| SegueError::Other(format!("bad analyze payload: {}", e)))?;

        let outcome = match self.handle_analyze(&job, token) {
            Ok(result) => Outcome::Ok { result },
            Err(e) => {
                log::warn!("analyze failed for {}: {}", job.track_id, e);
                Outcome::err(&e)
            }
        };
        Ok(ResultMessage::Analyze {
            project_id: job.project_id,
            track_id: job.track_id,
            outcome,
        })
    }

    fn dispatch_transition(
        &self,
        payload: &Value,
        token: &JobToken,
        queue: QueueName,
    ) -> Result<ResultMessage> {
        let job: TransitionJob = serde_json::from_value(payload.clone())
            .map_err(|e| SegueError::Other(format!("bad transition payload: {}", e)))?;

        let outcome = match self.handle_transition(&job, token) {
            Ok(result) => Outcome::ok(&result),
            Err(e) => {
                log::warn!("transition render failed: {}", e);
                Outcome::err(&e)
            }
        };

        Ok(if queue == QueueName::DraftTransition {
            ResultMessage::DraftTransition {
                draft_id: job.draft_id.unwrap_or_default(),
                outcome,
            }
        } else {
            ResultMessage::TransitionAudio {
                project_id: job.project_id.clone(),
                transition_id: job.transition_id.unwrap_or_default(),
                outcome,
            }
        })
    }

    fn dispatch_mix(&self, payload: &Value, token: &JobToken) -> Result<ResultMessage> {
        let job: MixJob = serde_json::from_value(payload.clone())
            .map_err(|e| SegueError::Other(format!("bad mix payload: {}", e)))?;

        let outcome = match self.handle_mix(&job, token) {
            Ok(result) => Outcome::ok(&result),
            Err(e) => {
                log::warn!("mix assembly failed for {}: {}", job.project_id, e);
                Outcome::err(&e)
            }
        };
        Ok(ResultMessage::Mix {
            project_id: job.project_id,
            outcome,
        })
    }

    fn handle_analyze(&self, job: &AnalyzeJob, token: &JobToken) -> Result<Value> {
        token.check()?;
        let path = SETTINGS.absolute_path(&job.file_path);
        let (samples, sample_rate) = audio::decode_mono(&path)?;

        token.check()?;
        let analysis = analyze_track(&samples, sample_rate, &self.ports)?;
        log::info!(
            "analyzed {}: {:.1} BPM, key {:?}, energy {:.2}",
            job.track_id,
            analysis.bpm,
            analysis.camelot,
            analysis.energy
        );
        Ok(serde_json::to_value(&analysis)?)
    }

    fn handle_transition(
        &self,
        job: &TransitionJob,
        token: &JobToken,
    ) -> Result<TransitionJobResult> {
        let progress = |stage: &str, percent: u8| {
            let _ = self.transport.publish(ResultMessage::Progress {
                project_id: job.project_id.clone(),
                transition_id: job.transition_id.clone(),
                draft_id: job.draft_id.clone(),
                stage: stage.to_string(),
                percent,
                message: String::new(),
            });
        };

        token.check()?;
        progress("decode", 5);
        let (audio_a, sr_a) = audio::decode_mono(SETTINGS.absolute_path(&job.from_track_path))?;
        token.check()?;
        let (audio_b, sr_b) = audio::decode_mono(SETTINGS.absolute_path(&job.to_track_path))?;

        let (analysis_a, analysis_b) = job.analyses();
        let context = SetContext::new(
            job.track_index.unwrap_or(0),
            job.total_tracks.unwrap_or(10).max(1),
        );
        let plan = self.planner.plan(&analysis_a, &analysis_b, &context);
        log::info!(
            "planned {:?} over {} bars (confidence {:.2})",
            plan.mode,
            plan.duration_bars,
            plan.confidence
        );

        token.check()?;
        progress("render", 30);
        let rendered = self.renderer.render(
            &audio_a,
            sr_a,
            &audio_b,
            sr_b,
            &analysis_a,
            &analysis_b,
            &plan,
        )?;

        token.check()?;
        progress("encode", 85);
        let output = SETTINGS.absolute_path(&job.output_path);
        if output.extension().and_then(|e| e.to_str()) == Some("mp3") {
            audio::encode_mp3(&output, &rendered.samples, rendered.sample_rate)?;
        } else {
            audio::write_wav(&output, &rendered.samples, rendered.sample_rate)?;
        }
        progress("done", 100);

        Ok(TransitionJobResult {
            transition_file_path: job.output_path.clone(),
            transition_duration_ms: rendered.duration_ms,
            track_a_play_until_ms: rendered.track_a_play_until_ms,
            track_b_start_from_ms: rendered.track_b_start_from_ms,
            transition_mode: format!("{:?}", rendered.mode),
            llm_plan_used: false,
        })
    }

    fn handle_mix(&self, job: &MixJob, token: &JobToken) -> Result<MixJobResult> {
        let tracks: Vec<MixTrack> = job
            .tracks
            .iter()
            .map(|t| MixTrack {
                id: t.id.clone(),
                analysis: t.analysis.clone(),
            })
            .collect();
        let mut timeline = MixTimeline::plan(&tracks);
        let mut transition_files = HashMap::new();

        // Decoded tracks are reused across adjacent pairs
        let mut decoded: HashMap<String, (Vec<f32>, u32)> = HashMap::new();
        let mut decode_cached = |track: &crate::worker::jobs::MixJobTrack| -> Result<(Vec<f32>, u32)> {
            if let Some(hit) = decoded.get(&track.id) {
                return Ok(hit.clone());
            }
            let loaded = audio::decode_mono(SETTINGS.absolute_path(&track.file_path))?;
            decoded.insert(track.id.clone(), loaded.clone());
            Ok(loaded)
        };

        for pair_index in 0..job.tracks.len().saturating_sub(1) {
            token.check()?;
            let track_a = &job.tracks[pair_index];
            let track_b = &job.tracks[pair_index + 1];

            let (audio_a, sr_a) = decode_cached(track_a)?;
            let (audio_b, sr_b) = decode_cached(track_b)?;

            let context = SetContext::new(pair_index, job.tracks.len());
            let plan = self
                .planner
                .plan(&track_a.analysis, &track_b.analysis, &context);

            token.check()?;
            let rendered = self.renderer.render(
                &audio_a,
                sr_a,
                &audio_b,
                sr_b,
                &track_a.analysis,
                &track_b.analysis,
                &plan,
            )?;

            let path = SETTINGS.mix_segment_path(&job.project_id, &track_a.id, &track_b.id);
            token.check()?;
            audio::write_wav(&path, &rendered.samples, rendered.sample_rate)?;

            let relative = format!(
                "mix_segments/{}/transition_{}_{}.wav",
                job.project_id, track_a.id, track_b.id
            );
            timeline.apply_transition(pair_index, &rendered, &relative)?;
            transition_files.insert(format!("{}_{}", track_a.id, track_b.id), relative);
        }

        timeline.drop_empty_solos();
        timeline.validate()?;

        Ok(MixJobResult {
            segments: timeline.into_segments(),
            transition_files,
        })
    }
}

/// Spawn a pool of worker threads over one shared transport
pub fn spawn_workers(worker: Arc<Worker>, count: usize) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|i| {
            let worker = worker.clone();
            std::thread::Builder::new()
                .name(format!("segue-worker-{}", i))
                .spawn(move || worker.run())
                .expect("spawning a worker thread never fails on supported platforms")
        })
        .collect()
}
