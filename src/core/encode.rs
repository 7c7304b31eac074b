/*!
 * Audio format conversion
 *
 * Tracks outside the destination-native format set are converted to MP3
 * by the external encoder. Conversions are independent, so this is the
 * pipeline's only parallel stage: a bounded pool of workers pulls jobs
 * from a channel. Ordering does not matter here; the planner runs after
 * conversion outcomes are known.
 */

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use crate::config::{EncodeErrorPolicy, TransferConfig};
use crate::core::plan::TrackPlan;
use crate::error::{Result, TransfatError};
use crate::tool::{ToolInvocation, ToolRunner};

/// One conversion job handed to a worker
struct EncodeJob {
    plan_index: usize,
    source: PathBuf,
    artifact: PathBuf,
    scratch_name: PathBuf,
}

/// Outcome for one job, keyed back to the plan
struct EncodeOutcome {
    plan_index: usize,
    result: std::result::Result<PathBuf, String>,
}

/// What the conversion stage did, for the end-of-run report
#[derive(Debug, Default)]
pub struct EncodeSummary {
    /// Artifacts produced, registered for cleanup
    pub artifacts: Vec<PathBuf>,

    /// Tracks dropped under the skip policy: relative path and reason
    pub skipped: Vec<(PathBuf, String)>,
}

impl EncodeSummary {
    pub fn converted(&self) -> usize {
        self.artifacts.len()
    }
}

/// Convert every plan that needs it, updating each plan's payload to its
/// artifact. Failed tracks are removed from `plans` (skip policy) or fail
/// the run (abort policy).
pub fn convert_pending(
    plans: &mut Vec<TrackPlan>,
    scratch: &Path,
    runner: &dyn ToolRunner,
    config: &TransferConfig,
    cancel: &Arc<AtomicBool>,
) -> Result<EncodeSummary> {
    let jobs: Vec<EncodeJob> = plans
        .iter()
        .enumerate()
        .filter(|(_, plan)| plan.needs_conversion)
        .map(|(plan_index, plan)| {
            let stem = plan
                .source
                .rel_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "track".to_string());
            // Index-prefixed names keep artifacts unique across albums
            let artifact = scratch.join(format!("{:05}-{}.mp3", plan_index, stem));
            let scratch_name = artifact.with_extension("mp3.part");
            EncodeJob {
                plan_index,
                source: plan.source.path.clone(),
                artifact,
                scratch_name,
            }
        })
        .collect();

    if jobs.is_empty() {
        return Ok(EncodeSummary::default());
    }

    let progress = if config.show_progress {
        let pb = ProgressBar::new(jobs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} converting [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let timeout = Duration::from_secs(config.tool_timeout_secs);
    let workers = config.effective_workers().min(jobs.len());
    let job_count = jobs.len();
    let (job_tx, job_rx) = bounded::<EncodeJob>(job_count);
    let (outcome_tx, outcome_rx) = bounded::<EncodeOutcome>(job_count);

    for job in jobs {
        job_tx.send(job).expect("job channel has capacity for all jobs");
    }
    drop(job_tx);

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let outcome_tx = outcome_tx.clone();
            let progress = progress.clone();
            scope.spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Some(ref pb) = progress {
                        pb.set_message(
                            job.source
                                .file_name()
                                .map(|n| n.to_string_lossy().to_string())
                                .unwrap_or_default(),
                        );
                    }
                    let result = run_encoder(runner, config, timeout, &job);
                    if let Some(ref pb) = progress {
                        pb.inc(1);
                    }
                    let _ = outcome_tx.send(EncodeOutcome {
                        plan_index: job.plan_index,
                        result,
                    });
                }
            });
        }
        drop(outcome_tx);
    });

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let mut summary = EncodeSummary::default();
    let mut failed: Vec<(usize, String)> = Vec::new();

    for outcome in outcome_rx.iter() {
        match outcome.result {
            Ok(artifact) => {
                plans[outcome.plan_index].payload = artifact.clone();
                summary.artifacts.push(artifact);
            }
            Err(reason) => failed.push((outcome.plan_index, reason)),
        }
    }

    if cancel.load(Ordering::SeqCst) {
        return Err(TransfatError::Interrupted);
    }

    // Outcomes arrive in completion order; report failures in plan order
    failed.sort_by_key(|(index, _)| *index);

    if let Some((index, reason)) = failed.first() {
        if config.encode_error_policy == EncodeErrorPolicy::Abort {
            return Err(TransfatError::Conversion {
                track: plans[*index].source.rel_path.clone(),
                reason: reason.clone(),
            });
        }
    }

    if !failed.is_empty() {
        // Skip policy: drop the failed tracks before sequencing so the
        // surviving indices stay dense
        for (index, reason) in failed.iter().rev() {
            let plan = plans.remove(*index);
            warn!(
                track = %plan.source.rel_path.display(),
                "conversion failed, skipping track: {}",
                reason
            );
            summary
                .skipped
                .push((plan.source.rel_path.clone(), reason.clone()));
        }
        summary.skipped.reverse();
    }

    Ok(summary)
}

/// Invoke the encoder for one track.
///
/// Output goes to a private scratch name and is renamed to the artifact
/// name only on success, so a failed conversion never leaves a partial
/// artifact behind.
fn run_encoder(
    runner: &dyn ToolRunner,
    config: &TransferConfig,
    timeout: Duration,
    job: &EncodeJob,
) -> std::result::Result<PathBuf, String> {
    let invocation = ToolInvocation::new(&config.encoder_program)
        .arg("-i")
        .arg(&job.source)
        .arg("-codec:a")
        .arg("libmp3lame")
        .arg("-b:a")
        .arg(format!("{}k", config.bitrate_kbps))
        .arg("-vn")
        .arg("-y")
        .arg(&job.scratch_name)
        .timeout(timeout);

    let outcome = (|| {
        let output = runner.run(&invocation).map_err(|e| e.to_string())?;
        if !output.success() {
            return Err(format!(
                "encoder exited with status {:?}: {}",
                output.status,
                output.stderr_tail()
            ));
        }
        let size = std::fs::metadata(&job.scratch_name)
            .map_err(|e| format!("encoder produced no output: {}", e))?
            .len();
        if size == 0 {
            return Err("encoder produced an empty file".to_string());
        }
        std::fs::rename(&job.scratch_name, &job.artifact)
            .map_err(|e| format!("could not finalize artifact: {}", e))?;
        debug!(
            source = %job.source.display(),
            artifact = %job.artifact.display(),
            "converted"
        );
        Ok(job.artifact.clone())
    })();

    if outcome.is_err() {
        let _ = std::fs::remove_file(&job.scratch_name);
    }
    outcome
}
