//! Periodic reconciliation of image artifacts.
//!
//! The live path can lose work: the watcher may miss events, a codec may
//! fail, the distributed queue may drop a job. The sweeper walks the whole
//! public tree on a fixed period and repairs every image whose compressed
//! sibling or thumbnail is missing, calling the adapters directly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use amur_av::{Conversion, ToolRegistry};
use amur_common::paths::{image_artifacts, is_derived, is_temporary, ImageArtifacts};
use amur_common::ContentKind;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::classify::classify_path;
use crate::images;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Regular files visited.
    pub scanned: usize,
    /// Source images checked.
    pub images: usize,
    /// Compressed siblings written.
    pub encoded: usize,
    /// Thumbnails written.
    pub thumbnailed: usize,
    /// Adapter calls that failed or were only attempted.
    pub failed: usize,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned {} files, {} images: {} encoded, {} thumbnailed, {} failed in {:.1?}",
            self.scanned, self.images, self.encoded, self.thumbnailed, self.failed, self.elapsed
        )
    }
}

/// Clears the running flag when dropped, including on panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Walks the public tree and converges image artifacts.
pub struct Sweeper {
    root: PathBuf,
    tools: ToolRegistry,
    running: Arc<AtomicBool>,
}

impl Sweeper {
    pub fn new(root: impl Into<PathBuf>, tools: ToolRegistry) -> Self {
        Self {
            root: root.into(),
            tools,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn try_begin(&self) -> Option<RunningGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunningGuard(self.running.clone()))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one pass now, unless one is already in progress.
    pub async fn sweep_once(&self) -> Option<SweepReport> {
        let _guard = self.try_begin()?;
        Some(self.run_pass().await)
    }

    /// Sweep every `period` until `cancel` fires.
    ///
    /// Each pass runs on its own task; a tick that finds the previous pass
    /// still running is skipped.
    pub fn spawn(self: Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(root = %self.root.display(), ?period, "Sweeper started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(guard) = self.try_begin() else {
                            tracing::info!("Previous sweep still running, skipping tick");
                            continue;
                        };
                        let this = self.clone();
                        tokio::spawn(async move {
                            let _guard = guard;
                            let report = this.run_pass().await;
                            tracing::info!(
                                scanned = report.scanned,
                                images = report.images,
                                encoded = report.encoded,
                                thumbnailed = report.thumbnailed,
                                failed = report.failed,
                                "Sweep complete in {:.1?}",
                                report.elapsed
                            );
                        });
                    }
                }
            }

            tracing::info!("Sweeper stopped");
        })
    }

    async fn run_pass(&self) -> SweepReport {
        let started = Instant::now();
        let root = self.root.clone();

        let (scanned, plan) = match tokio::task::spawn_blocking(move || plan(&root)).await {
            Ok(planned) => planned,
            Err(e) => {
                tracing::error!(error = %e, "Sweep planning task failed");
                return SweepReport {
                    elapsed: started.elapsed(),
                    ..Default::default()
                };
            }
        };

        let mut report = SweepReport {
            scanned,
            images: plan.len(),
            ..Default::default()
        };

        for (path, artifacts) in plan {
            if !artifacts.compressed_valid {
                match amur_av::encode_webp(&self.tools, &path).await {
                    Ok(Conversion::Produced(_)) => report.encoded += 1,
                    Ok(Conversion::NoOp) => {}
                    Ok(Conversion::Attempted { .. }) => report.failed += 1,
                    Err(amur_av::Error::Unsupported(msg)) => {
                        tracing::debug!(path = %path.display(), "{}", msg);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Sweep encode failed");
                        report.failed += 1;
                    }
                }
            }

            if !artifacts.thumbnail_exists {
                let source = path.clone();
                match tokio::task::spawn_blocking(move || images::make_thumbnail(&source)).await {
                    Ok(Ok(Conversion::Produced(_))) => report.thumbnailed += 1,
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(path = %path.display(), error = %e, "Sweep thumbnail failed");
                        report.failed += 1;
                    }
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e, "Thumbnail task failed");
                        report.failed += 1;
                    }
                }
            }
        }

        report.elapsed = started.elapsed();
        report
    }
}

/// Walk `root` and list source images with missing or invalid artifacts.
///
/// Returns the number of regular files visited alongside the plan.
fn plan(root: &Path) -> (usize, Vec<(PathBuf, ImageArtifacts)>) {
    let mut scanned = 0;
    let mut plan = Vec::new();

    for entry in WalkDir::new(root).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry during sweep");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        scanned += 1;

        let path = entry.path();
        if is_derived(path) || is_temporary(path) {
            continue;
        }
        if classify_path(path) != ContentKind::Image {
            continue;
        }

        let artifacts = image_artifacts(path);
        if !artifacts.is_complete() {
            plan.push((path.to_path_buf(), artifacts));
        } else {
            tracing::trace!(path = %path.display(), "Artifacts complete");
        }
    }

    (scanned, plan)
}
