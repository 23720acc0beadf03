//! Routing of classified files to conversion jobs.
//!
//! The [`Dispatcher`] turns a `(path, kind)` pair into conversion jobs and
//! hands them to either the local [`WorkerPool`] or the distributed
//! [`JobQueue`], depending on the process-wide [`ExecutionBackend`]. It never
//! runs an adapter itself, so the watcher loop is never blocked on a codec.

mod pool;
mod queue;
mod runner;
mod video;

pub use pool::{Submission, WorkerPool};
pub use queue::{JobPayload, JobQueue, QueueWorker, QueuedJob, RedisQueue};
pub use runner::ConversionRunner;
pub use video::{source_height, target_resolutions};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use amur_av::ToolRegistry;
use amur_common::paths::{is_derived, is_derived_video};
use amur_common::{ContentKind, ConversionJob, ExecutionBackend};
use dashmap::DashSet;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::config::VideoConfig;

/// Videos whose renditions may be planned at the same time.
const PLANNING_SLOTS: usize = 4;

/// Routes classified files to conversion jobs.
pub struct Dispatcher {
    pool: Arc<WorkerPool>,
    queue: Option<Arc<dyn JobQueue>>,
    tools: ToolRegistry,
    video: Arc<VideoConfig>,
    planning: TaskTracker,
    planning_slots: Arc<Semaphore>,
    // Sources with a planning task queued or running.
    planned: Arc<DashSet<PathBuf>>,
}

impl Dispatcher {
    /// A dispatcher that runs every job on `pool`.
    pub fn new(pool: Arc<WorkerPool>, tools: ToolRegistry, video: VideoConfig) -> Self {
        Self {
            pool,
            queue: None,
            tools,
            video: Arc::new(video),
            planning: TaskTracker::new(),
            planning_slots: Arc::new(Semaphore::new(PLANNING_SLOTS)),
            planned: Arc::new(DashSet::new()),
        }
    }

    /// Send image jobs to `queue` instead of the pool.
    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn backend(&self) -> ExecutionBackend {
        if self.queue.is_some() {
            ExecutionBackend::Queued
        } else {
            ExecutionBackend::Inline
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Route one classified file. Failures are logged, never returned.
    pub async fn dispatch(&self, path: &Path, kind: ContentKind) {
        let derived = match kind {
            ContentKind::Video => is_derived_video(path),
            _ => is_derived(path),
        };
        if derived {
            tracing::trace!(path = %path.display(), "Skipping derived artifact");
            return;
        }

        match kind {
            ContentKind::Image => self.dispatch_image(path).await,
            ContentKind::Video => self.dispatch_video(path).await,
            ContentKind::Other => {}
        }
    }

    async fn dispatch_image(&self, path: &Path) {
        let jobs = [ConversionJob::optimize(path), ConversionJob::thumbnail(path)];

        match &self.queue {
            Some(queue) => {
                for job in &jobs {
                    match queue.enqueue(job).await {
                        Ok(id) => tracing::info!(id = %id, job = %job, "Enqueued job"),
                        Err(e) => tracing::error!(job = %job, error = %e, "Failed to enqueue job"),
                    }
                }
            }
            None => {
                for job in jobs {
                    submit(&self.pool, job).await;
                }
            }
        }
    }

    async fn dispatch_video(&self, path: &Path) {
        if self.video.can_convert_to_streaming {
            submit(&self.pool, ConversionJob::hls(path)).await;
        }

        if !self.video.can_scale_video || self.video.candidate_video_heights.is_empty() {
            return;
        }

        let path: PathBuf = path.to_path_buf();
        if !self.planned.insert(path.clone()) {
            tracing::trace!(path = %path.display(), "Renditions already being planned");
            return;
        }

        // Waits here when every slot is taken, like a full pool queue.
        let Ok(permit) = self.planning_slots.clone().acquire_owned().await else {
            self.planned.remove(&path);
            return;
        };

        // Probing shells out; keep it off the watcher loop.
        let pool = self.pool.clone();
        let tools = self.tools.clone();
        let video = self.video.clone();
        let planned = self.planned.clone();
        self.planning.spawn(async move {
            let height = source_height(&tools, &video, &path).await;
            let targets = target_resolutions(&video.candidate_video_heights, height);
            tracing::debug!(
                path = %path.display(),
                height,
                renditions = targets.len(),
                "Planned video renditions"
            );
            for target in targets {
                submit(&pool, ConversionJob::scale(&path, target)).await;
            }
            planned.remove(&path);
            drop(permit);
        });
    }

    /// Wait for pending rendition planning and for the pool to drain.
    pub async fn wait_idle(&self) {
        self.wait_planning().await;
        self.pool.wait_idle().await;
    }

    async fn wait_planning(&self) {
        self.planning.close();
        self.planning.wait().await;
        self.planning.reopen();
    }
}

async fn submit(pool: &WorkerPool, job: ConversionJob) {
    match pool.submit(job.clone()).await {
        Ok(Submission::Queued) => tracing::debug!(job = %job, "Submitted job"),
        Ok(_) => {}
        Err(e) => tracing::error!(job = %job, error = %e, "Failed to submit job"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::error::{Error, Result};
    use amur_common::{JobId, JobKind};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<ConversionJob>>,
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue(&self, job: &ConversionJob) -> Result<JobId> {
            self.jobs.lock().push(job.clone());
            Ok(JobId::new())
        }
    }

    struct FailingQueue;

    #[async_trait]
    impl JobQueue for FailingQueue {
        async fn enqueue(&self, _job: &ConversionJob) -> Result<JobId> {
            Err(Error::invalid_input("queue unavailable"))
        }
    }

    /// A pool whose workers never run, so submitted jobs stay observable.
    fn parked_pool() -> Arc<WorkerPool> {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = Arc::new(ConversionRunner::new(ToolRegistry::default(), 6));
        Arc::new(WorkerPool::start(runner, 1, 64, OverflowPolicy::Block, cancel))
    }

    async fn parked() -> Arc<WorkerPool> {
        let pool = parked_pool();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        pool
    }

    #[tokio::test]
    async fn test_queued_images_go_to_queue() {
        let queue = Arc::new(RecordingQueue::default());
        let pool = parked().await;
        let dispatcher = Dispatcher::new(pool.clone(), ToolRegistry::default(), VideoConfig::default())
            .with_queue(queue.clone());
        assert_eq!(dispatcher.backend(), ExecutionBackend::Queued);

        dispatcher
            .dispatch(Path::new("/pub/images/cat.jpg"), ContentKind::Image)
            .await;

        let kinds: Vec<JobKind> = queue.jobs.lock().iter().map(|j| j.kind).collect();
        assert_eq!(kinds, vec![JobKind::ImageOptimize, JobKind::ImageThumbnail]);
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_swallowed() {
        let pool = parked().await;
        let dispatcher = Dispatcher::new(pool.clone(), ToolRegistry::default(), VideoConfig::default())
            .with_queue(Arc::new(FailingQueue));
        dispatcher
            .dispatch(Path::new("/pub/images/cat.jpg"), ContentKind::Image)
            .await;
        // Never falls back to the local pool.
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn test_inline_images_go_to_pool() {
        let pool = parked().await;
        let dispatcher = Dispatcher::new(pool.clone(), ToolRegistry::default(), VideoConfig::default());
        assert_eq!(dispatcher.backend(), ExecutionBackend::Inline);

        dispatcher
            .dispatch(Path::new("/pub/images/cat.jpg"), ContentKind::Image)
            .await;
        assert_eq!(pool.queued(), 2);
    }

    #[tokio::test]
    async fn test_derived_and_other_are_skipped() {
        let queue = Arc::new(RecordingQueue::default());
        let pool = parked().await;
        let dispatcher = Dispatcher::new(pool.clone(), ToolRegistry::default(), VideoConfig::default())
            .with_queue(queue.clone());

        for path in ["/p/cat.webp", "/p/cat_thumb.jpg"] {
            dispatcher.dispatch(Path::new(path), ContentKind::Image).await;
            dispatcher.dispatch(Path::new(path), ContentKind::Video).await;
        }
        dispatcher
            .dispatch(Path::new("/p/notes.txt"), ContentKind::Other)
            .await;

        assert!(queue.jobs.lock().is_empty());
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn test_video_artifacts_are_skipped_only_next_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let videos = dir.path();
        std::fs::write(videos.join("clip.mp4"), b"mp4").unwrap();
        std::fs::write(videos.join("clip_720p.mp4"), b"mp4").unwrap();
        std::fs::create_dir(videos.join("clip_hls")).unwrap();
        std::fs::write(videos.join("clip_hls/index.m3u8"), b"#EXTM3U").unwrap();
        std::fs::write(videos.join("clip_hls/init.mp4"), b"mp4").unwrap();
        std::fs::write(videos.join("concert_1080p.mp4"), b"mp4").unwrap();

        let pool = parked().await;
        let video = VideoConfig {
            can_convert_to_streaming: true,
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(pool.clone(), ToolRegistry::default(), video);

        for name in ["clip_720p.mp4", "clip_hls/init.mp4"] {
            dispatcher
                .dispatch(&videos.join(name), ContentKind::Video)
                .await;
        }
        assert_eq!(pool.queued(), 0);

        // No `concert.mp4` beside it, so this is an upload.
        dispatcher
            .dispatch(&videos.join("concert_1080p.mp4"), ContentKind::Video)
            .await;
        assert_eq!(pool.queued(), 1);
    }

    #[tokio::test]
    async fn test_video_jobs_always_use_pool() {
        let queue = Arc::new(RecordingQueue::default());
        let pool = parked().await;
        let video = VideoConfig {
            can_convert_to_streaming: true,
            can_scale_video: true,
            candidate_video_heights: vec![2160, 1080, 480],
            probe_source_height: false,
            assumed_source_height: 1080,
            ..Default::default()
        };
        let dispatcher =
            Dispatcher::new(pool.clone(), ToolRegistry::default(), video).with_queue(queue.clone());

        dispatcher
            .dispatch(Path::new("/pub/videos/clip.mp4"), ContentKind::Video)
            .await;
        dispatcher.wait_planning().await;

        assert!(queue.jobs.lock().is_empty());
        // One HLS job plus 1080p and 480p renditions.
        assert_eq!(pool.queued(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_repeated_video_events_plan_once() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ffprobe.log");
        let ffprobe = dir.path().join("ffprobe");
        std::fs::write(
            &ffprobe,
            format!("#!/bin/sh\necho run >> \"{}\"\nsleep 0.3\necho 720\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&ffprobe, std::fs::Permissions::from_mode(0o755)).unwrap();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"mp4").unwrap();

        let pool = parked().await;
        let video = VideoConfig {
            can_scale_video: true,
            candidate_video_heights: vec![1080, 720, 480],
            probe_source_height: true,
            ..Default::default()
        };
        let tools = ToolRegistry::default().with_tool("ffprobe", ffprobe.clone());
        let dispatcher = Dispatcher::new(pool.clone(), tools, video);
        let runs = || std::fs::read_to_string(&log).unwrap_or_default().lines().count();

        for _ in 0..3 {
            dispatcher.dispatch(&clip, ContentKind::Video).await;
        }
        dispatcher.wait_planning().await;
        assert_eq!(runs(), 1);
        // 720p and 480p.
        assert_eq!(pool.queued(), 2);

        // Once planning is done, a new event plans again.
        dispatcher.dispatch(&clip, ContentKind::Video).await;
        dispatcher.wait_planning().await;
        assert_eq!(runs(), 2);
        assert_eq!(pool.queued(), 2);
    }

    #[tokio::test]
    async fn test_video_disabled_does_nothing() {
        let pool = parked().await;
        let dispatcher = Dispatcher::new(pool.clone(), ToolRegistry::default(), VideoConfig::default());
        dispatcher
            .dispatch(Path::new("/pub/videos/clip.mp4"), ContentKind::Video)
            .await;
        dispatcher.wait_planning().await;
        assert_eq!(pool.queued(), 0);
    }
}
