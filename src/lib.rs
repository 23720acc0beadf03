//! amur - event-driven media conversion for a public folder
//!
//! The live path is watcher → classifier → dispatcher → adapters; the
//! repair path is the periodic sweep. Both converge on the same on-disk
//! naming conventions from [`amur_common::paths`].

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod images;
pub mod server;
pub mod sweep;
pub mod watch;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use amur_av::ToolRegistry;
use amur_common::paths::ESSENTIAL_FOLDERS;
use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::{ConversionRunner, Dispatcher, RedisQueue, WorkerPool};
use crate::sweep::Sweeper;
use crate::watch::FileWatcher;

/// Create the public folder and its `images/`, `videos/` and `files/` children.
pub fn ensure_public_folders(root: &Path) -> Result<()> {
    for name in ESSENTIAL_FOLDERS {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    Ok(())
}

/// Codecs the configuration calls that `tools` does not provide.
pub fn missing_tools(config: &Config, tools: &ToolRegistry) -> Vec<&'static str> {
    let video = &config.video;
    let mut needed = vec!["cwebp"];
    if video.can_convert_to_streaming || video.can_scale_video {
        needed.push("ffmpeg");
    }
    if video.can_scale_video && video.probe_source_height {
        needed.push("ffprobe");
    }
    needed.retain(|tool| !tools.has(tool));
    needed
}

/// The wired-up conversion pipeline for one public folder.
pub struct Pipeline {
    config: Config,
    tools: ToolRegistry,
    runner: Arc<ConversionRunner>,
    dispatcher: Arc<Dispatcher>,
    sweeper: Arc<Sweeper>,
}

impl Pipeline {
    /// Discover tools and build the pipeline with the tools found on the host.
    pub fn new(config: Config, cancel: &CancellationToken) -> Result<Self> {
        let tools = ToolRegistry::discover(&config.tools);
        Self::with_tools(config, tools, cancel)
    }

    /// Build the pipeline around an explicit tool registry.
    ///
    /// Creates the public folder layout, starts the worker pool and, when
    /// the distributed queue is enabled, points image jobs at it.
    pub fn with_tools(config: Config, tools: ToolRegistry, cancel: &CancellationToken) -> Result<Self> {
        let root = config.storage.public_folder.clone();
        ensure_public_folders(&root)?;

        for tool in missing_tools(&config, &tools) {
            tracing::warn!(tool, "Codec not found, its conversions will fail until installed");
        }

        let runner = Arc::new(ConversionRunner::new(
            tools.clone(),
            config.video.hls_segment_secs,
        ));
        let pool = Arc::new(WorkerPool::start(
            runner.clone(),
            config.pipeline.workers,
            config.pipeline.queue_capacity,
            config.pipeline.overflow,
            cancel.child_token(),
        ));

        let mut dispatcher = Dispatcher::new(pool, tools.clone(), config.video.clone());
        if config.pipeline.use_distributed_queue {
            let queue = RedisQueue::open(&config.queue.redis_url, config.queue.key.clone())
                .context("Invalid job queue URL")?;
            dispatcher = dispatcher.with_queue(Arc::new(queue));
        }
        tracing::info!(backend = %dispatcher.backend(), "Execution backend selected");

        let sweeper = Arc::new(Sweeper::new(&root, tools.clone()));

        Ok(Self {
            config,
            tools,
            runner,
            dispatcher: Arc::new(dispatcher),
            sweeper,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn runner(&self) -> &Arc<ConversionRunner> {
        &self.runner
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn sweeper(&self) -> &Arc<Sweeper> {
        &self.sweeper
    }

    /// Start the watcher, if enabled.
    pub fn start_watcher(&self, cancel: &CancellationToken) -> Result<Option<JoinHandle<()>>> {
        if !self.config.watch.enabled {
            tracing::info!("File watcher is disabled");
            return Ok(None);
        }
        let watcher = FileWatcher::new(&self.config.storage.public_folder, &self.config.watch);
        watcher
            .start(self.dispatcher.clone(), cancel.child_token())
            .map(Some)
    }

    /// Start the periodic sweep, if enabled.
    pub fn start_sweeper(&self, cancel: &CancellationToken) -> Option<JoinHandle<()>> {
        if !self.config.sweep.enabled {
            tracing::info!("Reconciliation sweep is disabled");
            return None;
        }
        let period = Duration::from_secs(self.config.sweep.interval_secs);
        Some(self.sweeper.clone().spawn(period, cancel.child_token()))
    }
}
