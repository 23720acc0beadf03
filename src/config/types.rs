use amur_common::ExecutionBackend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use amur_av::ToolsConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub video: VideoConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Where image conversions run, fixed for the lifetime of the process.
    pub fn execution_backend(&self) -> ExecutionBackend {
        if self.pipeline.use_distributed_queue {
            ExecutionBackend::Queued
        } else {
            ExecutionBackend::Inline
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root of the served tree; `images/`, `videos/` and `files/` live here.
    #[serde(default = "default_public_folder")]
    pub public_folder: PathBuf,
}

fn default_public_folder() -> PathBuf {
    PathBuf::from("./public")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_folder: default_public_folder(),
        }
    }
}

/// What to do when the worker pool queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait for a free slot.
    #[default]
    Block,
    /// Discard the job and log it; the sweeper repairs images later.
    Drop,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Send image conversions to the distributed queue instead of the pool.
    #[serde(default)]
    pub use_distributed_queue: bool,

    /// Worker tasks in the local pool (default: CPU count).
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub overflow: OverflowPolicy,
}

fn default_workers() -> usize {
    num_cpus::get()
}
fn default_queue_capacity() -> usize {
    256
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            use_distributed_queue: false,
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entries kept in the recent-event ring buffer.
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Entries older than this are ignored when filtering chmod events.
    #[serde(default = "default_history_window")]
    pub history_window_secs: u64,

    /// A changed file is classified only after this long without changes.
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,
}

fn default_true() -> bool {
    true
}
fn default_history_size() -> usize {
    64
}
fn default_history_window() -> u64 {
    10
}
fn default_settle_millis() -> u64 {
    1500
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_size: default_history_size(),
            history_window_secs: default_history_window(),
            settle_millis: default_settle_millis(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweepConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoConfig {
    /// Produce an HLS package for each new video.
    #[serde(default)]
    pub can_convert_to_streaming: bool,

    /// Produce scaled renditions for each new video.
    #[serde(default)]
    pub can_scale_video: bool,

    /// Rendition heights, in output order.
    #[serde(default = "default_candidate_heights")]
    pub candidate_video_heights: Vec<u32>,

    /// Ask ffprobe for the real source height.
    #[serde(default = "default_true")]
    pub probe_source_height: bool,

    /// Source height used when probing is off or fails.
    #[serde(default = "default_assumed_height")]
    pub assumed_source_height: u32,

    #[serde(default = "default_segment_secs")]
    pub hls_segment_secs: u32,
}

fn default_candidate_heights() -> Vec<u32> {
    vec![2160, 1440, 1080, 720, 540, 480, 360, 240]
}
fn default_assumed_height() -> u32 {
    1080
}
fn default_segment_secs() -> u32 {
    6
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            can_convert_to_streaming: false,
            can_scale_video: false,
            candidate_video_heights: default_candidate_heights(),
            probe_source_height: true,
            assumed_source_height: default_assumed_height(),
            hls_segment_secs: default_segment_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Redis list the jobs are pushed onto.
    #[serde(default = "default_queue_key")]
    pub key: String,

    /// Also consume the queue inside `amur start`.
    #[serde(default)]
    pub run_worker: bool,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_queue_key() -> String {
    "amur:jobs".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            key: default_queue_key(),
            run_worker: false,
        }
    }
}
