use amur_common::JobKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "amur")]
#[command(author, version, about = "Event-driven media conversion for a public folder")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override the public folder from the config file
    #[arg(long, global = true)]
    pub public_folder: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch the public folder, sweep it periodically and serve it over HTTP
    Start {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Consume the distributed job queue
    Worker,

    /// Run a single reconciliation sweep and exit
    Sweep {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify a file by its content
    Classify {
        /// File to classify
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Run one conversion job against a file
    Convert {
        /// Job kind: image:optimize, image:thumbnail, video:scale or video:hls
        #[arg(long)]
        job: JobKind,

        /// Target height for video:scale
        #[arg(long)]
        height: Option<u32>,

        /// Source file
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Resize an image to exact dimensions, written to its thumbnail sibling
    Resize {
        /// Source image
        #[arg(required = true)]
        file: PathBuf,

        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
