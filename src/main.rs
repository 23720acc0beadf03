mod cli;

use amur::{
    classify,
    config::{self, Config},
    dispatch::{ConversionRunner, QueueWorker, RedisQueue},
    ensure_public_folders, images, server,
    sweep::Sweeper,
    Pipeline,
};
use amur_av::{Conversion, ToolRegistry};
use amur_common::{ConversionJob, JobKind, Resolution};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Load config and apply the global `--public-folder` override.
fn load_config(config_path: Option<&Path>, public_folder: Option<PathBuf>) -> Result<Config> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(folder) = public_folder {
        config.storage.public_folder = folder;
    }
    Ok(config)
}

/// Cancel `cancel` on Ctrl+C or SIGTERM.
fn cancel_on_signal(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        server::shutdown_signal().await;
        cancel.cancel();
    });
}

async fn start_server(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting amur");
    tracing::info!(
        "Public folder: {}",
        config.storage.public_folder.display()
    );

    let cancel = CancellationToken::new();
    cancel_on_signal(&cancel);

    let pipeline = Pipeline::new(config.clone(), &cancel)?;
    let listener = server::bind(&config.server).await?;

    let mut handles = Vec::new();

    match pipeline.start_watcher(&cancel) {
        Ok(Some(handle)) => handles.push(handle),
        Ok(None) => {}
        Err(e) => {
            tracing::error!("File watcher unavailable, relying on the sweep: {:#}", e);
        }
    }

    if let Some(handle) = pipeline.start_sweeper(&cancel) {
        handles.push(handle);
    }

    if config.pipeline.use_distributed_queue && config.queue.run_worker {
        let queue = RedisQueue::open(&config.queue.redis_url, config.queue.key.clone())
            .context("Invalid job queue URL")?;
        let worker = QueueWorker::new(queue, pipeline.runner().clone());
        handles.push(tokio::spawn(worker.run(cancel.child_token())));
    }

    let app = server::create_router(
        &config.storage.public_folder,
        pipeline.dispatcher().backend(),
    );
    let server_result = server::serve(listener, app, cancel.clone()).await;

    // Cleanup
    tracing::info!("Shutting down...");
    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }

    server_result
}

async fn run_worker(config: Config) -> Result<()> {
    let tools = ToolRegistry::discover(&config.tools);
    let runner = Arc::new(ConversionRunner::new(tools, config.video.hls_segment_secs));
    let queue = RedisQueue::open(&config.queue.redis_url, config.queue.key.clone())
        .context("Invalid job queue URL")?;

    let cancel = CancellationToken::new();
    cancel_on_signal(&cancel);

    QueueWorker::new(queue, runner).run(cancel).await;
    Ok(())
}

async fn run_sweep(config: Config, json: bool) -> Result<()> {
    let root = config.storage.public_folder.clone();
    ensure_public_folders(&root)?;

    let sweeper = Sweeper::new(&root, ToolRegistry::discover(&config.tools));
    let report = sweeper
        .sweep_once()
        .await
        .context("A sweep is already running")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Sweep of {}: {}", root.display(), report);
    }

    Ok(())
}

fn classify_file(file: &Path) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    println!("{}", classify::classify_path(file));
    Ok(())
}

async fn convert_file(config: Config, kind: JobKind, height: Option<u32>, file: PathBuf) -> Result<()> {
    let scale = match (kind, height) {
        (JobKind::VideoScale, Some(height)) => Some(
            Resolution::standard(height)
                .with_context(|| format!("No standard resolution for {}p", height))?,
        ),
        (JobKind::VideoScale, None) => anyhow::bail!("video:scale needs --height"),
        _ => None,
    };

    let runner = ConversionRunner::new(
        ToolRegistry::discover(&config.tools),
        config.video.hls_segment_secs,
    );
    let job = ConversionJob {
        kind,
        target_path: file,
        scale,
    };

    print_conversion(runner.run(&job).await?)
}

fn resize_file(file: &Path, width: u32, height: u32) -> Result<()> {
    print_conversion(images::resize_image(file, width, height)?)
}

fn print_conversion(outcome: Conversion) -> Result<()> {
    match outcome {
        Conversion::Produced(dest) => println!("Produced {}", dest.display()),
        Conversion::NoOp => println!("Nothing to do"),
        Conversion::Attempted { dest, reason } => {
            anyhow::bail!("Conversion to {} failed: {}", dest.display(), reason)
        }
    }
    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Conversions that need them will be skipped.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            let config = Config::default();
            config::validate_config(&config)?;
            config
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Public folder: {}", config.storage.public_folder.display());
    println!("  Execution backend: {}", config.execution_backend());
    println!(
        "  Workers: {} (queue capacity {}, overflow {:?})",
        config.pipeline.workers, config.pipeline.queue_capacity, config.pipeline.overflow
    );
    println!("  Watch enabled: {}", config.watch.enabled);
    println!(
        "  Sweep: {} (every {}s)",
        config.sweep.enabled, config.sweep.interval_secs
    );
    println!(
        "  Video: streaming {}, scaling {} {:?}",
        config.video.can_convert_to_streaming,
        config.video.can_scale_video,
        config.video.candidate_video_heights
    );

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "amur=trace,amur_av=trace,amur_common=debug,tower_http=debug".to_string()
        } else {
            "amur=debug,amur_av=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    let config_path = cli.config.as_deref();
    let public_folder = cli.public_folder.clone();

    match cli.command {
        Commands::Start { host, port } => {
            let config = load_config(config_path, public_folder)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(config, host, port))
        }
        Commands::Worker => {
            let config = load_config(config_path, public_folder)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_worker(config))
        }
        Commands::Sweep { json } => {
            let config = load_config(config_path, public_folder)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_sweep(config, json))
        }
        Commands::Classify { file } => classify_file(&file),
        Commands::Convert { job, height, file } => {
            let config = load_config(config_path, public_folder)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_file(config, job, height, file))
        }
        Commands::Resize {
            file,
            width,
            height,
        } => resize_file(&file, width, height),
        Commands::CheckTools => {
            let config = load_config(config_path, public_folder)?;
            check_tools(&config)
        }
        Commands::Validate {
            config: validate_path,
        } => {
            let path = validate_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("amur {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
