mod cloud;
mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;

use wipecast_core::{BoundaryHandle, BoundaryPosition, ContainerFormat, WipecastConfig};
use wipecast_encode::{default_backends, EncoderBackend};
use wipecast_render::image_loader::encode_png;
use wipecast_render::{render_still, CompositeStyle};
use wipecast_studio::{ImmediateTicker, PositionTimeline, RecordingController, WipeSchedule};

#[derive(Parser)]
#[command(
    name = "wipecast",
    version,
    about = "Wipecast: before/after wipe comparisons",
    long_about = "Wipecast composites two images across a moving reveal boundary and encodes\nthe result as a video clip, with optional AI difference summaries."
)]
struct Cli {
    /// Config file (default: wipecast.toml in the working directory, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output geometry overrides shared by the rendering commands.
#[derive(clap::Args, Debug, Default)]
struct GeometryArgs {
    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fps: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a scripted wipe from the "after" image to the "before" image
    Record {
        /// The "before" image: a path, URL or data URI
        #[arg(long)]
        before: String,

        /// The "after" image: a path, URL or data URI
        #[arg(long)]
        after: String,

        /// Output file or directory (the extension always follows the negotiated format)
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Comma-separated container preference, e.g. webm,mp4 or gif
        #[arg(short, long)]
        format: Option<String>,

        #[command(flatten)]
        geometry: GeometryArgs,

        /// Clip length in seconds
        #[arg(long)]
        duration: Option<f64>,

        /// JSON array of per-frame boundary percentages, replacing the scripted wipe
        #[arg(long)]
        timeline: Option<PathBuf>,
    },

    /// Record live: read boundary percentages from stdin, one per line, until EOF
    Live {
        #[arg(long)]
        before: String,

        #[arg(long)]
        after: String,

        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        #[arg(short, long)]
        format: Option<String>,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Render a single composited frame to PNG
    Still {
        #[arg(long)]
        before: String,

        #[arg(long)]
        after: String,

        /// Boundary position in percent
        #[arg(long, default_value_t = 50.0)]
        position: f64,

        #[arg(short, long, default_value = "output/still.png")]
        output: PathBuf,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Print the scripted wipe schedule as JSON
    Schedule {
        /// Total frame count (default: duration x fps from config)
        #[arg(long)]
        frames: Option<u32>,
    },

    /// List container formats and whether this machine can encode them
    Formats,

    /// Ask the AI service for a difference summary and a highlighted image
    Compare {
        #[arg(long)]
        before: String,

        #[arg(long)]
        after: String,

        /// Directory for summary.txt and the highlight image
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ask the AI service to generate a transition video
    GenerateVideo {
        #[arg(long)]
        before: String,

        #[arg(long)]
        after: String,

        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// Save an image pair to the local comparison store
    Save {
        /// User id owning the comparison
        #[arg(long)]
        user: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        before: String,

        #[arg(long)]
        after: String,
    },

    /// List a user's saved comparisons, newest first
    List {
        #[arg(long)]
        user: String,
    },

    /// Write a default wipecast.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { force } = cli.command {
        return cmd_init(cli.config, force);
    }
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Record {
            before,
            after,
            output,
            format,
            geometry,
            duration,
            timeline,
        } => {
            let config = apply_overrides(config, format.as_deref(), &geometry, duration)?;
            run_async(cmd_record(config, before, after, output, timeline))
        }
        Commands::Live {
            before,
            after,
            output,
            format,
            geometry,
        } => {
            let config = apply_overrides(config, format.as_deref(), &geometry, None)?;
            run_async(cmd_live(config, before, after, output))
        }
        Commands::Still {
            before,
            after,
            position,
            output,
            geometry,
        } => {
            let config = apply_overrides(config, None, &geometry, None)?;
            run_async(cmd_still(config, before, after, position, output))
        }
        Commands::Schedule { frames } => cmd_schedule(&config, frames),
        Commands::Formats => cmd_formats(&config),
        Commands::Compare {
            before,
            after,
            output,
        } => run_async(cloud::cmd_compare(config, before, after, output)),
        Commands::GenerateVideo {
            before,
            after,
            output,
        } => run_async(cloud::cmd_generate_video(config, before, after, output)),
        Commands::Save {
            user,
            name,
            before,
            after,
        } => run_async(cloud::cmd_save(config, user, name, before, after)),
        Commands::List { user } => run_async(cloud::cmd_list(config, user)),
        Commands::Init { .. } => Ok(()),
    }
}

fn run_async<F>(future: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;
    runtime.block_on(future)
}

fn load_config(path: Option<&Path>) -> Result<WipecastConfig> {
    match path {
        Some(path) => WipecastConfig::load_from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display())),
        None => {
            let default = Path::new(wipecast_core::DEFAULT_CONFIG_FILE);
            if default.exists() {
                WipecastConfig::load_from_file(default)
                    .with_context(|| format!("failed to load config: {}", default.display()))
            } else {
                Ok(WipecastConfig::default())
            }
        }
    }
}

fn parse_formats(list: &str) -> Result<Vec<ContainerFormat>> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<ContainerFormat>().map_err(anyhow::Error::from))
        .collect()
}

fn apply_overrides(
    mut config: WipecastConfig,
    formats: Option<&str>,
    geometry: &GeometryArgs,
    duration: Option<f64>,
) -> Result<WipecastConfig> {
    if let Some(list) = formats {
        config.encode.formats = parse_formats(list)?;
    }
    if let Some(width) = geometry.width {
        config.output.width = width;
    }
    if let Some(height) = geometry.height {
        config.output.height = height;
    }
    if let Some(fps) = geometry.fps {
        config.output.fps = fps;
    }
    if let Some(duration) = duration {
        config.wipe.duration_secs = duration;
    }
    config.validate().context("invalid settings")?;
    Ok(config)
}

async fn cmd_record(
    config: WipecastConfig,
    before: String,
    after: String,
    output: PathBuf,
    timeline: Option<PathBuf>,
) -> Result<()> {
    let start = Instant::now();
    let controller =
        RecordingController::from_config(&config)?.with_ticker(ImmediateTicker::factory());

    let clip = match timeline {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read timeline: {}", path.display()))?;
            let timeline = PositionTimeline::from_json(&json)
                .with_context(|| format!("invalid timeline: {}", path.display()))?;
            tracing::info!("recording {} timeline frames", timeline.len());
            controller.record_timeline(&before, &after, timeline).await?
        }
        None => {
            let schedule = WipeSchedule::from_config(&config)?;
            tracing::info!(
                "recording {} frames (hold {}, wipe {})",
                schedule.total_frames(),
                schedule.hold_frames(),
                schedule.wipe_frames()
            );
            controller.record_scripted(&before, &after, &schedule).await?
        }
    };

    let path = output::clip_path(&output, clip.format);
    clip.write_to(&path)
        .with_context(|| format!("failed to write clip: {}", path.display()))?;
    println!(
        "Recorded {} frames ({:.2}s, {}) to {} in {:.2?}",
        clip.frame_count,
        clip.duration_secs(),
        clip.format,
        path.display(),
        start.elapsed()
    );
    Ok(())
}

async fn cmd_live(
    config: WipecastConfig,
    before: String,
    after: String,
    output: PathBuf,
) -> Result<()> {
    let controller = RecordingController::from_config(&config)?;
    let boundary = BoundaryHandle::new(config.comparator.initial_position);
    let format = controller.start(&before, &after, boundary.clone()).await?;
    eprintln!("Recording {} - enter positions (0-100), Ctrl-D to stop", format);

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match line.trim().parse::<f64>() {
                    Ok(percent) => boundary.set(BoundaryPosition::new(percent)),
                    Err(_) if line.trim().is_empty() => {}
                    Err(_) => tracing::warn!("ignoring '{}': not a number", line.trim()),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let clip = controller.stop().await?;
    let path = output::clip_path(&output, clip.format);
    clip.write_to(&path)
        .with_context(|| format!("failed to write clip: {}", path.display()))?;
    println!(
        "Recorded {} frames ({:.2}s) to {}",
        clip.frame_count,
        clip.duration_secs(),
        path.display()
    );
    Ok(())
}

async fn cmd_still(
    config: WipecastConfig,
    before: String,
    after: String,
    position: f64,
    output: PathBuf,
) -> Result<()> {
    let loader = wipecast_render::ImageLoader::from_config(&config.upload);
    let (base, overlay) = loader.load_pair(&before, &after).await?;
    let style = CompositeStyle {
        reveal: config.comparator.reveal,
        background: config.output.background_color()?,
    };
    let frame = render_still(
        &base,
        &overlay,
        config.output.width,
        config.output.height,
        BoundaryPosition::new(position),
        style,
    )?;
    let png = encode_png(&frame)?;
    output::write_file(&output, &png)?;
    println!("Wrote {}x{} still to {}", frame.width, frame.height, output.display());
    Ok(())
}

fn cmd_schedule(config: &WipecastConfig, frames: Option<u32>) -> Result<()> {
    let frames = frames.unwrap_or_else(|| config.frame_count());
    let schedule = WipeSchedule::new(frames, config.wipe.hold_fraction, config.wipe.wipe_fraction)?
        .with_extremes(config.wipe.from, config.wipe.to);

    let frames: Vec<serde_json::Value> = (0..schedule.total_frames() as u64)
        .map(|f| {
            serde_json::json!({
                "frame": f,
                "phase": schedule.phase_at(f),
                "position": schedule.position_at(f),
            })
        })
        .collect();
    let report = serde_json::json!({
        "total_frames": schedule.total_frames(),
        "hold_frames": schedule.hold_frames(),
        "wipe_frames": schedule.wipe_frames(),
        "frames": frames,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_formats(config: &WipecastConfig) -> Result<()> {
    let backends: Vec<Arc<dyn EncoderBackend>> = default_backends(&config.encode);
    for format in ContainerFormat::ALL {
        let backend = backends.iter().find(|b| b.supports(format));
        let preferred = config.encode.formats.contains(&format);
        println!(
            "{:<5} {:<11} {:<10} {}",
            format,
            format.mime_type(),
            backend.map(|b| b.name()).unwrap_or("unavailable"),
            if preferred { "preferred" } else { "" }
        );
    }
    Ok(())
}

fn cmd_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(wipecast_core::DEFAULT_CONFIG_FILE));
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    WipecastConfig::default()
        .save_to_file(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
