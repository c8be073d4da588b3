use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hatrs::stage::{DetectionClock, Stage};
use hatrs::{config, DetectionResult, Hat, Pipeline};
use hatrs_vision::video::Camera;
use log::{info, warn};

#[derive(Parser)]
#[command(name = "hatrs")]
#[command(version, about = "Put a hat on every face in the camera feed")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live preview, rewriting the composited frame on every capture
    Preview {
        /// Where to write the latest frame
        #[arg(short, long, default_value = "hatrs-preview.png")]
        output: PathBuf,
        /// Stop after this many frames (runs until interrupted otherwise)
        #[arg(short, long)]
        frames: Option<u64>,
    },
    /// Put hats on the faces of a single image
    Overlay { input: PathBuf, output: PathBuf },
    /// Compute overlay transforms for a JSON detection result
    Place {
        /// JSON file with `{"faces": [...]}`; stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Preview { output, frames } => preview(&cfg, &output, frames),
        Commands::Overlay { input, output } => overlay(&cfg, &input, &output),
        Commands::Place { input } => place(&cfg, input.as_deref()),
        Commands::Config => open_config(cli.config.as_deref()),
    }
}

fn preview(cfg: &config::Config, output: &Path, frames: Option<u64>) -> Result<()> {
    let hat = Hat::open(&cfg.hat)?;
    info!("Opening camera: {}", cfg.camera);
    let mut camera = Camera::open(&cfg.camera).context("Failed to open camera")?;
    let mut pipeline = Pipeline::new(&cfg.detector.model, cfg.detector.settings())
        .context("Failed to initialize face detector")?;

    let mut stage = Stage::new(hat, cfg.overlay);
    let mut clock = DetectionClock::new(cfg.detector.min_interval());

    info!("Writing preview to {}", output.display());
    info!("Press Ctrl+C to stop.");

    let mut count = 0u64;
    while frames.map_or(true, |limit| count < limit) {
        let mut frame = camera.frame().context("Failed to capture frame")?;
        count += 1;

        if clock.due(Instant::now()) {
            let img = image::DynamicImage::ImageRgb8(frame.clone());
            match pipeline.observe(&img) {
                Ok(result) => stage.on_faces_detected(&result),
                Err(e) => warn!("Frame {}: {:#}", count, e),
            }
        }

        stage.compose(&mut frame);
        if let Err(e) = write_atomically(&frame, output) {
            warn!("Frame {}: {:#}", count, e);
        }
    }

    info!("Stopped after {} frame(s)", count);
    Ok(())
}

fn overlay(cfg: &config::Config, input: &Path, output: &Path) -> Result<()> {
    let hat = Hat::open(&cfg.hat)?;
    let img = image::open(input).with_context(|| format!("reading {}", input.display()))?;
    let mut pipeline = Pipeline::new(&cfg.detector.model, cfg.detector.settings())
        .context("Failed to initialize face detector")?;

    let result = pipeline.observe(&img)?;
    info!("Found {} face(s) in {}", result.faces.len(), input.display());

    let mut stage = Stage::new(hat, cfg.overlay);
    stage.on_faces_detected(&result);
    let mut frame = img.to_rgb8();
    stage.compose(&mut frame);
    frame
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;

    info!("✓ Wrote {}", output.display());
    Ok(())
}

fn place(cfg: &config::Config, input: Option<&Path>) -> Result<()> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading detection result from stdin")?;
            buf
        }
    };

    let result: DetectionResult =
        serde_json::from_str(&raw).context("parsing detection result")?;
    result.validate()?;

    let transforms = hatrs_vision::place_all(&result.faces, &cfg.overlay);
    println!("{}", serde_json::to_string_pretty(&transforms)?);
    Ok(())
}

/// Replace `path` in one step so a viewer never reads a half-written frame
fn write_atomically(frame: &image::RgbImage, path: &Path) -> Result<()> {
    let tmp = path.with_extension("tmp.png");
    frame
        .save(&tmp)
        .with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        info!("Creating default config at {}", config_path.display());
        config::save_config(&config::Config::default(), Some(config_path))?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
