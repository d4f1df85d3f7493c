//! Face tracking command line.

use anyhow::{Context, Result};
use clap::Parser;
use facetrack_media::video::{VideoReader, VideoSinkFactory};
use facetrack_media::TrackerConfig;
use facetrack_models::FaceTrackingOptions;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "facetrack")]
#[command(about = "Detect and track faces in a video", long_about = None)]
#[command(version)]
struct Cli {
    /// Input video
    input: PathBuf,

    /// Face detection model (.xml cascade or .caffemodel), repeatable
    #[arg(long = "model", short = 'm', required = true)]
    models: Vec<PathBuf>,

    /// LBF landmark model (.yaml)
    #[arg(long)]
    landmarks: Option<PathBuf>,

    /// Output base path [default: input without extension]
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Frames per window
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Frames shared by consecutive windows
    #[arg(long)]
    overlap: Option<usize>,

    /// Keep the N best faces per frame (0 keeps all)
    #[arg(long)]
    nbest: Option<usize>,

    /// Minimum face confidence
    #[arg(long)]
    score: Option<f32>,

    /// Minimum confidence of the detectors themselves
    #[arg(long)]
    min_score: Option<f32>,

    /// Minimum face size, as a ratio of the frame size
    #[arg(long)]
    min_ratio: Option<f32>,

    /// Do not write the CSV file
    #[arg(long)]
    no_csv: bool,

    /// Draw faces on the frames
    #[arg(long)]
    tag: bool,

    /// Crop each face
    #[arg(long)]
    crop: bool,

    /// Write tagged/cropped frames as videos
    #[arg(long)]
    video: bool,

    /// Write tagged/cropped frames as image folders
    #[arg(long)]
    folder: bool,

    /// Output image width (0 keeps the aspect ratio)
    #[arg(long)]
    width: Option<i32>,

    /// Output image height (0 keeps the aspect ratio)
    #[arg(long)]
    height: Option<i32>,

    /// Reframe faces as portraits
    #[arg(long)]
    portrait: bool,

    /// Extra option as KEY=VALUE, repeatable
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Write Prometheus metrics to this file when done
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

impl Cli {
    /// Options from the flags, then the `--option` pairs.
    fn tracking_options(&self, mut options: FaceTrackingOptions) -> Result<FaceTrackingOptions> {
        if let Some(nbest) = self.nbest {
            options.nbest = nbest;
        }
        if let Some(score) = self.score {
            options.score = score;
        }
        if let Some(width) = self.width {
            options.width = width;
        }
        if let Some(height) = self.height {
            options.height = height;
        }
        options.csv &= !self.no_csv;
        options.tag |= self.tag;
        options.crop |= self.crop;
        options.video |= self.video;
        options.folder |= self.folder;
        options.portrait |= self.portrait;

        for pair in &self.options {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("Invalid option '{}', expected KEY=VALUE", pair))?;
            options.set_option(key, value)?;
        }
        options.validate()?;
        Ok(options)
    }

    fn config(&self) -> Result<TrackerConfig> {
        let mut config = TrackerConfig::from_env();
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if let Some(overlap) = self.overlap {
            config.overlap = overlap;
        }
        config.options = self.tracking_options(config.options.clone())?;
        config.validate()?;
        Ok(config)
    }

    fn output(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.input.with_extension(""))
    }
}

#[cfg(feature = "opencv")]
fn video_io() -> Result<(Box<dyn VideoReader>, Box<dyn VideoSinkFactory>)> {
    use facetrack_media::video::{OpencvVideoReader, OpencvVideoSinkFactory};
    Ok((
        Box::new(OpencvVideoReader::new()),
        Box::new(OpencvVideoSinkFactory),
    ))
}

#[cfg(not(feature = "opencv"))]
fn video_io() -> Result<(Box<dyn VideoReader>, Box<dyn VideoSinkFactory>)> {
    anyhow::bail!("facetrack was built without the `opencv` feature, videos cannot be decoded")
}

fn run(cli: Cli) -> Result<()> {
    let metrics = match cli.metrics_out {
        Some(_) => Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install Prometheus recorder")?,
        ),
        None => None,
    };

    let config = cli.config()?;
    info!("Tracker config: {:?}", config);

    let (reader, sinks) = video_io()?;
    let mut tracker = config.build_tracker(reader)?.with_video_sinks(sinks);

    let buffer = tracker.buffer_mut();
    buffer
        .load_face_models(&cli.models)
        .context("Failed to load face detection models")?;
    if let Some(value) = cli.min_score {
        buffer.set_min_score(value)?;
    }
    if let Some(value) = cli.min_ratio {
        buffer.set_min_ratio(value)?;
    }
    if let Some(path) = &cli.landmarks {
        buffer
            .load_landmark_model(path)
            .with_context(|| format!("Failed to load landmark model {}", path.display()))?;
    }

    let output = cli.output();
    let summary = tracker
        .run(&cli.input, &output)
        .with_context(|| format!("Failed to track faces in {}", cli.input.display()))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let (Some(handle), Some(path)) = (metrics, &cli.metrics_out) {
        std::fs::write(path, handle.render())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!(path = %path.display(), "Wrote metrics");
    }
    Ok(())
}

fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("facetrack=info".parse().unwrap())
        .add_directive("facetrack_media=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let cli = Cli::parse();
    info!(input = %cli.input.display(), "Starting facetrack");

    if let Err(e) = run(cli) {
        error!("Face tracking failed: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("facetrack").chain(args.iter().copied()))
    }

    #[test]
    fn test_flags_build_options() {
        let cli = parse(&[
            "talk.mp4", "-m", "haar.xml", "-m", "res10.caffemodel", "--tag", "--video",
            "--nbest", "2", "--no-csv", "--width", "320",
        ]);
        assert_eq!(cli.models.len(), 2);
        let options = cli.tracking_options(FaceTrackingOptions::default()).unwrap();
        assert!(options.tag && options.video);
        assert!(!options.csv);
        assert_eq!(options.nbest, 2);
        assert_eq!(options.width, 320);
        assert_eq!(cli.output(), PathBuf::from("talk"));
    }

    #[test]
    fn test_key_value_options() {
        let cli = parse(&["in.avi", "-m", "m.xml", "--option", "portrait=yes", "--option", "score=0.5"]);
        let options = cli.tracking_options(FaceTrackingOptions::default()).unwrap();
        assert!(options.portrait);
        assert_eq!(options.score, 0.5);

        let cli = parse(&["in.avi", "-m", "m.xml", "--option", "colour=red"]);
        assert!(cli.tracking_options(FaceTrackingOptions::default()).is_err());
        let cli = parse(&["in.avi", "-m", "m.xml", "--option", "score"]);
        assert!(cli.tracking_options(FaceTrackingOptions::default()).is_err());
    }

    #[test]
    fn test_out_of_range_score_rejected() {
        let cli = parse(&["in.avi", "-m", "m.xml", "--score", "3"]);
        assert!(cli.tracking_options(FaceTrackingOptions::default()).is_err());
    }
}
