use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use moodscan_core::{FaceDetector, FaceMeshExtractor, FerClassifier};
use moodscan_engine::{record_frames, Engine, SessionReport, StopSignal, SystemClock};
use moodscan_hw::{Camera, FrameBatch, SourceError, VideoFile};
use moodscan_report::{read_csv, ReportWriter};
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

mod config;

use config::{Config, ConfigLayer, LIVE_SESSION_SECS, RECORD_SESSION_SECS};

#[derive(Parser)]
#[command(name = "moodscan", about = "Facial emotion analysis for webcam, video and image frames")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/moodscan/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory for the CSV, plots and summary
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
    /// Sampling interval: seconds for webcam/video, frames for batches
    #[arg(long, global = true)]
    frame_interval: Option<u32>,
    /// Print the summary as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the webcam live for a bounded session (Ctrl-C stops early)
    Webcam {
        /// V4L2 device path
        #[arg(short, long)]
        device: Option<String>,
        /// Session length in seconds [default: 300]
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Record webcam frames, then analyze them as a batch
    Record {
        /// V4L2 device path
        #[arg(short, long)]
        device: Option<String>,
        /// Recording length in seconds [default: 60]
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Analyze a video file (requires a build with the `opencv` feature)
    Video {
        path: PathBuf,
    },
    /// Analyze a directory of image frames, in file-name order
    Frames {
        dir: PathBuf,
    },
    /// Re-summarize and re-plot an existing CSV report
    Report {
        csv: PathBuf,
    },
    /// List V4L2 capture devices
    Devices,
}

/// What a session reads from.
enum Job {
    Live,
    Record,
    Video(PathBuf),
    Frames(PathBuf),
}

impl Job {
    /// Session length when none is configured.
    fn default_duration_secs(&self) -> u64 {
        match self {
            Job::Record => RECORD_SESSION_SECS,
            _ => LIVE_SESSION_SECS,
        }
    }
}

impl Cli {
    fn overrides(&self) -> ConfigLayer {
        let mut layer = ConfigLayer {
            output_dir: self.output.clone(),
            frame_interval: self.frame_interval,
            ..ConfigLayer::default()
        };
        if let Commands::Webcam { device, duration } | Commands::Record { device, duration } =
            &self.command
        {
            layer.camera_device = device.clone();
            layer.session_duration_secs = *duration;
        }
        layer
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref(), cli.overrides())?;

    let job = match cli.command {
        Commands::Devices => {
            list_devices();
            return Ok(());
        }
        Commands::Report { csv } => {
            let writer = ReportWriter::new(read_csv(&csv).with_context(|| {
                format!("failed to read report {}", csv.display())
            })?);
            return finish(&writer, &config.output_dir, cli.json);
        }
        Commands::Webcam { .. } => Job::Live,
        Commands::Record { .. } => Job::Record,
        Commands::Video { path } => Job::Video(path),
        Commands::Frames { dir } => Job::Frames(dir),
    };

    let report = run_session(config.clone(), job).await?;
    println!(
        "Session {} ended ({:?}): {} frames read, {} sampled, {} with a face",
        report.id,
        report.end,
        report.stats.frames_read,
        report.stats.frames_sampled,
        report.stats.faces_detected
    );

    let writer = ReportWriter::from_series(&report.series).with_session_id(report.id.to_string());
    finish(&writer, &config.output_dir, cli.json)
}

/// Run one session on a dedicated OS thread; Ctrl-C raises the stop signal
/// and the partial result is still returned.
async fn run_session(config: Config, job: Job) -> Result<SessionReport> {
    let stop = StopSignal::new();
    let (tx, mut rx) = oneshot::channel();

    let thread_stop = stop.clone();
    std::thread::Builder::new()
        .name("moodscan-session".into())
        .spawn(move || {
            let _ = tx.send(analyze(&config, job, &thread_stop));
        })
        .context("failed to spawn session thread")?;

    tokio::select! {
        result = &mut rx => return result.context("session thread exited")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received; stopping session");
            stop.stop();
        }
    }

    rx.await.context("session thread exited")?
}

/// Open the source, load the models, and run the session to completion.
fn analyze(config: &Config, job: Job, stop: &StopSignal) -> Result<SessionReport> {
    enum Opened {
        Camera(Camera),
        Video(VideoFile),
        Frames(FrameBatch),
    }

    let opened = match &job {
        Job::Live | Job::Record => Opened::Camera(
            Camera::open(&config.camera_device)
                .with_context(|| format!("failed to open camera {}", config.camera_device))?,
        ),
        Job::Video(path) => Opened::Video(VideoFile::open(path).map_err(|e| {
            let hint = match e {
                SourceError::VideoUnsupported => "; rebuild with `--features opencv`",
                _ => "",
            };
            anyhow::Error::new(e).context(format!("failed to open {}{hint}", path.display()))
        })?),
        Job::Frames(dir) => Opened::Frames(
            FrameBatch::from_dir(dir)
                .with_context(|| format!("failed to load frames from {}", dir.display()))?,
        ),
    };

    let detector_path = config.detector_model_path();
    let detector = FaceDetector::load(&detector_path).context("failed to load face detector")?;
    tracing::info!(path = %detector_path, "face detector loaded");

    let emotion_path = config.emotion_model_path();
    let classifier = FerClassifier::load(&emotion_path).context("failed to load emotion model")?;
    tracing::info!(path = %emotion_path, "emotion classifier loaded");

    let landmark_path = config.landmark_model_path();
    let landmarks =
        FaceMeshExtractor::load(&landmark_path).context("failed to load landmark model")?;
    tracing::info!(path = %landmark_path, "landmark model loaded");

    let sampler = config.sampler(job.default_duration_secs());
    let duration = sampler.session_duration;
    let mut engine = Engine::new(classifier, landmarks, sampler)?.with_face_locator(detector);

    let report = match (job, opened) {
        (Job::Record, Opened::Camera(mut camera)) => {
            tracing::info!(secs = duration.as_secs(), "recording");
            let (frames, end) = record_frames(&mut camera, duration, stop, &SystemClock);
            tracing::info!(frames = frames.len(), end = ?end, "recording done; analyzing");
            engine.analyze_frames(&frames)
        }
        (_, Opened::Camera(mut camera)) => engine.analyze_live(&mut camera, stop),
        (_, Opened::Video(mut video)) => engine.analyze_video(&mut video, stop),
        (_, Opened::Frames(batch)) => engine.analyze_frames(&batch.into_frames()),
    };
    Ok(report)
}

fn finish(writer: &ReportWriter, dir: &Path, json: bool) -> Result<()> {
    let files = writer
        .persist(dir)
        .with_context(|| format!("failed to write report to {}", dir.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(writer.summary())?);
    } else {
        print!("{}", writer.summary());
        println!("CSV report: {}", files.csv.display());
        if let Some(plot) = &files.emotion_plot {
            println!("Emotion timeline: {}", plot.display());
        }
        if let Some(plot) = &files.confidence_plot {
            println!("Confidence timeline: {}", plot.display());
        }
    }
    Ok(())
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return;
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
}
