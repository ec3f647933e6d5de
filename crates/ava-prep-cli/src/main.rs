// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use ava_prep::{
    AnnotationIndex, Config, Downloader, Error, Progress, Sampler, Split, Trimmer,
    annotation::read_annotations,
    check::{check_videos, collect_resolutions},
    config::StrategyKind,
    manifest::{collect_manifest, write_manifest},
    masks::download_masks,
    video::read_file_list,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::PathBuf;
use tokio::{sync::mpsc, task::JoinHandle};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML, TOML or JSON). Defaults to paths.yaml in the
    /// working directory or config.yaml in the user configuration directory.
    #[clap(long, env = "AVA_PREP_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory of the dataset
    #[clap(long)]
    data_dir: Option<PathBuf>,

    /// Dataset split: trainval or test
    #[clap(long)]
    split: Option<Split>,

    /// Preparation command
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Download the source videos listed in the split's file list. Videos
    /// already present are not requested again.
    Download {
        /// File with one video file name per line
        #[clap(long)]
        file_list: Option<PathBuf>,

        /// Output directory for the videos
        #[clap(long, short)]
        output: Option<PathBuf>,

        /// Base URL of the video mirror
        #[clap(long)]
        base_url: Option<String>,
    },
    /// Cut a short clip around every annotated keyframe. Existing clips are
    /// kept as they are.
    Sample {
        /// Annotation CSV file
        #[clap(long, short)]
        annotations: Option<PathBuf>,

        /// Directory holding the source videos
        #[clap(long)]
        video_dir: Option<PathBuf>,

        /// Output directory for the clips
        #[clap(long, short)]
        output: Option<PathBuf>,

        /// Clip length in seconds
        #[clap(long)]
        duration: Option<f64>,

        /// Merge nearby keyframes into one variable-length clip
        #[clap(long)]
        clustered: bool,
    },
    /// Write a CSV manifest of every valid clip.
    Manifest {
        /// Directory holding the clips
        #[clap(long)]
        clip_dir: Option<PathBuf>,

        /// Annotation CSV file providing the action labels
        #[clap(long, short)]
        annotations: Option<PathBuf>,

        /// Manifest CSV file
        #[clap(long, short)]
        output: Option<PathBuf>,

        /// Minimum clip duration in seconds
        #[clap(long)]
        min_duration: Option<f64>,

        /// Also write the manifest as an Arrow IPC file
        #[cfg(feature = "polars")]
        #[clap(long)]
        arrow: Option<PathBuf>,
    },
    /// Trim source videos to the annotated segment of each movie.
    Trim {
        /// Directory holding the source videos
        #[clap(long)]
        video_dir: Option<PathBuf>,

        /// Output directory for the trimmed videos
        #[clap(long, short)]
        output: Option<PathBuf>,

        /// Segment start in seconds
        #[clap(long)]
        start: Option<f64>,

        /// Segment duration in seconds
        #[clap(long)]
        duration: Option<f64>,

        /// ffmpeg video encoder, e.g. libx264 or h264_nvenc
        #[clap(long)]
        encoder: Option<String>,
    },
    /// Check that every video in a directory is readable.
    Check {
        /// Directory to check, defaults to the clip directory
        dir: Option<PathBuf>,

        /// Report duration, resolution, codec and frame rate issues
        #[clap(long, short)]
        detailed: bool,

        /// File receiving the paths of invalid videos
        #[clap(long, default_value = "error_videos.txt")]
        errors: PathBuf,
    },
    /// Report the frame sizes of every video in a directory.
    Resolutions {
        /// Directory to scan, defaults to the clip directory
        dir: Option<PathBuf>,

        /// Output CSV file
        #[clap(long, short, default_value = "video_resolutions.csv")]
        output: PathBuf,
    },
    /// Download and extract the semantic mask archive into the data
    /// directory.
    Masks {
        /// Archive URL
        #[clap(long)]
        url: Option<String>,
    },
    /// Print the effective configuration as JSON.
    Config,
}

/// Renders [`Progress`] updates on a progress bar until the sender is
/// dropped. The bar is cleared when the returned task completes; await it
/// before printing a summary.
fn progress_bar(template: &str) -> (mpsc::Sender<Progress>, JoinHandle<()>) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▇▆▅▄▃▂▁  "),
    );

    let (tx, mut rx) = mpsc::channel::<Progress>(1);
    let task = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            if progress.total > 0 {
                bar.set_length(progress.total as u64);
                bar.set_position(progress.current as u64);
            }
        }
        bar.finish_and_clear();
    });
    (tx, task)
}

fn item_progress() -> (mpsc::Sender<Progress>, JoinHandle<()>) {
    progress_bar("[{elapsed_precise}] [{wide_bar:.yellow}] {pos}/{len} ({eta})")
}

async fn handle_download(
    config: &Config,
    file_list: Option<PathBuf>,
    output: Option<PathBuf>,
    base_url: Option<String>,
) -> Result<(), Error> {
    let file_list = file_list.unwrap_or_else(|| config.file_list());
    let files = read_file_list(&file_list)?;
    let output = output.unwrap_or_else(|| config.video_dir());
    let base_url = base_url.unwrap_or_else(|| config.base_url.clone());

    info!(
        "Downloading {} {} videos into {}",
        files.len(),
        config.split,
        output.display()
    );
    let downloader = Downloader::new(&base_url, config.split, output, config.http_timeout())?;
    let (progress, bar) = item_progress();
    let report = downloader.download_all(&files, Some(progress)).await;
    let _ = bar.await;
    let report = report?;

    println!(
        "Downloaded {} videos ({} bytes), {} already present, {} failed",
        report.downloaded,
        report.bytes,
        report.skipped,
        report.failed.len()
    );
    for (file_name, reason) in &report.failed {
        println!("  {}: {}", file_name, reason);
    }
    Ok(())
}

async fn handle_sample(
    config: &Config,
    annotations: Option<PathBuf>,
    video_dir: Option<PathBuf>,
    output: Option<PathBuf>,
    duration: Option<f64>,
    clustered: bool,
) -> Result<(), Error> {
    let mut clip = config.clip.clone();
    if let Some(duration) = duration {
        clip.duration = duration;
    }
    if clustered {
        clip.strategy = StrategyKind::Clustered;
    }
    let strategy = clip.strategy();
    strategy.validate()?;

    let records = read_annotations(&annotations.unwrap_or_else(|| config.annotations()))?;
    let sampler = Sampler::new(
        config.media_tool(),
        video_dir.unwrap_or_else(|| config.video_dir()),
        output.unwrap_or_else(|| config.clip_dir()),
    )
    .with_strategy(strategy)
    .with_encode(clip.encode());

    let (progress, bar) = item_progress();
    let report = sampler.run(&records, Some(progress)).await;
    let _ = bar.await;
    let report = report?;
    println!(
        "Planned {} clips: {} extracted, {} already present, {} without source video, {} failed",
        report.planned,
        report.extracted.len(),
        report.skipped,
        report.missing_source.len(),
        report.failed.len()
    );
    Ok(())
}

async fn handle_manifest(
    config: &Config,
    clip_dir: Option<PathBuf>,
    annotations: Option<PathBuf>,
    output: Option<PathBuf>,
    min_duration: Option<f64>,
    #[cfg(feature = "polars")] arrow: Option<PathBuf>,
) -> Result<(), Error> {
    let clip_dir = clip_dir.unwrap_or_else(|| config.clip_dir());
    let output = output.unwrap_or_else(|| config.manifest());
    let min_duration = min_duration.unwrap_or(config.manifest_min_duration);

    // Labels are optional unless an annotation file was named explicitly.
    let index = match annotations {
        Some(path) => AnnotationIndex::new(&read_annotations(&path)?),
        None => match read_annotations(&config.annotations()) {
            Ok(records) => AnnotationIndex::new(&records),
            Err(Error::MissingInput(path)) => {
                warn!("No annotations at {}, labels left empty", path.display());
                AnnotationIndex::default()
            }
            Err(err) => return Err(err),
        },
    };

    let (progress, bar) = item_progress();
    let report = collect_manifest(
        &config.media_tool(),
        &clip_dir,
        &index,
        min_duration,
        Some(progress),
    )
    .await;
    let _ = bar.await;
    let report = report?;
    write_manifest(&report.rows, &output)?;

    #[cfg(feature = "polars")]
    if let Some(arrow) = arrow {
        ava_prep::manifest::write_manifest_arrow(&report.rows, &arrow)?;
        println!("Arrow manifest written to {}", arrow.display());
    }

    println!(
        "Manifest {} lists {} clips, {} excluded",
        output.display(),
        report.rows.len(),
        report.excluded.len()
    );
    Ok(())
}

async fn handle_trim(
    config: &Config,
    video_dir: Option<PathBuf>,
    output: Option<PathBuf>,
    start: Option<f64>,
    duration: Option<f64>,
    encoder: Option<String>,
) -> Result<(), Error> {
    let mut trim = config.trim.clone();
    if let Some(start) = start {
        trim.start = start;
    }
    if let Some(duration) = duration {
        trim.duration = duration;
    }
    if let Some(encoder) = encoder {
        trim.encoder = encoder;
    }

    let video_dir = video_dir.unwrap_or_else(|| config.video_dir());
    let trimmer = Trimmer::new(
        config.media_tool(),
        output.unwrap_or_else(|| config.trimmed_dir()),
        trim.start,
        trim.duration,
    )
    .with_encode(trim.encode());

    let (progress, bar) = item_progress();
    let report = trimmer.run(&video_dir, Some(progress)).await;
    let _ = bar.await;
    let report = report?;
    println!(
        "Trimmed {} videos, {} already trimmed, {} failed",
        report.trimmed,
        report.skipped,
        report.failed.len()
    );
    Ok(())
}

async fn handle_check(
    config: &Config,
    dir: Option<PathBuf>,
    detailed: bool,
    errors: PathBuf,
) -> Result<(), Error> {
    let dir = dir.unwrap_or_else(|| config.clip_dir());
    let (progress, bar) = item_progress();
    let summary = check_videos(&config.media_tool(), &dir, detailed, Some(progress)).await;
    let _ = bar.await;
    let summary = summary?;
    print!("{}", summary);

    if summary.has_errors() {
        let count = summary.write_error_list(&errors)?;
        println!("{} invalid videos listed in {}", count, errors.display());
    }
    Ok(())
}

async fn handle_resolutions(
    config: &Config,
    dir: Option<PathBuf>,
    output: PathBuf,
) -> Result<(), Error> {
    let dir = dir.unwrap_or_else(|| config.clip_dir());
    let (progress, bar) = item_progress();
    let report = collect_resolutions(&config.media_tool(), &dir, Some(progress)).await;
    let _ = bar.await;
    let report = report?;
    report.write_csv(&output)?;
    print!("{}", report);
    println!("Resolutions written to {}", output.display());
    Ok(())
}

async fn handle_masks(config: &Config, url: Option<String>) -> Result<(), Error> {
    let url = url.unwrap_or_else(|| config.masks_url.clone());
    let (progress, bar) = progress_bar(
        "[{elapsed_precise}] [{wide_bar:.yellow}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    );
    let report = download_masks(&url, &config.data_dir, config.http_timeout(), Some(progress)).await;
    let _ = bar.await;
    let report = report?;
    println!(
        "Extracted {} files ({} byte archive) into {}",
        report.extracted,
        report.archive_bytes,
        config.data_dir.display()
    );
    Ok(())
}

fn handle_config(config: &Config) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(split) = args.split {
        config.split = split;
    }

    match args.cmd {
        Command::Download {
            file_list,
            output,
            base_url,
        } => handle_download(&config, file_list, output, base_url).await,
        Command::Sample {
            annotations,
            video_dir,
            output,
            duration,
            clustered,
        } => handle_sample(&config, annotations, video_dir, output, duration, clustered).await,
        #[cfg(feature = "polars")]
        Command::Manifest {
            clip_dir,
            annotations,
            output,
            min_duration,
            arrow,
        } => handle_manifest(&config, clip_dir, annotations, output, min_duration, arrow).await,
        #[cfg(not(feature = "polars"))]
        Command::Manifest {
            clip_dir,
            annotations,
            output,
            min_duration,
        } => handle_manifest(&config, clip_dir, annotations, output, min_duration).await,
        Command::Trim {
            video_dir,
            output,
            start,
            duration,
            encoder,
        } => handle_trim(&config, video_dir, output, start, duration, encoder).await,
        Command::Check {
            dir,
            detailed,
            errors,
        } => handle_check(&config, dir, detailed, errors).await,
        Command::Resolutions { dir, output } => handle_resolutions(&config, dir, output).await,
        Command::Masks { url } => handle_masks(&config, url).await,
        Command::Config => handle_config(&config),
    }
}
