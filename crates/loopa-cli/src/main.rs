use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use loopa_core::export::encoder::VideoFormat;
use loopa_core::export::lottie::{export_lottie, LottieExportOptions};
use loopa_core::export::svg::{export_svg, SvgExportOptions};
use loopa_core::export::video::{RenderStrategy, Resolution, VideoExportOptions, VideoExporter};
use loopa_core::Scene;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the scene document (JSON)
    #[arg(value_name = "SCENE")]
    scene: PathBuf,

    /// Output path; defaults to the scene path with the format's extension
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Export format
    #[arg(short, long, value_enum, default_value_t = Format::Lottie)]
    format: Format,

    /// Play once instead of looping
    #[arg(long)]
    no_loop: bool,

    /// SVG: write a static snapshot of frame 0
    #[arg(long)]
    still: bool,

    /// Lottie: indent the JSON output
    #[arg(long)]
    pretty: bool,

    /// Sample bounce, elastic, spring and stepped easing per frame
    #[arg(long)]
    bake_easing: bool,

    /// Video: render at twice the scene size
    #[arg(long)]
    hires: bool,

    /// Video: leave the background transparent
    #[arg(long)]
    transparent: bool,

    /// Video: target bitrate in bits per second
    #[arg(long, default_value_t = 8_000_000)]
    bitrate: u64,

    /// Video: rasterize with tiny-skia directly instead of through SVG
    #[arg(long)]
    direct: bool,

    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Format {
    Lottie,
    Svg,
    Mp4,
    Webm,
    Gif,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Lottie => "json",
            Format::Svg => "svg",
            Format::Mp4 => "mp4",
            Format::Webm => "webm",
            Format::Gif => "gif",
        }
    }

    fn video(self) -> Option<VideoFormat> {
        match self {
            Format::Mp4 => Some(VideoFormat::Mp4),
            Format::Webm => Some(VideoFormat::Webm),
            Format::Gif => Some(VideoFormat::Gif),
            Format::Lottie | Format::Svg => None,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum LogFormat {
    Pretty,
    Json,
}

fn init_logging(level: LogLevel, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.to_string().parse()?)
        .from_env_lossy();

    let subscriber_builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => subscriber_builder.json().init(),
        LogFormat::Pretty => subscriber_builder.pretty().init(),
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_level, cli.log_format) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(2);
    }
    if let Err(e) = run(&cli) {
        error!("Export failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.scene.with_extension(cli.format.extension()));
    info!("Scene: {:?}", cli.scene);
    info!("Output: {:?}", output);

    let scene = load_scene(&cli.scene)?;
    let (bytes, warnings) = match cli.format.video() {
        None if cli.format == Format::Svg => {
            let options = if cli.still {
                SvgExportOptions::still()
            } else {
                SvgExportOptions::default()
            };
            let exported = export_svg(
                &scene,
                &options.with_looping(!cli.no_loop).with_baked_easing(cli.bake_easing),
            )?;
            (exported.artifact.into_bytes(), exported.warnings)
        }
        None => {
            let options = LottieExportOptions {
                looping: !cli.no_loop,
                name: (!scene.name.is_empty()).then(|| scene.name.clone()),
                ..LottieExportOptions::default()
            }
            .with_pretty_print(cli.pretty)
            .with_baked_easing(cli.bake_easing);
            let exported = export_lottie(&scene, &options)?;
            (exported.artifact.into_bytes(), exported.warnings)
        }
        Some(format) => {
            let options = VideoExportOptions::new(format)
                .with_resolution(if cli.hires { Resolution::X2 } else { Resolution::X1 })
                .with_strategy(if cli.direct { RenderStrategy::Direct } else { RenderStrategy::Markup })
                .with_bitrate(cli.bitrate)
                .with_transparent_background(cli.transparent)
                .with_looping(!cli.no_loop);
            let mut last_decile = None;
            let exported = VideoExporter::new(options)
                .on_progress(|p| {
                    let decile = (p.fraction * 10.0).floor() as u32;
                    if last_decile != Some(decile) {
                        last_decile = Some(decile);
                        info!("Rendered frame {}/{} ({:.0}%)", p.frame, p.total_frames, p.fraction * 100.0);
                    }
                })
                .export(&scene)?;
            info!("Encoded {} frames as {}", exported.artifact.frame_count, exported.artifact.mime_type);
            (exported.artifact.bytes, exported.warnings)
        }
    };

    fs::write(&output, &bytes).with_context(|| format!("writing {}", output.display()))?;
    info!("Wrote {} bytes with {} warning(s).", bytes.len(), warnings.len());
    Ok(())
}

fn load_scene(path: &Path) -> Result<Scene> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing scene document {}", path.display()))
}
