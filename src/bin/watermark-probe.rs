use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use watermark_probe::{
    default_output_path, Anchor, EngineConfig, FontSize, FontSource, ImageWatermark, Layout,
    MatchOptions, Metric, TextWatermark, WatermarkEngine,
};

#[derive(Parser)]
#[command(
    name = "watermark-probe",
    about = "Embed visible text or image watermarks and detect them with multi-scale template matching",
    version,
    after_help = "Output defaults to wm_<name> next to the input. The output format follows its extension."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TrueType font for text watermarks (default: built-in bitmap font)
    #[arg(long, global = true)]
    font: Option<PathBuf>,

    /// JPEG output quality
    #[arg(long, global = true, default_value_t = 95, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Draw a text watermark onto an image
    Text {
        /// Input image file
        input: PathBuf,

        /// Output file (default: wm_{name})
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Watermark text
        #[arg(short, long, default_value = "SAMPLE")]
        text: String,

        /// Font size in pixels (default: 5% of the shorter side, at least 12)
        #[arg(long)]
        font_size: Option<u32>,

        #[command(flatten)]
        placement: PlacementArgs,
    },
    /// Composite a watermark image onto an image
    Image {
        /// Input image file
        input: PathBuf,

        /// Watermark image file (transparency is honored)
        watermark: PathBuf,

        /// Output file (default: wm_{name})
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Watermark width relative to the shorter side of the input (0.0-1.0]
        #[arg(short, long, default_value_t = 0.18)]
        scale: f32,

        #[command(flatten)]
        placement: PlacementArgs,
    },
    /// Locate a template inside an image and print the result as JSON
    Detect {
        /// Image to search
        target: PathBuf,

        /// Template to look for
        template: PathBuf,

        /// Comma-separated template scales (default: 0.6,0.8,1.0,1.2,1.4)
        #[arg(long, value_delimiter = ',')]
        scales: Vec<f64>,

        /// Minimum score for a good match
        #[arg(long, default_value_t = 0.7)]
        threshold: f64,

        /// Similarity metric: ccoeff_normed, ccorr_normed or sqdiff_normed
        #[arg(long, default_value = "ccoeff_normed")]
        metric: Metric,

        /// Evaluate scales one at a time
        #[arg(long)]
        sequential: bool,
    },
}

#[derive(Args)]
struct PlacementArgs {
    /// Opacity (0.0-1.0)
    #[arg(long, default_value_t = 0.25)]
    opacity: f32,

    /// Anchor: bottom_right, bottom_left, top_left, top_right or center
    #[arg(short, long, default_value = "bottom_right")]
    anchor: Anchor,

    /// Repeat the watermark across the whole image (anchor is ignored)
    #[arg(long)]
    tile: bool,

    /// Margin from the edges and between tiles, in pixels
    #[arg(short, long, default_value_t = 20)]
    margin: u32,
}

impl PlacementArgs {
    fn layout(&self) -> Layout {
        if self.tile {
            Layout::Tiled
        } else {
            Layout::Anchored(self.anchor)
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn output_or_default(output: Option<PathBuf>, input: &Path) -> PathBuf {
    output.unwrap_or_else(|| default_output_path(input))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let font = match &cli.font {
        Some(path) => match FontSource::from_file(path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Fatal: Failed to load font {}: {e}", path.display());
                process::exit(1);
            }
        },
        None => FontSource::Builtin,
    };
    let engine = WatermarkEngine::new(EngineConfig {
        font,
        jpeg_quality: cli.jpeg_quality,
    });

    let outcome = match cli.command {
        Command::Text {
            input,
            output,
            text,
            font_size,
            placement,
        } => {
            let output = output_or_default(output, &input);
            let wm = TextWatermark {
                text,
                opacity: placement.opacity,
                font_size: FontSize::from(font_size),
                layout: placement.layout(),
                margin: placement.margin,
            };
            engine
                .embed_text_watermark(&input, &output, &wm)
                .map(|path| report_written(&path, cli.quiet))
        }
        Command::Image {
            input,
            watermark,
            output,
            scale,
            placement,
        } => {
            let output = output_or_default(output, &input);
            let wm = ImageWatermark {
                scale,
                opacity: placement.opacity,
                layout: placement.layout(),
                margin: placement.margin,
            };
            engine
                .embed_image_watermark(&input, &watermark, &output, &wm)
                .map(|path| report_written(&path, cli.quiet))
        }
        Command::Detect {
            target,
            template,
            scales,
            threshold,
            metric,
            sequential,
        } => {
            let mut opts = MatchOptions {
                threshold,
                metric,
                parallel: !sequential,
                ..MatchOptions::default()
            };
            if !scales.is_empty() {
                opts.scales = scales;
            }
            engine
                .detect(&target, &template, &opts)
                .map(|result| match serde_json::to_string_pretty(&result) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("Error: Failed to serialize result: {e}");
                        process::exit(1);
                    }
                })
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn report_written(path: &Path, quiet: bool) {
    if !quiet {
        eprintln!("[OK] {}", path.display());
    }
}
