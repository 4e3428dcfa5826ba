use clap::{Parser, Subcommand};
use std::path::PathBuf;
use subject_crop::crop::{AspectRatio, ClampPolicy};
use subject_crop::select::SelectionPolicy;
use subject_crop::{config, logging, output, process, scan};

/// Flags for the `process` command. Every crop flag is optional; when absent
/// the config file (or preset, or stock default) decides.
#[derive(clap::Args, Clone)]
struct ProcessArgs {
    /// Detections manifest written by the detector
    #[arg(long, short)]
    detections: PathBuf,

    /// Config file (default: ./subject-crop.toml if present)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Crop aspect ratio as W:H (4:5, 9:16) or a decimal (0.5625)
    #[arg(long, short)]
    aspect_ratio: Option<AspectRatio>,

    /// Padding around the subject as a fraction of its size (0-1)
    #[arg(long, short)]
    padding: Option<f64>,

    /// Subject selection: highest_confidence, largest, centered
    #[arg(long, short)]
    strategy: Option<SelectionPolicy>,

    /// When the crop must shrink: contain_subject or fit
    #[arg(long)]
    clamp: Option<ClampPolicy>,

    /// Shoot-type preset (see `subject-crop presets`)
    #[arg(long)]
    preset: Option<String>,

    /// Ignore detections below this confidence (0-1)
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Write sidecars to this directory instead of next to the images
    #[arg(long, short)]
    output_dir: Option<PathBuf>,

    /// Do not keep a .xmp.bak copy of sidecars that get replaced
    #[arg(long)]
    no_backup: bool,

    /// Write a centered crop for images without a usable detection
    #[arg(long)]
    center_fallback: bool,

    /// Compute crops but write nothing
    #[arg(long, short = 'n')]
    dry_run: bool,
}

#[derive(Parser)]
#[command(name = "subject-crop")]
#[command(about = "Subject-aware crops for landscape photos, written as XMP sidecars")]
#[command(long_about = "\
Subject-aware crops for landscape photos, written as XMP sidecars

A person detector writes a detections manifest; subject-crop picks the
subject in each image, computes an aspect-correct crop around it, and merges
the crop into the image's XMP sidecar. Lightroom and Camera Raw apply it
non-destructively. Nothing else in an existing sidecar is touched.

  shoot/
  ├── detections.json        # from the detector
  ├── IMG_0001.CR3
  ├── IMG_0001.CR3.xmp       # crop merged in
  └── IMG_0001.CR3.xmp.bak   # previous sidecar

Settings resolve as: flags → subject-crop.toml → preset → stock defaults.

Run 'subject-crop gen-config' to generate a documented subject-crop.toml.")]
#[command(version)]
struct Cli {
    /// Log crop decisions to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crop every image in a detections manifest and write sidecars
    Process(ProcessArgs),
    /// Print the crop stored in each image's sidecar
    Show {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Find images under a directory and report their stored crops
    Scan {
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List shoot-type presets and selection strategies
    Presets,
    /// Print a stock subject-crop.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Process(args) => {
            let cfg = config::load_config(args.config.as_deref(), cli_overrides(&args))?;
            let settings = process::ProcessSettings::from_config(&cfg, args.dry_run)?;
            init_thread_pool(&cfg.processing);

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_process_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = process::process_file(&args.detections, &settings, Some(tx));
            printer.join().unwrap();
            let report = result?;
            output::print_process_summary(&report);

            if report.counts.failed > 0 {
                let counts = &report.counts;
                return Err(format!("{} of {} images failed", counts.failed, counts.total()).into());
            }
        }
        Command::Show { images } => {
            let inspected: Vec<_> = images.iter().map(|p| scan::inspect(p)).collect();
            output::print_show_output(&inspected);
        }
        Command::Scan { dir, json } => {
            let images = scan::scan(&dir)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&images)?);
            } else {
                output::print_scan_output(&images, &dir);
            }
        }
        Command::Presets => {
            output::print_presets();
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Command-line values as a sparse config layer, merged over the file.
fn cli_overrides(args: &ProcessArgs) -> Option<toml::Value> {
    use toml::Value;

    let mut root = toml::map::Map::new();
    let mut crop = toml::map::Map::new();
    let mut sidecar = toml::map::Map::new();

    if let Some(preset) = &args.preset {
        root.insert("preset".into(), Value::String(preset.clone()));
    }
    if let Some(aspect) = args.aspect_ratio {
        crop.insert(
            "aspect_ratio".into(),
            config::AspectSetting::from(aspect).to_toml(),
        );
    }
    if let Some(padding) = args.padding {
        crop.insert("padding".into(), Value::Float(padding));
    }
    if let Some(strategy) = args.strategy {
        crop.insert("strategy".into(), Value::String(strategy.as_str().into()));
    }
    if let Some(clamp) = args.clamp {
        crop.insert("clamp".into(), Value::String(clamp.as_str().into()));
    }
    if args.center_fallback {
        crop.insert("center_fallback".into(), Value::Boolean(true));
    }
    if let Some(min_confidence) = args.min_confidence {
        let mut detection = toml::map::Map::new();
        detection.insert("min_confidence".into(), Value::Float(min_confidence));
        root.insert("detection".into(), Value::Table(detection));
    }
    if let Some(dir) = &args.output_dir {
        sidecar.insert(
            "output_dir".into(),
            Value::String(dir.to_string_lossy().into_owned()),
        );
    }
    if args.no_backup {
        sidecar.insert("backup".into(), Value::Boolean(false));
    }

    if !crop.is_empty() {
        root.insert("crop".into(), Value::Table(crop));
    }
    if !sidecar.is_empty() {
        root.insert("sidecar".into(), Value::Table(sidecar));
    }
    (!root.is_empty()).then_some(Value::Table(root))
}

/// Initialize the rayon thread pool based on processing config.
///
/// Never more threads than CPU cores; the config can only lower the count.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
