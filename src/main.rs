use clap::{Args, Parser, Subcommand};
use imgpreset::config;
use imgpreset::imaging::{SaveOptions, parse_format};
use imgpreset::ingest::{StagedCopy, Upload};
use imgpreset::preset::{RawAction, dispatch};
use imgpreset::processor::{ImageProcessor, SaveRequest, SaveTarget};
use imgpreset::storage::DEFAULT_NAMESPACE;
use imgpreset::validation::DimensionRules;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "imgpreset")]
#[command(about = "On-demand image presets with a sharded file cache")]
#[command(long_about = "\
On-demand image presets with a sharded file cache

Originals are stored once under a unique name; preset variants are rendered
from them on first request and served from disk afterwards.

Storage layout:

  <image_path>/
  └── <namespace>/                 # \"cache\" unless given
      ├── orig/<shard>/<name>      # uploaded original
      ├── orig/<shard>/backup_<name>  # pre-transform copy (after-upload policy)
      └── <preset>/<shard>/<name>  # rendered variant

The shard is the first byte of md5(<name>) in hex.

Run 'imgpreset gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = "imgpreset.toml", global = true)]
    config: PathBuf,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Namespace selection shared by most commands.
#[derive(Args, Clone)]
struct NamespaceArgs {
    /// Namespace the image belongs to
    #[arg(long, short, default_value = DEFAULT_NAMESPACE)]
    namespace: String,
}

#[derive(Subcommand)]
enum Command {
    /// Store files as new originals
    Upload {
        files: Vec<PathBuf>,
        #[command(flatten)]
        ns: NamespaceArgs,
        /// Move the files instead of copying them
        #[arg(long = "move")]
        move_files: bool,
    },
    /// Print the storage path of a variant
    Path {
        filename: String,
        preset: String,
        #[command(flatten)]
        ns: NamespaceArgs,
    },
    /// Print the public URL of a variant, generating it if forced
    Url {
        filename: String,
        preset: String,
        #[command(flatten)]
        ns: NamespaceArgs,
        /// Generate the variant if missing (overrides force_process)
        #[arg(long, conflicts_with = "no_force")]
        force: bool,
        /// Never generate, even if force_process is set
        #[arg(long)]
        no_force: bool,
    },
    /// Apply a preset to any file
    Process {
        source: PathBuf,
        preset: String,
        /// Output file; without it or --save-namespace nothing is written
        #[arg(long, short, conflicts_with = "save_namespace")]
        output: Option<PathBuf>,
        /// Save to the preset's variant path in this namespace
        #[arg(long)]
        save_namespace: Option<String>,
        /// Output format (jpg, png, webp, ...); defaults to the source format
        #[arg(long)]
        format: Option<String>,
        /// Encoding quality 1-100
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: Option<u8>,
        /// Copy the source modification time onto the output
        #[arg(long)]
        touch: bool,
    },
    /// Apply an ad-hoc JSON action list, e.g. '[{"flip":{"mode":"both"}}]'
    Apply {
        source: PathBuf,
        output: PathBuf,
        #[arg(long)]
        actions: String,
    },
    /// Delete an original and its variants
    Delete {
        filename: String,
        #[command(flatten)]
        ns: NamespaceArgs,
        /// Only these presets ("orig" = original + backup); default all
        #[arg(long = "preset")]
        presets: Vec<String>,
    },
    /// Render every missing variant of a namespace
    Warm {
        #[command(flatten)]
        ns: NamespaceArgs,
        /// Only these presets; default all
        #[arg(long = "preset")]
        presets: Vec<String>,
    },
    /// Check an image against dimension limits
    Check {
        file: PathBuf,
        #[arg(long)]
        min_width: Option<u32>,
        #[arg(long)]
        min_height: Option<u32>,
        #[arg(long)]
        max_width: Option<u32>,
        #[arg(long)]
        max_height: Option<u32>,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(&cli.config)?;
    init_thread_pool(&config.processing);
    let processor = ImageProcessor::new(&config)?;

    match cli.command {
        Command::Upload {
            files,
            ns,
            move_files,
        } => {
            let uploads = files
                .into_iter()
                .map(|file| {
                    if move_files {
                        Upload::Path(file)
                    } else {
                        Upload::Staged(Box::new(StagedCopy::new(file)))
                    }
                })
                .collect();
            for record in processor.upload_many(uploads, &ns.namespace)? {
                println!("{}\t{}", record.filename, record.path.display());
            }
        }
        Command::Path {
            filename,
            preset,
            ns,
        } => {
            println!(
                "{}",
                processor
                    .image_path(&filename, &preset, &ns.namespace)
                    .display()
            );
        }
        Command::Url {
            filename,
            preset,
            ns,
            force,
            no_force,
        } => {
            let force = match (force, no_force) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            println!(
                "{}",
                processor.image_url(&filename, &preset, &ns.namespace, force)?
            );
        }
        Command::Process {
            source,
            preset,
            output,
            save_namespace,
            format,
            quality,
            touch,
        } => {
            let target = match (output, save_namespace) {
                (Some(path), _) => Some(SaveTarget::Path(path)),
                (None, Some(namespace)) => Some(SaveTarget::Namespace(namespace)),
                (None, None) => None,
            };
            let format = format.as_deref().map(parse_format).transpose()?;
            let request = target.map(|target| SaveRequest {
                target,
                format,
                quality,
                touch,
            });
            let engine = processor.process(&source, &preset, request.as_ref())?;
            let dims = engine.dimensions()?;
            println!("{} → {}x{}", source.display(), dims.width, dims.height);
        }
        Command::Apply {
            source,
            output,
            actions,
        } => {
            let actions = RawAction::list_from_json(&actions)?;
            let mut engine = processor.engine();
            engine.load(&source)?;
            dispatch(engine.as_mut(), &actions)?;
            engine.save(&output, &SaveOptions::default())?;
            let dims = engine.dimensions()?;
            println!("{} → {}x{}", output.display(), dims.width, dims.height);
        }
        Command::Delete {
            filename,
            ns,
            presets,
        } => {
            let selected: Vec<&str> = presets.iter().map(String::as_str).collect();
            let scope = (!selected.is_empty()).then_some(selected.as_slice());
            if !processor.delete(&filename, &ns.namespace, scope) {
                return Err("nothing to delete: invalid filename or namespace".into());
            }
        }
        Command::Warm { ns, presets } => {
            let stats = processor.warm(&ns.namespace, &presets)?;
            println!("Warm: {}", stats);
        }
        Command::Check {
            file,
            min_width,
            min_height,
            max_width,
            max_height,
        } => {
            let rules = DimensionRules {
                min_width,
                min_height,
                max_width,
                max_height,
            };
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match rules.check(processor.engine().as_mut(), &file, &name) {
                Some(violation) => {
                    println!("{violation}");
                    std::process::exit(1);
                }
                None => println!("==> {} is valid", file.display()),
            }
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Initialize the tracing subscriber; `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "imgpreset=debug"
    } else {
        "imgpreset=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. The user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
