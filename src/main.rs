use clap::{Parser, Subcommand};
use image_optim_cache::cache::{CacheStorage, FileStorage};
use image_optim_cache::config::{self, OptimConfig};
use image_optim_cache::process::{self, ProcessEvent, RunOptions};
use image_optim_cache::{logging, optimizer, output};
use std::path::{Path, PathBuf};

/// Flags for commands that run the optimizer.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Ignore the cache: optimize every image, then record them all
    #[arg(long)]
    no_cache: bool,
}

#[derive(Parser)]
#[command(name = "image-optim-cache")]
#[command(about = "Incremental image optimizer backed by a modification-time cache")]
#[command(long_about = "\
Incremental image optimizer backed by a modification-time cache

Every image under the root is optimized once. Its fingerprint is stored in
a JSON cache document; later runs skip files whose fingerprint still matches
and only optimize what is new or changed.

Layout:

  images/
  ├── optim.toml                   # Optional config (see gen-config)
  ├── image_optim_cache.json       # Cache document, written by optimize
  ├── logo.png                     # Cache key \"logo.png\"
  └── posts/2024/hero.jpg          # Cache key \"posts/2024/hero.jpg\"

Files that fail to optimize are reported, left out of the cache, and
retried next run. optimize exits with status 1 if any file failed.

Run 'image-optim-cache gen-config' to print a documented optim.toml.")]
#[command(version)]
struct Cli {
    /// Image root directory
    #[arg(long, default_value = "images", global = true)]
    root: PathBuf,

    /// Cache document path [default: <root>/<cache.file from optim.toml>]
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// More diagnostics on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report failures and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize new and changed images, then update the cache
    Optimize(CacheArgs),
    /// List images that would be optimized, without touching anything
    Check,
    /// Print a stock optim.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Optimize(cache_args) => {
            let config = config::load_config(&cli.root)?;
            let storage = storage_for(cli.cache.as_deref(), &cli.root, &config);
            let optimizer = optimizer::from_config(&config.optimizer);
            let options = RunOptions {
                use_cache: !cache_args.no_cache,
                ..RunOptions::from_config(&config)
            };

            let quiet = cli.quiet;
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    if quiet && !matches!(event, ProcessEvent::FileFailed { .. }) {
                        continue;
                    }
                    for line in output::format_process_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result =
                process::run(&cli.root, &storage, optimizer.as_ref(), &options, Some(tx));
            printer
                .join()
                .map_err(|_| "progress printer thread panicked")?;

            let report = result?;
            if !quiet {
                output::print_run_summary(&report);
            }
            if report.has_failures() {
                std::process::exit(1);
            }
        }
        Command::Check => {
            let config = config::load_config(&cli.root)?;
            let storage = storage_for(cli.cache.as_deref(), &cli.root, &config);
            let store = storage.load()?;
            let options = RunOptions::from_config(&config);
            let planned = process::plan(&cli.root, &store, &options, storage.location())?;
            output::print_plan(&planned, &cli.root);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// The cache document named on the command line, or the configured one
/// inside the root.
fn storage_for(cli_cache: Option<&Path>, root: &Path, config: &OptimConfig) -> FileStorage {
    match cli_cache {
        Some(path) => FileStorage::new(path),
        None => FileStorage::new(root.join(&config.cache.file)),
    }
}
