use clap::{Parser, Subcommand};
use picturebook::config::{self, BookConfig, ConfigError};
use picturebook::extensions::Extensions;
use picturebook::picturebook::CancelToken;
use picturebook::{app, output};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "picturebook")]
#[command(about = "Turn a tree of images into a printable PDF picturebook")]
#[command(long_about = "\
Turn a tree of images into a printable PDF picturebook

Every image under the source folders becomes one page, fitted inside the
margins and centered. Captions sit under the image; long text gets its own
page before it.

  picturebook build --source-uri ~/photos --target-uri ~/books \\
      --caption filename:// --sort modtime:// --even-only trip/2024

Settings come from picturebook.toml (or --config), then from flags.
Strategies are chosen by URI; run 'picturebook schemes' to list them and
'picturebook gen-config' for a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file [default: ./picturebook.toml when present]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug detail for every page
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Gather, lay out and save a picturebook
    Build(BuildArgs),
    /// Print a stock picturebook.toml with all options documented
    GenConfig,
    /// List every registered extension and store scheme
    Schemes,
}

/// Flags for `build`. Anything given here overrides the config file.
#[derive(clap::Args)]
struct BuildArgs {
    /// Folders inside the source store [default: all of it]
    sources: Vec<String>,

    /// P (portrait) or L (landscape)
    #[arg(long)]
    orientation: Option<String>,
    /// a1..a7, letter, legal or tabloid
    #[arg(long)]
    size: Option<String>,
    /// Explicit page width, in --units
    #[arg(long)]
    width: Option<f64>,
    /// Explicit page height, in --units
    #[arg(long)]
    height: Option<f64>,
    /// inches, millimeters or centimeters
    #[arg(long)]
    units: Option<String>,
    #[arg(long)]
    dpi: Option<f64>,
    /// Frame around each image, in inches
    #[arg(long)]
    border: Option<f64>,
    /// Print bleed on every side, in inches
    #[arg(long)]
    bleed: Option<f64>,
    /// Uniform margin; overrides the directional margins when non-zero
    #[arg(long)]
    margin: Option<f64>,
    #[arg(long)]
    margin_top: Option<f64>,
    #[arg(long)]
    margin_bottom: Option<f64>,
    #[arg(long)]
    margin_left: Option<f64>,
    #[arg(long)]
    margin_right: Option<f64>,

    /// Rotate images a quarter turn when that fills the page better
    #[arg(long)]
    fill_page: bool,
    /// Only place pictures on even pages
    #[arg(long, conflicts_with = "odd_only")]
    even_only: bool,
    /// Only place pictures on odd pages
    #[arg(long)]
    odd_only: bool,
    /// Stop after this many pictures (0 = no limit)
    #[arg(long)]
    max_pages: Option<usize>,
    /// Fixed-pitch font for captions and text pages
    #[arg(long)]
    ocra_font: bool,
    /// Name of the document in the target store
    #[arg(long)]
    filename: Option<String>,

    /// Filter URI (repeatable, all must accept)
    #[arg(long = "filter")]
    filters: Vec<String>,
    /// Process URI (repeatable, applied in order)
    #[arg(long = "process")]
    processes: Vec<String>,
    /// Process URI applied only to rotated images (repeatable)
    #[arg(long = "rotate-process")]
    rotate_processes: Vec<String>,
    /// Caption URI (repeatable, first non-empty wins)
    #[arg(long = "caption")]
    captions: Vec<String>,
    /// Join every non-empty caption instead
    #[arg(long)]
    caption_combined: bool,
    /// Long-text URI
    #[arg(long)]
    text: Option<String>,
    /// Sorter URI
    #[arg(long)]
    sort: Option<String>,
    /// Progress monitor URI (log:// reports every placed picture)
    #[arg(long)]
    progress_monitor: Option<String>,

    /// Where pictures are read from
    #[arg(long)]
    source_uri: Option<String>,
    /// Where the document is written
    #[arg(long)]
    target_uri: Option<String>,
    /// Scratch space for intermediate images
    #[arg(long)]
    tmpfile_uri: Option<String>,
}

impl BuildArgs {
    /// Layer the flags over `config`; returns the source roots.
    fn apply(self, config: &mut BookConfig) -> Vec<String> {
        let page = &mut config.page;
        set(&mut page.orientation, self.orientation);
        set(&mut page.size, self.size);
        set(&mut page.units, self.units);
        set(&mut page.dpi, self.dpi);
        set(&mut page.border, self.border);
        set(&mut page.bleed, self.bleed);
        set(&mut page.margin, self.margin);
        set(&mut page.margin_top, self.margin_top);
        set(&mut page.margin_bottom, self.margin_bottom);
        set(&mut page.margin_left, self.margin_left);
        set(&mut page.margin_right, self.margin_right);
        if self.width.is_some() || self.height.is_some() {
            page.width = self.width;
            page.height = self.height;
        }

        let layout = &mut config.layout;
        layout.fill_page |= self.fill_page;
        layout.even_only |= self.even_only;
        layout.odd_only |= self.odd_only;
        layout.ocra_font |= self.ocra_font;
        set(&mut layout.max_pages, self.max_pages);

        let ext = &mut config.extensions;
        replace(&mut ext.filter, self.filters);
        replace(&mut ext.process, self.processes);
        replace(&mut ext.rotate_process, self.rotate_processes);
        replace(&mut ext.caption, self.captions);
        ext.caption_combined |= self.caption_combined;
        if self.text.is_some() {
            ext.text = self.text;
        }
        if self.sort.is_some() {
            ext.sort = self.sort;
        }
        set(&mut ext.progress_monitor, self.progress_monitor);

        let storage = &mut config.storage;
        set(&mut storage.source, self.source_uri);
        set(&mut storage.target, self.target_uri);
        set(&mut storage.temporary, self.tmpfile_uri);
        set(&mut storage.filename, self.filename);

        self.sources
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn replace(slot: &mut Vec<String>, values: Vec<String>) {
    if !values.is_empty() {
        *slot = values;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Build(args) => {
            let mut config = load_book_config(cli.config.as_deref())?;
            let roots = args.apply(&mut config);
            init_thread_pool(&config.processing);

            let ext = Extensions::with_defaults()?;
            println!("==> Building {}", config.storage.filename);
            let summary = app::run(&config, &ext, &roots, &CancelToken::new())?;
            output::print_run_summary(&summary);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Schemes => {
            let ext = Extensions::with_defaults()?;
            output::print_schemes(&ext.catalogue());
        }
    }

    Ok(())
}

/// Diagnostics go to stderr. `RUST_LOG` wins unless `--verbose` is given.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("picturebook=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// An explicit `--config` must exist; the default file is optional.
fn load_book_config(explicit: Option<&Path>) -> Result<BookConfig, ConfigError> {
    match explicit {
        Some(path) if !path.exists() => Err(ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("config file {} not found", path.display()),
        ))),
        Some(path) => config::load_config(path),
        None => config::load_config(Path::new(config::CONFIG_FILE)),
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
