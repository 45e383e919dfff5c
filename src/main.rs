use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use status_shot::config::AppConfig;
use status_shot::export::{CardRenderer, DirectorySink, ExportOrchestrator, FontBook};
use status_shot::import;
use status_shot::logging;
use status_shot::media::compress;
use status_shot::media::frame::FfmpegFrameExtractor;
use status_shot::media::ingest::{MediaIngestor, SelectedFile};
use status_shot::state::kv::SqliteStore;
use status_shot::state::library::PhotoLibrary;
use status_shot::state::render::{FontChoice, RenderState, ViewCount};
use status_shot::state::selection::SelectionSet;
use status_shot::Error;

#[derive(Parser)]
#[command(name = "status-shot", version, about = "Compose chat status screenshots and batch-export them over a library of profile photos")]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the saved profile photo library
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
    /// Render the status card to PNG, once per selected library photo
    Export(ExportArgs),
}

#[derive(Subcommand)]
enum LibraryAction {
    /// List saved photos
    List,
    /// Compress images (files or folders) and append them to the library
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Delete the photo at INDEX; later photos move down by one
    Delete { index: usize },
}

#[derive(clap::Args)]
struct ExportArgs {
    /// Status image or video
    #[arg(long)]
    status: Option<PathBuf>,

    /// Live profile picture, used when no library photos are selected
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Caption under the status
    #[arg(long, default_value = "")]
    caption: String,

    /// Hour shown next to "My status" (required)
    #[arg(long, default_value = "")]
    hour: String,

    /// View count, or "random" for 52-70 per screenshot
    #[arg(long, default_value = "")]
    views: String,

    /// Caption font, e.g. "Georgia" or "Georgia|italic"
    #[arg(long, default_value = "Arial")]
    font: String,

    /// Library indices to export, in order (e.g. 2,0,5)
    #[arg(long, value_delimiter = ',')]
    select: Vec<usize>,

    /// Output directory (default from config)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

type Library = PhotoLibrary<SqliteStore>;

fn open_library(config: &AppConfig) -> anyhow::Result<Library> {
    let db_path = config.library.resolved_db_path()?;
    let store = SqliteStore::open(&db_path, config.library.quota_bytes)
        .with_context(|| format!("failed to open library at {}", db_path.display()))?;
    Ok(PhotoLibrary::new(store, config.library.key_prefix.clone()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default()?,
    };
    logging::init_logging(&config.logging);

    match cli.command {
        Command::Library { action } => run_library(&config, action).await,
        Command::Export(args) => run_export(&config, args).await,
    }
}

async fn run_library(config: &AppConfig, action: LibraryAction) -> anyhow::Result<()> {
    let mut library = open_library(config)?;

    match action {
        LibraryAction::List => {
            let photos = library.load_all()?;
            if photos.is_empty() {
                println!("No images saved yet.");
            }
            for (index, photo) in photos.iter().enumerate() {
                println!("{:>3}  {:>7.1} KB", index, photo.len() as f64 / 1024.0);
            }
        }
        LibraryAction::Add { paths } => {
            let files = import::collect_image_paths(&paths);
            let result = import::compress_files(files, config.compression).await?;
            let added = result.photos.len();

            match library.append_batch(result.photos) {
                Ok(all) => println!(
                    "✅ Added {} image(s), skipped {}. Library holds {}.",
                    added,
                    result.skipped.len(),
                    all.len()
                ),
                Err(e @ Error::StorageQuotaExceeded { .. }) => {
                    anyhow::bail!("library is full, nothing was added: {}", e)
                }
                Err(e) => return Err(e.into()),
            }
        }
        LibraryAction::Delete { index } => {
            let remaining = library.delete_at(index)?;
            println!("🗑️  Deleted image {}. Library holds {}.", index, remaining.len());
        }
    }

    Ok(())
}

fn missing_hour() -> anyhow::Error {
    anyhow::anyhow!("please enter an hour (--hour) before exporting")
}

async fn run_export(config: &AppConfig, args: ExportArgs) -> anyhow::Result<()> {
    // Validate before any side effect
    if args.hour.trim().is_empty() {
        return Err(missing_hour());
    }

    let library = open_library(config)?;
    let mut rng = rand::thread_rng();

    let mut ingestor = MediaIngestor::new(FfmpegFrameExtractor::from_config(&config.media));
    ingestor.ingest(args.status.map(SelectedFile::new)).await?;

    let mut state = RenderState::new_session(&mut rng);
    state.status_image = ingestor.current().map(|asset| asset.display_source.clone());
    state.caption = args.caption;
    state.hour = args.hour;
    state.views = ViewCount::parse(&args.views);
    state.font = FontChoice::parse(&args.font);

    if let Some(path) = &args.profile {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        state.profile_image = Some(compress::compress(bytes, config.compression).await?.photo);
    }

    let out_dir = args.out.unwrap_or_else(|| config.export.output_dir.clone());
    let mut exporter = ExportOrchestrator::from_config(
        CardRenderer::with_fonts(FontBook::from_config(&config.export)),
        DirectorySink::new(out_dir),
        &config.export,
    );
    let selection = SelectionSet::from_indices(args.select);

    match exporter.run_export(&mut state, &selection, &library, &mut rng).await {
        Ok(shots) => {
            for shot in &shots {
                println!("📸 {}", shot.path.display());
            }
            Ok(())
        }
        Err(Error::MissingHour) => Err(missing_hour()),
        Err(Error::ExportAborted { job, total, saved, source }) => {
            for path in &saved {
                println!("📸 {}", path.display());
            }
            anyhow::bail!(
                "failed to generate screenshot {} of {}: {} ({} already saved)",
                job,
                total,
                source,
                saved.len()
            )
        }
        Err(e) => Err(e.into()),
    }
}
