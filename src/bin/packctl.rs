use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use transform_pack::archive::{ArchiveBuilder, ARCHIVE_FILE_NAME};
use transform_pack::job::{ChannelSink, Outcome};
use transform_pack::utils::image_io::read_reference_image;
use transform_pack::{
    logging, AppError, Config, GeminiClient, GeneratedImage, PromptCatalog, TransformationJob,
};

const EXIT_EMPTY: u8 = 1;
const EXIT_FAILURE: u8 = 2;
const EXIT_CREDENTIAL: u8 = 3;
const EXIT_ARCHIVE: u8 = 4;

#[derive(Parser, Debug)]
#[command(name = "packctl", about = "CLI for generating transformation packs", version)]
struct Cli {
    /// Override GEMINI_API_URL
    #[arg(global = true, long)]
    gemini_url: Option<String>,

    /// Prompt catalog JSON (overrides CATALOG_PATH)
    #[arg(global = true, long, value_name = "PATH")]
    catalog: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the prompts a job will run
    Catalog {
        /// Output raw JSON instead of pretty lines
        #[arg(long)]
        json: bool,
    },
    /// Run a job against one or more reference images
    Generate {
        /// Reference image (repeatable)
        #[arg(long = "image", value_name = "PATH", required = true)]
        images: Vec<PathBuf>,
        /// API key (falls back to GEMINI_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
        /// Archive output path
        #[arg(long, value_name = "PATH", default_value = ARCHIVE_FILE_NAME)]
        out: PathBuf,
        /// Also save the raw results as JSON, for rebuilding the archive later
        #[arg(long, value_name = "PATH")]
        results: Option<PathBuf>,
    },
    /// Rebuild an archive from saved results without generating again
    Archive {
        /// Results JSON written by `generate --results`
        #[arg(long, value_name = "PATH")]
        results: PathBuf,
        /// Archive output path
        #[arg(long, value_name = "PATH", default_value = ARCHIVE_FILE_NAME)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load env and parse CLI
    Config::dotenv_load();
    logging::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            match e {
                AppError::Credential(_) => {
                    eprintln!("Your API key was rejected.");
                    eprintln!("Supply a valid key with --api-key or GEMINI_API_KEY.");
                    ExitCode::from(EXIT_CREDENTIAL)
                }
                AppError::Output(_) => {
                    eprintln!("The archive could not be written.");
                    eprintln!("Rerun `packctl archive` with saved results.");
                    ExitCode::from(EXIT_ARCHIVE)
                }
                _ => ExitCode::from(EXIT_FAILURE),
            }
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, AppError> {
    let mut conf = Config::new()?;
    if let Some(url) = cli.gemini_url {
        conf.gemini_api_url = url;
    }
    if let Some(path) = cli.catalog {
        conf.catalog_path = Some(path);
    }

    match cli.command {
        Commands::Catalog { json } => {
            let catalog = PromptCatalog::load(conf.catalog_path.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(catalog.prompts())?);
            } else {
                for (category, count) in catalog.count_by_category() {
                    println!("{} ({} prompts)", category.label(), count);
                }
                for (i, prompt) in catalog.prompts().iter().enumerate() {
                    println!("{:>2}. [{}] {}", i + 1, prompt.category, prompt.text);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Generate { images, api_key, out, results } => {
            let api_key = api_key
                .or_else(|| conf.gemini_api_key.clone())
                .unwrap_or_default();
            let catalog = Arc::new(PromptCatalog::load(conf.catalog_path.as_deref()).await?);

            let mut references = Vec::with_capacity(images.len());
            for path in &images {
                references.push(read_reference_image(path).await?);
            }

            let http = GeminiClient::http_client(&conf)?;
            let backend = Arc::new(GeminiClient::from_config(http, &conf, api_key));
            let job = TransformationJob::from_config(catalog, backend, &conf)?;

            // Progress is printed by a separate task while the job runs
            let (sink, mut events) = ChannelSink::new();
            let printer = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    eprintln!("{}", event);
                }
            });
            let report = job.run_report(&references, &sink).await;
            drop(sink);
            if let Err(e) = printer.await {
                tracing::warn!("Progress printer stopped early: {}", e);
            }
            let report = report?;

            if report.outcome() == Outcome::Empty {
                eprintln!(
                    "No images could be generated. Try again, perhaps with another reference image."
                );
                return Ok(ExitCode::from(EXIT_EMPTY));
            }
            if let Some(path) = results {
                tokio::fs::write(&path, serde_json::to_vec_pretty(&report.images)?).await?;
                println!("Saved results to {}", path.display());
            }
            write_archive(&report.images, &out).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Archive { results, out } => {
            let raw = tokio::fs::read(&results).await?;
            let images: Vec<GeneratedImage> = serde_json::from_slice(&raw)?;
            write_archive(&images, &out).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn write_archive(images: &[GeneratedImage], out: &Path) -> Result<(), AppError> {
    let bytes = ArchiveBuilder::new().build(images)?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(out, &bytes).await?;
    println!("Saved {} ({} images, {} bytes)", out.display(), images.len(), bytes.len());
    Ok(())
}
