use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use dicomflow::config::{config_from_env, load_config, Config};
use dicomflow::dicom::Dcm2Niix;
use dicomflow::discovery::{discover_studies, FolderResolver, RecursiveLister, StudyDescriptor};
use dicomflow::error::DicomflowError;
use dicomflow::logging::init_logging;
use dicomflow::pipeline::{BatchPipeline, PipelineConfig};
use dicomflow::remote::{FileMetadata, FsStore, RateLimitedStore};
use dicomflow::worker::Task;

type Store = RateLimitedStore<FsStore>;

#[derive(Parser, Debug)]
#[command(name = "dicomflow", version, about = "Batch DICOM to NIfTI conversion pipeline")]
struct Cli {
    /// Path to a JSON config file. Defaults plus environment overrides when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List input files under the source folder
    List {
        #[arg(long, default_value_t = 10)]
        max_files: usize,
        /// Only list files directly inside the source folder
        #[arg(long)]
        no_recursive: bool,
    },
    /// List studies under the source folder
    ListStudies {
        #[arg(long, default_value_t = 10)]
        max_studies: usize,
    },
    /// Download, convert and upload individual files
    Process {
        #[arg(long, default_value_t = 10)]
        max_files: usize,
    },
    /// Download, convert and upload whole studies
    ProcessStudies {
        #[arg(long, default_value_t = 10)]
        max_studies: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path),
        None => config_from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::from(2);
        }
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    if let Err(e) = init_logging(&level, cli.json_logs || config.logging.json) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!("dicomflow v{}", env!("CARGO_PKG_VERSION"));
    let store = build_store(&config);

    let outcome = match cli.command {
        Command::List {
            max_files,
            no_recursive,
        } => list_files(&store, &config, max_files, !no_recursive),
        Command::ListStudies { max_studies } => list_studies(&store, &config, max_studies),
        Command::Process { max_files } => process_files(store, &config, max_files),
        Command::ProcessStudies { max_studies } => process_studies(store, &config, max_studies),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn build_store(config: &Config) -> Store {
    let fs = FsStore::new(&config.store_root).with_page_size(config.page_size);
    RateLimitedStore::new(fs, Arc::new(config.rate_limiter()))
}

fn resolve(store: &Store, path: &str) -> Result<String, DicomflowError> {
    let id = FolderResolver::new(store).resolve_path(path)?;
    info!(path, folder_id = %id, "Resolved folder");
    Ok(id)
}

fn find_files(
    store: &Store,
    config: &Config,
    max_files: usize,
    recursive: bool,
) -> Result<Vec<FileMetadata>, DicomflowError> {
    let folder_id = resolve(store, &config.source_folder)?;
    let lister = RecursiveLister::new(store);
    let files = if recursive {
        lister.list_recursive(&folder_id, max_files)
    } else {
        lister.list_nonrecursive(&folder_id, max_files)?
    };
    Ok(files)
}

fn find_studies(
    store: &Store,
    config: &Config,
    max_studies: usize,
) -> Result<Vec<StudyDescriptor>, DicomflowError> {
    let folder_id = resolve(store, &config.source_folder)?;
    Ok(discover_studies(store, &folder_id, max_studies)?)
}

fn list_files(
    store: &Store,
    config: &Config,
    max_files: usize,
    recursive: bool,
) -> Result<(), DicomflowError> {
    let files = find_files(store, config, max_files, recursive)?;
    println!("Found {} files:", files.len());
    for (i, file) in files.iter().enumerate() {
        println!("  {}. {} ({:.1} MB)", i + 1, file.name, file.size_mb());
    }
    Ok(())
}

fn list_studies(store: &Store, config: &Config, max_studies: usize) -> Result<(), DicomflowError> {
    let studies = find_studies(store, config, max_studies)?;
    println!("Found {} studies:", studies.len());
    for (i, study) in studies.iter().enumerate() {
        println!("  {}. {} (study {})", i + 1, study.name, study.study_number);
    }
    Ok(())
}

fn process_files(store: Store, config: &Config, max_files: usize) -> Result<(), DicomflowError> {
    let files = find_files(&store, config, max_files, true)?;
    if files.is_empty() {
        warn!("No files found under '{}'", config.source_folder);
        return Ok(());
    }

    let tasks = files
        .iter()
        .enumerate()
        .map(|(i, file)| Task::from_file(file, i))
        .collect();
    run_batch(store, config, tasks)
}

fn process_studies(
    store: Store,
    config: &Config,
    max_studies: usize,
) -> Result<(), DicomflowError> {
    let studies = find_studies(&store, config, max_studies)?;
    if studies.is_empty() {
        warn!("No studies found under '{}'", config.source_folder);
        return Ok(());
    }

    let tasks = studies
        .into_iter()
        .enumerate()
        .map(|(i, study)| Task::from_study(study, i))
        .collect();
    run_batch(store, config, tasks)
}

fn run_batch(store: Store, config: &Config, tasks: Vec<Task>) -> Result<(), DicomflowError> {
    let output_folder_id = resolve(&store, &config.output_folder)?;

    let converter = Dcm2Niix::new(config.converter.clone());
    converter.verify_installation()?;

    let mut pipeline = BatchPipeline::new(
        store,
        converter,
        PipelineConfig::from_config(config),
        output_folder_id,
    );
    let results = pipeline.process_batch(tasks);

    println!("{}", pipeline.stats().summary());
    info!("Processing finished: {} completed", results.len());
    Ok(())
}
