#![forbid(unsafe_code)]
//! # opinion_analysis CLI
//!
//! Runs the sentiment and topic pipeline on a delimited file, or on every
//! `.csv`/`.tsv`/`.txt` file in a directory.
//!
//! ## Example
//! ```bash
//! cargo run --release -- answers.csv --column Válasz --export-format csv
//! ```
//!
//! See `--help` for all available options.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::error;
use opinion_analysis::{
    AnalysisOptions, CancelToken, ExportFormat, ModelStore, PipelineConfig, analyze_path,
    print_failed_files,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// File or directory to analyze
    path: Option<PathBuf>,

    /// Name of the free-text column (detected automatically if omitted)
    #[arg(long)]
    column: Option<String>,

    /// Directory with the provisioned model artifacts
    #[arg(long, default_value = "models")]
    models_dir: PathBuf,

    /// TOML file overriding the pipeline thresholds
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optional path to additional stopword file (.txt, one word per line)
    #[arg(long)]
    stopwords: Option<PathBuf>,

    /// Output format for export (txt, csv, tsv, json)
    #[arg(long, default_value = "txt")]
    export_format: ExportFormat,

    /// Seed for the randomized topic-modeling steps
    #[arg(long)]
    seed: Option<u64>,

    /// Minimum number of texts forming a topic
    #[arg(long)]
    min_topic_size: Option<usize>,

    /// Worker threads for per-item analysis (default: all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Only report which model artifacts are available, then exit
    #[arg(long, default_value_t = false)]
    check_models: bool,
}

fn build_config(cli: &Cli) -> Result<PipelineConfig, opinion_analysis::PipelineError> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.topics.seed = seed;
    }
    if let Some(size) = cli.min_topic_size {
        config.topics.min_topic_size = size;
    }
    config.validate()?;
    Ok(config)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let models = ModelStore::global(&cli.models_dir);
    if cli.check_models {
        let caps = models.capabilities();
        println!("models directory: {}", cli.models_dir.display());
        let status = |loaded: bool, fallback: &'static str| {
            if loaded { "loaded" } else { fallback }
        };
        println!("  linguistic: {}", status(caps.linguistic, "fallback (built-in rules)"));
        println!("  classifier: {}", status(caps.classifier, "missing (lexical only)"));
        println!("  embeddings: {}", status(caps.embedder, "fallback (feature hashing)"));
        if !caps.all_loaded() {
            process::exit(2);
        }
        return;
    }

    let Some(path) = cli.path.clone() else {
        error!("Error: no input path given");
        process::exit(1);
    };
    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("Error: {}", e);
            process::exit(1);
        }
    };
    let options = AnalysisOptions {
        export_format: cli.export_format,
        column: cli.column.clone(),
        stopwords: cli.stopwords.clone(),
        config,
        threads: cli.threads,
        output_dir: None,
    };

    match analyze_path(&path, models, &options, &CancelToken::new()) {
        Ok(run) => {
            for file in &run.reports {
                println!("{}", file.summary);
                for p in &file.exported {
                    println!("Wrote {}", p.display());
                }
            }
            if !run.failed_files.is_empty() {
                print_failed_files(&run.failed_files);
                process::exit(1);
            }
        }
        Err(e) => {
            error!("Error analyzing {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}
