use anyhow::Result;
use chrono::{Datelike, Utc};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use vaersclean::{discover::MIN_YEAR, pipeline, pivot::OverflowPolicy, PipelineConfig};

/// Consolidate yearly VAERS extract triples into one analysis-ready corpus.
#[derive(Parser, Debug)]
#[command(name = "vaersclean", version, about)]
struct Cli {
    /// Directory holding the extracted yearly VAERS csv files
    #[arg(long, value_name = "DIR")]
    data_dir: PathBuf,

    /// Directory for the scrubbed per-file copies
    #[arg(long, value_name = "DIR")]
    clean_dir: PathBuf,

    /// Directory for the per-year joins and the final corpus
    #[arg(long, value_name = "DIR")]
    out_dir: PathBuf,

    /// First year to process (default: 1990)
    #[arg(long)]
    start_year: Option<i32>,

    /// Last year to process (default: current year)
    #[arg(long)]
    end_year: Option<i32>,

    /// Also process the NonDomestic extract triple
    #[arg(long)]
    non_domestic: bool,

    /// Worker pool size (default: number of cores)
    #[arg(long)]
    workers: Option<usize>,

    /// What to do when a subject has more rows than the pivoted layout holds
    #[arg(long, value_enum, default_value_t = OverflowArg::Drop)]
    overflow: OverflowArg,

    /// Encoding label to fall back to when detection fails (e.g. windows-1252)
    #[arg(long, value_name = "LABEL")]
    fallback_encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OverflowArg {
    /// Log the excess row, drop it, keep going
    Drop,
    /// Fail the affected file
    Fail,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let cli = Cli::parse();
    let config = PipelineConfig {
        data_dir: cli.data_dir,
        clean_dir: cli.clean_dir,
        out_dir: cli.out_dir,
        start_year: cli.start_year.unwrap_or(MIN_YEAR),
        end_year: cli.end_year.unwrap_or_else(|| Utc::now().year()),
        include_non_domestic: cli.non_domestic,
        workers: cli.workers,
        overflow_policy: match cli.overflow {
            OverflowArg::Drop => OverflowPolicy::LogAndDrop,
            OverflowArg::Fail => OverflowPolicy::Fail,
        },
        fallback_encoding: cli.fallback_encoding,
    };

    let summary = pipeline::run(&config)?;
    if !summary.success() {
        info!("run finished with losses; exiting non-zero");
        std::process::exit(1);
    }
    Ok(())
}
