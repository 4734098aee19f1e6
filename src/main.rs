use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use vpo_tables::pipeline::{self, RunOptions};
use vpo_tables::{Result, ToolError};

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose)?;

    if !cli.input_dir.is_dir() {
        return Err(ToolError::MissingInput(cli.input_dir));
    }

    let base = config_dir(&cli.config);
    let options = RunOptions {
        template: cli
            .template
            .unwrap_or_else(|| base.join("templates").join("template.xlsx")),
        output_dir: cli.output.unwrap_or_else(|| base.join("created_files")),
        input_dir: cli.input_dir,
        periods: cli.years,
        include_optional: cli.include_optional,
    };

    let written = pipeline::run(&cli.config, &options)?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

fn config_dir(config: &Path) -> PathBuf {
    match config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("vpo_tables=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Build consolidated VPO workbooks of cross-file lookup formulas."
)]
struct Cli {
    /// Configuration file (JSON, comments allowed).
    config: PathBuf,

    /// Directory holding one source directory or zip archive per period.
    input_dir: PathBuf,

    /// Template workbook; defaults to templates/template.xlsx next to the config.
    #[arg(long)]
    template: Option<PathBuf>,

    /// Output directory; defaults to created_files next to the config.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Periods to build; all configured periods when omitted.
    #[arg(long, num_args = 1..)]
    years: Vec<String>,

    /// Only take source files matching an optional pattern as well.
    #[arg(long)]
    include_optional: bool,

    /// Log debug output of this crate.
    #[arg(long, short)]
    verbose: bool,
}
