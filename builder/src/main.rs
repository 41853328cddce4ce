//! `jacs-build`: regenerate the prelude and build the compiler bundle.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use builder::config::{DEFAULT_CONFIG_PATH, load_config};
use builder::pipeline::{BuildOptions, run_build};
use runner::exit_codes;
use runner::logging;

const USAGE: &str = "Usage: jacs-build [--fast]";

#[derive(Parser, Debug)]
#[command(name = "jacs-build", version, about = "Build the compiler bundle")]
struct Cli {
    /// Skip the type-check step.
    #[arg(short = 'f', long)]
    fast: bool,

    /// Debug tracing.
    #[arg(short = 'v')]
    verbose: bool,

    /// Build root; config and step paths resolve against it.
    #[arg(long, value_name = "DIR", default_value = ".")]
    root: PathBuf,

    /// Build config, relative to the root.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(hide = true)]
    extra: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if !cli.extra.is_empty() {
        println!("{USAGE}");
        std::process::exit(exit_codes::FAILED);
    }
    if let Err(err) = run(&cli) {
        eprintln!("{err:?}");
        std::process::exit(exit_codes::FAILED);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config_path = cli
        .root
        .join(cli.config.as_deref().unwrap_or(Path::new(DEFAULT_CONFIG_PATH)));
    let cfg = load_config(&config_path).context("load build config")?;
    run_build(
        &cli.root,
        &cfg,
        BuildOptions { fast: cli.fast },
        &mut io::stdout(),
    )?;
    Ok(())
}
