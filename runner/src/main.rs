//! `jacs-run`: compile, deploy and judge device programs.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;

use runner::batch::{BatchRunner, CaseSet};
use runner::compiler::DeployVerifier;
use runner::core::device_id::DeviceId;
use runner::deploy::{ServeOptions, serve};
use runner::empty::{empty_program, render_c_array};
use runner::exit_codes;
use runner::harness::HarnessOptions;
use runner::io::artifact_store::{load_artifact, write_compiled};
use runner::io::config::{DEFAULT_CONFIG_PATH, RunnerConfig, load_config};
use runner::io::host::RunnerHost;
use runner::io::native::NativeRun;
use runner::io::process_compiler::ProcessCompiler;
use runner::io::process_vm::ProcessVmFactory;
use runner::logging;
use runner::logparse::{ReplayRequest, replay_log};
use runner::session::Transport;

#[derive(Parser, Debug)]
#[command(
    name = "jacs-run",
    version,
    about = "Compile, deploy and test device programs",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Show compiler diagnostics and debug tracing.
    #[arg(short = 'v', global = true)]
    verbose: bool,

    /// Run under the native VM binary.
    #[arg(short = 'c', global = true)]
    native: bool,

    /// Test mode: no transport, exit once deployed.
    #[arg(short = 't', global = true)]
    test_mode: bool,

    /// Deploy through the client-side path.
    #[arg(short = 'd', global = true)]
    client_deploy: bool,

    /// Treat FILE as a device log and replay it.
    #[arg(short = 'p', global = true)]
    parse_log: bool,

    /// Serial port for the native VM (`-s:<port>`); implies `-c`.
    #[arg(short = 's', value_name = "PORT", value_parser = parse_serial_port, global = true)]
    serial: Option<String>,

    /// Harness config file.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    /// FILE followed by extra arguments (log replay: `[GEN] [stats]`).
    #[arg(value_name = "FILE", trailing_var_arg = true)]
    args: Vec<String>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run the compile-only and run case directories.
    Test,
    /// Print the empty program as a C array.
    Empty,
}

fn parse_serial_port(raw: &str) -> Result<String, String> {
    let port = raw.strip_prefix(':').unwrap_or(raw);
    if port.is_empty() {
        return Err("serial port must be non-empty".to_string());
    }
    Ok(port.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:?}");
            exit_codes::UNCAUGHT
        }
    };
    let _ = io::stdout().flush();
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let cfg = load_config(&config_path).context("load config")?;
    debug!(config = %config_path.display(), "config loaded");

    let native = cli.native || cli.serial.is_some();
    let compiler = ProcessCompiler::from_config(&cfg.compiler);
    let factory = ProcessVmFactory::from_config(&cfg);
    let mut host =
        RunnerHost::new(cfg.dist_dir.clone(), cfg.specs_path.clone()).with_verbose(cli.verbose);
    // The native binary loads the program itself; no VM host is involved.
    if !native {
        host = host.with_verifier(Box::new(DeployVerifier::new(factory.clone())));
    }
    let mut stdout = io::stdout();

    match &cli.command {
        Some(Command::Test) => {
            let cases = CaseSet::discover(&cfg.cases.compile_only, &cfg.cases.run)?;
            let runner = BatchRunner::new(
                &compiler,
                &host,
                &factory,
                HarnessOptions::from_config(&cfg),
            );
            let report = runner.run(&cases, &mut stdout).await?;
            Ok(report.exit_code())
        }
        Some(Command::Empty) => {
            let image = empty_program(&compiler, &host)?;
            println!("{}", render_c_array(&image));
            Ok(exit_codes::OK)
        }
        None if cli.parse_log => {
            let Some((path, rest)) = cli.args.split_first() else {
                bail!("-p needs a log FILE");
            };
            let request = ReplayRequest::from_args(PathBuf::from(path), rest);
            replay_log(&compiler, &request, &mut stdout)?;
            Ok(exit_codes::OK)
        }
        None if native => {
            let Some(path) = cli.args.first() else {
                bail!("native execution needs a program FILE");
            };
            run_native(&cli, &cfg, &host, &compiler, Path::new(path))
        }
        None => {
            let options = ServeOptions {
                file: cli.args.first().map(PathBuf::from),
                client_deploy: cli.client_deploy,
                test_mode: cli.test_mode,
                device_id: DeviceId::parse(&cfg.device_id),
                transport: Transport::Tcp {
                    host: cfg.vm.tcp_host.clone(),
                    port: cfg.vm.tcp_port,
                },
            };
            serve(&compiler, &host, &factory, &options, &mut stdout).await?;
            Ok(exit_codes::OK)
        }
    }
}

fn run_native(
    cli: &Cli,
    cfg: &RunnerConfig,
    host: &RunnerHost,
    compiler: &ProcessCompiler,
    path: &Path,
) -> Result<i32> {
    let binary = load_artifact(path, compiler, host)?;
    let program = write_compiled(&cfg.dist_dir, &binary)?;
    let native = NativeRun {
        binary: cfg.native_binary(),
        program,
        serial_port: cli.serial.clone(),
        test_mode: cli.test_mode,
        timeout: cfg.native.timeout_secs.map(Duration::from_secs),
    };
    native.run()
}
