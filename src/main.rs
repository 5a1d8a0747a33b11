use anyhow::Result;
use clap::Parser;
use lsm::cli::{self, EngineCommand};
use lsm::domain::ExecError;
use lsm::infra::{AppConfig, PodmanAdapter, default_config_dir, load_app_config};
use lsm::services::Connection;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Parser)]
#[command(name = "lsm", about = "Inspeciona e controla imagens e containers do engine local")]
struct Cli {
    /// Diretório de configuração (default: ~/.config/lsm)
    #[arg(long, env = "LSM_CONFIG_DIR", default_value_os_t = default_config_dir())]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: EngineCommand,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn execute(cli: Cli, config: &AppConfig) -> Result<()> {
    let conn = Connection::new(Arc::new(PodmanAdapter::from_config(config)));
    let mut stdout = std::io::stdout().lock();
    cli::engine::run(cli.command, &conn, config, &mut stdout)
}

/// Exit status for a failed command: the exec's own code when it has one
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<ExecError>() {
        Some(exec) => u8::try_from(exec.code)
            .ok()
            .filter(|code| *code != 0)
            .map(ExitCode::from)
            .unwrap_or(ExitCode::FAILURE),
        None => ExitCode::FAILURE,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_app_config(&cli.config_dir) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Erro: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);

    match execute(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(exec) = err.downcast_ref::<ExecError>() {
                eprint!("{}", exec.output);
            }
            eprintln!("Erro: {err:#}");
            exit_code(&err)
        }
    }
}
