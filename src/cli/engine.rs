use crate::domain::{ContainerSpec, ExecOptions, RemoveOptions, StopOptions};
use crate::infra::AppConfig;
use crate::services::{Connection, Container, CreateOptions};
use anyhow::{Result, anyhow};
use clap::Subcommand;
use std::io::Write;
use tracing::info;

/// Command the `run` container is kept alive with while the exec runs
const KEEP_ALIVE: [&str; 2] = ["sleep", "infinity"];

#[derive(Subcommand, Debug)]
pub enum EngineCommand {
    /// Lista imagens locais
    Images,
    /// Lista containers
    Containers {
        /// Somente containers em execução
        #[arg(long)]
        running: bool,
    },
    /// Mostra as camadas de uma imagem
    History { image: String },
    /// Mostra estado e IP de um container
    Inspect { container: String },
    /// Inicia um container
    Start { container: String },
    /// Para um container
    Stop {
        container: String,
        /// Segundos até matar o processo (padrão: config ou engine)
        #[arg(long, short)]
        time: Option<u32>,
    },
    /// Remove um container
    Rm {
        container: String,
        #[arg(long, short)]
        force: bool,
    },
    /// Executa um comando em um container
    Exec {
        container: String,
        #[arg(last = true, required = true)]
        cmd: Vec<String>,
    },
    /// Cria um container, executa um comando nele e o para ao final
    Run {
        /// Remove o container ao final
        #[arg(long)]
        rm: bool,
        /// Não baixa a imagem se ela não existir localmente
        #[arg(long)]
        no_pull: bool,
        image: String,
        #[arg(last = true, required = true)]
        cmd: Vec<String>,
    },
    /// Versão do engine
    Version,
    /// Informações do engine
    Info,
}

pub fn run(
    cmd: EngineCommand,
    conn: &Connection,
    config: &AppConfig,
    out: &mut dyn Write,
) -> Result<()> {
    match cmd {
        EngineCommand::Images => list_images(conn, out),
        EngineCommand::Containers { running } => {
            list_containers(conn, !running && config.list_all(), out)
        }
        EngineCommand::History { image } => history(conn, &image, out),
        EngineCommand::Inspect { container } => inspect(conn, &container, out),
        EngineCommand::Start { container } => find_container(conn, &container)?.start(),
        EngineCommand::Stop { container, time } => {
            let options = StopOptions {
                timeout: time.or(config.containers.stop_timeout),
            };
            find_container(conn, &container)?.stop(&options)
        }
        EngineCommand::Rm { container, force } => {
            let options = RemoveOptions {
                force,
                ..RemoveOptions::default()
            };
            find_container(conn, &container)?.remove(&options)
        }
        EngineCommand::Exec { container, cmd } => {
            let output = find_container(conn, &container)?.exec(&cmd, &ExecOptions::default())?;
            write!(out, "{output}")?;
            Ok(())
        }
        EngineCommand::Run {
            rm,
            no_pull,
            image,
            cmd,
        } => run_in_new_container(conn, config, &image, &cmd, rm, !no_pull, out),
        EngineCommand::Version => version(conn, out),
        EngineCommand::Info => daemon_info(conn, out),
    }
}

fn find_container(conn: &Connection, identifier: &str) -> Result<Container> {
    conn.containers(true)?
        .get(identifier)
        .ok_or_else(|| anyhow!("container {identifier} não encontrado"))
}

fn list_images(conn: &Connection, out: &mut dyn Write) -> Result<()> {
    for image in &conn.images()? {
        let tags = if image.tags.is_empty() {
            "<none>".to_string()
        } else {
            image.tags.join(", ")
        };
        writeln!(out, "{}  {}  {}", image.short_id(), tags, image.size)?;
    }
    Ok(())
}

fn list_containers(conn: &Connection, all: bool, out: &mut dyn Write) -> Result<()> {
    for container in &conn.containers(all)? {
        writeln!(
            out,
            "{}  {}  {}  {}",
            container.short_id(),
            container.name().unwrap_or("-"),
            container.image_name,
            container.status
        )?;
    }
    Ok(())
}

fn history(conn: &Connection, reference: &str, out: &mut dyn Write) -> Result<()> {
    let images = conn.images()?;
    let image = images
        .get(reference)
        .or_else(|| images.get_by_id(reference))
        .ok_or_else(|| anyhow!("imagem {reference} não encontrada"))?;

    for layer in image.history()? {
        writeln!(
            out,
            "{}  {}  {}  {}",
            layer.short_id(),
            layer.created.to_rfc3339(),
            layer.size,
            layer.created_by
        )?;
    }
    Ok(())
}

fn inspect(conn: &Connection, identifier: &str, out: &mut dyn Write) -> Result<()> {
    let mut container = find_container(conn, identifier)?;
    let state = container.state()?;
    let ip = container.ip()?;

    writeln!(
        out,
        "{}  {}  {}",
        container.name().unwrap_or(container.short_id()),
        state,
        ip.as_deref().unwrap_or("-")
    )?;
    Ok(())
}

fn run_in_new_container(
    conn: &Connection,
    config: &AppConfig,
    image: &str,
    cmd: &[String],
    remove: bool,
    pull: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let keep_alive: Vec<String> = KEEP_ALIVE.iter().map(|arg| arg.to_string()).collect();
    let options = CreateOptions {
        pull: pull && config.pull(),
        remove_on_exit: remove,
        spec: ContainerSpec {
            command: &keep_alive,
            ..ContainerSpec::default()
        },
    };

    let Some(container) = conn.containers(config.list_all())?.create(image, &options)? else {
        info!("Imagem {image} ausente e pull desativado; nada a executar");
        return Ok(());
    };

    let output = container
        .with_stop_options(config.stop_options())
        .run_scoped(|c| c.exec(cmd, &ExecOptions::default()))?;
    write!(out, "{output}")?;
    Ok(())
}

fn version(conn: &Connection, out: &mut dyn Write) -> Result<()> {
    let version = conn.version()?;
    writeln!(
        out,
        "{} (api {})",
        version.version.as_deref().unwrap_or("?"),
        version.api_version.as_deref().unwrap_or("?")
    )?;
    if let (Some(os), Some(arch)) = (&version.os, &version.arch) {
        writeln!(out, "{os}/{arch}")?;
    }
    Ok(())
}

fn daemon_info(conn: &Connection, out: &mut dyn Write) -> Result<()> {
    let info = conn.info()?;
    writeln!(out, "driver: {}", info.driver.as_deref().unwrap_or("-"))?;
    if let Some(containers) = info.containers {
        writeln!(out, "containers: {containers}")?;
    }
    if let Some(images) = info.images {
        writeln!(out, "images: {images}")?;
    }
    if let Some(kernel) = &info.kernel_version {
        writeln!(out, "kernel: {kernel}")?;
    }
    writeln!(out, "local: {}", conn.is_local())?;
    Ok(())
}
