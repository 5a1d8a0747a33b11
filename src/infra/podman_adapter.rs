use crate::domain::{
    ContainerInspect, ContainerRecord, ContainerSpec, CreatedContainer, DaemonInfo, EngineClient,
    ExecInspect, ExecOptions, HistoryRecord, ImageRecord, RemoveOptions, ServerVersion,
    StopOptions,
};
use crate::infra::config::AppConfig;
use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::process::{Command, Output};
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// Exit code podman uses for its own failures, as opposed to the command's
const PODMAN_ERROR_CODE: i32 = 125;

#[derive(Debug, Clone)]
struct ExecSession {
    container: String,
    argv: Vec<String>,
    options: ExecOptions,
    exit_code: Option<i64>,
    finished: bool,
}

/// [`EngineClient`] backed by the podman CLI and its JSON output.
///
/// Podman has no exec-session API on the command line, so sessions are kept
/// here: `exec_create` only registers the command and `exec_start` runs it.
#[derive(Debug)]
pub struct PodmanAdapter {
    binary: String,
    url: Option<String>,
    sessions: Mutex<HashMap<String, ExecSession>>,
}

impl PodmanAdapter {
    pub fn new(binary: impl Into<String>, url: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            url,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.binary(), config.engine.url.clone())
    }

    fn output<I, S>(&self, args: I, context: &str) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        if let Some(url) = &self.url {
            cmd.arg("--url").arg(url);
        }
        cmd.args(args);

        debug!(command = ?cmd, "executando engine");
        cmd.output().with_context(|| context.to_string())
    }

    fn podman<I, S>(&self, args: I, context: &str) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.output(args, context)?;
        ensure_success(&output, &self.binary, context)?;
        Ok(output.stdout)
    }

    fn podman_json<T, I, S>(&self, args: I, context: &str) -> Result<T>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let stdout = self.podman(args, context)?;
        parse_json(&stdout, context)
    }

    fn with_session<T>(
        &self,
        exec_id: &str,
        f: impl FnOnce(&mut ExecSession) -> T,
    ) -> Result<T> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match sessions.get_mut(exec_id) {
            Some(session) => Ok(f(session)),
            None => bail!("sessão de exec {exec_id} desconhecida"),
        }
    }

    fn drop_session(&self, exec_id: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(exec_id);
    }

    #[cfg(test)]
    fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl EngineClient for PodmanAdapter {
    fn list_images(&self, all: bool) -> Result<Vec<ImageRecord>> {
        let mut args = vec!["images", "--format", "json"];
        if all {
            args.push("--all");
        }
        self.podman_json(args, "listando imagens")
    }

    fn list_containers(&self, all: bool) -> Result<Vec<ContainerRecord>> {
        let mut args = vec!["ps", "--format", "json"];
        if all {
            args.push("--all");
        }
        self.podman_json(args, "listando containers")
    }

    fn create_container(&self, image: &str, spec: &ContainerSpec) -> Result<CreatedContainer> {
        let context = format!("criando container a partir de {image}");
        let output = self.output(create_args(image, spec), &context)?;
        ensure_success(&output, &self.binary, &context)?;
        parse_created(&output)
    }

    fn start_container(&self, id: &str) -> Result<()> {
        self.podman(["start", id], &format!("iniciando container {id}"))?;
        Ok(())
    }

    fn stop_container(&self, id: &str, options: &StopOptions) -> Result<()> {
        self.podman(stop_args(id, options), &format!("parando container {id}"))?;
        Ok(())
    }

    fn remove_container(&self, id: &str, options: &RemoveOptions) -> Result<()> {
        self.podman(remove_args(id, options), &format!("removendo container {id}"))?;
        Ok(())
    }

    fn inspect_container(&self, id: &str) -> Result<ContainerInspect> {
        let context = format!("inspecionando container {id}");
        let mut payloads: Vec<ContainerInspect> =
            self.podman_json(["container", "inspect", "--format", "json", id], &context)?;

        if payloads.is_empty() {
            bail!("inspect de {id} não retornou nada");
        }
        Ok(payloads.swap_remove(0))
    }

    fn exec_create(&self, id: &str, cmd: &[String], options: &ExecOptions) -> Result<String> {
        if cmd.is_empty() {
            bail!("comando vazio para exec em {id}");
        }

        let exec_id = Uuid::new_v4().to_string();
        let session = ExecSession {
            container: id.to_string(),
            argv: cmd.to_vec(),
            options: options.clone(),
            exit_code: None,
            finished: false,
        };

        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(exec_id.clone(), session);
        Ok(exec_id)
    }

    /// Runs the session's command. Output is stdout followed by stderr, so
    /// lines interleaved across the two streams come back regrouped.
    /// A session that fails to run is dropped.
    fn exec_start(&self, exec_id: &str) -> Result<Vec<u8>> {
        let session = self.with_session(exec_id, |session| session.clone())?;
        if session.finished {
            bail!("sessão de exec {exec_id} já foi executada");
        }

        let context = format!("executando {:?} em {}", session.argv, session.container);
        let output = self
            .output(
                exec_args(&session.container, &session.argv, &session.options),
                &context,
            )
            .and_then(|output| {
                if output.status.code() == Some(PODMAN_ERROR_CODE) {
                    ensure_success(&output, &self.binary, &context)?;
                }
                Ok(output)
            });

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                self.drop_session(exec_id);
                return Err(err);
            }
        };

        let exit_code = output.status.code().map(i64::from);
        self.with_session(exec_id, |session| {
            session.exit_code = exit_code;
            session.finished = true;
        })?;

        let mut captured = output.stdout;
        captured.extend_from_slice(&output.stderr);
        Ok(captured)
    }

    /// Finished sessions are dropped once inspected
    fn exec_inspect(&self, exec_id: &str) -> Result<ExecInspect> {
        let (inspect, finished) = self.with_session(exec_id, |session| {
            let inspect = ExecInspect {
                exit_code: session.exit_code,
                running: false,
            };
            (inspect, session.finished)
        })?;

        if finished {
            self.drop_session(exec_id);
        }
        Ok(inspect)
    }

    fn image_history(&self, id: &str) -> Result<Vec<HistoryRecord>> {
        self.podman_json(
            ["history", "--format", "json", id],
            &format!("lendo histórico de {id}"),
        )
    }

    fn daemon_info(&self) -> Result<DaemonInfo> {
        let raw: Value = self.podman_json(["info", "--format", "json"], "consultando engine")?;
        Ok(info_from_podman(&raw))
    }

    fn daemon_version(&self) -> Result<ServerVersion> {
        let raw: Value = self.podman_json(
            ["version", "--format", "json"],
            "consultando versão do engine",
        )?;
        version_from_podman(&raw)
    }

    fn pull(&self, reference: &str, tag: &str) -> Result<()> {
        let full = format!("{reference}:{tag}");
        self.podman(["pull", "--quiet", full.as_str()], &format!("baixando {full}"))?;
        Ok(())
    }

    fn endpoint(&self) -> Option<String> {
        self.url.clone()
    }
}

fn ensure_success(output: &Output, binary: &str, context: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    bail!(
        "{binary} retornou status {:?} ({context}): {}",
        output.status.code(),
        stderr.trim()
    )
}

fn parse_json<T: DeserializeOwned>(stdout: &[u8], context: &str) -> Result<T> {
    serde_json::from_slice(stdout).with_context(|| format!("JSON inválido ao {context}"))
}

fn parse_created(output: &Output) -> Result<CreatedContainer> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let Some(id) = stdout.lines().map(str::trim).rfind(|line| !line.is_empty()) else {
        bail!("create não devolveu o id do container");
    };

    let warnings = String::from_utf8_lossy(&output.stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    Ok(CreatedContainer {
        id: id.to_string(),
        warnings,
    })
}

pub(crate) fn create_args(image: &str, spec: &ContainerSpec) -> Vec<String> {
    let mut args: Vec<String> = vec!["create".into()];

    if let Some(name) = spec.name {
        args.push("--name".into());
        args.push(name.into());
    }
    if let Some(net) = spec.network {
        args.push("--network".into());
        args.push(net.into());
    }
    if let Some(userns) = spec.userns {
        args.push("--userns".into());
        args.push(userns.into());
    }
    if let Some(sec) = spec.security_opt {
        args.push("--security-opt".into());
        args.push(sec.into());
    }
    if let Some(wd) = spec.workdir {
        args.push("-w".into());
        args.push(wd.into());
    }

    for port in spec.ports {
        args.push("-p".into());
        args.push(port.clone());
    }

    for env in spec.env {
        args.push("-e".into());
        args.push(env.clone());
    }

    for volume in spec.volumes {
        args.push("-v".into());
        args.push(volume.clone());
    }

    for extra in spec.extra_args {
        args.push((*extra).into());
    }

    args.push(image.into());
    args.extend(spec.command.iter().cloned());
    args
}

pub(crate) fn stop_args(id: &str, options: &StopOptions) -> Vec<String> {
    let mut args: Vec<String> = vec!["stop".into()];
    if let Some(timeout) = options.timeout {
        args.push("--time".into());
        args.push(timeout.to_string());
    }
    args.push(id.into());
    args
}

pub(crate) fn remove_args(id: &str, options: &RemoveOptions) -> Vec<String> {
    let mut args: Vec<String> = vec!["rm".into()];
    if options.force {
        args.push("--force".into());
    }
    if options.volumes {
        args.push("--volumes".into());
    }
    args.push(id.into());
    args
}

pub(crate) fn exec_args(container: &str, argv: &[String], options: &ExecOptions) -> Vec<String> {
    let mut args: Vec<String> = vec!["exec".into()];

    if let Some(user) = &options.user {
        args.push("--user".into());
        args.push(user.clone());
    }
    if let Some(wd) = &options.workdir {
        args.push("--workdir".into());
        args.push(wd.clone());
    }
    for env in &options.env {
        args.push("-e".into());
        args.push(env.clone());
    }
    if options.privileged {
        args.push("--privileged".into());
    }

    args.push(container.into());
    args.extend(argv.iter().cloned());
    args
}

fn text(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

/// Maps `podman info` (nested, camelCase) onto the engine-neutral shape.
/// Top-level sections other than the ones read are kept in `extra`.
pub(crate) fn info_from_podman(raw: &Value) -> DaemonInfo {
    let extra = raw
        .as_object()
        .map(|sections| {
            sections
                .iter()
                .filter(|(key, _)| !matches!(key.as_str(), "host" | "store"))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    DaemonInfo {
        driver: text(raw, "/store/graphDriverName"),
        containers: raw.pointer("/store/containerStore/number").and_then(Value::as_u64),
        images: raw.pointer("/store/imageStore/number").and_then(Value::as_u64),
        kernel_version: text(raw, "/host/kernel"),
        operating_system: text(raw, "/host/distribution/distribution"),
        extra,
    }
}

/// `podman version` reports a `Client` section, plus `Server` when talking
/// to a remote service; the server wins when present.
pub(crate) fn version_from_podman(raw: &Value) -> Result<ServerVersion> {
    let section = raw
        .get("Server")
        .filter(|server| !server.is_null())
        .or_else(|| raw.get("Client"))
        .context("saída de version sem seção Client ou Server")?;

    let mut version: ServerVersion =
        serde_json::from_value(section.clone()).context("parse da versão do engine")?;

    if let Some(os_arch) = section.get("OsArch").and_then(Value::as_str) {
        if let Some((os, arch)) = os_arch.split_once('/') {
            version.os.get_or_insert_with(|| os.to_string());
            version.arch.get_or_insert_with(|| arch.to_string());
        }
    }

    Ok(version)
}
