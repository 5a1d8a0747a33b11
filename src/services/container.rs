use super::image::Image;
use super::{Connection, from_epoch};
use crate::domain::{
    self, ContainerError, ContainerInspect, ContainerRecord, ContainerState, ExecError,
    ExecOptions, PortRecord, RemoveOptions, StopOptions,
};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use std::ops::{Deref, DerefMut};
use tracing::{debug, info, warn};

/// Handle on one container, bound to its id.
///
/// The handle keeps only the last inspect result, and every state read
/// re-inspects. Once [`Container::remove`] has been called the handle is
/// latched as removed: inspection stops and start/stop fail with
/// [`ContainerError::Removed`]. Handles are independent, two handles on the
/// same id do not share any state.
#[derive(Debug, Clone)]
pub struct Container {
    pub id: String,
    pub names: Vec<String>,
    /// Image reference the container was created from
    pub image_name: String,
    pub command: String,
    pub ports: Vec<PortRecord>,
    pub created: DateTime<Utc>,
    /// Engine status line at listing time
    pub status: String,
    image_id: Option<String>,
    conn: Connection,
    remove_on_exit: bool,
    cleanup_stop: StopOptions,
    removed: bool,
    snapshot: Option<ContainerInspect>,
}

impl Container {
    pub(crate) fn from_record(record: &ContainerRecord, conn: Connection) -> Self {
        Self {
            id: record.id.clone(),
            names: record.names.clone(),
            image_name: record.image.clone(),
            command: record.command.clone(),
            ports: record.ports.clone(),
            created: from_epoch(record.created),
            status: record.status.clone(),
            image_id: record.image_id.clone().filter(|id| !id.is_empty()),
            conn,
            remove_on_exit: false,
            cleanup_stop: StopOptions::default(),
            removed: false,
            snapshot: None,
        }
    }

    pub fn with_remove_on_exit(mut self, remove_on_exit: bool) -> Self {
        self.remove_on_exit = remove_on_exit;
        self
    }

    /// Stop options used when a scoped run ends
    pub fn with_stop_options(mut self, options: StopOptions) -> Self {
        self.cleanup_stop = options;
        self
    }

    pub fn remove_on_exit(&self) -> bool {
        self.remove_on_exit
    }

    pub fn set_remove_on_exit(&mut self, remove_on_exit: bool) {
        self.remove_on_exit = remove_on_exit;
    }

    pub fn short_id(&self) -> &str {
        domain::short_id(&self.id)
    }

    /// First name, without the leading `/` docker adds
    pub fn name(&self) -> Option<&str> {
        self.names
            .first()
            .map(|name| name.strip_prefix('/').unwrap_or(name))
    }

    /// Id of the image, falling back to the creation reference when the
    /// engine did not report one
    pub fn image_id(&self) -> &str {
        self.image_id.as_deref().unwrap_or(&self.image_name)
    }

    /// Owning image from a fresh image catalog; `None` if it was removed
    pub fn image(&self) -> Result<Option<Image>> {
        Ok(self.conn.images()?.get_by_id(self.image_id()))
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Last inspect result, stale once the handle is removed
    pub fn snapshot(&self) -> Option<&ContainerInspect> {
        self.snapshot.as_ref()
    }

    /// Replaces the cached inspect result. No-op once removed.
    pub fn inspect(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }

        self.snapshot = Some(self.conn.client().inspect_container(&self.id)?);
        Ok(())
    }

    /// Live state: inspects first unless the handle is removed.
    pub fn state(&mut self) -> Result<ContainerState> {
        if self.removed {
            return Ok(ContainerState::Removed);
        }

        self.inspect()?;
        let flags = self
            .snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.state.as_ref())
            .ok_or_else(|| ContainerError::InconsistentPayload {
                id: self.id.clone(),
            })?;

        Ok(ContainerState::from_flags(flags))
    }

    /// Address on the default network, `None` when not attached or not running
    pub fn ip(&mut self) -> Result<Option<String>> {
        self.inspect()?;
        Ok(self
            .snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.network_settings.as_ref())
            .map(|network| network.ip_address.clone())
            .filter(|ip| !ip.is_empty()))
    }

    /// Starts the container. The current state is not checked locally.
    pub fn start(&self) -> Result<()> {
        self.ensure_not_removed()?;
        debug!(container = self.short_id(), "iniciando container");
        self.conn.client().start_container(&self.id)
    }

    /// Stops the container. The current state is not checked locally.
    pub fn stop(&self, options: &StopOptions) -> Result<()> {
        self.ensure_not_removed()?;
        debug!(container = self.short_id(), "parando container");
        self.conn.client().stop_container(&self.id, options)
    }

    /// Removes the container and latches the handle as removed.
    ///
    /// The latch is set even when the engine reports a failure, so a handle
    /// whose removal failed still considers itself removed. A second call is
    /// a no-op.
    pub fn remove(&mut self, options: &RemoveOptions) -> Result<()> {
        if self.removed {
            return Ok(());
        }

        debug!(container = self.short_id(), "removendo container");
        let result = self.conn.client().remove_container(&self.id, options);
        self.removed = true;
        result
    }

    /// Runs `cmd` in the container and returns its output.
    ///
    /// A non-zero exit code (or none at all) is reported as [`ExecError`],
    /// carrying the captured output.
    pub fn exec<S: AsRef<str>>(&self, cmd: &[S], options: &ExecOptions) -> Result<String> {
        let argv: Vec<String> = cmd.iter().map(|arg| arg.as_ref().to_string()).collect();
        let Some(program) = argv.first().cloned() else {
            bail!("comando vazio para exec em {}", self.short_id());
        };

        let client = self.conn.client();
        let exec_id = client.exec_create(&self.id, &argv, options)?;
        let raw = client.exec_start(&exec_id)?;
        let result = client.exec_inspect(&exec_id)?;

        let output = String::from_utf8_lossy(&raw).into_owned();
        let code = result.exit_code.unwrap_or(-1);
        if code != 0 {
            return Err(ExecError {
                command: program,
                args: argv,
                code,
                output,
            }
            .into());
        }

        Ok(output)
    }

    /// Starts the container unless it is already running and returns a guard
    /// that stops it, then removes it if flagged, when released or dropped.
    pub fn scoped(self) -> Result<ScopedContainer> {
        let stop = self.cleanup_stop.clone();
        let mut scope = ScopedContainer {
            container: self,
            stop,
            released: false,
        };

        // the guard already exists, so a failed start still cleans up
        if !scope.container.state()?.is_running() {
            info!("Iniciando {}...", scope.container.short_id());
            scope.container.start()?;
        }

        Ok(scope)
    }

    /// Runs `body` inside a scoped run. Cleanup always happens first; a body
    /// error is returned over a cleanup error, which is then only logged.
    pub fn run_scoped<T>(self, body: impl FnOnce(&mut Container) -> Result<T>) -> Result<T> {
        let mut scope = self.scoped()?;
        let id = scope.short_id().to_string();

        let outcome = body(&mut *scope);
        let cleanup = scope.release();

        match (outcome, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup_err)) => {
                warn!("Falha na limpeza de {id}: {cleanup_err:#}");
                Err(err)
            }
        }
    }

    fn ensure_not_removed(&self) -> Result<()> {
        if self.removed {
            return Err(ContainerError::Removed {
                id: self.id.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// Guard returned by [`Container::scoped`].
///
/// Cleanup runs exactly once: on [`ScopedContainer::release`], or on drop
/// (including unwinding) if never released.
#[derive(Debug)]
pub struct ScopedContainer {
    container: Container,
    stop: StopOptions,
    released: bool,
}

impl ScopedContainer {
    /// Stops and (if flagged) removes the container, reporting failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.cleanup()
    }

    fn cleanup(&mut self) -> Result<()> {
        let container = &mut self.container;

        let stopped = match container.state() {
            Ok(state) if state.is_running() => {
                info!("Parando {}...", container.short_id());
                container.stop(&self.stop)
            }
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        };

        let removed = if container.remove_on_exit {
            info!("Removendo {}...", container.short_id());
            container.remove(&RemoveOptions::default())
        } else {
            Ok(())
        };

        stopped.and(removed)
    }
}

impl Deref for ScopedContainer {
    type Target = Container;

    fn deref(&self) -> &Container {
        &self.container
    }
}

impl DerefMut for ScopedContainer {
    fn deref_mut(&mut self) -> &mut Container {
        &mut self.container
    }
}

impl Drop for ScopedContainer {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(err) = self.cleanup() {
            warn!(
                "Falha ao encerrar {} fora de escopo: {err:#}",
                self.container.short_id()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StateFlags;
    use crate::services::ContainerCatalog;
    use crate::test_support::MockEngine;
    use std::sync::Arc;

    const ID: &str = "4f3a9c2b1d0e8f7a6b5c4d3e2f1a0b9c";

    fn container(mock: &Arc<MockEngine>, running: bool) -> Container {
        mock.add_container(ID, "web", "nginx:latest", running);
        ContainerCatalog::new(Connection::new(mock.clone()), true)
            .unwrap()
            .get("web")
            .unwrap()
    }

    #[test]
    fn state_is_a_live_read() {
        let mock = Arc::new(MockEngine::new());
        let mut web = container(&mock, false);

        assert_eq!(web.state().unwrap(), ContainerState::Stopped);
        web.start().unwrap();
        assert_eq!(web.state().unwrap(), ContainerState::Running);
        assert_eq!(mock.count("inspect"), 2);
    }

    #[test]
    fn state_precedence_from_engine_flags() {
        let mock = Arc::new(MockEngine::new());
        let mut web = container(&mock, true);
        mock.set_state_flags(
            ID,
            StateFlags {
                dead: true,
                running: true,
                ..StateFlags::default()
            },
        );

        assert_eq!(web.state().unwrap(), ContainerState::Dead);
    }

    #[test]
    fn missing_state_section_is_inconsistent_payload() {
        let mock = Arc::new(MockEngine::new());
        let mut web = container(&mock, true);
        mock.drop_state_section(ID);

        let err = web.state().unwrap_err();
        assert_eq!(
            err.downcast_ref::<ContainerError>(),
            Some(&ContainerError::InconsistentPayload { id: ID.to_string() })
        );
    }

    #[test]
    fn inspect_replaces_snapshot_wholesale() {
        let mock = Arc::new(MockEngine::new());
        let mut web = container(&mock, true);
        mock.set_ip(ID, "10.88.0.7");

        web.inspect().unwrap();
        assert_eq!(
            web.snapshot().unwrap().network_settings.as_ref().unwrap().ip_address,
            "10.88.0.7"
        );

        mock.drop_state_section(ID);
        web.inspect().unwrap();
        assert!(web.snapshot().unwrap().state.is_none());
    }

    #[test]
    fn remove_latches_and_is_idempotent() {
        let mock = Arc::new(MockEngine::new());
        let mut web = container(&mock, false);

        web.remove(&RemoveOptions::default()).unwrap();
        web.remove(&RemoveOptions::default()).unwrap();

        assert!(web.is_removed());
        assert_eq!(web.state().unwrap(), ContainerState::Removed);
        assert_eq!(mock.count("remove"), 1);
    }

    #[test]
    fn removed_handle_rejects_start_and_stop() {
        let mock = Arc::new(MockEngine::new());
        let mut web = container(&mock, false);
        web.remove(&RemoveOptions::default()).unwrap();

        let err = web.start().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ContainerError>(),
            Some(ContainerError::Removed { .. })
        ));
        assert!(web.stop(&StopOptions::default()).is_err());
        assert_eq!(mock.count("start"), 0);
        assert_eq!(mock.count("stop"), 0);
    }

    #[test]
    fn removed_handle_stops_inspecting() {
        let mock = Arc::new(MockEngine::new());
        let mut web = container(&mock, true);
        mock.set_ip(ID, "10.88.0.7");
        web.inspect().unwrap();

        web.remove(&RemoveOptions {
            force: true,
            ..RemoveOptions::default()
        })
        .unwrap();
        let inspections = mock.count("inspect");

        web.inspect().unwrap();
        assert_eq!(web.ip().unwrap().as_deref(), Some("10.88.0.7"));
        assert_eq!(mock.count("inspect"), inspections);
    }

    #[test]
    fn failed_remove_still_latches() {
        let mock = Arc::new(MockEngine::new());
        let mut web = container(&mock, false);
        mock.set_fail_on("remove");

        assert!(web.remove(&RemoveOptions::default()).is_err());
        assert!(web.is_removed());
        assert_eq!(web.state().unwrap(), ContainerState::Removed);
        // the engine still has it
        assert!(mock.container_exists(ID));
    }

    #[test]
    fn start_is_not_guarded_locally() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, true);

        web.start().unwrap();
        assert_eq!(mock.count("start"), 1);
    }

    #[test]
    fn handles_do_not_share_snapshots() {
        let mock = Arc::new(MockEngine::new());
        let mut first = container(&mock, true);
        let mut second = first.clone();

        first.remove(&RemoveOptions::default()).unwrap();

        assert!(!second.is_removed());
        assert!(second.state().is_err());
    }

    #[test]
    fn ip_reads_network_settings() {
        let mock = Arc::new(MockEngine::new());
        let mut web = container(&mock, true);
        assert_eq!(web.ip().unwrap(), None);

        mock.set_ip(ID, "10.88.0.7");
        assert_eq!(web.ip().unwrap().as_deref(), Some("10.88.0.7"));
    }

    #[test]
    fn identity_accessors() {
        let mock = Arc::new(MockEngine::new());
        mock.add_image("ee44", &["nginx:latest"], None);
        let web = container(&mock, true);

        assert_eq!(web.short_id(), "4f3a9c2b1d0e");
        assert_eq!(web.name(), Some("web"));
        assert_eq!(web.image_id(), "nginx:latest");
        assert!(web.image().unwrap().is_none());
    }

    #[test]
    fn image_resolves_through_reported_image_id() {
        let mock = Arc::new(MockEngine::new());
        mock.add_image("ee44", &["nginx:latest"], None);
        mock.add_container_record(ContainerRecord {
            id: ID.to_string(),
            names: vec!["/web".to_string()],
            image: "nginx:latest".to_string(),
            image_id: Some("ee44".to_string()),
            ..ContainerRecord::default()
        });
        let web = ContainerCatalog::new(Connection::new(mock.clone()), true)
            .unwrap()
            .get("web")
            .unwrap();

        assert_eq!(web.image_id(), "ee44");
        assert_eq!(web.image().unwrap().unwrap().tags, vec!["nginx:latest"]);
    }

    #[test]
    fn exec_returns_output_on_success() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, true);
        mock.set_exec_result("echo", 0, "hi\n");

        let output = web.exec(&["echo", "hi"], &ExecOptions::default()).unwrap();
        assert_eq!(output, "hi\n");

        let commands = mock.get_commands();
        assert!(commands.contains(&format!("exec_create:{ID}:echo hi")));
        assert_eq!(mock.count("exec_start"), 1);
        assert_eq!(mock.count("exec_inspect"), 1);
    }

    #[test]
    fn exec_non_zero_exit_is_structured_failure() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, true);
        mock.set_exec_result("echo", 7, "hi\n");

        let err = web.exec(&["echo", "hi"], &ExecOptions::default()).unwrap_err();
        let exec = err.downcast_ref::<ExecError>().unwrap();
        assert_eq!(exec.command, "echo");
        assert_eq!(exec.args, vec!["echo", "hi"]);
        assert_eq!(exec.code, 7);
        assert_eq!(exec.output, "hi\n");
    }

    #[test]
    fn exec_without_exit_code_fails() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, true);
        mock.set_exec_without_exit_code("true");

        let err = web.exec(&["true"], &ExecOptions::default()).unwrap_err();
        assert_eq!(err.downcast_ref::<ExecError>().unwrap().code, -1);
    }

    #[test]
    fn exec_transport_error_is_not_exec_failure() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, true);
        mock.set_fail_on("exec_start");

        let err = web.exec(&["echo", "hi"], &ExecOptions::default()).unwrap_err();
        assert!(err.downcast_ref::<ExecError>().is_none());
    }

    #[test]
    fn exec_rejects_empty_command() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, true);

        let empty: [&str; 0] = [];
        assert!(web.exec(&empty, &ExecOptions::default()).is_err());
        assert_eq!(mock.count("exec_create"), 0);
    }

    #[test]
    fn scoped_starts_stopped_container_and_stops_on_release() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, false);

        let scope = web.scoped().unwrap();
        assert_eq!(mock.is_running(ID), Some(true));

        scope.release().unwrap();
        assert_eq!(mock.is_running(ID), Some(false));
        assert!(mock.container_exists(ID));
    }

    #[test]
    fn scoped_does_not_restart_running_container() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, true);

        let scope = web.scoped().unwrap();
        assert_eq!(mock.count("start"), 0);
        drop(scope);

        assert_eq!(mock.count("stop"), 1);
    }

    #[test]
    fn scoped_drop_stops_and_removes_flagged_container() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, false).with_remove_on_exit(true);

        {
            let _scope = web.scoped().unwrap();
        }

        let commands = mock.get_commands();
        let stop = commands.iter().position(|c| c == &format!("stop:{ID}")).unwrap();
        let remove = commands.iter().position(|c| c == &format!("remove:{ID}")).unwrap();
        assert!(stop < remove);
        assert!(!mock.container_exists(ID));
    }

    #[test]
    fn scoped_cleanup_runs_once() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, false).with_remove_on_exit(true);

        web.scoped().unwrap().release().unwrap();

        assert_eq!(mock.count("stop"), 1);
        assert_eq!(mock.count("remove"), 1);
    }

    #[test]
    fn failed_start_still_cleans_up() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, false).with_remove_on_exit(true);
        mock.set_fail_on("start");

        assert!(web.scoped().is_err());
        assert!(!mock.container_exists(ID));
    }

    #[test]
    fn run_scoped_cleans_up_before_propagating_body_error() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, false).with_remove_on_exit(true);

        let result: Result<()> = web.run_scoped(|c| {
            assert_eq!(c.state()?, ContainerState::Running);
            bail!("corpo falhou")
        });

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "corpo falhou");
        assert_eq!(mock.count("stop"), 1);
        assert!(!mock.container_exists(ID));
    }

    #[test]
    fn run_scoped_body_error_wins_over_cleanup_error() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, false);

        let result: Result<()> = web.run_scoped(|_| {
            mock.set_fail_on("stop");
            bail!("corpo falhou")
        });

        assert_eq!(result.unwrap_err().to_string(), "corpo falhou");
    }

    #[test]
    fn run_scoped_reports_cleanup_error_after_success() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, false);

        let result = web.run_scoped(|_| {
            mock.set_fail_on("stop");
            Ok(42)
        });

        assert!(result.is_err());
    }

    #[test]
    fn run_scoped_returns_body_value() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, false).with_stop_options(StopOptions { timeout: Some(3) });
        mock.set_exec_result("hostname", 0, "web\n");

        let output = web
            .run_scoped(|c| c.exec(&["hostname"], &ExecOptions::default()))
            .unwrap();

        assert_eq!(output, "web\n");
        assert!(mock.get_commands().contains(&format!("stop:{ID}:3")));
    }

    #[test]
    fn body_may_remove_the_container_itself() {
        let mock = Arc::new(MockEngine::new());
        let web = container(&mock, false).with_remove_on_exit(true);

        web.run_scoped(|c| c.remove(&RemoveOptions { force: true, volumes: false }))
            .unwrap();

        assert_eq!(mock.count("remove"), 1);
        assert_eq!(mock.count("stop"), 0);
    }
}
