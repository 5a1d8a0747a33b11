use super::records::{
    ContainerInspect, ContainerRecord, ContainerSpec, CreatedContainer, DaemonInfo, ExecInspect,
    ExecOptions, HistoryRecord, ImageRecord, RemoveOptions, ServerVersion, StopOptions,
};
use anyhow::Result;
use std::fmt::Debug;

/// Low-level engine operations the object model is built on.
///
/// Implementations own the transport. Errors they return are propagated
/// unchanged by catalogs and containers.
pub trait EngineClient: Send + Sync + Debug {
    /// List images; `all` includes intermediate layers
    fn list_images(&self, all: bool) -> Result<Vec<ImageRecord>>;

    /// List containers; `all` includes stopped ones
    fn list_containers(&self, all: bool) -> Result<Vec<ContainerRecord>>;

    /// Create a container from an image reference or id
    fn create_container(&self, image: &str, spec: &ContainerSpec) -> Result<CreatedContainer>;

    fn start_container(&self, id: &str) -> Result<()>;

    fn stop_container(&self, id: &str, options: &StopOptions) -> Result<()>;

    fn remove_container(&self, id: &str, options: &RemoveOptions) -> Result<()>;

    /// Full state of one container
    fn inspect_container(&self, id: &str) -> Result<ContainerInspect>;

    /// Register an exec session and return its id
    fn exec_create(&self, id: &str, cmd: &[String], options: &ExecOptions) -> Result<String>;

    /// Run an exec session to completion and return its captured output.
    /// Engines that capture the two streams separately return stdout first,
    /// then stderr.
    fn exec_start(&self, exec_id: &str) -> Result<Vec<u8>>;

    fn exec_inspect(&self, exec_id: &str) -> Result<ExecInspect>;

    /// Build layers of an image, newest first
    fn image_history(&self, id: &str) -> Result<Vec<HistoryRecord>>;

    fn daemon_info(&self) -> Result<DaemonInfo>;

    fn daemon_version(&self) -> Result<ServerVersion>;

    /// Pull `reference:tag` from its registry
    fn pull(&self, reference: &str, tag: &str) -> Result<()>;

    /// Address of a remote engine, `None` for the local socket
    fn endpoint(&self) -> Option<String> {
        None
    }
}
