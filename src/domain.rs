mod error;
pub mod records;
mod state;
pub mod traits;

pub use error::{ContainerError, ExecError};
pub use records::{
    ContainerInspect, ContainerRecord, ContainerSpec, CreatedContainer, DaemonInfo, ExecInspect,
    ExecOptions, HistoryRecord, ImageRecord, NetworkSettings, PortRecord, RemoveOptions,
    ServerVersion, StateFlags, StopOptions,
};
pub use state::ContainerState;
pub use traits::EngineClient;

/// Length of the abbreviated id shown for images, layers and containers.
pub const SHORT_ID_LEN: usize = 12;

/// First [`SHORT_ID_LEN`] characters of `id`, or the whole id when shorter.
///
/// Not collision-checked: two ids sharing a prefix share a short id.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Prefixes the engine puts in front of Docker Hub references, most specific first.
const HUB_PREFIXES: [&str; 2] = ["docker.io/library/", "docker.io/"];

/// `reference` without its Docker Hub prefix, `None` when it carries none.
///
/// `docker.io/library/alpine:3.18` gives `alpine:3.18` and
/// `docker.io/bitnami/redis:7` gives `bitnami/redis:7`.
pub fn hub_short_reference(reference: &str) -> Option<&str> {
    HUB_PREFIXES
        .iter()
        .find_map(|prefix| reference.strip_prefix(prefix))
        .filter(|short| !short.is_empty())
}
