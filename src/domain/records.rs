//! Raw records as reported by the engine, plus the option structs passed back
//! to it. Field names follow the engine's JSON (PascalCase); podman's
//! lower-case variants are accepted as aliases where the two disagree.

use chrono::DateTime;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Tag the engine reports for dangling images.
pub const UNTAGGED: &str = "<none>:<none>";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parent_id: String,
    /// Epoch seconds.
    #[serde(default, deserialize_with = "epoch_seconds")]
    pub created: i64,
    #[serde(default)]
    pub size: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub virtual_size: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
    /// May contain [`UNTAGGED`].
    #[serde(default, deserialize_with = "null_as_default")]
    pub repo_tags: Vec<String>,
    /// Podman reports the tags here, fully qualified, and leaves `RepoTags`
    /// null.
    #[serde(default, deserialize_with = "null_as_default")]
    pub names: Vec<String>,
}

impl ImageRecord {
    /// `RepoTags` when the engine filled it, `Names` otherwise.
    pub fn tags(&self) -> &[String] {
        if self.repo_tags.is_empty() {
            &self.names
        } else {
            &self.repo_tags
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerRecord {
    #[serde(default)]
    pub id: String,
    /// Docker prefixes every name with `/`, podman does not.
    #[serde(default, deserialize_with = "null_as_default")]
    pub names: Vec<String>,
    /// Image reference the container was created from (name or id).
    #[serde(default)]
    pub image: String,
    #[serde(rename = "ImageID", default)]
    pub image_id: Option<String>,
    #[serde(default, deserialize_with = "command_line")]
    pub command: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<PortRecord>,
    #[serde(default, deserialize_with = "epoch_seconds")]
    pub created: i64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PortRecord {
    #[serde(rename = "IP", alias = "host_ip", default)]
    pub ip: Option<String>,
    #[serde(rename = "PrivatePort", alias = "container_port", default)]
    pub private_port: u16,
    #[serde(rename = "PublicPort", alias = "host_port", default)]
    pub public_port: Option<u16>,
    #[serde(rename = "Type", alias = "protocol", default)]
    pub protocol: String,
}

/// Full inspect payload. Only the parts the object model reads are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: Option<StateFlags>,
    #[serde(default)]
    pub network_settings: Option<NetworkSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateFlags {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub restarting: bool,
    #[serde(rename = "OOMKilled", default)]
    pub oom_killed: bool,
    #[serde(default)]
    pub dead: bool,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub exit_code: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NetworkSettings {
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HistoryRecord {
    #[serde(rename = "Id", alias = "id", default)]
    pub id: String,
    #[serde(
        rename = "Created",
        alias = "created",
        default,
        deserialize_with = "epoch_seconds"
    )]
    pub created: i64,
    #[serde(rename = "CreatedBy", alias = "createdBy", default)]
    pub created_by: String,
    #[serde(rename = "Size", alias = "size", default)]
    pub size: u64,
    #[serde(
        rename = "Tags",
        alias = "tags",
        default,
        deserialize_with = "null_as_default"
    )]
    pub tags: Vec<String>,
    #[serde(rename = "Comment", alias = "comment", default)]
    pub comment: String,
}

/// Engine version, resolved once per connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerVersion {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(alias = "APIVersion", default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub kernel_version: Option<String>,
    #[serde(default)]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub go_version: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DaemonInfo {
    /// Storage driver.
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub containers: Option<u64>,
    #[serde(default)]
    pub images: Option<u64>,
    #[serde(default)]
    pub kernel_version: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatedContainer {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecInspect {
    #[serde(default)]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub running: bool,
}

/// Creation parameters, borrowed from the caller for the duration of the call.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec<'a> {
    pub name: Option<&'a str>,
    pub command: &'a [String],
    pub ports: &'a [String],
    pub env: &'a [String],
    pub network: Option<&'a str>,
    pub userns: Option<&'a str>,
    pub security_opt: Option<&'a str>,
    pub workdir: Option<&'a str>,
    pub volumes: &'a [String],
    pub extra_args: &'a [&'a str],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopOptions {
    /// Seconds to wait before killing. Engine default when `None`.
    pub timeout: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    pub force: bool,
    pub volumes: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    pub user: Option<String>,
    pub workdir: Option<String>,
    pub env: Vec<String>,
    pub privileged: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandLine {
    Text(String),
    Argv(Vec<String>),
}

// docker reports the command as a string, podman as an argv list
fn command_line<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<CommandLine>::deserialize(deserializer)? {
        Some(CommandLine::Text(text)) => text,
        Some(CommandLine::Argv(argv)) => argv.join(" "),
        None => String::new(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Epoch(i64),
    Text(String),
}

fn epoch_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Timestamp>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Timestamp::Epoch(secs)) => Ok(secs),
        Some(Timestamp::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.timestamp())
            .map_err(serde::de::Error::custom),
    }
}
