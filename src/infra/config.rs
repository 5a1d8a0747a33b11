use crate::domain::StopOptions;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LSM_TOML_NAME: &str = "lsm.toml";
pub const DEFAULT_ENGINE_BINARY: &str = "podman";

pub fn default_config_dir() -> PathBuf {
    PathBuf::from(shellexpand::tilde("~/.config/lsm").into_owned())
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub binary: Option<String>,
    /// Remote endpoint; the engine's own default when unset
    pub url: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct ContainersConfig {
    pub all: Option<bool>,
    pub pull: Option<bool>,
    pub stop_timeout: Option<u32>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub containers: ContainersConfig,
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Merges another AppConfig into self.
    /// Values from `other` overwrite values in `self` if present.
    pub fn merge(&mut self, other: AppConfig) {
        if let Some(binary) = other.engine.binary {
            self.engine.binary = Some(binary);
        }
        if let Some(url) = other.engine.url {
            self.engine.url = Some(url);
        }
        if let Some(all) = other.containers.all {
            self.containers.all = Some(all);
        }
        if let Some(pull) = other.containers.pull {
            self.containers.pull = Some(pull);
        }
        if let Some(timeout) = other.containers.stop_timeout {
            self.containers.stop_timeout = Some(timeout);
        }
        if let Some(level) = other.log_level {
            self.log_level = Some(level);
        }
    }

    pub fn binary(&self) -> &str {
        self.engine.binary.as_deref().unwrap_or(DEFAULT_ENGINE_BINARY)
    }

    pub fn list_all(&self) -> bool {
        self.containers.all.unwrap_or(true)
    }

    pub fn pull(&self) -> bool {
        self.containers.pull.unwrap_or(true)
    }

    pub fn stop_options(&self) -> StopOptions {
        StopOptions {
            timeout: self.containers.stop_timeout,
        }
    }
}

fn read_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path).with_context(|| format!("lendo {:?}", path))?;
    toml::from_str(&content).with_context(|| format!("parse de {:?}", path))
}

/// Global `lsm.toml` from `config_dir`, overridden by `./lsm.toml`
pub fn load_app_config(config_dir: &Path) -> Result<AppConfig> {
    load_layered(config_dir, Path::new("./"))
}

fn load_layered(config_dir: &Path, local_dir: &Path) -> Result<AppConfig> {
    let mut app_config = AppConfig::default();

    let global_config_path = config_dir.join(DEFAULT_LSM_TOML_NAME);
    if global_config_path.exists() {
        app_config = read_config(&global_config_path)?;
    }

    let local_config_path = local_dir.join(DEFAULT_LSM_TOML_NAME);
    if local_config_path.exists() {
        app_config.merge(read_config(&local_config_path)?);
    }

    if let Some(url) = app_config.engine.url.take() {
        let expanded = shellexpand::full(&url)
            .with_context(|| format!("expandindo url do engine {url:?}"))?
            .into_owned();
        app_config.engine.url = Some(expanded);
    }

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_full_config() {
        let toml = r#"
log_level = "debug"

[engine]
binary = "/usr/bin/podman"
url = "unix:///run/podman/podman.sock"

[containers]
all = false
pull = false
stop_timeout = 5
"#;

        let config: AppConfig = toml::from_str(toml).unwrap();

        assert_eq!(config.binary(), "/usr/bin/podman");
        assert_eq!(
            config.engine.url.as_deref(),
            Some("unix:///run/podman/podman.sock")
        );
        assert!(!config.list_all());
        assert!(!config.pull());
        assert_eq!(config.stop_options().timeout, Some(5));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();

        assert_eq!(config.binary(), "podman");
        assert!(config.list_all());
        assert!(config.pull());
        assert_eq!(config.stop_options(), StopOptions::default());
    }

    #[test]
    fn rejects_wrong_types() {
        let result = toml::from_str::<AppConfig>("[containers]\nstop_timeout = \"dez\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn merge_overrides_only_present_fields() {
        let mut base: AppConfig = toml::from_str(
            "[engine]\nbinary = \"docker\"\n[containers]\nstop_timeout = 30\n",
        )
        .unwrap();
        let local: AppConfig = toml::from_str("[containers]\npull = false\n").unwrap();

        base.merge(local);

        assert_eq!(base.binary(), "docker");
        assert_eq!(base.containers.stop_timeout, Some(30));
        assert!(!base.pull());
    }

    #[test]
    fn local_file_wins_over_global() {
        let global = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        fs::write(
            global.path().join(DEFAULT_LSM_TOML_NAME),
            "log_level = \"info\"\n[containers]\nall = false\n",
        )
        .unwrap();
        fs::write(
            local.path().join(DEFAULT_LSM_TOML_NAME),
            "log_level = \"trace\"\n",
        )
        .unwrap();

        let config = load_layered(global.path(), local.path()).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("trace"));
        assert!(!config.list_all());
    }

    #[test]
    fn missing_files_give_defaults() {
        let global = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();

        let config = load_layered(global.path(), local.path()).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn invalid_file_is_reported_with_path() {
        let global = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        fs::write(global.path().join(DEFAULT_LSM_TOML_NAME), "[engine\n").unwrap();

        let err = load_layered(global.path(), local.path()).unwrap_err();
        assert!(err.to_string().contains("lsm.toml"));
    }

    #[test]
    fn expands_variables_in_url() {
        let global = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        // SAFETY: the variable name is unique to this test
        unsafe { std::env::set_var("LSM_TEST_SOCKET_DIR", "/run/user/1000") };
        fs::write(
            global.path().join(DEFAULT_LSM_TOML_NAME),
            "[engine]\nurl = \"unix://$LSM_TEST_SOCKET_DIR/podman/podman.sock\"\n",
        )
        .unwrap();

        let config = load_layered(global.path(), local.path()).unwrap();
        assert_eq!(
            config.engine.url.as_deref(),
            Some("unix:///run/user/1000/podman/podman.sock")
        );
    }
}
