pub mod config;
pub mod podman_adapter;

pub use config::{AppConfig, default_config_dir, load_app_config};
pub use podman_adapter::PodmanAdapter;
