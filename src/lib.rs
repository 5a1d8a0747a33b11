pub mod cli;
pub mod domain;
pub mod infra;
pub mod services;

// Make test_support available for integration tests
pub mod test_support;

pub use domain::{ContainerError, ContainerState, EngineClient, ExecError};
pub use infra::PodmanAdapter;
pub use services::{
    Connection, Container, ContainerCatalog, CreateOptions, History, Image, ImageCatalog,
    ScopedContainer,
};
