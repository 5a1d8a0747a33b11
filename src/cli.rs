pub mod engine;

pub use engine::EngineCommand;
