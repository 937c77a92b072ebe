// autosync-daemon library entry point.

pub mod config;
pub mod engine;
pub mod git;
pub mod startup;
pub mod watcher;

pub use engine::{start_engine, EngineConfig, EngineEvent, EngineHandle};
