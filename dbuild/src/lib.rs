pub(crate) mod command;
pub(crate) mod config;
pub(crate) mod container;
pub(crate) mod docker;
pub(crate) mod engine;
pub(crate) mod error;
pub(crate) mod image;
pub(crate) mod orchestrator;
pub(crate) mod process;
pub(crate) mod request;
pub(crate) mod shell;
pub mod time_ext;
pub(crate) mod version;

pub mod cli;

pub(crate) type Result<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;
