//! The operations dbuild needs from a container engine. See [`crate::docker::DockerCli`] for the implementation
//! backed by the docker command line.

use std::{fmt, path::Path, path::PathBuf};

use crate::Result;

/// An item of the progress stream of an image build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildLine {
    Stream(String),
    /// The build failed. Nothing follows an error.
    Error {
        message: String,
        detail: Option<String>,
    },
}

/// Finite, non-restartable stream of image build progress.
pub type BuildStream = Box<dyn Iterator<Item = BuildLine> + Send>;

/// Combined stdout and stderr of a container. Ends when the container stops producing output, which does not imply
/// that the container has exited.
pub type LogStream = Box<dyn Iterator<Item = String> + Send>;

/// A host directory made visible inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub host: PathBuf,
    pub container: String,
}

impl fmt::Display for Bind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{host}:{container}",
            host = self.host.display(),
            container = self.container
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<String>,
    pub binds: Vec<Bind>,
    pub labels: Vec<(String, String)>,
}

/// A container created by dbuild, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub phase: Option<String>,
    pub build_dir: Option<String>,
    /// Engine state, e.g. `created`, `running`, `exited`.
    pub state: String,
    pub exit_code: i64,
    pub created: time::OffsetDateTime,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        matches!(self.state.as_str(), "running" | "restarting")
    }
}

/// Labels put on every build container so that they can be found again.
pub mod label {
    pub const PHASE: &str = "dbuild.phase";
    pub const BUILD_DIR: &str = "dbuild.build-dir";
}

pub trait ContainerEngine {
    /// Builds the image in `context` and tags it. The returned stream must be drained for the build to complete.
    fn build_image(&self, context: &Path, tag: &str, no_cache: bool) -> Result<BuildStream>;

    /// Creates, but does not start, a container. Returns its id.
    fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    fn start_container(&self, id: &str) -> Result<()>;

    fn container_logs(&self, id: &str, timestamps: bool) -> Result<LogStream>;

    /// Blocks until the container exits and returns its exit code.
    fn wait_container(&self, id: &str) -> Result<i64>;

    fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Lists all containers, running or not, that carry the [`label::PHASE`] label.
    fn list_containers(&self) -> Result<Vec<ContainerSummary>>;
}
