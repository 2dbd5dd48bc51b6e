//! Defaults shared by the command line interface and library callers.

pub const DEFAULT_DOCKER_URL: &str = "unix:///var/run/docker.sock";
pub const DEFAULT_DIST: &str = "ubuntu";
pub const DEFAULT_RELEASE: &str = "trusty";
pub const DEFAULT_SOURCE_DIR: &str = "source";
pub const DEFAULT_EXTRA_REPOS_FILE: &str = "repos";
pub const DEFAULT_EXTRA_REPO_KEYS_FILE: &str = "keys";

/// The path at which the build directory is mounted inside every build container.
pub const BUILD_ROOT: &str = "/build";

/// Settings that are the same for every build performed by one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub docker_url: String,
    pub dist: String,
    pub release: String,
    pub source_dir: String,
    pub extra_repos_file: String,
    pub extra_repo_keys_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_url: DEFAULT_DOCKER_URL.to_owned(),
            dist: DEFAULT_DIST.to_owned(),
            release: DEFAULT_RELEASE.to_owned(),
            source_dir: DEFAULT_SOURCE_DIR.to_owned(),
            extra_repos_file: DEFAULT_EXTRA_REPOS_FILE.to_owned(),
            extra_repo_keys_file: DEFAULT_EXTRA_REPO_KEYS_FILE.to_owned(),
        }
    }
}

impl Config {
    /// The tag of the image that builds packages for the configured distribution and release.
    pub fn image_tag(&self) -> String {
        format!(
            "dbuild-{dist}/{release}",
            dist = self.dist,
            release = self.release
        )
    }
}
