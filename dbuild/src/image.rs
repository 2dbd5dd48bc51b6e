//! Provisioning of the image in which packages are built.

use std::{fmt, io, path::Path};

use log::{debug, info, warn};
use tempfile::TempDir;

use crate::{
    config::Config,
    engine::{BuildLine, BuildStream, ContainerEngine},
    Result,
};

const DOCKERFILE_TEMPLATE: &str = include_str!("../templates/Dockerfile");
const MAINTAINER: &str = "dbuild, dbuild@test.com";

/// Helper scripts copied verbatim into `scripts/` of the build context.
const SCRIPTS: &[(&str, &str)] = &[("setup.sh", include_str!("../scripts/setup.sh"))];

/// Replaces every `{{ key }}` in the template with its value. Unknown placeholders are left alone.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_owned(), |out, (key, value)| {
            out.replace(&format!("{{{{ {key} }}}}"), value)
        })
}

pub fn render_dockerfile(dist: &str, release: &str, proxy: &str) -> String {
    let proxy_env = if proxy.is_empty() {
        String::new()
    } else {
        format!("ENV http_proxy={proxy:?} https_proxy={proxy:?}")
    };

    render(
        DOCKERFILE_TEMPLATE,
        &[
            ("dist", dist),
            ("release", release),
            ("maintainer", MAINTAINER),
            ("proxy_env", &proxy_env),
        ],
    )
}

/// Writes the Dockerfile and the helper scripts into `dir`.
pub fn write_context(dir: &Path, dist: &str, release: &str, proxy: &str) -> io::Result<()> {
    std::fs::write(dir.join("Dockerfile"), render_dockerfile(dist, release, proxy))?;

    let scripts_dir = dir.join("scripts");
    std::fs::create_dir(&scripts_dir)?;
    for (name, contents) in SCRIPTS {
        let path = scripts_dir.join(name);
        std::fs::write(&path, contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }
    }

    Ok(())
}

/// The engine reported an error while building the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuildFailed {
    pub message: String,
    pub detail: Option<String>,
}

impl fmt::Display for ImageBuildFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message.trim_end())?;
        if let Some(detail) = &self.detail {
            let detail = detail.trim_end();
            if !detail.is_empty() && detail != self.message.trim_end() {
                write!(f, "\n{detail}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ImageBuildFailed {}

/// A running image build. Yields the build output line by line and fails with [`ImageBuildFailed`] on the first error
/// reported by the engine, after which it yields nothing. The build context is removed when this value is dropped.
pub struct ImageBuild {
    tag: String,
    stream: Option<BuildStream>,
    context: Option<TempDir>,
}

impl fmt::Debug for ImageBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuild")
            .field("tag", &self.tag)
            .field("finished", &self.stream.is_none())
            .finish_non_exhaustive()
    }
}

impl ImageBuild {
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl Drop for ImageBuild {
    fn drop(&mut self) {
        // The engine may still be reading the context.
        self.stream = None;
        if let Some(context) = self.context.take() {
            let path = context.path().to_owned();
            if let Err(error) = context.close() {
                warn!(
                    "failed to remove build context {path}: {error}",
                    path = path.display()
                );
            }
        }
    }
}

impl Iterator for ImageBuild {
    type Item = Result<String, ImageBuildFailed>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.stream.as_mut()?.next() {
            Some(BuildLine::Stream(line)) => Some(Ok(line)),
            Some(BuildLine::Error { message, detail }) => {
                self.stream = None;
                Some(Err(ImageBuildFailed { message, detail }))
            }
            None => {
                self.stream = None;
                None
            }
        }
    }
}

/// Renders a fresh build context and starts building the image for the configured distribution and release.
pub fn build_image<E: ContainerEngine + ?Sized>(
    engine: &E,
    config: &Config,
    proxy: &str,
    build_cache: bool,
) -> Result<ImageBuild> {
    let tag = config.image_tag();
    let context = tempfile::Builder::new().prefix("dbuild-").tempdir()?;
    debug!("build context: {}", context.path().display());

    write_context(context.path(), &config.dist, &config.release, proxy)?;

    info!("Building image {tag}");
    let stream = engine.build_image(context.path(), &tag, !build_cache)?;

    Ok(ImageBuild {
        tag,
        stream: Some(stream),
        context: Some(context),
    })
}
