use std::{
    collections::HashMap,
    ffi::{OsStr, OsString},
    path::Path,
};

use log::{debug, warn};

use crate::{
    config::Config,
    engine::{
        label, BuildLine, BuildStream, ContainerEngine, ContainerSpec, ContainerSummary, LogStream,
    },
    process::{self, Stream},
    Result,
};

/// [`ContainerEngine`] implemented by running the `docker` command line client against the daemon at `host`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    host: String,
}

impl DockerCli {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Talks to the daemon configured in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.docker_url.as_str())
    }

    /// Returns the docker command where the daemon address has already been set.
    fn docker(&self) -> process::Command {
        process::command!("docker", "--host", self.host)
    }

    fn docker_with(&self, args: &[OsString]) -> process::Command {
        self.docker().args(args.iter().map(OsString::as_os_str))
    }
}

fn build_args(context: &Path, tag: &str, no_cache: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "build".into(),
        // Remove intermediate containers, also when the build fails.
        "--rm".into(),
        "--force-rm".into(),
        "--tag".into(),
        tag.into(),
    ];
    if no_cache {
        args.push("--no-cache".into());
    }
    args.push(context.into());
    args
}

fn create_args(spec: &ContainerSpec) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["create".into()];
    if let Some(working_dir) = &spec.working_dir {
        args.push("--workdir".into());
        args.push(working_dir.into());
    }
    for (key, value) in &spec.env {
        args.push("--env".into());
        args.push(format!("{key}={value}").into());
    }
    for bind in &spec.binds {
        args.push("--volume".into());
        args.push(bind.to_string().into());
    }
    for (key, value) in &spec.labels {
        args.push("--label".into());
        args.push(format!("{key}={value}").into());
    }
    args.push(spec.image.as_str().into());
    args.extend(spec.command.iter().map(OsString::from));
    args
}

fn logs_args(id: &str, timestamps: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["logs".into(), "--follow".into()];
    if timestamps {
        args.push("--timestamps".into());
    }
    args.push(id.into());
    args
}

/// Progress of `docker build`. The docker client reports failures on stderr and through its exit status, these are
/// turned into a trailing [`BuildLine::Error`].
struct DockerBuild {
    lines: Option<process::Lines>,
    stderr: Vec<String>,
}

impl DockerBuild {
    fn failure(&self, status: process::ExitStatus) -> Option<BuildLine> {
        if status.status.success() {
            return None;
        }

        let message = self
            .stderr
            .iter()
            .rev()
            .find(|line| !line.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| match status.status.code() {
                Some(code) => format!("docker build exited with code {code}"),
                None => "docker build was terminated".to_owned(),
            });
        let detail = (!self.stderr.is_empty()).then(|| self.stderr.join("\n"));
        Some(BuildLine::Error { message, detail })
    }
}

impl Iterator for DockerBuild {
    type Item = BuildLine;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        if let Some((stream, line)) = lines.next() {
            if stream == Stream::Stderr {
                self.stderr.push(line.clone());
            }
            return Some(BuildLine::Stream(line));
        }

        match self.lines.take()?.finish() {
            Ok(status) => self.failure(status),
            Err(error) => Some(BuildLine::Error {
                message: error.to_string(),
                detail: None,
            }),
        }
    }
}

/// Output of `docker logs --follow`, stdout and stderr of the container in the order they were written.
struct DockerLogs {
    lines: Option<process::Lines>,
}

impl Iterator for DockerLogs {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        if let Some((_, line)) = lines.next() {
            return Some(line);
        }

        // The logs being unavailable does not affect the outcome of the build, only report it.
        if let Err(error) = self.lines.take()?.finish().and_then(process::ExitStatus::require_success) {
            warn!("{error}");
        }
        None
    }
}

/// Partial representation of the JSON emitted by `docker inspect`.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Inspect {
    id: String,
    #[serde(with = "time::serde::rfc3339")]
    created: time::OffsetDateTime,
    state: InspectState,
    config: InspectConfig,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    exit_code: i64,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

fn parse_inspect(json: &[u8]) -> Result<Vec<ContainerSummary>> {
    let containers: Vec<Inspect> = serde_json::from_slice(json)?;
    Ok(containers
        .into_iter()
        .map(|container| {
            let mut labels = container.config.labels.unwrap_or_default();
            ContainerSummary {
                id: container.id,
                phase: labels.remove(label::PHASE),
                build_dir: labels.remove(label::BUILD_DIR),
                state: container.state.status,
                exit_code: container.state.exit_code,
                created: container.created,
            }
        })
        .collect())
}

impl ContainerEngine for DockerCli {
    fn build_image(&self, context: &Path, tag: &str, no_cache: bool) -> Result<BuildStream> {
        // The classic builder honours `--rm`/`--force-rm` and reports progress as plain lines.
        let lines = self
            .docker_with(&build_args(context, tag, no_cache))
            .env("DOCKER_BUILDKIT", "0")
            .spawn_lines()?;
        Ok(Box::new(DockerBuild {
            lines: Some(lines),
            stderr: Vec::new(),
        }))
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let output = self.docker_with(&create_args(spec)).output()?;
        let id = output.stdout_trimmed()?;
        if id.is_empty() {
            return Err("docker create did not print a container id".into());
        }
        Ok(id.to_owned())
    }

    fn start_container(&self, id: &str) -> Result<()> {
        process::args!(self.docker(), "start", id).output()?;
        Ok(())
    }

    fn container_logs(&self, id: &str, timestamps: bool) -> Result<LogStream> {
        // One pipe for both streams so that the container output keeps its order.
        let lines = self
            .docker_with(&logs_args(id, timestamps))
            .spawn_combined_lines()?;
        Ok(Box::new(DockerLogs { lines: Some(lines) }))
    }

    fn wait_container(&self, id: &str) -> Result<i64> {
        let output = process::args!(self.docker(), "wait", id).output()?;
        let code = output.stdout_trimmed()?;
        Ok(code
            .parse::<i64>()
            .map_err(|error| format!("unexpected output {code:?} from docker wait: {error}"))?)
    }

    fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let command = if force {
            process::args!(self.docker(), "rm", "--force", id)
        } else {
            process::args!(self.docker(), "rm", id)
        };
        command.output()?;
        Ok(())
    }

    fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let output = process::args!(
            self.docker(),
            "ps",
            "--all",
            "--quiet",
            "--no-trunc",
            "--filter",
            format!("label={}", label::PHASE),
        )
        .output()?;

        let ids: Vec<&str> = output.stdout_trimmed()?.lines().collect();
        debug!("found {} dbuild containers", ids.len());
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let output = self
            .docker()
            .args(std::iter::once(OsStr::new("inspect")).chain(ids.iter().map(|id| OsStr::new(*id))))
            .output()?;
        parse_inspect(&output.stdout)
    }
}
