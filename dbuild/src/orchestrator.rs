//! Runs the build phases: provision the image, run the build command in a fresh container, decide what to do with
//! the container.

use std::{
    io::{self, Write},
    sync::Mutex,
    thread,
};

use log::{info, warn};

use crate::{
    command::BuildCommand,
    config::BUILD_ROOT,
    container::{Container, CreateArgs},
    engine::{label, ContainerEngine},
    error::{BuildError, PhaseFailure},
    image,
    request::{BuildRequest, ExtraFiles, Phase},
};

/// What happens to a build container once it exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    /// Force remove the container.
    Remove,
    /// Keep the container around for inspection.
    Keep,
}

/// Successful builds are always cleaned up. Failed builds are kept unless `force_rm` is set.
pub const fn cleanup_for(exit_code: i64, force_rm: bool) -> Cleanup {
    if exit_code == 0 || force_rm {
        Cleanup::Remove
    } else {
        Cleanup::Keep
    }
}

type Output = Mutex<Box<dyn Write + Send>>;

fn print(output: &Output, line: &str) -> io::Result<()> {
    let mut output = output.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    writeln!(output, "{line}")?;
    output.flush()
}

/// The result of running a build container to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub phase: Phase,
    pub success: bool,
    pub exit_code: i64,
    pub container_id: String,
    pub cleanup: Cleanup,
}

pub struct Orchestrator<'a, E: ContainerEngine + ?Sized> {
    engine: &'a E,
    request: &'a BuildRequest,
    /// Receives the image build output and the container logs.
    output: Output,
}

impl<'a, E: ContainerEngine + ?Sized> Orchestrator<'a, E> {
    /// Creates an orchestrator that prints the build output to stdout.
    pub fn new(engine: &'a E, request: &'a BuildRequest) -> Self {
        Self::with_output(engine, request, io::stdout())
    }

    pub fn with_output<W: Write + Send + 'static>(
        engine: &'a E,
        request: &'a BuildRequest,
        output: W,
    ) -> Self {
        Self {
            engine,
            request,
            output: Mutex::new(Box::new(output)),
        }
    }


    /// Builds the source package and, if that succeeded, the binary packages.
    pub fn run(&self) -> Result<Vec<BuildOutcome>, BuildError> {
        let source = self.run_phase(Phase::Source.as_str())?;
        let binary = self.run_phase(Phase::Binary.as_str())?;
        Ok(vec![source, binary])
    }

    /// Runs a single phase. A build that exits with a non-zero code results in [`BuildError::SourceBuildFailed`] or
    /// [`BuildError::BinaryBuildFailed`].
    pub fn run_phase(&self, phase: &str) -> Result<BuildOutcome, BuildError> {
        let outcome = self.execute(phase)?;
        if outcome.success {
            return Ok(outcome);
        }

        let failure = PhaseFailure {
            build_dir: self.request.build_dir.clone(),
            exit_code: outcome.exit_code,
            retained_container: (outcome.cleanup == Cleanup::Keep).then_some(outcome.container_id),
        };
        Err(BuildError::phase_failed(outcome.phase, failure))
    }

    fn execute(&self, phase: &str) -> Result<BuildOutcome, BuildError> {
        let (engine, request) = (self.engine, self.request);

        // Must fail on an unknown phase before touching the engine.
        let extra_files = ExtraFiles::probe(request);
        let command = BuildCommand::new(request, phase, &extra_files)?;
        let phase = command.phase;

        info!("Starting {phase} package build");

        let tag = {
            let mut build =
                image::build_image(engine, &request.config, &request.proxy, request.build_cache)?;
            for line in build.by_ref() {
                print(&self.output, &line?)?;
            }
            build.tag().to_owned()
        };

        let build_dir = request.build_dir.to_string_lossy();
        let container = Container::create(
            engine,
            CreateArgs {
                image: &tag,
                command: command.argv(),
                working_dir: &command.working_dir,
                env: &[("DEBIAN_FRONTEND", "noninteractive")],
                shared_volumes: &[(request.build_dir.as_path(), BUILD_ROOT)],
                labels: &[(label::PHASE, phase.as_str()), (label::BUILD_DIR, &*build_dir)],
            },
        )?;
        let id = container.id().to_owned();
        info!("Created container {id}");

        container.start()?;

        // The logs are only shown to the operator, `wait` decides the outcome.
        let logs = match container.logs(request.include_timestamps) {
            Ok(logs) => Some(logs),
            Err(error) => {
                warn!("can not show the output of container {id}: {error}");
                None
            }
        };
        let (output, printed_id) = (&self.output, id.as_str());
        let exit_code = thread::scope(|scope| {
            let printer = logs.map(|logs| {
                scope.spawn(move || {
                    for line in logs {
                        if let Err(error) = print(output, &line) {
                            warn!("failed to print the output of container {printed_id}: {error}");
                            break;
                        }
                    }
                })
            });
            let exit_code = container.wait();
            // Let the output catch up before reporting the outcome.
            if let Some(printer) = printer {
                if printer.join().is_err() {
                    warn!("printing the output of container {id} failed");
                }
            }
            exit_code
        })?;

        let cleanup = cleanup_for(exit_code, request.force_rm);
        let success = exit_code == 0;
        match (success, cleanup) {
            (true, _) => info!("Build successful (build type: {phase}), removing container {id}"),
            (false, Cleanup::Remove) => {
                info!("Build failed (build type: {phase}), removing container {id}")
            }
            (false, Cleanup::Keep) => {
                warn!("Build failed (build type: {phase}), keeping container {id}")
            }
        }
        if cleanup == Cleanup::Remove {
            container.remove(true)?;
        }

        Ok(BuildOutcome {
            phase,
            success,
            exit_code,
            container_id: id,
            cleanup,
        })
    }
}
