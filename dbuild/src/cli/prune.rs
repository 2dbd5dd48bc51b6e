use std::path::{Path, PathBuf};

use clap::Args;
use log::info;

use crate::{engine::ContainerEngine, engine::ContainerSummary, Result};

#[derive(Debug, Args)]
pub struct PruneArgs {
    /// Only remove containers that built packages in this directory.
    #[arg(long = "build-dir")]
    pub build_dir: Option<PathBuf>,
}

fn is_prunable(container: &ContainerSummary, build_dir: Option<&Path>) -> bool {
    if container.is_running() {
        return false;
    }
    match build_dir {
        Some(build_dir) => container
            .build_dir
            .as_deref()
            .is_some_and(|value| Path::new(value) == build_dir),
        None => true,
    }
}

/// Removes the containers that are not running, optionally limited to one build directory. Returns the removed ids.
pub fn remove_stopped<E: ContainerEngine + ?Sized>(
    engine: &E,
    build_dir: Option<&Path>,
) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for container in engine.list_containers()? {
        if is_prunable(&container, build_dir) {
            engine.remove_container(&container.id, true)?;
            removed.push(container.id);
        }
    }
    Ok(removed)
}

pub fn prune<E: ContainerEngine + ?Sized>(engine: &E, args: PruneArgs) -> Result<()> {
    // Containers are labelled with the canonical build directory.
    let build_dir = args
        .build_dir
        .map(|path| std::fs::canonicalize(&path).unwrap_or(path));

    let removed = remove_stopped(engine, build_dir.as_deref())?;
    for id in &removed {
        println!("{id}");
    }
    info!("Removed {} container(s)", removed.len());

    Ok(())
}
