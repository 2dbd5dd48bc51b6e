use std::path::Path;

use log::debug;

use crate::{
    engine::{Bind, ContainerEngine, ContainerSpec, LogStream},
    Result,
};

pub struct CreateArgs<'a> {
    pub image: &'a str,
    pub command: Vec<String>,
    pub working_dir: &'a str,
    pub env: &'a [(&'a str, &'a str)],
    /// Pairs of host path and the path at which it is visible inside the container.
    pub shared_volumes: &'a [(&'a Path, &'a str)],
    pub labels: &'a [(&'a str, &'a str)],
}

fn binds(shared_volumes: &[(&Path, &str)]) -> Vec<Bind> {
    shared_volumes
        .iter()
        .map(|&(host, container)| Bind {
            host: host.to_owned(),
            container: container.to_owned(),
        })
        .collect()
}

fn to_owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|&(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

// The arguments accepted here are borrowed for convenience of the caller, the engine receives an owned spec.
fn into_spec(args: CreateArgs) -> ContainerSpec {
    let CreateArgs {
        image,
        command,
        working_dir,
        env,
        shared_volumes,
        labels,
    } = args;
    ContainerSpec {
        image: image.to_owned(),
        command,
        env: to_owned_pairs(env),
        working_dir: Some(working_dir.to_owned()),
        binds: binds(shared_volumes),
        labels: to_owned_pairs(labels),
    }
}

/// A container created through a [`ContainerEngine`]. The container is not removed on drop, removal is always an
/// explicit decision, see [`Container::remove`].
pub struct Container<'e, E: ContainerEngine + ?Sized> {
    engine: &'e E,
    id: String,
}

impl<'e, E: ContainerEngine + ?Sized> Container<'e, E> {
    /// Creates but does not start the container. Engine errors are returned unchanged.
    pub fn create(engine: &'e E, args: CreateArgs) -> Result<Self> {
        let id = engine.create_container(&into_spec(args))?;
        debug!("created container {id}");
        Ok(Self { engine, id })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start(&self) -> Result<()> {
        self.engine.start_container(&self.id)
    }

    /// Follows the output of the container. Only meant for display: the stream ending does not mean the container
    /// exited, use [`Container::wait`] for that.
    pub fn logs(&self, timestamps: bool) -> Result<LogStream> {
        self.engine.container_logs(&self.id, timestamps)
    }

    /// Blocks until the container exits and returns its exit code.
    pub fn wait(&self) -> Result<i64> {
        let code = self.engine.wait_container(&self.id)?;
        debug!("container {id} exited with code {code}", id = self.id);
        Ok(code)
    }

    pub fn remove(self, force: bool) -> Result<()> {
        self.engine.remove_container(&self.id, force)
    }
}
