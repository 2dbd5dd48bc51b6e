mod build;
mod list;
mod prune;

use clap::{Parser, Subcommand};

use crate::{config, docker::DockerCli, version::VERSION, Result};

#[derive(Debug, Parser)]
#[command(version = VERSION, about, subcommand_negates_reqs = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Docker daemon url, a unix socket or tcp url.
    #[arg(long = "docker-url", global = true, default_value = config::DEFAULT_DOCKER_URL)]
    docker_url: String,

    #[command(flatten)]
    build: build::BuildArgs,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the containers of past builds that are still around
    List,
    /// Remove the containers of past builds that are no longer running
    Prune(prune::PruneArgs),
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Some(Commands::List) => list::list(&DockerCli::new(self.docker_url))?,
            Some(Commands::Prune(args)) => prune::prune(&DockerCli::new(self.docker_url), args)?,
            None => build::build(&self.docker_url, self.build)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_dir_is_required_without_subcommand() {
        assert!(Cli::try_parse_from(["dbuild"]).is_err());
        assert!(Cli::try_parse_from(["dbuild", "list"]).is_ok());
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["dbuild", "--docker-url", "tcp://builder:2375", "list"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::List)));
        assert_eq!(cli.docker_url, "tcp://builder:2375");

        let cli = Cli::try_parse_from(["dbuild", "prune", "--build-dir", "/srv/pkg"]).unwrap();
        let Some(Commands::Prune(args)) = cli.command else {
            panic!("expected prune");
        };
        assert_eq!(args.build_dir.as_deref(), Some(std::path::Path::new("/srv/pkg")));
    }
}
