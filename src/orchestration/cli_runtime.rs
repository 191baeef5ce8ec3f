//! Container runtime backed by the docker (or podman) CLI
//!
//! Implements the ContainerRuntime trait by shelling out to the engine
//! binary through a [`CommandRunner`], so every failure carries the
//! engine's own output.

use crate::error::BerthResult;
use crate::orchestration::command::{CommandRunner, ExternalCommand};
use crate::orchestration::runtime::ContainerRuntime;
use crate::orchestration::spec::RunSpec;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Container runtime invoking an engine CLI such as `docker` or `podman`
pub struct CliRuntime {
    engine: String,
    runner: CommandRunner,
}

impl CliRuntime {
    /// Create a runtime for the given engine binary
    pub fn new(engine: impl Into<String>) -> Self {
        Self::with_runner(engine, CommandRunner::new())
    }

    /// Create a runtime with an explicit command runner
    pub fn with_runner(engine: impl Into<String>, runner: CommandRunner) -> Self {
        Self {
            engine: engine.into(),
            runner,
        }
    }

    fn command(&self) -> ExternalCommand {
        ExternalCommand::new(&self.engine)
    }

    /// `build -t <tag> -f <file> .` run from the Dockerfile's directory
    fn build_command(&self, dockerfile: &Path, tag: &str) -> ExternalCommand {
        let (dir, file) = split_dockerfile(dockerfile);
        self.command()
            .args(["build", "-t", tag, "-f", &file, "."])
            .current_dir(dir)
    }

    /// `buildx build -f <file> --output type=local,dest=<dest> .`
    fn build_local_command(&self, dockerfile: &Path, dest: &Path) -> ExternalCommand {
        let (dir, file) = split_dockerfile(dockerfile);
        self.command()
            .args(["buildx", "build", "-f", &file, "--output"])
            .arg(format!("type=local,dest={}", dest.display()))
            .arg(".")
            .current_dir(dir)
    }

    fn ps_command(&self, name: &str) -> ExternalCommand {
        self.command()
            .args(["ps", "--all", "--quiet", "--filter"])
            .arg(format!("name={}", name))
            .quiet()
    }
}

/// Split a Dockerfile path into its build context directory and file name
fn split_dockerfile(dockerfile: &Path) -> (std::path::PathBuf, String) {
    let dir = dockerfile
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let file = dockerfile
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Dockerfile".to_string());
    (dir, file)
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn build(&self, dockerfile: &Path, tag: &str) -> BerthResult<()> {
        info!("Building image {} from {}", tag, dockerfile.display());
        self.runner.run(&self.build_command(dockerfile, tag)).await?;
        Ok(())
    }

    async fn build_local(&self, dockerfile: &Path, dest: &Path) -> BerthResult<()> {
        info!(
            "Building {} with local output to {}",
            dockerfile.display(),
            dest.display()
        );
        self.runner
            .run(&self.build_local_command(dockerfile, dest))
            .await?;
        Ok(())
    }

    async fn pull(&self, image: &str) -> BerthResult<()> {
        debug!("Pulling image: {}", image);
        self.runner
            .run(&self.command().args(["pull", image]).quiet())
            .await?;
        Ok(())
    }

    async fn push(&self, image: &str) -> BerthResult<()> {
        info!("Pushing image: {}", image);
        self.runner.run(&self.command().args(["push", image])).await?;
        Ok(())
    }

    async fn container_ids(&self, name: &str) -> BerthResult<Vec<String>> {
        let output = self.runner.run(&self.ps_command(name)).await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn exec(&self, container_id: &str, command: &[String]) -> BerthResult<String> {
        debug!("Executing in {}: {:?}", container_id, command);
        let output = self
            .runner
            .run(
                &self
                    .command()
                    .args(["exec", container_id])
                    .args(command.iter().cloned()),
            )
            .await?;
        Ok(output.trimmed().to_string())
    }

    async fn run(&self, spec: &RunSpec) -> BerthResult<String> {
        let mut cmd = self.command().args(spec.run_args());
        if let Some(dir) = &spec.dir {
            cmd = cmd.current_dir(dir);
        }
        let output = self.runner.run(&cmd).await?;
        Ok(output.trimmed().to_string())
    }

    fn run_command(&self, spec: &RunSpec) -> Command {
        let args = spec.run_args();
        info!("$ {} {}", self.engine, args.join(" "));

        let mut cmd = Command::new(&self.engine);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn runtime_name(&self) -> &str {
        &self.engine
    }
}
