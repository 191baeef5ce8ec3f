//! Launch options for containers

use crate::cache::file_digest;
use crate::error::{BerthError, BerthResult};
use crate::orchestration::{ContainerRuntime, RunSpec};
use crate::process::background::BackgroundProcess;
use futures_util::future::BoxFuture;
use regex::bytes::Regex;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tag prefix for images built from a Dockerfile without an explicit name
pub const DEFAULT_CONTAINER_PREFIX: &str = "localhost/berth-auto-build:";

/// Container mount point used by [`LaunchOptions::in_dir`]
pub const DEFAULT_CONTAINER_DIR: &str = "/.data";

/// What to run: a Dockerfile to build, or an existing image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipe {
    /// Build this Dockerfile, its directory being the build context
    Dockerfile(PathBuf),
    /// Run this image reference as-is
    Image(String),
}

impl Recipe {
    /// Treat `target` as a Dockerfile when such a file exists, else as an image
    pub fn detect(target: &str) -> Self {
        let path = Path::new(target);
        if path.is_file() {
            Recipe::Dockerfile(path.to_path_buf())
        } else {
            Recipe::Image(target.to_string())
        }
    }
}

/// Custom startup hook, run once the container command is live
pub type StartupHookFn =
    Box<dyn FnOnce(BackgroundProcess) -> BoxFuture<'static, BerthResult<()>> + Send>;

pub(crate) enum StartupHook {
    /// Wait for literal text in either output stream
    WaitLog(String),
    /// Wait for a pattern in either output stream
    WaitMatch(Regex),
    /// Caller-provided check
    Custom(String, StartupHookFn),
}

impl StartupHook {
    pub(crate) fn describe(&self) -> String {
        match self {
            StartupHook::WaitLog(text) => format!("wait for log {:?}", text),
            StartupHook::WaitMatch(re) => format!("wait for match {}", re.as_str()),
            StartupHook::Custom(name, _) => name.clone(),
        }
    }
}

/// How a container is started
///
/// Flags go before the image (`<engine> run <flags> <image>`), args after it.
pub struct LaunchOptions {
    pub(crate) name: Option<String>,
    pub(crate) container_prefix: String,
    pub(crate) flags: Vec<String>,
    pub(crate) args: Vec<String>,
    pub(crate) dir: Option<PathBuf>,
    pub(crate) echo_output: bool,
    pub(crate) hooks: Vec<StartupHook>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            name: None,
            container_prefix: DEFAULT_CONTAINER_PREFIX.to_string(),
            flags: Vec::new(),
            args: Vec::new(),
            dir: None,
            echo_output: true,
            hooks: Vec::new(),
        }
    }
}

impl LaunchOptions {
    /// Options with defaults: echo to stderr, no hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag for an image built from a Dockerfile, instead of the content hash
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Prefix for content-hash tags of built images
    pub fn container_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.container_prefix = prefix.into();
        self
    }

    /// Flags for the runtime, placed before the image
    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    /// Arguments for the container command, placed after the image
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Override the image entrypoint
    pub fn entrypoint(self, command: impl Into<String>) -> Self {
        self.flags(["--entrypoint".to_string(), command.into()])
    }

    /// Set one environment variable
    pub fn env(self, key: &str, value: &str) -> Self {
        self.flags(["--env".to_string(), format!("{}={}", key, value)])
    }

    /// Set several environment variables, in key order
    pub fn envs(self, vars: &BTreeMap<String, String>) -> Self {
        vars.iter().fold(self, |opts, (k, v)| opts.env(k, v))
    }

    /// Publish a container port on a host port
    pub fn expose_port(self, host: u16, container: u16) -> Self {
        self.flags(["-p".to_string(), format!("{}:{}", host, container)])
    }

    /// Publish a container port on a free host port, returning that port
    pub fn expose_random_port(self, container: u16) -> BerthResult<(Self, u16)> {
        let host = unused_port()?;
        debug!("Exposing container port {} on {}", container, host);
        Ok((self.expose_port(host, container), host))
    }

    /// Bind-mount a host path, made absolute
    pub fn mount_volume(self, local: impl AsRef<Path>, container: &str) -> Self {
        let local = local.as_ref();
        let local = std::path::absolute(local).unwrap_or_else(|_| local.to_path_buf());
        self.flags(["-v".to_string(), format!("{}:{}", local.display(), container)])
    }

    /// Run from `local`, mounted at the default container dir as the workdir
    pub fn in_dir(self, local: impl AsRef<Path>) -> Self {
        self.in_dir_at(local, DEFAULT_CONTAINER_DIR)
    }

    /// Run from `local`, mounted at `container` as the workdir
    pub fn in_dir_at(mut self, local: impl AsRef<Path>, container: &str) -> Self {
        self.dir = Some(local.as_ref().to_path_buf());
        self.flags(["--workdir", container])
            .mount_volume(local, container)
    }

    /// Echo container output to stderr (on by default)
    pub fn echo_output(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }

    /// Consider the container started once `text` appears in its output
    pub fn wait_log(mut self, text: impl Into<String>) -> Self {
        self.hooks.push(StartupHook::WaitLog(text.into()));
        self
    }

    /// Consider the container started once `pattern` matches its output
    pub fn wait_match(mut self, pattern: Regex) -> Self {
        self.hooks.push(StartupHook::WaitMatch(pattern));
        self
    }

    /// Run a custom check after start; a failure kills the container
    pub fn hook<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: FnOnce(BackgroundProcess) -> Fut + Send + 'static,
        Fut: Future<Output = BerthResult<()>> + Send + 'static,
    {
        let hook: StartupHookFn = Box::new(
            move |proc: BackgroundProcess| -> BoxFuture<'static, BerthResult<()>> {
                Box::pin(hook(proc))
            },
        );
        self.hooks.push(StartupHook::Custom(name.into(), hook));
        self
    }

    /// Run spec for `image`
    pub(crate) fn run_spec(&self, image: &str, name: Option<String>) -> RunSpec {
        RunSpec {
            image: image.to_string(),
            name,
            flags: self.flags.clone(),
            args: self.args.clone(),
            dir: self.dir.clone(),
        }
    }
}

/// Image to run for `recipe`, building it first when it is a Dockerfile
pub(crate) async fn resolve_image(
    runtime: &dyn ContainerRuntime,
    recipe: &Recipe,
    options: &LaunchOptions,
) -> BerthResult<String> {
    match recipe {
        Recipe::Image(image) => Ok(image.clone()),
        Recipe::Dockerfile(path) => {
            if !path.is_file() {
                return Err(BerthError::RecipeNotFound(path.clone()));
            }
            let abs = std::path::absolute(path).map_err(|e| {
                BerthError::io(format!("Failed to resolve {}", path.display()), e)
            })?;
            let tag = match &options.name {
                Some(name) => name.clone(),
                None => format!("{}{}", options.container_prefix, file_digest(&abs)?),
            };
            runtime.build(&abs, &tag).await?;
            Ok(tag)
        }
    }
}

/// Ask the OS for a currently free TCP port
fn unused_port() -> BerthResult<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| BerthError::io("Failed to bind an ephemeral port", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| BerthError::io("Failed to read ephemeral port", e))?
        .port();
    Ok(port)
}
