//! Container run specification
//!
//! Describes a `run` invocation independently of the runtime CLI that
//! executes it.

use std::path::PathBuf;

/// Everything needed to start a container with `<engine> run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    /// Image reference to run
    pub image: String,
    /// Container name (`--name`), if any
    pub name: Option<String>,
    /// Flags placed before the image (`-p`, `-v`, `--env`, ...)
    pub flags: Vec<String>,
    /// Arguments placed after the image
    pub args: Vec<String>,
    /// Host directory the runtime CLI is started in
    pub dir: Option<PathBuf>,
}

impl RunSpec {
    /// Create a spec for the given image
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    /// Full argument list for `<engine> run`
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--interactive".to_string(),
        ];
        args.extend(self.flags.iter().cloned());
        if let Some(name) = &self.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }
        args.push(self.image.clone());
        args.extend(self.args.iter().cloned());
        args
    }
}
