//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// berth - Background containers and cached images for integration tests
///
/// Builds container images and exported build output once per content
/// fingerprint, sharing them through a registry, and runs containers in
/// the background until they report ready.
#[derive(Parser, Debug)]
#[command(name = "berth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BERTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .berth.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull the cached image for a Dockerfile, building it on a miss
    Pull(PullArgs),

    /// Export the build output of a Dockerfile into its cache directory
    Export(ExportArgs),

    /// Print the cache key of a Dockerfile
    Key(KeyArgs),

    /// Run a container in the background until it exits
    Run(RunArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the pull command
#[derive(Parser, Debug)]
pub struct PullArgs {
    /// Path to the Dockerfile
    pub dockerfile: PathBuf,
}

/// Arguments for the export command
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Path to the Dockerfile
    pub dockerfile: PathBuf,

    /// Keep only files matching this glob (repeatable)
    #[arg(short, long)]
    pub keep: Vec<String>,
}

/// Arguments for the key command
#[derive(Parser, Debug)]
pub struct KeyArgs {
    /// Path to the Dockerfile
    pub dockerfile: PathBuf,

    /// Print the key of the exported directory instead of the image
    #[arg(long)]
    pub export: bool,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Image reference, or path to a Dockerfile to build first
    pub target: String,

    /// Consider the container started once this text is logged
    #[arg(short = 'w', long)]
    pub wait_log: Option<String>,

    /// Environment variables (KEY=VALUE)
    #[arg(short, long, value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Published ports (host:container)
    #[arg(short, long, value_parser = parse_port)]
    pub publish: Vec<(u16, u16)>,

    /// Volume mounts (host:container)
    #[arg(long)]
    pub volume: Vec<String>,

    /// Mount this directory and use it as the working directory
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Tag for the image built from a Dockerfile
    #[arg(short, long)]
    pub name: Option<String>,

    /// Do not echo container output to stderr
    #[arg(short, long)]
    pub quiet: bool,

    /// Arguments passed to the container
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for key output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// The reference alone
    Plain,
    /// All key fields as JSON
    Json,
}

/// Parse environment variable in KEY=VALUE format
fn parse_env_var(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Parse a port mapping in HOST:CONTAINER format
fn parse_port(s: &str) -> Result<(u16, u16), String> {
    let (host, container) = s
        .split_once(':')
        .ok_or_else(|| format!("invalid HOST:CONTAINER format: no ':' found in '{s}'"))?;
    let host = host.parse().map_err(|_| format!("invalid host port '{host}'"))?;
    let container = container
        .parse()
        .map_err(|_| format!("invalid container port '{container}'"))?;
    Ok((host, container))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_var_valid() {
        let (k, v) = parse_env_var("FOO=bar").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar");
    }

    #[test]
    fn parse_env_var_with_equals() {
        let (k, v) = parse_env_var("FOO=bar=baz").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar=baz");
    }

    #[test]
    fn parse_env_var_invalid() {
        assert!(parse_env_var("FOO").is_err());
    }

    #[test]
    fn parse_port_mapping() {
        assert_eq!(parse_port("8080:80").unwrap(), (8080, 80));
        assert!(parse_port("8080").is_err());
        assert!(parse_port("http:80").is_err());
        assert!(parse_port("8080:99999").is_err());
    }

    #[test]
    fn cli_parses_run() {
        let cli = Cli::parse_from([
            "berth", "run", "redis:7", "-w", "Ready to accept", "-e", "A=1", "-p", "6379:6379",
            "--", "--appendonly", "yes",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.target, "redis:7");
                assert_eq!(args.wait_log.as_deref(), Some("Ready to accept"));
                assert_eq!(args.env, vec![("A".to_string(), "1".to_string())]);
                assert_eq!(args.publish, vec![(6379, 6379)]);
                assert_eq!(args.args, vec!["--appendonly", "yes"]);
                assert!(!args.quiet);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_export_keep() {
        let cli = Cli::parse_from([
            "berth", "export", "tools/Dockerfile", "--keep", "bin/*", "-k", "*.so",
        ]);
        match cli.command {
            Commands::Export(args) => {
                assert_eq!(args.dockerfile, PathBuf::from("tools/Dockerfile"));
                assert_eq!(args.keep, vec!["bin/*", "*.so"]);
            }
            _ => panic!("expected Export command"),
        }
    }

    #[test]
    fn cli_parses_key() {
        let cli = Cli::parse_from(["berth", "key", "Dockerfile", "--export", "-f", "json"]);
        match cli.command {
            Commands::Key(args) => {
                assert!(args.export);
                assert!(matches!(args.format, OutputFormat::Json));
            }
            _ => panic!("expected Key command"),
        }
    }

    #[test]
    fn cli_parses_config_init() {
        let cli = Cli::parse_from(["berth", "config", "init", "--force"]);
        match cli.command {
            Commands::Config(ConfigArgs {
                action: Some(ConfigAction::Init { force }),
            }) => assert!(force),
            _ => panic!("expected Config init"),
        }
    }

    #[test]
    fn cli_no_local_flag() {
        let cli = Cli::parse_from(["berth", "--no-local", "config", "show"]);
        assert!(cli.no_local);
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["berth", "config"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["berth", "-v", "config"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["berth", "-vv", "config"]);
        assert_eq!(cli.verbose, 2);
    }
}
