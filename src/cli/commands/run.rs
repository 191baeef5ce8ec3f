//! Run command - start a container in the background and wait for it

use crate::cli::args::RunArgs;
use crate::config::Config;
use crate::error::BerthResult;
use crate::orchestration::{create_runtime, shutdown_token, Engine};
use crate::process::{launch_until, LaunchOptions, Recipe};
use crate::ui::{self, startup_spinner, UiContext};
use tracing::{debug, info};

/// Execute the run command
pub async fn execute(args: RunArgs, config: &Config) -> BerthResult<()> {
    let ctx = UiContext::detect();
    let runtime = create_runtime(config);
    debug!(
        "Using {} runtime ({})",
        Engine::detect(&config.runtime.engine).name(),
        runtime.runtime_name()
    );

    let recipe = Recipe::detect(&args.target);
    let options = build_options(&args, config);

    let pb = startup_spinner(&ctx, &format!("Starting {}...", args.target));
    // Ctrl-C during startup kills the container
    let launched = launch_until(runtime, &recipe, options, shutdown_token()).await;
    pb.finish_and_clear();
    let process = launched?;

    let id = process.container_id().unwrap_or_default();
    ui::key_value(&ctx, "name", process.name());
    println!("{}", id);

    tokio::select! {
        _ = process.wait_until_exit() => {}
        _ = shutdown_token().cancelled() => {
            info!("Interrupted, stopping {}", process.name());
            process.kill().await;
        }
    }

    ui::step_info(&ctx, &format!("Container {} exited", process.name()));
    Ok(())
}

/// Translate CLI flags into launch options
fn build_options(args: &RunArgs, config: &Config) -> LaunchOptions {
    let mut options = LaunchOptions::new()
        .container_prefix(config.runtime.container_prefix.clone())
        .echo_output(config.runtime.echo_output && !args.quiet);

    if let Some(name) = &args.name {
        options = options.name(name.clone());
    }
    for (key, value) in &args.env {
        options = options.env(key, value);
    }
    for (host, container) in &args.publish {
        options = options.expose_port(*host, *container);
    }
    for volume in &args.volume {
        options = match volume.split_once(':') {
            Some((host, container)) => options.mount_volume(host, container),
            // named volumes and other forms go through untouched
            None => options.flags(["-v", volume.as_str()]),
        };
    }
    if let Some(dir) = &args.dir {
        options = options.in_dir_at(dir, &config.runtime.container_dir);
    }
    if let Some(text) = &args.wait_log {
        options = options.wait_log(text.clone());
    }
    options.args(args.args.iter().cloned())
}
