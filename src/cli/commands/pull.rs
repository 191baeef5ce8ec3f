//! Pull command - resolve the cached image of a Dockerfile

use super::open_cache;
use crate::cli::args::PullArgs;
use crate::config::Config;
use crate::error::BerthResult;
use crate::ui::{TaskSpinner, UiContext};

/// Execute the pull command
pub async fn execute(args: PullArgs, config: &Config) -> BerthResult<()> {
    let ctx = UiContext::detect();
    let cache = open_cache(&args.dockerfile, config)?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Resolving image for {}", args.dockerfile.display()));

    match cache.pull_cached(&args.dockerfile).await {
        Ok(reference) => {
            spinner.stop("Image ready");
            println!("{}", reference);
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Unable to resolve image");
            Err(e)
        }
    }
}
