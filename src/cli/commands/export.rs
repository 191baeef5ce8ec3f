//! Export command - materialize the build output of a Dockerfile

use super::open_cache;
use crate::cli::args::ExportArgs;
use crate::config::{Config, ENV_PUSH};
use crate::error::BerthResult;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the export command
pub async fn execute(args: ExportArgs, config: &Config) -> BerthResult<()> {
    let ctx = UiContext::detect();
    let cache = open_cache(&args.dockerfile, config)?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Exporting {}", args.dockerfile.display()));

    let dir = match cache.export_cached(&args.dockerfile, &args.keep).await {
        Ok(dir) => dir,
        Err(e) => {
            spinner.stop_error("Export failed");
            return Err(e);
        }
    };
    spinner.stop("Export ready");

    if !cache.settings().push {
        ui::step_warn_hint(
            &ctx,
            "Fresh builds are not shared",
            &format!("Set {}=true to push them", ENV_PUSH),
        );
    }
    println!("{}", dir.display());
    Ok(())
}
