//! Container processes for integration tests
//!
//! [`launch`] starts a container in the background and hands back a
//! [`BackgroundProcess`] to exec into, watch the logs of, and kill.
//! [`run_container`] runs one in the foreground to completion.

mod background;
mod latch;
mod options;

pub use background::{launch, launch_until, BackgroundProcess, ProcessState};
pub use latch::Latch;
pub use options::{
    LaunchOptions, Recipe, StartupHookFn, DEFAULT_CONTAINER_DIR, DEFAULT_CONTAINER_PREFIX,
};

use crate::error::BerthResult;
use crate::orchestration::ContainerRuntime;
use std::time::Duration;

/// Polling interval of [`wait_for`]
pub const WAIT_FOR_INTERVAL: Duration = Duration::from_millis(100);

/// Run `recipe` in the foreground and return its stdout
///
/// Startup hooks and output echo in `options` do not apply here.
pub async fn run_container(
    runtime: &dyn ContainerRuntime,
    recipe: &Recipe,
    options: &LaunchOptions,
) -> BerthResult<String> {
    let image = options::resolve_image(runtime, recipe, options).await?;
    runtime.run(&options.run_spec(&image, None)).await
}

/// Poll `condition` until it holds
pub async fn wait_for<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    while !condition() {
        tokio::time::sleep(WAIT_FOR_INTERVAL).await;
    }
}
