//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    /// Create a new spinner; nothing is shown until [`start`](Self::start)
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            eprintln!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            eprintln!("{} {}", style("✓").green(), message);
        } else {
            eprintln!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            eprintln!("{} {}", style("✗").red(), message);
        } else {
            eprintln!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Spinner shown while a background container starts
///
/// Hidden in CI, where the container output echo is the progress.
pub fn startup_spinner(ctx: &UiContext, message: &str) -> ProgressBar {
    if !ctx.use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    let spinner_style = ProgressStyle::default_spinner()
        .template("{spinner:.blue} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(spinner_style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Testing...");
        spinner.stop("Done");
        spinner.start("Again...");
        spinner.stop_error("Failed");
    }

    #[test]
    fn startup_spinner_hidden_in_ci() {
        let ctx = UiContext::non_interactive();
        let pb = startup_spinner(&ctx, "Starting");
        assert!(pb.is_hidden());
        pb.finish_and_clear();
    }
}
