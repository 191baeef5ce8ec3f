//! Terminal output for the CLI
//!
//! Uses `cliclack` for styled steps and spinners with a plain fallback in
//! CI/non-interactive environments. Status goes to stderr so stdout carries
//! only the command result (an image reference, a directory, a key).
//!
//! # Example
//!
//! ```rust,ignore
//! use berth::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Resolving image...");
//! // ... do work ...
//! spinner.stop("Image ready");
//! ui::step_warn_hint(&ctx, "Push disabled", "Set BERTH_PUSH_IMAGE_CACHE=true");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{key_value, step_info, step_ok_detail, step_warn_hint};
pub use progress::{startup_spinner, TaskSpinner};
