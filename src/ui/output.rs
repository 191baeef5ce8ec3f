//! Output functions for consistent CLI formatting

use super::context::UiContext;
use console::style;

/// Display a success step with detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(format!("{} ({})", message, style(detail).dim())).ok();
    } else {
        eprintln!("  {} {} ({})", style("[OK]").green(), message, detail);
    }
}

/// Display a warning step with hint
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::warning(format!("{} - {}", message, style(hint).dim())).ok();
    } else {
        eprintln!("  {} {} - {}", style("[WARN]").yellow(), message, hint);
    }
}

/// Display an info step
pub fn step_info(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::info(message).ok();
    } else {
        eprintln!("  {} {}", style("[INFO]").cyan(), message);
    }
}

/// Print styled key-value pair
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        eprintln!("  {}: {}", style(key).dim(), value);
    } else {
        eprintln!("  {}: {}", key, value);
    }
}
