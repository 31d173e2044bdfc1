//! Output functions for consistent CLI formatting

use super::context::UiContext;
use console::{style, Style};

/// Display a title line
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        println!("{} {}", style("┌").cyan(), style(title).cyan().bold());
    } else {
        println!("{}", style(title).cyan().bold());
    }
}

/// Display a section header
pub fn section(_ctx: &UiContext, title: &str) {
    println!();
    println!("{}", style(title).bold());
}

/// Display a success step
pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        println!("  {} {}", style("✓").green(), message);
    } else {
        println!("  {} {}", style("[OK]").green(), message);
    }
}

/// Display a success step with detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        println!("  {} {} ({})", style("✓").green(), message, style(detail).dim());
    } else {
        println!("  {} {} ({})", style("[OK]").green(), message, detail);
    }
}

/// Display a warning step with hint
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        println!("  {} {} - {}", style("!").yellow(), message, style(hint).dim());
    } else {
        println!("  {} {} - {}", style("[WARN]").yellow(), message, hint);
    }
}

/// Display an error step with detail
pub fn step_error_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        println!("  {} {}: {}", style("✗").red(), message, style(detail).red());
    } else {
        println!("  {} {}: {}", style("[FAIL]").red(), message, detail);
    }
}

/// Display a skipped step
pub fn step_skipped(ctx: &UiContext, message: &str, why: &str) {
    if ctx.use_fancy_output() {
        println!("  {} {}", style("-").dim(), style(format!("{} ({})", message, why)).dim());
    } else {
        println!("  {} {} ({})", style("[SKIP]").dim(), message, why);
    }
}

/// Display an info step
pub fn step_info(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        println!("  {} {}", style("●").cyan(), message);
    } else {
        println!("  {} {}", style("[INFO]").cyan(), message);
    }
}

/// Display a dimmed remark
pub fn remark(_ctx: &UiContext, message: &str) {
    println!("    {}", style(message).dim());
}

/// Print a closing summary line, green when `ok`
pub fn outro(ctx: &UiContext, message: &str, ok: bool) {
    let color = if ok {
        Style::new().green().bold()
    } else {
        Style::new().red().bold()
    };
    println!();
    if ctx.use_fancy_output() {
        println!("{} {}", style("└").cyan(), color.apply_to(message));
    } else {
        let tag = if ok { "[OK]" } else { "[ERROR]" };
        println!("{} {}", color.apply_to(tag), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_non_interactive() {
        let ctx = UiContext::non_interactive();
        intro(&ctx, "Test");
        step_ok(&ctx, "Step completed");
        step_skipped(&ctx, "runtime=A", "not started");
        step_error_detail(&ctx, "runtime=B", "exit 1");
        outro(&ctx, "Done", true);
    }
}
