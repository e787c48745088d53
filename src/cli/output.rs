//! CLI output formatting

use crate::persistence::{PartRunStats, Run, RunStatus, StepExecution};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static ARROW: Emoji<'_, '_> = Emoji("→", ">");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "# ");
pub static FINISH: Emoji<'_, '_> = Emoji("🏁 ", "* ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "= ");

/// Format a status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Running => style("running").yellow().to_string(),
        RunStatus::Success => style("success").green().to_string(),
        RunStatus::Failed => style("failed").red().to_string(),
    }
}

/// Join group and part back into a qualified name
pub fn qualified_part(group: &str, part: &str) -> String {
    if group.is_empty() {
        part.to_string()
    } else {
        format!("{}.{}", group, part)
    }
}

fn status_icon(status: RunStatus) -> Emoji<'static, 'static> {
    match status {
        RunStatus::Success => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => INFO,
    }
}

/// One-line run summary
pub fn format_run(run: &Run) -> String {
    format!(
        "{} #{} {} {} - {} - {} {}",
        status_icon(run.status),
        run.id,
        style(&run.project).bold(),
        style(qualified_part(&run.group, &run.part)).cyan(),
        format_status(run.status),
        style(run.started_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        style(run.duration.as_deref().unwrap_or("-")).dim(),
    )
}

/// One-line step execution summary
pub fn format_step(step: &StepExecution) -> String {
    format!(
        "{} {} - {} - {} {}",
        status_icon(step.status),
        style(&step.name).bold(),
        format_status(step.status),
        style(&step.command).dim(),
        style(step.duration.as_deref().unwrap_or("-")).dim(),
    )
}

/// One-line per-part stats summary
pub fn format_part_stats(stat: &PartRunStats) -> String {
    format!(
        "{} {} #{} {} - {} steps - {} {}",
        status_icon(stat.status),
        style(qualified_part(&stat.group, &stat.part)).bold(),
        stat.run_id,
        format_status(stat.status),
        stat.step_count,
        style(stat.started_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        style(stat.duration.as_deref().unwrap_or("-")).dim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_part() {
        assert_eq!(qualified_part("", "build"), "build");
        assert_eq!(qualified_part("web", "deploy"), "web.deploy");
    }
}
