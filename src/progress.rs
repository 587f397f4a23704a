//! Terminal progress for reconciliation runs

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{ProgressCallback, ResourceOutcome};

/// Spinner that reports each resource as it settles
///
/// Hidden when `quiet` is set; per-resource lines are still printed above
/// the spinner otherwise.
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{pos}/{len}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressCallback for SpinnerProgress {
    fn on_run_start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.enable_steady_tick(std::time::Duration::from_millis(100));
    }

    fn on_resource_start(&mut self, name: &str, description: &str) {
        self.bar.set_message(format!("{name}: {description}"));
    }

    fn on_resource_complete(&mut self, name: &str, outcome: &ResourceOutcome) {
        let line = outcome_line(name, outcome);
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_run_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for SpinnerProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

fn outcome_line(name: &str, outcome: &ResourceOutcome) -> String {
    match outcome {
        ResourceOutcome::Created { provider_id } => {
            format!("  {} {name} created ({provider_id})", "+".green())
        }
        ResourceOutcome::Updated => format!("  {} {name} updated", "~".yellow()),
        ResourceOutcome::Destroyed => format!("  {} {name} destroyed", "-".red()),
        ResourceOutcome::NoChange => format!("  {} {name}", "=".dimmed()),
        ResourceOutcome::Failed { error } => format!("  {} {name}: {error}", "✗".red()),
        ResourceOutcome::Skipped { reason } => {
            format!("  {} {name} skipped ({reason})", "○".dimmed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_line_mentions_name() {
        colored::control::set_override(false);
        assert_eq!(
            outcome_line(
                "web",
                &ResourceOutcome::Created {
                    provider_id: "i-1".into()
                }
            ),
            "  + web created (i-1)"
        );
        assert_eq!(
            outcome_line(
                "web",
                &ResourceOutcome::Failed {
                    error: "boom".into()
                }
            ),
            "  ✗ web: boom"
        );
    }

    #[test]
    fn test_hidden_spinner_accepts_callbacks() {
        let mut progress = SpinnerProgress::new(true);
        progress.on_run_start(1);
        progress.on_resource_start("logs", "create aws_s3_bucket");
        progress.on_resource_complete("logs", &ResourceOutcome::Destroyed);
        progress.on_run_complete();
    }
}
