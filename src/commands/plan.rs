use super::{effective_config, load_desired};
use crate::Context;
use crate::cli::RunArgs;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use reconcile::{PlanEntry, PlannedAction};
use std::process::ExitCode;

pub fn run(ctx: &Context, args: RunArgs) -> Result<ExitCode> {
    let config = effective_config(ctx, &args)?;
    let desired = load_desired(&config, args.file.as_ref())?;
    let reconciler = config.build_reconciler()?;
    let plan = reconciler.plan(&desired)?;

    ui::header(&format!("Plan (policy: {})", config.policy));
    for entry in &plan.entries {
        println!("{}", entry_line(entry));
        if let PlannedAction::Update { changes } = &entry.action {
            for change in changes {
                ui::dim(&format!("    {change}"));
            }
        }
    }

    let summary = plan.summary();
    println!();
    ui::kv("Create", &summary.creates.to_string());
    ui::kv("Update", &summary.updates.to_string());
    ui::kv("Unchanged", &summary.no_ops.to_string());
    if summary.unsupported > 0 {
        ui::warn(&format!(
            "{} resource(s) have no provider and will be rejected",
            summary.unsupported
        ));
    }
    if !summary.has_changes() {
        ui::success("Nothing to do");
    }

    Ok(ExitCode::SUCCESS)
}

fn entry_line(entry: &PlanEntry<'_>) -> String {
    let spec = entry.spec;
    match &entry.action {
        PlannedAction::Create => format!(
            "  {} {} ({}, {})",
            "+".green(),
            spec.name,
            spec.kind,
            spec.region
        ),
        PlannedAction::Update { changes } if changes.is_empty() => {
            format!("  {} {} ({})", "~".yellow(), spec.name, spec.kind)
        }
        PlannedAction::Update { changes } => format!(
            "  {} {} ({}, {} change(s))",
            "~".yellow(),
            spec.name,
            spec.kind,
            changes.len()
        ),
        PlannedAction::NoOp => format!("  {} {}", "=".dimmed(), spec.name),
        PlannedAction::Unsupported(err) => format!("  {} {}: {err}", "!".red(), spec.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{ResourceKind, ResourceSpec, UnsupportedKindError};

    #[test]
    fn test_entry_lines() {
        colored::control::set_override(false);
        let spec = ResourceSpec::new(ResourceKind::StorageBucket, "logs", "us-east-1");

        let create = PlanEntry {
            spec: &spec,
            action: PlannedAction::Create,
        };
        assert_eq!(entry_line(&create), "  + logs (aws_s3_bucket, us-east-1)");

        let rejected = PlanEntry {
            spec: &spec,
            action: PlannedAction::Unsupported(UnsupportedKindError {
                kind: ResourceKind::parse("aws_lambda"),
            }),
        };
        assert_eq!(
            entry_line(&rejected),
            "  ! logs: unsupported resource type: aws_lambda"
        );
    }
}
