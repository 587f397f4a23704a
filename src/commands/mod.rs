pub mod deploy;
pub mod destroy;
pub mod plan;
pub mod serve;
pub mod state;

use crate::cli::RunArgs;
use crate::config::StratusConfig;
use crate::ui;
use crate::Context;
use anyhow::{Context as _, Result};
use reconcile::{CancelToken, ResourceSpec, RunOutcome};
use std::path::PathBuf;
use std::process::ExitCode;

/// Config with command-line overrides applied
fn effective_config(ctx: &Context, args: &RunArgs) -> Result<StratusConfig> {
    let mut config = ctx.config()?;
    if let Some(policy) = args.policy {
        config.policy = policy.into();
    }
    Ok(config)
}

/// Parse the desired-state document named by `--file` or the config
fn load_desired(config: &StratusConfig, file: Option<&PathBuf>) -> Result<Vec<ResourceSpec>> {
    let path = file.cloned().unwrap_or_else(|| config.desired_path());
    let specs = manifest::load(&path)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    log::info!("Loaded {} resources from {}", specs.len(), path.display());
    Ok(specs)
}

/// Run `f` on the blocking pool, raising the cancel token on Ctrl-C
///
/// A provider call already in flight finishes before the run stops.
fn run_interruptible<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(CancelToken) -> T + Send + 'static,
{
    let cancel = CancelToken::new();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    runtime.block_on(async {
        let token = cancel.clone();
        let mut task = tokio::task::spawn_blocking(move || f(token));
        tokio::select! {
            joined = &mut task => joined.context("Run aborted"),
            _ = tokio::signal::ctrl_c() => {
                ui::warn("Interrupted, stopping after the current resource");
                cancel.cancel();
                task.await.context("Run aborted")
            }
        }
    })
}

/// Print the report and map the outcome to an exit code
fn finish(ctx: &Context, outcome: &RunOutcome) -> ExitCode {
    if !ctx.quiet || !outcome.is_success() {
        ui::report(&outcome.report);
    }

    if let Some(err) = &outcome.save_error {
        ui::error(&format!("Failed to save state: {err}"));
        if err.is_conflict() {
            ui::dim("Another run saved the state first; re-run to reconcile against it.");
        }
        return ExitCode::FAILURE;
    }

    if outcome.report.is_success() {
        if !ctx.quiet {
            ui::success(&format!(
                "{} complete: {} change(s)",
                outcome.report.operation,
                outcome.report.total_changes()
            ));
        }
        ExitCode::SUCCESS
    } else {
        ui::error(&format!(
            "{} resource(s) failed",
            outcome.report.errors.len()
        ));
        ExitCode::FAILURE
    }
}
