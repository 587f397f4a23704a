use super::{finish, run_interruptible};
use crate::Context;
use crate::progress::SpinnerProgress;
use crate::ui;
use anyhow::Result;
use dialoguer::Confirm;
use reconcile::destroy_order;
use std::process::ExitCode;

pub fn run(ctx: &Context, yes: bool) -> Result<ExitCode> {
    let config = ctx.config()?;
    let reconciler = config.build_reconciler()?;

    let loaded = reconciler.load_state()?;
    if loaded.state.is_empty() {
        ui::info("No tracked resources, nothing to destroy.");
        return Ok(ExitCode::SUCCESS);
    }

    ui::header("Destroy");
    for name in destroy_order(&loaded.state) {
        if let Some(record) = loaded.state.get(&name) {
            ui::dim(&format!("{name} ({}, {})", record.kind, record.provider_id));
        }
    }
    println!();

    if !yes && !confirm_destroy(loaded.state.len())? {
        ui::info("Aborted.");
        return Ok(ExitCode::SUCCESS);
    }

    let quiet = ctx.quiet;
    let outcome = run_interruptible(move |cancel| {
        let mut progress = SpinnerProgress::new(quiet);
        reconciler.destroy(&cancel, &mut progress)
    })??;

    Ok(finish(ctx, &outcome))
}

fn confirm_destroy(count: usize) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt(format!("Destroy {count} resource(s)?"))
        .default(false)
        .interact()?;

    Ok(confirmed)
}
