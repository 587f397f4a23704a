use super::{effective_config, finish, load_desired, run_interruptible};
use crate::Context;
use crate::cli::RunArgs;
use crate::progress::SpinnerProgress;
use crate::ui;
use anyhow::Result;
use std::process::ExitCode;

pub fn run(ctx: &Context, args: RunArgs) -> Result<ExitCode> {
    let config = effective_config(ctx, &args)?;
    let desired = load_desired(&config, args.file.as_ref())?;
    let reconciler = config.build_reconciler()?;

    if !ctx.quiet {
        ui::header("Deploy");
        ui::kv("Resources", &desired.len().to_string());
        ui::kv("Update policy", &config.policy.to_string());
    }

    let quiet = ctx.quiet;
    let outcome = run_interruptible(move |cancel| {
        let mut progress = SpinnerProgress::new(quiet);
        reconciler.deploy(&desired, &cancel, &mut progress)
    })??;

    Ok(finish(ctx, &outcome))
}
