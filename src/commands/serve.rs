use crate::Context;
use crate::server::{self, AppState};
use crate::ui;
use anyhow::{Context as _, Result};
use std::process::ExitCode;
use std::sync::Arc;

pub fn run(ctx: &Context, bind: Option<String>) -> Result<ExitCode> {
    let config = ctx.config()?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let api_key = config.api_key();
    if api_key.is_none() {
        ui::warn("No API key configured; every request will be rejected.");
        ui::dim("Set STRATUS_API_KEY or server.api_key in config.toml.");
    }

    let state = Arc::new(AppState::new(
        config.build_reconciler()?,
        config.desired_path(),
        api_key,
    ));

    if !ctx.quiet {
        ui::info(&format!("stratus API listening on http://{bind}"));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    runtime.block_on(server::serve(state, &bind))?;

    Ok(ExitCode::SUCCESS)
}
