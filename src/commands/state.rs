use crate::Context;
use crate::cli::StateCommand;
use crate::ui;
use anyhow::{Context as _, Result};
use reconcile::FsObjectStore;
use std::process::ExitCode;

pub fn run(ctx: &Context, cmd: StateCommand) -> Result<ExitCode> {
    let config = ctx.config()?;
    match cmd {
        StateCommand::Show { json } => {
            let reconciler = config.build_reconciler()?;
            let loaded = reconciler.load_state()?;

            if json {
                let content = serde_json::to_string_pretty(&loaded.state)
                    .context("Failed to serialize state")?;
                println!("{content}");
                return Ok(ExitCode::SUCCESS);
            }

            ui::header("Tracked resources");
            if loaded.state.is_empty() {
                ui::info("No tracked resources.");
            }
            for (name, record) in &loaded.state.resources {
                ui::section(name);
                ui::kv("Type", record.kind.as_str());
                ui::kv("Provider ID", &record.provider_id);
                ui::kv("Region", record.region_or(&config.default_region));
                for (key, value) in &record.attributes {
                    ui::kv(key, value);
                }
            }
            if let Some(version) = &loaded.version {
                println!();
                ui::kv("Version", version.as_str());
            }
        }
        StateCommand::Path => {
            let store = FsObjectStore::new(config.state_root()?);
            let path = store.object_path(&config.locator())?;
            println!("{}", path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}
