//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::cli::commands::Workspace;
use crate::config::{Config, ConfigManager};
use crate::error::DrydockResult;
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(args: ConfigArgs, ws: &Workspace) -> DrydockResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => {
            println!("{}", toml::to_string_pretty(&ws.config)?);
        }
        Some(ConfigAction::Path) => {
            println!("{}", ws.manager.path().display());
        }
        Some(ConfigAction::Init { force }) => init_config(&ws.manager, force).await?,
    }

    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> DrydockResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    Ok(())
}
