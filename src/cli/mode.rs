//! Mode command group

use super::ModeCommands;
use maestro_core::{App, Mode, ModeConfig, OutputFormat, Result};
use std::sync::Arc;

pub async fn run(cmd: ModeCommands, app: &Arc<App>) -> Result<()> {
    match cmd {
        ModeCommands::List => {
            let current = app.modes().current().await;
            for &mode in Mode::ALL {
                let config = app.modes().config_for(mode).await;
                let marker = if mode == current { "*" } else { " " };
                println!(
                    "{marker} {:<9} {:?} decomposition, {} retries, timeout {}s{}",
                    mode.as_str(),
                    config.decomposition_depth,
                    config.max_retries,
                    config.task_timeout_ms / 1000,
                    config
                        .cost_limit
                        .map(|limit| format!(", cap {limit}"))
                        .unwrap_or_default(),
                );
            }
            Ok(())
        }
        ModeCommands::Current => {
            println!("{}", app.modes().current().await);
            Ok(())
        }
        ModeCommands::Switch { mode } => {
            app.modes().switch_mode(mode).await?;
            println!("switched to {mode}");
            Ok(())
        }
        ModeCommands::Info { mode } => {
            let config = app.modes().config_for(mode).await;
            if app.config().output_format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&config).unwrap_or_default());
            } else {
                print_config(mode, &config);
            }
            Ok(())
        }
        ModeCommands::Compare { a, b } => {
            let config_a = app.modes().config_for(a).await;
            let config_b = app.modes().config_for(b).await;
            if app.config().output_format == OutputFormat::Json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        a.as_str(): config_a,
                        b.as_str(): config_b,
                    }))
                    .unwrap_or_default()
                );
            } else {
                print_config(a, &config_a);
                println!();
                print_config(b, &config_b);
            }
            Ok(())
        }
    }
}

fn print_config(mode: Mode, config: &ModeConfig) {
    println!("{mode}");
    println!("  decomposition:   {:?}", config.decomposition_depth);
    println!("  parallelization: {:?}", config.parallelization_level);
    println!("  validation:      {:?}", config.validation_depth);
    println!("  approval:        {}", config.requires_human_approval);
    println!(
        "  primary model:   {}/{}",
        config.primary_model.provider, config.primary_model.model
    );
    println!(
        "  fallback model:  {}/{}",
        config.fallback_model.provider, config.fallback_model.model
    );
    println!(
        "  agents:          {}",
        config
            .required_agents
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  timeout:         {}s", config.task_timeout_ms / 1000);
    println!("  max retries:     {}", config.max_retries);
    if let Some(limit) = config.cost_limit {
        println!("  cost cap:        {limit}");
    }
}
