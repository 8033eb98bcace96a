//! Status command group

use super::StatusCommands;
use maestro_core::{App, OutputFormat, Result};
use std::sync::Arc;

pub async fn run(cmd: StatusCommands, app: &Arc<App>) -> Result<()> {
    let json = app.config().output_format == OutputFormat::Json;
    match cmd {
        StatusCommands::Overview => {
            let stats = app.orchestrator().stats().await;
            println!(
                "mode {} | {} tasks ({} queued, {} running, {} done) | {}/{} workers busy",
                stats.current_mode,
                stats.total_tasks,
                stats.queued_tasks,
                stats.running_tasks,
                stats.terminal_tasks,
                stats.busy_workers,
                stats.max_workers,
            );
            Ok(())
        }
        StatusCommands::Stats => {
            let stats = app.orchestrator().stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats).unwrap_or_default());
            } else {
                println!("current mode:   {}", stats.current_mode);
                println!("total tasks:    {}", stats.total_tasks);
                println!("queued tasks:   {}", stats.queued_tasks);
                println!("running tasks:  {}", stats.running_tasks);
                println!("terminal tasks: {}", stats.terminal_tasks);
                println!("workers:        {}/{}", stats.busy_workers, stats.max_workers);
                println!("active agents:  {}", stats.active_agents);
            }
            Ok(())
        }
        StatusCommands::Costs { days } => {
            let daily = app.cost_tracker().daily_costs(days).await;
            let stats = app.cost_tracker().stats(None).await;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "daily": daily,
                        "totals": stats,
                    }))
                    .unwrap_or_default()
                );
            } else {
                if daily.is_empty() {
                    println!("no usage in the last {days} days");
                }
                for day in &daily {
                    println!(
                        "{}  {}  {} requests, {} tokens",
                        day.date, day.cost, day.requests, day.tokens
                    );
                }
                println!(
                    "total: {} over {} requests",
                    stats.total_cost, stats.total_requests
                );
            }
            Ok(())
        }
        StatusCommands::Health => {
            let health = app.health().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&health).unwrap_or_default());
            } else {
                println!("status: {}", health.status);
                println!("store:  {}", health.store);
                for (name, provider) in &health.providers {
                    if provider.healthy {
                        println!(
                            "provider {name}: healthy ({}ms)",
                            provider.latency_ms.unwrap_or(0)
                        );
                    } else {
                        println!(
                            "provider {name}: unhealthy ({})",
                            provider.error.as_deref().unwrap_or("unknown")
                        );
                    }
                }
            }
            Ok(())
        }
    }
}
