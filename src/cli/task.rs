//! Task command group

use super::TaskCommands;
use maestro_core::{App, Error, OutputFormat, Result, SubmitRequest, Task};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Upper bound on waiting for an in-process task
const WAIT_TIMEOUT: Duration = Duration::from_secs(3600);

pub async fn run(cmd: TaskCommands, app: &Arc<App>) -> Result<()> {
    match cmd {
        TaskCommands::Create {
            description,
            mode,
            priority,
            project,
            watch,
        } => {
            let mut request = SubmitRequest::new(description);
            if let Some(mode) = mode {
                request = request.with_mode(mode);
            }
            if let Some(priority) = priority {
                request = request.with_priority(priority);
            }
            if let Some(name) = project {
                let project = app
                    .projects()
                    .get_by_name(&name)
                    .await
                    .ok_or_else(|| Error::NotFound(format!("project {name}")))?;
                request = request.with_project(project.id);
            }

            // Subscribe before submitting so no event is missed
            let mut watcher = if watch {
                Some(app.orchestrator().subscribe(vec!["tasks".into()]).await)
            } else {
                None
            };

            let id = app.orchestrator().submit(request).await?;
            println!("task {id} submitted");
            if let Some(handle) = watcher.as_mut() {
                while let Some(message) = handle.receiver.recv().await {
                    if message.task_id != Some(id) {
                        continue;
                    }
                    println!(
                        "{}  {}",
                        message.timestamp.format("%H:%M:%S%.3f"),
                        message.message_type
                    );
                    if matches!(
                        message.message_type.as_str(),
                        "task.completed" | "task.failed" | "task.cancelled"
                    ) {
                        break;
                    }
                }
            }
            let task = app.orchestrator().wait(id, WAIT_TIMEOUT).await?;
            print_task(app, &task);
            Ok(())
        }
        TaskCommands::List => {
            let tasks = app.orchestrator().list().await;
            if app.config().output_format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&tasks).unwrap_or_default());
            } else if tasks.is_empty() {
                println!("no tasks");
            } else {
                for task in tasks {
                    println!(
                        "{}  {:<10} {:<8} {}",
                        task.id, task.status, task.mode, task.description
                    );
                }
            }
            Ok(())
        }
        TaskCommands::Get { id } => {
            let task = app.orchestrator().get(id).await?;
            print_task(app, &task);
            Ok(())
        }
        TaskCommands::Watch { id } => {
            let task = app.orchestrator().get(id).await?;
            if task.status.is_terminal() {
                print_task(app, &task);
                return Ok(());
            }
            stream_events(app, id).await;
            Ok(())
        }
        TaskCommands::Cancel { id } => {
            app.orchestrator().cancel(id).await?;
            println!("task {id} cancellation requested");
            Ok(())
        }
        TaskCommands::Retry { id } => {
            let new_id = app.orchestrator().retry(id).await?;
            println!("task {id} retried as {new_id}");
            let task = app.orchestrator().wait(new_id, WAIT_TIMEOUT).await?;
            print_task(app, &task);
            Ok(())
        }
    }
}

/// Follow a task's event channel until a terminal event arrives
async fn stream_events(app: &Arc<App>, id: Uuid) {
    let mut handle = app
        .orchestrator()
        .subscribe(vec![format!("task:{id}")])
        .await;
    while let Some(message) = handle.receiver.recv().await {
        println!("{}  {}", message.timestamp.format("%H:%M:%S%.3f"), message.message_type);
        if matches!(
            message.message_type.as_str(),
            "task.completed" | "task.failed" | "task.cancelled"
        ) {
            break;
        }
    }
}

fn print_task(app: &Arc<App>, task: &Task) {
    if app.config().output_format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(task).unwrap_or_default());
        return;
    }

    println!("task {}", task.id);
    println!("  description: {}", task.description);
    println!("  status:      {}", task.status);
    println!("  mode:        {}", task.mode);
    println!("  priority:    {}", task.priority);
    println!("  tokens:      {}", task.tokens_used);
    println!("  cost:        {}", task.cost);
    if !task.phases.is_empty() {
        println!("  phases:");
        for phase in &task.phases {
            println!(
                "    {}. {:<16} {:?} ({} subtasks)",
                phase.number,
                phase.name,
                phase.status,
                phase.subtasks.len()
            );
        }
    }
    if !task.files_modified.is_empty() {
        println!("  files: {}", task.files_modified.join(", "));
    }
    for error in &task.errors {
        println!("  error [{}]: {}", error.kind, error.message);
    }
}
