//! Project command group

use super::ProjectCommands;
use maestro_core::{App, OutputFormat, Result};
use std::sync::Arc;

pub async fn run(cmd: ProjectCommands, app: &Arc<App>) -> Result<()> {
    match cmd {
        ProjectCommands::Create {
            name,
            path,
            description,
        } => {
            let project = app.projects().create(name, path, description).await?;
            println!("project {} created ({})", project.name, project.id);
            Ok(())
        }
        ProjectCommands::List => {
            let projects = app.projects().list().await;
            if app.config().output_format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&projects).unwrap_or_default());
            } else if projects.is_empty() {
                println!("no projects");
            } else {
                for project in projects {
                    println!(
                        "{}  {:<24} {}",
                        project.id,
                        project.name,
                        project.path.as_deref().unwrap_or("-")
                    );
                }
            }
            Ok(())
        }
        ProjectCommands::Get { id } => {
            let project = app.projects().get(id).await?;
            if app.config().output_format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&project).unwrap_or_default());
            } else {
                println!("project {}", project.id);
                println!("  name: {}", project.name);
                if let Some(path) = &project.path {
                    println!("  path: {path}");
                }
                if let Some(description) = &project.description {
                    println!("  description: {description}");
                }
                println!("  created: {}", project.created_at);
            }
            Ok(())
        }
        ProjectCommands::Delete { id } => {
            app.projects().delete(id).await?;
            println!("project {id} deleted");
            Ok(())
        }
        ProjectCommands::Init => {
            let path = app.config().project_path.clone();
            let name = std::path::Path::new(&path)
                .file_name()
                .map_or_else(|| "default".to_string(), |n| n.to_string_lossy().into_owned());
            let project = app.projects().create(name, Some(path), None).await?;
            println!("project {} initialized ({})", project.name, project.id);
            Ok(())
        }
    }
}
