//! In-memory project registry
//!
//! Projects group tasks. Persistence drivers live behind external
//! surfaces; this registry is the in-process source of truth.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A project grouping tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: Uuid,
    /// Display name, unique within the registry
    pub name: String,
    /// Filesystem path, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Free-form description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Registry of known projects
#[derive(Default)]
pub struct ProjectRegistry {
    projects: RwLock<HashMap<Uuid, Project>>,
}

impl ProjectRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a project. Names must be unique.
    pub async fn create(
        &self,
        name: impl Into<String>,
        path: Option<String>,
        description: Option<String>,
    ) -> Result<Project> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Validation("project name must not be empty".into()));
        }

        let mut projects = self.projects.write().await;
        if projects.values().any(|p| p.name == name) {
            return Err(Error::Conflict(format!("project already exists: {name}")));
        }

        let project = Project {
            id: Uuid::new_v4(),
            name,
            path,
            description,
            created_at: Utc::now(),
        };
        projects.insert(project.id, project.clone());
        Ok(project)
    }

    /// Look up a project by id
    pub async fn get(&self, id: Uuid) -> Result<Project> {
        self.projects
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("project {id}")))
    }

    /// Look up a project by name
    pub async fn get_by_name(&self, name: &str) -> Option<Project> {
        self.projects
            .read()
            .await
            .values()
            .find(|p| p.name == name)
            .cloned()
    }

    /// All projects, newest first
    pub async fn list(&self) -> Vec<Project> {
        let mut projects: Vec<Project> = self.projects.read().await.values().cloned().collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        projects
    }

    /// Delete a project
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.projects
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("project {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_get_delete() {
        let registry = ProjectRegistry::new();
        let project = registry
            .create("numerology-app", Some("/work/app".into()), None)
            .await
            .unwrap();

        assert_eq!(registry.get(project.id).await.unwrap().name, "numerology-app");
        assert!(registry.get_by_name("numerology-app").await.is_some());

        registry.delete(project.id).await.unwrap();
        assert!(matches!(registry.get(project.id).await, Err(Error::NotFound(_))));
        assert!(matches!(registry.delete(project.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let registry = ProjectRegistry::new();
        registry.create("app", None, None).await.unwrap();
        assert!(matches!(
            registry.create("app", None, None).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let registry = ProjectRegistry::new();
        assert!(matches!(
            registry.create("  ", None, None).await,
            Err(Error::Validation(_))
        ));
    }
}
