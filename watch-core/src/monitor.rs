use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::config::SchedulerSettings;
use crate::error::WatchError;
use crate::notify::WatchEvent;
use crate::project::{validate_interval, validate_locator, OwnerId, Project, ProjectId};
use crate::retrieval::Retriever;
use crate::scheduler::Scheduler;
use crate::store::ProjectStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectStatus {
    pub project: Project,
    pub running: bool,
}

/// Management surface used by the front-end.
///
/// Lifecycle operations (add, delete, activate) are serialized so a loop is
/// always started or stopped in step with the record's `active` flag.
pub struct Monitor {
    store: ProjectStore,
    scheduler: Scheduler,
    lifecycle: Mutex<()>,
}

impl Monitor {
    pub fn new(
        store: ProjectStore,
        retriever: Arc<dyn Retriever>,
        settings: SchedulerSettings,
        events: mpsc::Sender<WatchEvent>,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(store.clone(), retriever, settings, events),
            store,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Registers a locator and starts watching it right away.
    ///
    /// Returns as soon as the loop is spawned; the first check runs in the
    /// background.
    pub async fn add_project(&self, owner: &OwnerId, locator: &str) -> Result<Project, WatchError> {
        self.add_project_named(owner, locator, None).await
    }

    pub async fn add_project_named(
        &self,
        owner: &OwnerId,
        locator: &str,
        name: Option<&str>,
    ) -> Result<Project, WatchError> {
        let locator = validate_locator(locator)?;
        let _lifecycle = self.lifecycle.lock().await;

        let project = Project::new(owner.clone(), locator, name)
            .with_interval(self.scheduler.settings().default_interval_seconds);
        let project = self.store.create(project).await;
        self.scheduler.start(owner, project.id).await;
        info!(owner = %owner, project = %project.id, url = %project.target, "project added");
        Ok(project)
    }

    /// Stops the loop, then removes the record.
    pub async fn delete_project(&self, owner: &OwnerId, id: ProjectId) -> Result<Project, WatchError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.require(owner, id).await?;

        self.scheduler.stop(owner, id).await;
        let removed = self.store.delete(owner, id).await?;
        info!(owner = %owner, project = %id, "project deleted");
        Ok(removed)
    }

    /// Pausing stops the loop before the flag is stored; resuming stores the
    /// flag and spawns a fresh loop that keeps the existing baseline.
    pub async fn set_active(&self, owner: &OwnerId, id: ProjectId, active: bool) -> Result<Project, WatchError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.require(owner, id).await?;

        if active {
            let project = self.store.update(owner, id, |p| p.with_active(true)).await?;
            if self.scheduler.start(owner, id).await {
                info!(owner = %owner, project = %id, "monitoring resumed");
            }
            Ok(project)
        } else {
            if self.scheduler.stop(owner, id).await {
                info!(owner = %owner, project = %id, "monitoring paused");
            }
            self.store.update(owner, id, |p| p.with_active(false)).await
        }
    }

    /// Takes effect after the loop's current sleep.
    pub async fn set_interval(&self, owner: &OwnerId, id: ProjectId, seconds: i64) -> Result<Project, WatchError> {
        let seconds = validate_interval(seconds)?;
        self.store.update(owner, id, |p| p.with_interval(seconds)).await
    }

    pub async fn set_notify_on_no_change(
        &self,
        owner: &OwnerId,
        id: ProjectId,
        enabled: bool,
    ) -> Result<Project, WatchError> {
        self.store
            .update(owner, id, |p| p.with_notify_on_no_change(enabled))
            .await
    }

    pub async fn rename_project(
        &self,
        owner: &OwnerId,
        id: ProjectId,
        name: Option<&str>,
    ) -> Result<Project, WatchError> {
        self.store.update(owner, id, |p| p.with_display_name(name)).await
    }

    pub async fn get_project(&self, owner: &OwnerId, id: ProjectId) -> Result<Project, WatchError> {
        self.require(owner, id).await
    }

    /// Insertion order.
    pub async fn list_projects(&self, owner: &OwnerId) -> Vec<Project> {
        self.store.list_by_owner(owner).await
    }

    pub async fn status(&self, owner: &OwnerId) -> Vec<ProjectStatus> {
        let mut statuses = Vec::new();
        for project in self.store.list_by_owner(owner).await {
            let running = self.scheduler.is_running(owner, project.id).await;
            statuses.push(ProjectStatus { project, running });
        }
        statuses
    }

    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.scheduler.shutdown().await;
    }

    async fn require(&self, owner: &OwnerId, id: ProjectId) -> Result<Project, WatchError> {
        self.store
            .get(owner, id)
            .await
            .ok_or_else(|| WatchError::ProjectNotFound {
                owner: owner.clone(),
                project: id,
            })
    }
}
