use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::WatchError;
use crate::project::{OwnerId, Project, ProjectId};

/// Canonical in-memory record of every project, partitioned by owner.
///
/// Each owner's projects are kept in insertion order. Updates run the mutator
/// against the current record under the write lock and swap the result in, so
/// a caller never writes back a stale copy.
#[derive(Debug, Clone, Default)]
pub struct ProjectStore {
    inner: Arc<RwLock<HashMap<OwnerId, Vec<Project>>>>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, project: Project) -> Project {
        let mut inner = self.inner.write().await;
        let slot = inner.entry(project.owner_id.clone()).or_default();
        slot.push(project.clone());
        debug!(owner = %project.owner_id, project = %project.id, "project stored");
        project
    }

    pub async fn get(&self, owner: &OwnerId, id: ProjectId) -> Option<Project> {
        let inner = self.inner.read().await;
        inner
            .get(owner)
            .and_then(|projects| projects.iter().find(|p| p.id == id))
            .cloned()
    }

    pub async fn list_by_owner(&self, owner: &OwnerId) -> Vec<Project> {
        let inner = self.inner.read().await;
        inner.get(owner).cloned().unwrap_or_default()
    }

    pub async fn update<F>(&self, owner: &OwnerId, id: ProjectId, mutator: F) -> Result<Project, WatchError>
    where
        F: FnOnce(Project) -> Project,
    {
        self.update_with(owner, id, |current| (mutator(current), ()))
            .await
            .map(|(project, ())| project)
    }

    /// Like [`ProjectStore::update`], but the mutator may also hand back a
    /// value computed from the same record it replaced.
    pub async fn update_with<F, R>(
        &self,
        owner: &OwnerId,
        id: ProjectId,
        mutator: F,
    ) -> Result<(Project, R), WatchError>
    where
        F: FnOnce(Project) -> (Project, R),
    {
        let mut inner = self.inner.write().await;
        let slot = inner
            .get_mut(owner)
            .and_then(|projects| projects.iter_mut().find(|p| p.id == id))
            .ok_or_else(|| not_found(owner, id))?;

        let (mut next, extra) = mutator(slot.clone());
        // identity is fixed for the record's lifetime
        next.id = slot.id;
        next.owner_id = slot.owner_id.clone();
        *slot = next.clone();
        Ok((next, extra))
    }

    pub async fn delete(&self, owner: &OwnerId, id: ProjectId) -> Result<Project, WatchError> {
        let mut inner = self.inner.write().await;
        let projects = inner.get_mut(owner).ok_or_else(|| not_found(owner, id))?;
        let index = projects
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| not_found(owner, id))?;
        let removed = projects.remove(index);
        if projects.is_empty() {
            inner.remove(owner);
        }
        debug!(owner = %owner, project = %id, "project removed");
        Ok(removed)
    }
}

fn not_found(owner: &OwnerId, id: ProjectId) -> WatchError {
    WatchError::ProjectNotFound {
        owner: owner.clone(),
        project: id,
    }
}
