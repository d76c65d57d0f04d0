//! Project record operations
//!
//! Projects are addressed by name or by any path ending in the project
//! directory; both are reduced to the `<letter>/<name>` relative path
//! before looking the record up.

use cboxcop_client::PathResolver;
use cboxcop_common::config::NamespaceConfig;
use cboxcop_common::{
    Error, ProjectSpace, Result, SENTINEL, project_base_name, project_rel_path,
};
use cboxcop_store::RecordStore;
use futures::TryStreamExt;
use tracing::{info, warn};

/// Printed by path probes when the project directory is missing
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Metadata instance serving a project partition
const PROJECT_INSTANCE_PREFIX: &str = "eosproject-";

/// Find a project by name or path.
///
/// Matches the derived relative path, or the bare name for projects
/// registered before partitioned paths were introduced.
pub async fn find_project(store: &dyn RecordStore, name_or_path: &str) -> Result<ProjectSpace> {
    let rel_path = project_rel_path(name_or_path)?;
    let base = project_base_name(name_or_path)?;

    let mut projects = store.stream_projects();
    while let Some(project) = projects.try_next().await? {
        if project.rel_path == rel_path || project.rel_path == base {
            return Ok(project);
        }
    }
    Err(Error::ProjectNotFound(name_or_path.to_string()))
}

/// Owning service account of a project
pub async fn project_owner(store: &dyn RecordStore, name_or_path: &str) -> Result<String> {
    Ok(find_project(store, name_or_path).await?.owner)
}

/// Register a new project
pub async fn add_project(store: &dyn RecordStore, name: &str, owner: &str) -> Result<ProjectSpace> {
    let project = ProjectSpace::new(project_base_name(name)?, owner)?;
    store.insert_project(&project).await?;
    info!("Added project {} ({}) owned by {}", project.name, project.rel_path, project.owner);
    Ok(project)
}

/// Remove a project record; the storage directory is left alone
pub async fn delete_project(store: &dyn RecordStore, name_or_path: &str) -> Result<ProjectSpace> {
    let project = find_project(store, name_or_path).await?;
    store.delete_project(&project.name).await?;
    info!("Deleted project {}", project.name);
    Ok(project)
}

/// Change the service account owning a project
pub async fn update_project_owner(
    store: &dyn RecordStore,
    name_or_path: &str,
    new_owner: &str,
) -> Result<ProjectSpace> {
    if new_owner.is_empty() {
        return Err(Error::invalid_argument("new owner is empty"));
    }
    let mut project = find_project(store, name_or_path).await?;
    store.update_project_owner(&project.name, new_owner).await?;
    info!("Project {} owner {} -> {}", project.name, project.owner, new_owner);
    project.owner = new_owner.to_string();
    Ok(project)
}

/// Absolute path of a project when it exists in storage, [`NOT_FOUND`]
/// when it does not, `"-"` when it cannot be checked
pub async fn probe_project_path(
    resolver: &dyn PathResolver,
    namespace: &NamespaceConfig,
    project: &ProjectSpace,
) -> String {
    let rel = match project.rel() {
        Ok(rel) => rel,
        Err(e) => {
            warn!("Cannot locate project {}: {}", project.name, e);
            return SENTINEL.to_string();
        }
    };
    let instance = format!("{PROJECT_INSTANCE_PREFIX}{}", rel.partition);
    let path = namespace.project_path(&rel.to_string());
    match resolver.path_exists(&instance, &path).await {
        Ok(true) => path,
        Ok(false) => NOT_FOUND.to_string(),
        Err(e) => {
            warn!("Probing {} on {} failed: {}", path, instance, e);
            SENTINEL.to_string()
        }
    }
}
