//! In-memory record store.
//!
//! Holds shares and projects in insertion order and counts mutations so
//! callers can assert that a rejected workflow left the store untouched.

use async_trait::async_trait;
use cboxcop_common::{ProjectSpace, Share, ShareId};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::store::{
    RecordStore, ShareQuery, StoreError, StoreResult, check_project_name,
    check_share_owner_update,
};

#[derive(Default)]
pub struct MemoryStore {
    shares: RwLock<Vec<Share>>,
    projects: RwLock<Vec<ProjectSpace>>,
    mutations: AtomicU64,
}

impl MemoryStore {
    /// Seed the store with existing records
    #[must_use]
    pub fn with_records(shares: Vec<Share>, projects: Vec<ProjectSpace>) -> Self {
        Self {
            shares: RwLock::new(shares),
            projects: RwLock::new(projects),
            mutations: AtomicU64::new(0),
        }
    }

    /// Number of successful writes since creation
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::Relaxed)
    }

    /// Snapshot of one share
    pub fn share(&self, id: ShareId) -> Option<Share> {
        self.shares.read().iter().find(|s| s.id == id).cloned()
    }

    /// Snapshot of all projects
    pub fn projects(&self) -> Vec<ProjectSpace> {
        self.projects.read().clone()
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_shares(&self, query: &ShareQuery) -> StoreResult<Vec<Share>> {
        Ok(self
            .shares
            .read()
            .iter()
            .filter(|s| query.matches(s))
            .cloned()
            .collect())
    }

    async fn update_share_owner(&self, id: ShareId, new_owner: &str) -> StoreResult<()> {
        check_share_owner_update(id, new_owner)?;
        let mut shares = self.shares.write();
        if let Some(share) = shares.iter_mut().find(|s| s.id == id) {
            share.owner = new_owner.to_string();
            self.record_mutation();
        }
        Ok(())
    }

    fn stream_projects(&self) -> BoxStream<'_, StoreResult<ProjectSpace>> {
        let snapshot = self.projects.read().clone();
        stream::iter(snapshot.into_iter().map(Ok)).boxed()
    }

    async fn insert_project(&self, project: &ProjectSpace) -> StoreResult<()> {
        check_project_name(&project.name)?;
        let mut projects = self.projects.write();
        if projects.iter().any(|p| p.name == project.name) {
            return Err(StoreError::Duplicate(project.name.clone()));
        }
        projects.push(project.clone());
        self.record_mutation();
        Ok(())
    }

    async fn delete_project(&self, name: &str) -> StoreResult<()> {
        check_project_name(name)?;
        let mut projects = self.projects.write();
        let before = projects.len();
        projects.retain(|p| p.name != name);
        if projects.len() != before {
            self.record_mutation();
        }
        Ok(())
    }

    async fn update_project_owner(&self, name: &str, new_owner: &str) -> StoreResult<()> {
        check_project_name(name)?;
        let mut projects = self.projects.write();
        if let Some(project) = projects.iter_mut().find(|p| p.name == name) {
            project.owner = new_owner.to_string();
            self.record_mutation();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cboxcop_common::{Permission, ShareType};
    use futures::TryStreamExt;

    fn share(id: ShareId, owner: &str, share_type: ShareType) -> Share {
        Share {
            id,
            owner: owner.into(),
            prefix: "newproject-c".into(),
            item_source: id.to_string(),
            share_with: if share_type == ShareType::PublicLink {
                String::new()
            } else {
                "bob".into()
            },
            permission: Permission::ReadWrite,
            share_type,
            token: if share_type == ShareType::PublicLink {
                format!("tok{id}")
            } else {
                String::new()
            },
            stime: 0,
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::with_records(
            vec![
                share(1, "alice", ShareType::User),
                share(2, "alice", ShareType::PublicLink),
                share(3, "carol", ShareType::Group),
            ],
            vec![ProjectSpace::new("cernbox", "cboxsvc").unwrap()],
        )
    }

    #[tokio::test]
    async fn test_find_shares_by_query() {
        let store = store();
        assert_eq!(store.find_shares(&ShareQuery::All).await.unwrap().len(), 3);
        assert_eq!(
            store
                .find_shares(&ShareQuery::Owner("alice".into()))
                .await
                .unwrap()
                .len(),
            2
        );
        let by_token = store
            .find_shares(&ShareQuery::Token("tok2".into()))
            .await
            .unwrap();
        assert_eq!(by_token.len(), 1);
        assert_eq!(by_token[0].id, 2);
        assert!(
            store
                .find_shares(&ShareQuery::Id(99))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_update_share_owner_only_touches_owner() {
        let store = store();
        let before = store.share(3).unwrap();
        store.update_share_owner(3, "dave").await.unwrap();
        let after = store.share(3).unwrap();
        assert_eq!(after.owner, "dave");
        assert_eq!(Share { owner: before.owner.clone(), ..after }, before);
        assert_eq!(store.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_update_share_owner_rejects_bad_arguments() {
        let store = store();
        assert!(matches!(
            store.update_share_owner(0, "dave").await,
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.update_share_owner(1, "").await,
            Err(StoreError::InvalidArgument(_))
        ));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_project_lifecycle() {
        let store = store();
        let atlas = ProjectSpace::new("atlas", "atlassvc").unwrap();
        store.insert_project(&atlas).await.unwrap();
        assert!(matches!(
            store.insert_project(&atlas).await,
            Err(StoreError::Duplicate(_))
        ));

        store.update_project_owner("atlas", "newsvc").await.unwrap();
        let projects: Vec<ProjectSpace> = store.stream_projects().try_collect().await.unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[1].owner, "newsvc");

        store.delete_project("atlas").await.unwrap();
        assert_eq!(store.projects().len(), 1);
        assert_eq!(store.mutation_count(), 3);
    }
}
