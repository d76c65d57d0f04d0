//! Ownership transfer of shares on project files
//!
//! A share living in a project namespace may be handed to another
//! account, provided that account administers the project. Checks run
//! in order and each one stops the transfer:
//!
//! 1. exactly one share has the id
//! 2. the share lives under a project namespace
//! 3. the project exists
//! 4. the new owner is in `<admin_group_prefix>-<project>-admins`
//! 5. the operator confirms, unless already confirmed
//!
//! Only the share's owner column is rewritten.

use cboxcop_client::GroupDirectory;
use cboxcop_common::config::SharingConfig;
use cboxcop_common::{Error, Result, Share, ShareId};
use cboxcop_store::{RecordStore, ShareQuery};
use tracing::{info, warn};

use crate::projects::find_project;

/// Asks the operator a yes/no question about a share
pub trait Confirm: Send + Sync {
    fn confirm(&self, share: &Share, prompt: &str) -> std::io::Result<bool>;
}

/// A requested transfer
#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub share_id: ShareId,
    pub new_owner: String,
    /// Project name or path the share belongs to
    pub project: String,
    /// Skip the interactive confirmation
    pub confirmed: bool,
}

/// Validates and applies share transfers
pub struct ShareTransfer<'a> {
    store: &'a dyn RecordStore,
    groups: &'a dyn GroupDirectory,
    confirm: &'a dyn Confirm,
    sharing: &'a SharingConfig,
}

impl<'a> ShareTransfer<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn RecordStore,
        groups: &'a dyn GroupDirectory,
        confirm: &'a dyn Confirm,
        sharing: &'a SharingConfig,
    ) -> Self {
        Self {
            store,
            groups,
            confirm,
            sharing,
        }
    }

    /// Run the checks and rewrite the owner. Returns the updated share.
    pub async fn transfer(&self, request: &TransferRequest) -> Result<Share> {
        if request.new_owner.is_empty() {
            return Err(Error::invalid_argument("new owner is empty"));
        }
        if request.project.is_empty() {
            return Err(Error::invalid_argument("project is empty"));
        }

        let mut shares = self
            .store
            .find_shares(&ShareQuery::Id(request.share_id))
            .await?;
        if shares.len() != 1 {
            return Err(Error::ShareNotFound(request.share_id.to_string()));
        }
        let mut share = shares.remove(0);

        if !share.is_project_share(&self.sharing.project_prefix_marker) {
            return Err(Error::NotProjectShare(share.id));
        }

        let project = find_project(self.store, &request.project).await?;

        let group = self.sharing.admin_group(&project.name);
        let groups = self.groups.groups_of(&request.new_owner).await?;
        if !groups.contains(&group) {
            return Err(Error::NotProjectAdmin {
                account: request.new_owner.clone(),
                group,
            });
        }

        if !request.confirmed {
            let prompt = format!(
                "Transfer share {} ({}) on project {} from {} to {}?",
                share.id,
                share.file_id(),
                project.name,
                share.owner,
                request.new_owner
            );
            match self.confirm.confirm(&share, &prompt) {
                Ok(true) => {}
                Ok(false) => return Err(Error::Aborted),
                Err(e) => {
                    warn!("Reading confirmation failed: {}", e);
                    return Err(Error::Aborted);
                }
            }
        }

        self.store
            .update_share_owner(share.id, &request.new_owner)
            .await?;
        info!(
            "Transferred share {} from {} to {}",
            share.id, share.owner, request.new_owner
        );
        share.owner.clone_from(&request.new_owner);
        Ok(share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cboxcop_client::GroupError;
    use cboxcop_common::{Permission, ProjectSpace, ShareType};
    use cboxcop_store::MemoryStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticGroups(HashMap<&'static str, Vec<&'static str>>);

    #[async_trait]
    impl GroupDirectory for StaticGroups {
        async fn groups_of(&self, account: &str) -> std::result::Result<Vec<String>, GroupError> {
            Ok(self
                .0
                .get(account)
                .map(|groups| groups.iter().map(ToString::to_string).collect())
                .unwrap_or_default())
        }
    }

    /// Answers every question the same way and counts them
    struct Answer {
        yes: bool,
        asked: AtomicUsize,
    }

    impl Answer {
        const fn new(yes: bool) -> Self {
            Self {
                yes,
                asked: AtomicUsize::new(0),
            }
        }
    }

    impl Confirm for Answer {
        fn confirm(&self, _share: &Share, _prompt: &str) -> std::io::Result<bool> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            Ok(self.yes)
        }
    }

    fn share(id: ShareId, prefix: &str) -> Share {
        Share {
            id,
            owner: "labradorsvc".into(),
            prefix: prefix.into(),
            item_source: "98765".into(),
            share_with: "cernbox-team".into(),
            permission: Permission::ReadWrite,
            share_type: ShareType::Group,
            token: String::new(),
            stime: 1_500_000_000,
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::with_records(
            vec![
                share(1345, "neweosproject-cernbox"),
                share(1346, "newhome-g"),
            ],
            vec![ProjectSpace::new("cernbox", "cboxsvc").unwrap()],
        )
    }

    fn groups(admin: bool) -> StaticGroups {
        let mut members = vec!["it-dep"];
        if admin {
            members.push("cernbox-project-cernbox-admins");
        }
        StaticGroups(HashMap::from([("gonzalhu", members)]))
    }

    fn request(share_id: ShareId, confirmed: bool) -> TransferRequest {
        TransferRequest {
            share_id,
            new_owner: "gonzalhu".into(),
            project: "cernbox".into(),
            confirmed,
        }
    }

    #[tokio::test]
    async fn test_non_admin_is_denied_without_mutation() {
        let store = store();
        let groups = groups(false);
        let answer = Answer::new(true);
        let sharing = SharingConfig::default();
        let transfer = ShareTransfer::new(&store, &groups, &answer, &sharing);

        let err = transfer.transfer(&request(1345, true)).await.unwrap_err();
        match err {
            Error::NotProjectAdmin { account, group } => {
                assert_eq!(account, "gonzalhu");
                assert_eq!(group, "cernbox-project-cernbox-admins");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.mutation_count(), 0);
        assert_eq!(store.share(1345).unwrap().owner, "labradorsvc");
    }

    #[tokio::test]
    async fn test_admin_confirmed_transfer_changes_owner_only() {
        let store = store();
        let before = store.share(1345).unwrap();
        let groups = groups(true);
        let answer = Answer::new(false);
        let sharing = SharingConfig::default();
        let transfer = ShareTransfer::new(&store, &groups, &answer, &sharing);

        let updated = transfer.transfer(&request(1345, true)).await.unwrap();
        assert_eq!(updated.owner, "gonzalhu");
        let after = store.share(1345).unwrap();
        assert_eq!(after, updated);
        assert_eq!(
            Share {
                owner: before.owner.clone(),
                ..after
            },
            before
        );
        assert_eq!(answer.asked.load(Ordering::SeqCst), 0);
        assert_eq!(store.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_declined_confirmation_aborts() {
        let store = store();
        let groups = groups(true);
        let answer = Answer::new(false);
        let sharing = SharingConfig::default();
        let transfer = ShareTransfer::new(&store, &groups, &answer, &sharing);

        let err = transfer.transfer(&request(1345, false)).await.unwrap_err();
        assert!(matches!(err, Error::Aborted));
        assert_eq!(answer.asked.load(Ordering::SeqCst), 1);
        assert_eq!(store.mutation_count(), 0);

        let yes = Answer::new(true);
        let transfer = ShareTransfer::new(&store, &groups, &yes, &sharing);
        transfer.transfer(&request(1345, false)).await.unwrap();
        assert_eq!(store.share(1345).unwrap().owner, "gonzalhu");
    }

    #[tokio::test]
    async fn test_preconditions_checked_in_order() {
        let store = store();
        let groups = groups(true);
        let answer = Answer::new(true);
        let sharing = SharingConfig::default();
        let transfer = ShareTransfer::new(&store, &groups, &answer, &sharing);

        assert!(matches!(
            transfer.transfer(&request(9999, true)).await,
            Err(Error::ShareNotFound(_))
        ));
        assert!(matches!(
            transfer.transfer(&request(1346, true)).await,
            Err(Error::NotProjectShare(1346))
        ));

        let mut missing_project = request(1345, true);
        missing_project.project = "atlas".into();
        assert!(matches!(
            transfer.transfer(&missing_project).await,
            Err(Error::ProjectNotFound(_))
        ));

        let mut no_owner = request(1345, true);
        no_owner.new_owner.clear();
        assert!(matches!(
            transfer.transfer(&no_owner).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(store.mutation_count(), 0);
    }
}
