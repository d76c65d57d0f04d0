//! Project reconciliation against the storage namespace
//!
//! A project is an orphan when its directory is missing from its
//! partition. Partitions are listed lazily, at most once per
//! [`PartitionCache`], and the listing is authoritative for the rest of
//! the run.

use cboxcop_client::{ListError, NamespaceLister};
use cboxcop_common::{ProjectSpace, RelPath, RelPathError, Result};
use cboxcop_store::RecordStore;
use futures::TryStreamExt;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Memoized partition listings for one reconciliation run
pub struct PartitionCache<'a> {
    lister: &'a dyn NamespaceLister,
    listed: HashMap<String, HashSet<String>>,
}

impl<'a> PartitionCache<'a> {
    #[must_use]
    pub fn new(lister: &'a dyn NamespaceLister) -> Self {
        Self {
            lister,
            listed: HashMap::new(),
        }
    }

    /// Whether the project directory is absent from its partition
    pub async fn is_orphan(&mut self, rel: &RelPath) -> std::result::Result<bool, ListError> {
        if !self.listed.contains_key(&rel.partition) {
            let entries = self.lister.list(&rel.partition).await?;
            debug!("Partition {} lists {} entries", rel.partition, entries.len());
            self.listed
                .insert(rel.partition.clone(), entries.into_iter().collect());
        }
        Ok(self
            .listed
            .get(&rel.partition)
            .is_none_or(|present| !present.contains(&rel.name)))
    }

    /// Number of partitions listed so far
    #[must_use]
    pub fn listed_partitions(&self) -> usize {
        self.listed.len()
    }
}

/// Predicate applied to projects while streaming them from the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProjectFilter {
    All,
    Owner(String),
    Orphan,
}

impl ProjectFilter {
    /// Owner filter; an empty owner selects every project
    #[must_use]
    pub fn owner(owner: &str) -> Self {
        if owner.is_empty() {
            Self::All
        } else {
            Self::Owner(owner.to_string())
        }
    }
}

/// Outcome of a filtered project listing
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Projects the filter selected, in store order
    pub matched: Vec<ProjectSpace>,
    /// Projects whose relative path could not be checked
    pub malformed: Vec<(ProjectSpace, RelPathError)>,
}

/// Stream every project from the store and keep those `filter` selects
pub async fn reconcile(
    store: &dyn RecordStore,
    lister: &dyn NamespaceLister,
    filter: &ProjectFilter,
) -> Result<Reconciliation> {
    let mut cache = PartitionCache::new(lister);
    let mut outcome = Reconciliation::default();
    let mut projects = store.stream_projects();

    while let Some(project) = projects.try_next().await? {
        let keep = match filter {
            ProjectFilter::All => true,
            ProjectFilter::Owner(owner) => &project.owner == owner,
            ProjectFilter::Orphan => match project.rel() {
                Ok(rel) => cache.is_orphan(&rel).await?,
                Err(e) => {
                    warn!("Project {} has a malformed relative path: {}", project.name, e);
                    outcome.malformed.push((project, e));
                    continue;
                }
            },
        };
        if keep {
            outcome.matched.push(project);
        }
    }

    debug!(
        "Filter {:?} matched {} projects ({} partitions listed, {} malformed)",
        filter,
        outcome.matched.len(),
        cache.listed_partitions(),
        outcome.malformed.len()
    );
    Ok(outcome)
}
