//! Bounded-concurrency path resolution for share listings
//!
//! Every share of a listing becomes one display row. When paths are
//! requested, each row also carries the share's filesystem path, looked
//! up through a [`PathResolver`] with at most `concurrency` lookups in
//! flight:
//!
//! ```text
//!   shares ──► stream::iter ──► buffer_unordered(C) ──► collect ──► rows
//!                                  │  │  │
//!                                  ▼  ▼  ▼
//!                              resolve_path (≤ C outstanding)
//! ```
//!
//! Rows come back in completion order. A failed, timed out or cancelled
//! lookup never aborts the batch: the row's path becomes `"-"` and the
//! row is flagged as degraded.

use cboxcop_client::{PathResolver, ResolveError};
use cboxcop_common::{SENTINEL, Share, ShareId};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Knobs for one resolution batch
#[derive(Clone, Debug)]
pub struct ResolveOptions {
    /// Maximum lookups in flight
    pub concurrency: usize,
    /// Resolve and show the path column
    pub print_paths: bool,
    /// Give up on a single lookup after this long
    pub task_timeout: Option<Duration>,
    /// Give up on every outstanding lookup after this long
    pub batch_timeout: Option<Duration>,
    /// Base URL public link tokens are appended to
    pub public_link_base: String,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            concurrency: 100,
            print_paths: false,
            task_timeout: None,
            batch_timeout: None,
            public_link_base: String::new(),
        }
    }
}

impl ResolveOptions {
    /// Ceiling actually applied; listings without paths run sequentially
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        if self.print_paths {
            self.concurrency.max(1)
        } else {
            1
        }
    }
}

/// One display row of a share listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShareRow {
    /// Position of the share in the input batch
    #[serde(skip)]
    pub index: usize,
    pub id: ShareId,
    pub owner: String,
    pub share_with: String,
    pub permission: String,
    pub share_type: String,
    pub file_id: String,
    pub public_link: String,
    pub created: String,
    /// Resolved path; absent when paths were not requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// The path lookup failed and `path` holds the placeholder
    pub degraded: bool,
}

impl ShareRow {
    /// Presentation columns of a share, without a path
    #[must_use]
    pub fn new(index: usize, share: &Share, public_link_base: &str) -> Self {
        Self {
            index,
            id: share.id,
            owner: share.owner.clone(),
            share_with: share.display_share_with().to_string(),
            permission: share.permission.as_str().to_string(),
            share_type: share.share_type.as_str().to_string(),
            file_id: share.file_id(),
            public_link: share
                .public_link(public_link_base)
                .unwrap_or_else(|| SENTINEL.to_string()),
            created: share.created_at().map_or_else(
                || SENTINEL.to_string(),
                |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
            path: None,
            degraded: false,
        }
    }

    fn degrade(&mut self) {
        self.path = Some(SENTINEL.to_string());
        self.degraded = true;
    }
}

/// Resolve a batch of shares into display rows.
///
/// Returns only once every share has a row. With `print_paths` unset no
/// lookup is made at all.
pub async fn resolve_all(
    resolver: &dyn PathResolver,
    shares: &[Share],
    options: &ResolveOptions,
    cancel: &CancellationToken,
) -> Vec<ShareRow> {
    let concurrency = options.effective_concurrency();
    let deadline = options.batch_timeout.map(|t| Instant::now() + t);
    debug!(
        "Resolving {} shares (paths: {}, concurrency: {})",
        shares.len(),
        options.print_paths,
        concurrency
    );

    let rows: Vec<ShareRow> = stream::iter(shares.iter().enumerate())
        .map(|(index, share)| async move {
            let mut row = ShareRow::new(index, share, &options.public_link_base);
            if options.print_paths {
                match lookup(resolver, share, options.task_timeout, deadline, cancel).await {
                    Ok(path) => row.path = Some(path),
                    Err(e) => {
                        warn!("Path of share {} ({}) unavailable: {}", share.id, row.file_id, e);
                        row.degrade();
                    }
                }
            }
            row
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let degraded = rows.iter().filter(|r| r.degraded).count();
    if degraded > 0 {
        warn!("{} of {} share paths could not be resolved", degraded, rows.len());
    }
    rows
}

/// A single lookup bounded by the task timeout, the batch deadline and
/// the cancellation token
async fn lookup(
    resolver: &dyn PathResolver,
    share: &Share,
    task_timeout: Option<Duration>,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
) -> Result<String, ResolveError> {
    let call = async {
        let call = resolver.resolve_path(&share.prefix, &share.item_source);
        match task_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(ResolveError::Timeout)),
            None => call.await,
        }
    };
    let batch_expired = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ResolveError::Cancelled),
        () = batch_expired => Err(ResolveError::Timeout),
        result = call => result,
    }
}

/// Restore the input order of a resolved batch
#[must_use]
pub fn into_input_order(mut rows: Vec<ShareRow>) -> Vec<ShareRow> {
    rows.sort_by_key(|row| row.index);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cboxcop_common::{Permission, ShareType};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolver tracking calls and the peak number of concurrent lookups
    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl CountingResolver {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl PathResolver for CountingResolver {
        async fn resolve_path(&self, prefix: &str, item_source: &str) -> Result<String, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match item_source {
                "hang" => std::future::pending().await,
                "bad" => Err(ResolveError::RetriesExhausted {
                    attempts: 5,
                    last_status: 503,
                }),
                _ => Ok(format!("/eos/{prefix}/{item_source}")),
            }
        }

        async fn path_exists(&self, _instance: &str, _path: &str) -> Result<bool, ResolveError> {
            Ok(true)
        }
    }

    fn share(id: ShareId, item_source: &str) -> Share {
        Share {
            id,
            owner: "alice".into(),
            prefix: "newproject-c".into(),
            item_source: item_source.into(),
            share_with: "bob".into(),
            permission: Permission::ReadOnly,
            share_type: ShareType::User,
            token: String::new(),
            stime: 0,
        }
    }

    fn batch(n: i64) -> Vec<Share> {
        (1..=n).map(|id| share(id, &id.to_string())).collect()
    }

    fn with_paths(concurrency: usize) -> ResolveOptions {
        ResolveOptions {
            concurrency,
            print_paths: true,
            ..ResolveOptions::default()
        }
    }

    #[tokio::test]
    async fn test_no_lookups_without_paths() {
        let resolver = CountingResolver::default();
        let options = ResolveOptions {
            concurrency: 50,
            ..ResolveOptions::default()
        };
        assert_eq!(options.effective_concurrency(), 1);

        let rows = resolve_all(&resolver, &batch(10), &options, &CancellationToken::new()).await;
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|r| r.path.is_none() && !r.degraded));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_lookups_bounded_by_concurrency() {
        for (n, c) in [(20, 4), (3, 8), (10, 1)] {
            let resolver = CountingResolver::with_delay(Duration::from_millis(20));
            let rows =
                resolve_all(&resolver, &batch(n), &with_paths(c), &CancellationToken::new()).await;
            assert_eq!(rows.len(), usize::try_from(n).unwrap());
            assert_eq!(resolver.calls.load(Ordering::SeqCst), rows.len());
            let peak = resolver.peak.load(Ordering::SeqCst);
            assert!(peak <= c.min(rows.len()), "peak {peak} for n={n} c={c}");
        }
    }

    #[tokio::test]
    async fn test_rows_are_permutation_of_sequential_result() {
        let shares = batch(25);
        let resolver = CountingResolver::with_delay(Duration::from_millis(1));
        let concurrent =
            resolve_all(&resolver, &shares, &with_paths(8), &CancellationToken::new()).await;
        let sequential =
            resolve_all(&resolver, &shares, &with_paths(1), &CancellationToken::new()).await;

        let ids: HashSet<ShareId> = concurrent.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), shares.len());
        assert_eq!(into_input_order(concurrent), into_input_order(sequential));
    }

    #[tokio::test]
    async fn test_failed_lookup_degrades_row() {
        let shares = vec![share(1, "10"), share(2, "bad")];
        let resolver = CountingResolver::default();
        let rows = into_input_order(
            resolve_all(&resolver, &shares, &with_paths(2), &CancellationToken::new()).await,
        );

        assert_eq!(rows[0].path.as_deref(), Some("/eos/newproject-c/10"));
        assert!(!rows[0].degraded);
        assert_eq!(rows[1].path.as_deref(), Some(SENTINEL));
        assert!(rows[1].degraded);
    }

    #[tokio::test]
    async fn test_task_timeout_degrades_stuck_lookup() {
        let shares = vec![share(1, "hang"), share(2, "20")];
        let resolver = CountingResolver::default();
        let options = ResolveOptions {
            task_timeout: Some(Duration::from_millis(50)),
            ..with_paths(2)
        };
        let rows = into_input_order(
            resolve_all(&resolver, &shares, &options, &CancellationToken::new()).await,
        );
        assert!(rows[0].degraded);
        assert_eq!(rows[1].path.as_deref(), Some("/eos/newproject-c/20"));
    }

    #[tokio::test]
    async fn test_batch_deadline_completes_barrier() {
        let shares = vec![share(1, "hang"), share(2, "hang"), share(3, "hang")];
        let resolver = CountingResolver::default();
        let options = ResolveOptions {
            batch_timeout: Some(Duration::from_millis(50)),
            ..with_paths(1)
        };
        let rows = resolve_all(&resolver, &shares, &options, &CancellationToken::new()).await;
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.degraded));
    }

    #[tokio::test]
    async fn test_cancelled_batch_degrades_every_row() {
        let resolver = CountingResolver::with_delay(Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let rows = resolve_all(&resolver, &batch(6), &with_paths(2), &cancel).await;
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| r.degraded && r.path.as_deref() == Some(SENTINEL)));
    }

    #[test]
    fn test_public_link_row() {
        let mut link = share(9, "1");
        link.share_type = ShareType::PublicLink;
        link.share_with = String::new();
        link.token = "XyZ".into();
        let row = ShareRow::new(0, &link, "https://cernbox.cern.ch/index.php/s");
        assert_eq!(row.public_link, "https://cernbox.cern.ch/index.php/s/XyZ");
        assert_eq!(row.share_with, SENTINEL);
        assert_eq!(row.share_type, "public-link");
        assert_eq!(row.file_id, "eosproject-c:1");
        assert_eq!(row.created, "1970-01-01 00:00:00");
    }
}
