//! MySQL backend for the record store.
//!
//! Nullable text columns are coalesced to empty strings and numeric
//! columns cast to signed 64-bit so every row decodes the same way
//! regardless of the deployed schema revision.

use async_trait::async_trait;
use cboxcop_common::{Permission, ProjectSpace, Share, ShareId, ShareType};
use futures::StreamExt;
use futures::stream::BoxStream;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::{debug, info, warn};

use crate::store::{
    RecordStore, ShareQuery, StoreResult, check_project_name, check_share_owner_update,
};

const SHARE_COLUMNS: &str = "SELECT CAST(id AS SIGNED) AS id, \
     COALESCE(uid_owner, '') AS uid_owner, \
     COALESCE(share_with, '') AS share_with, \
     COALESCE(fileid_prefix, '') AS fileid_prefix, \
     COALESCE(item_source, '') AS item_source, \
     CAST(COALESCE(stime, 0) AS SIGNED) AS stime, \
     CAST(permissions AS SIGNED) AS permissions, \
     CAST(share_type AS SIGNED) AS share_type, \
     COALESCE(token, '') AS token \
     FROM oc_share";

const PROJECT_COLUMNS: &str = "SELECT project_name, eos_relative_path, project_owner \
     FROM cernbox_project_mapping";

#[derive(sqlx::FromRow)]
struct ShareRow {
    id: i64,
    uid_owner: String,
    share_with: String,
    fileid_prefix: String,
    item_source: String,
    stime: i64,
    permissions: i64,
    share_type: i64,
    token: String,
}

impl From<ShareRow> for Share {
    fn from(row: ShareRow) -> Self {
        let permissions = i32::try_from(row.permissions).unwrap_or(i32::MAX);
        let share_type = i32::try_from(row.share_type).unwrap_or(i32::MIN);
        Self {
            id: row.id,
            owner: row.uid_owner,
            prefix: row.fileid_prefix,
            item_source: row.item_source,
            share_with: row.share_with,
            permission: Permission::from_code(permissions),
            share_type: ShareType::from_code(share_type),
            token: row.token,
            stime: row.stime,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    project_name: String,
    eos_relative_path: String,
    project_owner: String,
}

impl From<ProjectRow> for ProjectSpace {
    fn from(row: ProjectRow) -> Self {
        Self {
            name: row.project_name,
            rel_path: row.eos_relative_path,
            owner: row.project_owner,
        }
    }
}

/// Record store backed by the sharing MySQL database
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Connect a pool to the given DSN
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for MySqlStore {
    async fn find_shares(&self, query: &ShareQuery) -> StoreResult<Vec<Share>> {
        debug!("Querying shares: {:?}", query);
        let rows = match query {
            ShareQuery::Id(id) => {
                sqlx::query_as::<_, ShareRow>(&format!("{SHARE_COLUMNS} WHERE id = ?"))
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            ShareQuery::Owner(owner) => {
                sqlx::query_as::<_, ShareRow>(&format!("{SHARE_COLUMNS} WHERE uid_owner = ?"))
                    .bind(owner)
                    .fetch_all(&self.pool)
                    .await?
            }
            ShareQuery::ShareWith(with) => {
                sqlx::query_as::<_, ShareRow>(&format!("{SHARE_COLUMNS} WHERE share_with = ?"))
                    .bind(with)
                    .fetch_all(&self.pool)
                    .await?
            }
            ShareQuery::Token(token) => {
                sqlx::query_as::<_, ShareRow>(&format!("{SHARE_COLUMNS} WHERE token = ?"))
                    .bind(token)
                    .fetch_all(&self.pool)
                    .await?
            }
            ShareQuery::All => {
                sqlx::query_as::<_, ShareRow>(SHARE_COLUMNS)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let shares: Vec<Share> = rows.into_iter().map(Share::from).collect();
        for share in shares.iter().filter(|s| !s.is_consistent()) {
            warn!(
                "Share {} has inconsistent link fields for type {}",
                share.id,
                share.share_type.as_str()
            );
        }
        Ok(shares)
    }

    async fn update_share_owner(&self, id: ShareId, new_owner: &str) -> StoreResult<()> {
        check_share_owner_update(id, new_owner)?;
        let result = sqlx::query("UPDATE oc_share SET uid_owner = ? WHERE id = ?")
            .bind(new_owner)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            warn!("Updating owner of share {} changed no rows", id);
        }
        info!("Share {} now owned by {}", id, new_owner);
        Ok(())
    }

    fn stream_projects(&self) -> BoxStream<'_, StoreResult<ProjectSpace>> {
        sqlx::query_as::<_, ProjectRow>(PROJECT_COLUMNS)
            .fetch(&self.pool)
            .map(|row| row.map(ProjectSpace::from).map_err(Into::into))
            .boxed()
    }

    async fn insert_project(&self, project: &ProjectSpace) -> StoreResult<()> {
        check_project_name(&project.name)?;
        sqlx::query(
            "INSERT INTO cernbox_project_mapping (project_name, eos_relative_path, project_owner) \
             VALUES (?, ?, ?)",
        )
        .bind(&project.name)
        .bind(&project.rel_path)
        .bind(&project.owner)
        .execute(&self.pool)
        .await?;
        info!("Registered project {} at {}", project.name, project.rel_path);
        Ok(())
    }

    async fn delete_project(&self, name: &str) -> StoreResult<()> {
        check_project_name(name)?;
        sqlx::query("DELETE FROM cernbox_project_mapping WHERE project_name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        info!("Deleted project {}", name);
        Ok(())
    }

    async fn update_project_owner(&self, name: &str, new_owner: &str) -> StoreResult<()> {
        check_project_name(name)?;
        sqlx::query("UPDATE cernbox_project_mapping SET project_owner = ? WHERE project_name = ?")
            .bind(new_owner)
            .bind(name)
            .execute(&self.pool)
            .await?;
        info!("Project {} now owned by {}", name, new_owner);
        Ok(())
    }
}
