use async_trait::async_trait;
use scheduler_core::SchedulerResult;
use scheduler_domain::{
    entities::{Node, Server},
    repositories::{NodeRepository, ServerRepository},
};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::instrument;

use crate::error_handling::{
    EntityKind, OperationContext, RepositoryErrorHelpers, RepositoryOperation,
};

pub struct SqliteServerRepository {
    pool: SqlitePool,
}

impl SqliteServerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_server(row: &SqliteRow) -> SchedulerResult<Server> {
        Ok(Server {
            id: row.try_get("id")?,
            uuid: row.try_get("uuid")?,
            name: row.try_get("name")?,
            node_id: row.try_get("node_id")?,
            status: row.try_get("status")?,
            backup_limit: row.try_get("backup_limit")?,
        })
    }
}

#[async_trait]
impl ServerRepository for SqliteServerRepository {
    #[instrument(skip(self), fields(server.id = id))]
    async fn get_server_by_id(&self, id: i64) -> SchedulerResult<Option<Server>> {
        let row = sqlx::query(
            "SELECT id, uuid, name, node_id, status, backup_limit FROM servers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                OperationContext::new(RepositoryOperation::Read, EntityKind::Server).with_id(id),
                e,
            )
        })?;

        row.as_ref().map(Self::row_to_server).transpose()
    }
}

pub struct SqliteNodeRepository {
    pool: SqlitePool,
}

impl SqliteNodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_node(row: &SqliteRow) -> SchedulerResult<Node> {
        let id: i64 = row.try_get("id")?;
        let daemon_listen: i64 = row.try_get("daemon_listen")?;
        let daemon_listen = u16::try_from(daemon_listen).map_err(|_| {
            RepositoryErrorHelpers::mapping_error(
                OperationContext::new(RepositoryOperation::Read, EntityKind::Node).with_id(id),
                format!("无效的代理端口: {daemon_listen}"),
            )
        })?;

        Ok(Node {
            id,
            name: row.try_get("name")?,
            fqdn: row.try_get("fqdn")?,
            scheme: row.try_get("scheme")?,
            daemon_listen,
            daemon_token: row.try_get("daemon_token")?,
        })
    }
}

#[async_trait]
impl NodeRepository for SqliteNodeRepository {
    #[instrument(skip(self), fields(node.id = id))]
    async fn get_node_by_id(&self, id: i64) -> SchedulerResult<Option<Node>> {
        let row = sqlx::query(
            "SELECT id, name, fqdn, scheme, daemon_listen, daemon_token FROM nodes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                OperationContext::new(RepositoryOperation::Read, EntityKind::Node).with_id(id),
                e,
            )
        })?;

        row.as_ref().map(Self::row_to_node).transpose()
    }
}
