//! The relational backend: one table per resource kind, sqlx-parameterized
//! statements, a pooled connection taken per operation and always returned
//! (spec §4.2).

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::HybridServerError;
use crate::resource::{ResourceKind, WebResource};

use super::WebResourceStore;

/// Table names are drawn only from the fixed `ResourceKind` set, never from
/// user input, so the `[0-9a-zA-Z_-]` validation the spec calls for (to
/// resist injection via attacker-controlled identifiers) is a debug
/// assertion rather than a runtime check — the set of identifiers is
/// closed at compile time.
fn table_name(kind: ResourceKind) -> &'static str {
    let name = match kind {
        ResourceKind::Html => "html_resources",
        ResourceKind::Xml => "xml_resources",
        ResourceKind::Xsd => "xsd_resources",
        ResourceKind::Xslt => "xslt_resources",
    };
    debug_assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    name
}

pub struct SqlStore {
    kind: ResourceKind,
    pool: SqlitePool,
}

impl SqlStore {
    pub fn new(pool: SqlitePool, kind: ResourceKind) -> Self {
        Self { kind, pool }
    }

    /// Creates this kind's table if it doesn't already exist. The schema
    /// is otherwise externally provisioned (spec §6): the server neither
    /// migrates nor drops it.
    pub async fn ensure_table(&self) -> Result<(), HybridServerError> {
        let table = table_name(self.kind);
        let ddl = if self.kind == ResourceKind::Xslt {
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (uuid TEXT PRIMARY KEY NOT NULL, content TEXT NOT NULL, xsd TEXT NOT NULL)"
            )
        } else {
            format!("CREATE TABLE IF NOT EXISTS {table} (uuid TEXT PRIMARY KEY NOT NULL, content TEXT NOT NULL)")
        };
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_resource(&self, row: &sqlx::sqlite::SqliteRow) -> Result<WebResource, HybridServerError> {
        let uuid: String = row.try_get("uuid").map_err(|e| HybridServerError::Backend(e.to_string()))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| HybridServerError::Backend(e.to_string()))?;
        let uuid = Uuid::parse_str(&uuid)?;
        let xsd = if self.kind == ResourceKind::Xslt {
            let raw: String = row.try_get("xsd").map_err(|e| HybridServerError::Backend(e.to_string()))?;
            Some(Uuid::parse_str(&raw)?)
        } else {
            None
        };
        Ok(WebResource::new(self.kind, uuid, content, xsd))
    }
}

#[async_trait]
impl WebResourceStore for SqlStore {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn get(&self, uuid: Uuid) -> Result<Option<WebResource>, HybridServerError> {
        let table = table_name(self.kind);
        let query = format!("SELECT * FROM {table} WHERE uuid = ?1");
        let row = sqlx::query(&query)
            .bind(uuid.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| self.row_to_resource(&r)).transpose()
    }

    async fn put(&self, resource: WebResource) -> Result<(), HybridServerError> {
        let table = table_name(self.kind);
        let mut conn = self.pool.acquire().await?;
        let result = if self.kind == ResourceKind::Xslt {
            let query = format!("INSERT OR IGNORE INTO {table} (uuid, content, xsd) VALUES (?1, ?2, ?3)");
            sqlx::query(&query)
                .bind(resource.uuid.to_string())
                .bind(&resource.content)
                .bind(resource.xsd.map(|u| u.to_string()).unwrap_or_default())
                .execute(&mut *conn)
                .await?
        } else {
            let query = format!("INSERT OR IGNORE INTO {table} (uuid, content) VALUES (?1, ?2)");
            sqlx::query(&query)
                .bind(resource.uuid.to_string())
                .bind(&resource.content)
                .execute(&mut *conn)
                .await?
        };
        if result.rows_affected() == 0 {
            return Err(HybridServerError::Conflict);
        }
        Ok(())
    }

    async fn remove(&self, uuid: Uuid) -> Result<bool, HybridServerError> {
        let table = table_name(self.kind);
        let query = format!("DELETE FROM {table} WHERE uuid = ?1");
        let result = sqlx::query(&query)
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn uuid_set(&self) -> Result<HashSet<Uuid>, HybridServerError> {
        let table = table_name(self.kind);
        let query = format!("SELECT uuid FROM {table}");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                let raw: String = row.try_get("uuid").map_err(|e| HybridServerError::Backend(e.to_string()))?;
                Ok(Uuid::parse_str(&raw)?)
            })
            .collect()
    }

    async fn web_resources(&self) -> Result<Vec<WebResource>, HybridServerError> {
        let table = table_name(self.kind);
        let query = format!("SELECT * FROM {table}");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(|row| self.row_to_resource(row)).collect()
    }

    async fn close(&self) -> Result<(), HybridServerError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn put_get_remove_round_trip() {
        let store = SqlStore::new(pool().await, ResourceKind::Xml);
        store.ensure_table().await.unwrap();

        let resource = WebResource::new(ResourceKind::Xml, Uuid::new_v4(), "<a/>".to_string(), None);
        store.put(resource.clone()).await.unwrap();

        let fetched = store.get(resource.uuid).await.unwrap().unwrap();
        assert_eq!(fetched.content, "<a/>");

        let err = store.put(resource.clone()).await.unwrap_err();
        assert!(matches!(err, HybridServerError::Conflict));

        assert!(store.remove(resource.uuid).await.unwrap());
        assert!(store.get(resource.uuid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn xslt_rows_carry_xsd_link() {
        let store = SqlStore::new(pool().await, ResourceKind::Xslt);
        store.ensure_table().await.unwrap();

        let xsd_uuid = Uuid::new_v4();
        let resource = WebResource::new(ResourceKind::Xslt, Uuid::new_v4(), "<xsl/>".to_string(), Some(xsd_uuid));
        store.put(resource.clone()).await.unwrap();

        let fetched = store.get(resource.uuid).await.unwrap().unwrap();
        assert_eq!(fetched.xsd, Some(xsd_uuid));
    }
}
