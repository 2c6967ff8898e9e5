//! The artifact store itself.

use serde::{Deserialize, Serialize};
use sqlx::{AnyPool, Row};

use quiver_core::sql::rewrite_placeholders;
use quiver_core::{Dialect, TableNames};

use crate::digest::Digest;
use crate::error::StoreError;

/// The three kinds of artifact body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// A plugin script in the quiver script language.
    Script,
    /// A read-only SQL template.
    Select,
    /// A dashboard body served by the external UI runner.
    Ui,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Script => "script",
            ArtifactKind::Select => "select",
            ArtifactKind::Ui => "ui",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "script" => Ok(ArtifactKind::Script),
            "select" => Ok(ArtifactKind::Select),
            "ui" => Ok(ArtifactKind::Ui),
            other => Err(StoreError::UnknownKind(other.to_string())),
        }
    }
}

/// An immutable artifact: body plus kind, keyed by digest.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub digest: Digest,
    pub body: String,
    pub kind: ArtifactKind,
}

impl Artifact {
    /// Re-hash the body and compare with the stored digest.
    pub fn verify_integrity(&self) -> bool {
        Digest::of(&self.body) == self.digest
    }
}

/// Content-addressed store backed by the metadata database.
///
/// `put` is idempotent: the same body always maps to the same digest and is
/// inserted at most once. There is no update or delete; garbage collection
/// of unreferenced artifacts is deliberately out of scope.
#[derive(Clone)]
pub struct ArtifactStore {
    pool: AnyPool,
    dialect: Dialect,
    table: String,
}

impl ArtifactStore {
    pub fn new(pool: AnyPool, dialect: Dialect, tables: &TableNames) -> Self {
        Self {
            pool,
            dialect,
            table: tables.qualified(&tables.artifacts),
        }
    }

    /// Create the backing table when it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                digest TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                kind TEXT NOT NULL
            )",
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    /// Store a body, returning its digest. Inserts only when absent.
    pub async fn put(&self, body: &str, kind: ArtifactKind) -> Result<Digest, StoreError> {
        let digest = Digest::of(body);
        self.put_with_digest(&digest, body, kind).await?;
        Ok(digest)
    }

    /// Insert a body under a pre-computed digest. Meta-tools compute the
    /// digest up front so the registry row can reference it in the same
    /// transaction.
    pub async fn put_with_digest(
        &self,
        digest: &Digest,
        body: &str,
        kind: ArtifactKind,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (digest, body, kind) VALUES (:digest, :body, :kind)
             ON CONFLICT (digest) DO NOTHING",
            self.table
        );
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);
        sqlx::query(&sql)
            .bind(digest.as_str())
            .bind(body)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        tracing::debug!(digest = %digest.short(), kind = kind.as_str(), "artifact stored");
        Ok(())
    }

    /// Fetch an artifact by digest. `None` when unknown.
    pub async fn get(&self, digest: &Digest) -> Result<Option<Artifact>, StoreError> {
        let sql = format!(
            "SELECT body, kind FROM {} WHERE digest = :digest",
            self.table
        );
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);
        let row = sqlx::query(&sql)
            .bind(digest.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let body: String = row.try_get("body")?;
                let kind: String = row.try_get("kind")?;
                Ok(Some(Artifact {
                    digest: digest.clone(),
                    body,
                    kind: ArtifactKind::parse(&kind)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Whether a digest is present without fetching the body.
    pub async fn contains(&self, digest: &Digest) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {} WHERE digest = :digest",
            self.table
        );
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);
        let row = sqlx::query(&sql)
            .bind(digest.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? > 0)
    }

    /// Count stored artifacts. Used by seeding to decide first-run state.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", self.table);
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>("n")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> ArtifactStore {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = ArtifactStore::new(pool, Dialect::Sqlite, &TableNames::default());
        store.ensure_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn put_is_idempotent_on_digest() {
        let store = memory_store().await;
        let a = store.put("SELECT 1", ArtifactKind::Select).await.unwrap();
        let b = store.put("SELECT 1", ArtifactKind::Select).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn get_returns_stored_body_and_kind() {
        let store = memory_store().await;
        let digest = store
            .put("class T(Tool) {}", ArtifactKind::Script)
            .await
            .unwrap();
        let artifact = store.get(&digest).await.unwrap().unwrap();
        assert_eq!(artifact.body, "class T(Tool) {}");
        assert_eq!(artifact.kind, ArtifactKind::Script);
        assert!(artifact.verify_integrity());
        assert!(store.contains(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn get_unknown_digest_is_none() {
        let store = memory_store().await;
        let missing = Digest::of("never stored");
        assert!(store.get(&missing).await.unwrap().is_none());
        assert!(!store.contains(&missing).await.unwrap());
    }
}
