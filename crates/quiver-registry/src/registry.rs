//! Typed CRUD over the registry tables.
//!
//! Upserts enforce the record invariants: composite-key uniqueness (via
//! `ON CONFLICT` updates), referenced digests existing in the artifact
//! store, and the resource static-xor-dynamic shape. Meta-tools use the
//! `*_with_artifact` variants, which commit the artifact insert and the
//! registry upsert in a single transaction so no reader ever observes a
//! record pointing at an uncommitted artifact.

use serde_json::Value;
use sqlx::{AnyPool, Row};

use quiver_core::sql::rewrite_placeholders;
use quiver_core::{Dialect, Persona, TableNames};
use quiver_store::rows::{get_bool, get_i64, get_opt_string};
use quiver_store::{ArtifactKind, ArtifactStore, Digest};

use crate::error::RegistryError;
use crate::records::{
    IconFormat, IconRecord, MacroRecord, PolicyCategory, PolicyRuleType, PromptArgument,
    PromptRecord, ResourceRecord, SecurityPolicyRecord, ToolManual, ToolRecord,
};

/// Handle to the registry tables in the metadata database.
#[derive(Clone)]
pub struct Registry {
    pool: AnyPool,
    dialect: Dialect,
    tables: TableNames,
    store: ArtifactStore,
}

impl Registry {
    pub fn new(pool: AnyPool, dialect: Dialect, tables: TableNames) -> Self {
        let store = ArtifactStore::new(pool.clone(), dialect, &tables);
        Self {
            pool,
            dialect,
            tables,
            store,
        }
    }

    /// The artifact store sharing this registry's pool.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    fn rewrite(&self, sql: &str) -> String {
        rewrite_placeholders(sql, self.dialect).0
    }

    /// Create every registry table that does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), RegistryError> {
        self.store.ensure_schema().await?;
        let t = &self.tables;
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    name TEXT NOT NULL,
                    persona TEXT NOT NULL,
                    description TEXT NOT NULL,
                    input_schema TEXT NOT NULL,
                    artifact_digest TEXT NOT NULL,
                    is_auto_created INTEGER NOT NULL DEFAULT 0,
                    group_name TEXT NOT NULL DEFAULT 'general',
                    manual TEXT,
                    PRIMARY KEY (name, persona)
                )",
                t.qualified(&t.tools)
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    uri TEXT NOT NULL,
                    persona TEXT NOT NULL,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL,
                    mime_type TEXT NOT NULL DEFAULT 'text/plain',
                    is_dynamic INTEGER NOT NULL DEFAULT 0,
                    static_body TEXT,
                    artifact_digest TEXT,
                    group_name TEXT NOT NULL DEFAULT 'general',
                    PRIMARY KEY (uri, persona)
                )",
                t.qualified(&t.resources)
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    name TEXT NOT NULL,
                    persona TEXT NOT NULL,
                    description TEXT NOT NULL,
                    template TEXT NOT NULL,
                    arguments_schema TEXT NOT NULL,
                    group_name TEXT NOT NULL DEFAULT 'general',
                    PRIMARY KEY (name, persona)
                )",
                t.qualified(&t.prompts)
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    name TEXT PRIMARY KEY,
                    description TEXT NOT NULL,
                    template TEXT NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1
                )",
                t.qualified(&t.macros)
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    name TEXT PRIMARY KEY,
                    format TEXT NOT NULL,
                    body_base64 TEXT NOT NULL
                )",
                t.qualified(&t.icons)
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY,
                    rule_type TEXT NOT NULL,
                    category TEXT NOT NULL,
                    pattern TEXT NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    description TEXT
                )",
                t.qualified(&t.security_policies)
            ),
        ];
        for ddl in statements {
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    // ===== Tools =====

    /// Look up a tool by its composite key.
    pub async fn get_tool(
        &self,
        name: &str,
        persona: &Persona,
    ) -> Result<Option<ToolRecord>, RegistryError> {
        let sql = self.rewrite(&format!(
            "SELECT name, persona, description, input_schema, artifact_digest,
                    is_auto_created, group_name, manual
             FROM {} WHERE name = :name AND persona = :persona",
            self.tables.qualified(&self.tables.tools)
        ));
        let row = sqlx::query(&sql)
            .bind(name)
            .bind(persona.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| tool_from_row(&r)).transpose()
    }

    /// Insert or replace a tool row. The referenced digest must already be
    /// stored; use [`Registry::upsert_tool_with_artifact`] to write both
    /// atomically.
    pub async fn upsert_tool(&self, record: &ToolRecord) -> Result<(), RegistryError> {
        if !self.store.contains(&record.artifact_digest).await? {
            return Err(RegistryError::DanglingDigest {
                digest: record.artifact_digest.to_string(),
            });
        }
        let sql = self.tool_upsert_sql();
        self.bind_tool(sqlx::query(&sql), record)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically store an artifact and upsert the tool row pointing at it.
    pub async fn upsert_tool_with_artifact(
        &self,
        record: &ToolRecord,
        body: &str,
        kind: ArtifactKind,
    ) -> Result<Digest, RegistryError> {
        let digest = Digest::of(body);
        let mut tx = self.pool.begin().await?;

        let artifact_sql = self.rewrite(&format!(
            "INSERT INTO {} (digest, body, kind) VALUES (:digest, :body, :kind)
             ON CONFLICT (digest) DO NOTHING",
            self.tables.qualified(&self.tables.artifacts)
        ));
        sqlx::query(&artifact_sql)
            .bind(digest.as_str())
            .bind(body)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?;

        let mut record = record.clone();
        record.artifact_digest = digest.clone();
        let sql = self.tool_upsert_sql();
        self.bind_tool(sqlx::query(&sql), &record)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(
            tool = %record.name,
            persona = %record.persona,
            digest = %digest.short(),
            "tool upserted"
        );
        Ok(digest)
    }

    fn tool_upsert_sql(&self) -> String {
        self.rewrite(&format!(
            "INSERT INTO {} (name, persona, description, input_schema, artifact_digest,
                             is_auto_created, group_name, manual)
             VALUES (:name, :persona, :description, :input_schema, :artifact_digest,
                     :is_auto_created, :group_name, :manual)
             ON CONFLICT (name, persona) DO UPDATE SET
                 description = excluded.description,
                 input_schema = excluded.input_schema,
                 artifact_digest = excluded.artifact_digest,
                 is_auto_created = excluded.is_auto_created,
                 group_name = excluded.group_name,
                 manual = excluded.manual",
            self.tables.qualified(&self.tables.tools)
        ))
    }

    fn bind_tool<'q>(
        &self,
        query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
        record: &'q ToolRecord,
    ) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
        query
            .bind(record.name.as_str())
            .bind(record.persona.as_str())
            .bind(record.description.as_str())
            .bind(record.input_schema.to_string())
            .bind(record.artifact_digest.as_str())
            .bind(record.is_auto_created as i64)
            .bind(record.group.as_str())
            .bind(
                record
                    .manual
                    .as_ref()
                    .map(|m| serde_json::to_string(m).unwrap_or_default()),
            )
    }

    /// Delete a tool row. Returns whether a row was removed.
    pub async fn delete_tool(
        &self,
        name: &str,
        persona: &Persona,
    ) -> Result<bool, RegistryError> {
        let sql = self.rewrite(&format!(
            "DELETE FROM {} WHERE name = :name AND persona = :persona",
            self.tables.qualified(&self.tables.tools)
        ));
        let result = sqlx::query(&sql)
            .bind(name)
            .bind(persona.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update only the manual column of a tool.
    pub async fn update_tool_manual(
        &self,
        name: &str,
        persona: &Persona,
        manual: Option<&ToolManual>,
    ) -> Result<(), RegistryError> {
        let sql = self.rewrite(&format!(
            "UPDATE {} SET manual = :manual WHERE name = :name AND persona = :persona",
            self.tables.qualified(&self.tables.tools)
        ));
        sqlx::query(&sql)
            .bind(manual.map(|m| serde_json::to_string(m).unwrap_or_default()))
            .bind(name)
            .bind(persona.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every tool for a persona, ordered by `(group, name)`. The ordering is
    /// part of the listing contract.
    pub async fn list_tools(&self, persona: &Persona) -> Result<Vec<ToolRecord>, RegistryError> {
        let sql = self.rewrite(&format!(
            "SELECT name, persona, description, input_schema, artifact_digest,
                    is_auto_created, group_name, manual
             FROM {} WHERE persona = :persona
             ORDER BY group_name, name",
            self.tables.qualified(&self.tables.tools)
        ));
        let rows = sqlx::query(&sql)
            .bind(persona.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(tool_from_row).collect()
    }

    pub async fn count_tools(&self) -> Result<i64, RegistryError> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {}",
            self.tables.qualified(&self.tables.tools)
        );
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(get_i64(&row, "n")?)
    }

    // ===== Resources =====

    pub async fn get_resource(
        &self,
        uri: &str,
        persona: &Persona,
    ) -> Result<Option<ResourceRecord>, RegistryError> {
        let sql = self.rewrite(&format!(
            "SELECT uri, persona, name, description, mime_type, is_dynamic,
                    static_body, artifact_digest, group_name
             FROM {} WHERE uri = :uri AND persona = :persona",
            self.tables.qualified(&self.tables.resources)
        ));
        let row = sqlx::query(&sql)
            .bind(uri)
            .bind(persona.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| resource_from_row(&r)).transpose()
    }

    pub async fn upsert_resource(&self, record: &ResourceRecord) -> Result<(), RegistryError> {
        record.check_shape()?;
        if let Some(digest) = &record.artifact_digest {
            if !self.store.contains(digest).await? {
                return Err(RegistryError::DanglingDigest {
                    digest: digest.to_string(),
                });
            }
        }
        let sql = self.rewrite(&format!(
            "INSERT INTO {} (uri, persona, name, description, mime_type, is_dynamic,
                             static_body, artifact_digest, group_name)
             VALUES (:uri, :persona, :name, :description, :mime_type, :is_dynamic,
                     :static_body, :artifact_digest, :group_name)
             ON CONFLICT (uri, persona) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 mime_type = excluded.mime_type,
                 is_dynamic = excluded.is_dynamic,
                 static_body = excluded.static_body,
                 artifact_digest = excluded.artifact_digest,
                 group_name = excluded.group_name",
            self.tables.qualified(&self.tables.resources)
        ));
        sqlx::query(&sql)
            .bind(record.uri.as_str())
            .bind(record.persona.as_str())
            .bind(record.name.as_str())
            .bind(record.description.as_str())
            .bind(record.mime_type.as_str())
            .bind(record.is_dynamic as i64)
            .bind(record.static_body.as_deref())
            .bind(record.artifact_digest.as_ref().map(|d| d.as_str()))
            .bind(record.group.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_resources(
        &self,
        persona: &Persona,
    ) -> Result<Vec<ResourceRecord>, RegistryError> {
        let sql = self.rewrite(&format!(
            "SELECT uri, persona, name, description, mime_type, is_dynamic,
                    static_body, artifact_digest, group_name
             FROM {} WHERE persona = :persona
             ORDER BY group_name, name",
            self.tables.qualified(&self.tables.resources)
        ));
        let rows = sqlx::query(&sql)
            .bind(persona.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(resource_from_row).collect()
    }

    // ===== Prompts =====

    pub async fn get_prompt(
        &self,
        name: &str,
        persona: &Persona,
    ) -> Result<Option<PromptRecord>, RegistryError> {
        let sql = self.rewrite(&format!(
            "SELECT name, persona, description, template, arguments_schema, group_name
             FROM {} WHERE name = :name AND persona = :persona",
            self.tables.qualified(&self.tables.prompts)
        ));
        let row = sqlx::query(&sql)
            .bind(name)
            .bind(persona.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| prompt_from_row(&r)).transpose()
    }

    pub async fn upsert_prompt(&self, record: &PromptRecord) -> Result<(), RegistryError> {
        let sql = self.rewrite(&format!(
            "INSERT INTO {} (name, persona, description, template, arguments_schema, group_name)
             VALUES (:name, :persona, :description, :template, :arguments_schema, :group_name)
             ON CONFLICT (name, persona) DO UPDATE SET
                 description = excluded.description,
                 template = excluded.template,
                 arguments_schema = excluded.arguments_schema,
                 group_name = excluded.group_name",
            self.tables.qualified(&self.tables.prompts)
        ));
        sqlx::query(&sql)
            .bind(record.name.as_str())
            .bind(record.persona.as_str())
            .bind(record.description.as_str())
            .bind(record.template.as_str())
            .bind(serde_json::to_string(&record.arguments).unwrap_or_default())
            .bind(record.group.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_prompts(
        &self,
        persona: &Persona,
    ) -> Result<Vec<PromptRecord>, RegistryError> {
        let sql = self.rewrite(&format!(
            "SELECT name, persona, description, template, arguments_schema, group_name
             FROM {} WHERE persona = :persona
             ORDER BY group_name, name",
            self.tables.qualified(&self.tables.prompts)
        ));
        let rows = sqlx::query(&sql)
            .bind(persona.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(prompt_from_row).collect()
    }

    // ===== Macros =====

    pub async fn upsert_macro(&self, record: &MacroRecord) -> Result<(), RegistryError> {
        let sql = self.rewrite(&format!(
            "INSERT INTO {} (name, description, template, is_active)
             VALUES (:name, :description, :template, :is_active)
             ON CONFLICT (name) DO UPDATE SET
                 description = excluded.description,
                 template = excluded.template,
                 is_active = excluded.is_active",
            self.tables.qualified(&self.tables.macros)
        ));
        sqlx::query(&sql)
            .bind(record.name.as_str())
            .bind(record.description.as_str())
            .bind(record.template.as_str())
            .bind(record.is_active as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Active macros in stable textual order. Their concatenation forms the
    /// macro prelude prepended to every SQL render.
    pub async fn list_active_macros(&self) -> Result<Vec<MacroRecord>, RegistryError> {
        let sql = format!(
            "SELECT name, description, template, is_active
             FROM {} WHERE is_active <> 0 ORDER BY name",
            self.tables.qualified(&self.tables.macros)
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(MacroRecord {
                    name: row.try_get("name")?,
                    description: row.try_get("description")?,
                    template: row.try_get("template")?,
                    is_active: get_bool(row, "is_active")?,
                })
            })
            .collect()
    }

    // ===== Icons =====

    pub async fn upsert_icon(&self, record: &IconRecord) -> Result<(), RegistryError> {
        let sql = self.rewrite(&format!(
            "INSERT INTO {} (name, format, body_base64)
             VALUES (:name, :format, :body_base64)
             ON CONFLICT (name) DO UPDATE SET
                 format = excluded.format,
                 body_base64 = excluded.body_base64",
            self.tables.qualified(&self.tables.icons)
        ));
        sqlx::query(&sql)
            .bind(record.name.as_str())
            .bind(record.format.as_str())
            .bind(record.body_base64.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_icon(&self, name: &str) -> Result<Option<IconRecord>, RegistryError> {
        let sql = self.rewrite(&format!(
            "SELECT name, format, body_base64 FROM {} WHERE name = :name",
            self.tables.qualified(&self.tables.icons)
        ));
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            Ok(IconRecord {
                name: r.try_get("name")?,
                format: IconFormat::parse(&r.try_get::<String, _>("format")?)?,
                body_base64: r.try_get("body_base64")?,
            })
        })
        .transpose()
    }

    pub async fn list_icons(&self) -> Result<Vec<IconRecord>, RegistryError> {
        let sql = format!(
            "SELECT name, format, body_base64 FROM {} ORDER BY name",
            self.tables.qualified(&self.tables.icons)
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| {
                Ok(IconRecord {
                    name: r.try_get("name")?,
                    format: IconFormat::parse(&r.try_get::<String, _>("format")?)?,
                    body_base64: r.try_get("body_base64")?,
                })
            })
            .collect()
    }

    // ===== Security policies =====

    pub async fn insert_policy(
        &self,
        record: &SecurityPolicyRecord,
    ) -> Result<(), RegistryError> {
        // COALESCE(MAX(id), 0) + 1 keeps the auto-id portable across the
        // backends the Any driver serves.
        let table = self.tables.qualified(&self.tables.security_policies);
        let sql = self.rewrite(&format!(
            "INSERT INTO {table} (id, rule_type, category, pattern, is_active, description)
             SELECT COALESCE(MAX(id), 0) + 1, :rule_type, :category, :pattern, :is_active,
                    :description
             FROM {table}"
        ));
        sqlx::query(&sql)
            .bind(record.rule_type.as_str())
            .bind(record.category.as_str())
            .bind(record.pattern.as_str())
            .bind(record.is_active as i64)
            .bind(record.description.as_deref())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_active_policies(
        &self,
    ) -> Result<Vec<SecurityPolicyRecord>, RegistryError> {
        let sql = format!(
            "SELECT id, rule_type, category, pattern, is_active, description
             FROM {} WHERE is_active <> 0 ORDER BY id",
            self.tables.qualified(&self.tables.security_policies)
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(SecurityPolicyRecord {
                    id: Some(get_i64(row, "id")?),
                    rule_type: PolicyRuleType::parse(&row.try_get::<String, _>("rule_type")?)?,
                    category: PolicyCategory::parse(&row.try_get::<String, _>("category")?)?,
                    pattern: row.try_get("pattern")?,
                    is_active: get_bool(row, "is_active")?,
                    description: get_opt_string(row, "description")?,
                })
            })
            .collect()
    }
}

fn parse_json_column(text: &str, column: &str) -> Result<Value, RegistryError> {
    serde_json::from_str(text).map_err(|e| RegistryError::MalformedJson {
        column: column.to_string(),
        reason: e.to_string(),
    })
}

fn tool_from_row(row: &sqlx::any::AnyRow) -> Result<ToolRecord, RegistryError> {
    let input_schema_text: String = row.try_get("input_schema")?;
    let manual_text = get_opt_string(row, "manual")?;
    let manual = match manual_text {
        Some(text) if !text.is_empty() => Some(
            serde_json::from_str::<ToolManual>(&text).map_err(|e| {
                RegistryError::MalformedJson {
                    column: "manual".to_string(),
                    reason: e.to_string(),
                }
            })?,
        ),
        _ => None,
    };
    Ok(ToolRecord {
        name: row.try_get("name")?,
        persona: Persona::new(row.try_get::<String, _>("persona")?),
        description: row.try_get("description")?,
        input_schema: parse_json_column(&input_schema_text, "input_schema")?,
        artifact_digest: Digest::parse(&row.try_get::<String, _>("artifact_digest")?)
            .map_err(RegistryError::Store)?,
        is_auto_created: get_bool(row, "is_auto_created")?,
        group: row.try_get("group_name")?,
        manual,
    })
}

fn resource_from_row(row: &sqlx::any::AnyRow) -> Result<ResourceRecord, RegistryError> {
    let digest_text = get_opt_string(row, "artifact_digest")?;
    let artifact_digest = digest_text
        .map(|d| Digest::parse(&d))
        .transpose()
        .map_err(RegistryError::Store)?;
    Ok(ResourceRecord {
        uri: row.try_get("uri")?,
        persona: Persona::new(row.try_get::<String, _>("persona")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        mime_type: row.try_get("mime_type")?,
        is_dynamic: get_bool(row, "is_dynamic")?,
        static_body: get_opt_string(row, "static_body")?,
        artifact_digest,
        group: row.try_get("group_name")?,
    })
}

fn prompt_from_row(row: &sqlx::any::AnyRow) -> Result<PromptRecord, RegistryError> {
    let arguments_text: String = row.try_get("arguments_schema")?;
    let arguments: Vec<PromptArgument> =
        serde_json::from_str(&arguments_text).map_err(|e| RegistryError::MalformedJson {
            column: "arguments_schema".to_string(),
            reason: e.to_string(),
        })?;
    Ok(PromptRecord {
        name: row.try_get("name")?,
        persona: Persona::new(row.try_get::<String, _>("persona")?),
        description: row.try_get("description")?,
        template: row.try_get("template")?,
        arguments,
        group: row.try_get("group_name")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory_registry() -> Registry {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let registry = Registry::new(pool, Dialect::Sqlite, TableNames::default());
        registry.ensure_schema().await.unwrap();
        registry
    }

    fn sample_tool(digest: Digest) -> ToolRecord {
        ToolRecord {
            name: "utility_greet".to_string(),
            persona: Persona::default(),
            description: "Greets someone".to_string(),
            input_schema: json!({"type": "object", "properties": {"name": {"type": "string"}}}),
            artifact_digest: digest,
            is_auto_created: false,
            group: "general".to_string(),
            manual: None,
        }
    }

    #[tokio::test]
    async fn upsert_rejects_dangling_digest() {
        let registry = memory_registry().await;
        let record = sample_tool(Digest::of("never stored"));
        let err = registry.upsert_tool(&record).await.unwrap_err();
        assert!(matches!(err, RegistryError::DanglingDigest { .. }));
    }

    #[tokio::test]
    async fn upsert_with_artifact_is_atomic_and_idempotent() {
        let registry = memory_registry().await;
        let record = sample_tool(Digest::of("placeholder"));
        let digest = registry
            .upsert_tool_with_artifact(&record, "SELECT 'hello'", ArtifactKind::Select)
            .await
            .unwrap();
        // Second upsert with the same body leaves one tool and one artifact.
        registry
            .upsert_tool_with_artifact(&record, "SELECT 'hello'", ArtifactKind::Select)
            .await
            .unwrap();
        assert_eq!(registry.count_tools().await.unwrap(), 1);
        assert_eq!(registry.store().count().await.unwrap(), 1);

        let fetched = registry
            .get_tool("utility_greet", &Persona::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.artifact_digest, digest);
        assert_eq!(fetched.description, "Greets someone");
    }

    #[tokio::test]
    async fn listing_is_ordered_by_group_then_name() {
        let registry = memory_registry().await;
        for (name, group) in [
            ("zeta", "general"),
            ("alpha", "system"),
            ("beta", "general"),
        ] {
            let mut record = sample_tool(Digest::of("x"));
            record.name = name.to_string();
            record.group = group.to_string();
            registry
                .upsert_tool_with_artifact(&record, "SELECT 1", ArtifactKind::Select)
                .await
                .unwrap();
        }
        let names: Vec<String> = registry
            .list_tools(&Persona::default())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["beta", "zeta", "alpha"]);
    }

    #[tokio::test]
    async fn persona_scoping_filters_listings() {
        let registry = memory_registry().await;
        let mut record = sample_tool(Digest::of("x"));
        registry
            .upsert_tool_with_artifact(&record, "SELECT 1", ArtifactKind::Select)
            .await
            .unwrap();
        record.persona = Persona::new("analyst");
        registry
            .upsert_tool_with_artifact(&record, "SELECT 1", ArtifactKind::Select)
            .await
            .unwrap();

        assert_eq!(registry.list_tools(&Persona::default()).await.unwrap().len(), 1);
        assert_eq!(
            registry
                .list_tools(&Persona::new("analyst"))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            registry
                .list_tools(&Persona::new("nobody"))
                .await
                .unwrap()
                .len(),
            0
        );
    }

    #[tokio::test]
    async fn resource_upsert_enforces_shape() {
        let registry = memory_registry().await;
        let bad = ResourceRecord {
            uri: "memo://x".to_string(),
            persona: Persona::default(),
            name: "x".to_string(),
            description: String::new(),
            mime_type: "text/plain".to_string(),
            is_dynamic: true,
            static_body: Some("body".to_string()),
            artifact_digest: None,
            group: "general".to_string(),
        };
        assert!(registry.upsert_resource(&bad).await.is_err());

        let good = ResourceRecord {
            is_dynamic: false,
            static_body: Some("body".to_string()),
            ..bad
        };
        registry.upsert_resource(&good).await.unwrap();
        let fetched = registry
            .get_resource("memo://x", &Persona::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.static_body.as_deref(), Some("body"));
    }

    #[tokio::test]
    async fn active_macros_come_back_in_name_order() {
        let registry = memory_registry().await;
        for (name, active) in [("m_b", true), ("m_a", true), ("m_off", false)] {
            registry
                .upsert_macro(&MacroRecord {
                    name: name.to_string(),
                    description: String::new(),
                    template: format!("{{% macro {}() %}}1{{% endmacro %}}", name),
                    is_active: active,
                })
                .await
                .unwrap();
        }
        let names: Vec<String> = registry
            .list_active_macros()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["m_a", "m_b"]);
    }
}
