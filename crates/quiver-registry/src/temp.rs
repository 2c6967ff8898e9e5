//! Process-local temporary registries.
//!
//! Temporary tools and resources back the `create_temp_*` meta-tools: they
//! behave like persistent records during dispatch but live only in memory,
//! scoped to the process. The maps are lock-guarded and owned by an explicit
//! handle rather than sitting in ambient globals, so tests and embedded
//! servers can run several isolated instances.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use quiver_core::Persona;
use quiver_store::{ArtifactKind, Digest};

/// A temporary tool entry, keyed by `name:persona`.
#[derive(Debug, Clone)]
pub struct TempTool {
    pub name: String,
    pub persona: Persona,
    pub description: String,
    pub input_schema: Value,
    pub digest: Digest,
}

/// A temporary resource entry, keyed by `uri:persona`.
#[derive(Debug, Clone)]
pub struct TempResource {
    pub uri: String,
    pub persona: Persona,
    pub name: String,
    pub description: String,
    pub mime_type: String,
    pub is_dynamic: bool,
    pub static_body: Option<String>,
    pub digest: Option<Digest>,
}

/// A blob in the temporary vault.
#[derive(Debug, Clone)]
pub struct TempArtifact {
    pub body: String,
    pub kind: ArtifactKind,
}

#[derive(Default)]
struct Inner {
    tools: HashMap<String, TempTool>,
    resources: HashMap<String, TempResource>,
    vault: HashMap<Digest, TempArtifact>,
}

/// The temporary registries and code vault, shared across request tasks.
#[derive(Clone, Default)]
pub struct TempRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl TempRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tool_key(name: &str, persona: &Persona) -> String {
        format!("{}:{}", name, persona)
    }

    fn resource_key(uri: &str, persona: &Persona) -> String {
        format!("{}:{}", uri, persona)
    }

    /// Register a temporary tool, storing its body in the temp vault.
    pub fn put_tool(&self, tool: TempTool, body: String, kind: ArtifactKind) {
        if let Ok(mut inner) = self.inner.write() {
            inner
                .vault
                .insert(tool.digest.clone(), TempArtifact { body, kind });
            let key = Self::tool_key(&tool.name, &tool.persona);
            inner.tools.insert(key, tool);
        }
    }

    pub fn get_tool(&self, name: &str, persona: &Persona) -> Option<TempTool> {
        let inner = self.inner.read().ok()?;
        inner.tools.get(&Self::tool_key(name, persona)).cloned()
    }

    /// Temporary tools visible to a persona, ordered by name.
    pub fn list_tools(&self, persona: &Persona) -> Vec<TempTool> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let mut tools: Vec<TempTool> = inner
            .tools
            .values()
            .filter(|t| &t.persona == persona)
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn put_resource(
        &self,
        resource: TempResource,
        body: Option<(String, ArtifactKind)>,
    ) {
        let Ok(mut inner) = self.inner.write() else {
            return;
        };
        if let (Some(digest), Some((body, kind))) = (resource.digest.clone(), body) {
            inner.vault.insert(digest, TempArtifact { body, kind });
        }
        let key = Self::resource_key(&resource.uri, &resource.persona);
        inner.resources.insert(key, resource);
    }

    pub fn get_resource(&self, uri: &str, persona: &Persona) -> Option<TempResource> {
        let inner = self.inner.read().ok()?;
        inner
            .resources
            .get(&Self::resource_key(uri, persona))
            .cloned()
    }

    pub fn list_resources(&self, persona: &Persona) -> Vec<TempResource> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let mut resources: Vec<TempResource> = inner
            .resources
            .values()
            .filter(|r| &r.persona == persona)
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.uri.cmp(&b.uri));
        resources
    }

    pub fn get_artifact(&self, digest: &Digest) -> Option<TempArtifact> {
        let inner = self.inner.read().ok()?;
        inner.vault.get(digest).cloned()
    }

    /// Drop everything. Called on shutdown.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.tools.clear();
            inner.resources.clear();
            inner.vault.clear();
        }
    }
}
