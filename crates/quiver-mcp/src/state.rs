//! Shared server state: sessions, registries, caches.

use std::sync::{Arc, RwLock};

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tokio::sync::watch;

use quiver_audit::{ExecutionRecorder, Notebook};
use quiver_core::{ConfigError, Dialect, QuiverConfig};
use quiver_policy::{PolicyRule, PolicySet, RuleAction, RuleCategory};
use quiver_registry::{PolicyCategory, PolicyRuleType, Registry, TempRegistry};
use thiserror::Error;

use crate::error::DispatchError;

/// Fatal startup failures. The meta-session must open; the data-session is
/// allowed to fail (offline mode).
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open metadata database: {0}")]
    MetaConnect(sqlx::Error),

    #[error("failed to prepare metadata schema: {0}")]
    Schema(String),
}

/// The data-session handle: pool plus the dialect inferred from its URL.
#[derive(Clone)]
pub struct DataSession {
    pub pool: AnyPool,
    pub dialect: Dialect,
}

/// Long-lived core object owning sessions, registries, temp maps, and the
/// macro-prelude cache. Request handlers share it behind an [`Arc`].
pub struct ServerState {
    config: QuiverConfig,
    registry: Registry,
    recorder: ExecutionRecorder,
    notebook: Notebook,
    temp: TempRegistry,
    data: RwLock<Option<DataSession>>,
    prelude_cache: RwLock<Option<String>>,
    /// Flips to true exactly once, on shutdown. Dispatched calls race
    /// their work against this signal and fail with a Cancelled
    /// diagnostic when it fires.
    cancel: watch::Sender<bool>,
}

impl ServerState {
    /// Open sessions, prepare the schema, and seed the registry on first
    /// run. Meta-session failure is fatal; data-session failure switches
    /// the server into offline mode.
    pub async fn open(config: QuiverConfig) -> Result<Arc<Self>, StartupError> {
        config.validate()?;
        sqlx::any::install_default_drivers();

        let meta_url = config.databases.metadata_url.clone();
        let meta_dialect = Dialect::from_url(&meta_url);
        let meta_pool = Self::open_pool(&meta_url)
            .await
            .map_err(StartupError::MetaConnect)?;

        let tables = config.tables.clone();
        let registry = Registry::new(meta_pool.clone(), meta_dialect, tables.clone());
        let recorder = ExecutionRecorder::new(meta_pool.clone(), meta_dialect, &tables);
        let notebook = Notebook::new(meta_pool.clone(), meta_dialect, &tables);

        registry
            .ensure_schema()
            .await
            .map_err(|e| StartupError::Schema(e.to_string()))?;
        recorder
            .ensure_schema()
            .await
            .map_err(|e| StartupError::Schema(e.to_string()))?;
        notebook
            .ensure_schema()
            .await
            .map_err(|e| StartupError::Schema(e.to_string()))?;

        let data = match &config.databases.data_url {
            Some(url) => match Self::open_pool(url).await {
                Ok(pool) => Some(DataSession {
                    pool,
                    dialect: Dialect::from_url(url),
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "data database unavailable; starting offline");
                    None
                }
            },
            None => None,
        };

        let (cancel, _) = watch::channel(false);
        let state = Arc::new(Self {
            config,
            registry,
            recorder,
            notebook,
            temp: TempRegistry::new(),
            data: RwLock::new(data),
            prelude_cache: RwLock::new(None),
            cancel,
        });

        crate::seed::seed_if_empty(&state)
            .await
            .map_err(|e| StartupError::Schema(e.to_string()))?;

        Ok(state)
    }

    async fn open_pool(url: &str) -> Result<AnyPool, sqlx::Error> {
        AnyPoolOptions::new().max_connections(5).connect(url).await
    }

    /// Open a state over pre-built pools. Test harness entry point.
    pub async fn open_with_pools(
        config: QuiverConfig,
        meta_pool: AnyPool,
        data: Option<DataSession>,
    ) -> Result<Arc<Self>, StartupError> {
        let meta_dialect = Dialect::from_url(&config.databases.metadata_url);
        let tables = config.tables.clone();
        let registry = Registry::new(meta_pool.clone(), meta_dialect, tables.clone());
        let recorder = ExecutionRecorder::new(meta_pool.clone(), meta_dialect, &tables);
        let notebook = Notebook::new(meta_pool.clone(), meta_dialect, &tables);
        registry
            .ensure_schema()
            .await
            .map_err(|e| StartupError::Schema(e.to_string()))?;
        recorder
            .ensure_schema()
            .await
            .map_err(|e| StartupError::Schema(e.to_string()))?;
        notebook
            .ensure_schema()
            .await
            .map_err(|e| StartupError::Schema(e.to_string()))?;

        let (cancel, _) = watch::channel(false);
        let state = Arc::new(Self {
            config,
            registry,
            recorder,
            notebook,
            temp: TempRegistry::new(),
            data: RwLock::new(data),
            prelude_cache: RwLock::new(None),
            cancel,
        });
        crate::seed::seed_if_empty(&state)
            .await
            .map_err(|e| StartupError::Schema(e.to_string()))?;
        Ok(state)
    }

    pub fn config(&self) -> &QuiverConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn recorder(&self) -> &ExecutionRecorder {
        &self.recorder
    }

    pub fn notebook(&self) -> &Notebook {
        &self.notebook
    }

    pub fn temp(&self) -> &TempRegistry {
        &self.temp
    }

    /// The current data session, if online.
    pub fn data_session(&self) -> Option<DataSession> {
        self.data.read().ok().and_then(|slot| slot.clone())
    }

    /// Swap in a new data session (or take the server offline).
    pub fn set_data_session(&self, session: Option<DataSession>) {
        if let Ok(mut slot) = self.data.write() {
            *slot = session;
        }
    }

    /// Re-open the data session from configuration. Returns whether the
    /// server is online afterwards. Observable by all subsequent calls.
    pub async fn reconnect_data(&self) -> Result<bool, DispatchError> {
        let Some(url) = self.config.databases.data_url.clone() else {
            return Ok(false);
        };
        match Self::open_pool(&url).await {
            Ok(pool) => {
                self.set_data_session(Some(DataSession {
                    pool,
                    dialect: Dialect::from_url(&url),
                }));
                tracing::info!("data session reconnected");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "data session reconnect failed");
                self.set_data_session(None);
                Ok(false)
            }
        }
    }

    /// Probe the data session with a trivial query.
    pub async fn data_session_alive(&self) -> bool {
        let Some(session) = self.data_session() else {
            return false;
        };
        sqlx::query("SELECT 1").fetch_one(&session.pool).await.is_ok()
    }

    /// The macro prelude: all active macro templates concatenated in
    /// textual order. Cached until a macro registration invalidates it.
    pub async fn macro_prelude(&self) -> Result<String, DispatchError> {
        if let Ok(cache) = self.prelude_cache.read() {
            if let Some(prelude) = cache.as_ref() {
                return Ok(prelude.clone());
            }
        }
        let macros = self.registry.list_active_macros().await?;
        let prelude = macros
            .iter()
            .map(|m| m.template.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        if let Ok(mut cache) = self.prelude_cache.write() {
            *cache = Some(prelude.clone());
        }
        Ok(prelude)
    }

    /// Drop the cached prelude; the next render reloads it.
    pub fn invalidate_macro_prelude(&self) {
        if let Ok(mut cache) = self.prelude_cache.write() {
            *cache = None;
        }
    }

    /// The active policy set: stored rows, or built-in defaults when none
    /// are stored.
    pub async fn policy_set(&self) -> Result<PolicySet, DispatchError> {
        let records = self.registry.list_active_policies().await?;
        let rules = records
            .into_iter()
            .map(|r| PolicyRule {
                action: match r.rule_type {
                    PolicyRuleType::Allow => RuleAction::Allow,
                    PolicyRuleType::Deny => RuleAction::Deny,
                },
                category: match r.category {
                    PolicyCategory::Module => RuleCategory::Module,
                    PolicyCategory::Function => RuleCategory::Function,
                    PolicyCategory::Attribute => RuleCategory::Attribute,
                },
                pattern: r.pattern,
            })
            .collect();
        Ok(PolicySet::from_rules(rules))
    }

    /// A receiver on the cancellation signal. Each dispatched call holds
    /// one and aborts at its next suspension point once the signal fires.
    pub fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Fire the cancellation signal. In-flight dispatches fail with a
    /// Cancelled diagnostic and release their sessions.
    pub fn cancel_all(&self) {
        let _ = self.cancel.send(true);
    }

    /// Shutdown: cancel in-flight calls, close sessions, and discard
    /// temporary registries.
    pub async fn shutdown(&self) {
        self.cancel_all();
        self.temp.clear();
        if let Some(session) = self.data_session() {
            session.pool.close().await;
        }
        self.registry.pool().close().await;
    }
}
