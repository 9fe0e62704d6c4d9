//! Persistence seams for density and flywheel aggregates.
//!
//! The engine never blocks its entity loop on these: density is read once
//! before the loop, every write happens after consolidation, and a failed
//! write degrades to "treat the pattern as unproven next run", which is
//! always safe. In-memory adapters back tests and embedded use.

use super::density::{DensityUpdate, PatternDensity};
use super::flywheel::{DomainAggregate, FoundationalAggregate};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Errors from density and flywheel stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend rejected the operation
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Tier-1 persistence, keyed by (tenant, signature).
#[async_trait]
pub trait DensityStore: Send + Sync {
    /// Load all density for a tenant.
    async fn load(&self, tenant_id: &str) -> Result<HashMap<String, PatternDensity>, StoreError>;

    /// Upsert one chunk of updates for a tenant.
    async fn upsert(&self, tenant_id: &str, updates: &[DensityUpdate]) -> Result<(), StoreError>;

    /// Nuclear clear: delete all density for a tenant, reverting every
    /// pattern to `full_trace`. The safety valve for reversing an
    /// automated cutover.
    async fn clear_tenant(&self, tenant_id: &str) -> Result<u64, StoreError>;
}

/// Tier-2/3 persistence. Rows are keyed by signature (+ domain partition);
/// no method takes or returns a tenant identifier.
#[async_trait]
pub trait FlywheelStore: Send + Sync {
    async fn load_foundational(
        &self,
        signatures: &[String],
    ) -> Result<Vec<FoundationalAggregate>, StoreError>;

    async fn upsert_foundational(&self, rows: &[FoundationalAggregate]) -> Result<(), StoreError>;

    async fn load_domain(
        &self,
        domain_id: &str,
        vertical_hint: &str,
        signatures: &[String],
    ) -> Result<Vec<DomainAggregate>, StoreError>;

    async fn upsert_domain(&self, rows: &[DomainAggregate]) -> Result<(), StoreError>;
}

/// Write density updates in chunks, logging progress per chunk.
pub async fn upsert_chunked(
    store: &dyn DensityStore,
    tenant_id: &str,
    updates: &[DensityUpdate],
    chunk_size: usize,
) -> Result<(), StoreError> {
    for chunk in updates.chunks(chunk_size.max(1)) {
        store.upsert(tenant_id, chunk).await?;
        debug!(
            tenant = %tenant_id,
            count = chunk.len(),
            "Density chunk upserted"
        );
    }
    Ok(())
}

/// Load density best-effort: a failed load yields an empty map (maximum
/// diagnostics), never a run failure.
pub async fn load_density_best_effort(
    store: &dyn DensityStore,
    tenant_id: &str,
) -> HashMap<String, PatternDensity> {
    match store.load(tenant_id).await {
        Ok(density) => density,
        Err(e) => {
            warn!(
                tenant = %tenant_id,
                error = %e,
                "Density load failed; starting with empty density"
            );
            HashMap::new()
        }
    }
}

/// In-memory Tier-1 store.
#[derive(Default)]
pub struct InMemoryDensityStore {
    inner: RwLock<HashMap<String, HashMap<String, PatternDensity>>>,
}

impl InMemoryDensityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a tenant's density, e.g. with cold-start priors.
    pub async fn seed(&self, tenant_id: &str, density: HashMap<String, PatternDensity>) {
        self.inner.write().await.insert(tenant_id.to_string(), density);
    }
}

#[async_trait]
impl DensityStore for InMemoryDensityStore {
    async fn load(&self, tenant_id: &str) -> Result<HashMap<String, PatternDensity>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert(&self, tenant_id: &str, updates: &[DensityUpdate]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let tenant = inner.entry(tenant_id.to_string()).or_default();
        for update in updates {
            tenant.insert(update.signature.clone(), update.clone().into_density());
        }
        Ok(())
    }

    async fn clear_tenant(&self, tenant_id: &str) -> Result<u64, StoreError> {
        let removed = self
            .inner
            .write()
            .await
            .remove(tenant_id)
            .map(|density| density.len() as u64)
            .unwrap_or(0);
        warn!(
            tenant = %tenant_id,
            patterns = removed,
            "Tenant density cleared; every pattern reverts to full_trace"
        );
        Ok(removed)
    }
}

/// In-memory Tier-2/3 store.
#[derive(Default)]
pub struct InMemoryFlywheelStore {
    foundational: RwLock<HashMap<String, FoundationalAggregate>>,
    domain: RwLock<HashMap<(String, String, String), DomainAggregate>>,
}

impl InMemoryFlywheelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlywheelStore for InMemoryFlywheelStore {
    async fn load_foundational(
        &self,
        signatures: &[String],
    ) -> Result<Vec<FoundationalAggregate>, StoreError> {
        let rows = self.foundational.read().await;
        Ok(signatures
            .iter()
            .filter_map(|signature| rows.get(signature).cloned())
            .collect())
    }

    async fn upsert_foundational(&self, rows: &[FoundationalAggregate]) -> Result<(), StoreError> {
        let mut store = self.foundational.write().await;
        for row in rows {
            store.insert(row.signature.clone(), row.clone());
        }
        Ok(())
    }

    async fn load_domain(
        &self,
        domain_id: &str,
        vertical_hint: &str,
        signatures: &[String],
    ) -> Result<Vec<DomainAggregate>, StoreError> {
        let rows = self.domain.read().await;
        Ok(signatures
            .iter()
            .filter_map(|signature| {
                rows.get(&(
                    signature.clone(),
                    domain_id.to_string(),
                    vertical_hint.to_string(),
                ))
                .cloned()
            })
            .collect())
    }

    async fn upsert_domain(&self, rows: &[DomainAggregate]) -> Result<(), StoreError> {
        let mut store = self.domain.write().await;
        for row in rows {
            store.insert(
                (
                    row.signature.clone(),
                    row.domain_id.clone(),
                    row.vertical_hint.clone(),
                ),
                row.clone(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::density::ExecutionMode;

    fn update(signature: &str, confidence: f64) -> DensityUpdate {
        DensityUpdate {
            signature: signature.to_string(),
            confidence,
            execution_mode: ExecutionMode::LightTrace,
            total_executions: 5,
            run_anomaly_rate: 0.0,
        }
    }

    #[tokio::test]
    async fn test_upsert_then_load_round_trip() {
        let store = InMemoryDensityStore::new();
        store
            .upsert("tenant-1", &[update("sig-a", 0.8)])
            .await
            .unwrap();

        let density = store.load("tenant-1").await.unwrap();
        assert_eq!(density.get("sig-a").unwrap().confidence, 0.8);
        assert!(store.load("tenant-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chunked_upsert_covers_all_rows() {
        let store = InMemoryDensityStore::new();
        let updates: Vec<DensityUpdate> = (0..25)
            .map(|i| update(&format!("sig-{i}"), 0.5))
            .collect();
        upsert_chunked(&store, "tenant-1", &updates, 10).await.unwrap();
        assert_eq!(store.load("tenant-1").await.unwrap().len(), 25);
    }

    #[tokio::test]
    async fn test_nuclear_clear() {
        let store = InMemoryDensityStore::new();
        store
            .upsert("tenant-1", &[update("sig-a", 0.99), update("sig-b", 0.99)])
            .await
            .unwrap();

        let removed = store.clear_tenant("tenant-1").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.load("tenant-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flywheel_partitions_are_independent() {
        let store = InMemoryFlywheelStore::new();
        let row = |domain: &str| DomainAggregate {
            signature: "sig-a".to_string(),
            domain_id: domain.to_string(),
            vertical_hint: "apparel".to_string(),
            confidence: 0.7,
            anomaly_rate: 0.0,
            execution_count: 1,
            tenant_observations: 1,
        };
        store
            .upsert_domain(&[row("retail"), row("hospitality")])
            .await
            .unwrap();

        let signatures = vec!["sig-a".to_string()];
        let retail = store
            .load_domain("retail", "apparel", &signatures)
            .await
            .unwrap();
        assert_eq!(retail.len(), 1);
        let missing = store
            .load_domain("retail", "grocery", &signatures)
            .await
            .unwrap();
        assert!(missing.is_empty());
    }
}
