//! In-memory stand-ins for [`TidbControl`] and [`TikvGroupControl`]
//!
//! Used by controller tests that need member answers or status writes
//! without a cluster behind them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use kube::ResourceExt;
use tokio::sync::RwLock;

use tidb_common::crd::{TiKVGroup, TiKVGroupStatus, TidbCluster};
use tidb_common::naming::tidb_pod_name;
use tidb_common::Error;

use crate::member::{DbInfo, ResignOutcome, TidbControl, TidbSettings};
use crate::tikv_group::{group_namespace, TikvGroupControl};

/// Produces a fresh error for every failing call
pub type ErrorFactory = Arc<dyn Fn() -> Error + Send + Sync>;

/// Fake [`TidbControl`] answering from fixtures
#[derive(Default)]
pub struct FakeTidbControl {
    health: DashMap<String, bool>,
    info: RwLock<Option<DbInfo>>,
    settings: RwLock<Option<TidbSettings>>,
    info_error: RwLock<Option<ErrorFactory>>,
    resign_outcome: RwLock<Option<ResignOutcome>>,
}

impl FakeTidbControl {
    /// Create a fake with no fixtures
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the health map, keyed by pod name (`{cluster}-tidb-{ordinal}`)
    pub fn set_health(&self, health: HashMap<String, bool>) {
        self.health.clear();
        for (pod, healthy) in health {
            self.health.insert(pod, healthy);
        }
    }

    /// Answer `get_info` with `info`
    pub async fn set_info(&self, info: DbInfo) {
        *self.info.write().await = Some(info);
    }

    /// Answer `get_settings` with `settings`
    pub async fn set_settings(&self, settings: TidbSettings) {
        *self.settings.write().await = Some(settings);
    }

    /// Fail both `get_info` and `get_settings` with errors from `factory`
    pub async fn set_info_error(&self, factory: ErrorFactory) {
        *self.info_error.write().await = Some(factory);
    }

    /// Stop injecting errors
    pub async fn clear_info_error(&self) {
        *self.info_error.write().await = None;
    }

    /// Answer `resign_ddl_owner` with `outcome`
    pub async fn set_resign_outcome(&self, outcome: ResignOutcome) {
        *self.resign_outcome.write().await = Some(outcome);
    }

    async fn injected_error(&self) -> Option<Error> {
        self.info_error.read().await.as_ref().map(|factory| factory())
    }
}

#[async_trait]
impl TidbControl for FakeTidbControl {
    async fn get_health(&self, tc: &TidbCluster, ordinal: i32) -> bool {
        self.health
            .get(&tidb_pod_name(&tc.name_any(), ordinal))
            .map(|healthy| *healthy)
            .unwrap_or(false)
    }

    async fn get_info(&self, _tc: &TidbCluster, _ordinal: i32) -> Result<DbInfo, Error> {
        if let Some(err) = self.injected_error().await {
            return Err(err);
        }
        Ok(self.info.read().await.clone().unwrap_or_default())
    }

    async fn get_settings(&self, _tc: &TidbCluster, _ordinal: i32) -> Result<TidbSettings, Error> {
        if let Some(err) = self.injected_error().await {
            return Err(err);
        }
        Ok(self.settings.read().await.clone().unwrap_or_default())
    }

    async fn resign_ddl_owner(
        &self,
        _tc: &TidbCluster,
        _ordinal: i32,
    ) -> Result<ResignOutcome, Error> {
        Ok(self
            .resign_outcome
            .read()
            .await
            .unwrap_or(ResignOutcome::Resigned))
    }
}

struct UpdateFailure {
    factory: ErrorFactory,
    after: usize,
}

/// Fake [`TikvGroupControl`] keeping written groups in memory
#[derive(Default)]
pub struct FakeTikvGroupControl {
    groups: DashMap<String, TiKVGroup>,
    updates: AtomicUsize,
    failure: RwLock<Option<UpdateFailure>>,
}

fn group_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

impl FakeTikvGroupControl {
    /// Create a fake with no stored groups
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every update after `after` successful ones
    pub async fn set_update_error(&self, factory: ErrorFactory, after: usize) {
        *self.failure.write().await = Some(UpdateFailure { factory, after });
    }

    /// Number of successful updates so far
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Last group written under `namespace/name`
    pub fn get(&self, namespace: &str, name: &str) -> Option<TiKVGroup> {
        self.groups
            .get(&group_key(namespace, name))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl TikvGroupControl for FakeTikvGroupControl {
    async fn update_tikv_group(
        &self,
        tg: &TiKVGroup,
        new_status: &TiKVGroupStatus,
        _old_status: &TiKVGroupStatus,
    ) -> Result<TiKVGroup, Error> {
        if let Some(failure) = self.failure.read().await.as_ref() {
            if self.update_count() >= failure.after {
                return Err((failure.factory)());
            }
        }

        let mut updated = tg.clone();
        updated.status = Some(new_status.clone());

        let namespace = group_namespace(tg);
        self.groups
            .insert(group_key(&namespace, &tg.name_any()), updated.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidb_common::crd::{MemberPhase, TiKVGroupSpec, TidbClusterSpec};

    fn cluster(name: &str) -> TidbCluster {
        TidbCluster::new(name, TidbClusterSpec::default())
    }

    fn group() -> TiKVGroup {
        let mut tg = TiKVGroup::new(
            "demo-tikv",
            TiKVGroupSpec {
                cluster_name: "demo".to_string(),
                replicas: 3,
                image: None,
            },
        );
        tg.metadata.namespace = Some("default".to_string());
        tg
    }

    fn unavailable() -> ErrorFactory {
        Arc::new(|| Error::remote_status(503, "http://fake/info"))
    }

    #[tokio::test]
    async fn health_follows_the_map() {
        let fake = FakeTidbControl::new();
        assert!(!fake.get_health(&cluster("demo"), 0).await);

        fake.set_health(HashMap::from([
            ("demo-tidb-0".to_string(), true),
            ("demo-tidb-1".to_string(), false),
        ]));
        assert!(fake.get_health(&cluster("demo"), 0).await);
        assert!(!fake.get_health(&cluster("demo"), 1).await);
        assert!(!fake.get_health(&cluster("demo"), 2).await);
        assert!(!fake.get_health(&cluster("other"), 0).await);
    }

    #[tokio::test]
    async fn set_health_replaces_previous_map() {
        let fake = FakeTidbControl::new();
        fake.set_health(HashMap::from([("demo-tidb-0".to_string(), true)]));
        fake.set_health(HashMap::from([("demo-tidb-1".to_string(), true)]));

        assert!(!fake.get_health(&cluster("demo"), 0).await);
        assert!(fake.get_health(&cluster("demo"), 1).await);
    }

    #[tokio::test]
    async fn info_and_settings_default_without_fixtures() {
        let fake = FakeTidbControl::new();
        assert_eq!(fake.get_info(&cluster("demo"), 0).await.unwrap(), DbInfo::default());
        assert_eq!(
            fake.get_settings(&cluster("demo"), 0).await.unwrap(),
            TidbSettings::default()
        );
    }

    #[tokio::test]
    async fn fixtures_are_returned() {
        let fake = FakeTidbControl::new();
        fake.set_info(DbInfo { is_owner: true }).await;
        fake.set_settings(TidbSettings {
            port: Some(4000),
            ..Default::default()
        })
        .await;

        assert!(fake.get_info(&cluster("demo"), 0).await.unwrap().is_owner);
        assert_eq!(
            fake.get_settings(&cluster("demo"), 0).await.unwrap().port,
            Some(4000)
        );
    }

    #[tokio::test]
    async fn injected_error_fails_info_and_settings() {
        let fake = FakeTidbControl::new();
        fake.set_info(DbInfo { is_owner: true }).await;
        fake.set_info_error(unavailable()).await;

        let err = fake.get_info(&cluster("demo"), 0).await.unwrap_err();
        assert_eq!(err.status_code(), Some(503));
        assert!(fake.get_settings(&cluster("demo"), 0).await.is_err());
        assert!(!fake.get_health(&cluster("demo"), 0).await);

        fake.clear_info_error().await;
        assert!(fake.get_info(&cluster("demo"), 0).await.unwrap().is_owner);
    }

    #[tokio::test]
    async fn resign_defaults_to_resigned() {
        let fake = FakeTidbControl::new();
        assert_eq!(
            fake.resign_ddl_owner(&cluster("demo"), 0).await.unwrap(),
            ResignOutcome::Resigned
        );

        fake.set_resign_outcome(ResignOutcome::NotOwner).await;
        assert_eq!(
            fake.resign_ddl_owner(&cluster("demo"), 0).await.unwrap(),
            ResignOutcome::NotOwner
        );
    }

    #[tokio::test]
    async fn tikv_group_updates_are_stored() {
        let fake = FakeTikvGroupControl::new();
        let status = TiKVGroupStatus::with_phase(MemberPhase::Scale);

        let updated = fake
            .update_tikv_group(&group(), &status, &TiKVGroupStatus::default())
            .await
            .unwrap();

        assert_eq!(updated.status.as_ref(), Some(&status));
        assert_eq!(fake.update_count(), 1);
        assert_eq!(
            fake.get("default", "demo-tikv").and_then(|tg| tg.status),
            Some(status)
        );
        assert!(fake.get("default", "missing").is_none());
    }

    #[tokio::test]
    async fn tikv_group_without_namespace_lands_in_default() {
        let fake = FakeTikvGroupControl::new();
        let mut tg = group();
        tg.metadata.namespace = None;

        fake.update_tikv_group(&tg, &TiKVGroupStatus::default(), &TiKVGroupStatus::default())
            .await
            .unwrap();

        assert!(fake.get("default", "demo-tikv").is_some());
    }

    #[tokio::test]
    async fn tikv_group_update_error_after_n_successes() {
        let fake = FakeTikvGroupControl::new();
        fake.set_update_error(
            Arc::new(|| Error::write_conflict("default", "demo-tikv", "injected")),
            2,
        )
        .await;
        let status = TiKVGroupStatus::default();

        for _ in 0..2 {
            fake.update_tikv_group(&group(), &status, &status)
                .await
                .unwrap();
        }
        let err = fake
            .update_tikv_group(&group(), &status, &status)
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(fake.update_count(), 2);
    }
}
