//! TiDB controller building blocks
//!
//! - [`member`]: health, ownership, settings and DDL owner resignation calls
//!   against the status API of individual TiDB replicas, over HTTP or mutual
//!   TLS depending on the cluster
//! - [`tikv_group`]: TiKVGroup status writes retried on optimistic
//!   concurrency conflicts
//! - [`fake`]: in-memory doubles of both for controller tests

#![deny(missing_docs)]

pub mod config;
pub mod fake;
mod http;
pub mod member;
pub mod secrets;
pub mod tikv_group;

pub use config::ControlConfig;
pub use fake::{ErrorFactory, FakeTidbControl, FakeTikvGroupControl};
pub use http::NOT_DDL_OWNER_MESSAGE;
pub use member::{
    member_base_url, DbInfo, DefaultTidbControl, ResignOutcome, TidbControl, TidbSettings,
};
pub use secrets::{KubeSecretSource, SecretSource};
pub use tikv_group::{
    KubeTikvGroupStore, RealTikvGroupControl, ReflectorTikvGroupLister, TikvGroupControl,
    TikvGroupLister, TikvGroupStore,
};
