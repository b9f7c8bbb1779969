//! Custom Resource Definitions consumed by the TiDB control plane

mod cluster;
mod tikv_group;
mod types;

pub use cluster::{TidbCluster, TidbClusterSpec, TidbSpec, TlsCluster, DEFAULT_NAMESPACE};
pub use tikv_group::{TiKVGroup, TiKVGroupSpec, TiKVGroupStatus, TiKVStore};
pub use types::{Condition, ConditionStatus, MemberPhase};
