//! Command groups shipped with the binary

pub mod busy_cluster;
pub mod cluster;

use rolekit::Registry;

/// Every command group known to `keel`
pub fn registry() -> Registry {
    Registry::new()
        .register(&busy_cluster::BUSY_CLUSTER)
        .register(&cluster::CLUSTER)
}
