//! # CRD Generator
//!
//! Prints the CustomResourceDefinition of the `Cluster` fields this controller
//! reads and writes.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/cluster.yaml
//! ```

use cluster_encryption_controller::crd::Cluster;
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Cluster::crd())?);
    Ok(())
}
