//! CRD YAML Generator
//!
//! Prints the CustomResourceDefinitions for every CRD in this crate as a
//! multi-document YAML stream.
//!
//! Usage:
//!   cargo run -p crds --bin crdgen > deploy/crds.yaml

use crds::{BareMetalHost, HostClaim, HostDeployPolicy};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crds = [HostClaim::crd(), BareMetalHost::crd(), HostDeployPolicy::crd()];
    for crd in &crds {
        println!("---");
        print!("{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}
