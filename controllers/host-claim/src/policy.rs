//! HostDeployPolicy evaluation.
//!
//! A namespace holding BareMetalHosts is acceptable for a claim when at
//! least one HostDeployPolicy in it accepts the claim's namespace. A policy
//! without constraints accepts nothing; otherwise every present constraint
//! must pass.

use crate::error::ControllerError;
use crate::manager::HostManager;
use crds::HostDeployPolicy;
use kube::ResourceExt;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

impl HostManager {
    /// Namespaces the claim may draw hosts from.
    ///
    /// When `target_namespace` is non-empty only the policies of that
    /// namespace are considered.
    pub async fn acceptable_namespaces(&self, target_namespace: &str) -> Result<BTreeSet<String>, ControllerError> {
        info!(hostclaim = %self.claim_key(), "Searching for suitable namespaces");

        let scope = (!target_namespace.is_empty()).then_some(target_namespace);
        let policies = self
            .cancellable("listing HostDeployPolicies", self.store.list_host_deploy_policies(scope))
            .await?;

        let claim_namespace = self.claim_namespace();
        let what = format!("reading labels of Namespace {}", claim_namespace);
        let labels = self
            .cancellable(&what, self.store.get_namespace_labels(claim_namespace))
            .await?;
        debug!(namespace = %claim_namespace, labels = ?labels, "Labels of the HostClaim namespace");

        let mut namespaces = BTreeSet::new();
        for policy in &policies {
            let policy_namespace = policy.namespace().unwrap_or_default();
            if namespaces.contains(&policy_namespace) {
                continue;
            }
            match policy_accepts(policy, claim_namespace, &labels) {
                Ok(true) => {
                    debug!(policy_namespace = %policy_namespace, policy_name = %policy.name_any(), "HostDeployPolicy accepts HostClaim namespace");
                    namespaces.insert(policy_namespace);
                }
                Ok(false) => {}
                Err(e) => {
                    error!(
                        policy_namespace = %policy_namespace,
                        policy_name = %policy.name_any(),
                        error = %e,
                        "Error during regexp matching on HostClaim namespace (bad regexp)"
                    );
                    return Err(ControllerError::from(e).context(format!(
                        "evaluating HostDeployPolicy {}/{}",
                        policy_namespace,
                        policy.name_any()
                    )));
                }
            }
        }
        Ok(namespaces)
    }
}

/// True when `policy` accepts claims living in `claim_namespace`, whose
/// namespace carries `labels`.
///
/// Fails only when `nameMatches` is not a valid regular expression.
pub fn policy_accepts(
    policy: &HostDeployPolicy,
    claim_namespace: &str,
    labels: &BTreeMap<String, String>,
) -> Result<bool, regex::Error> {
    let policy_name = policy.name_any();
    let Some(constraints) = policy.spec.host_claim_namespaces.as_ref() else {
        debug!(policy_name = %policy_name, "Rejecting HostDeployPolicy without constraint");
        return Ok(false);
    };

    if let Some(names) = &constraints.names {
        if !names.iter().any(|n| n == claim_namespace) {
            debug!(policy_name = %policy_name, names = ?names, "Rejecting HostDeployPolicy because claim namespace not in names");
            return Ok(false);
        }
    }

    if !constraints.name_matches.is_empty() {
        let re = Regex::new(&constraints.name_matches)?;
        if !re.is_match(claim_namespace) {
            debug!(policy_name = %policy_name, "Rejecting HostDeployPolicy because claim namespace does not match regex");
            return Ok(false);
        }
    }

    if let Some(required) = &constraints.has_labels {
        for pair in required {
            match labels.get(&pair.name) {
                Some(value) if pair.value.is_empty() || *value == pair.value => {}
                Some(_) => {
                    debug!(policy_name = %policy_name, label = %pair.name, "Rejecting HostDeployPolicy because claim namespace label does not have correct value");
                    return Ok(false);
                }
                None => {
                    debug!(policy_name = %policy_name, label = %pair.name, "Rejecting HostDeployPolicy because claim namespace does not have label");
                    return Ok(false);
                }
            }
        }
    }

    Ok(true)
}
