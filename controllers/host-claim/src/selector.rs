//! Host selector compilation.
//!
//! Turns the `hostSelector` of a HostClaim into a [`LabelSelector`]: one
//! equality requirement per `matchLabels` entry and one requirement per
//! `matchExpressions` entry. Expression operators are case-insensitive.

use crds::{FAILURE_DOMAIN_LABEL, HostSelector};
use metal_store::{LabelSelector, Operator, Requirement, SelectorError};
use tracing::debug;

/// Compile a claim's host selector. Any malformed requirement fails the
/// whole selector.
pub fn build_selector(host_selector: &HostSelector) -> Result<LabelSelector, SelectorError> {
    let mut selector = LabelSelector::everything();

    for (key, value) in &host_selector.match_labels {
        debug!(label_key = %key, label_value = %value, "Adding requirement to match label");
        selector.add(Requirement::new(key.as_str(), Operator::Equals, vec![value.clone()])?);
    }

    for expression in &host_selector.match_expressions {
        debug!(
            label_key = %expression.key,
            label_operator = %expression.operator,
            label_values = ?expression.values,
            "Adding requirement to match expression"
        );
        let operator: Operator = expression.operator.to_lowercase().parse()?;
        selector.add(Requirement::new(
            expression.key.as_str(),
            operator,
            expression.values.clone(),
        )?);
    }

    Ok(selector)
}

/// Selector for the hosts of a failure domain.
pub fn failure_domain_selector(failure_domain: &str) -> Result<LabelSelector, SelectorError> {
    Ok(LabelSelector::from_requirements(vec![Requirement::new(
        FAILURE_DOMAIN_LABEL,
        Operator::Equals,
        vec![failure_domain.to_string()],
    )?]))
}
