//! HostClaim status conditions.
//!
//! Conditions are upserted by type. `lastTransitionTime` only moves when the
//! status changes, so re-applying an unchanged condition leaves the claim
//! untouched and does not produce a patch.

use chrono::Utc;
use crds::{
    Condition, ConditionStatus, HostClaim, READY_CONDITION, READY_REASON, SUMMARIZED_CONDITIONS,
    UNKNOWN_REASON,
};

/// Upsert a condition on `claim`.
pub fn set_condition(
    claim: &mut HostClaim,
    condition_type: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
) {
    let observed_generation = claim.metadata.generation;
    let now = Utc::now();
    let conditions = claim.conditions_mut();

    match conditions.iter_mut().find(|c| c.r#type == condition_type) {
        Some(existing) => {
            if existing.status != status {
                existing.last_transition_time = now;
            }
            existing.status = status;
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = observed_generation;
        }
        None => conditions.push(Condition {
            r#type: condition_type.to_string(),
            status,
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation,
            last_transition_time: now,
        }),
    }
}

/// Set a condition to False with a reason and message.
pub fn set_condition_false(claim: &mut HostClaim, condition_type: &str, reason: &str, message: &str) {
    set_condition(claim, condition_type, ConditionStatus::False, reason, message);
}

/// Set a condition to True with a reason.
pub fn set_condition_true(claim: &mut HostClaim, condition_type: &str, reason: &str) {
    set_condition(claim, condition_type, ConditionStatus::True, reason, "");
}

/// Recompute the Ready condition from the summarized conditions.
///
/// - any False: Ready is False, with that condition's reason and its
///   message prefixed by its type
/// - otherwise any missing or Unknown: Ready is Unknown
/// - otherwise Ready is True
pub fn set_summary_condition(claim: &mut HostClaim) {
    let mut unknown = false;
    let mut failed: Option<(String, String)> = None;

    for condition_type in SUMMARIZED_CONDITIONS {
        match claim.condition(condition_type) {
            Some(c) if c.status == ConditionStatus::False => {
                failed = Some((
                    c.reason.clone(),
                    format!("{}: {}", condition_type, c.message),
                ));
                break;
            }
            Some(c) if c.status == ConditionStatus::True => {}
            _ => unknown = true,
        }
    }

    match failed {
        Some((reason, message)) => {
            set_condition(claim, READY_CONDITION, ConditionStatus::False, &reason, &message);
        }
        None if unknown => {
            set_condition(claim, READY_CONDITION, ConditionStatus::Unknown, UNKNOWN_REASON, "");
        }
        None => set_condition(claim, READY_CONDITION, ConditionStatus::True, READY_REASON, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_host_claim;
    use crds::{
        ASSOCIATED_CONDITION, BARE_METAL_HOST_ASSOCIATED_REASON, NO_BARE_METAL_HOST_REASON,
        PROVISIONED_CONDITION, SYNCHRONIZED_CONDITION,
    };

    #[test]
    fn test_set_condition_appends_then_updates() {
        let mut claim = create_test_host_claim("ns", "c1");
        set_condition_false(&mut claim, ASSOCIATED_CONDITION, NO_BARE_METAL_HOST_REASON, "none");
        set_condition_true(&mut claim, ASSOCIATED_CONDITION, BARE_METAL_HOST_ASSOCIATED_REASON);

        assert_eq!(claim.conditions().len(), 1);
        let c = claim.condition(ASSOCIATED_CONDITION).unwrap();
        assert!(c.is_true());
        assert_eq!(c.reason, BARE_METAL_HOST_ASSOCIATED_REASON);
        assert!(c.message.is_empty());
    }

    #[test]
    fn test_transition_time_kept_when_status_unchanged() {
        let mut claim = create_test_host_claim("ns", "c1");
        set_condition_false(&mut claim, ASSOCIATED_CONDITION, NO_BARE_METAL_HOST_REASON, "first");
        let first = claim.condition(ASSOCIATED_CONDITION).unwrap().last_transition_time;

        set_condition_false(&mut claim, ASSOCIATED_CONDITION, NO_BARE_METAL_HOST_REASON, "second");
        let c = claim.condition(ASSOCIATED_CONDITION).unwrap();
        assert_eq!(c.last_transition_time, first);
        assert_eq!(c.message, "second");
    }

    #[test]
    fn test_observed_generation_comes_from_claim() {
        let mut claim = create_test_host_claim("ns", "c1");
        claim.metadata.generation = Some(4);
        set_condition_true(&mut claim, ASSOCIATED_CONDITION, BARE_METAL_HOST_ASSOCIATED_REASON);
        assert_eq!(claim.condition(ASSOCIATED_CONDITION).unwrap().observed_generation, Some(4));
    }

    #[test]
    fn test_summary_false_wins() {
        let mut claim = create_test_host_claim("ns", "c1");
        set_condition_true(&mut claim, SYNCHRONIZED_CONDITION, "ConfigurationSynced");
        set_condition_false(
            &mut claim,
            ASSOCIATED_CONDITION,
            NO_BARE_METAL_HOST_REASON,
            "No available host found: requeuing.",
        );
        set_summary_condition(&mut claim);

        let ready = claim.condition(READY_CONDITION).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, NO_BARE_METAL_HOST_REASON);
        assert_eq!(ready.message, "Associated: No available host found: requeuing.");
    }

    #[test]
    fn test_summary_unknown_when_condition_missing() {
        let mut claim = create_test_host_claim("ns", "c1");
        set_condition_true(&mut claim, ASSOCIATED_CONDITION, BARE_METAL_HOST_ASSOCIATED_REASON);
        set_summary_condition(&mut claim);

        let ready = claim.condition(READY_CONDITION).unwrap();
        assert_eq!(ready.status, ConditionStatus::Unknown);
        assert_eq!(ready.reason, UNKNOWN_REASON);
    }

    #[test]
    fn test_summary_true_when_all_true() {
        let mut claim = create_test_host_claim("ns", "c1");
        for condition_type in [ASSOCIATED_CONDITION, SYNCHRONIZED_CONDITION, PROVISIONED_CONDITION] {
            set_condition_true(&mut claim, condition_type, "Done");
        }
        set_summary_condition(&mut claim);

        let ready = claim.condition(READY_CONDITION).unwrap();
        assert!(ready.is_true());
        assert_eq!(ready.reason, READY_REASON);
    }
}
