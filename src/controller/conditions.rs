//! Condition management helpers following Kubernetes API conventions

use chrono::Utc;

use crate::crd::Condition;

pub const CONDITION_TYPE_READY: &str = "Ready";

pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

/// Update or add a condition to the conditions list
///
/// The transition time only moves when the status value changes, so
/// re-applying the same condition leaves the list unchanged.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = Utc::now().to_rfc3339();
        }
        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.observed_generation = observed_generation;
    } else {
        conditions.push(Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation,
        });
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Check if a condition is true
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == CONDITION_STATUS_TRUE)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_since(timestamp: &str) -> Condition {
        Condition {
            type_: CONDITION_TYPE_READY.to_string(),
            status: CONDITION_STATUS_TRUE.to_string(),
            last_transition_time: timestamp.to_string(),
            reason: "Reconciled".to_string(),
            message: "ok".to_string(),
            observed_generation: None,
        }
    }

    #[test]
    fn test_set_condition_adds_new() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            CONDITION_TYPE_READY,
            CONDITION_STATUS_TRUE,
            "Reconciled",
            "ok",
            Some(1),
        );
        assert_eq!(conditions.len(), 1);
        assert!(is_condition_true(&conditions, CONDITION_TYPE_READY));
        assert_eq!(conditions[0].observed_generation, Some(1));
    }

    #[test]
    fn test_same_status_keeps_transition_time() {
        let mut conditions = vec![ready_since("2020-01-01T00:00:00+00:00")];
        set_condition(
            &mut conditions,
            CONDITION_TYPE_READY,
            CONDITION_STATUS_TRUE,
            "Reconciled",
            "still ok",
            None,
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[0].last_transition_time,
            "2020-01-01T00:00:00+00:00"
        );
        assert_eq!(conditions[0].message, "still ok");
    }

    #[test]
    fn test_status_flip_moves_transition_time() {
        let mut conditions = vec![ready_since("2020-01-01T00:00:00+00:00")];
        set_condition(
            &mut conditions,
            CONDITION_TYPE_READY,
            CONDITION_STATUS_FALSE,
            "InvalidSpec",
            "no processes",
            None,
        );
        assert_ne!(
            conditions[0].last_transition_time,
            "2020-01-01T00:00:00+00:00"
        );
        assert!(!is_condition_true(&conditions, CONDITION_TYPE_READY));
    }
}
