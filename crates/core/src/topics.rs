//! Broker topic names.
//!
//! These strings are the routing contract with the backend; the backend
//! publishes to exactly these destinations.

use std::fmt::Display;

use crate::types::{BranchId, PatientId};

/// Global queue channel used by dashboard-level consumers.
pub const QUEUE_TOPIC: &str = "/topic/queue";

const PATIENT_TOPIC_PREFIX: &str = "/topic/patient/";

const BRANCH_QUEUE_TOPIC_PREFIX: &str = "/topic/queue/";

/// Personal channel for a single patient.
pub fn patient_topic(patient_id: PatientId) -> String {
    scoped(PATIENT_TOPIC_PREFIX, patient_id)
}

/// Queue channel scoped to one branch.
pub fn branch_queue_topic(branch_id: BranchId) -> String {
    scoped(BRANCH_QUEUE_TOPIC_PREFIX, branch_id)
}

fn scoped(prefix: &str, id: impl Display) -> String {
    format!("{prefix}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patient_topic_format() {
        let id = uuid::Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            patient_topic(id),
            "/topic/patient/67e55044-10b1-426f-9247-bb680e5fe0c8"
        );
    }

    #[test]
    fn branch_topic_is_nested_under_global_queue() {
        let id = uuid::Uuid::new_v4();
        let topic = branch_queue_topic(id);
        assert!(topic.starts_with(QUEUE_TOPIC));
        assert_eq!(topic, format!("/topic/queue/{id}"));
    }
}
