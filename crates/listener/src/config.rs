use patientflow_core::error::CoreError;
use patientflow_core::types::{parse_entity_id, BranchId, EntityId, Identity, PatientId, TenantId};
use patientflow_hooks::PatientKeys;
use patientflow_realtime::config::ConfigError;
use patientflow_realtime::RealtimeConfig;

/// Listener configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub realtime: RealtimeConfig,
    /// User the connection is opened for.
    pub user_id: EntityId,
    pub tenant_id: Option<TenantId>,
    /// Patient whose portal events are followed. Without one the patient
    /// hook stays inactive.
    pub patient_id: Option<PatientId>,
    pub branch_id: Option<BranchId>,
    /// Mount the staff queue board hook on the global queue topic.
    pub queue_board: bool,
    /// Poll the doctor chat conversation list.
    pub poll_conversations: bool,
}

impl ListenerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                       | Default    |
    /// |-------------------------------|------------|
    /// | `LISTENER_USER_ID`            | (required) |
    /// | `LISTENER_TENANT_ID`          | unset      |
    /// | `LISTENER_PATIENT_ID`         | unset      |
    /// | `LISTENER_BRANCH_ID`          | unset      |
    /// | `LISTENER_QUEUE_BOARD`        | `true`     |
    /// | `LISTENER_POLL_CONVERSATIONS` | `false`    |
    ///
    /// Transport settings come from [`RealtimeConfig::from_env`].
    pub fn from_env() -> Result<Self, ListenerConfigError> {
        let realtime = RealtimeConfig::from_env()?;
        Self::from_lookup(realtime, |name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(realtime: RealtimeConfig, lookup: F) -> Result<Self, ListenerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let id = |name: &'static str, entity: &'static str| -> Result<Option<EntityId>, ListenerConfigError> {
            var(name)
                .map(|raw| parse_entity_id(entity, &raw))
                .transpose()
                .map_err(ListenerConfigError::from)
        };
        let flag = |name: &'static str, default: bool| -> Result<bool, ListenerConfigError> {
            match var(name) {
                None => Ok(default),
                Some(raw) => match raw.to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => Ok(true),
                    "0" | "false" | "no" | "off" => Ok(false),
                    _ => Err(ListenerConfigError::InvalidFlag { name, value: raw }),
                },
            }
        };

        let user_id = id("LISTENER_USER_ID", "user")?
            .ok_or(ListenerConfigError::Missing("LISTENER_USER_ID"))?;

        Ok(Self {
            realtime,
            user_id,
            tenant_id: id("LISTENER_TENANT_ID", "tenant")?,
            patient_id: id("LISTENER_PATIENT_ID", "patient")?,
            branch_id: id("LISTENER_BRANCH_ID", "branch")?,
            queue_board: flag("LISTENER_QUEUE_BOARD", true)?,
            poll_conversations: flag("LISTENER_POLL_CONVERSATIONS", false)?,
        })
    }

    pub fn identity(&self) -> Identity {
        let identity = Identity::new(self.user_id);
        match self.tenant_id {
            Some(tenant) => identity.with_tenant(tenant),
            None => identity,
        }
    }

    pub fn patient_keys(&self) -> PatientKeys {
        PatientKeys::new(self.tenant_id, self.patient_id, self.branch_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerConfigError {
    #[error(transparent)]
    Realtime(#[from] ConfigError),

    #[error(transparent)]
    InvalidId(#[from] CoreError),

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} must be a boolean, got {value:?}")]
    InvalidFlag { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    const USER: &str = "0b7c8f1e-3a2d-4c5b-9e6f-7a8b9c0d1e2f";
    const TENANT: &str = "5d1f2e3c-4b5a-4697-8879-6a5b4c3d2e1f";

    fn load(vars: &[(&str, &str)]) -> Result<ListenerConfig, ListenerConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ListenerConfig::from_lookup(RealtimeConfig::default(), |name| map.get(name).cloned())
    }

    #[test]
    fn user_id_is_required() {
        assert_matches!(load(&[]), Err(ListenerConfigError::Missing("LISTENER_USER_ID")));
        assert_matches!(
            load(&[("LISTENER_USER_ID", "  ")]),
            Err(ListenerConfigError::Missing(_))
        );
    }

    #[test]
    fn defaults_follow_the_table() {
        let config = load(&[("LISTENER_USER_ID", USER)]).unwrap();
        assert_eq!(config.user_id.to_string(), USER);
        assert!(config.tenant_id.is_none());
        assert!(config.patient_id.is_none());
        assert!(config.queue_board);
        assert!(!config.poll_conversations);
        assert_eq!(config.identity().tenant_id, None);
    }

    #[test]
    fn tenant_flows_into_identity_and_keys() {
        let config = load(&[("LISTENER_USER_ID", USER), ("LISTENER_TENANT_ID", TENANT)]).unwrap();
        assert_eq!(config.identity().tenant_id, config.tenant_id);
        assert_eq!(config.patient_keys().tenant, config.tenant_id);
        assert!(config.patient_keys().patient.is_none());
    }

    #[test]
    fn bad_ids_name_the_entity() {
        assert_matches!(
            load(&[("LISTENER_USER_ID", USER), ("LISTENER_BRANCH_ID", "b1")]),
            Err(ListenerConfigError::InvalidId(CoreError::InvalidId { entity: "branch", .. }))
        );
    }

    #[test]
    fn flags_accept_common_spellings() {
        let config = load(&[
            ("LISTENER_USER_ID", USER),
            ("LISTENER_QUEUE_BOARD", "off"),
            ("LISTENER_POLL_CONVERSATIONS", "YES"),
        ])
        .unwrap();
        assert!(!config.queue_board);
        assert!(config.poll_conversations);

        assert_matches!(
            load(&[("LISTENER_USER_ID", USER), ("LISTENER_QUEUE_BOARD", "maybe")]),
            Err(ListenerConfigError::InvalidFlag { name: "LISTENER_QUEUE_BOARD", .. })
        );
    }
}
