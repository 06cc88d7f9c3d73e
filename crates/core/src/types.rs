use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All backend entity ids are UUIDs.
pub type EntityId = uuid::Uuid;

pub type PatientId = EntityId;

pub type BranchId = EntityId;

pub type TenantId = EntityId;

/// The authenticated user a realtime session is opened for.
///
/// The broker connection only exists while an identity is present;
/// losing it tears the connection down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: EntityId,
    /// Tenant the user is signed into, when already selected.
    pub tenant_id: Option<TenantId>,
}

impl Identity {
    pub fn new(user_id: EntityId) -> Self {
        Self {
            user_id,
            tenant_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}

/// Parse a textual id, naming the entity in the error.
pub fn parse_entity_id(entity: &'static str, value: &str) -> Result<EntityId, CoreError> {
    uuid::Uuid::parse_str(value.trim()).map_err(|_| CoreError::InvalidId {
        entity,
        value: value.to_string(),
    })
}
