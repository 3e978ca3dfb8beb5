//! Types shared by every component: the tenant/system scope a principal
//! acts under, and the per-request context threaded through component
//! calls in place of framework-ambient state.

pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

/// Which rows a principal may see and mutate. A `Tenant` scope is
/// constrained to that tenant's rows; `System` is cross-tenant-read,
/// write-disallowed unless the target row itself has a null `tenant_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Tenant(Uuid),
    System,
}

impl Scope {
    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            Scope::Tenant(id) => Some(*id),
            Scope::System => None,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Scope::System)
    }
}

/// The authenticated actor derived from a credential: an identity plus
/// its role, claims, and scope.
#[derive(Debug, Clone)]
pub struct Principal {
    pub identity_id: Uuid,
    pub scope: Scope,
    pub role: String,
    pub claims: serde_json::Value,
}

impl Principal {
    pub fn system(identity_id: Uuid) -> Self {
        Self { identity_id, scope: Scope::System, role: "system".to_string(), claims: serde_json::Value::Null }
    }
}

/// Explicit per-request state, replacing ambient framework dependencies.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub request_id: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn scope(&self) -> Scope {
        self.principal.as_ref().map(|p| p.scope).unwrap_or(Scope::System)
    }
}
