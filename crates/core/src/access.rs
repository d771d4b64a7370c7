//! Role-based access control.
//!
//! Reads need an authenticated actor. Writes need the `write_records`
//! capability (Admin/Asesor, staff or superuser). Quotation workflow actions
//! additionally need their own capability. Checks run before any mutation.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Asesor,
    Mecanico,
}

impl Role {
    pub const ALL: [Role; 3] = [Self::Admin, Self::Asesor, Self::Mecanico];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Asesor => "Asesor",
            Self::Mecanico => "Mecanico",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown role `{value}` (expected Admin|Asesor|Mecanico)"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    WriteRecords,
    ChangeQuotation,
    SendQuotation,
    ApproveQuotation,
    RejectQuotation,
    ConvertQuotationToWorkorder,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Self::WriteRecords,
        Self::ChangeQuotation,
        Self::SendQuotation,
        Self::ApproveQuotation,
        Self::RejectQuotation,
        Self::ConvertQuotationToWorkorder,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WriteRecords => "write_records",
            Self::ChangeQuotation => "change_quotation",
            Self::SendQuotation => "send_quotation",
            Self::ApproveQuotation => "approve_quotation",
            Self::RejectQuotation => "reject_quotation",
            Self::ConvertQuotationToWorkorder => "convert_quotation_to_workorder",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|capability| capability.as_str() == value)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grants installed by `bootstrap-roles` and used by [`StaticRoleTable`].
pub fn default_grants(role: Role) -> &'static [Capability] {
    match role {
        Role::Admin => &Capability::ALL,
        Role::Asesor => &[
            Capability::WriteRecords,
            Capability::ChangeQuotation,
            Capability::SendQuotation,
            Capability::ApproveQuotation,
            Capability::RejectQuotation,
            Capability::ConvertQuotationToWorkorder,
        ],
        Role::Mecanico => &[],
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub subject: String,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

impl Actor {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationAction {
    Approve,
    Reject,
    Send,
    SetStatus,
    ToWorkorder,
}

impl QuotationAction {
    pub fn required_capability(self) -> Capability {
        match self {
            Self::Approve => Capability::ApproveQuotation,
            Self::Reject => Capability::RejectQuotation,
            Self::Send => Capability::SendQuotation,
            Self::SetStatus => Capability::ChangeQuotation,
            Self::ToWorkorder => Capability::ConvertQuotationToWorkorder,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Send => "send",
            Self::SetStatus => "set_status",
            Self::ToWorkorder => "to_workorder",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// GET/HEAD/OPTIONS.
    Read,
    Write,
    Action(QuotationAction),
}

#[async_trait]
pub trait AuthorizationPort: Send + Sync {
    async fn has_capability(
        &self,
        actor: &Actor,
        capability: Capability,
    ) -> Result<bool, ApplicationError>;
}

/// Grants straight from [`default_grants`], for tests and deployments without a
/// grant table.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticRoleTable;

#[async_trait]
impl AuthorizationPort for StaticRoleTable {
    async fn has_capability(
        &self,
        actor: &Actor,
        capability: Capability,
    ) -> Result<bool, ApplicationError> {
        Ok(actor.roles.iter().any(|role| default_grants(*role).contains(&capability)))
    }
}

pub async fn authorize(
    port: &dyn AuthorizationPort,
    actor: &Actor,
    access: Access,
) -> Result<(), ApplicationError> {
    if actor.is_superuser || access == Access::Read {
        return Ok(());
    }

    if !actor.is_staff && !port.has_capability(actor, Capability::WriteRecords).await? {
        return Err(denied(actor, Capability::WriteRecords));
    }

    if let Access::Action(action) = access {
        let capability = action.required_capability();
        if !port.has_capability(actor, capability).await? {
            return Err(denied(actor, capability));
        }
    }

    Ok(())
}

fn denied(actor: &Actor, capability: Capability) -> ApplicationError {
    warn!(
        event_name = "access.denied",
        subject = %actor.subject,
        capability = capability.as_str(),
        "actor lacks required capability"
    );
    ApplicationError::Forbidden(format!("missing capability `{capability}`"))
}
