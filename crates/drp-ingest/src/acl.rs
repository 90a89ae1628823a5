//! Access control for repository writes
//!
//! Deposits record the staff roles that should apply to each created object,
//! and every repository write is gated on the depositing agent holding the
//! right permission on the container receiving the new object.

use crate::error::AccessRestrictionError;
use async_trait::async_trait;
use drp_common::types::Pid;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Staff role assignable to a principal on a repository object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrantRole {
    /// Explicit revocation. Suppresses every other grant the principal
    /// holds on the same object.
    None,
    CanView,
    CanIngest,
    CanManage,
    UnitOwner,
}

impl GrantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantRole::None => "none",
            GrantRole::CanView => "can-view",
            GrantRole::CanIngest => "can-ingest",
            GrantRole::CanManage => "can-manage",
            GrantRole::UnitOwner => "unit-owner",
        }
    }

    /// Whether this role carries the given permission.
    ///
    /// Creating administrative units is reserved for the global
    /// administrator groups, so no per-object role grants it.
    pub fn grants(&self, permission: Permission) -> bool {
        match permission {
            Permission::CreateAdminUnit => false,
            Permission::CreateCollection => {
                matches!(self, GrantRole::CanManage | GrantRole::UnitOwner)
            }
            Permission::Ingest => matches!(
                self,
                GrantRole::CanIngest | GrantRole::CanManage | GrantRole::UnitOwner
            ),
        }
    }
}

impl std::str::FromStr for GrantRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(GrantRole::None),
            "can-view" | "canview" => Ok(GrantRole::CanView),
            "can-ingest" | "caningest" => Ok(GrantRole::CanIngest),
            "can-manage" | "canmanage" => Ok(GrantRole::CanManage),
            "unit-owner" | "unitowner" => Ok(GrantRole::UnitOwner),
            _ => Err(anyhow::anyhow!("Invalid grant role: {}", s)),
        }
    }
}

impl std::fmt::Display for GrantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A role assigned to one principal on one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// User name or group key the grant applies to
    pub principal: String,
    pub role: GrantRole,
}

impl AccessGrant {
    pub fn new(principal: impl Into<String>, role: GrantRole) -> Self {
        Self {
            principal: principal.into(),
            role,
        }
    }

    /// Whether the grant is an explicit revocation.
    pub fn is_revocation(&self) -> bool {
        self.role == GrantRole::None
    }
}

/// Repository permission checked before a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    CreateAdminUnit,
    CreateCollection,
    Ingest,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::CreateAdminUnit => "createAdminUnit",
            Permission::CreateCollection => "createCollection",
            Permission::Ingest => "ingest",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of the agent a job acts on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPrincipals {
    /// Depositor user name
    pub name: String,
    /// Group principals the depositor belongs to
    pub groups: Vec<String>,
}

impl AgentPrincipals {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_groups(name: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            name: name.into(),
            groups,
        }
    }

    /// Build principals from the semicolon-separated group list recorded on
    /// a deposit.
    pub fn from_permission_groups(name: impl Into<String>, groups: &str) -> Self {
        Self {
            name: name.into(),
            groups: groups
                .split(';')
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect(),
        }
    }

    /// All principal keys this agent can match grants against.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.groups.iter().map(|g| g.as_str()))
    }
}

/// Permission oracle consulted before every repository write
#[async_trait]
pub trait AccessControlService: Send + Sync {
    /// Whether the agent holds `permission` on the container `container`.
    async fn has_permission(
        &self,
        principals: &AgentPrincipals,
        container: &Pid,
        permission: Permission,
    ) -> anyhow::Result<bool>;
}

/// Check a permission and surface a denial as a typed error.
pub async fn require_permission(
    access: &dyn AccessControlService,
    principals: &AgentPrincipals,
    container: &Pid,
    permission: Permission,
) -> anyhow::Result<()> {
    if access
        .has_permission(principals, container, permission)
        .await?
    {
        Ok(())
    } else {
        Err(AccessRestrictionError {
            agent: principals.name.clone(),
            permission,
            container: *container,
        }
        .into())
    }
}

/// Access control backed by an in-memory grant table
///
/// Global administrator groups hold every permission on every container.
/// Other principals are resolved against the per-object grants, with an
/// explicit `none` grant suppressing everything else the principal holds
/// on that object.
#[derive(Debug, Clone, Default)]
pub struct StaticAccessControl {
    global_admin_groups: Vec<String>,
    object_grants: HashMap<Pid, Vec<AccessGrant>>,
}

impl StaticAccessControl {
    pub fn new(global_admin_groups: Vec<String>) -> Self {
        Self {
            global_admin_groups,
            object_grants: HashMap::new(),
        }
    }

    /// Record the grants applying to one container.
    pub fn set_grants(&mut self, container: Pid, grants: Vec<AccessGrant>) {
        self.object_grants.insert(container, grants);
    }

    pub fn add_grant(&mut self, container: Pid, grant: AccessGrant) {
        self.object_grants.entry(container).or_default().push(grant);
    }

    fn is_global_admin(&self, principals: &AgentPrincipals) -> bool {
        principals
            .keys()
            .any(|key| self.global_admin_groups.iter().any(|g| g == key))
    }
}

#[async_trait]
impl AccessControlService for StaticAccessControl {
    async fn has_permission(
        &self,
        principals: &AgentPrincipals,
        container: &Pid,
        permission: Permission,
    ) -> anyhow::Result<bool> {
        if self.is_global_admin(principals) {
            return Ok(true);
        }

        let Some(grants) = self.object_grants.get(container) else {
            return Ok(false);
        };

        let matching: Vec<&AccessGrant> = grants
            .iter()
            .filter(|grant| principals.keys().any(|key| key == grant.principal))
            .collect();

        if matching.iter().any(|grant| grant.is_revocation()) {
            return Ok(false);
        }

        Ok(matching.iter().any(|grant| grant.role.grants(permission)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn agent() -> AgentPrincipals {
        AgentPrincipals::with_groups("depositor", vec!["unit:staff".to_string()])
    }

    #[tokio::test]
    async fn test_global_admin_holds_every_permission() {
        let acl = StaticAccessControl::new(vec!["repository-admins".to_string()]);
        let admin = AgentPrincipals::with_groups("admin", vec!["repository-admins".to_string()]);
        let container = Pid::new();

        for permission in [
            Permission::CreateAdminUnit,
            Permission::CreateCollection,
            Permission::Ingest,
        ] {
            assert!(acl
                .has_permission(&admin, &container, permission)
                .await
                .unwrap());
        }
    }

    #[tokio::test]
    async fn test_group_grant_allows_ingest() {
        let mut acl = StaticAccessControl::new(vec![]);
        let container = Pid::new();
        acl.add_grant(
            container,
            AccessGrant::new("unit:staff", GrantRole::CanIngest),
        );

        assert!(acl
            .has_permission(&agent(), &container, Permission::Ingest)
            .await
            .unwrap());
        assert!(!acl
            .has_permission(&agent(), &container, Permission::CreateCollection)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_none_grant_suppresses_other_roles() {
        let mut acl = StaticAccessControl::new(vec![]);
        let container = Pid::new();
        acl.add_grant(
            container,
            AccessGrant::new("unit:staff", GrantRole::CanManage),
        );
        acl.add_grant(container, AccessGrant::new("depositor", GrantRole::None));

        assert!(!acl
            .has_permission(&agent(), &container, Permission::Ingest)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unknown_container_denies() {
        let acl = StaticAccessControl::new(vec![]);
        assert!(!acl
            .has_permission(&agent(), &Pid::new(), Permission::Ingest)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_require_permission_reports_agent_and_container() {
        let acl = StaticAccessControl::new(vec![]);
        let container = Pid::new();

        let err = require_permission(&acl, &agent(), &container, Permission::Ingest)
            .await
            .unwrap_err();
        let restriction = err.downcast_ref::<AccessRestrictionError>().unwrap();
        assert_eq!(restriction.agent, "depositor");
        assert_eq!(restriction.permission, Permission::Ingest);
        assert_eq!(restriction.container, container);
    }

    #[test]
    fn test_grant_role_parsing() {
        assert_eq!("can-ingest".parse::<GrantRole>().unwrap(), GrantRole::CanIngest);
        assert_eq!("unitOwner".parse::<GrantRole>().unwrap(), GrantRole::UnitOwner);
        assert_eq!("none".parse::<GrantRole>().unwrap(), GrantRole::None);
        assert!("owner".parse::<GrantRole>().is_err());
    }
}
