//! Identity Model
//!
//! The identity collaborator hands over loosely-typed [`IdentityClaims`].
//! They are validated exactly once into an [`Identity`], which is immutable
//! for the rest of the request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tenant (customer organization) identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Wrap a tenant id
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a user id
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CRM role. Exactly one per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Platform operator
    SuperAdmin,
    /// Business owner, full access within the tenant
    Owner,
    /// Everything except critical business settings
    Manager,
    /// Accounting, quotes, invoices and reports
    Accountant,
    /// Basic employee
    User,
}

impl Role {
    /// All roles, in matrix column order
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::Owner,
        Role::Manager,
        Role::Accountant,
        Role::User,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::Owner => "OWNER",
            Self::Manager => "MANAGER",
            Self::Accountant => "ACCOUNTANT",
            Self::User => "USER",
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Super Administrateur",
            Self::Owner => "Propriétaire",
            Self::Manager => "Manager",
            Self::Accountant => "Comptable",
            Self::User => "Employé",
        }
    }

    /// One-line description for role pickers
    pub fn description(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Accès complet à toutes les fonctionnalités",
            Self::Owner => "Propriétaire de l'entreprise avec accès complet",
            Self::Manager => "Gestion complète sauf paramètres critiques",
            Self::Accountant => "Accès complet au module comptabilité, devis, factures et rapports",
            Self::User => "Employé avec accès aux fonctionnalités de base",
        }
    }

    /// Column index in the permission matrix
    pub fn index(&self) -> usize {
        match self {
            Self::SuperAdmin => 0,
            Self::Owner => 1,
            Self::Manager => 2,
            Self::Accountant => 3,
            Self::User => 4,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| IdentityError::UnknownRole(s.to_string()))
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production deployment behind a trusted proxy
    #[default]
    Production,
    /// Local development
    Development,
    /// Automated tests
    Test,
}

impl Environment {
    /// Whether this is a production deployment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Claims as delivered by the identity collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// User id
    pub id: String,
    /// Role wire name, unvalidated
    pub role: Option<String>,
    /// Tenant the session belongs to
    #[serde(rename = "tenantId")]
    pub tenant_id: Option<String>,
}

/// Validated, request-scoped identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    id: UserId,
    role: Role,
    tenant_id: TenantId,
}

impl Identity {
    /// Build an identity from already-typed parts
    pub fn new(id: UserId, role: Role, tenant_id: TenantId) -> Self {
        Self { id, role, tenant_id }
    }

    /// User id
    pub fn id(&self) -> &UserId {
        &self.id
    }

    /// Role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Tenant the identity is scoped to
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TryFrom<IdentityClaims> for Identity {
    type Error = IdentityError;

    fn try_from(claims: IdentityClaims) -> Result<Self, Self::Error> {
        if claims.id.trim().is_empty() {
            return Err(IdentityError::MissingUserId);
        }
        let role = claims
            .role
            .as_deref()
            .ok_or(IdentityError::MissingRole)?
            .parse::<Role>()?;
        let tenant_id = claims
            .tenant_id
            .filter(|t| !t.trim().is_empty())
            .ok_or(IdentityError::MissingTenant)?;

        Ok(Self {
            id: UserId::new(claims.id),
            role,
            tenant_id: TenantId::new(tenant_id),
        })
    }
}

/// Identity validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// Claims carry no user id
    #[error("identity has no user id")]
    MissingUserId,
    /// Claims carry no role
    #[error("identity has no role")]
    MissingRole,
    /// Role string is not one of the closed set
    #[error("unknown role: {0}")]
    UnknownRole(String),
    /// Claims carry no tenant
    #[error("identity has no tenant")]
    MissingTenant,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Option<&str>, tenant: Option<&str>) -> IdentityClaims {
        IdentityClaims {
            id: "user-1".into(),
            role: role.map(Into::into),
            tenant_id: tenant.map(Into::into),
        }
    }

    #[test]
    fn test_role_labels_and_descriptions() {
        assert_eq!(Role::Accountant.label(), "Comptable");
        assert_eq!(Role::User.label(), "Employé");
        assert!(Role::Manager.description().contains("sauf paramètres critiques"));
        for role in Role::ALL {
            assert!(!role.label().is_empty());
            assert!(!role.description().is_empty());
        }
    }

    #[test]
    fn test_role_round_trip_names() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("owner".parse::<Role>().is_err());
        assert!("ADMIN".parse::<Role>().is_err());
    }

    #[test]
    fn test_valid_claims() {
        let identity = Identity::try_from(claims(Some("MANAGER"), Some("t-1"))).unwrap();
        assert_eq!(identity.role(), Role::Manager);
        assert_eq!(identity.tenant_id().as_str(), "t-1");
        assert_eq!(identity.id().as_str(), "user-1");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = Identity::try_from(claims(Some("ROOT"), Some("t-1"))).unwrap_err();
        assert_eq!(err, IdentityError::UnknownRole("ROOT".into()));
    }

    #[test]
    fn test_missing_parts_rejected() {
        assert_eq!(
            Identity::try_from(claims(None, Some("t-1"))).unwrap_err(),
            IdentityError::MissingRole
        );
        assert_eq!(
            Identity::try_from(claims(Some("USER"), Some("  "))).unwrap_err(),
            IdentityError::MissingTenant
        );
        let mut c = claims(Some("USER"), Some("t-1"));
        c.id = String::new();
        assert_eq!(Identity::try_from(c).unwrap_err(), IdentityError::MissingUserId);
    }

    #[test]
    fn test_claims_deserialize_camel_case_tenant() {
        let c: IdentityClaims =
            serde_json::from_str(r#"{"id":"u","role":"OWNER","tenantId":"t"}"#).unwrap();
        assert_eq!(c.tenant_id.as_deref(), Some("t"));
    }

    #[test]
    fn test_environment_default_is_production() {
        assert!(Environment::default().is_production());
    }
}
