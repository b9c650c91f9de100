//! Role → Permission Table
//!
//! The table source is an explicit matrix: one row per permission, one
//! grant/withhold cell per role. Construction rejects a matrix that misses a
//! permission or lists one twice, so no (role, permission) pair is ever
//! decided by omission.

use crate::AuthzError;
use crm_common::Role;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Known CRM permission tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Permission {
    ViewDashboard,
    ViewContacts,
    CreateContacts,
    EditContacts,
    DeleteContacts,
    ViewVehicles,
    CreateVehicles,
    EditVehicles,
    DeleteVehicles,
    ViewQuotes,
    CreateQuotes,
    EditQuotes,
    DeleteQuotes,
    SendQuotes,
    ViewInvoices,
    CreateInvoices,
    EditInvoices,
    DeleteInvoices,
    SendInvoices,
    ViewTasks,
    CreateTasks,
    EditTasks,
    DeleteTasks,
    ViewCatalog,
    EditCatalog,
    ViewPlanning,
    EditPlanning,
    ViewCommunications,
    SendMessages,
    ViewEmails,
    SendEmails,
    UseAiAssistant,
    ViewReports,
    ViewProjects,
    CreateProjects,
    EditProjects,
    DeleteProjects,
    ViewCompanyDocuments,
    UploadCompanyDocuments,
    DeleteCompanyDocuments,
    ViewTeam,
    InviteMembers,
    EditMembers,
    RemoveMembers,
    ViewCompany,
    EditCompany,
    ViewSettings,
    EditSettings,
    ViewAccounting,
    ViewBankAccounts,
    CreateBankAccounts,
    EditBankAccounts,
    DeleteBankAccounts,
    ReconcileBankAccounts,
    ViewBankTransactions,
    CreateBankTransactions,
    EditBankTransactions,
    DeleteBankTransactions,
    ViewExpenses,
    CreateExpenses,
    EditExpenses,
    ApproveExpenses,
    DeleteExpenses,
    ViewInventory,
    CreateInventory,
    EditInventory,
    DeleteInventory,
    ViewTaxDocuments,
    UploadTaxDocuments,
    DeleteTaxDocuments,
    ViewPayroll,
    UploadPayroll,
    DeletePayroll,
    ViewLegalDocuments,
    UploadLegalDocuments,
    DeleteLegalDocuments,
    ViewLitigation,
    CreateLitigation,
    EditLitigation,
    DeleteLitigation,
    ViewFinancialReports,
    GenerateFinancialReports,
}

impl Permission {
    /// Every known permission
    pub const ALL: &'static [Permission] = &[
        Permission::ViewDashboard,
        Permission::ViewContacts,
        Permission::CreateContacts,
        Permission::EditContacts,
        Permission::DeleteContacts,
        Permission::ViewVehicles,
        Permission::CreateVehicles,
        Permission::EditVehicles,
        Permission::DeleteVehicles,
        Permission::ViewQuotes,
        Permission::CreateQuotes,
        Permission::EditQuotes,
        Permission::DeleteQuotes,
        Permission::SendQuotes,
        Permission::ViewInvoices,
        Permission::CreateInvoices,
        Permission::EditInvoices,
        Permission::DeleteInvoices,
        Permission::SendInvoices,
        Permission::ViewTasks,
        Permission::CreateTasks,
        Permission::EditTasks,
        Permission::DeleteTasks,
        Permission::ViewCatalog,
        Permission::EditCatalog,
        Permission::ViewPlanning,
        Permission::EditPlanning,
        Permission::ViewCommunications,
        Permission::SendMessages,
        Permission::ViewEmails,
        Permission::SendEmails,
        Permission::UseAiAssistant,
        Permission::ViewReports,
        Permission::ViewProjects,
        Permission::CreateProjects,
        Permission::EditProjects,
        Permission::DeleteProjects,
        Permission::ViewCompanyDocuments,
        Permission::UploadCompanyDocuments,
        Permission::DeleteCompanyDocuments,
        Permission::ViewTeam,
        Permission::InviteMembers,
        Permission::EditMembers,
        Permission::RemoveMembers,
        Permission::ViewCompany,
        Permission::EditCompany,
        Permission::ViewSettings,
        Permission::EditSettings,
        Permission::ViewAccounting,
        Permission::ViewBankAccounts,
        Permission::CreateBankAccounts,
        Permission::EditBankAccounts,
        Permission::DeleteBankAccounts,
        Permission::ReconcileBankAccounts,
        Permission::ViewBankTransactions,
        Permission::CreateBankTransactions,
        Permission::EditBankTransactions,
        Permission::DeleteBankTransactions,
        Permission::ViewExpenses,
        Permission::CreateExpenses,
        Permission::EditExpenses,
        Permission::ApproveExpenses,
        Permission::DeleteExpenses,
        Permission::ViewInventory,
        Permission::CreateInventory,
        Permission::EditInventory,
        Permission::DeleteInventory,
        Permission::ViewTaxDocuments,
        Permission::UploadTaxDocuments,
        Permission::DeleteTaxDocuments,
        Permission::ViewPayroll,
        Permission::UploadPayroll,
        Permission::DeletePayroll,
        Permission::ViewLegalDocuments,
        Permission::UploadLegalDocuments,
        Permission::DeleteLegalDocuments,
        Permission::ViewLitigation,
        Permission::CreateLitigation,
        Permission::EditLitigation,
        Permission::DeleteLitigation,
        Permission::ViewFinancialReports,
        Permission::GenerateFinancialReports,
    ];

    /// Wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewDashboard => "view_dashboard",
            Self::ViewContacts => "view_contacts",
            Self::CreateContacts => "create_contacts",
            Self::EditContacts => "edit_contacts",
            Self::DeleteContacts => "delete_contacts",
            Self::ViewVehicles => "view_vehicles",
            Self::CreateVehicles => "create_vehicles",
            Self::EditVehicles => "edit_vehicles",
            Self::DeleteVehicles => "delete_vehicles",
            Self::ViewQuotes => "view_quotes",
            Self::CreateQuotes => "create_quotes",
            Self::EditQuotes => "edit_quotes",
            Self::DeleteQuotes => "delete_quotes",
            Self::SendQuotes => "send_quotes",
            Self::ViewInvoices => "view_invoices",
            Self::CreateInvoices => "create_invoices",
            Self::EditInvoices => "edit_invoices",
            Self::DeleteInvoices => "delete_invoices",
            Self::SendInvoices => "send_invoices",
            Self::ViewTasks => "view_tasks",
            Self::CreateTasks => "create_tasks",
            Self::EditTasks => "edit_tasks",
            Self::DeleteTasks => "delete_tasks",
            Self::ViewCatalog => "view_catalog",
            Self::EditCatalog => "edit_catalog",
            Self::ViewPlanning => "view_planning",
            Self::EditPlanning => "edit_planning",
            Self::ViewCommunications => "view_communications",
            Self::SendMessages => "send_messages",
            Self::ViewEmails => "view_emails",
            Self::SendEmails => "send_emails",
            Self::UseAiAssistant => "use_ai_assistant",
            Self::ViewReports => "view_reports",
            Self::ViewProjects => "view_projects",
            Self::CreateProjects => "create_projects",
            Self::EditProjects => "edit_projects",
            Self::DeleteProjects => "delete_projects",
            Self::ViewCompanyDocuments => "view_company_documents",
            Self::UploadCompanyDocuments => "upload_company_documents",
            Self::DeleteCompanyDocuments => "delete_company_documents",
            Self::ViewTeam => "view_team",
            Self::InviteMembers => "invite_members",
            Self::EditMembers => "edit_members",
            Self::RemoveMembers => "remove_members",
            Self::ViewCompany => "view_company",
            Self::EditCompany => "edit_company",
            Self::ViewSettings => "view_settings",
            Self::EditSettings => "edit_settings",
            Self::ViewAccounting => "view_accounting",
            Self::ViewBankAccounts => "view_bank_accounts",
            Self::CreateBankAccounts => "create_bank_accounts",
            Self::EditBankAccounts => "edit_bank_accounts",
            Self::DeleteBankAccounts => "delete_bank_accounts",
            Self::ReconcileBankAccounts => "reconcile_bank_accounts",
            Self::ViewBankTransactions => "view_bank_transactions",
            Self::CreateBankTransactions => "create_bank_transactions",
            Self::EditBankTransactions => "edit_bank_transactions",
            Self::DeleteBankTransactions => "delete_bank_transactions",
            Self::ViewExpenses => "view_expenses",
            Self::CreateExpenses => "create_expenses",
            Self::EditExpenses => "edit_expenses",
            Self::ApproveExpenses => "approve_expenses",
            Self::DeleteExpenses => "delete_expenses",
            Self::ViewInventory => "view_inventory",
            Self::CreateInventory => "create_inventory",
            Self::EditInventory => "edit_inventory",
            Self::DeleteInventory => "delete_inventory",
            Self::ViewTaxDocuments => "view_tax_documents",
            Self::UploadTaxDocuments => "upload_tax_documents",
            Self::DeleteTaxDocuments => "delete_tax_documents",
            Self::ViewPayroll => "view_payroll",
            Self::UploadPayroll => "upload_payroll",
            Self::DeletePayroll => "delete_payroll",
            Self::ViewLegalDocuments => "view_legal_documents",
            Self::UploadLegalDocuments => "upload_legal_documents",
            Self::DeleteLegalDocuments => "delete_legal_documents",
            Self::ViewLitigation => "view_litigation",
            Self::CreateLitigation => "create_litigation",
            Self::EditLitigation => "edit_litigation",
            Self::DeleteLitigation => "delete_litigation",
            Self::ViewFinancialReports => "view_financial_reports",
            Self::GenerateFinancialReports => "generate_financial_reports",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| AuthzError::UnknownPermission(s.to_string()))
    }
}

const Y: bool = true;
const N: bool = false;

/// Grant matrix. Columns: SUPER_ADMIN, OWNER, MANAGER, ACCOUNTANT, USER.
pub const DEFAULT_MATRIX: &[(Permission, [bool; 5])] = &[
    (Permission::ViewDashboard, [Y, Y, Y, Y, Y]),
    (Permission::ViewContacts, [Y, Y, Y, Y, Y]),
    (Permission::CreateContacts, [Y, Y, Y, N, Y]),
    (Permission::EditContacts, [Y, Y, Y, N, Y]),
    (Permission::DeleteContacts, [Y, Y, Y, N, N]),
    (Permission::ViewVehicles, [Y, Y, Y, Y, Y]),
    (Permission::CreateVehicles, [Y, Y, Y, N, Y]),
    (Permission::EditVehicles, [Y, Y, Y, N, Y]),
    (Permission::DeleteVehicles, [Y, Y, Y, N, N]),
    (Permission::ViewQuotes, [Y, Y, Y, Y, Y]),
    (Permission::CreateQuotes, [Y, Y, Y, Y, Y]),
    (Permission::EditQuotes, [Y, Y, Y, Y, N]),
    (Permission::DeleteQuotes, [Y, Y, Y, N, N]),
    (Permission::SendQuotes, [Y, Y, Y, Y, N]),
    (Permission::ViewInvoices, [Y, Y, Y, Y, Y]),
    (Permission::CreateInvoices, [Y, Y, Y, Y, N]),
    (Permission::EditInvoices, [Y, Y, Y, Y, N]),
    (Permission::DeleteInvoices, [Y, Y, Y, N, N]),
    (Permission::SendInvoices, [Y, Y, Y, Y, N]),
    (Permission::ViewTasks, [Y, Y, Y, N, Y]),
    (Permission::CreateTasks, [Y, Y, Y, N, Y]),
    (Permission::EditTasks, [Y, Y, Y, N, Y]),
    (Permission::DeleteTasks, [Y, Y, Y, N, N]),
    (Permission::ViewCatalog, [Y, Y, Y, Y, Y]),
    (Permission::EditCatalog, [Y, Y, Y, N, N]),
    (Permission::ViewPlanning, [Y, Y, Y, N, Y]),
    (Permission::EditPlanning, [Y, Y, Y, N, Y]),
    (Permission::ViewCommunications, [Y, Y, Y, N, Y]),
    (Permission::SendMessages, [Y, Y, Y, N, Y]),
    (Permission::ViewEmails, [Y, Y, Y, N, Y]),
    (Permission::SendEmails, [Y, Y, Y, N, Y]),
    (Permission::UseAiAssistant, [Y, Y, Y, N, Y]),
    (Permission::ViewReports, [Y, Y, Y, Y, N]),
    (Permission::ViewProjects, [Y, Y, Y, N, N]),
    (Permission::CreateProjects, [Y, Y, Y, N, N]),
    (Permission::EditProjects, [Y, Y, Y, N, N]),
    (Permission::DeleteProjects, [Y, Y, Y, N, N]),
    (Permission::ViewCompanyDocuments, [Y, Y, Y, N, N]),
    (Permission::UploadCompanyDocuments, [Y, Y, Y, N, N]),
    (Permission::DeleteCompanyDocuments, [Y, Y, N, N, N]),
    (Permission::ViewTeam, [Y, Y, Y, N, N]),
    (Permission::InviteMembers, [Y, Y, Y, N, N]),
    (Permission::EditMembers, [Y, Y, Y, N, N]),
    (Permission::RemoveMembers, [Y, Y, N, N, N]),
    (Permission::ViewCompany, [Y, Y, Y, Y, N]),
    (Permission::EditCompany, [Y, Y, N, N, N]),
    (Permission::ViewSettings, [Y, Y, Y, N, N]),
    (Permission::EditSettings, [Y, Y, N, N, N]),
    (Permission::ViewAccounting, [Y, Y, Y, Y, N]),
    (Permission::ViewBankAccounts, [Y, Y, Y, Y, N]),
    (Permission::CreateBankAccounts, [Y, Y, Y, Y, N]),
    (Permission::EditBankAccounts, [Y, Y, Y, Y, N]),
    (Permission::DeleteBankAccounts, [Y, Y, N, N, N]),
    (Permission::ReconcileBankAccounts, [Y, Y, Y, Y, N]),
    (Permission::ViewBankTransactions, [Y, Y, Y, Y, N]),
    (Permission::CreateBankTransactions, [Y, Y, Y, Y, N]),
    (Permission::EditBankTransactions, [Y, Y, Y, Y, N]),
    (Permission::DeleteBankTransactions, [Y, Y, N, N, N]),
    (Permission::ViewExpenses, [Y, Y, Y, Y, N]),
    (Permission::CreateExpenses, [Y, Y, Y, Y, N]),
    (Permission::EditExpenses, [Y, Y, Y, Y, N]),
    (Permission::ApproveExpenses, [Y, Y, Y, Y, N]),
    (Permission::DeleteExpenses, [Y, Y, N, N, N]),
    (Permission::ViewInventory, [Y, Y, Y, Y, N]),
    (Permission::CreateInventory, [Y, Y, Y, Y, N]),
    (Permission::EditInventory, [Y, Y, Y, Y, N]),
    (Permission::DeleteInventory, [Y, Y, N, N, N]),
    (Permission::ViewTaxDocuments, [Y, Y, Y, Y, N]),
    (Permission::UploadTaxDocuments, [Y, Y, Y, Y, N]),
    (Permission::DeleteTaxDocuments, [Y, Y, N, N, N]),
    (Permission::ViewPayroll, [Y, Y, Y, Y, N]),
    (Permission::UploadPayroll, [Y, Y, Y, Y, N]),
    (Permission::DeletePayroll, [Y, Y, N, N, N]),
    (Permission::ViewLegalDocuments, [Y, Y, Y, Y, N]),
    (Permission::UploadLegalDocuments, [Y, Y, Y, Y, N]),
    (Permission::DeleteLegalDocuments, [Y, Y, N, N, N]),
    (Permission::ViewLitigation, [Y, Y, Y, Y, N]),
    (Permission::CreateLitigation, [Y, Y, Y, Y, N]),
    (Permission::EditLitigation, [Y, Y, Y, Y, N]),
    (Permission::DeleteLitigation, [Y, Y, N, N, N]),
    (Permission::ViewFinancialReports, [Y, Y, Y, Y, N]),
    (Permission::GenerateFinancialReports, [Y, Y, Y, Y, N]),
];

/// Immutable role → permission mapping
#[derive(Debug, Clone)]
pub struct RolePermissionTable {
    grants: HashMap<Role, HashSet<Permission>>,
}

impl RolePermissionTable {
    /// Build from an explicit matrix, rejecting omissions and duplicates
    pub fn from_matrix(matrix: &[(Permission, [bool; 5])]) -> Result<Self, AuthzError> {
        let mut seen = HashSet::with_capacity(matrix.len());
        for (permission, _) in matrix {
            if !seen.insert(*permission) {
                return Err(AuthzError::DuplicatePermission(permission.as_str().to_string()));
            }
        }
        if let Some(missing) = Permission::ALL.iter().find(|p| !seen.contains(*p)) {
            return Err(AuthzError::MissingPermission(missing.as_str().to_string()));
        }

        Ok(Self { grants: collect_grants(matrix) })
    }

    /// Whether `role` is granted `permission`
    pub fn has_permission(&self, role: Role, permission: Permission) -> bool {
        self.grants
            .get(&role)
            .map(|set| set.contains(&permission))
            .unwrap_or(false)
    }

    /// String form: unknown role or unknown permission is never granted
    pub fn has_permission_str(&self, role: &str, permission: &str) -> bool {
        match (role.parse::<Role>(), permission.parse::<Permission>()) {
            (Ok(role), Ok(permission)) => self.has_permission(role, permission),
            _ => false,
        }
    }

    /// Permissions granted to a role, in catalogue order
    pub fn role_permissions(&self, role: Role) -> Vec<Permission> {
        Permission::ALL
            .iter()
            .copied()
            .filter(|p| self.has_permission(role, *p))
            .collect()
    }

    /// Number of known permissions
    pub fn permission_count(&self) -> usize {
        Permission::ALL.len()
    }
}

impl Default for RolePermissionTable {
    fn default() -> Self {
        Self { grants: collect_grants(DEFAULT_MATRIX) }
    }
}

fn collect_grants(matrix: &[(Permission, [bool; 5])]) -> HashMap<Role, HashSet<Permission>> {
    let mut grants: HashMap<Role, HashSet<Permission>> =
        Role::ALL.into_iter().map(|r| (r, HashSet::new())).collect();
    for (permission, cells) in matrix {
        for role in Role::ALL {
            if cells[role.index()] {
                grants.entry(role).or_default().insert(*permission);
            }
        }
    }
    grants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matrix_is_complete() {
        let table = RolePermissionTable::from_matrix(DEFAULT_MATRIX).unwrap();
        assert_eq!(table.permission_count(), DEFAULT_MATRIX.len());
    }

    #[test]
    fn test_default_matches_validated_build() {
        let built = RolePermissionTable::from_matrix(DEFAULT_MATRIX).unwrap();
        let default = RolePermissionTable::default();
        for role in Role::ALL {
            assert_eq!(built.role_permissions(role), default.role_permissions(role));
        }
    }

    #[test]
    fn test_missing_row_is_rejected() {
        let truncated = &DEFAULT_MATRIX[1..];
        assert!(matches!(
            RolePermissionTable::from_matrix(truncated),
            Err(AuthzError::MissingPermission(p)) if p == "view_dashboard"
        ));
    }

    #[test]
    fn test_duplicate_row_is_rejected() {
        let mut rows = DEFAULT_MATRIX.to_vec();
        rows.push((Permission::ViewContacts, [N, N, N, N, N]));
        assert!(matches!(
            RolePermissionTable::from_matrix(&rows),
            Err(AuthzError::DuplicatePermission(_))
        ));
    }

    #[test]
    fn test_ungranted_pairs_are_denied() {
        let table = RolePermissionTable::default();
        for (permission, cells) in DEFAULT_MATRIX {
            for role in Role::ALL {
                assert_eq!(table.has_permission(role, *permission), cells[role.index()]);
            }
        }
    }

    #[test]
    fn test_role_specific_rows() {
        let table = RolePermissionTable::default();
        assert!(!table.has_permission(Role::User, Permission::DeleteContacts));
        assert!(table.has_permission(Role::Owner, Permission::DeleteContacts));
        assert!(!table.has_permission(Role::Manager, Permission::RemoveMembers));
        assert!(!table.has_permission(Role::Manager, Permission::EditCompany));
        assert!(table.has_permission(Role::Accountant, Permission::ApproveExpenses));
        assert!(!table.has_permission(Role::Accountant, Permission::CreateContacts));
    }

    #[test]
    fn test_unknown_tokens_are_denied() {
        let table = RolePermissionTable::default();
        assert!(!table.has_permission_str("OWNER", "launch_missiles"));
        assert!(!table.has_permission_str("ROOT", "view_contacts"));
        assert!(!table.has_permission_str("", ""));
        assert!(table.has_permission_str("OWNER", "view_contacts"));
    }

    #[test]
    fn test_permission_tokens_parse() {
        for p in Permission::ALL {
            assert_eq!(p.as_str().parse::<Permission>().unwrap(), *p);
        }
        let json = serde_json::to_string(&Permission::ReconcileBankAccounts).unwrap();
        assert_eq!(json, "\"reconcile_bank_accounts\"");
    }

    #[test]
    fn test_user_role_permissions() {
        let perms = RolePermissionTable::default().role_permissions(Role::User);
        assert_eq!(perms.len(), 21);
        assert!(perms.contains(&Permission::UseAiAssistant));
        assert!(!perms.contains(&Permission::ViewReports));
    }
}
