//! Static role → permission table.
//!
//! Context checks such as "does a consent record exist" are composed on top
//! of this by the caller. Nothing here is per-user.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Resident,
    FamilyMember,
    CareStaff,
    HealthProvider,
    FacilityAdmin,
    SystemAdmin,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Self::Resident,
        Self::FamilyMember,
        Self::CareStaff,
        Self::HealthProvider,
        Self::FacilityAdmin,
        Self::SystemAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resident => "resident",
            Self::FamilyMember => "family_member",
            Self::CareStaff => "care_staff",
            Self::HealthProvider => "health_provider",
            Self::FacilityAdmin => "facility_admin",
            Self::SystemAdmin => "system_admin",
        }
    }

    /// Roles a caller may pick for themselves at registration.
    pub fn is_self_service(&self) -> bool {
        matches!(self, Self::Resident | Self::FamilyMember)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown role: {}", s))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadOwnData,
    WriteOwnData,
    ChatWithAssistant,
    ReadAssignedResidents,
    WriteAssignedResidents,
    ReadAllResidentsWithConsent,
    ManageConsent,
    RunSafetyAnalysis,
    RunPhiDetection,
    ViewCrisisAlerts,
    ManageUsers,
    ManageSystemConfig,
    ReadAuditLog,
    ExportData,
}

impl Permission {
    pub const ALL: [Permission; 14] = [
        Self::ReadOwnData,
        Self::WriteOwnData,
        Self::ChatWithAssistant,
        Self::ReadAssignedResidents,
        Self::WriteAssignedResidents,
        Self::ReadAllResidentsWithConsent,
        Self::ManageConsent,
        Self::RunSafetyAnalysis,
        Self::RunPhiDetection,
        Self::ViewCrisisAlerts,
        Self::ManageUsers,
        Self::ManageSystemConfig,
        Self::ReadAuditLog,
        Self::ExportData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOwnData => "read_own_data",
            Self::WriteOwnData => "write_own_data",
            Self::ChatWithAssistant => "chat_with_assistant",
            Self::ReadAssignedResidents => "read_assigned_residents",
            Self::WriteAssignedResidents => "write_assigned_residents",
            Self::ReadAllResidentsWithConsent => "read_all_residents_with_consent",
            Self::ManageConsent => "manage_consent",
            Self::RunSafetyAnalysis => "run_safety_analysis",
            Self::RunPhiDetection => "run_phi_detection",
            Self::ViewCrisisAlerts => "view_crisis_alerts",
            Self::ManageUsers => "manage_users",
            Self::ManageSystemConfig => "manage_system_config",
            Self::ReadAuditLog => "read_audit_log",
            Self::ExportData => "export_data",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable role table. Build once and share.
#[derive(Debug, Clone)]
pub struct PermissionEngine {
    table: HashMap<Role, HashSet<Permission>>,
}

impl PermissionEngine {
    /// The standard healthcare role table.
    pub fn standard() -> Self {
        use Permission::*;

        let own = [ReadOwnData, WriteOwnData];
        let clinical = [
            ReadAssignedResidents,
            WriteAssignedResidents,
            RunSafetyAnalysis,
            RunPhiDetection,
            ViewCrisisAlerts,
        ];

        let mut table: HashMap<Role, HashSet<Permission>> = HashMap::new();
        table.insert(
            Role::Resident,
            own.into_iter().chain([ChatWithAssistant, ManageConsent]).collect(),
        );
        table.insert(
            Role::FamilyMember,
            own.into_iter()
                .chain([ChatWithAssistant, ReadAllResidentsWithConsent])
                .collect(),
        );
        table.insert(Role::CareStaff, own.into_iter().chain(clinical).collect());
        table.insert(
            Role::HealthProvider,
            own.into_iter()
                .chain(clinical)
                .chain([ReadAllResidentsWithConsent, ExportData])
                .collect(),
        );
        table.insert(
            Role::FacilityAdmin,
            own.into_iter()
                .chain([
                    ReadAssignedResidents,
                    ReadAllResidentsWithConsent,
                    RunSafetyAnalysis,
                    RunPhiDetection,
                    ViewCrisisAlerts,
                    ManageUsers,
                    ReadAuditLog,
                    ExportData,
                ])
                .collect(),
        );
        table.insert(Role::SystemAdmin, Permission::ALL.into_iter().collect());

        Self { table }
    }

    pub fn has_permission(&self, role: Role, permission: Permission) -> bool {
        self.table
            .get(&role)
            .map(|granted| granted.contains(&permission))
            .unwrap_or(false)
    }

    /// Granted permissions, sorted for stable output.
    pub fn role_permissions(&self, role: Role) -> Vec<Permission> {
        let mut granted: Vec<Permission> = self
            .table
            .get(&role)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        granted.sort();
        granted
    }
}

impl Default for PermissionEngine {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_role_has_a_row() {
        let engine = PermissionEngine::standard();
        for role in Role::ALL {
            assert!(!engine.role_permissions(role).is_empty(), "{} has no grants", role);
        }
    }

    #[test]
    fn test_resident_scope() {
        let engine = PermissionEngine::standard();
        assert!(engine.has_permission(Role::Resident, Permission::ReadOwnData));
        assert!(engine.has_permission(Role::Resident, Permission::ChatWithAssistant));
        assert!(!engine.has_permission(Role::Resident, Permission::ReadAssignedResidents));
        assert!(!engine.has_permission(Role::Resident, Permission::ReadAuditLog));
        assert!(!engine.has_permission(Role::Resident, Permission::RunSafetyAnalysis));
    }

    #[test]
    fn test_clinical_roles_can_analyze() {
        let engine = PermissionEngine::standard();
        for role in [Role::CareStaff, Role::HealthProvider, Role::FacilityAdmin] {
            assert!(engine.has_permission(role, Permission::RunSafetyAnalysis));
            assert!(engine.has_permission(role, Permission::RunPhiDetection));
        }
        assert!(!engine.has_permission(Role::CareStaff, Permission::ManageSystemConfig));
    }

    #[test]
    fn test_system_admin_has_everything() {
        let engine = PermissionEngine::standard();
        assert_eq!(
            engine.role_permissions(Role::SystemAdmin).len(),
            Permission::ALL.len()
        );
    }

    #[test]
    fn test_deterministic_answers() {
        let a = PermissionEngine::standard();
        let b = PermissionEngine::standard();
        for role in Role::ALL {
            for permission in Permission::ALL {
                assert_eq!(
                    a.has_permission(role, permission),
                    b.has_permission(role, permission)
                );
            }
        }
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("care_staff".parse::<Role>().unwrap(), Role::CareStaff);
        assert!("janitor".parse::<Role>().is_err());
        assert!(Role::Resident.is_self_service());
        assert!(!Role::SystemAdmin.is_self_service());
    }
}
