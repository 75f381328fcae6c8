use std::fmt;

use crate::error::{DeskError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    Admin,
    Manager,
    Technician,
    Viewer,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Technician => "technician",
            Self::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ViewContracts,
    EditContracts,
    DeleteContracts,
    CompleteMaintenance,
    SendReminders,
    ImportData,
    ManageSchema,
}

impl Capability {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ViewContracts => "view_contracts",
            Self::EditContracts => "edit_contracts",
            Self::DeleteContracts => "delete_contracts",
            Self::CompleteMaintenance => "complete_maintenance",
            Self::SendReminders => "send_reminders",
            Self::ImportData => "import_data",
            Self::ManageSchema => "manage_schema",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn has_capability(role: Role, capability: Capability) -> bool {
    use Capability::*;

    match role {
        Role::Admin => true,
        Role::Manager => !matches!(capability, ManageSchema),
        Role::Technician => matches!(
            capability,
            ViewContracts | CompleteMaintenance | SendReminders
        ),
        Role::Viewer => matches!(capability, ViewContracts),
    }
}

/// Who is acting. Passed explicitly into every command handler.
#[derive(Debug, Clone)]
pub struct Operator {
    pub name: String,
    pub role: Role,
}

impl Operator {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    pub fn require(&self, capability: Capability) -> Result<()> {
        if has_capability(self.role, capability) {
            Ok(())
        } else {
            tracing::warn!(
                operator = %self.name,
                role = %self.role,
                capability = %capability,
                "capability denied"
            );
            Err(DeskError::Forbidden {
                role: self.role,
                capability,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Capability; 7] = [
        Capability::ViewContracts,
        Capability::EditContracts,
        Capability::DeleteContracts,
        Capability::CompleteMaintenance,
        Capability::SendReminders,
        Capability::ImportData,
        Capability::ManageSchema,
    ];

    fn granted(role: Role) -> Vec<Capability> {
        ALL
            .into_iter()
            .filter(|capability| has_capability(role, *capability))
            .collect()
    }

    #[test]
    fn admin_holds_every_capability() {
        assert_eq!(granted(Role::Admin), ALL.to_vec());
    }

    #[test]
    fn manager_cannot_manage_schema() {
        let caps = granted(Role::Manager);
        assert_eq!(caps.len(), ALL.len() - 1);
        assert!(!caps.contains(&Capability::ManageSchema));
    }

    #[test]
    fn technician_can_complete_but_not_edit() {
        assert_eq!(
            granted(Role::Technician),
            vec![
                Capability::ViewContracts,
                Capability::CompleteMaintenance,
                Capability::SendReminders,
            ]
        );
    }

    #[test]
    fn viewer_is_read_only() {
        assert_eq!(granted(Role::Viewer), vec![Capability::ViewContracts]);
    }

    #[test]
    fn require_reports_forbidden() {
        let operator = Operator::new("dana", Role::Viewer);
        assert!(operator.require(Capability::ViewContracts).is_ok());
        match operator.require(Capability::DeleteContracts) {
            Err(DeskError::Forbidden { role, capability }) => {
                assert_eq!(role, Role::Viewer);
                assert_eq!(capability, Capability::DeleteContracts);
            }
            other => panic!("expected forbidden, got {other:?}"),
        }
    }
}
