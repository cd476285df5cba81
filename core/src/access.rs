//! Role-based access control
//!
//! Each ledger is managed by two roles: the functional manager tunes
//! governance parameters, the migration manager controls activation and
//! balance migration. The admin performs one-time initialization steps.
//! Restricted notification entry points are additionally bound to a single
//! designated caller address, checked with [`AccessControl::only_designated`].

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::interfaces::Address;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessControl {
    pub functional_manager: Address,
    pub migration_manager: Address,
    pub admin: Address,
}

impl AccessControl {
    pub fn new(functional_manager: &str, migration_manager: &str, admin: &str) -> Self {
        Self {
            functional_manager: functional_manager.to_string(),
            migration_manager: migration_manager.to_string(),
            admin: admin.to_string(),
        }
    }

    pub fn only_functional_manager(&self, caller: &str) -> Result<()> {
        Self::only_designated(caller, &self.functional_manager, "functional manager")
    }

    pub fn only_migration_manager(&self, caller: &str) -> Result<()> {
        Self::only_designated(caller, &self.migration_manager, "migration manager")
    }

    pub fn only_admin(&self, caller: &str) -> Result<()> {
        Self::only_designated(caller, &self.admin, "admin")
    }

    /// Guard an entry point bound to one designated caller address.
    pub fn only_designated(caller: &str, expected: &str, role: &'static str) -> Result<()> {
        if caller != expected || expected.is_empty() {
            return Err(CoreError::Unauthorized {
                caller: caller.to_string(),
                role,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_guards() {
        let access = AccessControl::new("fm", "mm", "adm");

        assert!(access.only_functional_manager("fm").is_ok());
        assert!(access.only_migration_manager("mm").is_ok());
        assert!(access.only_admin("adm").is_ok());

        let err = access.only_functional_manager("mm").unwrap_err();
        assert_eq!(
            err,
            CoreError::Unauthorized {
                caller: "mm".to_string(),
                role: "functional manager"
            }
        );
    }

    #[test]
    fn test_unset_role_rejects_everyone() {
        let access = AccessControl::default();
        assert!(access.only_admin("").is_err());
        assert!(access.only_admin("anyone").is_err());
    }

    #[test]
    fn test_designated_caller() {
        assert!(AccessControl::only_designated("staking", "staking", "staking contract").is_ok());
        assert!(AccessControl::only_designated("other", "staking", "staking contract").is_err());
    }
}
