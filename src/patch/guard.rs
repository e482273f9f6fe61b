//! Patch-once protection through module marker tags.
//!
//! A patched module carries the patch's marker tag. The guard refuses modules that already carry
//! it and modules other than the configured target. Both refusals are skips, reported as
//! [`Error::ModuleNotEligible`], never as failures.
//!
//! Writing the marker is the persistence collaborator's job once the patched module is saved;
//! [`IdempotencyGuard::mark_patched`] is what it calls.

use log::info;

use crate::{metadata::Module, Error, IneligibleReason, Result};

/// Checks module identity and the patch marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyGuard {
    module_name: String,
    marker: String,
}

impl IdempotencyGuard {
    /// Creates a guard for the module named `module_name`, using `marker` as the patch tag.
    #[must_use]
    pub fn new(module_name: impl Into<String>, marker: impl Into<String>) -> Self {
        IdempotencyGuard {
            module_name: module_name.into(),
            marker: marker.into(),
        }
    }

    /// The marker tag.
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Returns `true` iff the module carries the marker tag.
    #[must_use]
    pub fn is_already_patched(&self, module: &Module) -> bool {
        module.has_marker(&self.marker)
    }

    /// Returns why `module` must not be patched, if it must not.
    #[must_use]
    pub fn ineligibility(&self, module: &Module) -> Option<IneligibleReason> {
        if module.name() != self.module_name {
            Some(IneligibleReason::WrongModule {
                expected: self.module_name.clone(),
            })
        } else if self.is_already_patched(module) {
            Some(IneligibleReason::AlreadyPatched {
                marker: self.marker.clone(),
            })
        } else {
            None
        }
    }

    /// Checks that `module` is the target and not yet patched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleNotEligible`] otherwise.
    pub fn check_eligibility(&self, module: &Module) -> Result<()> {
        match self.ineligibility(module) {
            None => Ok(()),
            Some(reason) => Err(Error::ModuleNotEligible {
                module: module.name().to_string(),
                reason,
            }),
        }
    }

    /// Writes the marker tag. Returns `false` if it was already present.
    pub fn mark_patched(&self, module: &mut Module) -> bool {
        let added = module.add_marker(self.marker.clone());
        if added {
            info!("Marked module '{}' with '{}'", module.name(), self.marker);
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_module() {
        let guard = IdempotencyGuard::new("Assembly-CSharp", "TOKEN");
        let module = Module::new("UnityEngine");
        assert_eq!(
            guard.ineligibility(&module),
            Some(IneligibleReason::WrongModule {
                expected: "Assembly-CSharp".to_string()
            })
        );
        assert!(guard.check_eligibility(&module).unwrap_err().is_skip());
    }

    #[test]
    fn test_marker_roundtrip() {
        let guard = IdempotencyGuard::new("Assembly-CSharp", "TOKEN");
        let mut module = Module::new("Assembly-CSharp");
        assert!(!guard.is_already_patched(&module));
        assert!(guard.check_eligibility(&module).is_ok());

        assert!(guard.mark_patched(&mut module));
        assert!(!guard.mark_patched(&mut module));
        assert!(guard.is_already_patched(&module));
        assert!(matches!(
            guard.check_eligibility(&module),
            Err(Error::ModuleNotEligible {
                reason: IneligibleReason::AlreadyPatched { .. },
                ..
            })
        ));
    }
}
