use thiserror::Error;

use crate::metadata::method::InstrId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Why a module was turned away at the eligibility gate.
///
/// Both variants are skips, not failures: a calling tool can carry on with its own
/// pipeline when it sees one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IneligibleReason {
    /// The module is not the one this patch targets.
    WrongModule {
        /// The module name the patch is configured for
        expected: String,
    },
    /// The module already carries this patch's marker tag.
    AlreadyPatched {
        /// The marker tag that was found
        marker: String,
    },
}

impl std::fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IneligibleReason::WrongModule { expected } => {
                write!(f, "not the target module (expected '{expected}')")
            }
            IneligibleReason::AlreadyPatched { marker } => {
                write!(f, "already patched (marker '{marker}' present)")
            }
        }
    }
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Eligibility
/// - [`Error::ModuleNotEligible`] - Wrong target or already patched. This is a skip, see
///   [`Error::is_skip`].
///
/// ## Resolution Errors
/// - [`Error::MethodNotFound`] - Target method or external member is missing
/// - [`Error::UnresolvedType`] - A type descriptor is unknown to the module's type universe
/// - [`Error::LocalNotFound`] - The target method lacks the locals the patch rewrites
///
/// ## Shape Errors
/// - [`Error::AnchorNotFound`] - The target method no longer has the expected instruction shape
/// - [`Error::InvalidAnchor`] - An instruction handle does not belong to the body being modified
/// - [`Error::StackUnderflow`] / [`Error::StackMismatch`] - The body violates stack balance
///
/// ## Miscellaneous
/// - [`Error::Malformed`] - Structurally broken input (e.g. unresolved assembler labels)
/// - [`Error::InvalidConfig`] - Rejected [`crate::patch::PatchConfig`]
/// - [`Error::NotSupported`] - Operation outside what the evaluator can execute
///
/// None of these are retried by the library. The expected remediation for shape errors is human
/// inspection of the target program, whose compiled form has changed.
///
/// # Examples
///
/// ```rust,no_run
/// use cilpatch::{Error, patch::{PatchConfig, TextureResolutionPatch}};
/// # fn modules() -> (cilpatch::metadata::Module, cilpatch::metadata::Module) { unimplemented!() }
///
/// let (mut game, engine) = modules();
/// let patch = TextureResolutionPatch::new(PatchConfig::default())?;
/// match patch.patch(&mut game, &engine) {
///     Ok(report) => println!("patched, ratio local {}", report.ratio_local),
///     Err(e) if e.is_skip() => println!("skipped: {e}"),
///     Err(Error::AnchorNotFound(anchor)) => eprintln!("target shape changed: {anchor}"),
///     Err(e) => eprintln!("patch failed: {e}"),
/// }
/// # Ok::<(), cilpatch::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The module is not eligible for patching.
    ///
    /// Raised at the first gate, before anything is mutated, when the module name does not
    /// match the configured target or the module already carries the patch marker.
    #[error("Module '{module}' is not eligible - {reason}")]
    ModuleNotEligible {
        /// Display name of the inspected module
        module: String,
        /// Why the module was turned away
        reason: IneligibleReason,
    },

    /// A method could not be found.
    ///
    /// Covers both the patch target inside the module and the externally defined members
    /// looked up in the dependency module.
    #[error("Method '{method}' not found on type '{type_name}'")]
    MethodNotFound {
        /// Full name of the type that was searched
        type_name: String,
        /// Name of the missing method
        method: String,
    },

    /// An anchor pattern matched no instruction.
    ///
    /// The target method's shape no longer matches the patch's expectations. Not retryable.
    #[error("Anchor not found - {0}")]
    AnchorNotFound(String),

    /// A type descriptor could not be resolved against the module's type universe.
    #[error("Unresolved type - {0}")]
    UnresolvedType(String),

    /// The given instruction handle does not belong to the body being modified.
    #[error("Instruction {0} does not belong to this method body")]
    InvalidAnchor(InstrId),

    /// A local variable the patch needs is missing from the target method.
    #[error("Local variable not found - {0}")]
    LocalNotFound(String),

    /// The evaluation stack would underflow at the given position.
    #[error("Stack underflow at instruction #{position}: needs {needed}, has {available}")]
    StackUnderflow {
        /// Position of the instruction in body order
        position: usize,
        /// Number of slots the instruction pops
        needed: usize,
        /// Number of slots on the stack at that point
        available: usize,
    },

    /// Two control-flow paths reach an instruction with different stack depths.
    #[error("Stack mismatch at instruction #{position}: expected {expected}, found {found}")]
    StackMismatch {
        /// Position of the instruction in body order
        position: usize,
        /// Depth recorded by the first path
        expected: usize,
        /// Depth reached by the conflicting path
        found: usize,
    },

    /// The input is structurally broken.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The patch configuration was rejected.
    #[error("Invalid configuration - {0}")]
    InvalidConfig(String),

    /// The requested operation is not supported.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Returns `true` if this error is a skip rather than a failure.
    ///
    /// Only [`Error::ModuleNotEligible`] is a skip.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::ModuleNotEligible { .. })
    }

    /// Returns `true` if this error means the target method's compiled shape changed.
    #[must_use]
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(
            self,
            Error::AnchorNotFound(_) | Error::LocalNotFound(_) | Error::MethodNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_is_distinct_from_failure() {
        let skip = Error::ModuleNotEligible {
            module: "Assembly-CSharp".to_string(),
            reason: IneligibleReason::AlreadyPatched {
                marker: "TOKEN".to_string(),
            },
        };
        assert!(skip.is_skip());
        assert!(!skip.is_shape_mismatch());

        let failure = Error::AnchorNotFound("push".to_string());
        assert!(!failure.is_skip());
        assert!(failure.is_shape_mismatch());
    }

    #[test]
    fn test_malformed_macro() {
        let err = malformed_error!("label '{}' is undefined", "end");
        match err {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "label 'end' is undefined");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("expected Malformed"),
        }
    }

    #[test]
    fn test_display() {
        let err = Error::ModuleNotEligible {
            module: "Other".to_string(),
            reason: IneligibleReason::WrongModule {
                expected: "Assembly-CSharp".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "Module 'Other' is not eligible - not the target module (expected 'Assembly-CSharp')"
        );
    }
}
