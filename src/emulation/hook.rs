//! Native behavior for external method calls.
//!
//! The evaluator never executes callee bodies. Every `call`, `callvirt` and `newobj` is
//! dispatched to a [`Hook`] registered for the callee's declaring type and name; a call without
//! a matching hook fails with [`crate::Error::NotSupported`].
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::emulation::{EmValue, Hook, HookRegistry};
//!
//! let mut registry = HookRegistry::new();
//! registry.register(
//!     Hook::new("System.Math.Abs")
//!         .match_name("System", "Math", "Abs")
//!         .handler(|ctx| match ctx.args.first() {
//!             Some(EmValue::I32(value)) => Ok(EmValue::I32(value.abs())),
//!             _ => Ok(EmValue::Void),
//!         }),
//! );
//! assert_eq!(registry.len(), 1);
//! ```

use crate::{
    emulation::EmValue,
    metadata::{SignatureMethod, TypeName},
    Result,
};

/// Call site information passed to a hook handler.
pub struct HookContext<'a> {
    /// Type declaring the callee
    pub declaring_type: &'a TypeName,
    /// Callee name
    pub method: &'a str,
    /// Callee signature
    pub signature: &'a SignatureMethod,
    /// The `this` value of an instance call, `None` for static calls and `newobj`
    pub this: Option<&'a EmValue>,
    /// Arguments in declaration order
    pub args: &'a [EmValue],
}

/// Handler invoked in place of a callee.
///
/// Returns the call's result, [`EmValue::Void`] for void methods. For constructors invoked
/// through `call` on an address, the returned value is stored at that address.
pub type HookFn = Box<dyn Fn(&HookContext<'_>) -> Result<EmValue>>;

/// A named interception of one external method.
pub struct Hook {
    name: String,
    namespace: Option<String>,
    type_name: Option<String>,
    method: Option<String>,
    handler: Option<HookFn>,
}

impl Hook {
    /// Creates a new hook with the given name. A hook with no matchers never matches.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Hook {
            name: name.into(),
            namespace: None,
            type_name: None,
            method: None,
            handler: None,
        }
    }

    /// Matches by namespace, type name and method name.
    #[must_use]
    pub fn match_name(mut self, namespace: &str, type_name: &str, method: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self.type_name = Some(type_name.to_string());
        self.method = Some(method.to_string());
        self
    }

    /// Matches by declaring type and method name.
    #[must_use]
    pub fn match_member(self, declaring_type: &TypeName, method: &str) -> Self {
        self.match_name(&declaring_type.namespace, &declaring_type.name, method)
    }

    /// Sets the handler.
    #[must_use]
    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Result<EmValue> + 'static,
    {
        self.handler = Some(Box::new(f));
        self
    }

    /// Descriptive name of the hook.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if this hook intercepts the given callee.
    #[must_use]
    pub fn matches(&self, declaring_type: &TypeName, method: &str) -> bool {
        let Some(expected) = self.method.as_deref() else {
            return false;
        };
        expected == method
            && self
                .namespace
                .as_deref()
                .map_or(true, |ns| ns == declaring_type.namespace)
            && self
                .type_name
                .as_deref()
                .map_or(true, |name| name == declaring_type.name)
    }

    /// Runs the handler. A hook without a handler returns [`EmValue::Void`].
    ///
    /// # Errors
    ///
    /// Propagates errors from the handler.
    pub fn invoke(&self, ctx: &HookContext<'_>) -> Result<EmValue> {
        match &self.handler {
            Some(handler) => handler(ctx),
            None => Ok(EmValue::Void),
        }
    }
}

/// Ordered collection of hooks. The first registered hook that matches a callee wins.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Hook>,
}

impl HookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook.
    pub fn register(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }

    /// Finds the hook for a callee.
    #[must_use]
    pub fn find(&self, declaring_type: &TypeName, method: &str) -> Option<&Hook> {
        self.hooks
            .iter()
            .find(|hook| hook.matches(declaring_type, method))
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
