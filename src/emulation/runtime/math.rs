//! `System.Math` method hooks.
//!
//! | Method | Description |
//! |--------|-------------|
//! | `Math.Min(a, b)` | Minimum of two values |
//! | `Math.Max(a, b)` | Maximum of two values |

use crate::emulation::{EmValue, Hook, HookContext, HookRegistry};
use crate::Result;

/// Registers all `System.Math` hooks.
pub fn register(registry: &mut HookRegistry) {
    registry.register(
        Hook::new("System.Math.Min")
            .match_name("System", "Math", "Min")
            .handler(system_math_min),
    );
    registry.register(
        Hook::new("System.Math.Max")
            .match_name("System", "Math", "Max")
            .handler(system_math_max),
    );
}

/// Hook for `System.Math.Min`.
///
/// # Handled Overloads
///
/// - `Math.Min(Int32, Int32) -> Int32`
/// - `Math.Min(Single, Single) -> Single`
/// - `Math.Min(Double, Double) -> Double`
fn system_math_min(ctx: &HookContext<'_>) -> Result<EmValue> {
    binary(ctx, i32::min, f32::min, f64::min)
}

/// Hook for `System.Math.Max`, same overloads as `Min`.
fn system_math_max(ctx: &HookContext<'_>) -> Result<EmValue> {
    binary(ctx, i32::max, f32::max, f64::max)
}

fn binary(
    ctx: &HookContext<'_>,
    int: fn(i32, i32) -> i32,
    single: fn(f32, f32) -> f32,
    double: fn(f64, f64) -> f64,
) -> Result<EmValue> {
    match ctx.args {
        [EmValue::I32(a), EmValue::I32(b)] => Ok(int(*a, *b).into()),
        [EmValue::F32(a), EmValue::F32(b)] => Ok(single(*a, *b).into()),
        [EmValue::F64(a), EmValue::F64(b)] => Ok(double(*a, *b).into()),
        args => Err(crate::Error::NotSupported(format!(
            "Math.{} with arguments ({})",
            ctx.method,
            args.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{SignatureMethod, TypeName, TypeSignature};

    fn call(method: &str, args: &[EmValue]) -> Result<EmValue> {
        let mut registry = HookRegistry::new();
        register(&mut registry);
        let math = TypeName::parse("System.Math");
        let signature = SignatureMethod::static_method(
            TypeSignature::I4,
            vec![TypeSignature::I4, TypeSignature::I4],
        );
        registry.find(&math, method).unwrap().invoke(&HookContext {
            declaring_type: &math,
            method,
            signature: &signature,
            this: None,
            args,
        })
    }

    #[test]
    fn test_min_hook() {
        assert_eq!(
            call("Min", &[EmValue::I32(2048), EmValue::I32(1536)]).unwrap(),
            EmValue::I32(1536)
        );
        assert_eq!(
            call("Min", &[EmValue::F32(1.5), EmValue::F32(0.5)]).unwrap(),
            EmValue::F32(0.5)
        );
    }

    #[test]
    fn test_max_hook() {
        assert_eq!(
            call("Max", &[EmValue::I32(3), EmValue::I32(7)]).unwrap(),
            EmValue::I32(7)
        );
    }

    #[test]
    fn test_mixed_arguments_rejected() {
        assert!(matches!(
            call("Min", &[EmValue::I32(3), EmValue::F32(7.0)]),
            Err(crate::Error::NotSupported(_))
        ));
    }
}
