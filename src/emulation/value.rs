//! Runtime value representation for the evaluator.

use std::fmt;

use crate::metadata::{method::LocalId, TypeName};

/// Runtime value on the evaluation stack or in a local slot.
///
/// # CIL Type Mapping
///
/// | CIL Type | EmValue Variant |
/// |----------|-----------------|
/// | `bool`, `int8`, `int16`, `int32` | [`EmValue::I32`] |
/// | `float32` | [`EmValue::F32`] |
/// | `float64` | [`EmValue::F64`] |
/// | Object reference | [`EmValue::ObjectRef`] |
/// | `null` | [`EmValue::Null`] |
/// | Address of a local (`ldloca`) | [`EmValue::ManagedPtr`] |
/// | Value type (struct) | [`EmValue::ValueType`] |
#[derive(Clone, Debug, PartialEq)]
pub enum EmValue {
    /// No value (void return, uninitialized local).
    Void,

    /// 32-bit signed integer.
    I32(i32),

    /// 32-bit floating point.
    F32(f32),

    /// 64-bit floating point.
    F64(f64),

    /// Opaque handle of a heap object supplied by a hook.
    ObjectRef(u32),

    /// Null reference.
    Null,

    /// Address of a local slot of the running method.
    ManagedPtr(LocalId),

    /// Value type (struct) stored inline.
    ValueType {
        /// Type of the value.
        type_name: TypeName,
        /// Field values in declaration order.
        fields: Vec<EmValue>,
    },
}

impl EmValue {
    /// Builds a three-component float vector of the given type.
    #[must_use]
    pub fn vector3(type_name: TypeName, x: f32, y: f32, z: f32) -> Self {
        EmValue::ValueType {
            type_name,
            fields: vec![EmValue::F32(x), EmValue::F32(y), EmValue::F32(z)],
        }
    }

    /// Components of a three-component float vector.
    #[must_use]
    pub fn as_vector3(&self) -> Option<[f32; 3]> {
        match self {
            EmValue::ValueType { fields, .. } => match fields.as_slice() {
                [EmValue::F32(x), EmValue::F32(y), EmValue::F32(z)] => Some([*x, *y, *z]),
                _ => None,
            },
            _ => None,
        }
    }

    /// The integer value, if this is an [`EmValue::I32`].
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            EmValue::I32(value) => Some(*value),
            _ => None,
        }
    }

    /// The float value, if this is an [`EmValue::F32`].
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            EmValue::F32(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns `true` for [`EmValue::Void`].
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, EmValue::Void)
    }
}

impl From<i32> for EmValue {
    fn from(value: i32) -> Self {
        EmValue::I32(value)
    }
}

impl From<f32> for EmValue {
    fn from(value: f32) -> Self {
        EmValue::F32(value)
    }
}

impl From<f64> for EmValue {
    fn from(value: f64) -> Self {
        EmValue::F64(value)
    }
}

impl From<bool> for EmValue {
    fn from(value: bool) -> Self {
        EmValue::I32(i32::from(value))
    }
}

impl fmt::Display for EmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmValue::Void => write!(f, "void"),
            EmValue::I32(value) => write!(f, "{value}"),
            EmValue::F32(value) => write!(f, "{value:?}f"),
            EmValue::F64(value) => write!(f, "{value:?}d"),
            EmValue::ObjectRef(handle) => write!(f, "obj#{handle}"),
            EmValue::Null => write!(f, "null"),
            EmValue::ManagedPtr(local) => write!(f, "&{local}"),
            EmValue::ValueType { type_name, fields } => {
                let parts: Vec<String> = fields.iter().map(ToString::to_string).collect();
                write!(f, "{type_name}({})", parts.join(", "))
            }
        }
    }
}
