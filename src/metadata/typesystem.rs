//! Type names, signatures and type definitions of the in-memory module model.
//!
//! The model keeps only what a patch pass needs to reason about: the identity of a type
//! (namespace + name), the shape of method signatures (which drives call stack effects), and
//! the methods a type owns.
//!
//! # Key Types
//! - [`TypeName`] - Namespace-qualified type identity
//! - [`TypeSignature`] - Type descriptor used by locals, parameters and return values
//! - [`SignatureMethod`] - Method signature with `this`, return type and parameters
//! - [`TypeDef`] - A type defined by a module, owning its methods

use std::fmt;

use crate::metadata::{method::MethodDef, token::Token};

/// Namespace-qualified identity of a type.
///
/// # Examples
///
/// ```rust
/// use cilpatch::metadata::TypeName;
///
/// let vector = TypeName::new("UnityEngine", "Vector3");
/// assert_eq!(vector.full_name(), "UnityEngine.Vector3");
///
/// let global = TypeName::parse("TBody");
/// assert_eq!(global.namespace, "");
/// assert_eq!(global.full_name(), "TBody");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName {
    /// Namespace, empty for types in the global namespace
    pub namespace: String,
    /// Simple type name
    pub name: String,
}

impl TypeName {
    /// Creates a new type name from namespace and simple name.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeName {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Splits a full name at its last `.` into namespace and name.
    #[must_use]
    pub fn parse(full_name: &str) -> Self {
        match full_name.rsplit_once('.') {
            Some((namespace, name)) => TypeName::new(namespace, name),
            None => TypeName::new("", full_name),
        }
    }

    /// Returns `Namespace.Name`, or just `Name` in the global namespace.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Type descriptor of a local, parameter or return value.
///
/// Primitive descriptors always resolve. [`TypeSignature::ValueType`] and
/// [`TypeSignature::Class`] name a type that must be known to the module (defined or imported)
/// before a local of that type can be added.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TypeSignature {
    /// void
    #[default]
    Void,
    /// bool
    Boolean,
    /// signed 32bit integer
    I4,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// System.String
    String,
    /// System.Object
    Object,
    /// CIL value-type
    ValueType(TypeName),
    /// CIL class
    Class(TypeName),
}

impl TypeSignature {
    /// Returns the named type, if this descriptor refers to one.
    #[must_use]
    pub fn type_name(&self) -> Option<&TypeName> {
        match self {
            TypeSignature::ValueType(name) | TypeSignature::Class(name) => Some(name),
            _ => None,
        }
    }

    /// Returns `true` for descriptors that resolve without a module lookup.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        self.type_name().is_none()
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Void => f.write_str("void"),
            TypeSignature::Boolean => f.write_str("bool"),
            TypeSignature::I4 => f.write_str("int32"),
            TypeSignature::R4 => f.write_str("float32"),
            TypeSignature::R8 => f.write_str("float64"),
            TypeSignature::String => f.write_str("string"),
            TypeSignature::Object => f.write_str("object"),
            TypeSignature::ValueType(name) => write!(f, "valuetype {name}"),
            TypeSignature::Class(name) => write!(f, "class {name}"),
        }
    }
}

/// Signature of a method: calling convention, return type and parameters.
///
/// The signature determines the stack effect of a call: `call`/`callvirt` pop one slot per
/// parameter plus one for `this`, and push one slot unless the return type is `void`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureMethod {
    /// Instance method taking an implicit `this`
    pub has_this: bool,
    /// Return type
    pub return_type: TypeSignature,
    /// Declared parameters
    pub params: Vec<TypeSignature>,
}

impl SignatureMethod {
    /// Signature of a static method.
    #[must_use]
    pub fn static_method(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: false,
            return_type,
            params,
        }
    }

    /// Signature of an instance method.
    #[must_use]
    pub fn instance(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: true,
            return_type,
            params,
        }
    }

    /// Returns `true` if calling this method leaves a value on the stack.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.return_type != TypeSignature::Void
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_this {
            f.write_str("instance ")?;
        }
        write!(f, "{} (", self.return_type)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

/// Whether a type is a reference type or a value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFlavor {
    /// Reference type
    Class,
    /// Value type (struct)
    ValueType,
}

/// A type defined by a module.
pub struct TypeDef {
    /// Token of this type in the owning module's `TypeDef` table
    pub token: Token,
    /// Namespace-qualified name
    pub name: TypeName,
    /// Reference or value type
    pub flavor: TypeFlavor,
    /// Methods owned by this type, in declaration order
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Creates an empty type definition. The token is assigned when the type is added to a
    /// [`crate::metadata::Module`].
    #[must_use]
    pub fn new(name: TypeName, flavor: TypeFlavor) -> Self {
        TypeDef {
            token: Token::new(0),
            name,
            flavor,
            methods: Vec::new(),
        }
    }

    /// Returns the descriptor a local or parameter of this type would use.
    #[must_use]
    pub fn signature(&self) -> TypeSignature {
        match self.flavor {
            TypeFlavor::Class => TypeSignature::Class(self.name.clone()),
            TypeFlavor::ValueType => TypeSignature::ValueType(self.name.clone()),
        }
    }

    /// Iterates over all methods with the given name, overloads included.
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDef> {
        self.methods.iter().filter(move |method| method.name == name)
    }

    /// Finds a method by name and exact signature.
    #[must_use]
    pub fn find_method(&self, name: &str, signature: &SignatureMethod) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|method| method.name == name && &method.signature == signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_name_parse() {
        let name = TypeName::parse("UnityEngine.RenderTexture");
        assert_eq!(name.namespace, "UnityEngine");
        assert_eq!(name.name, "RenderTexture");

        let nested = TypeName::parse("A.B.C");
        assert_eq!(nested.namespace, "A.B");
        assert_eq!(nested.name, "C");

        let global = TypeName::parse("TBody");
        assert!(global.namespace.is_empty());
        assert_eq!(global.to_string(), "TBody");
    }

    #[test]
    fn test_signature_display() {
        let vector = TypeSignature::ValueType(TypeName::new("UnityEngine", "Vector3"));
        let scale = SignatureMethod::static_method(vector.clone(), vec![vector.clone(), vector]);
        assert_eq!(
            scale.to_string(),
            "valuetype UnityEngine.Vector3 (valuetype UnityEngine.Vector3, valuetype UnityEngine.Vector3)"
        );

        let width = SignatureMethod::instance(TypeSignature::I4, vec![]);
        assert_eq!(width.to_string(), "instance int32 ()");
        assert!(width.returns_value());
    }

    #[test]
    fn test_primitive_descriptors() {
        assert!(TypeSignature::I4.is_primitive());
        assert!(TypeSignature::R4.is_primitive());
        assert!(!TypeSignature::Class(TypeName::parse("UnityEngine.RenderTexture")).is_primitive());
    }

    #[test]
    fn test_typedef_signature() {
        let def = TypeDef::new(TypeName::parse("UnityEngine.Vector3"), TypeFlavor::ValueType);
        assert_eq!(
            def.signature(),
            TypeSignature::ValueType(TypeName::parse("UnityEngine.Vector3"))
        );
    }

    #[test]
    fn test_find_method_by_signature() {
        use crate::metadata::method::MethodFlags;

        let vector = TypeSignature::ValueType(TypeName::parse("UnityEngine.Vector3"));
        let instance = SignatureMethod::instance(vector.clone(), vec![vector.clone()]);
        let fixed = SignatureMethod::static_method(vector.clone(), vec![vector.clone(), vector]);

        let mut def = TypeDef::new(TypeName::parse("UnityEngine.Vector3"), TypeFlavor::ValueType);
        def.methods = vec![
            MethodDef::new("Scale", MethodFlags::PUBLIC, instance),
            MethodDef::new("Scale", MethodFlags::PUBLIC | MethodFlags::STATIC, fixed.clone()),
        ];

        // the result outlives the looked-up name
        let found = {
            let name = String::from("Scale");
            def.find_method(&name, &fixed)
        };
        assert_eq!(found.map(|method| &method.signature), Some(&fixed));
        assert!(def.find_method("Normalize", &fixed).is_none());
        assert_eq!(def.methods_named("Scale").count(), 2);
    }
}
