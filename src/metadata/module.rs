//! The in-memory module: types, imported references and patch markers.
//!
//! A [`Module`] is what the external loading service hands to the patch engine and what the
//! persistence service receives back. It owns its [`TypeDef`]s (and through them every method
//! body), the `TypeRef`/`MemberRef` tables of cross-module references, and the set of marker
//! tags recording which patches were already applied.
//!
//! # Type universe
//!
//! A named [`TypeSignature`] resolves against a module if the module defines that type or has
//! imported a reference to it. Primitive signatures always resolve. Code that adds locals or
//! operands referring to a dependency type must import the type first.
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::metadata::{MemberResolver, Module, SignatureMethod, TypeName, TypeSignature};
//!
//! let mut module = Module::new("Assembly-CSharp");
//! let vector = TypeName::parse("UnityEngine.Vector3");
//! assert!(!module.resolves_type(&TypeSignature::ValueType(vector.clone())));
//!
//! module.import_type(&vector);
//! assert!(module.resolves_type(&TypeSignature::ValueType(vector.clone())));
//!
//! let min = module.import_method(
//!     &TypeName::parse("System.Math"),
//!     "Min",
//!     &SignatureMethod::static_method(TypeSignature::I4, vec![TypeSignature::I4, TypeSignature::I4]),
//! );
//! assert_eq!(module.resolve_member(min).unwrap().name, "Min");
//! ```

use std::collections::BTreeSet;

use crate::metadata::{
    method::{MethodBody, MethodDef},
    token::Token,
    typesystem::{SignatureMethod, TypeDef, TypeName, TypeSignature},
};

/// A reference to a type defined in another module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeReference {
    /// Token in the `TypeRef` table
    pub token: Token,
    /// Name of the referenced type
    pub name: TypeName,
}

/// A reference to a method defined in another module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberReference {
    /// Token in the `MemberRef` table
    pub token: Token,
    /// Type declaring the member
    pub declaring_type: TypeName,
    /// Member name
    pub name: String,
    /// Member signature
    pub signature: SignatureMethod,
}

/// Resolved view of a method token, whether it names a definition or a reference.
#[derive(Debug, Clone, Copy)]
pub struct MemberInfo<'a> {
    /// The resolved token
    pub token: Token,
    /// Type declaring the member
    pub declaring_type: &'a TypeName,
    /// Member name
    pub name: &'a str,
    /// Member signature
    pub signature: &'a SignatureMethod,
}

/// Resolves method tokens found in instruction operands.
///
/// Implemented by [`Module`]; the matcher, the stack analyzer and the evaluator only need this
/// narrow view, which keeps them usable while a method body is borrowed mutably.
pub trait MemberResolver {
    /// Resolves a `MethodDef` or `MemberRef` token.
    fn resolve_member(&self, token: Token) -> Option<MemberInfo<'_>>;
}

/// The in-memory representation of a compiled program unit.
pub struct Module {
    name: String,
    types: Vec<TypeDef>,
    type_refs: Vec<TypeReference>,
    member_refs: Vec<MemberReference>,
    markers: BTreeSet<String>,
    next_method_row: u32,
}

impl Module {
    /// Creates an empty module with the given display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            types: Vec::new(),
            type_refs: Vec::new(),
            member_refs: Vec::new(),
            markers: BTreeSet::new(),
            next_method_row: 1,
        }
    }

    /// Display name of the module (assembly name, without extension).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a type definition, assigning tokens to it and its methods.
    pub fn add_type(&mut self, mut typedef: TypeDef) -> Token {
        // Table rows are 24 bits wide; a module model never approaches that
        #[allow(clippy::cast_possible_truncation)]
        let token = Token::from_parts(Token::TYPE_DEF, self.types.len() as u32 + 1);
        typedef.token = token;
        for method in &mut typedef.methods {
            method.token = Token::from_parts(Token::METHOD_DEF, self.next_method_row);
            self.next_method_row += 1;
        }
        self.types.push(typedef);
        token
    }

    /// All type definitions.
    #[must_use]
    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }

    /// Finds a type definition by full name.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<&TypeDef> {
        self.types
            .iter()
            .find(|typedef| typedef.name.full_name() == full_name)
    }

    /// Finds a method definition by token.
    #[must_use]
    pub fn method(&self, token: Token) -> Option<&MethodDef> {
        self.types
            .iter()
            .flat_map(|typedef| typedef.methods.iter())
            .find(|method| method.token == token)
    }

    /// Finds a method definition by token, mutably.
    pub fn method_mut(&mut self, token: Token) -> Option<&mut MethodDef> {
        self.types
            .iter_mut()
            .flat_map(|typedef| typedef.methods.iter_mut())
            .find(|method| method.token == token)
    }

    /// Runs `f` with the body of `method` borrowed mutably and the rest of the module borrowed
    /// immutably.
    ///
    /// The body is detached for the duration of the call, so lookups through `&Module` inside
    /// `f` see the method without a body. Returns `None` if the method does not exist or has no
    /// body.
    pub fn with_body_mut<R>(
        &mut self,
        method: Token,
        f: impl FnOnce(&Module, &mut MethodBody) -> R,
    ) -> Option<R> {
        let mut body = self.method_mut(method)?.body.take()?;
        let result = f(&*self, &mut body);
        if let Some(def) = self.method_mut(method) {
            def.body = Some(body);
        }
        Some(result)
    }

    /// The `TypeRef` table.
    #[must_use]
    pub fn type_refs(&self) -> &[TypeReference] {
        &self.type_refs
    }

    /// The `MemberRef` table.
    #[must_use]
    pub fn member_refs(&self) -> &[MemberReference] {
        &self.member_refs
    }

    /// Makes a type known to this module and returns the token to refer to it.
    ///
    /// Types defined by this module resolve to their `TypeDef` token. Other types get a
    /// `TypeRef` row, created once per name.
    pub fn import_type(&mut self, name: &TypeName) -> Token {
        if let Some(typedef) = self.types.iter().find(|typedef| &typedef.name == name) {
            return typedef.token;
        }
        if let Some(existing) = self.type_refs.iter().find(|tr| &tr.name == name) {
            return existing.token;
        }

        #[allow(clippy::cast_possible_truncation)]
        let token = Token::from_parts(Token::TYPE_REF, self.type_refs.len() as u32 + 1);
        self.type_refs.push(TypeReference {
            token,
            name: name.clone(),
        });
        token
    }

    /// Makes a method known to this module and returns the token to call it with.
    ///
    /// The declaring type and every named type of the signature are imported as well. A method
    /// of this module resolves to its `MethodDef` token; other methods get a `MemberRef` row,
    /// created once per declaring type, name and signature.
    pub fn import_method(
        &mut self,
        declaring_type: &TypeName,
        name: &str,
        signature: &SignatureMethod,
    ) -> Token {
        if let Some(local) = self
            .types
            .iter()
            .filter(|typedef| &typedef.name == declaring_type)
            .find_map(|typedef| typedef.find_method(name, signature))
        {
            return local.token;
        }

        self.import_type(declaring_type);
        for named in std::iter::once(&signature.return_type)
            .chain(signature.params.iter())
            .filter_map(TypeSignature::type_name)
        {
            self.import_type(named);
        }

        if let Some(existing) = self.member_refs.iter().find(|mr| {
            &mr.declaring_type == declaring_type && mr.name == name && &mr.signature == signature
        }) {
            return existing.token;
        }

        #[allow(clippy::cast_possible_truncation)]
        let token = Token::from_parts(Token::MEMBER_REF, self.member_refs.len() as u32 + 1);
        self.member_refs.push(MemberReference {
            token,
            declaring_type: declaring_type.clone(),
            name: name.to_string(),
            signature: signature.clone(),
        });
        token
    }

    /// Returns `true` if the type descriptor resolves against this module's type universe.
    #[must_use]
    pub fn resolves_type(&self, signature: &TypeSignature) -> bool {
        match signature.type_name() {
            None => true,
            Some(name) => {
                self.types.iter().any(|typedef| &typedef.name == name)
                    || self.type_refs.iter().any(|tr| &tr.name == name)
            }
        }
    }

    /// Marker tags of patches applied to this module.
    #[must_use]
    pub fn markers(&self) -> &BTreeSet<String> {
        &self.markers
    }

    /// Returns `true` if the module carries the given marker tag.
    #[must_use]
    pub fn has_marker(&self, tag: &str) -> bool {
        self.markers.contains(tag)
    }

    /// Adds a marker tag. Returns `false` if the tag was already present.
    pub fn add_marker(&mut self, tag: impl Into<String>) -> bool {
        self.markers.insert(tag.into())
    }
}

impl MemberResolver for Module {
    fn resolve_member(&self, token: Token) -> Option<MemberInfo<'_>> {
        match token.table() {
            Token::METHOD_DEF => self.types.iter().find_map(|typedef| {
                typedef
                    .methods
                    .iter()
                    .find(|method| method.token == token)
                    .map(|method| MemberInfo {
                        token,
                        declaring_type: &typedef.name,
                        name: &method.name,
                        signature: &method.signature,
                    })
            }),
            Token::MEMBER_REF => {
                let row = token.row() as usize;
                self.member_refs
                    .get(row.checked_sub(1)?)
                    .map(|member| MemberInfo {
                        token,
                        declaring_type: &member.declaring_type,
                        name: &member.name,
                        signature: &member.signature,
                    })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{method::MethodFlags, typesystem::TypeFlavor};

    fn vector() -> TypeName {
        TypeName::parse("UnityEngine.Vector3")
    }

    #[test]
    fn test_add_type_assigns_tokens() {
        let mut module = Module::new("Assembly-CSharp");
        let mut body_type = TypeDef::new(TypeName::parse("TBody"), TypeFlavor::Class);
        body_type.methods.push(MethodDef::new(
            "MulTexProc",
            MethodFlags::PUBLIC,
            SignatureMethod::instance(TypeSignature::Void, vec![]),
        ));
        body_type.methods.push(MethodDef::new(
            "MulTexProc",
            MethodFlags::PUBLIC,
            SignatureMethod::instance(TypeSignature::Void, vec![TypeSignature::String]),
        ));

        let token = module.add_type(body_type);
        assert_eq!(token, Token(0x02000001));

        let typedef = module.find_type("TBody").unwrap();
        assert_eq!(typedef.methods[0].token, Token(0x06000001));
        assert_eq!(typedef.methods[1].token, Token(0x06000002));
        assert_eq!(
            module.resolve_member(Token(0x06000002)).unwrap().declaring_type,
            &TypeName::parse("TBody")
        );
    }

    #[test]
    fn test_import_is_idempotent() {
        let mut module = Module::new("Assembly-CSharp");
        let scale = SignatureMethod::static_method(
            TypeSignature::ValueType(vector()),
            vec![TypeSignature::ValueType(vector()), TypeSignature::ValueType(vector())],
        );

        let first = module.import_method(&vector(), "Scale", &scale);
        let second = module.import_method(&vector(), "Scale", &scale);
        assert_eq!(first, second);
        assert_eq!(module.member_refs().len(), 1);
        assert_eq!(module.type_refs().len(), 1);
        assert_eq!(first.table(), Token::MEMBER_REF);
    }

    #[test]
    fn test_import_own_type_uses_typedef() {
        let mut module = Module::new("Assembly-CSharp");
        let token = module.add_type(TypeDef::new(TypeName::parse("TBody"), TypeFlavor::Class));
        assert_eq!(module.import_type(&TypeName::parse("TBody")), token);
        assert!(module.type_refs().is_empty());
    }

    #[test]
    fn test_resolves_type() {
        let mut module = Module::new("Assembly-CSharp");
        assert!(module.resolves_type(&TypeSignature::R4));
        assert!(!module.resolves_type(&TypeSignature::ValueType(vector())));
        module.import_type(&vector());
        assert!(module.resolves_type(&TypeSignature::ValueType(vector())));
    }

    #[test]
    fn test_markers() {
        let mut module = Module::new("Assembly-CSharp");
        assert!(!module.has_marker("CM3D2_TEXTURERESOLUTION"));
        assert!(module.add_marker("CM3D2_TEXTURERESOLUTION"));
        assert!(!module.add_marker("CM3D2_TEXTURERESOLUTION"));
        assert!(module.has_marker("CM3D2_TEXTURERESOLUTION"));
        assert_eq!(module.markers().len(), 1);
    }

    #[test]
    fn test_resolve_unknown_member() {
        let module = Module::new("Assembly-CSharp");
        assert!(module.resolve_member(Token(0x0A000001)).is_none());
        assert!(module.resolve_member(Token(0x0A000000)).is_none());
        assert!(module.resolve_member(Token(0x02000001)).is_none());
    }

    #[test]
    fn test_with_body_mut_restores_body() {
        let mut module = Module::new("Assembly-CSharp");
        let mut body_type = TypeDef::new(TypeName::parse("TBody"), TypeFlavor::Class);
        body_type.methods.push(
            MethodDef::new(
                "MulTexProc",
                MethodFlags::PUBLIC,
                SignatureMethod::instance(TypeSignature::Void, vec![TypeSignature::I4]),
            )
            .with_body(MethodBody::new()),
        );
        module.add_type(body_type);
        let token = Token(0x06000001);

        let locals = module
            .with_body_mut(token, |module, body| {
                assert!(module.method(token).unwrap().body.is_none());
                body.add_local(TypeSignature::I4).unwrap();
                body.locals().len()
            })
            .unwrap();

        assert_eq!(locals, 1);
        assert_eq!(
            module.method(token).unwrap().body.as_ref().unwrap().locals().len(),
            1
        );
    }
}
