//! Statically declared external members the patch calls.
//!
//! Every method the synthesized code invokes is listed here with its exact signature. The
//! declaration is resolved once per pass: dependency members against the read-only engine
//! module, core library members by their declared signature. Only when every member resolved
//! are they imported into the target module, so a failed resolution leaves the target module
//! untouched.

use std::fmt;

use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::{
    metadata::{token::Token, Module, SignatureMethod, TypeName, TypeSignature},
    patch::PatchConfig,
    Error, Result,
};

/// Identifies one external member of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumIter)]
pub enum MemberKey {
    /// `RenderTexture.get_active()`
    GetActive,
    /// `RenderTexture.set_active(RenderTexture)`
    SetActive,
    /// `RenderTexture.get_width()`
    GetWidth,
    /// `RenderTexture.get_height()`
    GetHeight,
    /// `Vector3..ctor(float32, float32, float32)`
    VectorCtor,
    /// `Vector3.Scale(Vector3, Vector3)`
    VectorScale,
    /// `System.Math.Min(int32, int32)`
    MathMin,
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

/// Where an external member is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberSource {
    /// The dependency (engine) module handed to the pass
    Dependency,
    /// The core library, always present at runtime
    CoreLibrary,
}

/// Declaration of one externally defined method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalMember {
    /// Registry key
    pub key: MemberKey,
    /// Defining module
    pub source: MemberSource,
    /// Declaring type
    pub declaring_type: TypeName,
    /// Method name
    pub name: String,
    /// Exact signature
    pub signature: SignatureMethod,
}

impl ExternalMember {
    fn new(
        key: MemberKey,
        source: MemberSource,
        declaring_type: &TypeName,
        name: &str,
        signature: SignatureMethod,
    ) -> Self {
        ExternalMember {
            key,
            source,
            declaring_type: declaring_type.clone(),
            name: name.to_string(),
            signature,
        }
    }
}

impl fmt::Display for ExternalMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.signature, self.declaring_type, self.name)
    }
}

/// The external members declared for a configuration.
#[derive(Debug, Clone)]
pub struct MemberRegistry {
    vector: TypeName,
    members: Vec<ExternalMember>,
}

impl MemberRegistry {
    /// Declares the members used by the texture resolution patch.
    #[must_use]
    pub fn declare(config: &PatchConfig) -> Self {
        let render_texture = &config.render_texture;
        let vector = &config.vector;
        let rt = TypeSignature::Class(render_texture.clone());
        let vec3 = TypeSignature::ValueType(vector.clone());
        let math = TypeName::new("System", "Math");

        let members = MemberKey::iter()
            .map(|key| {
                use MemberSource::{CoreLibrary, Dependency};
                match key {
                    MemberKey::GetActive => ExternalMember::new(
                        key,
                        Dependency,
                        render_texture,
                        "get_active",
                        SignatureMethod::static_method(rt.clone(), vec![]),
                    ),
                    MemberKey::SetActive => ExternalMember::new(
                        key,
                        Dependency,
                        render_texture,
                        "set_active",
                        SignatureMethod::static_method(TypeSignature::Void, vec![rt.clone()]),
                    ),
                    MemberKey::GetWidth => ExternalMember::new(
                        key,
                        Dependency,
                        render_texture,
                        "get_width",
                        SignatureMethod::instance(TypeSignature::I4, vec![]),
                    ),
                    MemberKey::GetHeight => ExternalMember::new(
                        key,
                        Dependency,
                        render_texture,
                        "get_height",
                        SignatureMethod::instance(TypeSignature::I4, vec![]),
                    ),
                    MemberKey::VectorCtor => ExternalMember::new(
                        key,
                        Dependency,
                        vector,
                        ".ctor",
                        SignatureMethod::instance(
                            TypeSignature::Void,
                            vec![TypeSignature::R4, TypeSignature::R4, TypeSignature::R4],
                        ),
                    ),
                    MemberKey::VectorScale => ExternalMember::new(
                        key,
                        Dependency,
                        vector,
                        "Scale",
                        SignatureMethod::static_method(vec3.clone(), vec![vec3.clone(), vec3.clone()]),
                    ),
                    MemberKey::MathMin => ExternalMember::new(
                        key,
                        CoreLibrary,
                        &math,
                        "Min",
                        SignatureMethod::static_method(
                            TypeSignature::I4,
                            vec![TypeSignature::I4, TypeSignature::I4],
                        ),
                    ),
                }
            })
            .collect();

        MemberRegistry {
            vector: vector.clone(),
            members,
        }
    }

    /// All declared members, in [`MemberKey`] order.
    #[must_use]
    pub fn members(&self) -> &[ExternalMember] {
        &self.members
    }

    /// The declaration for `key`.
    #[must_use]
    pub fn get(&self, key: MemberKey) -> Option<&ExternalMember> {
        self.members.iter().find(|member| member.key == key)
    }

    /// Checks every dependency member against `dependency` without touching the target module.
    ///
    /// Returns the descriptor of the vector type as the dependency defines it.
    ///
    /// # Errors
    ///
    /// - [`Error::UnresolvedType`] if a declaring type is missing from the dependency
    /// - [`Error::MethodNotFound`] if a method with the declared name and signature is missing
    pub fn verify(&self, dependency: &Module) -> Result<TypeSignature> {
        for member in self
            .members
            .iter()
            .filter(|member| member.source == MemberSource::Dependency)
        {
            let typedef = dependency
                .find_type(&member.declaring_type.full_name())
                .ok_or_else(|| {
                    Error::UnresolvedType(format!(
                        "{} (in dependency '{}')",
                        member.declaring_type,
                        dependency.name()
                    ))
                })?;
            if typedef.find_method(&member.name, &member.signature).is_none() {
                return Err(Error::MethodNotFound {
                    type_name: member.declaring_type.full_name(),
                    method: format!("{} {}", member.name, member.signature),
                });
            }
        }

        dependency
            .find_type(&self.vector.full_name())
            .map(crate::metadata::TypeDef::signature)
            .ok_or_else(|| Error::UnresolvedType(self.vector.full_name()))
    }

    /// Verifies all members against `dependency`, then imports them into `module`.
    ///
    /// # Errors
    ///
    /// See [`MemberRegistry::verify`]. `module` is only modified when verification succeeded.
    pub fn resolve(&self, module: &mut Module, dependency: &Module) -> Result<ResolvedMembers> {
        let vector = self.verify(dependency)?;

        if let Some(name) = vector.type_name() {
            module.import_type(name);
        }
        let mut tokens = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let token = module.import_method(&member.declaring_type, &member.name, &member.signature);
            tokens.push((member.key, token));
        }

        let token = |key: MemberKey| {
            tokens
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, token)| *token)
                .ok_or_else(|| Error::Error(format!("Member {key} was not declared")))
        };

        Ok(ResolvedMembers {
            get_active: token(MemberKey::GetActive)?,
            set_active: token(MemberKey::SetActive)?,
            get_width: token(MemberKey::GetWidth)?,
            get_height: token(MemberKey::GetHeight)?,
            vector_ctor: token(MemberKey::VectorCtor)?,
            vector_scale: token(MemberKey::VectorScale)?,
            math_min: token(MemberKey::MathMin)?,
            vector,
        })
    }
}

/// Tokens of the external members, valid in the target module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMembers {
    /// `RenderTexture.get_active()`
    pub get_active: Token,
    /// `RenderTexture.set_active(RenderTexture)`
    pub set_active: Token,
    /// `RenderTexture.get_width()`
    pub get_width: Token,
    /// `RenderTexture.get_height()`
    pub get_height: Token,
    /// `Vector3..ctor(float32, float32, float32)`
    pub vector_ctor: Token,
    /// `Vector3.Scale(Vector3, Vector3)`
    pub vector_scale: Token,
    /// `System.Math.Min(int32, int32)`
    pub math_min: Token,
    /// Descriptor of the vector type, resolvable in the target module
    pub vector: TypeSignature,
}
