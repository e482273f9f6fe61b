//! Adding typed local slots to compiled method bodies.

use log::debug;

use crate::{
    metadata::{method::LocalId, method::MethodBody, Module, TypeSignature},
    Error, Result,
};

/// Appends a local of type `signature` to `body` and returns its handle.
///
/// Existing locals keep their handles; the new slot always gets the next free index. The type
/// must resolve against `module`, the module owning `body`: named types have to be defined there
/// or imported first.
///
/// # Errors
///
/// Returns [`Error::UnresolvedType`] if `signature` names a type unknown to `module`, leaving
/// `body` unchanged.
///
/// # Examples
///
/// ```rust
/// use cilpatch::metadata::{method::{LocalId, MethodBody}, Module, TypeName, TypeSignature};
/// use cilpatch::patch::allocate_local;
///
/// let mut module = Module::new("Assembly-CSharp");
/// let vector = TypeSignature::ValueType(TypeName::parse("UnityEngine.Vector3"));
/// let mut body = MethodBody::new();
///
/// assert!(allocate_local(&module, &mut body, vector.clone()).is_err());
/// assert!(body.locals().is_empty());
///
/// module.import_type(&TypeName::parse("UnityEngine.Vector3"));
/// assert_eq!(allocate_local(&module, &mut body, vector)?, LocalId(0));
/// # Ok::<(), cilpatch::Error>(())
/// ```
pub fn allocate_local(
    module: &Module,
    body: &mut MethodBody,
    signature: TypeSignature,
) -> Result<LocalId> {
    if !module.resolves_type(&signature) {
        return Err(Error::UnresolvedType(format!(
            "{} (in module '{}')",
            signature,
            module.name()
        )));
    }

    let local = body.add_local(signature)?;
    debug!("Allocated local {} in body {}", local, body.id());
    Ok(local)
}
