//! Fixture modules shared by the integration tests.
#![allow(dead_code)]

use cilpatch::prelude::*;

pub fn render_texture() -> TypeName {
    TypeName::new("UnityEngine", "RenderTexture")
}

pub fn vector() -> TypeName {
    TypeName::new("UnityEngine", "Vector3")
}

fn rt_sig() -> TypeSignature {
    TypeSignature::Class(render_texture())
}

fn vec_sig() -> TypeSignature {
    TypeSignature::ValueType(vector())
}

fn static_void() -> SignatureMethod {
    SignatureMethod::static_method(TypeSignature::Void, vec![])
}

fn ctor_sig() -> SignatureMethod {
    SignatureMethod::instance(
        TypeSignature::Void,
        vec![TypeSignature::R4, TypeSignature::R4, TypeSignature::R4],
    )
}

/// The engine library. `with_vector = false` leaves out `UnityEngine.Vector3`.
pub fn engine(with_vector: bool) -> Module {
    let mut module = Module::new("UnityEngine");
    let accessor = MethodFlags::PUBLIC | MethodFlags::SPECIAL_NAME;

    let mut rt = TypeDef::new(render_texture(), TypeFlavor::Class);
    rt.methods = vec![
        MethodDef::new(
            "get_active",
            accessor | MethodFlags::STATIC,
            SignatureMethod::static_method(rt_sig(), vec![]),
        ),
        MethodDef::new(
            "set_active",
            accessor | MethodFlags::STATIC,
            SignatureMethod::static_method(TypeSignature::Void, vec![rt_sig()]),
        ),
        MethodDef::new(
            "get_width",
            accessor | MethodFlags::VIRTUAL,
            SignatureMethod::instance(TypeSignature::I4, vec![]),
        ),
        MethodDef::new(
            "get_height",
            accessor | MethodFlags::VIRTUAL,
            SignatureMethod::instance(TypeSignature::I4, vec![]),
        ),
    ];
    module.add_type(rt);

    if with_vector {
        let mut vec3 = TypeDef::new(vector(), TypeFlavor::ValueType);
        vec3.methods = vec![
            MethodDef::new(".ctor", MethodFlags::PUBLIC | MethodFlags::SPECIAL_NAME, ctor_sig()),
            MethodDef::new(
                "Scale",
                MethodFlags::PUBLIC | MethodFlags::STATIC,
                SignatureMethod::static_method(vec_sig(), vec![vec_sig(), vec_sig()]),
            ),
        ];
        module.add_type(vec3);
    }

    let mut gl = TypeDef::new(TypeName::new("UnityEngine", "GL"), TypeFlavor::Class);
    gl.methods = vec![
        MethodDef::new("PushMatrix", MethodFlags::PUBLIC | MethodFlags::STATIC, static_void()),
        MethodDef::new("PopMatrix", MethodFlags::PUBLIC | MethodFlags::STATIC, static_void()),
    ];
    module.add_type(gl);
    module
}

/// Shape of the generated `MulTexProc(string)` body.
#[derive(Clone, Copy)]
pub struct Shape {
    /// Balanced filler sequences emitted before the activation call
    pub before: u32,
    /// Filler emitted between the activation call and the transform push
    pub between: u32,
    /// Filler emitted after the transform push
    pub after: u32,
    /// Emit the `PushMatrix` call
    pub push: bool,
}

impl Default for Shape {
    fn default() -> Self {
        Shape {
            before: 1,
            between: 1,
            after: 1,
            push: true,
        }
    }
}

/// Emits `count` stack-neutral filler sequences, varying with `seed`.
fn filler(asm: &mut InstructionAssembler, count: u32, seed: u32) -> Result<()> {
    for i in 0..count {
        match (i + seed) % 3 {
            0 => {
                asm.nop()?;
            }
            1 => {
                asm.ldc_i4(i32::try_from(i).unwrap_or(0) + 7)?.pop()?;
            }
            _ => {
                asm.ldloc(LocalId(2))?
                    .ldc_r4(0.5)?
                    .mul()?
                    .stloc(LocalId(2))?;
            }
        }
    }
    Ok(())
}

/// The game module with `TBody.MulTexProc()` and `TBody.MulTexProc(string)`.
///
/// Locals of the target: `V_0` render target, `V_1` position, `V_2` float32, `V_3` scale.
pub fn game(shape: Shape) -> Result<Module> {
    let mut module = Module::new("Assembly-CSharp");
    let get_active = module.import_method(
        &render_texture(),
        "get_active",
        &SignatureMethod::static_method(rt_sig(), vec![]),
    );
    let set_active = module.import_method(
        &render_texture(),
        "set_active",
        &SignatureMethod::static_method(TypeSignature::Void, vec![rt_sig()]),
    );
    let ctor = module.import_method(&vector(), ".ctor", &ctor_sig());
    let gl = TypeName::new("UnityEngine", "GL");
    let push = module.import_method(&gl, "PushMatrix", &static_void());
    let pop = module.import_method(&gl, "PopMatrix", &static_void());

    let mut body = MethodBody::new();
    body.add_local(rt_sig())?;
    body.add_local(vec_sig())?;
    body.add_local(TypeSignature::R4)?;
    body.add_local(vec_sig())?;

    let mut asm = InstructionAssembler::new();
    asm.ldloca(LocalId(1))?
        .ldc_r4(10.0)?
        .ldc_r4(20.0)?
        .ldc_r4(0.0)?
        .call(ctor)?
        .ldloca(LocalId(3))?
        .ldc_r4(2.0)?
        .ldc_r4(2.0)?
        .ldc_r4(1.0)?
        .call(ctor)?
        .ldc_r4(1.0)?
        .stloc(LocalId(2))?;
    filler(&mut asm, shape.before, 0)?;
    asm.call(get_active)?
        .stloc(LocalId(0))?
        .ldloc(LocalId(0))?
        .call(set_active)?;
    filler(&mut asm, shape.between, 1)?;
    asm.label("try")?
        .ldloc(LocalId(2))?
        .ldc_r4(1.0)?
        .add()?
        .stloc(LocalId(2))?
        .leave("after")?
        .label("finally")?
        .endfinally()?
        .label("after")?
        .nop()?;
    if shape.push {
        asm.call(push)?;
    }
    filler(&mut asm, shape.after, 2)?;
    asm.call(pop)?
        .ldloc(LocalId(0))?
        .call(set_active)?
        .ret()?
        .exception_region(
            ExceptionHandlerFlags::FINALLY,
            "try",
            "finally",
            "finally",
            Some("after"),
            None,
        )?;
    asm.append_to(&mut body)?;

    let mut empty = MethodBody::new();
    let mut ret = InstructionAssembler::new();
    ret.ret()?;
    ret.append_to(&mut empty)?;

    let mut tbody = TypeDef::new(TypeName::new("", "TBody"), TypeFlavor::Class);
    tbody.methods = vec![
        MethodDef::new(
            "MulTexProc",
            MethodFlags::PUBLIC,
            SignatureMethod::instance(TypeSignature::Void, vec![]),
        )
        .with_body(empty),
        MethodDef::new(
            "MulTexProc",
            MethodFlags::PUBLIC,
            SignatureMethod::instance(TypeSignature::Void, vec![TypeSignature::String]),
        )
        .with_body(body),
    ];
    module.add_type(tbody);
    Ok(module)
}

/// Token of `TBody.MulTexProc(string)`.
pub fn target(module: &Module) -> Token {
    module
        .find_type("TBody")
        .and_then(|tbody| tbody.methods_named("MulTexProc").find(|m| m.has_parameters()))
        .map(|m| m.token)
        .expect("fixture defines MulTexProc(string)")
}

/// Body of `TBody.MulTexProc(string)`.
pub fn target_body(module: &Module) -> &MethodBody {
    module
        .method(target(module))
        .and_then(|m| m.body.as_ref())
        .expect("fixture MulTexProc(string) has a body")
}
