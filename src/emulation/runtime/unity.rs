//! Engine library hooks: the active render target and the three-component float vector.
//!
//! | Method | Behavior |
//! |--------|----------|
//! | `RenderTexture.get_active()` | Returns the simulated active render target |
//! | `RenderTexture.set_active(rt)` | Accepted, no effect |
//! | `RenderTexture.get_width()` | Configured width of the render target |
//! | `RenderTexture.get_height()` | Configured height of the render target |
//! | `Vector3..ctor(x, y, z)` | Builds the vector |
//! | `Vector3.Scale(a, b)` | Component-wise product |

use crate::{
    emulation::{EmValue, Hook, HookContext, HookRegistry},
    metadata::TypeName,
    Error, Result,
};

/// Heap handle returned for the simulated active render target.
pub const ACTIVE_RENDER_TARGET: u32 = 1;

/// Registers the render target hooks, reporting the given dimensions.
pub fn register_render_texture(
    registry: &mut HookRegistry,
    render_texture: &TypeName,
    width: i32,
    height: i32,
) {
    registry.register(
        Hook::new("RenderTexture.get_active")
            .match_member(render_texture, "get_active")
            .handler(|_| Ok(EmValue::ObjectRef(ACTIVE_RENDER_TARGET))),
    );
    registry.register(
        Hook::new("RenderTexture.set_active")
            .match_member(render_texture, "set_active")
            .handler(|_| Ok(EmValue::Void)),
    );
    registry.register(
        Hook::new("RenderTexture.get_width")
            .match_member(render_texture, "get_width")
            .handler(move |ctx| dimension(ctx, width)),
    );
    registry.register(
        Hook::new("RenderTexture.get_height")
            .match_member(render_texture, "get_height")
            .handler(move |ctx| dimension(ctx, height)),
    );
}

/// Registers the vector constructor and `Scale` hooks.
pub fn register_vector3(registry: &mut HookRegistry, vector: &TypeName) {
    let ctor_type = vector.clone();
    registry.register(
        Hook::new("Vector3..ctor")
            .match_member(vector, ".ctor")
            .handler(move |ctx| match ctx.args {
                [EmValue::F32(x), EmValue::F32(y), EmValue::F32(z)] => {
                    Ok(EmValue::vector3(ctor_type.clone(), *x, *y, *z))
                }
                _ => Err(unsupported(ctx)),
            }),
    );

    let scale_type = vector.clone();
    registry.register(
        Hook::new("Vector3.Scale")
            .match_member(vector, "Scale")
            .handler(move |ctx| match ctx.args {
                [a, b] => match (a.as_vector3(), b.as_vector3()) {
                    (Some([ax, ay, az]), Some([bx, by, bz])) => Ok(EmValue::vector3(
                        scale_type.clone(),
                        ax * bx,
                        ay * by,
                        az * bz,
                    )),
                    _ => Err(unsupported(ctx)),
                },
                _ => Err(unsupported(ctx)),
            }),
    );
}

fn dimension(ctx: &HookContext<'_>, value: i32) -> Result<EmValue> {
    match ctx.this {
        Some(EmValue::ObjectRef(ACTIVE_RENDER_TARGET)) => Ok(EmValue::I32(value)),
        Some(EmValue::Null) => Err(Error::Error(format!(
            "NullReferenceException in {}.{}",
            ctx.declaring_type, ctx.method
        ))),
        _ => Err(unsupported(ctx)),
    }
}

fn unsupported(ctx: &HookContext<'_>) -> Error {
    Error::NotSupported(format!(
        "{}.{} with arguments ({})",
        ctx.declaring_type,
        ctx.method,
        ctx.args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    ))
}
