//! Built-in hooks for the external methods patched code calls.
//!
//! - [`math`] - `System.Math` from the core library
//! - [`unity`] - Render target accessors and the float vector type of the engine library

pub mod math;
pub mod unity;

use crate::{emulation::HookRegistry, metadata::TypeName};

/// Creates a registry with the core library and engine hooks.
///
/// The render target reports `width` x `height`.
#[must_use]
pub fn default_hooks(
    render_texture: &TypeName,
    vector: &TypeName,
    width: i32,
    height: i32,
) -> HookRegistry {
    let mut registry = HookRegistry::new();
    math::register(&mut registry);
    unity::register_render_texture(&mut registry, render_texture, width, height);
    unity::register_vector3(&mut registry, vector);
    registry
}
