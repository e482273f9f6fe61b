//! Configuration of the texture resolution patch.
//!
//! The defaults describe the released target program. Every name the patch looks up is a field
//! here, so a target build that renamed a member can be handled without touching the engine.

use crate::{metadata::TypeName, Error, Result};

/// Display name of the texture resolution patch.
pub const PATCH_NAME: &str = "CM3D2 Texture Resolution Patch";

/// Configuration for [`crate::patch::TextureResolutionPatch`].
///
/// # Examples
///
/// ```rust
/// use cilpatch::patch::PatchConfig;
///
/// let config = PatchConfig {
///     reference_size: 2048.0,
///     ..PatchConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// assert!(PatchConfig { reference_size: 0.0, ..config }.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PatchConfig {
    /// Display name of the module the patch targets
    pub module_name: String,

    /// Marker tag recording that the patch was applied
    pub marker: String,

    /// Full name of the type declaring the target method
    pub target_type: String,

    /// Name of the target method
    pub target_method: String,

    /// Texture edge length the original rendering code was written for
    pub reference_size: f32,

    /// Member whose call activates the render target. The ratio block is inserted right after it.
    pub activation_member: String,

    /// Member whose call begins the transform-stack push. The scale blocks are inserted before it.
    pub push_member: String,

    /// Render target type of the engine library
    pub render_texture: TypeName,

    /// Three-component float vector type of the engine library
    pub vector: TypeName,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            module_name: "Assembly-CSharp".to_string(),
            marker: "CM3D2_TEXTURERESOLUTION".to_string(),
            target_type: "TBody".to_string(),
            target_method: "MulTexProc".to_string(),
            reference_size: 1024.0,
            activation_member: "set_active".to_string(),
            push_member: "PushMatrix".to_string(),
            render_texture: TypeName::new("UnityEngine", "RenderTexture"),
            vector: TypeName::new("UnityEngine", "Vector3"),
        }
    }
}

impl PatchConfig {
    /// Checks that the configuration can drive a patch pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty name or a reference size that is not a
    /// finite positive number.
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("module_name", self.module_name.as_str()),
            ("marker", self.marker.as_str()),
            ("target_type", self.target_type.as_str()),
            ("target_method", self.target_method.as_str()),
            ("activation_member", self.activation_member.as_str()),
            ("push_member", self.push_member.as_str()),
            ("render_texture", self.render_texture.name.as_str()),
            ("vector", self.vector.name.as_str()),
        ];
        if let Some((field, _)) = names.iter().find(|(_, value)| value.is_empty()) {
            return Err(Error::InvalidConfig(format!("'{field}' must not be empty")));
        }

        if !self.reference_size.is_finite() || self.reference_size <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "reference size must be a positive number, got {}",
                self.reference_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PatchConfig::default();
        assert_eq!(config.module_name, "Assembly-CSharp");
        assert_eq!(config.marker, "CM3D2_TEXTURERESOLUTION");
        assert_eq!(config.target_type, "TBody");
        assert_eq!(config.target_method, "MulTexProc");
        assert_eq!(config.reference_size, 1024.0);
        assert_eq!(config.vector.full_name(), "UnityEngine.Vector3");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let empty = PatchConfig {
            push_member: String::new(),
            ..PatchConfig::default()
        };
        assert!(matches!(empty.validate(), Err(Error::InvalidConfig(msg)) if msg.contains("push_member")));

        for size in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let config = PatchConfig {
                reference_size: size,
                ..PatchConfig::default()
            };
            assert!(config.validate().is_err(), "{size} accepted");
        }
    }
}
