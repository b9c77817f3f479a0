use std::fmt;
use std::path::PathBuf;

use crate::discovery::LayerSource;

/// Drawable dimensions in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero (minimised windows report this).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_vec2(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Texture edge-sampling policy for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

impl WrapMode {
    const GL_REPEAT: i64 = 0x2901;
    const GL_MIRRORED_REPEAT: i64 = 0x8370;
    const GL_CLAMP_TO_EDGE: i64 = 0x812F;
    const GL_CLAMP_TO_BORDER: i64 = 0x812D;

    /// Accepts a mode name or the classic OpenGL enum value written as an integer.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "repeat" => Some(Self::Repeat),
            "mirror" | "mirrored" | "mirrored_repeat" | "mirror_repeat" => {
                Some(Self::MirroredRepeat)
            }
            "clamp" | "clamp_to_edge" | "edge" => Some(Self::ClampToEdge),
            "border" | "clamp_to_border" => Some(Self::ClampToBorder),
            other => other.parse::<i64>().ok().and_then(Self::from_gl_enum),
        }
    }

    pub fn from_gl_enum(value: i64) -> Option<Self> {
        match value {
            Self::GL_REPEAT => Some(Self::Repeat),
            Self::GL_MIRRORED_REPEAT => Some(Self::MirroredRepeat),
            Self::GL_CLAMP_TO_EDGE => Some(Self::ClampToEdge),
            Self::GL_CLAMP_TO_BORDER => Some(Self::ClampToBorder),
            _ => None,
        }
    }

    pub fn gl_enum(self) -> i64 {
        match self {
            Self::Repeat => Self::GL_REPEAT,
            Self::MirroredRepeat => Self::GL_MIRRORED_REPEAT,
            Self::ClampToEdge => Self::GL_CLAMP_TO_EDGE,
            Self::ClampToBorder => Self::GL_CLAMP_TO_BORDER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Repeat => "repeat",
            Self::MirroredRepeat => "mirrored_repeat",
            Self::ClampToEdge => "clamp_to_edge",
            Self::ClampToBorder => "clamp_to_border",
        }
    }
}

impl fmt::Display for WrapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wrap policy for both texture axes of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WrapModes {
    pub s: WrapMode,
    pub t: WrapMode,
}

impl WrapModes {
    pub const fn new(s: WrapMode, t: WrapMode) -> Self {
        Self { s, t }
    }
}

/// Per-layer options resolved from the settings store before the registry is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerOptions {
    pub wrap: WrapModes,
    pub enabled: bool,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            wrap: WrapModes::default(),
            enabled: true,
        }
    }
}

/// Declares how the compositor should treat the swapchain alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceAlpha {
    /// Frames fully cover the window.
    Opaque,
    /// Frames may contain transparency and should be blended by the compositor.
    #[default]
    Transparent,
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Window title.
    pub title: String,
    /// Application class / Wayland app id.
    pub app_id: String,
    /// Directory the layer sources were discovered in (for logs).
    pub shader_dir: PathBuf,
    /// Layer sources in stack order.
    pub layers: Vec<LayerSource>,
    /// Options for each layer, indexed like `layers`; missing entries use defaults.
    pub layer_options: Vec<LayerOptions>,
    /// Alpha behaviour of the window surface.
    pub surface_alpha: SurfaceAlpha,
    /// Optional FPS cap; `None` renders on every redraw.
    pub target_fps: Option<f32>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (700, 400),
            title: "wayshaders".to_string(),
            app_id: "wayshaders".to_string(),
            shader_dir: PathBuf::from("."),
            layers: Vec::new(),
            layer_options: Vec::new(),
            surface_alpha: SurfaceAlpha::default(),
            target_fps: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_mode_accepts_names_and_gl_enums() {
        assert_eq!(WrapMode::parse("repeat"), Some(WrapMode::Repeat));
        assert_eq!(WrapMode::parse(" Clamp "), Some(WrapMode::ClampToEdge));
        assert_eq!(WrapMode::parse("mirror"), Some(WrapMode::MirroredRepeat));
        assert_eq!(WrapMode::parse("10497"), Some(WrapMode::Repeat));
        assert_eq!(WrapMode::parse("33071"), Some(WrapMode::ClampToEdge));
        assert_eq!(WrapMode::parse("33648"), Some(WrapMode::MirroredRepeat));
        assert_eq!(WrapMode::parse("33069"), Some(WrapMode::ClampToBorder));
        assert_eq!(WrapMode::parse("12"), None);
        assert_eq!(WrapMode::parse("wobble"), None);
    }

    #[test]
    fn wrap_mode_names_parse_back() {
        for mode in [
            WrapMode::Repeat,
            WrapMode::MirroredRepeat,
            WrapMode::ClampToEdge,
            WrapMode::ClampToBorder,
        ] {
            assert_eq!(WrapMode::parse(mode.name()), Some(mode));
            assert_eq!(WrapMode::from_gl_enum(mode.gl_enum()), Some(mode));
        }
    }

    #[test]
    fn empty_surface_detection() {
        assert!(SurfaceSize::new(0, 600).is_empty());
        assert!(!SurfaceSize::new(800, 600).is_empty());
        assert_eq!(SurfaceSize::new(800, 600).to_string(), "800x600");
    }
}
