use std::collections::HashMap;
use std::fmt;

use wgpu::naga::front::glsl::{Frontend, Options};
use wgpu::naga::ShaderStage;

use crate::discovery::LayerSource;
use crate::interface::{
    strip_block_comments, FrameType, ShaderInterface, UniformDecl, VaryingDecl, VaryingQualifier,
};

/// Pipeline stage a diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    pub(crate) fn naga_stage(self) -> ShaderStage {
        match self {
            Self::Vertex => ShaderStage::Vertex,
            Self::Fragment => ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex"),
            Self::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("layer {layer}: {stage} shader failed to compile:\n{log}")]
    Compile {
        layer: usize,
        stage: StageKind,
        log: String,
    },
    #[error("layer {layer}: program failed to link:\n{log}")]
    Link { layer: usize, log: String },
}

/// Borrowed sources for one program.
#[derive(Debug, Clone, Copy)]
pub struct ProgramSource<'a> {
    pub layer: usize,
    /// `None` selects [`DEFAULT_VERTEX_BODY`].
    pub vertex: Option<&'a str>,
    pub fragment: &'a str,
}

impl<'a> ProgramSource<'a> {
    pub fn from_layer(source: &'a LayerSource) -> Self {
        Self {
            layer: source.index,
            vertex: source.vertex.as_deref(),
            fragment: &source.fragment,
        }
    }
}

/// Both stages wrapped for the GLSL 450 frontend, plus what they declare.
#[derive(Debug, Clone)]
pub struct WrappedProgram {
    pub vertex: String,
    pub fragment: String,
    /// Standard uniforms and bound channels (never above the layer index).
    pub interface: ShaderInterface,
}

pub const DEFAULT_VERTEX_BODY: &str = "void main() {\n    gl_Position = gl_Vertex;\n}\n";

/// Wraps both stages of a layer program.
pub fn wrap_program(source: &ProgramSource<'_>) -> WrappedProgram {
    let vertex_body = source.vertex.unwrap_or(DEFAULT_VERTEX_BODY);
    let vertex = StageBody::sanitize(StageKind::Vertex, source.layer, vertex_body);
    let fragment = StageBody::sanitize(StageKind::Fragment, source.layer, source.fragment);
    let interface = vertex.interface.merged(&fragment.interface);

    let draw = if interface.channels.contains(&source.layer) {
        DrawTarget::Offscreen
    } else {
        DrawTarget::Surface
    };
    let locations = VaryingLocations::assign(&[&vertex, &fragment]);
    let vertex = vertex.finish(&locations, draw);
    let fragment = fragment.finish(&locations, draw);
    tracing::trace!(layer = source.layer, ?draw, "wrapped vertex shader:\n{vertex}");
    tracing::trace!(layer = source.layer, ?draw, "wrapped fragment shader:\n{fragment}");
    WrappedProgram {
        vertex,
        fragment,
        interface,
    }
}

/// Parses a wrapped stage with naga's GLSL frontend, returning its diagnostics on failure.
pub fn check_stage(layer: usize, stage: StageKind, wrapped: &str) -> Result<(), ProgramError> {
    let mut frontend = Frontend::default();
    frontend
        .parse(&Options::from(stage.naga_stage()), wrapped)
        .map(|_| ())
        .map_err(|errors| ProgramError::Compile {
            layer,
            stage,
            log: errors.to_string(),
        })
}

/// Where a program's fragments land.
///
/// Offscreen targets are stored bottom row first, like GL textures, by negating clip-space
/// `y` in the vertex stage. Surface passes keep the swapchain's top-left origin and
/// remap `gl_FragCoord` to a bottom-left one instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawTarget {
    Surface,
    Offscreen,
}

enum SourceLine {
    Code(String),
    Varying(VaryingDecl),
}

/// A classic-style stage body with its uniform declarations removed.
///
/// 1. Blank block comments, drop `#version` and recognised uniform declarations,
///    keeping line numbers stable for diagnostics.
/// 2. On [`StageBody::finish`], give `varying` declarations explicit locations and wrap
///    the body in the uniform block, channel bindings and compatibility macros.
struct StageBody {
    stage: StageKind,
    layer: usize,
    lines: Vec<SourceLine>,
    interface: ShaderInterface,
}

impl StageBody {
    fn sanitize(stage: StageKind, layer: usize, body: &str) -> Self {
        let mut interface = ShaderInterface::default();
        let mut lines = Vec::new();
        let mut skipped_version = false;

        for line in strip_block_comments(body).lines() {
            if !skipped_version && line.trim_start().starts_with("#version") {
                skipped_version = true;
                lines.push(SourceLine::Code(String::new()));
                continue;
            }
            if let Some(decl) = UniformDecl::parse(line).filter(UniformDecl::is_standard) {
                match decl.channel() {
                    Some(channel) if channel > layer => {
                        tracing::warn!(
                            layer,
                            channel,
                            "{} samples a layer above itself; ignoring the declaration",
                            decl.name
                        );
                    }
                    _ => {
                        let line_interface = ShaderInterface::scan(line);
                        interface = interface.merged(&line_interface);
                    }
                }
                lines.push(SourceLine::Code(String::new()));
                continue;
            }
            match VaryingDecl::parse(line) {
                Some(decl) => lines.push(SourceLine::Varying(decl)),
                None => lines.push(SourceLine::Code(line.to_string())),
            }
        }

        Self {
            stage,
            layer,
            lines,
            interface,
        }
    }

    fn varyings(&self) -> impl Iterator<Item = &VaryingDecl> {
        self.lines.iter().filter_map(|line| match line {
            SourceLine::Varying(decl) if decl.qualifier == VaryingQualifier::Varying => Some(decl),
            _ => None,
        })
    }

    fn finish(self, locations: &VaryingLocations, draw: DrawTarget) -> String {
        let mut wrapped = build_header(self.stage, &self.interface, draw);
        wrapped.push_str("#line 1\n");
        for line in &self.lines {
            match line {
                SourceLine::Code(code) => wrapped.push_str(code),
                SourceLine::Varying(decl) => {
                    wrapped.push_str(&self.declare_varying(decl, locations));
                }
            }
            wrapped.push('\n');
        }
        wrapped.push_str(match (self.stage, draw) {
            (StageKind::Vertex, DrawTarget::Offscreen) => OFFSCREEN_VERTEX_FOOTER,
            (StageKind::Fragment, DrawTarget::Surface) => SURFACE_FRAGMENT_FOOTER,
            _ => "",
        });
        wrapped
    }

    /// Rewrites one declaration line; every declarator stays on the same line.
    fn declare_varying(&self, decl: &VaryingDecl, locations: &VaryingLocations) -> String {
        let mut line = String::new();
        for declarator in &decl.declarators {
            let ty = &decl.ty;
            let name = &declarator.name;
            let suffix = &declarator.suffix;
            match (decl.qualifier, self.stage) {
                (VaryingQualifier::Varying, stage) => {
                    let direction = match stage {
                        StageKind::Vertex => "out",
                        StageKind::Fragment => "in",
                    };
                    let location = locations.get(name);
                    line.push_str(&format!(
                        "layout(location = {location}) {direction} {ty} {name}{suffix}; "
                    ));
                }
                (VaryingQualifier::Attribute, StageKind::Vertex) => {
                    tracing::warn!(
                        layer = self.layer,
                        "vertex attribute {name} is not supplied; it reads as zero"
                    );
                    line.push_str(&format!("{ty} {name}{suffix}; "));
                }
                (VaryingQualifier::Attribute, StageKind::Fragment) => {
                    // Not valid in a fragment stage; leave it for the frontend to report.
                    line.push_str(&format!("attribute {ty} {name}{suffix}; "));
                }
            }
        }
        line.truncate(line.trim_end().len());
        line
    }
}

/// Inter-stage locations keyed by varying name, shared by both stages of a program.
#[derive(Debug, Default)]
struct VaryingLocations {
    by_name: HashMap<String, u32>,
}

impl VaryingLocations {
    /// Numbers varyings in order of first appearance, vertex stage first.
    fn assign(stages: &[&StageBody]) -> Self {
        let mut locations = Self::default();
        let mut next = 0;
        for decl in stages.iter().flat_map(|stage| stage.varyings()) {
            for declarator in &decl.declarators {
                if !locations.by_name.contains_key(&declarator.name) {
                    locations.by_name.insert(declarator.name.clone(), next);
                    next += decl.location_span(declarator);
                }
            }
        }
        locations
    }

    fn get(&self, name: &str) -> u32 {
        self.by_name.get(name).copied().unwrap_or_default()
    }
}

fn build_header(stage: StageKind, interface: &ShaderInterface, draw: DrawTarget) -> String {
    let mut header = String::from("#version 450\n");
    match stage {
        StageKind::Vertex => header.push_str(VERTEX_PRELUDE),
        StageKind::Fragment => header.push_str(FRAGMENT_PRELUDE),
    }
    header.push_str(UNIFORM_BLOCK);

    if interface.resolution {
        header.push_str("#define u_resolution wayshaders_layer.resolution\n");
    }
    if interface.time {
        header.push_str("#define u_time wayshaders_layer.time\n");
    }
    match interface.frame {
        Some(FrameType::Float) => header.push_str("#define u_frame wayshaders_layer.frame\n"),
        Some(FrameType::Int) => header.push_str("#define u_frame int(wayshaders_layer.frame)\n"),
        None => {}
    }

    for &channel in &interface.channels {
        let texture_binding = channel * 2;
        let sampler_binding = texture_binding + 1;
        header.push_str(&format!(
            "layout(set = 1, binding = {texture_binding}) uniform texture2D wayshaders_channel{channel}_texture;\n\
             layout(set = 1, binding = {sampler_binding}) uniform sampler wayshaders_channel{channel}_sampler;\n\
             #define u_sampler{channel} sampler2D(wayshaders_channel{channel}_texture, wayshaders_channel{channel}_sampler)\n"
        ));
    }

    // After the bindings: the macro would otherwise rewrite the `texture2D` type above.
    header.push_str("#define texture2D texture\n");
    match (stage, draw) {
        (StageKind::Vertex, DrawTarget::Offscreen) => header.push_str(OFFSCREEN_VERTEX_SHADOW),
        (StageKind::Fragment, DrawTarget::Surface) => header.push_str(SURFACE_FRAGMENT_SHADOW),
        _ => {}
    }
    header
}

/// Must match `LayerUniformBlock` in `gpu/uniforms.rs`.
const UNIFORM_BLOCK: &str = r"layout(std140, set = 0, binding = 0) uniform WayshadersLayer {
    vec2 resolution;
    float time;
    float frame;
} wayshaders_layer;
";

const FRAGMENT_PRELUDE: &str = r"layout(location = 0) out vec4 wayshaders_frag_color;
#define gl_FragColor wayshaders_frag_color
";

/// Triangle-strip quad covering the whole target, indexed by `gl_VertexIndex`.
const VERTEX_PRELUDE: &str = r"const vec2 wayshaders_quad[4] = vec2[4](
    vec2(-1.0, -1.0),
    vec2(1.0, -1.0),
    vec2(-1.0, 1.0),
    vec2(1.0, 1.0)
);
#define gl_Vertex vec4(wayshaders_quad[uint(gl_VertexIndex)], 0.0, 1.0)
";

/// The layer's `main` runs first, then clip-space `y` is negated.
const OFFSCREEN_VERTEX_SHADOW: &str = r"vec4 wayshaders_position;
#define gl_Position wayshaders_position
#define main wayshaders_layer_main
";

const OFFSCREEN_VERTEX_FOOTER: &str = r"#undef main
#undef gl_Position
void main() {
    wayshaders_layer_main();
    gl_Position = vec4(wayshaders_position.x, -wayshaders_position.y, wayshaders_position.zw);
}
";

/// `gl_FragCoord` with a bottom-left origin, filled in before the layer's `main` runs.
const SURFACE_FRAGMENT_SHADOW: &str = r"vec4 wayshaders_frag_coord;
#define gl_FragCoord wayshaders_frag_coord
#define main wayshaders_layer_main
";

const SURFACE_FRAGMENT_FOOTER: &str = r"#undef main
#undef gl_FragCoord
void main() {
    wayshaders_frag_coord = vec4(
        gl_FragCoord.x,
        wayshaders_layer.resolution.y - gl_FragCoord.y,
        gl_FragCoord.zw
    );
    wayshaders_layer_main();
}
";
