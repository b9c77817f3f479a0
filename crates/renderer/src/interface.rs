//! Scans layer sources for the uniforms the compositor knows how to feed.
//!
//! Only top-level `uniform <type> <name>;` declarations are recognised (an optional
//! precision qualifier is tolerated). Block comments are blanked before scanning.
//! Anything else is left for the GLSL frontend to accept or reject.

use std::collections::BTreeSet;

pub const RESOLUTION_UNIFORM: &str = "u_resolution";
pub const TIME_UNIFORM: &str = "u_time";
pub const FRAME_UNIFORM: &str = "u_frame";
const CHANNEL_PREFIX: &str = "u_sampler";

pub fn channel_uniform_name(channel: usize) -> String {
    format!("{CHANNEL_PREFIX}{channel}")
}

/// Extracts `c` from `u_sampler<c>`.
pub fn parse_channel_name(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(CHANNEL_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Scalar type used for `u_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Float,
    Int,
}

/// Standard uniforms and channels declared by one shader stage (or a whole program).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderInterface {
    pub resolution: bool,
    pub time: bool,
    pub frame: Option<FrameType>,
    pub channels: BTreeSet<usize>,
}

impl ShaderInterface {
    pub fn scan(source: &str) -> Self {
        let mut interface = Self::default();
        for line in strip_block_comments(source).lines() {
            let Some(decl) = UniformDecl::parse(line) else {
                continue;
            };
            if decl.is_standard() {
                interface.record(&decl);
            }
        }
        interface
    }

    fn record(&mut self, decl: &UniformDecl<'_>) {
        match decl.name {
            RESOLUTION_UNIFORM => self.resolution = true,
            TIME_UNIFORM => self.time = true,
            FRAME_UNIFORM => {
                self.frame = Some(if decl.ty == "int" {
                    FrameType::Int
                } else {
                    FrameType::Float
                })
            }
            name => {
                if let Some(channel) = parse_channel_name(name) {
                    self.channels.insert(channel);
                }
            }
        }
    }

    /// Union of two stages; the fragment stage's `u_frame` type wins on conflict.
    pub fn merged(&self, other: &Self) -> Self {
        Self {
            resolution: self.resolution || other.resolution,
            time: self.time || other.time,
            frame: other.frame.or(self.frame),
            channels: self.channels.union(&other.channels).copied().collect(),
        }
    }

    pub fn declares(&self, name: &str) -> bool {
        match name {
            RESOLUTION_UNIFORM => self.resolution,
            TIME_UNIFORM => self.time,
            FRAME_UNIFORM => self.frame.is_some(),
            other => parse_channel_name(other).is_some_and(|c| self.channels.contains(&c)),
        }
    }
}

/// One `uniform` declaration found on a source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UniformDecl<'a> {
    pub ty: &'a str,
    pub name: &'a str,
}

impl<'a> UniformDecl<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let code = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        };
        let statement = code.trim().strip_suffix(';')?.trim_end();
        let mut tokens = statement.split_whitespace();
        if tokens.next()? != "uniform" {
            return None;
        }
        let mut ty = tokens.next()?;
        if matches!(ty, "lowp" | "mediump" | "highp") {
            ty = tokens.next()?;
        }
        let name = tokens.next()?;
        if tokens.next().is_some() {
            return None;
        }
        Some(Self { ty, name })
    }

    /// True for declarations the compositor replaces with its own bindings.
    pub fn is_standard(&self) -> bool {
        match self.name {
            RESOLUTION_UNIFORM => self.ty == "vec2",
            TIME_UNIFORM => self.ty == "float",
            FRAME_UNIFORM => matches!(self.ty, "float" | "int"),
            name => self.ty == "sampler2D" && parse_channel_name(name).is_some(),
        }
    }

    pub fn channel(&self) -> Option<usize> {
        parse_channel_name(self.name)
    }
}

/// Replaces the contents of `/* ... */` comments with spaces, keeping every newline so
/// line numbers survive. An unterminated comment runs to the end of the source.
pub(crate) fn strip_block_comments(source: &str) -> String {
    let mut stripped = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while let Some(c) = chars.next() {
        if in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
                stripped.push_str("  ");
            } else if c == '\n' {
                stripped.push('\n');
            } else {
                stripped.push(' ');
            }
            continue;
        }
        if in_line_comment {
            in_line_comment = c != '\n';
            stripped.push(c);
            continue;
        }
        if c == '/' {
            match chars.peek() {
                Some('*') => {
                    chars.next();
                    in_block_comment = true;
                    stripped.push_str("  ");
                    continue;
                }
                Some('/') => {
                    chars.next();
                    in_line_comment = true;
                    stripped.push_str("//");
                    continue;
                }
                _ => {}
            }
        }
        stripped.push(c);
    }
    stripped
}

/// Storage qualifier of a classic inter-stage declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VaryingQualifier {
    Varying,
    Attribute,
}

/// One declarator of a `varying` or `attribute` line, e.g. `v_uv` or `v_taps[4]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declarator {
    pub name: String,
    /// The text after the name, such as `[4]`.
    pub suffix: String,
    pub array_len: u32,
}

/// A `varying <type> <name>[, <name>...];` or `attribute ...` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VaryingDecl {
    pub qualifier: VaryingQualifier,
    pub ty: String,
    pub declarators: Vec<Declarator>,
}

impl VaryingDecl {
    pub fn parse(line: &str) -> Option<Self> {
        let code = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        };
        let statement = code.trim().strip_suffix(';')?.trim_end();
        let (keyword, rest) = statement.split_once(char::is_whitespace)?;
        let qualifier = match keyword {
            "varying" => VaryingQualifier::Varying,
            "attribute" => VaryingQualifier::Attribute,
            _ => return None,
        };

        let mut rest = rest.trim_start();
        let (mut ty, mut tail) = rest.split_once(char::is_whitespace)?;
        if matches!(ty, "lowp" | "mediump" | "highp") {
            rest = tail.trim_start();
            (ty, tail) = rest.split_once(char::is_whitespace)?;
        }

        let declarators = tail
            .split(',')
            .map(Declarator::parse)
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            qualifier,
            ty: ty.to_string(),
            declarators,
        })
    }

    /// Interface locations one declarator of this type occupies.
    pub fn location_span(&self, declarator: &Declarator) -> u32 {
        let columns = match self.ty.as_str() {
            "mat2" => 2,
            "mat3" => 3,
            "mat4" => 4,
            _ => 1,
        };
        columns * declarator.array_len
    }
}

impl Declarator {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (name, suffix) = match text.find('[') {
            Some(pos) => (text[..pos].trim_end(), &text[pos..]),
            None => (text, ""),
        };
        let is_identifier = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !is_identifier {
            return None;
        }
        let array_len = if suffix.is_empty() {
            1
        } else {
            suffix
                .strip_prefix('[')?
                .strip_suffix(']')?
                .trim()
                .parse()
                .ok()
                .filter(|&len| len > 0)?
        };
        Some(Self {
            name: name.to_string(),
            suffix: suffix.to_string(),
            array_len,
        })
    }
}
