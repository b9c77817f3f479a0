use std::path::PathBuf;

use clap::Parser;

const LAYER_HELP: &str = "\
Layers are read from DIR as shader0.frag, shader1.frag, ... up to the first missing
number. Each may have a matching shader<n>.vert. A layer declaring
`uniform sampler2D u_sampler<c>;` reads layer c's previous output (c <= n); reading
u_sampler<n> gives the layer feedback. Standard uniforms: u_resolution, u_time, u_frame.";

#[derive(Parser, Debug)]
#[command(
    name = "wayshaders",
    author,
    version,
    about = "Composite a numbered stack of GLSL layers in a transparent window",
    after_help = LAYER_HELP
)]
pub struct Cli {
    /// Directory containing shader<n>.frag / shader<n>.vert sources.
    #[arg(long, env = "WAYSHADERS_DIR", value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Settings file (defaults to DIR/wayshaders.conf).
    #[arg(long, env = "WAYSHADERS_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Initial window size in physical pixels.
    #[arg(
        long,
        value_name = "WIDTHxHEIGHT",
        value_parser = parse_surface_size,
        default_value = "700x400"
    )]
    pub size: (u32, u32),

    /// Verbose logging; equivalent to `debug = 1` in the settings file.
    #[arg(long)]
    pub debug: bool,

    /// Optional FPS cap (0 = uncapped).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.dir.join(crate::bootstrap::SETTINGS_FILE_NAME))
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32), String> {
    let (width, height) = spec
        .trim()
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1920x1080".to_string())?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size specification".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size specification".to_string())?;
    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}
