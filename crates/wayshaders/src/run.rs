//! Wires CLI input, the settings file and layer discovery into a `RendererConfig`.

use anyhow::{bail, Context, Result};
use renderer::{
    discover_sources, fragment_file_name, LayerOptions, LayerSource, Renderer, RendererConfig,
    SurfaceAlpha,
};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::SettingsStore;
use crate::cli::Cli;

/// Window title; the settings `class` only names the Wayland app id.
pub const WINDOW_TITLE: &str = "wayshaders";

pub fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    let mut store = SettingsStore::open(&config_path)?;

    let (debug_setting, debug_warning) = store.debug();
    initialise_tracing(cli.debug || debug_setting);
    if let Some(warning) = debug_warning {
        tracing::warn!("{warning}; debug logging stays off");
    }
    tracing::debug!(path = %store.path().display(), "resolved settings file");

    let class = store.class();
    let layers = discover_sources(&cli.dir)
        .with_context(|| format!("failed to scan {} for shaders", cli.dir.display()))?;
    let layer_options = store.layer_options(layers.len());
    store.persist()?;

    if layers.is_empty() {
        bail!(
            "no shaders found in {}; expected at least {}",
            cli.dir.display(),
            fragment_file_name(0)
        );
    }
    tracing::info!(
        dir = %cli.dir.display(),
        layers = layers.len(),
        "loaded shader sources"
    );

    Renderer::new(renderer_config(cli, class, layers, layer_options)).run()
}

fn renderer_config(
    cli: Cli,
    class: String,
    layers: Vec<LayerSource>,
    layer_options: Vec<LayerOptions>,
) -> RendererConfig {
    RendererConfig {
        surface_size: cli.size,
        title: WINDOW_TITLE.to_string(),
        app_id: class,
        shader_dir: cli.dir,
        layers,
        layer_options,
        surface_alpha: SurfaceAlpha::Transparent,
        target_fps: cli.fps.filter(|fps| *fps > 0.0),
    }
}

pub fn initialise_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
