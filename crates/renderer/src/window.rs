use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::window::{Window, WindowBuilder};

use crate::backend::FrameError;
use crate::executor::FrameExecutor;
use crate::gpu::WgpuBackend;
use crate::registry::LayerRegistry;
use crate::runtime::{FramePacer, SystemTimeSource};
use crate::types::{RendererConfig, SurfaceAlpha, SurfaceSize};

/// Everything the event loop drives. Field order is drop order: layer resources go
/// before the device, and the device before the window its surface points at.
struct WindowState {
    registry: LayerRegistry<WgpuBackend>,
    executor: FrameExecutor,
    pacer: FramePacer,
    backend: WgpuBackend,
    window: Arc<Window>,
    running: bool,
    failure: Option<anyhow::Error>,
}

impl WindowState {
    fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self> {
        let size = surface_size(window.inner_size());
        let mut backend = WgpuBackend::new(&*window, size, config.surface_alpha)?;
        let backend_size = backend.surface_size();
        let registry = LayerRegistry::build(
            &mut backend,
            &config.layers,
            &config.layer_options,
            backend_size,
        )
        .with_context(|| format!("failed to load layers from {}", config.shader_dir.display()))?;

        Ok(Self {
            registry,
            executor: FrameExecutor::new(Box::new(SystemTimeSource::new())),
            pacer: FramePacer::new(config.target_fps),
            backend,
            window,
            running: true,
            failure: None,
        })
    }

    fn fail(&mut self, err: anyhow::Error) {
        self.failure.get_or_insert(err);
        self.running = false;
    }

    fn render(&mut self) {
        let now = Instant::now();
        if !self.pacer.ready_for_frame(now) {
            return;
        }

        match self.executor.run_frame(&mut self.registry, &mut self.backend) {
            Ok(_) => self.pacer.mark_rendered(now),
            Err(FrameError::SurfaceLost) => {
                tracing::debug!("surface lost; reconfiguring");
                self.backend.reconfigure_surface();
            }
            Err(FrameError::Timeout) => {
                tracing::warn!("surface timeout; retrying next frame");
            }
            Err(err @ FrameError::OutOfMemory) | Err(err @ FrameError::Resize(_)) => {
                tracing::error!(error = %err, "stopping render loop");
                self.fail(err.into());
            }
            Err(FrameError::Surface(message)) => {
                tracing::warn!(%message, "surface error; retrying next frame");
            }
        }
    }

    fn schedule(&self, elwt: &EventLoopWindowTarget<()>) {
        let now = Instant::now();
        if self.pacer.ready_for_frame(now) {
            self.window.request_redraw();
            elwt.set_control_flow(ControlFlow::Wait);
        } else if let Some(deadline) = self.pacer.next_deadline() {
            tracing::trace!(
                deadline_ms = deadline.saturating_duration_since(now).as_millis(),
                "waiting for next frame"
            );
            elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
        } else {
            elwt.set_control_flow(ControlFlow::Wait);
        }
    }
}

fn surface_size(size: PhysicalSize<u32>) -> SurfaceSize {
    SurfaceSize::new(size.width, size.height)
}

/// Opens the window and renders the layer stack until it is closed.
pub(crate) fn run(config: &RendererConfig) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let (width, height) = config.surface_size;
    let mut builder = WindowBuilder::new()
        .with_title(config.title.clone())
        .with_transparent(config.surface_alpha == SurfaceAlpha::Transparent)
        .with_inner_size(PhysicalSize::new(width.max(1), height.max(1)));
    #[cfg(target_os = "linux")]
    {
        use winit::platform::wayland::WindowBuilderExtWayland;
        builder = WindowBuilderExtWayland::with_name(builder, &config.app_id, &config.app_id);
    }
    let window = builder
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window.clone(), config)
        .context("failed to initialise window renderer")?;
    tracing::info!(
        layers = state.registry.len(),
        size = %state.registry.size(),
        "rendering layer stack"
    );
    window.request_redraw();

    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                state.running = false;
            }
            WindowEvent::Resized(new_size) => {
                state.registry.request_resize(surface_size(new_size));
                state.window.request_redraw();
            }
            WindowEvent::RedrawRequested => state.render(),
            _ => {}
        },
        Event::AboutToWait => {
            if state.running {
                state.schedule(elwt);
            } else {
                elwt.exit();
            }
        }
        _ => {}
    });

    if let Some(err) = state.failure.take() {
        return Err(err);
    }
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}
