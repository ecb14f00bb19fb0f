//! vkframe - draws a triangle through a frames-in-flight Vulkan scheduler.

use anyhow::{Context, Result, anyhow};
use tracing::{error, info};

use vkframe_core::{FrameTimer, RendererConfig};
use vkframe_platform::{
    ActiveEventLoop, ApplicationHandler, ControlFlow, EventLoop, Window, WindowEvent, WindowId,
};
use vkframe_renderer::{FrameOutcome, Renderer, RendererError};

struct App {
    config: RendererConfig,
    // Declared before the window: the surface must go first
    renderer: Option<Renderer>,
    window: Option<Window>,
    timer: FrameTimer,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            timer: FrameTimer::default(),
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window =
            Window::new(event_loop, &self.config.window).context("failed to create window")?;
        let renderer =
            Renderer::new(&window, &self.config).context("failed to initialize renderer")?;

        info!(
            "Rendering on {} with {} frame(s) in flight",
            renderer.gpu_name(),
            renderer.frames_in_flight()
        );

        window.request_redraw();
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.failure = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<(), RendererError> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        let outcome = renderer.render_frame()?;
        if let FrameOutcome::Presented { .. } = outcome
            && let Some(fps) = self.timer.frame()
        {
            info!(
                "{:.1} fps ({} frames total)",
                fps,
                self.timer.total_frames()
            );
        }

        if keeps_redrawing(outcome)
            && let Some(window) = &self.window
        {
            window.request_redraw();
        }
        Ok(())
    }
}

/// A skipped frame means the window is minimized; the next `Resized` event
/// restarts the redraw chain.
fn keeps_redrawing(outcome: FrameOutcome) -> bool {
    !matches!(outcome, FrameOutcome::Skipped)
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    let stage = err.stage();
                    self.fail(
                        event_loop,
                        anyhow!(err).context(format!("frame loop stopped at {stage} stage")),
                    );
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Renderer teardown drains the GPU while the window still exists
        self.renderer = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    vkframe_core::init_logging();
    info!("Starting vkframe");

    let config = RendererConfig::from_env().context("invalid VKFRAME_* configuration")?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
