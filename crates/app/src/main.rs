//! tilegpu - tile-map sprite viewer.
//!
//! Opens a window, loads an optional level and draws it every frame.
//!
//! Keys:
//! - `Escape` quits
//! - `F11` toggles borderless fullscreen
//! - `M` shows or hides the menu overlay
//! - Arrow keys move the overlay

mod cli;
mod overlay;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent};
use winit::event_loop::ControlFlow;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use tilegpu_core::{EngineConfig, LogLevel, init_logging};
use tilegpu_platform::{ActiveEventLoop, EventLoop, Window, WindowEvent, required_extensions};
use tilegpu_renderer::Renderer;

use crate::cli::Cli;
use crate::overlay::{Overlay, STEP};

struct App {
    config: EngineConfig,
    log_level: LogLevel,
    // Field order matters: the renderer must drop before the window.
    renderer: Option<Renderer>,
    window: Option<Window>,
    overlay: Overlay,
    /// First fatal error; returned from `main` after the loop exits.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig, log_level: LogLevel) -> Self {
        Self {
            config,
            log_level,
            renderer: None,
            window: None,
            overlay: Overlay::default(),
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(
            event_loop,
            &self.config.window_title,
            self.config.window_size,
        )?;
        let extensions = required_extensions(event_loop)?;
        let validation = self.config.validation_enabled(self.log_level);

        let mut renderer = Renderer::new(&window, &extensions, &self.config, validation)?;

        if let Some(level) = &self.config.level {
            renderer
                .load_level(level)
                .with_context(|| format!("failed to load level {}", level.display()))?;
            debug!("{} objects live after level load", renderer.object_count());
        }

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        event_loop.exit();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode) -> Result<()> {
        let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) else {
            return Ok(());
        };

        let offset = match key {
            KeyCode::Escape => {
                info!("Escape pressed, shutting down");
                event_loop.exit();
                return Ok(());
            }
            KeyCode::F11 => {
                window.toggle_fullscreen();
                renderer.mark_swapchain_stale();
                return Ok(());
            }
            KeyCode::KeyM => {
                let visible = self.overlay.toggle(renderer)?;
                info!("Menu overlay {}", if visible { "shown" } else { "hidden" });
                return Ok(());
            }
            KeyCode::ArrowLeft => Vec2::new(-STEP, 0.0),
            KeyCode::ArrowRight => Vec2::new(STEP, 0.0),
            KeyCode::ArrowUp => Vec2::new(0.0, -STEP),
            KeyCode::ArrowDown => Vec2::new(0.0, STEP),
            _ => return Ok(()),
        };

        self.overlay.nudge(renderer, offset)?;
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) else {
            return Ok(());
        };
        renderer.render_frame(window.drawable_size())?;
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => self.fail(event_loop, e.context("initialization failed")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.mark_swapchain_stale();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat,
                        ..
                    },
                ..
            } => {
                // Only arrow keys auto-repeat
                let is_arrow = matches!(
                    key,
                    KeyCode::ArrowLeft | KeyCode::ArrowRight | KeyCode::ArrowUp | KeyCode::ArrowDown
                );
                if repeat && !is_arrow {
                    return;
                }
                if let Err(e) = self.handle_key(event_loop, key) {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

/// Loads the configuration named on the command line, or the defaults.
fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(level) = &cli.level {
        config.level = Some(level.clone());
    }

    let log_level = cli.log_level().unwrap_or(config.log_level);
    init_logging(log_level);
    info!("Starting tilegpu (log level {})", log_level);
    if cli.config.is_none() {
        debug!("No --config given, using built-in defaults");
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, log_level);
    event_loop.run_app(&mut app)?;

    // Tear down GPU state before the window goes away
    if let Some(renderer) = app.renderer.as_mut() {
        if let Err(e) = renderer.destroy_all_objects() {
            warn!("Failed to release objects on shutdown: {}", e);
        }
    }
    app.renderer = None;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
