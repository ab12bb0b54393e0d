use std::sync::Arc;
use std::time::Duration;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};
use crate::renderer::clock::SystemClock;
use crate::renderer::config::RenderConfig;
use crate::renderer::{FrameStatus, PresentationSurface, Renderer};

const WINDOW_TITLE: &str = "orrery";
const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;

/// What the event handlers have observed since the flags were last read
#[derive(Default)]
struct WindowState {
    window: Option<Arc<Window>>,
    window_error: Option<winit::error::OsError>,
    resized: bool,
    close_requested: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT));
        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => self.window_error = Some(e),
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().is_none_or(|window| window.id() != window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                self.resized = true;
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                self.close_requested = true;
            }
            _ => {}
        }
    }
}

/// The window as the renderer sees it, with events pumped on demand
struct PumpedSurface<'a> {
    event_loop: &'a mut EventLoop<()>,
    state: &'a mut WindowState,
}

impl PresentationSurface for PumpedSurface<'_> {
    fn drawable_extent(&self) -> vk::Extent2D {
        self.state.window.as_ref().map_or(vk::Extent2D::default(), |window| {
            let size = window.inner_size();
            vk::Extent2D {
                width: size.width,
                height: size.height,
            }
        })
    }

    fn wait_events(&mut self) -> bool {
        if self.state.close_requested {
            return false;
        }
        let status = self.event_loop.pump_app_events(None, &mut *self.state);
        !matches!(status, PumpStatus::Exit(_)) && !self.state.close_requested
    }

    fn was_resized(&self) -> bool {
        self.state.resized
    }

    fn reset_resized(&mut self) {
        self.state.resized = false;
    }
}

pub struct App {
    event_loop: EventLoop<()>,
    state: WindowState,
    config: RenderConfig,
    clock: SystemClock,
}

impl App {
    pub fn new(config: RenderConfig) -> Result<Self> {
        let event_loop = EventLoop::new()?;

        Ok(Self {
            event_loop,
            state: WindowState::default(),
            config,
            clock: SystemClock::new(),
        })
    }

    pub fn run(mut self) -> Result<()> {
        let Some(window) = self.wait_for_window()? else {
            return Ok(());
        };

        let mut renderer = Renderer::new(
            &window,
            &mut PumpedSurface {
                event_loop: &mut self.event_loop,
                state: &mut self.state,
            },
            self.config.clone(),
        )?;

        let mut frames: u64 = 0;
        loop {
            let status = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.state);
            if matches!(status, PumpStatus::Exit(_)) || self.state.close_requested {
                break;
            }

            let mut surface = PumpedSurface {
                event_loop: &mut self.event_loop,
                state: &mut self.state,
            };
            match renderer.draw_frame(&mut surface, &self.clock)? {
                FrameStatus::Presented => frames += 1,
                FrameStatus::Skipped => {}
                FrameStatus::Closed => break,
            }
        }

        log::info!("Presented {} frames", frames);
        renderer.wait_idle()
    }

    /// Pumps events until the platform has created the window
    fn wait_for_window(&mut self) -> Result<Option<Arc<Window>>> {
        loop {
            if let Some(e) = self.state.window_error.take() {
                return Err(eyre!("Failed to create window: {}", e));
            }
            if let Some(window) = &self.state.window {
                return Ok(Some(window.clone()));
            }
            if let PumpStatus::Exit(_) = self.event_loop.pump_app_events(None, &mut self.state) {
                return Ok(None);
            }
        }
    }
}
