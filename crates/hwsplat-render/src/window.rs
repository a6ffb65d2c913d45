//! Window management and input handling

use crate::renderer::Renderer;
use hwsplat_raster::{GaussianStore, RenderSettings};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};
use std::sync::Arc;

/// Radians of orbit per pixel of drag
const ORBIT_SPEED: f32 = 0.005;

pub struct App {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    store: GaussianStore,
    settings: RenderSettings,

    // Input state
    dragging: bool,
    last_cursor: Option<PhysicalPosition<f64>>,

    /// Set when the event loop has to stop on an error
    fatal: Option<anyhow::Error>,
}

impl App {
    pub fn new(store: GaussianStore, settings: RenderSettings) -> Self {
        Self {
            window: None,
            renderer: None,
            store,
            settings,
            dragging: false,
            last_cursor: None,
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        tracing::error!("{:#}", error);
        self.fatal = Some(error);
        event_loop.exit();
    }

    fn handle_key(&mut self, key: KeyCode) {
        let Some(r) = &mut self.renderer else {
            return;
        };
        match key {
            KeyCode::KeyF => r.camera.toggle_flip(),
            KeyCode::KeyQ => r.update_settings(|s| s.render_quads = !s.render_quads),
            KeyCode::KeyP => r.update_settings(|s| s.render_points = !s.render_points),
            KeyCode::KeyB => r.update_settings(|s| s.front_to_back = !s.front_to_back),
            KeyCode::KeyI => r.update_settings(|s| s.software_blending = !s.software_blending),
            KeyCode::KeyA => r.update_settings(|s| s.antialiasing = !s.antialiasing),
            KeyCode::Equal => r.update_settings(|s| s.scale_modifier *= 1.25),
            KeyCode::Minus => r.update_settings(|s| s.scale_modifier /= 1.25),
            KeyCode::BracketRight => r.update_settings(|s| s.min_opacity += 0.01),
            KeyCode::BracketLeft => r.update_settings(|s| s.min_opacity -= 0.01),
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title("hwsplat")
            .with_inner_size(PhysicalSize::new(1280, 720));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.into()),
        };

        let renderer = pollster::block_on(Renderer::new(
            Arc::clone(&window),
            &self.store,
            self.settings.clone(),
        ));
        match renderer {
            Ok(renderer) => {
                self.window = Some(window);
                self.renderer = Some(renderer);
            }
            Err(e) => self.fail(event_loop, e.into()),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(size);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let (PhysicalKey::Code(key), ElementState::Pressed) = (event.physical_key, event.state) {
                    if key == KeyCode::Escape {
                        event_loop.exit();
                    } else {
                        self.handle_key(key);
                    }
                }
            }

            WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                self.dragging = state == ElementState::Pressed;
            }

            WindowEvent::CursorMoved { position, .. } => {
                if let (true, Some(last), Some(renderer)) = (self.dragging, self.last_cursor, &mut self.renderer) {
                    let dx = (position.x - last.x) as f32;
                    let dy = (position.y - last.y) as f32;
                    renderer.camera.orbit(-dx * ORBIT_SPEED, dy * ORBIT_SPEED);
                }
                self.last_cursor = Some(position);
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 50.0,
                };
                if let Some(renderer) = &mut self.renderer {
                    renderer.camera.zoom(scroll);
                }
            }

            WindowEvent::RedrawRequested => {
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                let result = renderer.render();
                let info = renderer.get_info();
                if let Err(e) = result {
                    return self.fail(event_loop, e.into());
                }

                // Update title with info
                if let Some(window) = &self.window {
                    window.set_title(&format!("hwsplat | {}", info));
                }

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }
}

/// Run the windowed viewer until the window closes or rendering fails
pub fn run(store: GaussianStore, settings: RenderSettings) -> anyhow::Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(store, settings);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
