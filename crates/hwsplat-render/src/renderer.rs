//! Windowed renderer: orchestrated frame, then a blit to the surface

use std::sync::Arc;

use hwsplat_raster::{FrameReport, GaussianStore, OrbitCamera, RenderSettings};
use winit::window::Window;

use crate::blit::BlitPass;
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::headless::request_device;
use crate::orchestrator::FrameOrchestrator;

pub struct Renderer {
    // WGPU state
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    context: RenderContext,
    orchestrator: FrameOrchestrator,
    blit: BlitPass,

    // State
    pub camera: OrbitCamera,
    pub settings: RenderSettings,
    last_report: FrameReport,
}

impl Renderer {
    pub async fn new(window: Arc<Window>, store: &GaussianStore, settings: RenderSettings) -> RenderResult<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        tracing::info!("Using adapter: {:?}", adapter.get_info().name);

        let (device, queue) = request_device(&adapter, "hwsplat device").await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .ok_or(RenderError::NoSurfaceFormat)?;

        tracing::info!("Window inner_size: {}x{}", size.width, size.height);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        tracing::info!("Configuring surface: {}x{}", config.width, config.height);
        surface.configure(&device, &config);

        let context = RenderContext::new(&device, store, config.width, config.height);
        let orchestrator = FrameOrchestrator::new(&device);
        let blit = BlitPass::new(&device, surface_format);

        let camera = store
            .bounds()
            .map(|(min, max)| OrbitCamera::fit_bounds(min, max))
            .unwrap_or_default();

        Ok(Self {
            surface,
            device,
            queue,
            config,
            context,
            orchestrator,
            blit,
            camera,
            settings,
            last_report: FrameReport::new(),
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            tracing::info!("Resizing to {}x{}", new_size.width, new_size.height);
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.context.resize(&self.device, new_size.width, new_size.height);
        }
    }

    /// Render and present one frame
    ///
    /// A lost or outdated surface is reconfigured and the frame skipped; any
    /// other surface error is returned.
    pub fn render(&mut self) -> RenderResult<()> {
        let (width, height) = self.context.dimensions();
        let camera = self.camera.frame(width, height);
        self.last_report = self.orchestrator.render(
            &self.device,
            &self.queue,
            &mut self.context,
            &camera,
            &self.settings,
        )?;

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(e @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                tracing::warn!("Surface {:?}, reconfiguring", e);
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Blit Encoder"),
        });
        self.blit.record(
            &self.device,
            &self.queue,
            &mut encoder,
            &self.context,
            self.settings.depth_order(),
            &view,
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    /// Apply a settings change from the control surface
    pub fn update_settings(&mut self, f: impl FnOnce(&mut RenderSettings)) {
        f(&mut self.settings);
        self.settings = self.settings.clone().sanitized();
        tracing::info!("Settings: {:?}", self.settings);
    }

    pub fn get_info(&self) -> String {
        format!(
            "Gaussians: {} | Visible: {} | {} | {} | {:.2} ms",
            self.context.num_gaussians(),
            self.last_report.visible_count,
            if self.settings.front_to_back { "front-to-back" } else { "back-to-front" },
            if self.settings.software_blending { "interlocked" } else { "hardware" },
            self.last_report.total().as_secs_f64() * 1e3,
        )
    }
}
