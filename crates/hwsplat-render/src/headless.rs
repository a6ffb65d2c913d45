//! Headless renderer (no window)

use hwsplat_raster::{BlendEquation, FrameCamera, FrameReport, GaussianStore, RenderSettings};

use crate::capture::{CapturedFrame, FrameCapture};
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::orchestrator::FrameOrchestrator;

/// Headless renderer configuration
#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Request a device whose buffer limits follow the adapter
///
/// Scene buffers grow with the gaussian count, so the default 128 MiB
/// storage binding limit is raised to whatever the adapter allows.
pub(crate) async fn request_device(
    adapter: &wgpu::Adapter,
    label: &str,
) -> RenderResult<(wgpu::Device, wgpu::Queue)> {
    let supported = adapter.limits();
    let required_limits = wgpu::Limits {
        max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
        max_buffer_size: supported.max_buffer_size,
        ..wgpu::Limits::default()
    };

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: Default::default(),
            },
            None,
        )
        .await?;
    Ok((device, queue))
}

/// Renders frames into an offscreen image and reads them back
pub struct HeadlessRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    context: RenderContext,
    orchestrator: FrameOrchestrator,
    capture: FrameCapture,
    config: HeadlessConfig,
}

impl HeadlessRenderer {
    pub async fn new(config: HeadlessConfig, store: &GaussianStore) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless!
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        tracing::info!("Using adapter: {:?}", adapter.get_info().name);

        let (device, queue) = request_device(&adapter, "hwsplat headless").await?;

        let context = RenderContext::new(&device, store, config.width, config.height);
        let orchestrator = FrameOrchestrator::new(&device);
        let (width, height) = context.dimensions();
        let capture = FrameCapture::new(&device, width, height);

        Ok(Self {
            device,
            queue,
            context,
            orchestrator,
            capture,
            config,
        })
    }

    /// Render one frame without reading it back
    ///
    /// The output follows the camera size, so a camera that differs from the
    /// current config resizes the renderer.
    pub fn render_frame(&mut self, camera: &FrameCamera, settings: &RenderSettings) -> RenderResult<FrameReport> {
        let report = self
            .orchestrator
            .render(&self.device, &self.queue, &mut self.context, camera, settings)?;
        let (width, height) = self.context.dimensions();
        self.config.width = width;
        self.config.height = height;
        Ok(report)
    }

    /// Render one frame and read back the resolved image
    pub fn render(
        &mut self,
        camera: &FrameCamera,
        settings: &RenderSettings,
    ) -> RenderResult<(FrameReport, CapturedFrame)> {
        let report = self.render_frame(camera, settings)?;
        let frame = self.capture.capture(
            &self.device,
            &self.queue,
            &self.context,
            BlendEquation::new(settings.depth_order()),
        )?;
        Ok((report, frame))
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(&self.device, width, height);
        let (width, height) = self.context.dimensions();
        self.config.width = width;
        self.config.height = height;
    }

    pub fn load_scene(&mut self, store: &GaussianStore) {
        self.context.load_scene(&self.device, store);
    }

    pub fn config(&self) -> &HeadlessConfig {
        &self.config
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }
}
