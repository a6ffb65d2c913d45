//! GPU resources for one scene and one output size
//!
//! Everything a frame touches lives here, created from the gaussian count at
//! load time and from the viewport size on resize. Passes receive buffer
//! handles through bind groups; nothing else holds GPU memory.

use hwsplat_raster::sort::next_pow2;
use hwsplat_raster::{FrameUniforms, GaussianStore, SlotParams, BlitParams};
use wgpu::util::DeviceExt;

/// Output image format shared by both compositing strategies
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Depth format for the point path
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const VEC4_BYTES: u64 = 16;
const SCALAR_BYTES: u64 = 4;

fn storage_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        // zero-length bindings are invalid
        size: size.max(VEC4_BYTES),
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

fn storage_init(device: &wgpu::Device, label: &str, contents: &[u8]) -> wgpu::Buffer {
    if contents.is_empty() {
        return storage_buffer(device, label, 0);
    }
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
    })
}

fn uniform_buffer(device: &wgpu::Device, label: &str, size: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Immutable activated attributes, one entry per gaussian
pub struct SceneBuffers {
    pub positions: wgpu::Buffer,
    pub scales: wgpu::Buffer,
    pub rotations: wgpu::Buffer,
    pub opacities: wgpu::Buffer,
    pub sh_coeffs: wgpu::Buffer,
    pub num_gaussians: u32,
}

impl SceneBuffers {
    pub fn upload(device: &wgpu::Device, store: &GaussianStore) -> Self {
        Self {
            positions: storage_init(device, "Positions", bytemuck::cast_slice(&store.positions)),
            scales: storage_init(device, "Scales", bytemuck::cast_slice(&store.scales)),
            rotations: storage_init(device, "Rotations", bytemuck::cast_slice(&store.rotations)),
            opacities: storage_init(device, "Opacities", bytemuck::cast_slice(&store.opacities)),
            sh_coeffs: storage_init(device, "SH Coefficients", bytemuck::cast_slice(&store.sh_coeffs)),
            num_gaussians: store.len() as u32,
        }
    }
}

/// Per-frame intermediates, sized for the worst case (every gaussian visible)
pub struct FrameBuffers {
    /// Atomic visible counter, read back once per frame
    pub visible_count: wgpu::Buffer,
    pub visible_indices: wgpu::Buffer,
    pub visible_depths: wgpu::Buffer,
    /// Power-of-two padded sort arrays
    pub keys: wgpu::Buffer,
    pub values: wgpu::Buffer,
    pub sorted_indices: wgpu::Buffer,
    pub sorted_depths: wgpu::Buffer,
    pub bounding_boxes: wgpu::Buffer,
    pub conic_opacity: wgpu::Buffer,
    pub oriented_boxes: wgpu::Buffer,
    /// Sorted slot of the selected gaussian, written by the sort gather
    pub selected_slot: wgpu::Buffer,
    /// Per sorted slot (quad path)
    pub colors: wgpu::Buffer,
    /// Per gaussian (point path)
    pub point_colors: wgpu::Buffer,
}

impl FrameBuffers {
    pub fn new(device: &wgpu::Device, num_gaussians: u32) -> Self {
        let n = num_gaussians as u64;
        let padded = next_pow2(num_gaussians) as u64;
        Self {
            visible_count: storage_buffer(device, "Visible Count", SCALAR_BYTES),
            visible_indices: storage_buffer(device, "Visible Indices", n * SCALAR_BYTES),
            visible_depths: storage_buffer(device, "Visible Depths", n * SCALAR_BYTES),
            keys: storage_buffer(device, "Sort Keys", padded * SCALAR_BYTES),
            values: storage_buffer(device, "Sort Values", padded * SCALAR_BYTES),
            sorted_indices: storage_buffer(device, "Sorted Indices", n * SCALAR_BYTES),
            sorted_depths: storage_buffer(device, "Sorted Depths", n * SCALAR_BYTES),
            bounding_boxes: storage_buffer(device, "Bounding Boxes", n * VEC4_BYTES),
            conic_opacity: storage_buffer(device, "Conic Opacity", n * VEC4_BYTES),
            oriented_boxes: storage_buffer(device, "Oriented Boxes", n * VEC4_BYTES),
            selected_slot: storage_buffer(device, "Selected Slot", SCALAR_BYTES),
            colors: storage_buffer(device, "Slot Colors", n * VEC4_BYTES),
            point_colors: storage_buffer(device, "Point Colors", n * VEC4_BYTES),
        }
    }
}

/// Size-dependent targets, re-created on resize
pub struct RenderTargets {
    pub output_texture: wgpu::Texture,
    pub output_view: wgpu::TextureView,
    pub depth_texture: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    /// Directly addressable accumulation image for the interlocked compositor
    pub image: wgpu::Buffer,
    pub width: u32,
    pub height: u32,
}

impl RenderTargets {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let output_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Splat Output Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let output_view = output_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Point Depth Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let image = storage_buffer(
            device,
            "Accumulation Image",
            width as u64 * height as u64 * VEC4_BYTES,
        );

        Self {
            output_texture,
            output_view,
            depth_texture,
            depth_view,
            image,
            width,
            height,
        }
    }
}

/// All GPU state for rendering one scene
pub struct RenderContext {
    pub scene: SceneBuffers,
    pub buffers: FrameBuffers,
    pub targets: RenderTargets,
    pub frame_uniforms: wgpu::Buffer,
    pub slots: wgpu::Buffer,
    pub blit_params: wgpu::Buffer,
}

impl RenderContext {
    pub fn new(device: &wgpu::Device, store: &GaussianStore, width: u32, height: u32) -> Self {
        let scene = SceneBuffers::upload(device, store);
        let buffers = FrameBuffers::new(device, scene.num_gaussians);
        let targets = RenderTargets::new(device, width, height);

        tracing::info!(
            "Render context: {} gaussians, {}x{} output",
            scene.num_gaussians,
            targets.width,
            targets.height
        );

        Self {
            scene,
            buffers,
            targets,
            frame_uniforms: uniform_buffer(device, "Frame Uniforms", FrameUniforms::SIZE),
            slots: uniform_buffer(device, "Slot Params", SlotParams::SIZE),
            blit_params: uniform_buffer(device, "Blit Params", BlitParams::SIZE),
        }
    }

    /// Replace the scene; derived buffers follow the new gaussian count
    pub fn load_scene(&mut self, device: &wgpu::Device, store: &GaussianStore) {
        self.scene = SceneBuffers::upload(device, store);
        self.buffers = FrameBuffers::new(device, self.scene.num_gaussians);
        tracing::info!("Loaded scene with {} gaussians", self.scene.num_gaussians);
    }

    /// Re-create the output image and depth texture; the old ones are dropped
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if width == self.targets.width && height == self.targets.height {
            return;
        }
        self.targets = RenderTargets::new(device, width, height);
        tracing::info!("Resized output to {}x{}", width, height);
    }

    pub fn num_gaussians(&self) -> u32 {
        self.scene.num_gaussians
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.targets.width, self.targets.height)
    }

    pub fn output_texture(&self) -> &wgpu::Texture {
        &self.targets.output_texture
    }

    pub fn output_view(&self) -> &wgpu::TextureView {
        &self.targets.output_view
    }
}
