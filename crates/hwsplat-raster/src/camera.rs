//! Per-frame camera parameters

use glam::{Mat4, Vec2, Vec3, Vec4};
use std::f32::consts::PI;

/// Half turn about +x
///
/// Scenes exported by common 3DGS training pipelines store +y pointing down;
/// applying this before the view transform shows them upright.
pub const UPRIGHT_FLIP: Mat4 = Mat4::from_cols(Vec4::X, Vec4::NEG_Y, Vec4::NEG_Z, Vec4::W);

/// Focal length in pixels for a field of view spanning `pixels`
#[inline]
pub fn fov_to_focal(fov: f32, pixels: f32) -> f32 {
    pixels / (2.0 * (fov * 0.5).tan())
}

/// Everything the pipeline needs to know about the camera for one frame
///
/// View space is right-handed and looks down -z; depth is the positive
/// distance along the viewing axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameCamera {
    pub view: Mat4,
    pub proj: Mat4,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
    /// Horizontal field of view in radians
    pub fov_x: f32,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub width: u32,
    pub height: u32,
}

impl FrameCamera {
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        near: f32,
        far: f32,
        width: u32,
        height: u32,
    ) -> Self {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let fov_x = 2.0 * ((fov_y * 0.5).tan() * aspect).atan();
        Self {
            view: Mat4::look_at_rh(eye, target, up),
            proj: Mat4::perspective_rh(fov_y, aspect, near, far),
            position: eye,
            near,
            far,
            fov_x,
            fov_y,
            width,
            height,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    pub fn focal_x(&self) -> f32 {
        fov_to_focal(self.fov_x, self.width as f32)
    }

    pub fn focal_y(&self) -> f32 {
        fov_to_focal(self.fov_y, self.height as f32)
    }

    #[inline]
    pub fn view_position(&self, world: Vec3) -> Vec3 {
        self.view.transform_point3(world)
    }

    /// Positive distance along the viewing axis
    #[inline]
    pub fn depth(&self, world: Vec3) -> f32 {
        -self.view_position(world).z
    }

    /// Project a world point to pixel coordinates (origin top-left, y down)
    ///
    /// Returns `None` for points on or behind the camera plane.
    pub fn project_to_screen(&self, world: Vec3) -> Option<Vec2> {
        let clip = self.proj * self.view * world.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(Vec2::new(
            (ndc.x * 0.5 + 0.5) * self.width as f32,
            (1.0 - (ndc.y * 0.5 + 0.5)) * self.height as f32,
        ))
    }

    /// Same camera looking at the scene turned by [`UPRIGHT_FLIP`]
    ///
    /// `position` stays in scene coordinates, so view-dependent color sees
    /// the direction the flipped view implies.
    pub fn flipped_upright(self) -> Self {
        Self {
            view: self.view * UPRIGHT_FLIP,
            position: UPRIGHT_FLIP.transform_point3(self.position),
            ..self
        }
    }

    /// Same camera with a new framebuffer size
    pub fn resized(&self, width: u32, height: u32) -> Self {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        Self {
            proj: Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far),
            fov_x: 2.0 * ((self.fov_y * 0.5).tan() * aspect).atan(),
            width,
            height,
            ..*self
        }
    }
}

/// Minimal orbit camera around a target point
#[derive(Clone, Debug)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    /// Azimuth in radians
    pub theta: f32,
    /// Elevation in radians
    pub phi: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Show the scene turned by [`UPRIGHT_FLIP`]; orbit parameters then live
    /// in the flipped frame
    pub flip_scene: bool,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 3.0,
            theta: 0.0,
            phi: 0.0,
            fov_y: PI / 4.0,
            near: 0.001,
            far: 100.0,
            flip_scene: false,
        }
    }
}

impl OrbitCamera {
    /// Frame the given bounds so the whole scene is in view
    pub fn fit_bounds(min: Vec3, max: Vec3) -> Self {
        let center = (min + max) * 0.5;
        let radius = ((max - min).length() * 0.5).max(1e-3);
        let mut camera = Self {
            target: center,
            ..Default::default()
        };
        camera.distance = radius / (camera.fov_y * 0.5).sin();
        camera.far = (camera.distance + radius) * 4.0;
        camera
    }

    /// Toggle [`OrbitCamera::flip_scene`], keeping the same scene point as target
    pub fn toggle_flip(&mut self) {
        self.flip_scene = !self.flip_scene;
        self.target = UPRIGHT_FLIP.transform_point3(self.target);
    }

    pub fn eye(&self) -> Vec3 {
        let dir = Vec3::new(
            self.phi.cos() * self.theta.sin(),
            self.phi.sin(),
            self.phi.cos() * self.theta.cos(),
        );
        self.target + dir * self.distance
    }

    pub fn orbit(&mut self, d_theta: f32, d_phi: f32) {
        let limit = 89.0_f32.to_radians();
        self.theta = (self.theta + d_theta) % (2.0 * PI);
        self.phi = (self.phi + d_phi).clamp(-limit, limit);
    }

    pub fn zoom(&mut self, scroll: f32) {
        self.distance = (self.distance * (1.0 - 0.1 * scroll)).max(self.near * 10.0);
    }

    pub fn frame(&self, width: u32, height: u32) -> FrameCamera {
        let camera = FrameCamera::look_at(
            self.eye(),
            self.target,
            Vec3::Y,
            self.fov_y,
            self.near,
            self.far,
            width,
            height,
        );
        if self.flip_scene {
            camera.flipped_upright()
        } else {
            camera
        }
    }
}
