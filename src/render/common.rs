use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::cloud::PointCloud;

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct CameraParams {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
}

/// Uniform block shared by every point instance.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GlobalUniform {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub transform: [[f32; 4]; 4],
    /// `x` = disk size, `y` = 1.0 when the disk size overrides per-point scales.
    pub disk: [f32; 4],
}

impl GlobalUniform {
    pub fn new(camera: &CameraParams, transform: Mat4, cloud: &PointCloud) -> Self {
        let constant = if cloud.constant_scale() { 1.0 } else { 0.0 };
        Self {
            view: camera.view.to_cols_array_2d(),
            projection: camera.projection.to_cols_array_2d(),
            transform: transform.to_cols_array_2d(),
            disk: [cloud.uniform_scale(), constant, 0.0, 0.0],
        }
    }
}

/// Corner position and uv for one vertex of the point quad.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub corner: [f32; 2],
    pub uv: [f32; 2],
}

pub(crate) const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { corner: [-0.5, -0.5], uv: [0.0, 0.0] },
    QuadVertex { corner: [0.5, -0.5], uv: [1.0, 0.0] },
    QuadVertex { corner: [-0.5, 0.5], uv: [0.0, 1.0] },
    QuadVertex { corner: [0.5, 0.5], uv: [1.0, 1.0] },
];

pub(crate) const QUAD_INDICES: [u32; 6] = [0, 2, 1, 2, 3, 1];
