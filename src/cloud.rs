use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Channel, PointCloudError, Result};

/// Indices needed to draw one point as a quad made of two triangles.
pub const QUAD_INDEX_COUNT: u32 = 6;

/// Scale used until a per-point array or another uniform value is assigned.
pub const DEFAULT_UNIFORM_SCALE: f32 = 0.03;

/// CPU-side point cloud state consumed by the GPU upload path.
///
/// Every mutation records which derived GPU buffers are stale. The upload
/// side collects those flags with [`PointCloud::take_dirty`] instead of the
/// setters rebuilding anything themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    positions: Vec<Vec3>,
    point_scales: Option<Vec<f32>>,
    uniform_scale: f32,
    constant_scale: bool,
    colors: ColorChannel,
    uniform_color: Vec4,
    dirty: DirtyFlags,
}

/// Color source for every point in the cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColorChannel {
    Uniform(Vec4),
    PerPoint(Vec<Vec4>),
}

/// Set of derived GPU resources that need rebuilding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    /// Position+scale buffer and draw arguments.
    pub positions: bool,
    pub colors: bool,
    /// Uniform block (disk size, constant-scale flag).
    pub uniforms: bool,
}

impl DirtyFlags {
    pub fn any(&self) -> bool {
        self.positions || self.colors || self.uniforms
    }

    fn merge(&mut self, other: DirtyFlags) {
        self.positions |= other.positions;
        self.colors |= other.colors;
        self.uniforms |= other.uniforms;
    }
}

/// Arguments of an indexed indirect draw, laid out as the GPU reads them.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// Axis-aligned bounds of the current positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Radius of the sphere enclosing the box, measured from its center.
    pub fn radius(&self) -> f32 {
        self.extent().length() * 0.5
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            point_scales: None,
            uniform_scale: DEFAULT_UNIFORM_SCALE,
            constant_scale: true,
            colors: ColorChannel::Uniform(Vec4::ONE),
            uniform_color: Vec4::ONE,
            dirty: DirtyFlags::default(),
        }
    }
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn point_scales(&self) -> Option<&[f32]> {
        self.point_scales.as_deref()
    }

    pub fn uniform_scale(&self) -> f32 {
        self.uniform_scale
    }

    /// Whether the shader should ignore per-point scales.
    pub fn constant_scale(&self) -> bool {
        self.constant_scale
    }

    pub fn colors(&self) -> &ColorChannel {
        &self.colors
    }

    /// Replaces every position. Per-point channels that no longer match the
    /// new count fall back to their uniform value.
    pub fn set_positions(&mut self, positions: Vec<Vec3>) {
        let previous = self.positions.len();
        self.positions = positions;
        let count = self.positions.len();
        self.dirty.positions = true;

        if count == previous {
            return;
        }
        // Color buffer length follows the point count.
        self.dirty.colors = true;

        if let Some(scales) = &self.point_scales {
            if scales.len() != count {
                warn!(
                    "dropping {} per-point scales after point count changed to {count}",
                    scales.len()
                );
                self.point_scales = None;
                self.constant_scale = true;
                self.dirty.uniforms = true;
            }
        }
        if let ColorChannel::PerPoint(colors) = &self.colors {
            if colors.len() != count {
                warn!(
                    "dropping {} per-point colors after point count changed to {count}",
                    colors.len()
                );
                self.colors = ColorChannel::Uniform(self.uniform_color);
            }
        }
    }

    /// Replaces every position from an interleaved `x, y, z` array.
    pub fn set_positions_flat(&mut self, data: &[f32]) -> Result<()> {
        if data.len() % 3 != 0 {
            return Err(PointCloudError::FlatLength(data.len()));
        }
        let positions = data
            .chunks_exact(3)
            .map(|xyz| Vec3::new(xyz[0], xyz[1], xyz[2]))
            .collect();
        self.set_positions(positions);
        Ok(())
    }

    /// Mutates positions in place. The point count cannot change.
    pub fn update_positions<F>(&mut self, updater: F)
    where
        F: FnOnce(&mut [Vec3]),
    {
        updater(&mut self.positions);
        self.dirty.positions = true;
    }

    pub fn set_point_scales(&mut self, scales: Vec<f32>) -> Result<()> {
        self.check_len(Channel::Scale, scales.len())?;
        self.point_scales = Some(scales);
        self.constant_scale = false;
        self.dirty.positions = true;
        self.dirty.uniforms = true;
        Ok(())
    }

    pub fn set_uniform_scale(&mut self, scale: f32) {
        self.uniform_scale = scale;
        self.constant_scale = true;
        self.dirty.uniforms = true;
    }

    /// Assigns one RGB color per point, with alpha fixed at 1.
    ///
    /// A length that differs from the point count is rejected and the
    /// current colors stay in place.
    pub fn set_point_colors(&mut self, colors: Vec<Vec3>) -> Result<()> {
        self.check_len(Channel::Color, colors.len())?;
        self.colors = ColorChannel::PerPoint(colors.into_iter().map(|c| c.extend(1.0)).collect());
        self.dirty.colors = true;
        Ok(())
    }

    pub fn set_uniform_color(&mut self, color: Vec4) {
        self.uniform_color = color;
        self.colors = ColorChannel::Uniform(color);
        self.dirty.colors = true;
    }

    /// Positions packed as `xyz` plus the scale the point would use with
    /// per-point scaling enabled.
    pub fn packed_positions(&self) -> Vec<[f32; 4]> {
        let scales = self
            .point_scales
            .as_deref()
            .filter(|scales| scales.len() == self.positions.len());
        self.positions
            .iter()
            .enumerate()
            .map(|(index, point)| {
                let scale = scales.map_or(self.uniform_scale, |scales| scales[index]);
                point.extend(scale).to_array()
            })
            .collect()
    }

    /// One RGBA color per point; a uniform color is expanded to every point.
    pub fn packed_colors(&self) -> Vec<[f32; 4]> {
        match &self.colors {
            ColorChannel::Uniform(color) => vec![color.to_array(); self.positions.len()],
            ColorChannel::PerPoint(colors) => colors.iter().map(|c| c.to_array()).collect(),
        }
    }

    pub fn draw_args(&self) -> DrawArgs {
        DrawArgs {
            index_count: QUAD_INDEX_COUNT,
            instance_count: self.positions.len() as u32,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let (first, rest) = self.positions.split_first()?;
        let (min, max) = rest
            .iter()
            .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Bounds { min, max })
    }

    /// Returns the pending dirty set and clears it.
    pub fn take_dirty(&mut self) -> DirtyFlags {
        std::mem::take(&mut self.dirty)
    }

    /// Pending dirty set, left in place.
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    /// Re-queues flags that could not be consumed, e.g. after a failed upload.
    pub fn mark_dirty(&mut self, flags: DirtyFlags) {
        self.dirty.merge(flags);
    }

    fn check_len(&self, channel: Channel, actual: usize) -> Result<()> {
        let expected = self.positions.len();
        if actual != expected {
            return Err(PointCloudError::LengthMismatch {
                channel,
                expected,
                actual,
            });
        }
        Ok(())
    }
}
