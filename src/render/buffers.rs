//! GPU-side mirror of a [`PointCloud`].
//!
//! [`PointBuffers`] owns the position+scale, color and draw-argument buffers
//! and rebuilds them from the cloud's dirty flags. Buffers are released
//! exactly once, either explicitly or when the set is dropped, which also
//! covers a rebuild that failed halfway.

use log::debug;

use crate::cloud::{DirtyFlags, PointCloud};
use crate::error::Result;

/// Role of a buffer, which decides its usage flags on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Storage,
    Indirect,
    Uniform,
}

/// Allocation primitives the upload path needs from a device.
pub trait BufferDevice {
    type Buffer;

    fn create_buffer(&self, label: &str, kind: BufferKind, contents: &[u8]) -> Result<Self::Buffer>;

    fn release(&self, buffer: Self::Buffer);
}

/// Which buffers a [`PointBuffers::sync`] call rebuilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub positions: bool,
    pub colors: bool,
    pub uniforms: bool,
}

impl SyncReport {
    pub fn bindings_changed(&self) -> bool {
        self.positions || self.colors
    }
}

pub const POSITIONS_LABEL: &str = "point-positions";
pub const COLORS_LABEL: &str = "point-colors";
pub const ARGS_LABEL: &str = "point-draw-args";

pub struct PointBuffers<D: BufferDevice> {
    device: D,
    positions: Option<D::Buffer>,
    colors: Option<D::Buffer>,
    args: Option<D::Buffer>,
    instance_count: u32,
}

impl<D: BufferDevice> PointBuffers<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            positions: None,
            colors: None,
            args: None,
            instance_count: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn positions(&self) -> Option<&D::Buffer> {
        self.positions.as_ref()
    }

    pub fn colors(&self) -> Option<&D::Buffer> {
        self.colors.as_ref()
    }

    pub fn args(&self) -> Option<&D::Buffer> {
        self.args.as_ref()
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// True when every buffer a draw reads from is allocated.
    pub fn is_drawable(&self) -> bool {
        self.instance_count > 0
            && self.positions.is_some()
            && self.colors.is_some()
            && self.args.is_some()
    }

    /// Consumes the cloud's dirty flags and rebuilds the affected buffers.
    ///
    /// On failure the flags are handed back to the cloud so the next call
    /// retries; buffers built before the failure stay owned by `self`.
    pub fn sync(&mut self, cloud: &mut PointCloud) -> Result<SyncReport> {
        let dirty = cloud.take_dirty();
        let mut report = SyncReport {
            uniforms: dirty.uniforms,
            ..SyncReport::default()
        };

        if dirty.positions {
            if let Err(err) = self.rebuild_positions(cloud) {
                cloud.mark_dirty(dirty);
                return Err(err);
            }
            report.positions = true;
        }
        if dirty.colors {
            if let Err(err) = self.rebuild_colors(cloud) {
                cloud.mark_dirty(DirtyFlags {
                    positions: false,
                    ..dirty
                });
                return Err(err);
            }
            report.colors = true;
        }
        Ok(report)
    }

    fn rebuild_positions(&mut self, cloud: &PointCloud) -> Result<()> {
        self.release_slot(Slot::Positions);
        self.release_slot(Slot::Args);
        self.instance_count = 0;
        if cloud.is_empty() {
            debug!("point cloud is empty; position buffers cleared");
            return Ok(());
        }

        let packed = cloud.packed_positions();
        self.positions = Some(self.device.create_buffer(
            POSITIONS_LABEL,
            BufferKind::Storage,
            bytemuck::cast_slice(&packed),
        )?);
        let args = cloud.draw_args();
        self.args = Some(self.device.create_buffer(
            ARGS_LABEL,
            BufferKind::Indirect,
            bytemuck::bytes_of(&args),
        )?);
        self.instance_count = args.instance_count;
        debug!("rebuilt position buffer for {} points", self.instance_count);
        Ok(())
    }

    fn rebuild_colors(&mut self, cloud: &PointCloud) -> Result<()> {
        self.release_slot(Slot::Colors);
        if cloud.is_empty() {
            return Ok(());
        }
        let packed = cloud.packed_colors();
        self.colors = Some(self.device.create_buffer(
            COLORS_LABEL,
            BufferKind::Storage,
            bytemuck::cast_slice(&packed),
        )?);
        debug!("rebuilt color buffer for {} points", packed.len());
        Ok(())
    }

    /// Releases every allocated buffer. Calling it again is a no-op.
    pub fn release(&mut self) {
        self.release_slot(Slot::Positions);
        self.release_slot(Slot::Colors);
        self.release_slot(Slot::Args);
        self.instance_count = 0;
    }

    fn release_slot(&mut self, slot: Slot) {
        let buffer = match slot {
            Slot::Positions => self.positions.take(),
            Slot::Colors => self.colors.take(),
            Slot::Args => self.args.take(),
        };
        if let Some(buffer) = buffer {
            self.device.release(buffer);
        }
    }
}

impl<D: BufferDevice> Drop for PointBuffers<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Positions,
    Colors,
    Args,
}

#[cfg(test)]
mod tests {
    use glam::{Vec3, Vec4};

    use super::*;
    use crate::cloud::DrawArgs;
    use crate::error::PointCloudError;
    use crate::render::headless::HeadlessDevice;

    fn cloud_with(count: usize) -> PointCloud {
        let mut cloud = PointCloud::new();
        cloud.set_positions(vec![Vec3::ONE; count]);
        cloud
    }

    fn read_args(buffers: &PointBuffers<HeadlessDevice>) -> DrawArgs {
        let bytes = buffers.device().read(buffers.args().unwrap());
        bytemuck::pod_read_unaligned::<DrawArgs>(&bytes)
    }

    #[test]
    fn first_sync_builds_every_buffer() {
        let device = HeadlessDevice::new();
        let mut buffers = PointBuffers::new(device.clone());
        let mut cloud = cloud_with(4);

        let report = buffers.sync(&mut cloud).unwrap();
        assert!(report.positions && report.colors);
        assert!(buffers.is_drawable());
        assert_eq!(device.live_buffers(), 3);
        assert_eq!(read_args(&buffers).instance_count, 4);
        assert_eq!(buffers.device().read(buffers.positions().unwrap()).len(), 4 * 16);
    }

    #[test]
    fn new_positions_resize_draw_args() {
        let mut buffers = PointBuffers::new(HeadlessDevice::new());
        let mut cloud = cloud_with(4);
        buffers.sync(&mut cloud).unwrap();

        cloud.set_positions(vec![Vec3::X; 9]);
        buffers.sync(&mut cloud).unwrap();
        assert_eq!(buffers.instance_count(), 9);
        let args = read_args(&buffers);
        assert_eq!(args.instance_count, 9);
        assert_eq!(args.index_count, 6);
        assert_eq!(buffers.device().read(buffers.colors().unwrap()).len(), 9 * 16);
    }

    #[test]
    fn rebuild_replaces_old_buffers() {
        let device = HeadlessDevice::new();
        let mut buffers = PointBuffers::new(device.clone());
        let mut cloud = cloud_with(2);
        buffers.sync(&mut cloud).unwrap();

        cloud.update_positions(|points| points[0] = Vec3::Z);
        let report = buffers.sync(&mut cloud).unwrap();
        assert!(report.positions);
        assert!(!report.colors);
        assert_eq!(device.live_buffers(), 3);
        assert_eq!(device.released(), 2);
    }

    #[test]
    fn mismatched_colors_leave_color_buffer_alone() {
        let device = HeadlessDevice::new();
        let mut buffers = PointBuffers::new(device.clone());
        let mut cloud = cloud_with(3);
        cloud.set_uniform_color(Vec4::new(0.0, 0.0, 1.0, 1.0));
        buffers.sync(&mut cloud).unwrap();
        let before = device.read(buffers.colors().unwrap());
        let created = device.created();

        assert!(matches!(
            cloud.set_point_colors(vec![Vec3::X; 2]),
            Err(PointCloudError::LengthMismatch { .. })
        ));
        let report = buffers.sync(&mut cloud).unwrap();
        assert!(!report.colors);
        assert_eq!(device.created(), created);
        assert_eq!(device.read(buffers.colors().unwrap()), before);
    }

    #[test]
    fn empty_cloud_is_not_drawable() {
        let device = HeadlessDevice::new();
        let mut buffers = PointBuffers::new(device.clone());
        let mut cloud = cloud_with(3);
        buffers.sync(&mut cloud).unwrap();

        cloud.set_positions(Vec::new());
        buffers.sync(&mut cloud).unwrap();
        assert!(!buffers.is_drawable());
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn release_twice_is_harmless() {
        let device = HeadlessDevice::new();
        let mut buffers = PointBuffers::new(device.clone());
        let mut cloud = cloud_with(5);
        buffers.sync(&mut cloud).unwrap();

        buffers.release();
        buffers.release();
        drop(buffers);
        assert_eq!(device.created(), 3);
        assert_eq!(device.released(), 3);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn release_without_allocation_is_harmless() {
        let device = HeadlessDevice::new();
        let mut buffers = PointBuffers::new(device.clone());
        buffers.release();
        drop(buffers);
        assert_eq!(device.released(), 0);
    }

    #[test]
    fn failed_rebuild_still_releases_on_drop() {
        // 3 points fit in 64 bytes, 8 points do not.
        let device = HeadlessDevice::with_limit(64);
        let mut buffers = PointBuffers::new(device.clone());
        let mut cloud = cloud_with(3);
        buffers.sync(&mut cloud).unwrap();

        cloud.set_positions(vec![Vec3::ONE; 8]);
        let err = buffers.sync(&mut cloud).unwrap_err();
        assert!(matches!(err, PointCloudError::BufferTooLarge { .. }));
        assert!(cloud.dirty().positions);
        assert!(!buffers.is_drawable());

        drop(buffers);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.created(), device.released());
    }
}
