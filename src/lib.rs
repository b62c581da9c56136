//! GPU-instanced point cloud rendering.
//!
//! A [`PointGenerator`] samples points on a sphere shell and spins them a
//! little every frame. The resulting [`PointCloud`] records which derived
//! GPU buffers went stale, and [`PointBuffers`] rebuilds only those before
//! the [`Renderer`] issues a single indirect instanced draw. The upload path
//! runs the same against a real GPU or the in-memory [`HeadlessDevice`].

pub mod app;
pub mod cloud;
pub mod error;
pub mod generator;
pub mod random;
pub mod render;
pub mod settings;

pub use cloud::{Bounds, ColorChannel, DirtyFlags, DrawArgs, PointCloud};
pub use error::{Channel, PointCloudError};
pub use generator::PointGenerator;
pub use render::{
    BufferDevice, BufferKind, CameraParams, HeadlessDevice, PointBuffers, Renderer, SyncReport,
    WgpuDevice,
};
pub use settings::Settings;
