pub mod buffers;
pub mod common;
pub mod headless;
pub mod native;
mod shared;

pub use buffers::{BufferDevice, BufferKind, PointBuffers, SyncReport};
pub use common::{CameraParams, GlobalUniform};
pub use headless::{HeadlessBuffer, HeadlessDevice};
pub use native::{Renderer, WgpuDevice};
