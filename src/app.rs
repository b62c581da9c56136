use std::time::{Duration, Instant};

use glam::{Mat4, Vec3};

use crate::cloud::{Bounds, ColorChannel, PointCloud};
use crate::error::Result;
use crate::generator::PointGenerator;
use crate::render::{BufferDevice, CameraParams, PointBuffers};

/// Fixed step used by headless runs.
pub const HEADLESS_DT: f32 = 1.0 / 60.0;

/// Longest step fed to the generator, so a stalled window does not make the
/// cloud jump.
const MAX_FRAME_DT: Duration = Duration::from_millis(250);

/// Places the camera on +Z looking at the cloud so the whole bounds fit.
pub fn camera_from_bounds(bounds: Option<Bounds>, aspect: f32) -> CameraParams {
    let fov = 45f32.to_radians();
    let (target, radius) = bounds
        .map(|bounds| (bounds.center(), bounds.radius().max(0.01)))
        .unwrap_or((Vec3::ZERO, 0.5));
    let distance = radius / (fov * 0.5).sin() * 1.2;
    let position = target + Vec3::new(0.0, radius * 0.5, distance);
    let view = Mat4::look_at_rh(position, target, Vec3::Y);
    let projection = Mat4::perspective_rh(fov, aspect.max(0.01), 0.01, distance * 4.0);
    CameraParams {
        view,
        projection,
        position,
    }
}

/// Turns wall-clock instants into per-frame deltas.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    frames: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last: None,
            frames: 0,
        }
    }

    /// Seconds since the previous tick; the first tick reports zero.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let dt = self
            .last
            .map(|last| now.saturating_duration_since(last).min(MAX_FRAME_DT))
            .unwrap_or_default();
        self.last = Some(now);
        self.frames += 1;
        dt.as_secs_f32()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// Steps the generator `frames` times at a fixed `dt`, uploading after each
/// step. Returns how many frames rebuilt the position buffer.
pub fn simulate<D: BufferDevice>(
    generator: &mut PointGenerator,
    cloud: &mut PointCloud,
    buffers: &mut PointBuffers<D>,
    frames: u32,
    dt: f32,
) -> Result<u32> {
    let mut uploads = 0;
    for _ in 0..frames {
        generator.step(cloud, dt);
        if buffers.sync(cloud)?.positions {
            uploads += 1;
        }
    }
    Ok(uploads)
}

pub fn print_summary(cloud: &PointCloud) {
    println!("Point cloud: {} points", cloud.len());
    let (near, far) = cloud
        .positions()
        .iter()
        .map(|point| point.length())
        .fold((f32::INFINITY, 0f32), |(near, far), r| (near.min(r), far.max(r)));
    if !cloud.is_empty() {
        println!(" - shell radius {near:.3}..{far:.3}");
    }
    if let Some(first) = cloud.positions().first() {
        println!(
            " - first point ({:.3}, {:.3}, {:.3})",
            first.x, first.y, first.z
        );
    }
    if cloud.constant_scale() {
        println!(" - scale uniform {:.3}", cloud.uniform_scale());
    } else {
        println!(" - scale per-point");
    }
    match cloud.colors() {
        ColorChannel::Uniform(color) => println!(
            " - color uniform ({:.2}, {:.2}, {:.2}, {:.2})",
            color.x, color.y, color.z, color.w
        ),
        ColorChannel::PerPoint(colors) => {
            println!(" - color per-point ({} entries)", colors.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessDevice;
    use crate::settings::Settings;

    #[test]
    fn camera_sees_cloud_center() {
        let bounds = Bounds {
            min: Vec3::splat(-0.35),
            max: Vec3::splat(0.35),
        };
        let camera = camera_from_bounds(Some(bounds), 16.0 / 9.0);
        let clip = camera.projection * camera.view * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4);
        assert!(ndc.y.abs() < 1.0);
        assert!((0.0..=1.0).contains(&ndc.z));
        assert!(camera.position.z > bounds.max.z);
    }

    #[test]
    fn empty_bounds_use_default_framing() {
        let camera = camera_from_bounds(None, 1.0);
        assert!(camera.position.z > 0.0);
    }

    #[test]
    fn clock_starts_at_zero_and_clamps() {
        let mut clock = FrameClock::new();
        let start = Instant::now();
        assert_eq!(clock.tick_at(start), 0.0);
        let dt = clock.tick_at(start + Duration::from_millis(16));
        assert!((dt - 0.016).abs() < 1e-6);
        let dt = clock.tick_at(start + Duration::from_secs(5));
        assert!((dt - 0.25).abs() < 1e-6);
        assert_eq!(clock.frames(), 3);
    }

    #[test]
    fn simulate_uploads_every_frame() {
        let settings = Settings {
            point_count: 16,
            ..Settings::default()
        };
        let mut generator = PointGenerator::with_seed(settings, 2);
        let mut cloud = PointCloud::new();
        generator.init(&mut cloud);
        let device = HeadlessDevice::new();
        let mut buffers = PointBuffers::new(device.clone());
        buffers.sync(&mut cloud).unwrap();

        let uploads = simulate(&mut generator, &mut cloud, &mut buffers, 10, HEADLESS_DT).unwrap();
        assert_eq!(uploads, 10);
        assert_eq!(buffers.instance_count(), 16);
        assert_eq!(device.live_buffers(), 3);
    }
}
