use std::f32::consts::TAU;

use glam::{Quat, Vec3};
use log::debug;

use crate::cloud::PointCloud;
use crate::random::SampleRng;
use crate::settings::Settings;

/// Half extent of the cube raw samples are drawn from.
pub const SAMPLE_HALF_EXTENT: f32 = 0.5;

/// Offset applied to `x` when a raw sample lands exactly on the origin.
pub const DEGENERATE_NUDGE: f32 = 0.01;

/// Axis the generated cloud spins around.
pub const ROTATION_AXIS: Vec3 = Vec3::Y;

/// Draws `count` points uniformly inside the half-unit cube and projects
/// them onto a sphere shell of `radius`.
pub fn sample_shell(count: usize, radius: f32, rng: &mut SampleRng) -> Vec<Vec3> {
    (0..count)
        .map(|_| {
            let sample = Vec3::new(
                rng.range(-SAMPLE_HALF_EXTENT, SAMPLE_HALF_EXTENT),
                rng.range(-SAMPLE_HALF_EXTENT, SAMPLE_HALF_EXTENT),
                rng.range(-SAMPLE_HALF_EXTENT, SAMPLE_HALF_EXTENT),
            );
            project_to_shell(sample, radius)
        })
        .collect()
}

/// Moves a raw sample onto the shell. The origin has no direction, so it is
/// nudged along `x` first.
pub fn project_to_shell(sample: Vec3, radius: f32) -> Vec3 {
    let sample = if sample == Vec3::ZERO {
        Vec3::new(DEGENERATE_NUDGE, 0.0, 0.0)
    } else {
        sample
    };
    sample * (radius / sample.length())
}

/// Angle in radians covered during `dt` seconds when one turn takes
/// `period` seconds. A period that is not a positive finite number stops
/// the rotation.
pub fn rotation_angle(dt: f32, period: f32) -> f32 {
    if !(period.is_finite() && period > 0.0) {
        return 0.0;
    }
    TAU * dt / period
}

pub fn rotate_points(points: &mut [Vec3], axis: Vec3, angle: f32) {
    let rotation = Quat::from_axis_angle(axis.normalize(), angle);
    for point in points.iter_mut() {
        *point = rotation * *point;
    }
}

/// Produces a spinning shell of points and publishes it into a [`PointCloud`].
#[derive(Debug, Clone)]
pub struct PointGenerator {
    settings: Settings,
    rng: SampleRng,
    elapsed_angle: f32,
}

impl PointGenerator {
    /// Uses the configured seed, or OS entropy when none is set.
    pub fn new(settings: Settings) -> Self {
        let rng = match settings.seed {
            Some(seed) => SampleRng::new(seed),
            None => SampleRng::from_entropy(),
        };
        Self {
            settings,
            rng,
            elapsed_angle: 0.0,
        }
    }

    pub fn with_seed(settings: Settings, seed: u64) -> Self {
        Self {
            settings,
            rng: SampleRng::new(seed),
            elapsed_angle: 0.0,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Total rotation applied since [`PointGenerator::init`], in radians.
    pub fn elapsed_angle(&self) -> f32 {
        self.elapsed_angle
    }

    /// Publishes fresh positions, a per-point scale array and the uniform
    /// color into `cloud`.
    pub fn init(&mut self, cloud: &mut PointCloud) {
        let count = self.settings.point_count;
        let positions = sample_shell(count, self.settings.shell_radius, &mut self.rng);
        cloud.set_positions(positions);
        // Lengths match by construction.
        if let Err(err) = cloud.set_point_scales(vec![self.settings.point_scale; count]) {
            log::error!("failed to publish point scales: {err}");
        }
        cloud.set_uniform_color(self.settings.point_color);
        self.elapsed_angle = 0.0;
        debug!(
            "generated {count} points on a shell of radius {}",
            self.settings.shell_radius
        );
    }

    /// Rotates every point by the angle covered in `dt` seconds.
    pub fn step(&mut self, cloud: &mut PointCloud, dt: f32) {
        let angle = rotation_angle(dt, self.settings.rotation_period);
        if angle == 0.0 {
            return;
        }
        cloud.update_positions(|points| rotate_points(points, ROTATION_AXIS, angle));
        self.elapsed_angle = (self.elapsed_angle + angle) % TAU;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1e-4;

    #[test]
    fn sampling_lands_on_shell() {
        let mut rng = SampleRng::new(1);
        for count in [1, 2, 17, 500] {
            let points = sample_shell(count, 0.35, &mut rng);
            assert_eq!(points.len(), count);
            for point in &points {
                assert!((point.length() - 0.35).abs() < 1e-5, "{point:?}");
            }
        }
    }

    #[test]
    fn origin_sample_is_nudged() {
        let projected = project_to_shell(Vec3::ZERO, 0.35);
        assert!(projected.is_finite());
        assert!((projected - Vec3::new(0.35, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn full_period_returns_points_home() {
        let settings = Settings {
            point_count: 64,
            rotation_period: 2.0,
            ..Settings::default()
        };
        let mut generator = PointGenerator::with_seed(settings, 3);
        let mut cloud = PointCloud::new();
        generator.init(&mut cloud);
        let start = cloud.positions().to_vec();

        // 120 frames of 1/60 s cover exactly one 2 s period.
        for _ in 0..120 {
            generator.step(&mut cloud, 1.0 / 60.0);
        }
        for (before, after) in start.iter().zip(cloud.positions()) {
            assert!((*before - *after).length() < TOLERANCE, "{before:?} vs {after:?}");
        }
    }

    #[test]
    fn rotation_is_frame_rate_independent() {
        let settings = Settings {
            point_count: 8,
            ..Settings::default()
        };
        let mut coarse = PointGenerator::with_seed(settings.clone(), 11);
        let mut fine = PointGenerator::with_seed(settings, 11);
        let mut a = PointCloud::new();
        let mut b = PointCloud::new();
        coarse.init(&mut a);
        fine.init(&mut b);

        for _ in 0..30 {
            coarse.step(&mut a, 1.0 / 30.0);
        }
        for _ in 0..120 {
            fine.step(&mut b, 1.0 / 120.0);
        }
        for (p, q) in a.positions().iter().zip(b.positions()) {
            assert!((*p - *q).length() < TOLERANCE);
        }
    }

    #[test]
    fn rotation_keeps_y_and_radius() {
        let mut points = vec![Vec3::new(0.35, 0.1, 0.0)];
        rotate_points(&mut points, ROTATION_AXIS, std::f32::consts::FRAC_PI_2);
        assert!((points[0] - Vec3::new(0.0, 0.1, -0.35)).length() < 1e-6);
    }

    #[test]
    fn invalid_period_stops_rotation() {
        assert_eq!(rotation_angle(0.016, 0.0), 0.0);
        assert_eq!(rotation_angle(0.016, -1.0), 0.0);
        assert_eq!(rotation_angle(0.016, f32::NAN), 0.0);
        assert!((rotation_angle(1.0, 4.0) - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn init_publishes_scales_and_color() {
        let settings = Settings {
            point_count: 10,
            point_scale: 0.2,
            ..Settings::default()
        };
        let mut generator = PointGenerator::with_seed(settings.clone(), 5);
        let mut cloud = PointCloud::new();
        generator.init(&mut cloud);
        assert_eq!(cloud.len(), 10);
        assert_eq!(cloud.point_scales(), Some(&[0.2; 10][..]));
        assert!(!cloud.constant_scale());
        assert_eq!(cloud.packed_colors()[0], settings.point_color.to_array());
    }

    #[test]
    fn same_seed_same_cloud() {
        let mut a = PointCloud::new();
        let mut b = PointCloud::new();
        PointGenerator::with_seed(Settings::default(), 9).init(&mut a);
        PointGenerator::with_seed(Settings::default(), 9).init(&mut b);
        assert_eq!(a.positions(), b.positions());
    }
}
