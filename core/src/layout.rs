//! Overlap-free 2-D placement for visualized devices.
//!
//! A simplified force-directed relaxation: every pair of devices closer than
//! the sum of their radii plus a margin is pushed apart, each side moving half
//! the overlap. The pass is O(n²) per iteration, which is fine for the tens of
//! devices a local network shows and is the scaling limit beyond that.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::{Device, Position};

/// Irrational turn used to pick a separation direction for coincident nodes.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Distances below this are treated as coincident.
const EPSILON: f64 = 1e-9;

/// Canvas and relaxation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    pub width: f64,
    pub height: f64,
    /// Inset from every canvas edge that positions are kept within.
    pub padding: f64,
    pub base_radius: f64,
    /// Upper bound on the traffic-dependent radius bonus.
    pub max_traffic_bonus: f64,
    /// Extra gap required between two node outlines.
    pub margin: f64,
    pub full_pass_iterations: usize,
    pub single_pass_iterations: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            padding: 50.0,
            base_radius: 20.0,
            max_traffic_bonus: 20.0,
            margin: 10.0,
            full_pass_iterations: 50,
            single_pass_iterations: 100,
        }
    }
}

impl LayoutConfig {
    /// Center of the canvas, used as the fallback for unusable coordinates.
    pub fn center(&self) -> Position {
        Position::new(self.width / 2.0, self.height / 2.0)
    }

    fn x_bounds(&self) -> (f64, f64) {
        axis_bounds(self.width, self.padding)
    }

    fn y_bounds(&self) -> (f64, f64) {
        axis_bounds(self.height, self.padding)
    }

    /// Pull a position into the canvas. Non-finite coordinates reset to the
    /// canvas center.
    pub fn clamp(&self, position: Position) -> Position {
        if !position.is_finite() {
            return self.center();
        }
        let (min_x, max_x) = self.x_bounds();
        let (min_y, max_y) = self.y_bounds();
        Position::new(position.x.clamp(min_x, max_x), position.y.clamp(min_y, max_y))
    }
}

fn axis_bounds(extent: f64, padding: f64) -> (f64, f64) {
    let extent = if extent.is_finite() { extent.max(0.0) } else { 0.0 };
    let padding = if padding.is_finite() { padding.max(0.0) } else { 0.0 };
    if extent <= padding * 2.0 {
        let mid = extent / 2.0;
        (mid, mid)
    } else {
        (padding, extent - padding)
    }
}

/// Result of one resolver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutOutcome {
    pub iterations: usize,
    /// Collisions found in the last iteration that ran.
    pub collisions: usize,
    /// Whether an iteration finished with zero collisions.
    pub converged: bool,
}

/// Assigns and relaxes device positions in place.
///
/// Must not run concurrently with itself; callers hold it behind a lock.
pub struct LayoutResolver {
    config: LayoutConfig,
    rng: StdRng,
}

impl LayoutResolver {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Resolver with reproducible initial placement.
    pub fn with_seed(config: LayoutConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Node radius: base size plus a log-scaled, capped traffic bonus.
    pub fn radius(&self, device: &Device) -> f64 {
        let kib = device.total_traffic() as f64 / 1024.0;
        let bonus = ((1.0 + kib).ln() * 4.0).min(self.config.max_traffic_bonus);
        self.config.base_radius + bonus.max(0.0)
    }

    /// Give `device` a random position inside the padded canvas, then push it
    /// and anything it overlaps apart. Only pairs involving the new device are
    /// considered.
    pub fn place_new_device(&mut self, device: &mut Device, existing: &mut [Device]) -> LayoutOutcome {
        let (min_x, max_x) = self.config.x_bounds();
        let (min_y, max_y) = self.config.y_bounds();
        let initial = Position::new(
            random_in(&mut self.rng, min_x, max_x),
            random_in(&mut self.rng, min_y, max_y),
        );

        let mut placed = initial;
        let placed_radius = self.radius(device);
        let mut positions: Vec<Position> = existing.iter().map(|d| self.initial_position(d)).collect();
        let radii: Vec<f64> = existing.iter().map(|d| self.radius(d)).collect();

        let mut outcome = LayoutOutcome::default();
        for iteration in 0..self.config.single_pass_iterations {
            let mut collisions = 0;
            for (index, (other, &other_radius)) in positions.iter_mut().zip(&radii).enumerate() {
                if separate(&mut placed, placed_radius, other, other_radius, self.config.margin, index) {
                    collisions += 1;
                }
            }
            placed = self.config.clamp(placed);
            for position in positions.iter_mut() {
                *position = self.config.clamp(*position);
            }

            outcome.iterations = iteration + 1;
            outcome.collisions = collisions;
            if collisions == 0 {
                outcome.converged = true;
                break;
            }
        }

        device.position = Some(placed);
        for (device, position) in existing.iter_mut().zip(positions) {
            device.position = Some(position);
        }
        if !outcome.converged && !existing.is_empty() {
            tracing::debug!(
                ip = %device.ip,
                collisions = outcome.collisions,
                "Placement stopped at iteration cap"
            );
        }
        outcome
    }

    /// Relax overlaps across the whole set until an iteration finds no
    /// collision or the iteration cap is reached. Devices without a usable
    /// position start at the canvas center.
    pub fn resolve_all(&self, devices: &mut [Device]) -> LayoutOutcome {
        let mut positions: Vec<Position> = devices.iter().map(|d| self.initial_position(d)).collect();
        let radii: Vec<f64> = devices.iter().map(|d| self.radius(d)).collect();

        let mut outcome = LayoutOutcome {
            converged: devices.len() < 2,
            ..LayoutOutcome::default()
        };
        if devices.len() >= 2 {
            for iteration in 0..self.config.full_pass_iterations {
                let mut collisions = 0;
                let mut pair = 0;
                for i in 0..positions.len() {
                    for j in (i + 1)..positions.len() {
                        let (mut a, mut b) = (positions[i], positions[j]);
                        if separate(&mut a, radii[i], &mut b, radii[j], self.config.margin, pair) {
                            positions[i] = a;
                            positions[j] = b;
                            collisions += 1;
                        }
                        pair += 1;
                    }
                }
                for position in positions.iter_mut() {
                    *position = self.config.clamp(*position);
                }

                outcome.iterations = iteration + 1;
                outcome.collisions = collisions;
                if collisions == 0 {
                    outcome.converged = true;
                    break;
                }
            }
        }

        for (device, position) in devices.iter_mut().zip(positions) {
            device.position = Some(self.config.clamp(position));
        }
        if !outcome.converged {
            tracing::debug!(
                devices = devices.len(),
                collisions = outcome.collisions,
                "Layout stopped at iteration cap"
            );
        }
        outcome
    }

    fn initial_position(&self, device: &Device) -> Position {
        self.config
            .clamp(device.position.unwrap_or_else(|| self.config.center()))
    }
}

fn random_in(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..=max)
    } else {
        min
    }
}

/// Push `a` and `b` apart by half the overlap each. Returns whether they
/// collided. `salt` picks the direction when the centers coincide.
fn separate(a: &mut Position, ra: f64, b: &mut Position, rb: f64, margin: f64, salt: usize) -> bool {
    let required = ra + rb + margin;
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let distance = dx.hypot(dy);
    if !(distance < required) {
        return false;
    }

    let (ux, uy) = if distance > EPSILON {
        (dx / distance, dy / distance)
    } else {
        let angle = salt as f64 * GOLDEN_ANGLE;
        (angle.cos(), angle.sin())
    };
    let push = (required - distance) / 2.0;
    a.x -= ux * push;
    a.y -= uy * push;
    b.x += ux * push;
    b.y += uy * push;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_at(ip: &str, x: f64, y: f64) -> Device {
        let mut device = Device::new(ip, 0);
        device.position = Some(Position::new(x, y));
        device
    }

    fn min_gap(resolver: &LayoutResolver, a: &Device, b: &Device) -> f64 {
        resolver.radius(a) + resolver.radius(b) + resolver.config().margin
    }

    #[test]
    fn test_radius_is_capped() {
        let resolver = LayoutResolver::with_seed(LayoutConfig::default(), 1);
        let mut quiet = Device::new("10.0.0.1", 0);
        assert_eq!(resolver.radius(&quiet), 20.0);

        quiet.traffic_in = 10 * 1024;
        let r = resolver.radius(&quiet);
        assert!(r > 20.0 && r < 40.0);

        let mut loud = Device::new("10.0.0.2", 0);
        loud.traffic_out = u64::MAX;
        assert_eq!(resolver.radius(&loud), 40.0);
    }

    #[test]
    fn test_coincident_devices_separate() {
        let resolver = LayoutResolver::with_seed(LayoutConfig::default(), 1);
        let mut devices = vec![device_at("10.0.0.1", 600.0, 400.0), device_at("10.0.0.2", 600.0, 400.0)];

        let outcome = resolver.resolve_all(&mut devices);
        assert!(outcome.converged);

        let a = devices[0].position.unwrap();
        let b = devices[1].position.unwrap();
        let required = min_gap(&resolver, &devices[0], &devices[1]);
        assert!(a.distance_to(&b) >= required - 1e-6);
    }

    #[test]
    fn test_resolve_all_is_deterministic() {
        let resolver = LayoutResolver::with_seed(LayoutConfig::default(), 1);
        let build = || {
            (0..8)
                .map(|i| device_at(&format!("10.0.0.{}", i + 2), 600.0, 400.0))
                .collect::<Vec<_>>()
        };
        let mut first = build();
        let mut second = build();
        resolver.resolve_all(&mut first);
        resolver.resolve_all(&mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn test_crowd_converges_or_hits_cap() {
        let resolver = LayoutResolver::with_seed(LayoutConfig::default(), 1);
        let mut devices: Vec<Device> = (0..12)
            .map(|i| device_at(&format!("10.0.1.{}", i + 2), 600.0 + i as f64, 400.0))
            .collect();

        let outcome = resolver.resolve_all(&mut devices);
        assert!(outcome.iterations <= 50);
        if outcome.converged {
            for i in 0..devices.len() {
                for j in (i + 1)..devices.len() {
                    let d = devices[i].position.unwrap().distance_to(&devices[j].position.unwrap());
                    assert!(d >= min_gap(&resolver, &devices[i], &devices[j]) - 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_positions_stay_on_canvas() {
        let resolver = LayoutResolver::with_seed(LayoutConfig::default(), 1);
        let mut devices = vec![
            device_at("10.0.0.1", -500.0, 5_000.0),
            device_at("10.0.0.2", 50.0, 50.0),
            device_at("10.0.0.3", 50.0, 50.0),
        ];
        resolver.resolve_all(&mut devices);

        for device in &devices {
            let p = device.position.unwrap();
            assert!((50.0..=1150.0).contains(&p.x), "x out of bounds: {}", p.x);
            assert!((50.0..=750.0).contains(&p.y), "y out of bounds: {}", p.y);
        }
    }

    #[test]
    fn test_non_finite_positions_are_reset() {
        let resolver = LayoutResolver::with_seed(LayoutConfig::default(), 1);
        let mut devices = vec![device_at("10.0.0.1", f64::NAN, 10.0), Device::new("10.0.0.2", 0)];
        devices[1].position = Some(Position::new(f64::INFINITY, f64::NEG_INFINITY));

        resolver.resolve_all(&mut devices);
        for device in &devices {
            assert!(device.position.unwrap().is_finite());
        }
    }

    #[test]
    fn test_single_device_is_untouched() {
        let resolver = LayoutResolver::with_seed(LayoutConfig::default(), 1);
        let mut devices = vec![device_at("10.0.0.1", 300.0, 300.0)];
        let outcome = resolver.resolve_all(&mut devices);
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(devices[0].position, Some(Position::new(300.0, 300.0)));

        let mut empty: Vec<Device> = Vec::new();
        assert!(resolver.resolve_all(&mut empty).converged);
    }

    #[test]
    fn test_place_new_device() {
        let mut resolver = LayoutResolver::with_seed(LayoutConfig::default(), 7);
        let mut existing = vec![device_at("10.0.0.1", 300.0, 300.0), device_at("10.0.0.2", 900.0, 500.0)];
        let mut fresh = Device::new("10.0.0.3", 0);

        let outcome = resolver.place_new_device(&mut fresh, &mut existing);
        assert!(outcome.converged);

        let placed = fresh.position.unwrap();
        assert!((50.0..=1150.0).contains(&placed.x));
        assert!((50.0..=750.0).contains(&placed.y));
        for other in &existing {
            let d = placed.distance_to(&other.position.unwrap());
            assert!(d >= min_gap(&resolver, &fresh, other) - 1e-6);
        }
    }

    #[test]
    fn test_place_new_device_pushes_overlapped_neighbor() {
        // A single 100px column: wherever the new node lands it overlaps the
        // existing one, and both fit once pushed apart vertically.
        let config = LayoutConfig {
            width: 20.0,
            height: 120.0,
            padding: 10.0,
            ..LayoutConfig::default()
        };
        let mut resolver = LayoutResolver::with_seed(config, 5);
        let mut existing = vec![device_at("10.0.0.1", 10.0, 60.0)];
        let mut fresh = Device::new("10.0.0.2", 0);

        let outcome = resolver.place_new_device(&mut fresh, &mut existing);
        assert!(outcome.converged);
        assert!(outcome.iterations >= 2, "no collision was resolved");

        let moved = existing[0].position.unwrap();
        let placed = fresh.position.unwrap();
        assert_ne!(moved, Position::new(10.0, 60.0));
        assert_eq!(moved.x, 10.0);
        assert_eq!(placed.x, 10.0);
        assert!((10.0..=110.0).contains(&moved.y));
        assert!((10.0..=110.0).contains(&placed.y));
        assert!(placed.distance_to(&moved) >= min_gap(&resolver, &fresh, &existing[0]) - 1e-6);
    }

    #[test]
    fn test_place_is_reproducible_with_seed() {
        let place = || {
            let mut resolver = LayoutResolver::with_seed(LayoutConfig::default(), 42);
            let mut device = Device::new("10.0.0.9", 0);
            resolver.place_new_device(&mut device, &mut []);
            device.position.unwrap()
        };
        assert_eq!(place(), place());
    }

    #[test]
    fn test_degenerate_canvas() {
        let config = LayoutConfig {
            width: 40.0,
            height: 40.0,
            padding: 50.0,
            ..LayoutConfig::default()
        };
        let mut resolver = LayoutResolver::with_seed(config, 3);
        let mut device = Device::new("10.0.0.9", 0);
        let mut existing = vec![device_at("10.0.0.1", 20.0, 20.0)];

        let outcome = resolver.place_new_device(&mut device, &mut existing);
        assert!(!outcome.converged);
        assert_eq!(device.position, Some(Position::new(20.0, 20.0)));
    }

    #[test]
    fn test_config_camel_case() {
        let config: LayoutConfig = serde_json::from_str(r#"{"baseRadius": 12, "fullPassIterations": 5}"#).unwrap();
        assert_eq!(config.base_radius, 12.0);
        assert_eq!(config.full_pass_iterations, 5);
        assert_eq!(config.width, 1200.0);
    }
}
