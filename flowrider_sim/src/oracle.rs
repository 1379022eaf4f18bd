//! Ground truth oracle for simulation.
//!
//! The Oracle owns the true flow field and a fleet of vehicles moving
//! through it:
//! - Each vehicle holds a steady speed through the flow and turns at a fixed rate
//! - Ground motion is the vehicle's own velocity plus the local flow
//! - Reported track, speed and heading optionally carry Gaussian noise

use crate::error::SimError;
use flowrider_core::flow_solver::{azimuth_of, azimuth_vector};
use flowrider_core::Observation;
use nalgebra::Vector2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

// ============================================================================
// FLOW FIELDS
// ============================================================================

/// A known, time-invariant flow field (m/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FlowField {
    /// Same vector everywhere.
    Uniform { x: f64, y: f64 },
    /// Eastward flow growing linearly to the north: `x = base + gradient * y`.
    Shear { base: f64, gradient: f64 },
    /// Rankine vortex: solid-body rotation inside `radius`, decaying as `1/r` outside.
    /// Positive `peak` turns clockwise (compass sense).
    Vortex { cx: f64, cy: f64, peak: f64, radius: f64 },
}

impl FlowField {
    /// True flow vector at `(x, y)`.
    pub fn velocity_at(&self, x: f64, y: f64) -> Vector2<f64> {
        match *self {
            FlowField::Uniform { x: fx, y: fy } => Vector2::new(fx, fy),
            FlowField::Shear { base, gradient } => Vector2::new(base + gradient * y, 0.0),
            FlowField::Vortex { cx, cy, peak, radius } => {
                let (dx, dy) = (x - cx, y - cy);
                let r = dx.hypot(dy);
                if r == 0.0 {
                    return Vector2::zeros();
                }
                let speed = if r <= radius { peak * r / radius } else { peak * radius / r };
                // clockwise tangent of the radial unit vector
                Vector2::new(dy / r, -dx / r) * speed
            }
        }
    }
}

// ============================================================================
// SENSOR NOISE
// ============================================================================

/// Zero-mean Gaussian noise on the reported kinematics.
#[derive(Debug, Clone, Copy)]
pub struct NoiseModel {
    track: Normal<f64>,
    velocity: Normal<f64>,
    heading: Normal<f64>,
}

impl NoiseModel {
    /// Standard deviations in degrees, m/s and degrees.
    pub fn new(track_std: f64, velocity_std: f64, heading_std: f64) -> Result<Self, SimError> {
        for (parameter, value) in [
            ("track_std", track_std),
            ("velocity_std", velocity_std),
            ("heading_std", heading_std),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SimError::NoiseStd { parameter, value });
            }
        }
        Ok(Self {
            track: Normal::new(0.0, track_std)?,
            velocity: Normal::new(0.0, velocity_std)?,
            heading: Normal::new(0.0, heading_std)?,
        })
    }
}

// ============================================================================
// VEHICLES
// ============================================================================

/// A simulated vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: u64,

    /// Position [x, y] in meters
    pub position: Vector2<f64>,

    /// Constant altitude / depth (m)
    pub z: f64,

    /// Azimuth the vehicle points (degrees)
    pub heading: f64,

    /// Speed through the flow (m/s)
    pub speed: f64,

    /// Heading change per second (degrees, positive clockwise)
    pub turn_rate: f64,
}

impl Vehicle {
    /// Velocity over the ground in `field`.
    pub fn ground_velocity(&self, field: &FlowField) -> Vector2<f64> {
        azimuth_vector(self.heading, self.speed) + field.velocity_at(self.position.x, self.position.y)
    }
}

/// The Oracle - maintains ground truth and generates observations.
pub struct Oracle {
    /// RNG for placement and noise
    rng: ChaCha8Rng,

    field: FlowField,

    vehicles: Vec<Vehicle>,

    noise: Option<NoiseModel>,

    /// Current simulation time (seconds)
    current_time: f64,
}

impl Oracle {
    /// Creates a new Oracle over `field`.
    pub fn new(seed: u64, field: FlowField) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            field,
            vehicles: Vec::new(),
            noise: None,
            current_time: 0.0,
        }
    }

    pub fn with_noise(mut self, noise: NoiseModel) -> Self {
        self.noise = Some(noise);
        self
    }

    pub fn field(&self) -> &FlowField {
        &self.field
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn time(&self) -> f64 {
        self.current_time
    }

    /// Places a vehicle at a random position inside `half_extent` of the
    /// origin with a random heading and turn rate. Returns its id.
    pub fn spawn_vehicle(&mut self, half_extent: f64, speed: f64, z: f64) -> u64 {
        let id = self.vehicles.len() as u64;
        let coord = Uniform::new_inclusive(-half_extent, half_extent);
        let angle = Uniform::new(0.0, 360.0);
        let turn = Uniform::new_inclusive(1.0, 4.0);

        let position = Vector2::new(coord.sample(&mut self.rng), coord.sample(&mut self.rng));
        let heading = angle.sample(&mut self.rng);
        let mut turn_rate = turn.sample(&mut self.rng);
        if id % 2 == 1 {
            turn_rate = -turn_rate;
        }

        self.vehicles.push(Vehicle {
            id,
            position,
            z,
            heading,
            speed,
            turn_rate,
        });
        id
    }

    /// Advances every vehicle by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        for vehicle in &mut self.vehicles {
            let ground = vehicle.ground_velocity(&self.field);
            vehicle.position += ground * dt;
            vehicle.heading = (vehicle.heading + vehicle.turn_rate * dt).rem_euclid(360.0);
        }
        self.current_time += dt;
    }

    /// One observation per vehicle at the current instant.
    ///
    /// Observations carry no time: the trajectory store stamps them from
    /// the simulation clock.
    pub fn observe(&mut self) -> Vec<Observation> {
        let field = self.field;
        let mut out = Vec::with_capacity(self.vehicles.len());
        for vehicle in &self.vehicles {
            let ground = vehicle.ground_velocity(&field);
            let mut track = azimuth_of(ground.x, ground.y);
            let mut velocity = ground.norm();
            let mut heading = vehicle.heading;

            if let Some(noise) = &self.noise {
                track += noise.track.sample(&mut self.rng);
                velocity = (velocity + noise.velocity.sample(&mut self.rng)).max(0.0);
                heading += noise.heading.sample(&mut self.rng);
            }

            out.push(Observation::new(
                [vehicle.position.x, vehicle.position.y, vehicle.z],
                track.rem_euclid(360.0),
                velocity,
                heading.rem_euclid(360.0),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrider_core::calc;
    use flowrider_core::Leg;
    use proptest::prelude::*;

    #[test]
    fn test_same_seed_same_fleet() {
        let field = FlowField::Uniform { x: 1.0, y: 0.0 };
        let mut a = Oracle::new(7, field);
        let mut b = Oracle::new(7, field);
        for _ in 0..3 {
            a.spawn_vehicle(500.0, 8.0, 0.0);
            b.spawn_vehicle(500.0, 8.0, 0.0);
        }
        a.step(5.0);
        b.step(5.0);
        assert_eq!(a.observe(), b.observe());
    }

    #[test]
    fn test_vehicle_drifts_with_flow() {
        let field = FlowField::Uniform { x: 2.0, y: 0.0 };
        let mut oracle = Oracle::new(1, field);
        oracle.spawn_vehicle(0.0, 0.0, 0.0);
        oracle.step(10.0);
        let v = &oracle.vehicles()[0];
        assert!((v.position.x - 20.0).abs() < 1e-9);
        assert!(v.position.y.abs() < 1e-9);
        assert_eq!(oracle.time(), 10.0);
    }

    #[test]
    fn test_vortex_profile() {
        let field = FlowField::Vortex { cx: 0.0, cy: 0.0, peak: 2.0, radius: 100.0 };
        assert_eq!(field.velocity_at(0.0, 0.0), Vector2::zeros());
        // due north of the centre a clockwise vortex flows east
        let v = field.velocity_at(0.0, 100.0);
        assert!((v.x - 2.0).abs() < 1e-12 && v.y.abs() < 1e-12);
        assert!((field.velocity_at(0.0, 200.0).norm() - 1.0).abs() < 1e-12);
        assert!((field.velocity_at(50.0, 0.0).norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_noise_rejected() {
        assert!(matches!(
            NoiseModel::new(-1.0, 0.0, 0.0),
            Err(SimError::NoiseStd { parameter: "track_std", .. })
        ));
        assert!(matches!(
            NoiseModel::new(0.0, 0.0, -0.5),
            Err(SimError::NoiseStd { parameter: "heading_std", .. })
        ));
        assert!(matches!(
            NoiseModel::new(0.0, f64::NAN, 0.0),
            Err(SimError::NoiseStd { parameter: "velocity_std", .. })
        ));
        assert!(NoiseModel::new(0.0, 0.0, 0.0).is_ok());
    }

    proptest! {
        #[test]
        fn prop_noise_free_observations_solve_exactly(
            seed in any::<u64>(),
            fx in -3.0f64..3.0,
            fy in -3.0f64..3.0,
        ) {
            let mut oracle = Oracle::new(seed, FlowField::Uniform { x: fx, y: fy });
            oracle.spawn_vehicle(100.0, 8.0, 0.0);
            let first = oracle.observe()[0];
            oracle.step(30.0);
            let second = oracle.observe()[0];

            let a = Leg::new(first.track, first.velocity, first.heading);
            let b = Leg::new(second.track, second.velocity, second.heading);
            // turn rates of 1 to 4 deg/s over 30 s always separate the headings
            let s = calc(&a, &b).unwrap();
            prop_assert!((s.flow.x - fx).abs() < 1e-6);
            prop_assert!((s.flow.y - fy).abs() < 1e-6);
        }
    }
}
