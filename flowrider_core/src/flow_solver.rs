//! Trajectory-intersection solver.
//!
//! Two samples taken in the same flow satisfy, for i in {1, 2}:
//!
//! ```text
//! track_i = flow + x_i * heading_i
//! ```
//!
//! where `track_i` is the ground-velocity vector, `heading_i` the unit vector
//! the vehicle points along and `x_i` its signed speed through the flow.
//! Eliminating `flow` leaves the 2×2 system
//!
//! ```text
//! x1 * heading_1 - x2 * heading_2 = track_1 - track_2
//! ```
//!
//! which is solved in closed form (Cramer's rule). Parallel headings make
//! the system singular and yield no solution.
//!
//! Vectors use the compass convention: `(sin(az), cos(az))`, x east, y north.

use flowrider_env::State;
use nalgebra::{Matrix2, Vector2};

/// Kinematic inputs of one side of a pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    /// Azimuth of motion over the ground (degrees)
    pub track: f64,
    /// Speed over the ground
    pub velocity: f64,
    /// Azimuth the vehicle points (degrees)
    pub heading: f64,
}

impl Leg {
    pub fn new(track: f64, velocity: f64, heading: f64) -> Self {
        Self { track, velocity, heading }
    }

    /// Ground-velocity vector.
    #[inline]
    pub fn track_vector(&self) -> Vector2<f64> {
        azimuth_vector(self.track, self.velocity)
    }

    /// Unit heading vector.
    #[inline]
    pub fn heading_vector(&self) -> Vector2<f64> {
        azimuth_vector(self.heading, 1.0)
    }
}

impl From<&State> for Leg {
    fn from(state: &State) -> Self {
        Self::new(state.track, state.velocity, state.heading)
    }
}

/// Solver output for a non-degenerate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSolution {
    /// Signed speed of vehicle 1 along its heading, through the flow
    pub h1_vel: f64,
    /// Signed speed of vehicle 2 along its heading, through the flow
    pub h2_vel: f64,
    /// Implied flow vector (x east, y north)
    pub flow: Vector2<f64>,
}

/// Vector of length `magnitude` pointing along compass azimuth `azimuth_deg`.
#[inline]
pub fn azimuth_vector(azimuth_deg: f64, magnitude: f64) -> Vector2<f64> {
    let (sin, cos) = azimuth_deg.to_radians().sin_cos();
    Vector2::new(magnitude * sin, magnitude * cos)
}

/// Compass azimuth of `(x, y)` in [0, 360).
#[inline]
pub fn azimuth_of(x: f64, y: f64) -> f64 {
    let az = x.atan2(y).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if az >= 360.0 { 0.0 } else { az }
}

/// Absolute heading separation folded into [0, 180].
#[inline]
pub fn heading_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs().rem_euclid(360.0);
    if diff > 180.0 { 360.0 - diff } else { diff }
}

#[inline]
fn same_azimuth(a: f64, b: f64) -> bool {
    a.rem_euclid(360.0) == b.rem_euclid(360.0)
}

/// Smallest `|sin Δheading|` the solver accepts. Below this the legs are
/// parallel or anti-parallel and the system has no unique solution.
pub const MIN_DETERMINANT: f64 = 1e-9;

/// Solves the crossing of two legs.
///
/// Returns `None` when the headings are equal or opposite (singular system)
/// or the solve does not produce finite numbers.
pub fn calc(first: &Leg, second: &Leg) -> Option<FlowSolution> {
    if same_azimuth(first.heading, second.heading) {
        return None;
    }

    let t1 = first.track_vector();
    let t2 = second.track_vector();
    let h1 = first.heading_vector();
    let h2 = second.heading_vector();
    let rhs = t1 - t2;

    let det = Matrix2::from_columns(&[h1, -h2]).determinant();
    if !det.is_finite() || det.abs() < MIN_DETERMINANT {
        return None;
    }
    let x1 = Matrix2::from_columns(&[rhs, -h2]).determinant() / det;
    let x2 = Matrix2::from_columns(&[h1, rhs]).determinant() / det;
    let flow = t1 - h1 * x1;

    if !(x1.is_finite() && x2.is_finite() && flow.x.is_finite() && flow.y.is_finite()) {
        return None;
    }

    Some(FlowSolution { h1_vel: x1, h2_vel: x2, flow })
}
