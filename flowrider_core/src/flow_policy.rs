//! Validation and weighting policies for the pair pipeline.
//!
//! Policies are plain data: a tagged reference variant with its thresholds,
//! or a function pointer for custom rules. Only numbers cross the boundary,
//! so no trait objects are involved.

use flowrider_env::{Intersection, State};

/// Cheap pair attributes computed before any solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairGeometry {
    /// Euclidean separation (m)
    pub sdiff: f64,
    /// Absolute time separation (s)
    pub tdiff: f64,
    /// Heading separation folded into [0, 180] (degrees)
    pub hdiff: f64,
}

/// Filter applied before the geometric solve.
#[derive(Debug, Clone, Copy)]
pub enum PreValidation {
    /// Keep pairs closer than `max_dist` and `max_time_diff` whose headings
    /// differ by more than `min_heading_diff`.
    Thresholds {
        max_dist: f64,
        max_time_diff: f64,
        min_heading_diff: f64,
    },
    Custom(fn(&PairGeometry) -> bool),
}

impl PreValidation {
    #[inline]
    pub fn keep(&self, pair: &PairGeometry) -> bool {
        match *self {
            PreValidation::Thresholds {
                max_dist,
                max_time_diff,
                min_heading_diff,
            } => {
                pair.sdiff < max_dist
                    && pair.tdiff.abs() < max_time_diff
                    && pair.hdiff > min_heading_diff
            }
            PreValidation::Custom(predicate) => predicate(pair),
        }
    }
}

/// Plausibility filter applied to a solved pair.
#[derive(Debug, Clone, Copy)]
pub enum PostValidation {
    /// Each vehicle's speed through the flow must lie strictly inside
    /// its own sample's flow-speed bounds.
    FlowSpeedBounds,
    /// Receives the solved row and the `from` / `to` states.
    Custom(fn(&Intersection, &State, &State) -> bool),
}

impl PostValidation {
    #[inline]
    pub fn keep(&self, row: &Intersection, first: &State, second: &State) -> bool {
        match *self {
            PostValidation::FlowSpeedBounds => {
                first.flow_speed_bounds().strictly_contains(row.h1_vel)
                    && second.flow_speed_bounds().strictly_contains(row.h2_vel)
            }
            PostValidation::Custom(predicate) => predicate(row, first, second),
        }
    }
}

/// Quality score assigned to every accepted pair.
#[derive(Debug, Clone, Copy)]
pub enum Weighting {
    /// Mean of three linear ramps clamped at zero: proximity in space,
    /// proximity in time, and closeness of the headings to perpendicular.
    ///
    /// The sum is always divided by 3, not by the number of non-zero terms,
    /// so weights stay comparable between tables.
    LinearRamps {
        space_zero: f64,
        time_zero: f64,
        heading_zero: f64,
    },
    /// Output is clamped into [0, 1]; NaN becomes 0.
    Custom(fn(&PairGeometry) -> f64),
}

/// `1` at zero distance, falling linearly to `0` at `zero`.
#[inline]
fn ramp(distance: f64, zero: f64) -> f64 {
    (1.0 - distance.abs() / zero).clamp(0.0, 1.0)
}

#[inline]
fn unit_interval(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

impl Weighting {
    pub fn weight(&self, pair: &PairGeometry) -> f64 {
        match *self {
            Weighting::LinearRamps {
                space_zero,
                time_zero,
                heading_zero,
            } => {
                let space = unit_interval(ramp(pair.sdiff, space_zero));
                let time = unit_interval(ramp(pair.tdiff, time_zero));
                let heading = unit_interval(ramp(pair.hdiff - 90.0, heading_zero));
                (space + time + heading) / 3.0
            }
            Weighting::Custom(score) => unit_interval(score(pair)),
        }
    }
}

/// The three policies the intersection engine runs.
#[derive(Debug, Clone, Copy)]
pub struct IntersectionPolicies {
    pub pre: PreValidation,
    pub post: PostValidation,
    pub weighting: Weighting,
}

impl IntersectionPolicies {
    pub fn with_pre_validation(mut self, pre: PreValidation) -> Self {
        self.pre = pre;
        self
    }

    pub fn with_post_validation(mut self, post: PostValidation) -> Self {
        self.post = post;
        self
    }

    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use flowrider_env::StateId;
    use proptest::prelude::*;

    fn reference_pre() -> PreValidation {
        PreValidation::Thresholds {
            max_dist: 50.0,
            max_time_diff: 100.0,
            min_heading_diff: 40.0,
        }
    }

    fn ramps() -> Weighting {
        Weighting::LinearRamps {
            space_zero: 100.0,
            time_zero: 60.0,
            heading_zero: 90.0,
        }
    }

    fn state_with_bounds(id: u64, min: f64, max: f64) -> State {
        State {
            id: StateId(id),
            x: 0.0,
            y: 0.0,
            z: 0.0,
            time: 0.0,
            track: 0.0,
            velocity: 1.0,
            heading: 0.0,
            min_flowspeed: min,
            max_flowspeed: max,
            done: false,
        }
    }

    fn solved_row(h1_vel: f64, h2_vel: f64) -> Intersection {
        Intersection {
            id1: StateId(0),
            id2: StateId(1),
            x: 0.0,
            y: 0.0,
            z: 0.0,
            sdiff: 1.0,
            tdiff: 1.0,
            hdiff: 90.0,
            t1_angle: 0.0,
            t1_vel: 1.0,
            h1_angle: 0.0,
            t2_angle: 90.0,
            t2_vel: 1.0,
            h2_angle: 90.0,
            h1_vel,
            h2_vel,
            flow_x: 0.0,
            flow_y: 0.0,
            weight: 0.0,
        }
    }

    #[test]
    fn test_pre_validation_drops_distant_pair() {
        let pre = reference_pre();
        // Everything else is ideal; distance alone rejects it
        let far = PairGeometry { sdiff: 60.0, tdiff: 0.0, hdiff: 90.0 };
        assert!(!pre.keep(&far));

        let near = PairGeometry { sdiff: 10.0, tdiff: 5.0, hdiff: 90.0 };
        assert!(pre.keep(&near));
    }

    #[test]
    fn test_pre_validation_heading_and_time_limits() {
        let pre = reference_pre();
        assert!(!pre.keep(&PairGeometry { sdiff: 1.0, tdiff: 1.0, hdiff: 40.0 }));
        assert!(!pre.keep(&PairGeometry { sdiff: 1.0, tdiff: -100.0, hdiff: 90.0 }));
        assert!(pre.keep(&PairGeometry { sdiff: 1.0, tdiff: -99.0, hdiff: 41.0 }));
    }

    #[test]
    fn test_post_validation_is_strict() {
        let post = PostValidation::FlowSpeedBounds;
        let a = state_with_bounds(0, 0.0, 10.0);
        let b = state_with_bounds(1, 2.0, 4.0);

        assert!(post.keep(&solved_row(5.0, 3.0), &a, &b));
        assert!(!post.keep(&solved_row(0.0, 3.0), &a, &b));
        assert!(!post.keep(&solved_row(5.0, 4.0), &a, &b));
        assert!(!post.keep(&solved_row(-1.0, 3.0), &a, &b));
    }

    #[test]
    fn test_custom_post_validation_sees_states() {
        fn same_sign(row: &Intersection, _: &State, _: &State) -> bool {
            row.h1_vel.signum() == row.h2_vel.signum()
        }
        let post = PostValidation::Custom(same_sign);
        let a = state_with_bounds(0, 0.0, 1.0);
        assert!(post.keep(&solved_row(-3.0, -1.0), &a, &a));
        assert!(!post.keep(&solved_row(3.0, -1.0), &a, &a));
    }

    #[test]
    fn test_ideal_pair_scores_one() {
        let w = ramps().weight(&PairGeometry { sdiff: 0.0, tdiff: 0.0, hdiff: 90.0 });
        assert_relative_eq!(w, 1.0);
    }

    #[test]
    fn test_ramps_average_over_three_terms() {
        // space term 0.5, time term clamped to 0, heading term 1
        let w = ramps().weight(&PairGeometry { sdiff: 50.0, tdiff: 600.0, hdiff: 90.0 });
        assert_relative_eq!(w, 1.5 / 3.0);

        // parallel headings contribute nothing to the heading term
        let w = ramps().weight(&PairGeometry { sdiff: 0.0, tdiff: 0.0, hdiff: 0.0 });
        assert_relative_eq!(w, 2.0 / 3.0);
    }

    #[test]
    fn test_custom_weight_is_clamped() {
        let loud = Weighting::Custom(|_| 7.0);
        let broken = Weighting::Custom(|_| f64::NAN);
        let pair = PairGeometry { sdiff: 0.0, tdiff: 0.0, hdiff: 90.0 };
        assert_eq!(loud.weight(&pair), 1.0);
        assert_eq!(broken.weight(&pair), 0.0);
    }

    proptest! {
        #[test]
        fn prop_weight_in_unit_interval(
            sdiff in -1.0e6f64..1.0e6,
            tdiff in -1.0e6f64..1.0e6,
            hdiff in -720.0f64..720.0,
            space_zero in 1.0e-6f64..1.0e6,
            time_zero in 1.0e-6f64..1.0e6,
            heading_zero in 1.0e-6f64..360.0,
        ) {
            let weighting = Weighting::LinearRamps { space_zero, time_zero, heading_zero };
            let w = weighting.weight(&PairGeometry { sdiff, tdiff, hdiff });
            prop_assert!((0.0..=1.0).contains(&w));
        }
    }
}
