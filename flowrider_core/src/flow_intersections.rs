//! The intersection engine.
//!
//! Each `update` runs a four-stage pipeline for every sample not yet used
//! as a "from" side, against every sample in the store:
//! 1. Pre-validation on cheap geometry (separation, time, heading difference)
//! 2. Geometric solve for the implied flow vector
//! 3. Post-validation of the solved speeds
//! 4. Weighting
//!
//! The batch is computed against an immutable view of the store and then
//! committed in one step: rows are appended and the consumed samples are
//! flagged `done`. Committed rows are never revised.

use crate::flow_policy::{IntersectionPolicies, PairGeometry};
use crate::flow_solver::{self, Leg};
use crate::flow_states::TrajectoryStore;
use flowrider_env::{FlowContext, Intersection, State, StateId};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Counters for one `update` batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Samples used as a "from" side
    pub from_states: usize,
    /// Pairs examined, self-pairs excluded
    pub candidates: usize,
    /// Pairs that passed pre-validation
    pub pre_validated: usize,
    /// Pairs with a non-degenerate solve
    pub solved: usize,
    /// Pairs that passed post-validation and were appended
    pub accepted: usize,
}

impl BatchStats {
    fn merge(mut self, other: BatchStats) -> Self {
        self.from_states += other.from_states;
        self.candidates += other.candidates;
        self.pre_validated += other.pre_validated;
        self.solved += other.solved;
        self.accepted += other.accepted;
        self
    }
}

/// Table-wide mean flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub flow_x_mean: f64,
    pub flow_y_mean: f64,
    /// Azimuth of the mean vector (degrees, [0, 360))
    pub flow_az: f64,
    /// Length of the mean vector
    pub flow_vel: f64,
}

/// Owns the intersection table and grows it from a trajectory store.
#[derive(Debug, Clone)]
pub struct IntersectionEngine {
    policies: IntersectionPolicies,
    table: Vec<Intersection>,
    last_stats: BatchStats,
}

impl IntersectionEngine {
    pub fn new(policies: IntersectionPolicies) -> Self {
        Self {
            policies,
            table: Vec::new(),
            last_stats: BatchStats::default(),
        }
    }

    pub fn policies(&self) -> &IntersectionPolicies {
        &self.policies
    }

    /// Swaps the policies used by later updates. Committed rows are kept.
    pub fn set_policies(&mut self, policies: IntersectionPolicies) {
        self.policies = policies;
    }

    /// Every committed row, oldest batch first.
    pub fn table(&self) -> &[Intersection] {
        &self.table
    }

    /// Installs a previously persisted table.
    pub fn replace_table(&mut self, rows: Vec<Intersection>) {
        self.table = rows;
    }

    /// Counters of the most recent `update`.
    pub fn last_stats(&self) -> BatchStats {
        self.last_stats
    }

    /// Runs the pipeline for every pending sample and returns the rows
    /// appended by this call.
    pub fn update<Ctx: FlowContext>(&mut self, store: &mut TrajectoryStore<Ctx>) -> &[Intersection] {
        let (batch, consumed, stats) = self.compute_batch(store.states());

        // Commit
        let start = self.table.len();
        self.table.extend(batch);
        store.mark_done(&consumed);
        self.last_stats = stats;

        debug!(
            from_states = stats.from_states,
            candidates = stats.candidates,
            pre_validated = stats.pre_validated,
            solved = stats.solved,
            accepted = stats.accepted,
            total = self.table.len(),
            "Intersection batch committed"
        );

        &self.table[start..]
    }

    fn compute_batch(&self, states: &[State]) -> (Vec<Intersection>, Vec<StateId>, BatchStats) {
        let from: Vec<&State> = states.iter().filter(|s| !s.done).collect();
        let consumed = from.iter().map(|s| s.id).collect();
        let policies = &self.policies;

        #[cfg(feature = "parallel")]
        let per_state: Vec<(Vec<Intersection>, BatchStats)> = from
            .par_iter()
            .map(|a| search_from(a, states, policies))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let per_state: Vec<(Vec<Intersection>, BatchStats)> = from
            .iter()
            .map(|a| search_from(a, states, policies))
            .collect();

        let mut stats = BatchStats::default();
        let mut rows = Vec::new();
        for (found, s) in per_state {
            rows.extend(found);
            stats = stats.merge(s);
        }
        (rows, consumed, stats)
    }

    /// Unweighted mean of `flow_x` and `flow_y` over the whole table.
    ///
    /// `None` when the table is empty.
    pub fn global_mean_flow(&self) -> Option<FlowSummary> {
        if self.table.is_empty() {
            return None;
        }
        let n = self.table.len() as f64;
        let (sx, sy) = self
            .table
            .iter()
            .fold((0.0, 0.0), |(sx, sy), row| (sx + row.flow_x, sy + row.flow_y));
        let (mx, my) = (sx / n, sy / n);
        Some(FlowSummary {
            flow_x_mean: mx,
            flow_y_mean: my,
            flow_az: flow_solver::azimuth_of(mx, my),
            flow_vel: mx.hypot(my),
        })
    }
}

/// Geometry of the pair `(a, b)`.
#[inline]
pub fn pair_geometry(a: &State, b: &State) -> PairGeometry {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    PairGeometry {
        sdiff: (dx * dx + dy * dy + dz * dz).sqrt(),
        tdiff: (a.time - b.time).abs(),
        hdiff: flow_solver::heading_difference(a.heading, b.heading),
    }
}

/// Searches every sample in `all` for a valid crossing with `a`.
fn search_from(
    a: &State,
    all: &[State],
    policies: &IntersectionPolicies,
) -> (Vec<Intersection>, BatchStats) {
    let mut stats = BatchStats {
        from_states: 1,
        ..BatchStats::default()
    };
    let mut rows = Vec::new();
    let leg_a = Leg::from(a);

    for b in all {
        if b.id == a.id {
            continue;
        }
        stats.candidates += 1;

        let geometry = pair_geometry(a, b);
        if !policies.pre.keep(&geometry) {
            continue;
        }
        stats.pre_validated += 1;

        let Some(solution) = flow_solver::calc(&leg_a, &Leg::from(b)) else {
            continue;
        };
        stats.solved += 1;

        let mut row = Intersection {
            id1: a.id,
            id2: b.id,
            x: (a.x + b.x) / 2.0,
            y: (a.y + b.y) / 2.0,
            z: (a.z + b.z) / 2.0,
            sdiff: geometry.sdiff,
            tdiff: geometry.tdiff,
            hdiff: geometry.hdiff,
            t1_angle: a.track,
            t1_vel: a.velocity,
            h1_angle: a.heading,
            t2_angle: b.track,
            t2_vel: b.velocity,
            h2_angle: b.heading,
            h1_vel: solution.h1_vel,
            h2_vel: solution.h2_vel,
            flow_x: solution.flow.x,
            flow_y: solution.flow.y,
            weight: 0.0,
        };
        if !policies.post.keep(&row, a, b) {
            continue;
        }
        row.weight = policies.weighting.weight(&geometry);
        stats.accepted += 1;
        rows.push(row);
    }

    (rows, stats)
}
