//! The trajectory store: an append-only, ordered table of vehicle samples.
//!
//! Samples are never removed. The only mutation after insertion is the
//! `done` flag, which the intersection engine sets once a sample has been
//! used as the "from" side of a pair search.

use flowrider_env::{FlowContext, FlowSpeedBounds, State, StateId};
use geo::{BoundingRect, MultiPoint, Rect};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// OBSERVATION (Input)
// ============================================================================

/// One raw observation handed to [`TrajectoryStore::add_state`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Position [x, y, z] (m)
    pub position: [f64; 3],

    /// Sample time (s). `None` stamps the sample with the elapsed time
    /// since the store was created.
    pub time: Option<f64>,

    /// Azimuth of motion over the ground (degrees)
    pub track: f64,

    /// Speed over the ground (m/s)
    pub velocity: f64,

    /// Azimuth the vehicle points (degrees)
    pub heading: f64,

    /// Plausible speed through the flow. `None` uses the store default.
    pub flow_speed: Option<FlowSpeedBounds>,
}

impl Observation {
    pub fn new(position: [f64; 3], track: f64, velocity: f64, heading: f64) -> Self {
        Self {
            position,
            time: None,
            track,
            velocity,
            heading,
            flow_speed: None,
        }
    }

    pub fn at(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_flow_speed(mut self, bounds: FlowSpeedBounds) -> Self {
        self.flow_speed = Some(bounds);
        self
    }
}

// ============================================================================
// TRAJECTORY STORE
// ============================================================================

/// Append-only store of [`State`] samples.
pub struct TrajectoryStore<Ctx: FlowContext> {
    context: Arc<Ctx>,
    origin: Duration,
    states: Vec<State>,
    next_id: StateId,
    default_bounds: FlowSpeedBounds,
}

impl<Ctx: FlowContext> TrajectoryStore<Ctx> {
    /// Creates an empty store. Elapsed sample times are measured from now.
    pub fn new(context: Arc<Ctx>, default_bounds: FlowSpeedBounds) -> Self {
        let origin = context.now();
        Self {
            context,
            origin,
            states: Vec::new(),
            next_id: StateId(0),
            default_bounds,
        }
    }

    /// Appends a sample and returns its id.
    pub fn add_state(&mut self, obs: Observation) -> StateId {
        let id = self.next_id;
        self.next_id = id.next();

        let time = obs
            .time
            .unwrap_or_else(|| self.context.now().saturating_sub(self.origin).as_secs_f64());
        let bounds = obs.flow_speed.unwrap_or(self.default_bounds);
        let [x, y, z] = obs.position;

        self.states.push(State {
            id,
            x,
            y,
            z,
            time,
            track: obs.track,
            velocity: obs.velocity,
            heading: obs.heading,
            min_flowspeed: bounds.min,
            max_flowspeed: bounds.max,
            done: false,
        });
        id
    }

    /// All samples in insertion order.
    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn get(&self, id: StateId) -> Option<&State> {
        // ids are assigned in increasing order, so the table stays sorted
        self.states
            .binary_search_by_key(&id, |s| s.id)
            .ok()
            .map(|idx| &self.states[idx])
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of samples not yet used as a "from" side.
    pub fn pending(&self) -> usize {
        self.states.iter().filter(|s| !s.done).count()
    }

    pub fn default_bounds(&self) -> FlowSpeedBounds {
        self.default_bounds
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    /// Flags the given samples as consumed. Flags only ever go from false to true.
    pub(crate) fn mark_done(&mut self, ids: &[StateId]) {
        for id in ids {
            if let Ok(idx) = self.states.binary_search_by_key(id, |s| s.id) {
                self.states[idx].done = true;
            }
        }
    }

    /// Replaces the table with previously persisted samples.
    ///
    /// Rows are ordered by id and new ids continue after the largest one.
    pub fn replace_all(&mut self, mut states: Vec<State>) {
        states.sort_by_key(|s| s.id);
        states.dedup_by_key(|s| s.id);
        self.next_id = states.last().map_or(StateId(0), |s| s.id.next());
        self.states = states;
    }

    /// Bounding rectangle of all sample positions in the horizontal plane.
    pub fn extent(&self) -> Option<Rect<f64>> {
        let points: MultiPoint<f64> = self
            .states
            .iter()
            .map(|s| (s.x, s.y))
            .collect::<Vec<_>>()
            .into();
        points.bounding_rect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrider_env::SystemContext;

    fn store() -> TrajectoryStore<SystemContext> {
        TrajectoryStore::new(SystemContext::shared(), FlowSpeedBounds::new(0.0, 20.0))
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut store = store();
        let a = store.add_state(Observation::new([0.0, 0.0, 0.0], 90.0, 5.0, 0.0).at(1.0));
        let b = store.add_state(Observation::new([1.0, 0.0, 0.0], 90.0, 5.0, 0.0).at(2.0));
        assert_eq!(a, StateId(0));
        assert_eq!(b, StateId(1));
        assert_eq!(store.len(), 2);
        assert_eq!(store.pending(), 2);
        assert!(!store.get(b).unwrap().done);
    }

    #[test]
    fn test_default_bounds_and_time() {
        let mut store = store();
        let id = store.add_state(Observation::new([0.0, 0.0, 0.0], 0.0, 1.0, 0.0));
        let state = store.get(id).unwrap();
        assert_eq!(state.min_flowspeed, 0.0);
        assert_eq!(state.max_flowspeed, 20.0);
        assert!(state.time >= 0.0);

        let id = store.add_state(
            Observation::new([0.0, 0.0, 0.0], 0.0, 1.0, 0.0)
                .with_flow_speed(FlowSpeedBounds::new(1.0, 2.0)),
        );
        assert_eq!(store.get(id).unwrap().flow_speed_bounds(), FlowSpeedBounds::new(1.0, 2.0));
    }

    #[test]
    fn test_mark_done_is_sticky() {
        let mut store = store();
        let a = store.add_state(Observation::new([0.0, 0.0, 0.0], 0.0, 1.0, 0.0));
        store.add_state(Observation::new([0.0, 0.0, 0.0], 0.0, 1.0, 0.0));
        store.mark_done(&[a]);
        store.mark_done(&[a]);
        assert!(store.get(a).unwrap().done);
        assert_eq!(store.pending(), 1);
    }

    #[test]
    fn test_replace_all_continues_ids() {
        let mut source = store();
        for i in 0..3 {
            source.add_state(Observation::new([i as f64, 0.0, 0.0], 0.0, 1.0, 0.0).at(i as f64));
        }
        let mut loaded = source.states().to_vec();
        loaded.reverse();
        loaded[0].id = StateId(41);

        let mut store = store();
        store.replace_all(loaded);
        assert_eq!(store.states().first().unwrap().id, StateId(0));
        let id = store.add_state(Observation::new([0.0, 0.0, 0.0], 0.0, 1.0, 0.0));
        assert_eq!(id, StateId(42));
    }

    #[test]
    fn test_extent() {
        let mut store = store();
        assert!(store.extent().is_none());
        store.add_state(Observation::new([-5.0, 2.0, 0.0], 0.0, 1.0, 0.0));
        store.add_state(Observation::new([10.0, -3.0, 7.0], 0.0, 1.0, 0.0));
        let rect = store.extent().unwrap();
        assert_eq!(rect.min().x, -5.0);
        assert_eq!(rect.min().y, -3.0);
        assert_eq!(rect.max().x, 10.0);
        assert_eq!(rect.max().y, 2.0);
    }
}
