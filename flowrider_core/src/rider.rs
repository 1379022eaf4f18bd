//! FlowRider - orchestrates the flowrider engines with an environment context.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         FlowRider                            │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │  Context: FlowContext                                  │  │
//! │  │  • now() → default sample time                        │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌────────────────┐  │
//! │  │  TRAJECTORY  │→ │   INTERSECTION   │→ │  ASSIMILATION  │  │
//! │  │    Store     │  │     Engine       │  │    (grids)     │  │
//! │  └──────────────┘  └──────────────────┘  └────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use flowrider_core::{FlowConfig, FlowRider, Observation};
//! use flowrider_env::SystemContext;
//!
//! let mut rider = FlowRider::new(SystemContext::shared(), FlowConfig::default())?;
//! rider.add_state(Observation::new([0.0, 0.0, 0.0], 90.0, 5.0, 0.0));
//! let grids = rider.assimilate(None)?;
//! ```

use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::flow_assimilation::Assimilator;
use crate::flow_grid::{resolve_layout, BoundsPolicy, FlowGrids};
use crate::flow_intersections::{FlowSummary, IntersectionEngine};
use crate::flow_policy::IntersectionPolicies;
use crate::flow_states::{Observation, TrajectoryStore};
use flowrider_env::{
    FlowContext, GridLayout, Intersection, IntersectionStorage, RasterStorage, StateId,
    TrajectoryStorage,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns the trajectory store, the intersection table and the grids.
pub struct FlowRider<Ctx: FlowContext> {
    config: FlowConfig,
    store: TrajectoryStore<Ctx>,
    engine: IntersectionEngine,
    assimilator: Assimilator,
}

impl<Ctx: FlowContext> FlowRider<Ctx> {
    /// Validates `config` and builds the reference policies from it.
    pub fn new(context: Arc<Ctx>, config: FlowConfig) -> Result<Self, FlowError> {
        let policies = config.policies()?;
        Ok(Self::assemble(context, config, policies))
    }

    /// Like [`FlowRider::new`] but with caller-supplied policies.
    pub fn with_policies(
        context: Arc<Ctx>,
        config: FlowConfig,
        policies: IntersectionPolicies,
    ) -> Result<Self, FlowError> {
        config.validate()?;
        Ok(Self::assemble(context, config, policies))
    }

    fn assemble(context: Arc<Ctx>, config: FlowConfig, policies: IntersectionPolicies) -> Self {
        let store = TrajectoryStore::new(context, config.intersections.flow_speed_bounds());
        let assimilator = Assimilator::new(config.assimilation.k_nearest);
        Self {
            config,
            store,
            engine: IntersectionEngine::new(policies),
            assimilator,
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn store(&self) -> &TrajectoryStore<Ctx> {
        &self.store
    }

    pub fn engine(&self) -> &IntersectionEngine {
        &self.engine
    }

    pub fn intersections(&self) -> &[Intersection] {
        self.engine.table()
    }

    pub fn grids(&self) -> Option<&FlowGrids> {
        self.assimilator.grids()
    }

    /// Records one sample and immediately searches it for intersections.
    pub fn add_state(&mut self, obs: Observation) -> StateId {
        let id = self.store.add_state(obs);
        self.engine.update(&mut self.store);
        id
    }

    /// Records a batch of samples, then runs a single intersection pass.
    pub fn ingest<I>(&mut self, observations: I) -> Vec<StateId>
    where
        I: IntoIterator<Item = Observation>,
    {
        let ids = observations
            .into_iter()
            .map(|obs| self.store.add_state(obs))
            .collect();
        self.engine.update(&mut self.store);
        ids
    }

    /// Runs an intersection pass over every pending sample.
    pub fn update(&mut self) -> &[Intersection] {
        self.engine.update(&mut self.store)
    }

    /// Unweighted mean flow over the whole intersection table.
    pub fn global_mean_flow(&self) -> Option<FlowSummary> {
        self.engine.global_mean_flow()
    }

    /// Fills the grids from the intersection table.
    ///
    /// A `prototype` layout is used as-is. Without one, the layout comes from
    /// the trajectory extent, either once or on every call depending on
    /// `assimilation.dynamic_bounds`.
    pub fn assimilate(&mut self, prototype: Option<GridLayout>) -> Result<&FlowGrids, FlowError> {
        let settings = &self.config.assimilation;
        let policy = BoundsPolicy::from_config(settings, prototype);
        let prior = self.assimilator.layout();
        let layout = resolve_layout(policy, self.store.extent(), prior.as_ref(), settings)?;

        if prior != Some(layout) {
            info!(
                rows = layout.nrows,
                cols = layout.ncols,
                origin_x = layout.origin_x,
                origin_y = layout.origin_y,
                "Assimilation grid initialised"
            );
        }
        Ok(self.assimilator.assimilate(layout, self.engine.table()))
    }

    /// Writes the state and intersection tables into `folder`.
    pub fn write<S>(&self, storage: &S, folder: &Path) -> Result<(), FlowError>
    where
        S: TrajectoryStorage + IntersectionStorage,
    {
        let files = &self.config.files;
        storage.write_states(&folder.join(&files.states_file), self.store.states())?;
        storage.write_intersections(&folder.join(&files.intersections_file), self.engine.table())?;
        info!(
            states = self.store.len(),
            intersections = self.engine.table().len(),
            folder = %folder.display(),
            "Tables written"
        );
        Ok(())
    }

    /// Replaces both tables with the ones stored in `folder`.
    ///
    /// Nothing is replaced unless both files load.
    pub fn read<S>(&mut self, storage: &S, folder: &Path) -> Result<(), FlowError>
    where
        S: TrajectoryStorage + IntersectionStorage,
    {
        let files = &self.config.files;
        let defaults = self.config.intersections.flow_speed_bounds();
        let states = storage.read_states(&folder.join(&files.states_file), defaults)?;
        let rows = storage.read_intersections(&folder.join(&files.intersections_file))?;

        info!(states = states.len(), intersections = rows.len(), "Tables loaded");
        self.store.replace_all(states);
        self.engine.replace_table(rows);
        Ok(())
    }

    /// Reads only the state table from `path`. Pending samples are searched
    /// on the next [`FlowRider::update`].
    pub fn read_states<S: TrajectoryStorage>(&mut self, storage: &S, path: &Path) -> Result<usize, FlowError> {
        let states = storage.read_states(path, self.config.intersections.flow_speed_bounds())?;
        let n = states.len();
        self.store.replace_all(states);
        Ok(n)
    }

    /// Writes the eight grids of the last pass into `folder`.
    pub fn write_assimilations<R: RasterStorage>(&self, storage: &R, folder: &Path) -> Result<(), FlowError> {
        let Some(grids) = self.assimilator.grids() else {
            warn!("No assimilation has run; nothing to write");
            return Ok(());
        };
        let files = &self.config.files;
        let nodata = self.config.assimilation.nodata;
        let targets = [
            &files.flow_x_mean,
            &files.flow_y_mean,
            &files.flow_x_sd,
            &files.flow_y_sd,
            &files.flow_x_med,
            &files.flow_y_med,
            &files.flow_vel,
            &files.flow_az,
        ];
        for ((_, raster), file) in grids.bands().into_iter().zip(targets) {
            storage.write_raster(&folder.join(file), &raster.to_band(), nodata)?;
        }
        Ok(())
    }
}

/// Layout of an existing raster, for use as an assimilation prototype.
pub fn read_prototype<R: RasterStorage>(storage: &R, path: &Path) -> Result<GridLayout, FlowError> {
    Ok(storage.read_raster(path)?.layout)
}
