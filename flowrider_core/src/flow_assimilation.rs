//! Spatial assimilation of scattered intersection estimates onto a grid.
//!
//! Every cell centre pulls its `k` nearest intersection midpoints from an
//! R*-tree and reduces them to weighted mean, weighted standard deviation
//! and unweighted median of each flow component. Speed and azimuth are
//! derived from the mean components afterwards.

use crate::flow_grid::FlowGrids;
use crate::flow_solver::azimuth_of;
use flowrider_env::{GridLayout, Intersection};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

// ============================================================================
// SPATIAL INDEX
// ============================================================================

/// R*-tree over intersection midpoints, keyed by row index.
pub struct FlowIndex<'a> {
    table: &'a [Intersection],
    tree: RTree<IndexedPoint>,
}

impl<'a> FlowIndex<'a> {
    /// Indexes every row with a finite midpoint.
    pub fn build(table: &'a [Intersection]) -> Self {
        let points = table
            .iter()
            .enumerate()
            .filter(|(_, row)| row.x.is_finite() && row.y.is_finite())
            .map(|(idx, row)| GeomWithData::new([row.x, row.y], idx))
            .collect();
        Self {
            table,
            tree: RTree::bulk_load(points),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Up to `k` rows nearest to `(x, y)`, closest first. Fewer when the
    /// index is smaller than `k`.
    pub fn nearest(&self, x: f64, y: f64, k: usize) -> Vec<&'a Intersection> {
        let table = self.table;
        self.tree
            .nearest_neighbor_iter(&[x, y])
            .take(k)
            .map(|p| &table[p.data])
            .collect()
    }
}

// ============================================================================
// CELL STATISTICS
// ============================================================================

/// Reduced statistics of one cell. NaN where undefined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellStats {
    pub flow_x_mean: f64,
    pub flow_y_mean: f64,
    pub flow_x_sd: f64,
    pub flow_y_sd: f64,
    pub flow_x_med: f64,
    pub flow_y_med: f64,
}

impl CellStats {
    const MISSING: CellStats = CellStats {
        flow_x_mean: f64::NAN,
        flow_y_mean: f64::NAN,
        flow_x_sd: f64::NAN,
        flow_y_sd: f64::NAN,
        flow_x_med: f64::NAN,
        flow_y_med: f64::NAN,
    };

    /// Statistics over `rows`.
    ///
    /// Means and standard deviations use `weight`; the standard deviation
    /// is the population form `sqrt(sum(w (v - mean)^2) / sum(w))`. When the
    /// weights sum to zero the weighted terms are missing but medians are
    /// still reported.
    pub fn from_rows(rows: &[&Intersection]) -> Self {
        if rows.is_empty() {
            return Self::MISSING;
        }
        let (x_mean, x_sd) = weighted_mean_sd(rows, |r| r.flow_x);
        let (y_mean, y_sd) = weighted_mean_sd(rows, |r| r.flow_y);
        Self {
            flow_x_mean: x_mean,
            flow_y_mean: y_mean,
            flow_x_sd: x_sd,
            flow_y_sd: y_sd,
            flow_x_med: median(rows.iter().map(|r| r.flow_x).collect()),
            flow_y_med: median(rows.iter().map(|r| r.flow_y).collect()),
        }
    }
}

/// Weighted mean and population sd, accumulated relative to the first value
/// so that a lone or repeated value comes back exact with `sd == 0`.
fn weighted_mean_sd(rows: &[&Intersection], value: impl Fn(&Intersection) -> f64) -> (f64, f64) {
    let total: f64 = rows.iter().map(|r| r.weight).sum();
    if !(total > 0.0) {
        return (f64::NAN, f64::NAN);
    }
    let v0 = rows.first().map_or(0.0, |r| value(r));
    let shift = rows.iter().map(|r| r.weight * (value(r) - v0)).sum::<f64>() / total;
    let var = rows
        .iter()
        .map(|r| {
            let d = (value(r) - v0) - shift;
            r.weight * d * d
        })
        .sum::<f64>()
        / total;
    (v0 + shift, var.sqrt())
}

/// Middle value; the mean of the two middle values for an even count.
pub fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

// ============================================================================
// ASSIMILATOR
// ============================================================================

/// Owns the output grids and refills them on every pass.
#[derive(Debug, Clone)]
pub struct Assimilator {
    k_nearest: usize,
    grids: Option<FlowGrids>,
}

impl Assimilator {
    pub fn new(k_nearest: usize) -> Self {
        Self {
            k_nearest: k_nearest.max(1),
            grids: None,
        }
    }

    pub fn k_nearest(&self) -> usize {
        self.k_nearest
    }

    /// Grids of the last pass.
    pub fn grids(&self) -> Option<&FlowGrids> {
        self.grids.as_ref()
    }

    /// Layout of the last pass.
    pub fn layout(&self) -> Option<GridLayout> {
        self.grids.as_ref().map(FlowGrids::layout)
    }

    /// Recomputes every cell of `layout` from `table`.
    ///
    /// All eight grids are overwritten. An empty table leaves every cell missing.
    pub fn assimilate(&mut self, layout: GridLayout, table: &[Intersection]) -> &FlowGrids {
        let index = FlowIndex::build(table);
        let k = self.k_nearest;
        let ncols = layout.ncols;

        let reduce = |cell: usize| {
            let (x, y) = layout.cell_center(cell / ncols, cell % ncols);
            let rows = index.nearest(x, y, k);
            (CellStats::from_rows(&rows), rows.len())
        };

        #[cfg(feature = "parallel")]
        let cells: Vec<(CellStats, usize)> = (0..layout.cell_count()).into_par_iter().map(reduce).collect();

        #[cfg(not(feature = "parallel"))]
        let cells: Vec<(CellStats, usize)> = (0..layout.cell_count()).map(reduce).collect();

        let mut grids = FlowGrids::blank(layout);
        let mut short = 0usize;
        for (cell, (stats, found)) in cells.into_iter().enumerate() {
            if found < k {
                short += 1;
            }
            let at = (cell / ncols, cell % ncols);
            grids.flow_x_mean.values[at] = stats.flow_x_mean;
            grids.flow_y_mean.values[at] = stats.flow_y_mean;
            grids.flow_x_sd.values[at] = stats.flow_x_sd;
            grids.flow_y_sd.values[at] = stats.flow_y_sd;
            grids.flow_x_med.values[at] = stats.flow_x_med;
            grids.flow_y_med.values[at] = stats.flow_y_med;
            grids.flow_vel.values[at] = stats.flow_x_mean.hypot(stats.flow_y_mean);
            grids.flow_az.values[at] = azimuth_of(stats.flow_x_mean, stats.flow_y_mean);
        }

        debug!(
            cells = layout.cell_count(),
            indexed = index.len(),
            k,
            short_cells = short,
            "Assimilation pass complete"
        );

        self.grids.insert(grids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use flowrider_env::StateId;
    use proptest::prelude::*;

    fn row(x: f64, y: f64, flow_x: f64, flow_y: f64, weight: f64) -> Intersection {
        Intersection {
            id1: StateId(0),
            id2: StateId(1),
            x,
            y,
            z: 0.0,
            sdiff: 0.0,
            tdiff: 0.0,
            hdiff: 90.0,
            t1_angle: 0.0,
            t1_vel: 0.0,
            h1_angle: 0.0,
            t2_angle: 0.0,
            t2_vel: 0.0,
            h2_angle: 90.0,
            h1_vel: 0.0,
            h2_vel: 0.0,
            flow_x,
            flow_y,
            weight,
        }
    }

    fn layout(n: usize) -> GridLayout {
        GridLayout {
            origin_x: 0.0,
            origin_y: 0.0,
            cell_width: 10.0,
            cell_height: 10.0,
            ncols: n,
            nrows: n,
        }
    }

    #[test]
    fn test_single_point_in_single_cell() {
        let table = [row(5.0, 5.0, 3.0, 4.0, 0.8)];
        let mut assimilator = Assimilator::new(20);
        let grids = assimilator.assimilate(layout(1), &table);

        assert_relative_eq!(grids.flow_x_mean.get(0, 0).unwrap(), 3.0);
        assert_relative_eq!(grids.flow_y_mean.get(0, 0).unwrap(), 4.0);
        assert_eq!(grids.flow_x_sd.get(0, 0), Some(0.0));
        assert_eq!(grids.flow_y_sd.get(0, 0), Some(0.0));
        assert_relative_eq!(grids.flow_vel.get(0, 0).unwrap(), 5.0);
        assert_relative_eq!(grids.flow_az.get(0, 0).unwrap(), 3.0f64.atan2(4.0).to_degrees());
        assert_eq!(grids.flow_x_med.get(0, 0), Some(3.0));
    }

    #[test]
    fn test_empty_table_is_all_missing() {
        let mut assimilator = Assimilator::new(5);
        let grids = assimilator.assimilate(layout(3), &[]);
        for (_, raster) in grids.bands() {
            assert!(raster.values.iter().all(|v| v.is_nan()));
        }
    }

    #[test]
    fn test_weighted_mean_and_sd() {
        let a = row(0.0, 0.0, 1.0, 0.0, 1.0);
        let b = row(0.0, 0.0, 4.0, 2.0, 2.0);
        let stats = CellStats::from_rows(&[&a, &b]);

        // mean = (1 + 8) / 3 = 3, var = (1*4 + 2*1) / 3 = 2
        assert_relative_eq!(stats.flow_x_mean, 3.0);
        assert_relative_eq!(stats.flow_x_sd, 2.0f64.sqrt());
        assert_relative_eq!(stats.flow_x_med, 2.5);
        assert_relative_eq!(stats.flow_y_med, 1.0);
    }

    #[test]
    fn test_zero_weight_keeps_median() {
        let a = row(0.0, 0.0, 1.0, 1.0, 0.0);
        let b = row(0.0, 0.0, 3.0, 1.0, 0.0);
        let stats = CellStats::from_rows(&[&a, &b]);
        assert!(stats.flow_x_mean.is_nan());
        assert!(stats.flow_x_sd.is_nan());
        assert_eq!(stats.flow_x_med, 2.0);
    }

    #[test]
    fn test_median() {
        assert!(median(vec![]).is_nan());
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_nearest_respects_k() {
        let table = [
            row(0.0, 0.0, 1.0, 0.0, 1.0),
            row(1.0, 0.0, 2.0, 0.0, 1.0),
            row(50.0, 0.0, 9.0, 0.0, 1.0),
        ];
        let index = FlowIndex::build(&table);
        let near = index.nearest(0.1, 0.0, 2);
        assert_eq!(near.len(), 2);
        assert_eq!(near[0].flow_x, 1.0);
        assert_eq!(near[1].flow_x, 2.0);

        // asking for more than exist returns what there is
        assert_eq!(index.nearest(0.0, 0.0, 10).len(), 3);
    }

    #[test]
    fn test_repeat_pass_is_bit_identical() {
        let table: Vec<Intersection> = (0..40)
            .map(|i| {
                let f = i as f64;
                row((f * 7.3) % 30.0, (f * 3.1) % 30.0, f.sin(), f.cos(), 0.1 + (f % 5.0) / 5.0)
            })
            .collect();
        let mut assimilator = Assimilator::new(6);
        let first = assimilator.assimilate(layout(3), &table).clone();
        let second = assimilator.assimilate(layout(3), &table).clone();

        for ((_, a), (_, b)) in first.bands().iter().zip(second.bands().iter()) {
            let a_bits: Vec<u64> = a.values.iter().map(|v| v.to_bits()).collect();
            let b_bits: Vec<u64> = b.values.iter().map(|v| v.to_bits()).collect();
            assert_eq!(a_bits, b_bits);
        }
    }

    #[test]
    fn test_identical_rows_have_zero_sd() {
        let table = [row(1.0, 1.0, 0.3, -2.7, 0.7), row(2.0, 1.0, 0.3, -2.7, 0.35)];
        let stats = CellStats::from_rows(&[&table[0], &table[1]]);
        assert_eq!(stats.flow_x_mean, 0.3);
        assert_eq!(stats.flow_y_mean, -2.7);
        assert_eq!(stats.flow_x_sd, 0.0);
        assert_eq!(stats.flow_y_sd, 0.0);
    }

    proptest! {
        #[test]
        fn prop_single_row_is_exact(
            weight in 0.001f64..1.0,
            fx in -50.0f64..50.0,
            fy in -50.0f64..50.0,
        ) {
            let r = row(0.0, 0.0, fx, fy, weight);
            let stats = CellStats::from_rows(&[&r]);
            prop_assert_eq!(stats.flow_x_mean, fx);
            prop_assert_eq!(stats.flow_y_mean, fy);
            prop_assert_eq!(stats.flow_x_sd, 0.0);
            prop_assert_eq!(stats.flow_y_sd, 0.0);
        }
    }
}
