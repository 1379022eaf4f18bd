//! Output grids and the rule that decides their layout.

use crate::config::AssimilationConfig;
use crate::error::FlowError;
use flowrider_env::{GridLayout, RasterBand};
use geo::Rect;
use nalgebra::DMatrix;
use tracing::info;

// ============================================================================
// RASTER
// ============================================================================

/// One output grid. Row 0 is the first row of the layout; NaN marks a missing cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub layout: GridLayout,
    pub values: DMatrix<f64>,
}

impl Raster {
    /// Every cell missing.
    pub fn blank(layout: GridLayout) -> Self {
        Self {
            layout,
            values: DMatrix::from_element(layout.nrows, layout.ncols, f64::NAN),
        }
    }

    /// Value of a cell, `None` if out of range or missing.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get((row, col)).copied().filter(|v| !v.is_nan())
    }

    /// Row-major band for the raster collaborator.
    pub fn to_band(&self) -> RasterBand {
        // DMatrix is column-major; the transpose's storage is our row order
        RasterBand {
            layout: self.layout,
            values: self.values.transpose().as_slice().to_vec(),
        }
    }

    pub fn from_band(band: &RasterBand) -> Result<Self, FlowError> {
        let layout = band.layout;
        if band.values.len() != layout.cell_count() {
            return Err(FlowError::InvalidLayout(format!(
                "band holds {} values for a {}x{} layout",
                band.values.len(),
                layout.nrows,
                layout.ncols
            )));
        }
        Ok(Self {
            layout,
            values: DMatrix::from_row_slice(layout.nrows, layout.ncols, &band.values),
        })
    }
}

// ============================================================================
// FLOW GRIDS
// ============================================================================

/// The eight assimilation outputs. All share one layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowGrids {
    pub flow_x_mean: Raster,
    pub flow_y_mean: Raster,
    pub flow_x_sd: Raster,
    pub flow_y_sd: Raster,
    pub flow_x_med: Raster,
    pub flow_y_med: Raster,
    pub flow_vel: Raster,
    pub flow_az: Raster,
}

impl FlowGrids {
    pub fn blank(layout: GridLayout) -> Self {
        let r = Raster::blank(layout);
        Self {
            flow_x_mean: r.clone(),
            flow_y_mean: r.clone(),
            flow_x_sd: r.clone(),
            flow_y_sd: r.clone(),
            flow_x_med: r.clone(),
            flow_y_med: r.clone(),
            flow_vel: r.clone(),
            flow_az: r,
        }
    }

    pub fn layout(&self) -> GridLayout {
        self.flow_x_mean.layout
    }

    /// `(name, raster)` pairs in a fixed order.
    pub fn bands(&self) -> [(&'static str, &Raster); 8] {
        [
            ("flow_x_mean", &self.flow_x_mean),
            ("flow_y_mean", &self.flow_y_mean),
            ("flow_x_sd", &self.flow_x_sd),
            ("flow_y_sd", &self.flow_y_sd),
            ("flow_x_med", &self.flow_x_med),
            ("flow_y_med", &self.flow_y_med),
            ("flow_vel", &self.flow_vel),
            ("flow_az", &self.flow_az),
        ]
    }
}

// ============================================================================
// BOUNDS POLICY
// ============================================================================

/// How the grid layout of an assimilation pass is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundsPolicy {
    /// Always use this layout.
    Prototype(GridLayout),
    /// Derive from the trajectory extent once, then keep it.
    Fixed,
    /// Derive from the trajectory extent on every pass.
    Dynamic,
}

impl BoundsPolicy {
    /// Policy implied by the configuration and an optional prototype.
    pub fn from_config(config: &AssimilationConfig, prototype: Option<GridLayout>) -> Self {
        match prototype {
            Some(layout) => BoundsPolicy::Prototype(layout),
            None if config.dynamic_bounds => BoundsPolicy::Dynamic,
            None => BoundsPolicy::Fixed,
        }
    }
}

/// Layout to use for this pass.
///
/// `extent` is the current trajectory extent, `prior` the layout of the
/// previous pass, if any.
pub fn resolve_layout(
    policy: BoundsPolicy,
    extent: Option<Rect<f64>>,
    prior: Option<&GridLayout>,
    config: &AssimilationConfig,
) -> Result<GridLayout, FlowError> {
    match policy {
        BoundsPolicy::Prototype(layout) => {
            if layout.ncols == 0 || layout.nrows == 0 {
                return Err(FlowError::InvalidLayout(format!(
                    "prototype has {} rows and {} columns",
                    layout.nrows, layout.ncols
                )));
            }
            Ok(layout)
        }
        BoundsPolicy::Fixed => match prior {
            Some(layout) => Ok(*layout),
            None => derive_layout(extent, config),
        },
        BoundsPolicy::Dynamic => derive_layout(extent, config),
    }
}

/// Pads the extent and splits it into `grid_size` x `grid_size` cells.
fn derive_layout(extent: Option<Rect<f64>>, config: &AssimilationConfig) -> Result<GridLayout, FlowError> {
    let extent = extent.ok_or(FlowError::NoGridExtent)?;
    if config.grid_size == 0 {
        return Err(FlowError::config("grid_size must be at least 1"));
    }

    let pad = config.space_pad;
    let n = config.grid_size as f64;
    let origin_x = extent.min().x - pad;
    let origin_y = extent.min().y - pad;
    let mut cell_width = (extent.max().x + pad - origin_x) / n;
    let mut cell_height = (extent.max().y + pad - origin_y) / n;

    // a single point with no pad still needs a finite, non-zero cell
    if cell_width <= 0.0 {
        cell_width = 1.0;
    }
    if cell_height <= 0.0 {
        cell_height = 1.0;
    }

    let layout = GridLayout {
        origin_x,
        origin_y,
        cell_width,
        cell_height,
        ncols: config.grid_size,
        nrows: config.grid_size,
    };
    info!(
        origin_x,
        origin_y,
        cell_width,
        cell_height,
        size = config.grid_size,
        "Assimilation grid derived from trajectory extent"
    );
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::coord;

    fn extent() -> Rect<f64> {
        Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 100.0, y: 50.0 })
    }

    fn config() -> AssimilationConfig {
        AssimilationConfig {
            grid_size: 10,
            space_pad: 10.0,
            ..AssimilationConfig::default()
        }
    }

    #[test]
    fn test_derived_layout_covers_padded_extent() {
        let layout = resolve_layout(BoundsPolicy::Dynamic, Some(extent()), None, &config()).unwrap();
        assert_eq!(layout.origin_x, -10.0);
        assert_eq!(layout.origin_y, -10.0);
        assert_relative_eq!(layout.cell_width, 12.0);
        assert_relative_eq!(layout.cell_height, 7.0);
        assert_eq!((layout.nrows, layout.ncols), (10, 10));
    }

    #[test]
    fn test_fixed_keeps_prior_dynamic_does_not() {
        let config = config();
        let prior = resolve_layout(BoundsPolicy::Fixed, Some(extent()), None, &config).unwrap();

        let grown = Rect::new(coord! { x: -500.0, y: 0.0 }, coord! { x: 100.0, y: 50.0 });
        let fixed = resolve_layout(BoundsPolicy::Fixed, Some(grown), Some(&prior), &config).unwrap();
        assert_eq!(fixed, prior);

        let dynamic = resolve_layout(BoundsPolicy::Dynamic, Some(grown), Some(&prior), &config).unwrap();
        assert_eq!(dynamic.origin_x, -510.0);
    }

    #[test]
    fn test_prototype_wins() {
        let proto = GridLayout {
            origin_x: 1.0,
            origin_y: 2.0,
            cell_width: 3.0,
            cell_height: -3.0,
            ncols: 4,
            nrows: 5,
        };
        let layout = resolve_layout(BoundsPolicy::Prototype(proto), None, None, &config()).unwrap();
        assert_eq!(layout, proto);

        let empty = GridLayout { ncols: 0, ..proto };
        assert!(matches!(
            resolve_layout(BoundsPolicy::Prototype(empty), None, None, &config()),
            Err(FlowError::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_no_extent_is_an_error() {
        let err = resolve_layout(BoundsPolicy::Fixed, None, None, &config()).unwrap_err();
        assert!(matches!(err, FlowError::NoGridExtent));
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = config();
        assert_eq!(BoundsPolicy::from_config(&config, None), BoundsPolicy::Fixed);
        config.dynamic_bounds = true;
        assert_eq!(BoundsPolicy::from_config(&config, None), BoundsPolicy::Dynamic);
    }

    #[test]
    fn test_band_conversion_is_row_major() {
        let layout = GridLayout {
            origin_x: 0.0,
            origin_y: 0.0,
            cell_width: 1.0,
            cell_height: 1.0,
            ncols: 3,
            nrows: 2,
        };
        let mut raster = Raster::blank(layout);
        raster.values[(0, 2)] = 1.5;
        raster.values[(1, 0)] = -2.0;

        let band = raster.to_band();
        assert_eq!(band.get(0, 2), 1.5);
        assert_eq!(band.get(1, 0), -2.0);
        assert!(band.get(0, 0).is_nan());

        let back = Raster::from_band(&band).unwrap();
        assert_eq!(back.get(0, 2), Some(1.5));
        assert_eq!(back.get(1, 1), None);
        assert_eq!(back.get(7, 7), None);
    }
}
