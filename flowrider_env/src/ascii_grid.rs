//! ESRI ASCII grid implementation of the raster collaborator.
//!
//! Header keys: `ncols`, `nrows`, `xllcorner`/`xllcenter`,
//! `yllcorner`/`yllcenter`, `cellsize` (or `dx` + `dy`) and `NODATA_value`.
//! Rows are stored north to south.

use crate::error::EnvError;
use crate::storage::RasterStorage;
use crate::types::{GridLayout, RasterBand};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// No-data value assumed when a file omits `NODATA_value`.
const DEFAULT_NODATA: f64 = -9999.0;

/// Reads and writes single-band ESRI ASCII grids.
#[derive(Debug, Clone, Default)]
pub struct AsciiGridStorage;

impl AsciiGridStorage {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Default)]
struct Header {
    ncols: Option<usize>,
    nrows: Option<usize>,
    xll: Option<f64>,
    yll: Option<f64>,
    x_is_center: bool,
    y_is_center: bool,
    cellsize: Option<f64>,
    dx: Option<f64>,
    dy: Option<f64>,
    nodata: Option<f64>,
}

fn parse_number<T: std::str::FromStr>(path: &Path, key: &str, value: &str) -> Result<T, EnvError> {
    value
        .parse::<T>()
        .map_err(|_| EnvError::raster(path, format!("invalid value `{value}` for {key}")))
}

impl RasterStorage for AsciiGridStorage {
    fn read_raster(&self, path: &Path) -> Result<RasterBand, EnvError> {
        let text = fs::read_to_string(path).map_err(|e| EnvError::io(path, e))?;
        let mut header = Header::default();
        let mut lines = text.lines().peekable();

        while let Some(line) = lines.peek() {
            let mut parts = line.split_whitespace();
            let key = match parts.next() {
                Some(key) => key.to_ascii_lowercase(),
                None => {
                    lines.next();
                    continue;
                }
            };
            if key.parse::<f64>().is_ok() {
                break; // first data row
            }
            let value = parts
                .next()
                .ok_or_else(|| EnvError::raster(path, format!("header key {key} has no value")))?;
            match key.as_str() {
                "ncols" => header.ncols = Some(parse_number(path, &key, value)?),
                "nrows" => header.nrows = Some(parse_number(path, &key, value)?),
                "xllcorner" => header.xll = Some(parse_number(path, &key, value)?),
                "yllcorner" => header.yll = Some(parse_number(path, &key, value)?),
                "xllcenter" => {
                    header.xll = Some(parse_number(path, &key, value)?);
                    header.x_is_center = true;
                }
                "yllcenter" => {
                    header.yll = Some(parse_number(path, &key, value)?);
                    header.y_is_center = true;
                }
                "cellsize" => header.cellsize = Some(parse_number(path, &key, value)?),
                "dx" => header.dx = Some(parse_number(path, &key, value)?),
                "dy" => header.dy = Some(parse_number(path, &key, value)?),
                "nodata_value" => header.nodata = Some(parse_number(path, &key, value)?),
                other => return Err(EnvError::raster(path, format!("unknown header key {other}"))),
            }
            lines.next();
        }

        let ncols = header.ncols.ok_or_else(|| EnvError::raster(path, "missing ncols"))?;
        let nrows = header.nrows.ok_or_else(|| EnvError::raster(path, "missing nrows"))?;
        let dx = header
            .dx
            .or(header.cellsize)
            .ok_or_else(|| EnvError::raster(path, "missing cellsize"))?;
        let dy = header
            .dy
            .or(header.cellsize)
            .ok_or_else(|| EnvError::raster(path, "missing cellsize"))?;
        let mut xll = header.xll.ok_or_else(|| EnvError::raster(path, "missing xllcorner"))?;
        let mut yll = header.yll.ok_or_else(|| EnvError::raster(path, "missing yllcorner"))?;
        if header.x_is_center {
            xll -= dx / 2.0;
        }
        if header.y_is_center {
            yll -= dy / 2.0;
        }
        let nodata = header.nodata.unwrap_or(DEFAULT_NODATA);

        let layout = GridLayout {
            origin_x: xll,
            origin_y: yll + nrows as f64 * dy,
            cell_width: dx,
            cell_height: -dy,
            ncols,
            nrows,
        };

        let values = lines
            .flat_map(str::split_whitespace)
            .map(|token| {
                let value: f64 = parse_number(path, "cell", token)?;
                Ok(if value == nodata { f64::NAN } else { value })
            })
            .collect::<Result<Vec<f64>, EnvError>>()?;

        if values.len() != layout.cell_count() {
            return Err(EnvError::raster(
                path,
                format!("expected {} cells, found {}", layout.cell_count(), values.len()),
            ));
        }

        Ok(RasterBand { layout, values })
    }

    fn write_raster(&self, path: &Path, band: &RasterBand, nodata: f64) -> Result<(), EnvError> {
        let layout = band.layout;
        if !(layout.cell_width > 0.0) || layout.cell_height == 0.0 || !layout.cell_height.is_finite() {
            return Err(EnvError::raster(path, "cell size must be non-zero and finite"));
        }
        if band.values.len() != layout.cell_count() {
            return Err(EnvError::raster(path, "band size does not match its layout"));
        }

        let dy = layout.cell_height.abs();
        let north_up = layout.cell_height < 0.0;
        let yll = if north_up {
            layout.origin_y + layout.nrows as f64 * layout.cell_height
        } else {
            layout.origin_y
        };

        let file = fs::File::create(path).map_err(|e| EnvError::io(path, e))?;
        let mut out = BufWriter::new(file);
        let mut write = || -> std::io::Result<()> {
            writeln!(out, "ncols {}", layout.ncols)?;
            writeln!(out, "nrows {}", layout.nrows)?;
            writeln!(out, "xllcorner {}", layout.origin_x)?;
            writeln!(out, "yllcorner {}", yll)?;
            if layout.cell_width == dy {
                writeln!(out, "cellsize {}", layout.cell_width)?;
            } else {
                writeln!(out, "dx {}", layout.cell_width)?;
                writeln!(out, "dy {}", dy)?;
            }
            writeln!(out, "NODATA_value {}", nodata)?;

            for i in 0..layout.nrows {
                // Grids laid out south-up are flipped so the file reads north first
                let row = if north_up { i } else { layout.nrows - 1 - i };
                let line = (0..layout.ncols)
                    .map(|col| {
                        let value = band.get(row, col);
                        if value.is_nan() { nodata.to_string() } else { value.to_string() }
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(out, "{line}")?;
            }
            out.flush()
        };
        write().map_err(|e| EnvError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn north_up_layout() -> GridLayout {
        GridLayout {
            origin_x: 100.0,
            origin_y: 530.0,
            cell_width: 10.0,
            cell_height: -10.0,
            ncols: 3,
            nrows: 2,
        }
    }

    #[test]
    fn test_nodata_round_trips_as_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flow_vel.asc");
        let storage = AsciiGridStorage::new();

        let mut band = RasterBand::blank(north_up_layout());
        band.set(0, 0, 1.5);
        band.set(1, 2, -0.25);
        storage.write_raster(&path, &band, -9999.0).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("NODATA_value -9999"));
        assert!(text.contains("yllcorner 510"));

        let loaded = storage.read_raster(&path).unwrap();
        assert_eq!(loaded.layout, north_up_layout());
        assert_eq!(loaded.get(0, 0), 1.5);
        assert_eq!(loaded.get(1, 2), -0.25);
        assert!(loaded.get(0, 1).is_nan());
    }

    #[test]
    fn test_south_up_layout_is_flipped_on_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flipped.asc");
        let storage = AsciiGridStorage::new();

        let layout = GridLayout {
            origin_x: 0.0,
            origin_y: 0.0,
            cell_width: 2.0,
            cell_height: 2.0,
            ncols: 1,
            nrows: 2,
        };
        let band = RasterBand { layout, values: vec![1.0, 2.0] };
        storage.write_raster(&path, &band, -1.0).unwrap();

        let loaded = storage.read_raster(&path).unwrap();
        // Row 0 of the loaded grid is the northern cell, i.e. the old row 1
        assert_eq!(loaded.values, vec![2.0, 1.0]);
        assert_eq!(loaded.layout.origin_y, 4.0);
        assert_eq!(loaded.layout.cell_height, -2.0);
        assert_eq!(loaded.layout.cell_center(1, 0), layout.cell_center(0, 0));
    }

    #[test]
    fn test_cell_count_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.asc");
        fs::write(
            &path,
            "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\nNODATA_value -9999\n1 2 3\n",
        )
        .unwrap();

        let err = AsciiGridStorage::new().read_raster(&path).unwrap_err();
        assert!(matches!(err, EnvError::MalformedRaster { .. }));
        assert!(err.to_string().contains("short.asc"));
    }

    #[test]
    fn test_rectangular_cells_use_dx_dy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rect.asc");
        let layout = GridLayout {
            origin_x: 0.0,
            origin_y: 10.0,
            cell_width: 2.0,
            cell_height: -5.0,
            ncols: 2,
            nrows: 2,
        };
        let band = RasterBand { layout, values: vec![0.0, 1.0, 2.0, 3.0] };
        let storage = AsciiGridStorage::new();
        storage.write_raster(&path, &band, -9999.0).unwrap();

        let loaded = storage.read_raster(&path).unwrap();
        assert_eq!(loaded, band);
    }
}
