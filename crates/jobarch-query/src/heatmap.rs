//! 2-D binning for roofline heatmaps
//!
//! The grid is indexed `tiles[row][col]` where rows follow the y axis and
//! columns the x axis. Bin width on each axis is `(max - min) / count`; a
//! coordinate equal to the upper bound falls into the last bin.

use crate::config::HeatmapScale;
use crate::{QueryError, Result};
use serde::{Deserialize, Serialize};

/// Requested grid shape and domain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapSpec {
    pub rows: usize,
    pub cols: usize,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl HeatmapSpec {
    pub fn new(rows: usize, cols: usize, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            rows,
            cols,
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn validate(&self, scale: HeatmapScale) -> Result<()> {
        if self.rows < 1 || self.cols < 1 {
            return Err(QueryError::invalid_range("rows and cols must be at least 1"));
        }
        let bounds = [self.min_x, self.min_y, self.max_x, self.max_y];
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(QueryError::invalid_range("heatmap bounds must be finite"));
        }
        if self.max_x <= self.min_x {
            return Err(QueryError::invalid_range("maxX must be greater than minX"));
        }
        if self.max_y <= self.min_y {
            return Err(QueryError::invalid_range("maxY must be greater than minY"));
        }
        if scale == HeatmapScale::Log10 && (self.min_x <= 0.0 || self.min_y <= 0.0) {
            return Err(QueryError::invalid_range(
                "logarithmic heatmap bounds must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Axis {
    min: f64,
    max: f64,
    bins: usize,
}

impl Axis {
    fn new(min: f64, max: f64, bins: usize, scale: HeatmapScale) -> Self {
        Self {
            min: transform(min, scale),
            max: transform(max, scale),
            bins,
        }
    }

    /// Bin of an already transformed coordinate, `None` outside the domain
    fn bin(&self, v: f64) -> Option<usize> {
        if !v.is_finite() || v < self.min || v > self.max {
            return None;
        }
        let width = (self.max - self.min) / self.bins as f64;
        let index = ((v - self.min) / width).floor() as usize;
        Some(index.min(self.bins - 1))
    }
}

fn transform(v: f64, scale: HeatmapScale) -> f64 {
    match scale {
        HeatmapScale::Linear => v,
        HeatmapScale::Log10 if v > 0.0 => v.log10(),
        HeatmapScale::Log10 => f64::NAN,
    }
}

/// Weighted 2-D histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapGrid {
    pub spec: HeatmapSpec,
    pub scale: HeatmapScale,

    /// `tiles[row][col]`, rows along y
    pub tiles: Vec<Vec<f64>>,
}

impl HeatmapGrid {
    /// Empty grid over a validated spec
    pub fn new(spec: HeatmapSpec, scale: HeatmapScale) -> Result<Self> {
        spec.validate(scale)?;
        Ok(Self {
            spec,
            scale,
            tiles: vec![vec![0.0; spec.cols]; spec.rows],
        })
    }

    /// Add `weight` at `(x, y)`. Returns false if the point is outside the
    /// domain or not finite.
    pub fn add(&mut self, x: f64, y: f64, weight: f64) -> bool {
        let x_axis = Axis::new(self.spec.min_x, self.spec.max_x, self.spec.cols, self.scale);
        let y_axis = Axis::new(self.spec.min_y, self.spec.max_y, self.spec.rows, self.scale);
        let (Some(col), Some(row)) = (
            x_axis.bin(transform(x, self.scale)),
            y_axis.bin(transform(y, self.scale)),
        ) else {
            return false;
        };
        self.tiles[row][col] += weight;
        true
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.tiles.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Sum of all tile weights
    pub fn total(&self) -> f64 {
        self.tiles.iter().flatten().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_two_by_two_grid() {
        let spec = HeatmapSpec::new(2, 2, 0.0, 0.0, 10.0, 10.0);
        let mut grid = HeatmapGrid::new(spec, HeatmapScale::Linear).unwrap();

        assert!(grid.add(2.0, 2.0, 1.0));
        assert!(grid.add(7.0, 7.0, 1.0));
        assert!(grid.add(10.0, 10.0, 1.0));
        assert!(!grid.add(11.0, 5.0, 1.0));

        assert_eq!(grid.tiles, vec![vec![1.0, 0.0], vec![0.0, 2.0]]);
        assert_eq!(grid.total(), 3.0);
    }

    #[test]
    fn test_rows_follow_y_axis() {
        let spec = HeatmapSpec::new(2, 4, 0.0, 0.0, 4.0, 2.0);
        let mut grid = HeatmapGrid::new(spec, HeatmapScale::Linear).unwrap();
        assert!(grid.add(3.5, 0.5, 2.5));

        assert_eq!(grid.get(0, 3), Some(2.5));
        assert_eq!(grid.tiles.len(), 2);
        assert_eq!(grid.tiles[0].len(), 4);
    }

    #[test]
    fn test_non_finite_and_out_of_domain_are_skipped() {
        let spec = HeatmapSpec::new(3, 3, -1.0, -1.0, 1.0, 1.0);
        let mut grid = HeatmapGrid::new(spec, HeatmapScale::Linear).unwrap();
        assert!(!grid.add(f64::NAN, 0.0, 1.0));
        assert!(!grid.add(0.0, f64::INFINITY, 1.0));
        assert!(!grid.add(-1.5, 0.0, 1.0));
        assert!(grid.add(-1.0, -1.0, 1.0));
        assert_eq!(grid.total(), 1.0);
    }

    #[test]
    fn test_invalid_specs() {
        let cases = [
            HeatmapSpec::new(0, 2, 0.0, 0.0, 1.0, 1.0),
            HeatmapSpec::new(2, 0, 0.0, 0.0, 1.0, 1.0),
            HeatmapSpec::new(2, 2, 1.0, 0.0, 1.0, 1.0),
            HeatmapSpec::new(2, 2, 0.0, 2.0, 1.0, 1.0),
            HeatmapSpec::new(2, 2, 0.0, 0.0, f64::NAN, 1.0),
        ];
        for spec in cases {
            let err = HeatmapGrid::new(spec, HeatmapScale::Linear).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRange);
        }
    }

    #[test]
    fn test_log_scale() {
        let spec = HeatmapSpec::new(2, 2, 0.01, 1.0, 100.0, 10000.0);
        assert!(spec.validate(HeatmapScale::Log10).is_ok());
        assert!(HeatmapSpec::new(2, 2, 0.0, 1.0, 100.0, 100.0)
            .validate(HeatmapScale::Log10)
            .is_err());

        let mut grid = HeatmapGrid::new(spec, HeatmapScale::Log10).unwrap();
        // log10 domain is [-2, 2] x [0, 4]
        assert!(grid.add(0.1, 10.0, 1.0));
        assert!(grid.add(50.0, 5000.0, 1.0));
        assert!(!grid.add(-3.0, 10.0, 1.0));
        assert_eq!(grid.tiles, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }
}
