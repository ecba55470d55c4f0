//! Calibration tables: multilinear interpolation over 1–3 axes.
//!
//! Each axis is a strictly increasing list of breakpoints stored in a
//! fixed-capacity `heapless::Vec`. The grid is row-major with the first
//! (x) axis outermost: for a 2-axis table, value `(i, j)` lives at
//! `i * ny + j`.
//!
//! ## Lookup rules
//! - Queries outside an axis range are clamped to the edge breakpoint.
//! - Queries exactly on breakpoints return the stored grid value bit-exactly.
//! - Between breakpoints the result is the weighted mean of the cell
//!   corners, so it never leaves the range of those corners.
//!
//! Lookups allocate nothing; all per-query scratch lives on the stack.

use ecu_common::consts::{MAX_BREAKPOINTS, MAX_TABLE_AXES};
use ecu_common::engine::config::TableConfig;
use heapless::Vec as HVec;
use thiserror::Error;

/// Breakpoint list for one axis.
pub type Axis = HVec<f64, MAX_BREAKPOINTS>;

// ─── Errors ─────────────────────────────────────────────────────────

/// Table construction and query errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("table needs between 1 and {max} axes, got {count}", max = MAX_TABLE_AXES)]
    AxisCount { count: usize },

    #[error("axis {axis} needs at least 2 breakpoints, got {len}")]
    AxisTooShort { axis: usize, len: usize },

    #[error("axis {axis} has {len} breakpoints, limit is {max}", max = MAX_BREAKPOINTS)]
    AxisTooLong { axis: usize, len: usize },

    /// Includes zero-width segments, which would divide by zero on lookup.
    #[error("axis {axis} not strictly increasing at breakpoint {index}")]
    AxisNotIncreasing { axis: usize, index: usize },

    #[error("axis {axis} breakpoint {index} is not finite")]
    NonFiniteBreakpoint { axis: usize, index: usize },

    #[error("grid value {index} is not finite")]
    NonFiniteValue { index: usize },

    #[error("grid shape {actual:?} does not match axes {expected:?}")]
    GridSizeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("expected {expected} coordinates, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("query coordinate {axis} is not finite")]
    NonFiniteQuery { axis: usize },
}

// ─── Table ──────────────────────────────────────────────────────────

/// Immutable calibration surface.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    axes: HVec<Axis, MAX_TABLE_AXES>,
    strides: [usize; MAX_TABLE_AXES],
    values: Box<[f64]>,
}

impl CalibrationTable {
    /// Build a table from axis breakpoints and a row-major grid.
    pub fn new(axes: &[&[f64]], values: Vec<f64>) -> Result<Self, TableError> {
        if axes.is_empty() || axes.len() > MAX_TABLE_AXES {
            return Err(TableError::AxisCount { count: axes.len() });
        }

        let mut built: HVec<Axis, MAX_TABLE_AXES> = HVec::new();
        for (k, points) in axes.iter().enumerate() {
            let axis = build_axis(k, points)?;
            built
                .push(axis)
                .map_err(|_| TableError::AxisCount { count: axes.len() })?;
        }

        let expected: Vec<usize> = built.iter().map(|a| a.len()).collect();
        let cells: usize = expected.iter().product();
        if values.len() != cells {
            return Err(TableError::GridSizeMismatch {
                expected,
                actual: vec![values.len()],
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(TableError::NonFiniteValue { index });
        }

        let mut strides = [0usize; MAX_TABLE_AXES];
        let mut stride = 1;
        for k in (0..built.len()).rev() {
            strides[k] = stride;
            stride *= built[k].len();
        }

        Ok(Self {
            axes: built,
            strides,
            values: values.into_boxed_slice(),
        })
    }

    /// Single-axis table.
    pub fn new_1d(x: &[f64], values: &[f64]) -> Result<Self, TableError> {
        Self::new(&[x], values.to_vec())
    }

    /// Two-axis table, `values[i][j]` at `(x[i], y[j])`.
    pub fn new_2d(x: &[f64], y: &[f64], values: &[&[f64]]) -> Result<Self, TableError> {
        check_rows(&[x.len(), y.len()], values.len(), values.iter().map(|r| r.len()))?;
        Self::new(&[x, y], values.iter().flat_map(|r| r.iter().copied()).collect())
    }

    /// Build from the TOML description.
    pub fn from_config(config: &TableConfig) -> Result<Self, TableError> {
        let axes = config.axes();
        let expected: Vec<usize> = axes.iter().map(|a| a.len()).collect();
        if config.values.depth() != axes.len() {
            return Err(TableError::DimensionMismatch {
                expected: axes.len(),
                actual: config.values.depth(),
            });
        }
        match config.values.shape() {
            Some(shape) if shape == expected => {}
            Some(actual) => return Err(TableError::GridSizeMismatch { expected, actual }),
            None => {
                return Err(TableError::GridSizeMismatch {
                    expected,
                    actual: Vec::new(),
                });
            }
        }
        Self::new(&axes, config.values.flatten())
    }

    /// Number of axes.
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.axes.len()
    }

    /// Breakpoints of axis `k`.
    pub fn axis(&self, k: usize) -> Option<&[f64]> {
        self.axes.get(k).map(|a| a.as_slice())
    }

    /// Stored grid value at breakpoint indices.
    pub fn value_at(&self, indices: &[usize]) -> Option<f64> {
        if indices.len() != self.axes.len() {
            return None;
        }
        let mut flat = 0;
        for (k, &i) in indices.iter().enumerate() {
            if i >= self.axes[k].len() {
                return None;
            }
            flat += i * self.strides[k];
        }
        self.values.get(flat).copied()
    }

    /// Interpolated value at `query` (one coordinate per axis).
    pub fn lookup(&self, query: &[f64]) -> Result<f64, TableError> {
        let n = self.axes.len();
        if query.len() != n {
            return Err(TableError::DimensionMismatch {
                expected: n,
                actual: query.len(),
            });
        }

        let mut segment = [0usize; MAX_TABLE_AXES];
        let mut frac = [0.0f64; MAX_TABLE_AXES];
        for k in 0..n {
            let q = query[k];
            if !q.is_finite() {
                return Err(TableError::NonFiniteQuery { axis: k });
            }
            let (i, t) = locate(&self.axes[k], q);
            segment[k] = i;
            frac[k] = t;
        }

        let mut acc = 0.0;
        for corner in 0..(1usize << n) {
            let mut weight = 1.0;
            let mut flat = 0;
            for k in 0..n {
                let upper = (corner >> k) & 1 == 1;
                weight *= if upper { frac[k] } else { 1.0 - frac[k] };
                flat += (segment[k] + usize::from(upper)) * self.strides[k];
            }
            if weight != 0.0 {
                acc += weight * self.values[flat];
            }
        }
        Ok(acc)
    }

    #[inline]
    pub fn lookup_1d(&self, x: f64) -> Result<f64, TableError> {
        self.lookup(&[x])
    }

    #[inline]
    pub fn lookup_2d(&self, x: f64, y: f64) -> Result<f64, TableError> {
        self.lookup(&[x, y])
    }

    #[inline]
    pub fn lookup_3d(&self, x: f64, y: f64, z: f64) -> Result<f64, TableError> {
        self.lookup(&[x, y, z])
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn build_axis(k: usize, points: &[f64]) -> Result<Axis, TableError> {
    if points.len() < 2 {
        return Err(TableError::AxisTooShort {
            axis: k,
            len: points.len(),
        });
    }
    if points.len() > MAX_BREAKPOINTS {
        return Err(TableError::AxisTooLong {
            axis: k,
            len: points.len(),
        });
    }
    if let Some(index) = points.iter().position(|p| !p.is_finite()) {
        return Err(TableError::NonFiniteBreakpoint { axis: k, index });
    }
    if let Some(index) = points.windows(2).position(|w| w[1] <= w[0]) {
        return Err(TableError::AxisNotIncreasing {
            axis: k,
            index: index + 1,
        });
    }
    let mut axis = Axis::new();
    for &p in points {
        axis.push(p).map_err(|_| TableError::AxisTooLong {
            axis: k,
            len: points.len(),
        })?;
    }
    Ok(axis)
}

fn check_rows(
    axis_lens: &[usize],
    rows: usize,
    row_lens: impl Iterator<Item = usize>,
) -> Result<(), TableError> {
    let mut actual = vec![rows];
    for len in row_lens {
        if len != axis_lens[1] {
            actual.push(len);
            return Err(TableError::GridSizeMismatch {
                expected: axis_lens.to_vec(),
                actual,
            });
        }
    }
    if rows != axis_lens[0] {
        actual.push(axis_lens[1]);
        return Err(TableError::GridSizeMismatch {
            expected: axis_lens.to_vec(),
            actual,
        });
    }
    Ok(())
}

/// Segment index and fraction for `q`, clamped to the axis range.
#[inline]
fn locate(axis: &[f64], q: f64) -> (usize, f64) {
    let last = axis.len() - 1;
    if q <= axis[0] {
        return (0, 0.0);
    }
    if q >= axis[last] {
        return (last - 1, 1.0);
    }
    // First breakpoint strictly greater than q, minus one.
    let i = axis.partition_point(|&b| b <= q) - 1;
    let t = (q - axis[i]) / (axis[i + 1] - axis[i]);
    (i, t)
}

// ─── Tests ──────────────────────────────────────────────────────────
