//! Labelled multi-dimensional measurements.
//!
//! An [`NdVar`] stores a flat row-major buffer with a leading case axis
//! followed by the axes of its [`Topology`]. Every location (one index into
//! each topology axis) is an independent test location; models flatten the
//! topology into a single axis and restore it afterwards.

use crate::error::{Result, SpmError};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One axis of a measurement's topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dimension {
    /// Uniformly sampled time axis (seconds).
    Time { tmin: f64, tstep: f64, n: usize },
    /// Named sensors, with edges between adjacent sensors.
    Sensor {
        names: Vec<String>,
        connectivity: Vec<(usize, usize)>,
    },
    /// Source locations, with edges between adjacent sources.
    Source {
        n: usize,
        connectivity: Vec<(usize, usize)>,
    },
}

impl Dimension {
    /// Number of elements along this axis.
    pub fn len(&self) -> usize {
        match self {
            Dimension::Time { n, .. } => *n,
            Dimension::Sensor { names, .. } => names.len(),
            Dimension::Source { n, .. } => *n,
        }
    }

    /// Whether the axis has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Axis name.
    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Time { .. } => "time",
            Dimension::Sensor { .. } => "sensor",
            Dimension::Source { .. } => "source",
        }
    }

    /// Edges between adjacent elements.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        match self {
            Dimension::Time { n, .. } => (1..*n).map(|i| (i - 1, i)).collect(),
            Dimension::Sensor { connectivity, .. } | Dimension::Source { connectivity, .. } => {
                connectivity.clone()
            }
        }
    }

    /// Check that the time step is positive and that every connectivity
    /// edge joins two distinct elements of the axis.
    pub fn validate(&self) -> Result<()> {
        match self {
            Dimension::Time { tstep, .. } => {
                if !(tstep.is_finite() && *tstep > 0.0) {
                    return Err(SpmError::InvalidParameter(format!(
                        "Time step must be positive, got {}",
                        tstep
                    )));
                }
            }
            Dimension::Sensor { connectivity, .. } | Dimension::Source { connectivity, .. } => {
                let n = self.len();
                if let Some(&(a, b)) = connectivity.iter().find(|&&(a, b)| a >= n || b >= n || a == b) {
                    return Err(SpmError::StructuralMismatch(format!(
                        "Invalid {} connectivity edge ({}, {}) for {} elements",
                        self.name(),
                        a,
                        b,
                        n
                    )));
                }
            }
        }
        Ok(())
    }

    /// Time points of a time axis.
    pub fn times(&self) -> Option<Vec<f64>> {
        match self {
            Dimension::Time { tmin, tstep, n } => {
                Some((0..*n).map(|i| tmin + i as f64 * tstep).collect())
            }
            _ => None,
        }
    }
}

/// Ordered axes of a measurement, excluding the case axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Topology {
    pub dims: Vec<Dimension>,
}

impl Topology {
    pub fn new(dims: Vec<Dimension>) -> Self {
        Self { dims }
    }

    /// Check every axis (see [`Dimension::validate`]).
    pub fn validate(&self) -> Result<()> {
        self.dims.iter().try_for_each(Dimension::validate)
    }

    /// Length of each axis.
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.len()).collect()
    }

    /// Number of test locations (product of the axis lengths).
    pub fn n_locations(&self) -> usize {
        self.dims.iter().map(|d| d.len()).product()
    }

    /// Position of the time axis.
    pub fn time_axis(&self) -> Option<usize> {
        self.dims
            .iter()
            .position(|d| matches!(d, Dimension::Time { .. }))
    }

    /// Row-major strides of the flattened locations.
    pub fn strides(&self) -> Vec<usize> {
        let shape = self.shape();
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    /// Per-axis index of a flat location.
    pub fn unravel(&self, flat: usize) -> Vec<usize> {
        let shape = self.shape();
        self.strides()
            .iter()
            .zip(&shape)
            .map(|(&stride, &len)| (flat / stride) % len)
            .collect()
    }

    /// Adjacency list over flat locations.
    ///
    /// Two locations are neighbours when they differ along exactly one axis
    /// and are connected along it.
    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let n = self.n_locations();
        let strides = self.strides();
        let mut neighbors = vec![Vec::new(); n];
        for (axis, dim) in self.dims.iter().enumerate() {
            let edges = dim.edges();
            if edges.is_empty() {
                continue;
            }
            for flat in 0..n {
                let index = (flat / strides[axis]) % dim.len();
                let base = flat - index * strides[axis];
                for &(a, b) in &edges {
                    let other = if a == index {
                        b
                    } else if b == index {
                        a
                    } else {
                        continue;
                    };
                    neighbors[flat].push(base + other * strides[axis]);
                }
            }
        }
        neighbors
    }
}

/// The leading axis of a measurement: observations, design columns or subjects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseAxis {
    pub name: String,
    pub labels: Vec<String>,
}

impl CaseAxis {
    pub fn new(name: &str, labels: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            labels,
        }
    }

    /// Case axis with labels `0..n`.
    pub fn numbered(name: &str, n: usize) -> Self {
        Self::new(name, (0..n).map(|i| i.to_string()).collect())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A measurement with a leading case axis and a topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdVar {
    pub name: String,
    case: CaseAxis,
    topology: Topology,
    values: Vec<f64>,
}

impl NdVar {
    /// Create from a flat row-major buffer (case axis first).
    pub fn new(name: &str, case: CaseAxis, topology: Topology, values: Vec<f64>) -> Result<Self> {
        topology.validate()?;
        let expected = case.len() * topology.n_locations();
        if values.len() != expected {
            return Err(SpmError::DimensionMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            case,
            topology,
            values,
        })
    }

    /// Restore a flattened `n_cases x n_locations` matrix to a topology.
    pub fn from_flat(
        name: &str,
        case: CaseAxis,
        topology: Topology,
        flat: &DMatrix<f64>,
    ) -> Result<Self> {
        if flat.nrows() != case.len() {
            return Err(SpmError::DimensionMismatch {
                expected: case.len(),
                actual: flat.nrows(),
            });
        }
        if flat.ncols() != topology.n_locations() {
            return Err(SpmError::DimensionMismatch {
                expected: topology.n_locations(),
                actual: flat.ncols(),
            });
        }
        let mut values = Vec::with_capacity(flat.len());
        for row in flat.row_iter() {
            values.extend(row.iter().copied());
        }
        Self::new(name, case, topology, values)
    }

    /// Load a time series measurement from a TSV file.
    ///
    /// Header: a label for the case column followed by the time points.
    /// Each following row holds a case id and one value per time point.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| SpmError::EmptyData("Empty measurement file".to_string()))??;
        let times = header_line
            .split('\t')
            .skip(1)
            .enumerate()
            .map(|(col, s)| {
                s.trim().parse::<f64>().map_err(|_| SpmError::InvalidValue {
                    value: s.to_string(),
                    line: 1,
                    col: col + 1,
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        let time = time_dimension(&times)?;

        let mut labels = Vec::new();
        let mut values = Vec::new();
        for (line_idx, line_result) in lines.enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != times.len() + 1 {
                return Err(SpmError::DimensionMismatch {
                    expected: times.len() + 1,
                    actual: fields.len(),
                });
            }
            labels.push(fields[0].trim().to_string());
            for (col, field) in fields[1..].iter().enumerate() {
                let value = field.trim().parse::<f64>().map_err(|_| SpmError::InvalidValue {
                    value: field.to_string(),
                    line: line_idx + 2,
                    col: col + 1,
                })?;
                values.push(value);
            }
        }
        if labels.is_empty() {
            return Err(SpmError::EmptyData(format!(
                "No cases in {}",
                path.display()
            )));
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "y".to_string());
        Self::new(
            &name,
            CaseAxis::new("case", labels),
            Topology::new(vec![time]),
            values,
        )
    }

    /// Stack measurements with identical topology along a new case axis.
    ///
    /// Each part must hold exactly one case.
    pub fn stack(name: &str, case: CaseAxis, parts: &[NdVar]) -> Result<Self> {
        if parts.len() != case.len() {
            return Err(SpmError::DimensionMismatch {
                expected: case.len(),
                actual: parts.len(),
            });
        }
        let first = parts
            .first()
            .ok_or_else(|| SpmError::EmptyData("Nothing to stack".to_string()))?;
        let mut values = Vec::with_capacity(parts.len() * first.topology.n_locations());
        for part in parts {
            if part.topology != first.topology {
                return Err(SpmError::StructuralMismatch(format!(
                    "Cannot stack '{}' with '{}': topologies differ",
                    first.name, part.name
                )));
            }
            if part.n_cases() != 1 {
                return Err(SpmError::DimensionMismatch {
                    expected: 1,
                    actual: part.n_cases(),
                });
            }
            values.extend_from_slice(&part.values);
        }
        Self::new(name, case, first.topology.clone(), values)
    }

    /// Number of cases.
    pub fn n_cases(&self) -> usize {
        self.case.len()
    }

    /// The case axis.
    pub fn case_axis(&self) -> &CaseAxis {
        &self.case
    }

    /// The topology (all axes but the case axis).
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Full shape, case axis first.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = vec![self.n_cases()];
        shape.extend(self.topology.shape());
        shape
    }

    /// Flat row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Values of one case, flattened over the topology.
    pub fn case_values(&self, case: usize) -> &[f64] {
        let n = self.topology.n_locations();
        &self.values[case * n..(case + 1) * n]
    }

    /// Value at a case and per-axis index.
    pub fn get(&self, case: usize, index: &[usize]) -> Option<f64> {
        if case >= self.n_cases() || index.len() != self.topology.dims.len() {
            return None;
        }
        let shape = self.topology.shape();
        if index.iter().zip(&shape).any(|(i, n)| i >= n) {
            return None;
        }
        let flat: usize = index
            .iter()
            .zip(self.topology.strides())
            .map(|(i, s)| i * s)
            .sum();
        self.values
            .get(case * self.topology.n_locations() + flat)
            .copied()
    }

    /// `n_cases x n_locations` matrix.
    pub fn flatten(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.n_cases(), self.topology.n_locations(), &self.values)
    }

    /// Restrict the time axis to `tstart <= t < tstop`.
    pub fn crop_time(&self, tstart: Option<f64>, tstop: Option<f64>) -> Result<Self> {
        if tstart.is_none() && tstop.is_none() {
            return Ok(self.clone());
        }
        let axis = self.topology.time_axis().ok_or_else(|| {
            SpmError::InvalidParameter(format!("'{}' has no time axis to crop", self.name))
        })?;
        let (tmin, tstep, n) = match self.topology.dims[axis] {
            Dimension::Time { tmin, tstep, n } => (tmin, tstep, n),
            _ => unreachable!("time_axis() only returns time dimensions"),
        };

        let index_of = |t: f64| ((t - tmin) / tstep - 1e-9).ceil().clamp(0.0, n as f64) as usize;
        let start = tstart.map(index_of).unwrap_or(0);
        let stop = tstop.map(index_of).unwrap_or(n);
        if start >= stop {
            return Err(SpmError::InvalidParameter(format!(
                "Time window [{:?}, {:?}) contains no samples",
                tstart, tstop
            )));
        }

        let mut dims = self.topology.dims.clone();
        dims[axis] = Dimension::Time {
            tmin: tmin + start as f64 * tstep,
            tstep,
            n: stop - start,
        };
        let cropped = Topology::new(dims);

        let mut values = Vec::with_capacity(self.n_cases() * cropped.n_locations());
        for case in 0..self.n_cases() {
            let row = self.case_values(case);
            for (flat, &value) in row.iter().enumerate() {
                let t = self.topology.unravel(flat)[axis];
                if t >= start && t < stop {
                    values.push(value);
                }
            }
        }
        Self::new(&self.name, self.case.clone(), cropped, values)
    }
}

fn time_dimension(times: &[f64]) -> Result<Dimension> {
    match times {
        [] => Err(SpmError::EmptyData("No time points in header".to_string())),
        [t] => Ok(Dimension::Time {
            tmin: *t,
            tstep: 1.0,
            n: 1,
        }),
        [t0, t1, ..] => {
            let tstep = t1 - t0;
            if tstep <= 0.0 {
                return Err(SpmError::InvalidParameter(
                    "Time points must be increasing".to_string(),
                ));
            }
            for (i, t) in times.iter().enumerate() {
                if ((t - t0) / tstep - i as f64).abs() > 1e-6 {
                    return Err(SpmError::InvalidParameter(format!(
                        "Time points are not uniformly spaced at {}",
                        t
                    )));
                }
            }
            Ok(Dimension::Time {
                tmin: *t0,
                tstep,
                n: times.len(),
            })
        }
    }
}
