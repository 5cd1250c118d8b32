//! One-sample group tests on per-subject coefficient maps.
//!
//! [`OneSampleTest`] is the seam between the random-effects model and the
//! procedure that tests its coefficients; [`ClusterPermutationTest`] is the
//! built-in sign-flip cluster permutation implementation.


pub use cluster::{Cluster, ClusterPermutationTest, TTestResult};

use crate::data::NdVar;
use crate::error::{Result, SpmError};
use serde::{Deserialize, Serialize};

/// Which tail of the t distribution to test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tail {
    /// Two-tailed.
    #[default]
    Both,
    /// Upper tail (one-tailed).
    Upper,
    /// Lower tail (one-tailed).
    Lower,
}

impl Tail {
    /// Convert from the conventional `0 | 1 | -1` notation.
    pub fn from_sign(tail: i8) -> Result<Self> {
        match tail {
            0 => Ok(Tail::Both),
            1 => Ok(Tail::Upper),
            -1 => Ok(Tail::Lower),
            other => Err(SpmError::InvalidParameter(format!(
                "tail must be 0, 1 or -1, got {}",
                other
            ))),
        }
    }

    /// Signs of the clusters formed under this tail.
    pub fn signs(&self) -> &'static [f64] {
        match self {
            Tail::Both => &[1.0, -1.0],
            Tail::Upper => &[1.0],
            Tail::Lower => &[-1.0],
        }
    }
}

/// Parameters of a one-sample test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TTestConfig {
    /// Value to compare the coefficients against.
    pub popmean: f64,
    pub tail: Tail,
    /// Number of permutations. `None` forms no clusters; `Some(0)` forms
    /// clusters without permuting.
    pub samples: Option<usize>,
    /// Cluster-forming threshold as an uncorrected p-value.
    pub pmin: Option<f64>,
    /// Cluster-forming threshold as a t value.
    pub tmin: Option<f64>,
    /// Threshold-free cluster enhancement.
    pub tfce: bool,
    /// Start of the time window (inclusive, seconds).
    pub tstart: Option<f64>,
    /// End of the time window (exclusive, seconds).
    pub tstop: Option<f64>,
    /// Minimum cluster duration in seconds.
    pub mintime: f64,
    /// Minimum number of sources (or sensors) per cluster.
    pub minsource: usize,
    /// Seed for the permutation generator.
    pub seed: u64,
}

impl Default for TTestConfig {
    fn default() -> Self {
        Self {
            popmean: 0.0,
            tail: Tail::Both,
            samples: None,
            pmin: None,
            tmin: None,
            tfce: false,
            tstart: None,
            tstop: None,
            mintime: 0.0,
            minsource: 0,
            seed: 0,
        }
    }
}

impl TTestConfig {
    /// Check that the parameters are consistent.
    pub fn validate(&self) -> Result<()> {
        let n_thresholds = [self.pmin.is_some(), self.tmin.is_some(), self.tfce]
            .iter()
            .filter(|&&set| set)
            .count();
        if n_thresholds > 1 {
            return Err(SpmError::InvalidParameter(
                "Only one of pmin, tmin and tfce can be specified".to_string(),
            ));
        }
        if let Some(p) = self.pmin {
            if !(p > 0.0 && p < 1.0) {
                return Err(SpmError::InvalidParameter(format!(
                    "pmin must be in (0, 1), got {}",
                    p
                )));
            }
        }
        if let Some(t) = self.tmin {
            if !(t > 0.0) {
                return Err(SpmError::InvalidParameter(format!(
                    "tmin must be positive, got {}",
                    t
                )));
            }
        }
        if let (Some(start), Some(stop)) = (self.tstart, self.tstop) {
            if start >= stop {
                return Err(SpmError::InvalidParameter(format!(
                    "tstart ({}) must be before tstop ({})",
                    start, stop
                )));
            }
        }
        if self.mintime < 0.0 {
            return Err(SpmError::InvalidParameter(
                "mintime must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// A one-sample test over the cases of a measurement.
pub trait OneSampleTest {
    type Output;

    /// Test whether the population mean of `data` differs from
    /// `config.popmean` at each location.
    fn ttest_1samp(&self, data: &NdVar, config: &TTestConfig) -> Result<Self::Output>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TTestConfig::default().validate().is_ok());
    }

    #[test]
    fn test_exclusive_thresholds() {
        let config = TTestConfig {
            pmin: Some(0.05),
            tfce: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = TTestConfig {
            pmin: Some(0.05),
            tmin: Some(2.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_values() {
        for config in [
            TTestConfig { pmin: Some(1.5), ..Default::default() },
            TTestConfig { tmin: Some(-1.0), ..Default::default() },
            TTestConfig { tstart: Some(0.2), tstop: Some(0.1), ..Default::default() },
            TTestConfig { mintime: -0.01, ..Default::default() },
        ] {
            assert!(matches!(config.validate(), Err(SpmError::InvalidParameter(_))));
        }
    }

    #[test]
    fn test_tail_from_sign() {
        assert_eq!(Tail::from_sign(0).unwrap(), Tail::Both);
        assert_eq!(Tail::from_sign(-1).unwrap(), Tail::Lower);
        assert!(Tail::from_sign(2).is_err());
    }

    #[test]
    fn test_config_yaml() {
        let config: TTestConfig =
            serde_yaml::from_str("samples: 100\npmin: 0.05\ntail: upper\nmintime: 0.025\n").unwrap();
        assert_eq!(config.samples, Some(100));
        assert_eq!(config.tail, Tail::Upper);
        assert_eq!(config.popmean, 0.0);
        assert!(config.validate().is_ok());
    }
}
