//! Synthetic time series datasets for unit tests.

use crate::data::{CaseAxis, Dimension, Metadata, NdVar, Topology};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub(crate) const N_TIMES: usize = 40;

/// 2 x 2 design with a continuous covariate, 15 cases per cell.
///
/// The response carries an A effect in samples 10..20, a Y slope in
/// samples 20..30 and an A x B interaction in samples 25..35, plus uniform
/// noise of the given amplitude.
pub(crate) fn uts_dataset(seed: u64, noise: f64) -> (Metadata, NdVar) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_cases = 60;
    let mut a = Vec::with_capacity(n_cases);
    let mut b = Vec::with_capacity(n_cases);
    let mut y = Vec::with_capacity(n_cases);
    for i in 0..n_cases {
        a.push(if i % 2 == 0 { "a0" } else { "a1" });
        b.push(if (i / 2) % 2 == 0 { "b0" } else { "b1" });
        y.push(rng.gen_range(-1.0..1.0));
    }
    let metadata = Metadata::new()
        .with_categorical("A", &a)
        .unwrap()
        .with_categorical("B", &b)
        .unwrap()
        .with_continuous("Y", &y)
        .unwrap();

    let mut values = Vec::with_capacity(n_cases * N_TIMES);
    for i in 0..n_cases {
        let a_code = if a[i] == "a0" { 1.0 } else { -1.0 };
        let b_code = if b[i] == "b0" { 1.0 } else { -1.0 };
        for t in 0..N_TIMES {
            let mut v = 0.3;
            if (10..20).contains(&t) {
                v += 0.8 * a_code;
            }
            if (20..30).contains(&t) {
                v += 1.5 * y[i];
            }
            if (25..35).contains(&t) {
                v += 0.6 * a_code * b_code;
            }
            v += noise * rng.gen_range(-1.0..1.0);
            values.push(v);
        }
    }
    let topology = Topology::new(vec![Dimension::Time {
        tmin: -0.1,
        tstep: 0.01,
        n: N_TIMES,
    }]);
    let uts = NdVar::new("uts", CaseAxis::numbered("case", n_cases), topology, values).unwrap();
    (metadata, uts)
}
