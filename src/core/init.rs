use crate::prelude::*;

/// Glorot-uniform sample for a `fan_in x fan_out` weight matrix:
/// U(-limit, limit) with limit = sqrt(6 / (fan_in + fan_out)).
///
/// Used by the builders whenever no explicit weight matrix is supplied.
pub fn glorot_uniform(fan_in: usize, fan_out: usize) -> Array2<f64> {
    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
    Array2::random((fan_in, fan_out), Uniform::new(-limit, limit))
}
