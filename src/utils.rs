#[allow(unused)]
use crate::prelude::*;

/// Fixed tolerance for the `equal_approx` family of comparisons.
pub const EPSILON: f64 = 1e-8;

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON
}

pub fn approx_mat(a: &Array2<f64>, b: &Array2<f64>) -> bool {
    a.dim() == b.dim() && a.iter().zip(b.iter()).all(|(x, y)| approx(*x, *y))
}

pub fn approx_vec(a: &Array1<f64>, b: &Array1<f64>) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| approx(*x, *y))
}

pub fn approx_opt(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => approx(x, y),
        _ => false,
    }
}

pub fn approx_mat_opt(a: Option<&Array2<f64>>, b: Option<&Array2<f64>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => approx_mat(x, y),
        _ => false,
    }
}

pub fn approx_vec_opt(a: Option<&Array1<f64>>, b: Option<&Array1<f64>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => approx_vec(x, y),
        _ => false,
    }
}

#[macro_export]
macro_rules! rand_array {
    ($($x:expr),*) => {
        {
            Array2::random(($($x,)*), Uniform::new(-1., 1.))
        }
    };
}
