//! The Julia-set escape-time kernel and its parallel grid evaluator.

use std::collections::TryReserveError;

use rayon::prelude::{
    IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator, ParallelSliceMut,
};
use thiserror::Error;

use crate::complex::Complex;

/// Iteration cutoff applied by [`compute_julia`]. A cell holding this value
/// never escaped and is treated as inside the set.
pub const CUTOFF: f64 = 1.0e6;

#[derive(Debug, Error)]
pub enum Error {
    #[error("grid resolution must be at least 2, got {0}")]
    Resolution(u32),
    #[error("failed to allocate grid storage")]
    Allocation(#[from] TryReserveError),
}

/// Counts iterations of `z ← z² + c` starting from `z0` until `|z|²`
/// reaches `lim²` or the count reaches `cutoff`.
///
/// `cutoff` is a real number compared against the counter promoted to real:
/// a fractional cutoff admits one extra iteration beyond its floor.
pub fn julia_kernel(z0: Complex, c: Complex, lim: f64, cutoff: f64) -> u32 {
    let lim_sq = lim * lim;
    let mut z = z0;
    let mut count: u32 = 0;
    while z.norm_sq() < lim_sq && f64::from(count) < cutoff {
        z = z * z + c;
        count += 1;
    }
    count
}

/// `n` evenly spaced values spanning `[-bound, bound]`, endpoints included.
fn grid_axis(n: u32, bound: f64) -> Result<Vec<f64>, Error> {
    if n < 2 {
        return Err(Error::Resolution(n));
    }

    let mut axis = Vec::new();
    axis.try_reserve_exact(n as usize)?;

    let step = (2.0 * bound) / f64::from(n - 1);
    axis.extend((0..n).map(|i| -bound + f64::from(i) * step));
    Ok(axis)
}

/// Evaluates the Julia set for `c` over an `n × n` grid covering
/// `[-bound, bound]` on both axes, with escape radius `lim`.
///
/// The result is row-major: the cell at index `j + n*i` holds the escape
/// count for `axis[i] + axis[j]·i`, so the first grid index supplies the
/// real component. Rows are evaluated in parallel; every cell is a pure
/// function of the inputs, so the result is identical to a serial pass.
pub fn compute_julia(c: Complex, n: u32, bound: f64, lim: f64) -> Result<Vec<u32>, Error> {
    if n < 2 {
        return Err(Error::Resolution(n));
    }

    let cells = n as usize * n as usize;
    let mut julia = Vec::new();
    julia.try_reserve_exact(cells)?;
    julia.resize(cells, 0u32);

    let axis = grid_axis(n, bound)?;

    julia
        .par_chunks_mut(n as usize)
        .zip(axis.par_iter())
        .for_each(|(row, &x)| {
            for (cell, &y) in row.iter_mut().zip(&axis) {
                *cell = julia_kernel(Complex::new(x, y), c, lim, CUTOFF);
            }
        });

    Ok(julia)
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: Complex = Complex {
        real: -0.8,
        imaginary: 0.156,
    };

    #[test]
    fn escaped_point_counts_zero() {
        // |z0| is already past the escape radius.
        assert_eq!(julia_kernel(Complex::new(3.0, 0.0), C, 2.0, CUTOFF), 0);
        assert_eq!(julia_kernel(Complex::new(0.0, -2.0), C, 2.0, CUTOFF), 0);
    }

    #[test]
    fn nan_input_escapes_immediately() {
        let z0 = Complex::new(f64::NAN, 0.0);
        assert_eq!(julia_kernel(z0, C, 2.0, CUTOFF), 0);
    }

    #[test]
    fn non_escaping_point_returns_cutoff() {
        // z ← z² with z0 = 0 stays at the origin forever.
        assert_eq!(julia_kernel(Complex::ZERO, Complex::ZERO, 2.0, 5.0), 5);
        assert_eq!(
            julia_kernel(Complex::ZERO, Complex::ZERO, 2.0, CUTOFF),
            1_000_000
        );
    }

    #[test]
    fn fractional_cutoff_admits_one_extra_iteration() {
        // Counts 0, 1 and 2 all pass the `count < 2.5` test.
        assert_eq!(julia_kernel(Complex::ZERO, Complex::ZERO, 2.0, 2.5), 3);
    }

    #[test]
    fn kernel_is_deterministic() {
        let z0 = Complex::new(0.3, -0.5);
        let first = julia_kernel(z0, C, 2.0, CUTOFF);
        assert_eq!(first, 145);
        assert_eq!(julia_kernel(z0, C, 2.0, CUTOFF), first);
    }

    #[test]
    fn axis_spans_bound_inclusive() {
        let axis = grid_axis(5, 2.0).unwrap();
        assert_eq!(axis.len(), 5);
        assert!((axis[0] + 2.0).abs() < 1e-12);
        assert!((axis[4] - 2.0).abs() < 1e-12);
        assert!(axis.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn degenerate_resolution_is_rejected() {
        assert!(matches!(grid_axis(1, 1.0), Err(Error::Resolution(1))));
        assert!(matches!(
            compute_julia(C, 1, 1.0, 2.0),
            Err(Error::Resolution(1))
        ));
        assert!(matches!(
            compute_julia(C, 0, 1.0, 2.0),
            Err(Error::Resolution(0))
        ));
    }

    #[test]
    fn oversized_grid_reports_allocation_failure() {
        // u32::MAX² cells cannot be reserved; the evaluator must fail
        // before any kernel work happens.
        assert!(matches!(
            compute_julia(C, u32::MAX, 1.0, 2.0),
            Err(Error::Allocation(_))
        ));
    }

    #[test]
    fn three_by_three_regression_grid() {
        let grid = compute_julia(C, 3, 1.0, 2.0).unwrap();
        assert_eq!(grid, vec![1, 135, 1, 2, 252, 2, 1, 135, 1]);
        // Cell (1,1) is z0 = 0; cells (0,1) and (1,0) pin the row-major
        // orientation (real part from the first index).
        assert_eq!(grid[4], 252);
        assert_eq!(grid[1], julia_kernel(Complex::new(-1.0, 0.0), C, 2.0, CUTOFF));
        assert_eq!(grid[3], julia_kernel(Complex::new(0.0, -1.0), C, 2.0, CUTOFF));
    }

    #[test]
    fn matches_serial_evaluation() {
        // Parameters chosen so every point escapes within one iteration.
        let c = Complex::new(1.0, 0.0);
        let (n, bound, lim) = (64u32, 1.0, 0.2);

        let axis = grid_axis(n, bound).unwrap();
        let mut expected = vec![0u32; (n * n) as usize];
        for (i, &x) in axis.iter().enumerate() {
            for (j, &y) in axis.iter().enumerate() {
                expected[j + n as usize * i] = julia_kernel(Complex::new(x, y), c, lim, CUTOFF);
            }
        }

        assert_eq!(compute_julia(c, n, bound, lim).unwrap(), expected);
    }
}
