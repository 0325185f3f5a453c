use rayon::prelude::*;

use crate::error::{Error, Result};

// below this many rows the thread hand-off costs more than it saves
const PARALLEL_ROWS: usize = 4096;

/// Writes one one-hot row of width `width` per index into `o`.
/// `o` must be zeroed and exactly `indices.len() * width` long.
pub fn one_hot_fill(o: &mut [u8], indices: &[usize], width: usize) {
    debug_assert_eq!(o.len(), indices.len() * width);
    if indices.len() < PARALLEL_ROWS {
        o.chunks_mut(width)
            .zip(indices)
            .for_each(|(row, &i)| row[i] = 1);
        return;
    }

    let chunk_rows = 256;
    o.par_chunks_mut(chunk_rows * width)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let row_start = chunk_idx * chunk_rows;
            chunk.chunks_mut(width).enumerate().for_each(|(i, row)| {
                row[indices[row_start + i]] = 1;
            });
        });
}

/// Checks that `probs` is a probability distribution: non-empty, finite,
/// non-negative and summing to one within `tolerance`.
pub fn check_distribution(probs: &[f32], tolerance: f64) -> Result<()> {
    if probs.is_empty() {
        return Err(Error::InvalidDistribution("distribution is empty".into()));
    }
    if let Some(p) = probs.iter().find(|p| !p.is_finite() || **p < 0.0) {
        return Err(Error::InvalidDistribution(format!(
            "entry {p} is not a probability"
        )));
    }
    let sum: f64 = probs.iter().map(|&p| p as f64).sum();
    if (sum - 1.0).abs() > tolerance {
        return Err(Error::InvalidDistribution(format!(
            "entries sum to {sum}, expected 1"
        )));
    }
    Ok(())
}

/// Rescales `probs` to `exp(ln p / temperature)` and renormalizes.
/// Zero entries stay zero.
pub fn apply_temperature(probs: &[f32], temperature: f64) -> Vec<f64> {
    let logits: Vec<f64> = probs
        .iter()
        .map(|&p| (p as f64).ln() / temperature)
        .collect();
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        // every ln p / T underflowed: take the T -> 0 limit, mass on the arg-max
        return arg_max_mass(probs);
    }

    let mut scaled: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f64 = scaled.iter().sum();
    scaled.iter_mut().for_each(|p| *p /= sum);
    scaled
}

// Splits all mass evenly over the largest entries.
fn arg_max_mass(probs: &[f32]) -> Vec<f64> {
    let top = probs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let ties = probs.iter().filter(|&&p| p == top).count() as f64;
    probs
        .iter()
        .map(|&p| if p == top { 1.0 / ties } else { 0.0 })
        .collect()
}
