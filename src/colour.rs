//! Colouring algorithms.

use fnv::{FnvHashMap, FnvHashSet};
use log::trace;
use rayon::prelude::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator};

use crate::julia;

/// Normalised colour output for a single grid cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColourRange {
    pub escaped: bool,
    pub value: f32,
}

impl Default for ColourRange {
    fn default() -> Self {
        Self {
            escaped: false,
            value: 0.0,
        }
    }
}

/// Histogram-based colouring algorithm ([Wikipedia](https://en.wikipedia.org/wiki/Plotting_algorithms_for_the_Mandelbrot_set#Histogram_coloring)).
///
/// Each escaped cell's value is the cumulative fraction of samples in
/// lower iteration buckets, giving a `[0, 1)` ramp that uses the full
/// colour range however the counts are distributed.
pub struct HistogramColouring {
    total_samples: usize,
    bucket_labels: Vec<u32>,
    histogram: FnvHashMap<u32, u32>,
    histogram_ranges: FnvHashMap<u32, f32>,
}

impl HistogramColouring {
    pub fn new() -> Self {
        Self {
            total_samples: 0,
            bucket_labels: Vec::new(),
            histogram: FnvHashMap::default(),
            histogram_ranges: FnvHashMap::default(),
        }
    }

    pub fn reset(&mut self) {
        self.total_samples = 0;
        self.bucket_labels.clear();
        self.histogram.clear();
        self.histogram_ranges.clear();
    }

    /// Colour a finished iteration grid into `colour_ranges`.
    ///
    /// Cells with a count below the evaluation cutoff have escaped; the
    /// rest are set interior and keep a zero value.
    pub fn colour_grid(&mut self, counts: &[u32], colour_ranges: &mut [ColourRange]) {
        trace!("begin colour_grid");

        debug_assert_eq!(counts.len(), colour_ranges.len());

        self.reset();

        let cutoff = julia::CUTOFF as u32;
        for &count in counts {
            if count >= cutoff {
                continue;
            }

            let value = self.histogram.entry(count).or_insert_with(|| {
                self.bucket_labels.push(count);
                0
            });
            *value += 1;
            self.total_samples += 1;
        }

        debug_assert_eq!(
            self.total_samples,
            self.histogram.values().map(|value| *value as usize).sum()
        );

        debug_assert!(
            self.bucket_labels.len()
                == self
                    .bucket_labels
                    .iter()
                    .copied()
                    .collect::<FnvHashSet<u32>>()
                    .len(),
            "bucket_labels contains duplicates: {:?}",
            self.bucket_labels
        );
        self.bucket_labels.sort();

        let mut acc = 0;
        let total_samples = self.total_samples as f32;
        for bucket_label in &self.bucket_labels {
            self.histogram_ranges
                .insert(*bucket_label, acc as f32 / total_samples);
            acc += self.histogram.get(bucket_label).unwrap();
        }

        colour_ranges
            .par_iter_mut()
            .enumerate()
            .for_each(|(index, colour_range)| {
                let count = counts[index];
                if count < cutoff {
                    colour_range.escaped = true;
                    colour_range.value = self
                        .histogram_ranges
                        .get(&count)
                        .copied()
                        .unwrap_or_else(|| panic!("{} was not in histogram_ranges", count));
                } else {
                    colour_range.escaped = false;
                    colour_range.value = 0.0;
                }
            });

        trace!("end colour_grid");
    }
}

impl Default for HistogramColouring {
    fn default() -> Self {
        Self::new()
    }
}

/// Colour stops approximating the classic "jet" colormap.
const JET: [[f32; 3]; 6] = [
    [0.0, 0.0, 0.5],
    [0.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.5, 0.0, 0.0],
];

/// Maps one cell to an RGBA texel. Set interior renders black.
pub fn to_rgba(colour_range: ColourRange) -> [u8; 4] {
    if !colour_range.escaped {
        return [0, 0, 0, 255];
    }

    let scaled = colour_range.value.clamp(0.0, 1.0) * (JET.len() - 1) as f32;
    let index = (scaled as usize).min(JET.len() - 2);
    let frac = scaled - index as f32;

    let channel = |lo: f32, hi: f32| ((lo + (hi - lo) * frac) * 255.0).round() as u8;
    [
        channel(JET[index][0], JET[index + 1][0]),
        channel(JET[index][1], JET[index + 1][1]),
        channel(JET[index][2], JET[index + 1][2]),
        255,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUTOFF: u32 = julia::CUTOFF as u32;

    fn coloured(counts: &[u32]) -> Vec<ColourRange> {
        let mut colour_ranges = vec![ColourRange::default(); counts.len()];
        HistogramColouring::new().colour_grid(counts, &mut colour_ranges);
        colour_ranges
    }

    #[test]
    fn interior_cells_are_not_escaped() {
        let colour_ranges = coloured(&[CUTOFF, CUTOFF]);
        assert!(colour_ranges.iter().all(|range| !range.escaped));
        assert!(colour_ranges.iter().all(|range| range.value == 0.0));
    }

    #[test]
    fn values_are_cumulative_fractions() {
        // Buckets: 0 (x2), 1 (x1), 2 (x1) out of 4 escaped samples.
        let colour_ranges = coloured(&[0, 0, 1, 2, CUTOFF]);

        assert_eq!(colour_ranges[0].value, 0.0);
        assert_eq!(colour_ranges[1].value, 0.0);
        assert_eq!(colour_ranges[2].value, 0.5);
        assert_eq!(colour_ranges[3].value, 0.75);
        assert!(colour_ranges[..4].iter().all(|range| range.escaped));
        assert!(!colour_ranges[4].escaped);
    }

    #[test]
    fn colouring_is_reusable() {
        let counts = [0, 3, 7, CUTOFF, 3];
        let mut colouring = HistogramColouring::new();

        let mut first = vec![ColourRange::default(); counts.len()];
        colouring.colour_grid(&counts, &mut first);

        let mut second = vec![ColourRange::default(); counts.len()];
        colouring.colour_grid(&counts, &mut second);

        assert_eq!(first, second);
    }

    #[test]
    fn rgba_endpoints() {
        let interior = ColourRange {
            escaped: false,
            value: 0.0,
        };
        assert_eq!(to_rgba(interior), [0, 0, 0, 255]);

        let lowest = ColourRange {
            escaped: true,
            value: 0.0,
        };
        assert_eq!(to_rgba(lowest), [0, 0, 128, 255]);

        let highest = ColourRange {
            escaped: true,
            value: 1.0,
        };
        assert_eq!(to_rgba(highest), [128, 0, 0, 255]);
    }
}
