use std::ops::Range;

use log::warn;

/// Computes the per-worker piece size `⌊N / W⌋` and returns the contiguous,
/// non-overlapping ranges covering the first `pieces * workers` samples.
///
/// Trailing samples beyond `pieces * workers` are dropped. This is a
/// documented limitation shared by the sync and async training loops: it
/// keeps per-worker piece sizes uniform at the cost of a few samples per
/// epoch when `|data|` doesn't divide evenly by `|workers|`.
pub fn contiguous_pieces(total: usize, workers: usize) -> Vec<Range<usize>> {
    if workers == 0 {
        return Vec::new();
    }

    let piece = total / workers;
    let dropped = total - piece * workers;

    if dropped > 0 {
        warn!(
            total = total, workers = workers, piece = piece, dropped = dropped;
            "dropping trailing samples that don't evenly divide across workers"
        );
    }

    (0..workers).map(|i| i * piece..(i + 1) * piece).collect()
}

/// The size of a single worker's piece of the dataset.
pub fn piece_size(total: usize, workers: usize) -> usize {
    if workers == 0 { 0 } else { total / workers }
}
