//! Pyramid level selection.

/// Pick the level to read for a target downsample factor.
///
/// Returns the highest-resolution level whose downsample does not exceed
/// `target`, so the fetched block is never coarser than requested. Targets
/// finer than level 0 map to level 0 and targets beyond the last level map to
/// the last level. An exact match returns that level.
///
/// `downsamples` must be non-decreasing, as produced by a pyramid.
pub fn best_level_for_downsample(downsamples: &[f64], target: f64) -> usize {
    let Some(&first) = downsamples.first() else {
        return 0;
    };
    if target < first {
        return 0;
    }
    downsamples
        .iter()
        .skip(1)
        .position(|&ds| target < ds)
        .unwrap_or(downsamples.len() - 1)
}

// =============================================================================
// Tests
// =============================================================================
