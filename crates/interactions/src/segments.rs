//! Windowed segment reconciliation (`SPEC_FULL.md` §4.6).
//!
//! The original design reconciles segments against an RDBMS table by
//! expanding the stored row with the largest overlap in place and
//! deleting the rest. This implementation has no row identity to expand
//! in place, so reconciliation instead recomputes the full merged and
//! filtered interval set for the `(session, scene)` key and replaces the
//! stored `Vec<SceneWatchSegment>` wholesale — the observable final
//! state (the segment list after reconciliation) is identical; only the
//! means of getting there differs. See `DESIGN.md`.

use sf_domain::model::SceneWatchSegment;

use crate::playback::merge_intervals;

/// Replace `existing` with the reconciled result of merging it against
/// freshly-replayed `fresh` intervals, discarding anything shorter than
/// `min_duration`.
///
/// `existing` segments outside the recomputation window are passed
/// through untouched by the caller (only segments whose replay window
/// overlaps are included here) — this function just merges and filters
/// whatever set it's given.
pub fn reconcile(
    existing: &[SceneWatchSegment],
    fresh: &[(f64, f64)],
    merge_gap: f64,
    min_duration: f64,
) -> Vec<SceneWatchSegment> {
    let mut all: Vec<(f64, f64)> = existing.iter().map(|s| (s.start_s, s.end_s)).collect();
    all.extend_from_slice(fresh);

    merge_intervals(all, merge_gap)
        .into_iter()
        .filter(|(start, end)| end - start >= min_duration)
        .map(|(start_s, end_s)| SceneWatchSegment { start_s, end_s })
        .collect()
}

/// Extend the latest segment's end when a progress-only batch continues
/// an already-open watch and no new segment boundary was produced. Per
/// §4.6, the extension is only applied when the gap to the new position
/// is within `4 * merge_gap` — beyond that it's treated as a new,
/// disconnected interval instead.
pub fn extend_latest(
    existing: &mut [SceneWatchSegment],
    new_end_s: f64,
    merge_gap: f64,
) -> bool {
    let Some(last) = existing.last_mut() else {
        return false;
    };
    if new_end_s <= last.end_s {
        return false;
    }
    if new_end_s - last.end_s <= merge_gap * 4.0 {
        last.end_s = new_end_s;
        true
    } else {
        false
    }
}

pub fn total_watched_s(segments: &[SceneWatchSegment]) -> f64 {
    segments.iter().map(|s| s.watched_s()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(a: f64, b: f64) -> SceneWatchSegment {
        SceneWatchSegment { start_s: a, end_s: b }
    }

    #[test]
    fn reconcile_merges_overlapping_and_drops_short_fragments() {
        let existing = vec![seg(0.0, 10.0)];
        let fresh = vec![(10.2, 20.0), (30.0, 30.3)];
        let result = reconcile(&existing, &fresh, 0.5, 1.5);
        assert_eq!(result, vec![seg(0.0, 20.0)]);
    }

    #[test]
    fn extend_latest_within_tolerance() {
        let mut segs = vec![seg(0.0, 10.0)];
        assert!(extend_latest(&mut segs, 11.5, 0.5));
        assert_eq!(segs[0].end_s, 11.5);
    }

    #[test]
    fn extend_latest_beyond_tolerance_is_rejected() {
        let mut segs = vec![seg(0.0, 10.0)];
        assert!(!extend_latest(&mut segs, 50.0, 0.5));
        assert_eq!(segs[0].end_s, 10.0);
    }

    #[test]
    fn total_watched_s_sums_segment_lengths() {
        let segs = vec![seg(0.0, 10.0), seg(20.0, 25.0)];
        assert_eq!(total_watched_s(&segs), 15.0);
    }
}
