//! Playback state machine: reconstructs `[start_s, end_s]` watch intervals
//! by replaying a chronological event sequence (`SPEC_FULL.md` §4.6.1).

use serde_json::Value;

/// One event as seen by the replay step — either a persisted
/// `InteractionEvent` row or a synthetic progress event injected from the
/// current batch (never persisted itself, per §4.6.1).
#[derive(Debug, Clone)]
pub struct ReplayEvent {
    pub event_type: String,
    pub metadata: Value,
}

impl ReplayEvent {
    pub fn new(event_type: impl Into<String>, metadata: Value) -> Self {
        Self {
            event_type: event_type.into(),
            metadata,
        }
    }

    fn position(&self) -> Option<f64> {
        self.metadata.get("position").and_then(Value::as_f64)
    }
}

pub fn is_control_event(event_type: &str) -> bool {
    matches!(
        event_type,
        "scene_watch_start" | "scene_watch_pause" | "scene_watch_complete" | "scene_seek"
    )
}

/// Replay a chronologically-ordered sequence of watch events, producing
/// raw `(start_s, end_s)` intervals. Intervals `<= 0` length are dropped
/// as they're produced, not retained for later filtering.
pub fn replay(events: &[ReplayEvent]) -> Vec<(f64, f64)> {
    let mut last_play_start_pos: Option<f64> = None;
    let mut last_position: Option<f64> = None;
    let mut intervals = Vec::new();

    let mut push = |start: Option<f64>, end: Option<f64>, out: &mut Vec<(f64, f64)>| {
        if let (Some(s), Some(e)) = (start, end) {
            if e > s {
                out.push((s, e));
            }
        }
    };

    for event in events {
        match event.event_type.as_str() {
            "scene_watch_start" => {
                let pos = event.position().or(last_position).unwrap_or(0.0);
                last_play_start_pos = Some(pos);
                last_position = Some(pos);
            }
            "scene_watch_progress" => {
                if let Some(pos) = event.position() {
                    last_position = Some(pos);
                }
                if last_play_start_pos.is_none() {
                    last_play_start_pos = last_position;
                }
            }
            "scene_watch_pause" | "scene_watch_complete" => {
                let pos = event.position().or(last_position).or(last_play_start_pos);
                push(last_play_start_pos, pos, &mut intervals);
                last_play_start_pos = None;
            }
            "scene_seek" => {
                let was_playing = last_play_start_pos.is_some();
                if was_playing {
                    let from = event
                        .metadata
                        .get("from")
                        .and_then(Value::as_f64)
                        .or(last_position);
                    push(last_play_start_pos, from, &mut intervals);
                }
                match event.metadata.get("to").and_then(Value::as_f64) {
                    Some(to) => {
                        last_position = Some(to);
                        last_play_start_pos = if was_playing { Some(to) } else { None };
                    }
                    None => {
                        last_play_start_pos = None;
                    }
                }
            }
            _ => {}
        }
    }

    if last_play_start_pos.is_some() {
        push(last_play_start_pos, last_position, &mut intervals);
    }

    intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    intervals
}

/// Merge a sorted list of `(start, end)` intervals whose gap is within
/// `merge_gap` seconds.
pub fn merge_intervals(mut intervals: Vec<(f64, f64)>, merge_gap: f64) -> Vec<(f64, f64)> {
    intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    let mut merged: Vec<(f64, f64)> = Vec::new();
    for (start, end) in intervals {
        if let Some(last) = merged.last_mut() {
            if start <= last.1 + merge_gap {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(t: &str, pos: Option<f64>) -> ReplayEvent {
        let metadata = match pos {
            Some(p) => json!({"position": p}),
            None => json!({}),
        };
        ReplayEvent::new(t, metadata)
    }

    #[test]
    fn start_then_pause_emits_one_interval() {
        let events = vec![ev("scene_watch_start", Some(0.0)), ev("scene_watch_pause", Some(30.0))];
        assert_eq!(replay(&events), vec![(0.0, 30.0)]);
    }

    #[test]
    fn unterminated_play_emits_interval_at_end_of_replay() {
        let events = vec![ev("scene_watch_start", Some(5.0)), ev("scene_watch_progress", Some(20.0))];
        assert_eq!(replay(&events), vec![(5.0, 20.0)]);
    }

    #[test]
    fn implicit_play_inferred_from_progress_without_start() {
        let events = vec![ev("scene_watch_progress", Some(10.0)), ev("scene_watch_pause", Some(15.0))];
        assert_eq!(replay(&events), vec![(10.0, 15.0)]);
    }

    #[test]
    fn seek_while_playing_splits_into_two_intervals() {
        let events = vec![
            ev("scene_watch_start", Some(0.0)),
            ev("scene_watch_progress", Some(10.0)),
            ReplayEvent::new("scene_seek", json!({"from": 10.0, "to": 50.0})),
            ev("scene_watch_pause", Some(60.0)),
        ];
        assert_eq!(replay(&events), vec![(0.0, 10.0), (50.0, 60.0)]);
    }

    #[test]
    fn seek_with_no_to_stops_playing_state() {
        let events = vec![
            ev("scene_watch_start", Some(0.0)),
            ReplayEvent::new("scene_seek", json!({"from": 10.0})),
            ev("scene_watch_pause", Some(20.0)),
        ];
        // No `to` clears the playing state; the pause that follows has
        // nothing open to close, so it emits nothing.
        assert!(replay(&events).is_empty());
    }

    #[test]
    fn seek_while_not_playing_only_sets_position() {
        let events = vec![ReplayEvent::new("scene_seek", json!({"to": 30.0})), ev("scene_watch_pause", Some(40.0))];
        assert_eq!(replay(&events), vec![(30.0, 40.0)]);
    }

    #[test]
    fn zero_or_negative_length_intervals_are_dropped() {
        let events = vec![ev("scene_watch_start", Some(10.0)), ev("scene_watch_pause", Some(10.0))];
        assert!(replay(&events).is_empty());
    }

    #[test]
    fn merge_intervals_combines_within_gap_tolerance() {
        let merged = merge_intervals(vec![(0.0, 10.0), (10.3, 20.0), (25.0, 30.0)], 0.5);
        assert_eq!(merged, vec![(0.0, 20.0), (25.0, 30.0)]);
    }
}
