//! Loop segmentation math.
//!
//! Computes explicit per-repeat playback windows for a set of buffer
//! segments of possibly different lengths, aligned to a common master
//! period. Pure functions, no clock involved: the facade feeds the
//! resulting windows into however many scheduled objects it needs.

/// A requested slice of some parent buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub offset: f64,
    pub duration: f64,
}

/// A segment clamped into the bounds of its parent buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSegment {
    pub offset: f64,
    pub duration: f64,
    /// Duration of the parent buffer.
    pub parent_duration: f64,
}

/// One concrete repeat instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopWindow {
    pub start_time: f64,
    pub stop_time: f64,
    pub offset: f64,
    pub duration: f64,
}

/// The full schedule for a set of looped segments.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSchedule {
    /// One window list per input segment, in input order.
    pub times: Vec<Vec<LoopWindow>>,
    /// Overall duration of the master loop.
    pub duration: f64,
}

/// How a trailing partial repeat is handled by [`LoopPolicy::LoopToFit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TailMode {
    /// Discard the partial repeat entirely.
    Drop,
    /// Truncate the partial repeat to the remaining time.
    #[default]
    Trim,
}

/// Loop policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopPolicy {
    /// Every segment repeats at the period of the longest segment, so
    /// short segments loop "inside" the long one's bar.
    #[default]
    SnapToBoundary,
    /// Each segment repeats at its own period, filling the master window.
    LoopToFit(TailMode),
}

/// Options for [`calculate_schedule_times`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoopOptions {
    /// Constant shift applied to every emitted start/stop time.
    pub schedule_time_offset: f64,
    pub policy: LoopPolicy,
}

/// Clamp a requested segment into `[0, parent_duration]`.
///
/// The offset is clamped first; the duration is then clamped to what
/// remains of the parent past that offset.
pub fn to_buffer_segment(parent_duration: f64, desired: Option<Segment>) -> BufferSegment {
    let desired = desired.unwrap_or(Segment {
        offset: 0.0,
        duration: parent_duration,
    });
    let offset = desired.offset.clamp(0.0, parent_duration);
    let duration = desired.duration.clamp(0.0, parent_duration - offset);
    BufferSegment {
        offset,
        duration,
        parent_duration,
    }
}

/// Compute the repeat windows for every segment.
///
/// The master period is the longest segment's duration; the overall
/// duration is always `repeats × period` regardless of policy.
pub fn calculate_schedule_times(
    repeats: usize,
    segments: &[BufferSegment],
    options: &LoopOptions,
) -> LoopSchedule {
    let period = max_duration(segments);
    let total = period * repeats as f64;

    let times = segments
        .iter()
        .map(|segment| {
            let count = repeat_count(options.policy, segment, repeats, total);
            (0..count)
                .map(|t| {
                    let mut window = window_at(options.policy, t, segment, period, total);
                    window.start_time += options.schedule_time_offset;
                    window.stop_time += options.schedule_time_offset;
                    window
                })
                .collect()
        })
        .collect();

    LoopSchedule {
        times,
        duration: total,
    }
}

fn max_duration(segments: &[BufferSegment]) -> f64 {
    segments.iter().fold(0.0, |max, s| max.max(s.duration))
}

fn repeat_count(
    policy: LoopPolicy,
    segment: &BufferSegment,
    master_repeats: usize,
    total: f64,
) -> usize {
    // A segment clamped down to nothing yields no windows under any
    // policy; dividing by it would blow the count up to usize::MAX.
    if segment.duration <= 0.0 {
        return 0;
    }
    match policy {
        LoopPolicy::SnapToBoundary => master_repeats,
        LoopPolicy::LoopToFit(TailMode::Drop) => (total / segment.duration).floor() as usize,
        LoopPolicy::LoopToFit(TailMode::Trim) => (total / segment.duration).ceil() as usize,
    }
}

fn window_at(
    policy: LoopPolicy,
    t: usize,
    segment: &BufferSegment,
    period: f64,
    total: f64,
) -> LoopWindow {
    match policy {
        // Repeats anchor at multiples of the master period; each
        // occurrence keeps its own duration.
        LoopPolicy::SnapToBoundary => {
            let start_time = t as f64 * period;
            LoopWindow {
                start_time,
                stop_time: start_time + segment.duration,
                offset: segment.offset,
                duration: segment.duration,
            }
        }
        LoopPolicy::LoopToFit(TailMode::Drop) => {
            let start_time = t as f64 * segment.duration;
            LoopWindow {
                start_time,
                stop_time: start_time + segment.duration,
                offset: segment.offset,
                duration: segment.duration,
            }
        }
        // A trailing partial repeat is clamped to the master window end
        // and its duration recomputed to match.
        LoopPolicy::LoopToFit(TailMode::Trim) => {
            let start_time = t as f64 * segment.duration;
            let stop_time = (start_time + segment.duration).min(total);
            LoopWindow {
                start_time,
                stop_time,
                offset: segment.offset,
                duration: stop_time - start_time,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(repeats: usize, segments: &[BufferSegment]) -> LoopSchedule {
        calculate_schedule_times(repeats, segments, &LoopOptions::default())
    }

    #[test]
    fn test_clamping() {
        let seg = to_buffer_segment(100.0, Some(Segment { offset: 80.0, duration: 30.0 }));
        assert_eq!((seg.offset, seg.duration), (80.0, 20.0));

        let seg = to_buffer_segment(100.0, Some(Segment { offset: -80.0, duration: 30.0 }));
        assert_eq!((seg.offset, seg.duration), (0.0, 30.0));

        let seg = to_buffer_segment(100.0, Some(Segment { offset: 10.0, duration: -30.0 }));
        assert_eq!((seg.offset, seg.duration), (10.0, 0.0));

        let seg = to_buffer_segment(100.0, None);
        assert_eq!((seg.offset, seg.duration), (0.0, 100.0));
    }

    #[test]
    fn test_zero_duration_segment_yields_no_windows() {
        // Clamping can leave a segment with nothing to play; it must
        // not divide the fill count into infinity.
        let segments = [
            to_buffer_segment(100.0, Some(Segment { offset: 10.0, duration: -30.0 })),
            to_buffer_segment(4.0, None),
        ];
        let policies = [
            LoopPolicy::SnapToBoundary,
            LoopPolicy::LoopToFit(TailMode::Drop),
            LoopPolicy::LoopToFit(TailMode::Trim),
        ];
        for policy in policies {
            let options = LoopOptions { policy, ..LoopOptions::default() };
            let schedule = calculate_schedule_times(2, &segments, &options);
            assert!(schedule.times[0].is_empty());
            assert_eq!(schedule.times[1].len(), 2);
        }
    }

    #[test]
    fn test_single_source_repeats_back_to_back() {
        let seg = to_buffer_segment(10.0, Some(Segment { offset: 2.0, duration: 5.0 }));
        let schedule = snap(2, &[seg]);

        assert_eq!(schedule.duration, 10.0);
        assert_eq!(schedule.times.len(), 1);
        assert_eq!(
            schedule.times[0],
            vec![
                LoopWindow { start_time: 0.0, stop_time: 5.0, offset: 2.0, duration: 5.0 },
                LoopWindow { start_time: 5.0, stop_time: 10.0, offset: 2.0, duration: 5.0 },
            ]
        );
    }

    #[test]
    fn test_snap_to_boundary_anchors_at_longest_period() {
        let segments = [
            to_buffer_segment(10.0, None),
            to_buffer_segment(5.0, None),
            to_buffer_segment(2.5, None),
        ];
        let schedule = snap(3, &segments);

        assert_eq!(schedule.duration, 30.0);
        for windows in &schedule.times {
            assert_eq!(windows.len(), 3);
            // Start times are multiples of the longest duration.
            assert_eq!(
                windows.iter().map(|w| w.start_time).collect::<Vec<_>>(),
                vec![0.0, 10.0, 20.0]
            );
        }
        // Each segment keeps its own duration per repeat.
        assert_eq!(schedule.times[0][1].stop_time, 20.0);
        assert_eq!(schedule.times[1][1].stop_time, 15.0);
        assert_eq!(schedule.times[2][1].stop_time, 12.5);
    }

    #[test]
    fn test_loop_to_fit_trim_clamps_final_repeat() {
        let segments = [to_buffer_segment(4.0, None), to_buffer_segment(3.0, None)];
        let schedule = calculate_schedule_times(
            2,
            &segments,
            &LoopOptions {
                policy: LoopPolicy::LoopToFit(TailMode::Trim),
                ..LoopOptions::default()
            },
        );

        assert_eq!(schedule.duration, 8.0);
        assert_eq!(
            schedule.times[0],
            vec![
                LoopWindow { start_time: 0.0, stop_time: 4.0, offset: 0.0, duration: 4.0 },
                LoopWindow { start_time: 4.0, stop_time: 8.0, offset: 0.0, duration: 4.0 },
            ]
        );
        assert_eq!(
            schedule.times[1],
            vec![
                LoopWindow { start_time: 0.0, stop_time: 3.0, offset: 0.0, duration: 3.0 },
                LoopWindow { start_time: 3.0, stop_time: 6.0, offset: 0.0, duration: 3.0 },
                LoopWindow { start_time: 6.0, stop_time: 8.0, offset: 0.0, duration: 2.0 },
            ]
        );
    }

    #[test]
    fn test_loop_to_fit_drop_discards_partial_repeat() {
        let segments = [to_buffer_segment(4.0, None), to_buffer_segment(3.0, None)];
        let schedule = calculate_schedule_times(
            2,
            &segments,
            &LoopOptions {
                policy: LoopPolicy::LoopToFit(TailMode::Drop),
                ..LoopOptions::default()
            },
        );

        assert_eq!(
            schedule.times[1],
            vec![
                LoopWindow { start_time: 0.0, stop_time: 3.0, offset: 0.0, duration: 3.0 },
                LoopWindow { start_time: 3.0, stop_time: 6.0, offset: 0.0, duration: 3.0 },
            ]
        );
    }

    #[test]
    fn test_schedule_time_offset_shifts_every_window() {
        let segments = [
            to_buffer_segment(10.0, Some(Segment { offset: 2.0, duration: 5.0 })),
            to_buffer_segment(3.0, None),
        ];
        let unshifted = snap(2, &segments);
        let shifted = calculate_schedule_times(
            2,
            &segments,
            &LoopOptions {
                schedule_time_offset: 100.0,
                ..LoopOptions::default()
            },
        );

        assert_eq!(shifted.duration, unshifted.duration);
        for (a, b) in unshifted.times.iter().zip(&shifted.times) {
            for (wa, wb) in a.iter().zip(b) {
                assert_eq!(wb.start_time, wa.start_time + 100.0);
                assert_eq!(wb.stop_time, wa.stop_time + 100.0);
                assert_eq!(wb.offset, wa.offset);
                assert_eq!(wb.duration, wa.duration);
            }
        }
    }

    #[test]
    fn test_window_duration_invariant() {
        // stop - start == duration everywhere, including trimmed tails.
        let segments = [to_buffer_segment(4.0, None), to_buffer_segment(3.0, None)];
        for policy in [
            LoopPolicy::SnapToBoundary,
            LoopPolicy::LoopToFit(TailMode::Drop),
            LoopPolicy::LoopToFit(TailMode::Trim),
        ] {
            let schedule = calculate_schedule_times(
                3,
                &segments,
                &LoopOptions { policy, ..LoopOptions::default() },
            );
            for windows in &schedule.times {
                for w in windows {
                    assert_eq!(w.stop_time - w.start_time, w.duration);
                }
            }
        }
    }
}
