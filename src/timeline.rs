use std::path::Path;

use crate::schema::ClipSpec;

/// Floor for every resolved clip duration. A clip never schedules with a
/// non-positive length.
pub const MIN_CLIP_DURATION: f64 = 0.05;

/// Timeline positions closer than this are treated as contiguous.
pub const GAP_TOLERANCE: f64 = 0.001;

/// Media duration lookup, in milliseconds. `None` means unknown.
pub trait DurationProbe {
    fn duration_ms(&self, path: &Path) -> Option<u64>;
}

/// Resolved end of the trimmed source range.
///
/// `At` covers both an explicit `trimEnd` and one recovered from the
/// duration probe. `Clamped` records a degenerate `trimEnd < trimStart`;
/// it keeps the clamped position for trim math but yields no usable
/// segment length, so loop/pingpong/stretch fall back to a direct trim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrimEnd {
    Unset,
    At(f64),
    Clamped(f64),
}

impl TrimEnd {
    pub fn position(&self) -> Option<f64> {
        match self {
            Self::Unset => None,
            Self::At(t) | Self::Clamped(t) => Some(*t),
        }
    }

    /// Positive trimmed-segment length, when one exists.
    pub fn segment_len(&self, trim_start: f64) -> Option<f64> {
        match self {
            Self::At(end) if *end > trim_start => Some(end - trim_start),
            _ => None,
        }
    }
}

/// A scheduled, fully time-resolved instance of a source clip.
#[derive(Debug, Clone)]
pub struct ClipJob {
    pub start: f64,
    pub duration: f64,
    pub trim_start: f64,
    pub trim_end: TrimEnd,
    pub spec: ClipSpec,
}

#[derive(Debug, Clone)]
pub enum TimelineItem {
    /// A stretch of timeline with no clip coverage, filled with black.
    Gap { start: f64, duration: f64 },
    Clip(ClipJob),
}

impl TimelineItem {
    pub fn start(&self) -> f64 {
        match self {
            Self::Gap { start, .. } => *start,
            Self::Clip(job) => job.start,
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            Self::Gap { duration, .. } => *duration,
            Self::Clip(job) => job.duration,
        }
    }
}

/// Schedule clips onto the output timeline in input order, interleaving
/// blank filler for any interval no clip covers.
///
/// A running cursor tracks the earliest uncovered position. Explicit clip
/// starts are clamped to the cursor; the cursor never moves backwards, so
/// emitted items have non-decreasing starts.
pub fn resolve_timeline(clips: &[ClipSpec], probe: &dyn DurationProbe) -> Vec<TimelineItem> {
    let mut items = Vec::with_capacity(clips.len());
    let mut cursor = 0.0_f64;

    for clip in clips {
        let Some(path) = clip.path.as_ref() else {
            continue;
        };
        let trim_start = clip.trim_start();

        let trim_end = match clip.trim_end {
            Some(end) if end < trim_start => TrimEnd::Clamped(trim_start),
            Some(end) => TrimEnd::At(end),
            None => match probe.duration_ms(path) {
                Some(ms) => TrimEnd::At(trim_start.max(ms as f64 / 1000.0)),
                None => TrimEnd::Unset,
            },
        };

        let raw_duration = clip
            .duration
            .or_else(|| trim_end.position().map(|end| end - trim_start))
            .unwrap_or(0.0);
        let duration = raw_duration.max(MIN_CLIP_DURATION);

        let start = match clip.start {
            Some(start) => start.max(cursor),
            None => cursor,
        };

        if start > cursor + GAP_TOLERANCE {
            items.push(TimelineItem::Gap {
                start: cursor,
                duration: start - cursor,
            });
        }

        items.push(TimelineItem::Clip(ClipJob {
            start,
            duration,
            trim_start,
            trim_end,
            spec: clip.clone(),
        }));
        cursor = cursor.max(start + duration);
    }

    items
}

/// Rough whole-composition duration estimate, summed from probed source
/// durations. Zero when nothing could be probed.
pub fn estimate_total_ms(clips: &[ClipSpec], probe: &dyn DurationProbe) -> u64 {
    clips
        .iter()
        .filter_map(|clip| clip.path.as_ref())
        .filter_map(|path| probe.duration_ms(path))
        .sum()
}
