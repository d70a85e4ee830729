//! Timeline assembly: screen time and transitions across the media list.
//!
//! Every segment owns an exclusive slot of `slot` seconds. Neighbouring
//! segments additionally share a transition window of `T` seconds at each
//! boundary, so for `K` segments `K * slot + (K - 1) * T == D`. A segment's
//! `start..end` is its whole on-screen window, transition windows included,
//! which is also the clip length the compositor renders for it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assets::{AssetSource, MediaAsset};
use crate::error::{PipelineError, PipelineResult};
use crate::request::Mood;

/// Absolute tolerance used when checking duration sums.
pub const DURATION_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    Crossfade,
    Fade,
    SlideLeft,
    SlideRight,
    Zoom,
}

impl TransitionStyle {
    pub const ALL: [TransitionStyle; 5] = [
        TransitionStyle::Crossfade,
        TransitionStyle::Fade,
        TransitionStyle::SlideLeft,
        TransitionStyle::SlideRight,
        TransitionStyle::Zoom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransitionStyle::Crossfade => "crossfade",
            TransitionStyle::Fade => "fade",
            TransitionStyle::SlideLeft => "slide_left",
            TransitionStyle::SlideRight => "slide_right",
            TransitionStyle::Zoom => "zoom",
        }
    }
}

impl fmt::Display for TransitionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        TransitionStyle::ALL
            .into_iter()
            .find(|style| style.as_str() == wanted)
            .ok_or_else(|| format!("unknown transition style '{s}'"))
    }
}

/// Style forced at the first and last boundary of a dynamic timeline.
const DYNAMIC_EDGE: TransitionStyle = TransitionStyle::Zoom;
const DYNAMIC_CYCLE: [TransitionStyle; 4] = [
    TransitionStyle::Crossfade,
    TransitionStyle::Fade,
    TransitionStyle::SlideLeft,
    TransitionStyle::SlideRight,
];

/// How boundary styles are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// One style at every boundary.
    Explicit(TransitionStyle),
    /// Chosen per boundary from the mood and segment index.
    Mood(Mood),
}

impl TransitionPolicy {
    pub fn new(explicit: Option<TransitionStyle>, mood: Mood) -> Self {
        match explicit {
            Some(style) => TransitionPolicy::Explicit(style),
            None => TransitionPolicy::Mood(mood),
        }
    }

    /// Style for the boundary entering segment `index` (`1..count`).
    pub fn style_for(&self, index: usize, count: usize) -> TransitionStyle {
        match *self {
            TransitionPolicy::Explicit(style) => style,
            TransitionPolicy::Mood(Mood::Professional) => TransitionStyle::Crossfade,
            TransitionPolicy::Mood(Mood::Casual) => {
                if index % 2 == 0 {
                    TransitionStyle::SlideLeft
                } else {
                    TransitionStyle::SlideRight
                }
            }
            TransitionPolicy::Mood(Mood::Dynamic) => {
                if index <= 1 || index + 1 >= count {
                    DYNAMIC_EDGE
                } else {
                    DYNAMIC_CYCLE[index % DYNAMIC_CYCLE.len()]
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    pub asset: MediaAsset,
    /// Start of the on-screen window, including the incoming transition.
    pub start: f64,
    /// End of the on-screen window, including the outgoing transition.
    pub end: f64,
    /// Exclusive screen time, not shared with a neighbour.
    pub slot: f64,
    /// Incoming transition; set for every segment after the first.
    pub transition: Option<TransitionStyle>,
    pub transition_duration: f64,
}

impl TimelineSegment {
    /// Clip length the compositor renders for this segment.
    pub fn clip_length(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub segments: Vec<TimelineSegment>,
    pub total_duration: f64,
    pub transition_duration: f64,
    /// Assets left off the end of the list by the per-segment floor.
    pub dropped: usize,
}

impl Timeline {
    pub fn slot_sum(&self) -> f64 {
        self.segments.iter().map(|s| s.slot).sum()
    }

    pub fn transition_time(&self) -> f64 {
        self.segments.len().saturating_sub(1) as f64 * self.transition_duration
    }
}

#[derive(Debug, Clone)]
pub struct TimelineBuilder {
    min_segment_seconds: f64,
}

impl TimelineBuilder {
    pub fn new(min_segment_seconds: f64) -> Self {
        Self {
            min_segment_seconds,
        }
    }

    /// Lay `assets` out over `total` seconds with `transition` seconds per boundary.
    ///
    /// Caller-chosen media (explicit stock or uploads) always gets equal slots.
    /// Auto-fetched media is truncated, keeping order, until every slot meets
    /// the floor.
    pub fn build(
        &self,
        assets: Vec<MediaAsset>,
        source: AssetSource,
        total: f64,
        transition: f64,
        policy: TransitionPolicy,
    ) -> PipelineResult<Timeline> {
        if assets.is_empty() {
            return Err(PipelineError::asset_fetch("no media assets to place on the timeline"));
        }
        if !total.is_finite() || total <= 0.0 {
            return Err(PipelineError::validation(format!(
                "timeline duration must be positive, got {total}"
            )));
        }
        let transition = if transition.is_finite() { transition.max(0.0) } else { 0.0 };

        let original = assets.len();
        let keep = match source {
            AssetSource::AutoFetched => self.fitting_count(original, total, transition),
            AssetSource::ExplicitStock | AssetSource::UserUpload => {
                let available = total - transition_time(original, transition);
                if available > 0.0 {
                    original
                } else {
                    warn!(
                        "{} assets with {:.2}s transitions leave no screen time in {:.2}s; using one segment",
                        original, transition, total
                    );
                    1
                }
            }
        };

        let mut assets = assets;
        assets.truncate(keep);
        if keep < original {
            info!(
                "Keeping first {} of {} assets to hold {:.2}s per segment",
                keep, original, self.min_segment_seconds
            );
        }

        let segments = layout(assets, total, transition, policy);
        debug!(
            "Timeline: {} segments, slot {:.3}s, transition {:.3}s",
            segments.len(),
            segments.first().map(|s| s.slot).unwrap_or_default(),
            transition
        );

        Ok(Timeline {
            segments,
            total_duration: total,
            transition_duration: transition,
            dropped: original - keep,
        })
    }

    /// Largest count (at most `n`, at least 1) whose slots all meet the floor.
    fn fitting_count(&self, n: usize, total: f64, transition: f64) -> usize {
        let available = total - transition_time(n, transition);
        if available / n as f64 + DURATION_EPSILON >= self.min_segment_seconds {
            return n;
        }
        // k * floor + (k - 1) * T <= D; exact ratios may land just below an integer
        let k = ((total + transition) / (self.min_segment_seconds + transition) + DURATION_EPSILON).floor();
        (k.max(1.0) as usize).min(n)
    }
}

fn transition_time(count: usize, transition: f64) -> f64 {
    count.saturating_sub(1) as f64 * transition
}

fn layout(
    assets: Vec<MediaAsset>,
    total: f64,
    transition: f64,
    policy: TransitionPolicy,
) -> Vec<TimelineSegment> {
    let count = assets.len();
    if count == 1 {
        let asset = assets.into_iter().next();
        return asset
            .map(|asset| TimelineSegment {
                asset,
                start: 0.0,
                end: total,
                slot: total,
                transition: None,
                transition_duration: 0.0,
            })
            .into_iter()
            .collect();
    }

    let slot = (total - transition_time(count, transition)) / count as f64;
    let mut segments = Vec::with_capacity(count);
    let mut cursor = 0.0;
    for (i, asset) in assets.into_iter().enumerate() {
        let is_last = i + 1 == count;
        let lead = if i > 0 { transition } else { 0.0 };
        let tail = if is_last { 0.0 } else { transition };
        let start = cursor - lead;
        let end = if is_last { total } else { cursor + slot + tail };
        segments.push(TimelineSegment {
            asset,
            start,
            end,
            slot,
            transition: (i > 0).then(|| policy.style_for(i, count)),
            transition_duration: if i > 0 { transition } else { 0.0 },
        });
        cursor += slot + transition;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetKind;
    use std::path::PathBuf;

    fn assets(n: usize, source: AssetSource) -> Vec<MediaAsset> {
        (0..n)
            .map(|i| MediaAsset {
                path: PathBuf::from(format!("asset_{i}.jpg")),
                kind: AssetKind::Image,
                source,
            })
            .collect()
    }

    fn professional() -> TransitionPolicy {
        TransitionPolicy::Mood(Mood::Professional)
    }

    #[test]
    fn equal_branch_fifteen_seconds_five_assets() {
        let builder = TimelineBuilder::new(2.5);
        let timeline = builder
            .build(assets(5, AssetSource::ExplicitStock), AssetSource::ExplicitStock, 15.0, 0.5, professional())
            .unwrap();
        assert_eq!(timeline.segments.len(), 5);
        for seg in &timeline.segments {
            assert!((seg.slot - 2.6).abs() < DURATION_EPSILON);
        }
        assert!((timeline.slot_sum() + timeline.transition_time() - 15.0).abs() < DURATION_EPSILON);
    }

    #[test]
    fn equal_branch_has_no_floor() {
        let builder = TimelineBuilder::new(2.5);
        let timeline = builder
            .build(assets(8, AssetSource::UserUpload), AssetSource::UserUpload, 10.0, 0.5, professional())
            .unwrap();
        assert_eq!(timeline.segments.len(), 8);
        assert_eq!(timeline.dropped, 0);
        assert!(timeline.segments[0].slot < 2.5);
    }

    #[test]
    fn equal_branch_property_holds_across_inputs() {
        let builder = TimelineBuilder::new(2.5);
        for n in 1..=9 {
            for &(d, t) in &[(10.0, 0.0), (15.0, 0.5), (37.3, 0.75), (120.0, 1.2)] {
                let tl = builder
                    .build(assets(n, AssetSource::ExplicitStock), AssetSource::ExplicitStock, d, t, professional())
                    .unwrap();
                let first = tl.segments[0].slot;
                assert!(tl.segments.iter().all(|s| (s.slot - first).abs() < DURATION_EPSILON));
                let sum = tl.slot_sum() + tl.transition_time();
                assert!((sum - d).abs() < DURATION_EPSILON, "n={n} d={d} t={t} sum={sum}");
            }
        }
    }

    #[test]
    fn auto_fetch_truncates_to_floor() {
        let builder = TimelineBuilder::new(2.5);
        let input = assets(6, AssetSource::AutoFetched);
        let timeline = builder
            .build(input.clone(), AssetSource::AutoFetched, 10.0, 0.5, professional())
            .unwrap();
        assert_eq!(timeline.segments.len(), 3);
        assert_eq!(timeline.dropped, 3);
        for (seg, original) in timeline.segments.iter().zip(input.iter()) {
            assert_eq!(&seg.asset, original);
            assert!((seg.slot - 3.0).abs() < DURATION_EPSILON);
        }
        let k = timeline.segments.len() as f64;
        assert_eq!(k, ((10.0 - (k - 1.0) * 0.5) / 2.5_f64).floor().max(1.0));
    }

    #[test]
    fn auto_fetch_keeps_all_when_floor_met() {
        let builder = TimelineBuilder::new(2.5);
        let timeline = builder
            .build(assets(4, AssetSource::AutoFetched), AssetSource::AutoFetched, 30.0, 0.5, professional())
            .unwrap();
        assert_eq!(timeline.segments.len(), 4);
        assert_eq!(timeline.dropped, 0);
    }

    #[test]
    fn auto_fetch_slots_never_fall_below_floor() {
        let builder = TimelineBuilder::new(2.5);
        for n in 1..=12 {
            for &(d, t) in &[(10.0, 0.5), (12.0, 1.0), (14.2, 0.5), (20.0, 2.0), (45.0, 0.3)] {
                let tl = builder
                    .build(assets(n, AssetSource::AutoFetched), AssetSource::AutoFetched, d, t, professional())
                    .unwrap();
                assert!(!tl.segments.is_empty());
                if tl.segments.len() > 1 {
                    assert!(tl.segments[0].slot + DURATION_EPSILON >= 2.5);
                }
                assert!((tl.slot_sum() + tl.transition_time() - d).abs() < DURATION_EPSILON);
            }
        }
    }

    #[test]
    fn floor_count_is_exact_on_integer_ratios() {
        let builder = TimelineBuilder::new(2.5);
        for &(d, t, expected) in &[(16.0, 0.2, 6usize), (10.6, 0.2, 4), (10.0, 0.0, 4)] {
            let tl = builder
                .build(assets(8, AssetSource::AutoFetched), AssetSource::AutoFetched, d, t, professional())
                .unwrap();
            let k = tl.segments.len();
            assert_eq!(k, expected, "d={d} t={t}");
            let rhs = ((d - (k as f64 - 1.0) * t) / 2.5 + DURATION_EPSILON).floor().max(1.0) as usize;
            assert_eq!(k, rhs, "d={d} t={t}");
            assert!((tl.segments[0].slot - 2.5).abs() < DURATION_EPSILON);
        }
    }

    #[test]
    fn keeps_all_assets_when_slot_equals_floor() {
        let builder = TimelineBuilder::new(2.5);
        let tl = builder
            .build(assets(6, AssetSource::AutoFetched), AssetSource::AutoFetched, 16.0, 0.2, professional())
            .unwrap();
        assert_eq!(tl.segments.len(), 6);
        assert_eq!(tl.dropped, 0);
    }

    #[test]
    fn degrades_to_single_segment_below_floor() {
        let builder = TimelineBuilder::new(2.5);
        let timeline = builder
            .build(assets(4, AssetSource::AutoFetched), AssetSource::AutoFetched, 2.0, 0.5, professional())
            .unwrap();
        assert_eq!(timeline.segments.len(), 1);
        assert_eq!(timeline.segments[0].start, 0.0);
        assert_eq!(timeline.segments[0].end, 2.0);
    }

    #[test]
    fn equal_branch_without_screen_time_degrades() {
        let builder = TimelineBuilder::new(2.5);
        let timeline = builder
            .build(assets(6, AssetSource::ExplicitStock), AssetSource::ExplicitStock, 10.0, 2.0, professional())
            .unwrap();
        assert_eq!(timeline.segments.len(), 1);
        assert_eq!(timeline.dropped, 5);
    }

    #[test]
    fn single_asset_spans_whole_duration() {
        let builder = TimelineBuilder::new(2.5);
        let timeline = builder
            .build(assets(1, AssetSource::ExplicitStock), AssetSource::ExplicitStock, 12.0, 0.5, professional())
            .unwrap();
        let seg = &timeline.segments[0];
        assert_eq!((seg.start, seg.end, seg.slot), (0.0, 12.0, 12.0));
        assert!(seg.transition.is_none());
        assert_eq!(timeline.transition_time(), 0.0);
    }

    #[test]
    fn neighbours_overlap_by_transition_only() {
        let builder = TimelineBuilder::new(2.5);
        let timeline = builder
            .build(assets(5, AssetSource::ExplicitStock), AssetSource::ExplicitStock, 15.0, 0.5, professional())
            .unwrap();
        let segs = &timeline.segments;
        assert_eq!(segs[0].start, 0.0);
        assert!((segs[4].end - 15.0).abs() < DURATION_EPSILON);
        for pair in segs.windows(2) {
            assert!(pair[1].start > pair[0].start);
            assert!(pair[0].end > pair[0].start);
            let overlap = pair[0].end - pair[1].start;
            assert!((overlap - 0.5).abs() < DURATION_EPSILON);
        }
        assert!(segs[0].transition.is_none());
        assert!(segs[1..].iter().all(|s| s.transition == Some(TransitionStyle::Crossfade)));
    }

    #[test]
    fn clip_lengths_compose_to_total() {
        let builder = TimelineBuilder::new(2.5);
        let timeline = builder
            .build(assets(4, AssetSource::UserUpload), AssetSource::UserUpload, 20.0, 1.0, professional())
            .unwrap();
        let clips: f64 = timeline.segments.iter().map(|s| s.clip_length()).sum();
        // Each boundary is rendered once although both neighbours own it.
        assert!((clips - timeline.transition_time() - 20.0).abs() < DURATION_EPSILON);
    }

    #[test]
    fn empty_asset_list_is_an_error() {
        let builder = TimelineBuilder::new(2.5);
        let err = builder
            .build(Vec::new(), AssetSource::AutoFetched, 10.0, 0.5, professional())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::AssetFetch);
    }

    #[test]
    fn casual_alternates_directions() {
        let policy = TransitionPolicy::Mood(Mood::Casual);
        assert_eq!(policy.style_for(1, 5), TransitionStyle::SlideRight);
        assert_eq!(policy.style_for(2, 5), TransitionStyle::SlideLeft);
        assert_eq!(policy.style_for(3, 5), TransitionStyle::SlideRight);
    }

    #[test]
    fn dynamic_pins_edges_and_cycles_interior() {
        let policy = TransitionPolicy::Mood(Mood::Dynamic);
        let count = 7;
        assert_eq!(policy.style_for(1, count), TransitionStyle::Zoom);
        assert_eq!(policy.style_for(6, count), TransitionStyle::Zoom);
        let interior: Vec<_> = (2..6).map(|i| policy.style_for(i, count)).collect();
        assert!(interior.iter().all(|s| *s != TransitionStyle::Zoom));
        assert_eq!(interior[0], DYNAMIC_CYCLE[2 % 4]);
        assert_eq!(interior[2], DYNAMIC_CYCLE[4 % 4]);
    }

    #[test]
    fn explicit_style_wins_over_mood() {
        let policy = TransitionPolicy::new(Some(TransitionStyle::Fade), Mood::Dynamic);
        assert!((1..6).all(|i| policy.style_for(i, 6) == TransitionStyle::Fade));
    }

    #[test]
    fn parses_style_names() {
        assert_eq!("slide-left".parse::<TransitionStyle>().unwrap(), TransitionStyle::SlideLeft);
        assert_eq!("ZOOM".parse::<TransitionStyle>().unwrap(), TransitionStyle::Zoom);
        assert!("wipe".parse::<TransitionStyle>().is_err());
    }
}
