// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the ursentry::Tracker type.
//!
//! The camera reports a fresh list of bounding boxes for every frame, but detections flicker:
//! an object may be missing for a couple of frames, especially while the robot is moving.
//! The tracker keeps such boxes alive for a short while so the target does not jump around.
use std::time::{Duration, Instant};

use crate::config::TrackerConfig;

pub mod ingest;
pub mod types;

use types::{BoundingBox, Target, TrackedObject};

/// Follows detections across batches and picks the target closest to the image center.
#[derive(Debug, Clone)]
pub struct Tracker {
    tracked: Vec<TrackedObject>,
    distance_threshold: f64,
    time_to_live: Duration,
}

impl Default for Tracker {
    fn default() -> Self {
        Tracker::new(&TrackerConfig::default())
    }
}

impl Tracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Tracker {
            tracked: Vec::new(),
            distance_threshold: config.distance_threshold,
            time_to_live: config.time_to_live(),
        }
    }

    /// Merges a new batch of detections into the tracked set.
    ///
    /// Every detection is kept and stamped with `now`. A previously tracked box survives
    /// unmatched if no detection lies within the distance threshold and it was last seen
    /// no longer than the time-to-live ago; a matched box is replaced by its detection.
    /// An empty batch only ages the tracked boxes.
    /// # Return
    /// The surviving boxes: the detections first, followed by the retained boxes.
    pub fn update(&mut self, detections: &[BoundingBox], now: Instant) -> Vec<BoundingBox> {
        let mut next: Vec<TrackedObject> = detections
            .iter()
            .map(|&bbox| TrackedObject {
                bbox,
                first_seen: now,
                last_seen: now,
            })
            .collect();

        for previous in self.tracked.iter() {
            match self.closest_match(&previous.bbox, detections) {
                Some(index) => {
                    // the detection supersedes the tracked box, it only inherits its age
                    next[index].first_seen = next[index].first_seen.min(previous.first_seen);
                }
                None => {
                    if now.saturating_duration_since(previous.last_seen) <= self.time_to_live {
                        next.push(*previous);
                    }
                }
            }
        }

        self.tracked = next;
        self.boxes()
    }

    /// Index of the detection closest to `bbox` within the distance threshold.
    /// On an exact tie the first detection wins.
    fn closest_match(&self, bbox: &BoundingBox, detections: &[BoundingBox]) -> Option<usize> {
        let mut closest: Option<(usize, f64)> = None;
        for (index, detection) in detections.iter().enumerate() {
            let distance = bbox.center_distance(detection);
            if distance >= self.distance_threshold {
                continue;
            }
            match closest {
                Some((_, best)) if best <= distance => {}
                _ => closest = Some((index, distance)),
            }
        }
        closest.map(|(index, _)| index)
    }

    /// Updates the tracker and returns the target the robot should follow, or None if no
    /// box survived.
    pub fn process(&mut self, detections: &[BoundingBox], now: Instant) -> Option<Target> {
        let boxes = self.update(detections, now);
        select_target(&boxes).map(|bbox| normalize(&bbox))
    }

    /// Currently tracked boxes.
    pub fn boxes(&self) -> Vec<BoundingBox> {
        self.tracked.iter().map(|tracked| tracked.bbox).collect()
    }

    /// Currently tracked objects including their timestamps.
    pub fn tracked_objects(&self) -> &[TrackedObject] {
        &self.tracked
    }

    /// Forgets all tracked boxes.
    pub fn clear(&mut self) {
        self.tracked.clear();
    }
}

/// Returns the box whose center is closest to the image center (500, 500).
/// On an exact tie the first box wins.
pub fn select_target(boxes: &[BoundingBox]) -> Option<BoundingBox> {
    boxes.iter().copied().fold(None, |closest, bbox| match closest {
        Some(best) if best.distance_to_image_center() <= bbox.distance_to_image_center() => {
            Some(best)
        }
        _ => Some(bbox),
    })
}

/// Maps the center of a box from the 0-1000 image space to \[-1, 1\]², rounded to 3 decimals.
pub fn normalize(bbox: &BoundingBox) -> Target {
    Target::from_bounding_box(bbox)
}

#[cfg(test)]
mod tests {
    use crate::config::TrackerConfig;
    use crate::tracker::types::{joystick_or_neutral, BoundingBox, Target};
    use crate::tracker::{normalize, select_target, Tracker};
    use std::time::{Duration, Instant};

    fn centered(cx: f64, cy: f64) -> BoundingBox {
        BoundingBox::from_center(cx, cy, 40., 60.)
    }

    fn centers(boxes: &[BoundingBox]) -> Vec<(f64, f64)> {
        boxes.iter().map(|b| b.center()).collect()
    }

    #[test]
    fn detections_are_always_kept() {
        let mut tracker = Tracker::default();
        let now = Instant::now();
        let boxes = tracker.update(&[centered(100., 100.), centered(900., 100.)], now);
        assert_eq!(centers(&boxes), vec![(100., 100.), (900., 100.)]);
        assert!(tracker
            .tracked_objects()
            .iter()
            .all(|t| t.first_seen == now && t.last_seen == now));
    }

    #[test]
    fn matched_box_is_replaced_by_detection() {
        let mut tracker = Tracker::default();
        let now = Instant::now();
        tracker.update(&[centered(100., 100.)], now);
        let boxes = tracker.update(
            &[centered(110., 100.), centered(500., 500.)],
            now + Duration::from_millis(100),
        );
        assert_eq!(centers(&boxes), vec![(110., 100.), (500., 500.)]);
        assert_eq!(tracker.tracked_objects()[0].first_seen, now);
    }

    #[test]
    fn closest_detection_wins() {
        let mut tracker = Tracker::default();
        let start = Instant::now();
        let later = start + Duration::from_millis(100);
        tracker.update(&[centered(100., 100.)], start);
        let boxes = tracker.update(&[centered(150., 100.), centered(105., 100.)], later);
        // both are within the threshold, so no duplicate of the old box is kept
        assert_eq!(boxes.len(), 2);
        let first_seen: Vec<Instant> = tracker
            .tracked_objects()
            .iter()
            .map(|t| t.first_seen)
            .collect();
        assert_eq!(first_seen, vec![later, start]);
    }

    #[test]
    fn unmatched_box_is_held_within_ttl() {
        let mut tracker = Tracker::default();
        let start = Instant::now();
        tracker.update(&[centered(100., 100.)], start);
        // too far away to be the same object
        let boxes = tracker.update(&[centered(300., 100.)], start + Duration::from_millis(200));
        assert_eq!(centers(&boxes), vec![(300., 100.), (100., 100.)]);
        assert_eq!(tracker.tracked_objects()[1].last_seen, start);
    }

    #[test]
    fn box_disappears_exactly_after_ttl() {
        let mut tracker = Tracker::default();
        let start = Instant::now();
        tracker.update(&[centered(100., 100.)], start);
        let boxes = tracker.update(&[], start + Duration::from_millis(250));
        assert_eq!(boxes.len(), 1);
        let boxes = tracker.update(&[], start + Duration::from_millis(500));
        assert_eq!(boxes.len(), 1);
        let boxes = tracker.update(&[], start + Duration::from_millis(501));
        assert!(boxes.is_empty());
    }

    #[test]
    fn retained_box_keeps_its_last_seen() {
        let mut tracker = Tracker::default();
        let start = Instant::now();
        tracker.update(&[centered(100., 100.)], start);
        for i in 1..=5 {
            tracker.update(&[], start + Duration::from_millis(100 * i));
        }
        assert_eq!(tracker.boxes().len(), 1);
        assert!(tracker
            .update(&[], start + Duration::from_millis(600))
            .is_empty());
    }

    #[test]
    fn threshold_is_configurable() {
        let mut tracker = Tracker::new(&TrackerConfig {
            distance_threshold: 5.,
            ..TrackerConfig::default()
        });
        let now = Instant::now();
        tracker.update(&[centered(100., 100.)], now);
        let boxes = tracker.update(&[centered(110., 100.)], now);
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn target_selection_picks_closest_to_center() {
        let boxes = [
            centered(100., 100.),
            centered(500., 500.),
            centered(900., 900.),
        ];
        assert_eq!(select_target(&boxes).unwrap().center(), (500., 500.));
        assert_eq!(select_target(&[]), None);
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize(&centered(500., 500.)), Target::new(0., 0.));
        assert_eq!(normalize(&BoundingBox::new(0., 0., 0., 0.)), Target::new(-1., -1.));
        assert_eq!(
            normalize(&BoundingBox::new(900., 950., 200., 100.)),
            Target::new(1., 1.)
        );
        assert_eq!(
            normalize(&BoundingBox::new(100., 200., 33., 10.)),
            Target::new(-0.767, -0.59)
        );
    }

    #[test]
    fn process_distinguishes_center_from_nothing() {
        let mut tracker = Tracker::default();
        let start = Instant::now();
        assert_eq!(tracker.process(&[], start), None);
        assert_eq!(
            tracker.process(&[centered(500., 500.)], start),
            Some(Target::neutral())
        );
        assert_eq!(tracker.process(&[], start + Duration::from_secs(1)), None);
        assert_eq!(joystick_or_neutral(None), Target::neutral());
    }

    #[test]
    fn bounding_box_from_json_array() {
        let bbox: BoundingBox = serde_json::from_str("[10, 20, 30, 40]").unwrap();
        assert_eq!(bbox, BoundingBox::new(10., 20., 30., 40.));
        assert_eq!(bbox.center(), (25., 40.));
    }
}
