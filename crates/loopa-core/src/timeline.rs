//! Per-element keyframe tracks over a scene, and resolved frame snapshots.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::easing::Easing;
use crate::evaluator::evaluate_sorted;
use crate::model::{Element, Keyframe, Scene};
use crate::patch::{AnimProp, PropertyPatch};

/// Keyframes grouped by element and sorted by frame.
///
/// Built once per export and shared by all exporters so that every target
/// reads the same evaluated values.
pub struct Timeline<'a> {
    scene: &'a Scene,
    tracks: HashMap<&'a str, Vec<&'a Keyframe>>,
}

impl<'a> Timeline<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        let mut tracks: HashMap<&'a str, Vec<&'a Keyframe>> = HashMap::new();
        for kf in &scene.keyframes {
            tracks.entry(kf.element_id.as_str()).or_default().push(kf);
        }
        for track in tracks.values_mut() {
            track.sort_by_key(|k| k.frame);
        }
        Self { scene, tracks }
    }

    pub fn scene(&self) -> &'a Scene {
        self.scene
    }

    pub fn keyframes_for(&self, element_id: &str) -> &[&'a Keyframe] {
        self.tracks.get(element_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_keyframes(&self, element_id: &str) -> bool {
        !self.keyframes_for(element_id).is_empty()
    }

    /// Whether any keyframe of the element sets `prop`.
    pub fn animates(&self, element_id: &str, prop: AnimProp) -> bool {
        self.keyframes_for(element_id)
            .iter()
            .any(|k| k.props.contains(prop))
    }

    pub fn animates_any(&self, element_id: &str, props: &[AnimProp]) -> bool {
        props.iter().any(|p| self.animates(element_id, *p))
    }

    pub fn patch_at(&self, element_id: &str, frame: f64) -> PropertyPatch {
        evaluate_sorted(self.keyframes_for(element_id), frame)
    }

    /// The element with its evaluated properties at `frame` merged in.
    pub fn resolve(&self, element: &Element, frame: f64) -> Element {
        let kfs = self.keyframes_for(&element.id);
        if kfs.is_empty() {
            return element.clone();
        }
        element.with_patch(&evaluate_sorted(kfs, frame))
    }

    pub fn sample(&self, frame: f64) -> FrameSample {
        let elements = self
            .scene
            .elements
            .iter()
            .map(|el| self.resolve(el, frame))
            .collect();
        FrameSample::new(frame, elements)
    }

    /// Frame `0`, every keyframe frame and the final frame, ascending and unique.
    /// Keyframes past the final frame are dropped; the final frame carries
    /// their interpolated value.
    pub fn sample_frames(&self, element_id: &str) -> Vec<u32> {
        let total = self.scene.total_frames;
        let mut frames = BTreeSet::from([0, total]);
        frames.extend(
            self.keyframes_for(element_id)
                .iter()
                .map(|k| k.frame)
                .filter(|f| *f <= total),
        );
        frames.into_iter().collect()
    }

    /// The easing of the nearest keyframe at or before `frame`, or of the first
    /// keyframe when `frame` precedes them all.
    pub fn easing_at(&self, element_id: &str, frame: u32) -> Easing {
        let kfs = self.keyframes_for(element_id);
        kfs.iter()
            .rev()
            .find(|k| k.frame <= frame)
            .or_else(|| kfs.first())
            .map(|k| k.easing)
            .unwrap_or_default()
    }
}

/// Every element of the scene resolved at one frame, in document order.
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub frame: f64,
    pub elements: Vec<Element>,
    index: HashMap<String, usize>,
    grouped: HashSet<String>,
}

impl FrameSample {
    pub fn new(frame: f64, elements: Vec<Element>) -> Self {
        let index = elements
            .iter()
            .enumerate()
            .map(|(i, el)| (el.id.clone(), i))
            .collect();
        let grouped = elements
            .iter()
            .flat_map(|el| el.child_ids().iter().cloned())
            .collect();
        Self {
            frame,
            elements,
            index,
            grouped,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.index.get(id).map(|i| &self.elements[*i])
    }

    /// Whether the element is drawn by a group rather than at the top level.
    pub fn is_grouped(&self, id: &str) -> bool {
        self.grouped.contains(id)
    }

    /// Visible elements that are not the child of any group.
    pub fn top_level(&self) -> impl Iterator<Item = &Element> {
        self.elements
            .iter()
            .filter(|el| el.visible && !self.grouped.contains(&el.id))
    }

    /// Visible children of a group, in the group's order.
    pub fn children_of<'s>(&'s self, group: &'s Element) -> impl Iterator<Item = &'s Element> + 's {
        group
            .child_ids()
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|el| el.visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElementKind, GroupProps, RectProps};

    fn scene() -> Scene {
        let rect = Element::new("r", ElementKind::Rect(RectProps::default()), 0.0, 0.0, 10.0, 10.0);
        let circle = Element::new("c", ElementKind::Circle, 0.0, 0.0, 10.0, 10.0);
        let group = Element::new(
            "g",
            ElementKind::Group(GroupProps {
                child_ids: vec!["c".into()],
            }),
            0.0,
            0.0,
            10.0,
            10.0,
        );
        Scene::new(100, 100, 30, 60)
            .with_element(rect)
            .with_element(circle)
            .with_element(group)
            .with_keyframe(
                Keyframe::new("r", 40, PropertyPatch::new().with(AnimProp::X, 40.0))
                    .with_easing(Easing::parse("ease-in")),
            )
            .with_keyframe(
                Keyframe::new("r", 10, PropertyPatch::new().with(AnimProp::X, 10.0))
                    .with_easing(Easing::parse("ease-out")),
            )
    }

    #[test]
    fn tracks_are_sorted() {
        let scene = scene();
        let timeline = Timeline::new(&scene);
        let frames: Vec<u32> = timeline.keyframes_for("r").iter().map(|k| k.frame).collect();
        assert_eq!(frames, vec![10, 40]);
        assert!(timeline.keyframes_for("c").is_empty());
        assert!(timeline.animates("r", AnimProp::X));
        assert!(!timeline.animates_any("r", &[AnimProp::Y, AnimProp::Opacity]));
    }

    #[test]
    fn sample_frames_include_bounds() {
        let scene = scene();
        let timeline = Timeline::new(&scene);
        assert_eq!(timeline.sample_frames("r"), vec![0, 10, 40, 60]);
        assert_eq!(timeline.sample_frames("c"), vec![0, 60]);
    }

    #[test]
    fn sample_frames_stop_at_the_final_frame() {
        let mut scene = scene();
        scene.total_frames = 30;
        let timeline = Timeline::new(&scene);
        assert_eq!(timeline.sample_frames("r"), vec![0, 10, 30]);
    }

    #[test]
    fn easing_lookup_uses_nearest_preceding_keyframe() {
        let scene = scene();
        let timeline = Timeline::new(&scene);
        assert_eq!(timeline.easing_at("r", 0), Easing::parse("ease-out"));
        assert_eq!(timeline.easing_at("r", 25), Easing::parse("ease-out"));
        assert_eq!(timeline.easing_at("r", 40), Easing::parse("ease-in"));
        assert_eq!(timeline.easing_at("c", 5), Easing::LINEAR);
    }

    #[test]
    fn sample_resolves_and_hides_grouped_children() {
        let scene = scene();
        let timeline = Timeline::new(&scene);
        let sample = timeline.sample(25.0);
        // ease-out at half progress: 1 - 0.5^3 = 0.875
        assert_eq!(sample.get("r").map(|r| r.x), Some(10.0 + 30.0 * 0.875));
        let top: Vec<&str> = sample.top_level().map(|e| e.id.as_str()).collect();
        assert_eq!(top, vec!["r", "g"]);
        assert!(sample.is_grouped("c"));
    }
}
