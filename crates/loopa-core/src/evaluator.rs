//! Keyframe evaluation: the property values of one element at a fractional frame.

use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};

use crate::color;
use crate::model::{Element, Keyframe};
use crate::patch::{AnimProp, Interpolation, PropValue, PropertyPatch};

/// Evaluates the keyframes of a single element at `frame`.
///
/// The input need not be sorted. Frames before the first keyframe hold the
/// first keyframe's values, frames after the last hold the last's. An empty
/// input yields an empty patch.
pub fn evaluate<K: Borrow<Keyframe>>(keyframes: &[K], frame: f64) -> PropertyPatch {
    let mut sorted: Vec<&Keyframe> = keyframes
        .iter()
        .map(|k| <K as Borrow<Keyframe>>::borrow(k))
        .collect();
    sorted.sort_by_key(|k| k.frame);
    evaluate_sorted(&sorted, frame)
}

/// Same as [`evaluate`], for keyframes already in ascending frame order.
pub fn evaluate_sorted(sorted: &[&Keyframe], frame: f64) -> PropertyPatch {
    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return PropertyPatch::new(),
    };
    if frame <= first.frame as f64 {
        return first.props.clone();
    }
    if frame >= last.frame as f64 {
        return last.props.clone();
    }

    // First bracketing pair wins; duplicate frames never produce a second match.
    let bracket = sorted
        .windows(2)
        .find(|w| w[0].frame as f64 <= frame && w[1].frame as f64 >= frame);
    let (prev, next) = match bracket {
        Some(w) => (w[0], w[1]),
        None => return last.props.clone(),
    };

    let span = (next.frame - prev.frame) as f64;
    if span == 0.0 {
        return prev.props.clone();
    }
    let raw = (frame - prev.frame as f64) / span;
    let eased = prev.easing.apply(raw);

    let keys: BTreeSet<AnimProp> = prev.props.keys().chain(next.props.keys()).collect();
    keys.into_iter()
        .filter_map(|prop| {
            let value = match (prev.props.get(prop), next.props.get(prop)) {
                (Some(a), Some(b)) => interpolate(prop, a, b, raw, eased),
                (Some(a), None) => a.clone(),
                (None, Some(b)) => b.clone(),
                (None, None) => return None,
            };
            Some((prop, value))
        })
        .collect()
}

fn interpolate(prop: AnimProp, a: &PropValue, b: &PropValue, raw: f64, t: f64) -> PropValue {
    // Segment endpoints reproduce the keyframe values exactly, whatever the curve.
    if raw <= 0.0 {
        return a.clone();
    }
    if raw >= 1.0 {
        return b.clone();
    }
    match prop.interpolation() {
        Interpolation::Numeric => match (a, b) {
            (PropValue::Number(a), PropValue::Number(b)) => PropValue::Number(a + (b - a) * t),
            _ => discrete(a, b, t),
        },
        Interpolation::Color => match (a, b) {
            (PropValue::Text(a), PropValue::Text(b)) => color::lerp_hex(a, b, t)
                .map(PropValue::Text)
                .unwrap_or_else(|| discrete_text(a, b, t)),
            _ => discrete(a, b, t),
        },
        Interpolation::Discrete => discrete(a, b, t),
    }
}

fn discrete(a: &PropValue, b: &PropValue, t: f64) -> PropValue {
    if t < 1.0 {
        a.clone()
    } else {
        b.clone()
    }
}

fn discrete_text(a: &str, b: &str, t: f64) -> PropValue {
    PropValue::Text(if t < 1.0 { a } else { b }.to_string())
}

/// Evaluates every element that has keyframes. Elements without keyframes are absent.
pub fn evaluate_scene(
    elements: &[Element],
    keyframes: &[Keyframe],
    frame: f64,
) -> HashMap<String, PropertyPatch> {
    let mut by_element: HashMap<&str, Vec<&Keyframe>> = HashMap::new();
    for kf in keyframes {
        by_element.entry(kf.element_id.as_str()).or_default().push(kf);
    }
    elements
        .iter()
        .filter_map(|el| {
            let kfs = by_element.get(el.id.as_str())?;
            Some((el.id.clone(), evaluate(kfs.as_slice(), frame)))
        })
        .collect()
}
