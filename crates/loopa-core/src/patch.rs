//! Animatable property names and the partial property maps that keyframes carry.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::PathPoint;

/// The closed set of element properties a keyframe may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnimProp {
    X,
    Y,
    Width,
    Height,
    Rotation,
    ScaleX,
    ScaleY,
    Opacity,
    #[serde(rename = "rx")]
    CornerRadius,
    FillColor,
    StrokeColor,
    StrokeWidth,
    FontSize,
    Blur,
    ShadowX,
    ShadowY,
    ShadowBlur,
    ShadowOpacity,
    ShadowColor,
    D,
    Points,
    TransformOriginX,
    TransformOriginY,
}

/// How a property moves between two keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Numeric,
    Color,
    /// Holds the start value until the segment completes.
    Discrete,
}

impl AnimProp {
    pub const ALL: [AnimProp; 23] = [
        AnimProp::X,
        AnimProp::Y,
        AnimProp::Width,
        AnimProp::Height,
        AnimProp::Rotation,
        AnimProp::ScaleX,
        AnimProp::ScaleY,
        AnimProp::Opacity,
        AnimProp::CornerRadius,
        AnimProp::FillColor,
        AnimProp::StrokeColor,
        AnimProp::StrokeWidth,
        AnimProp::FontSize,
        AnimProp::Blur,
        AnimProp::ShadowX,
        AnimProp::ShadowY,
        AnimProp::ShadowBlur,
        AnimProp::ShadowOpacity,
        AnimProp::ShadowColor,
        AnimProp::D,
        AnimProp::Points,
        AnimProp::TransformOriginX,
        AnimProp::TransformOriginY,
    ];

    /// Classification is by property name, never by the runtime value.
    pub fn interpolation(self) -> Interpolation {
        match self {
            AnimProp::FillColor | AnimProp::StrokeColor => Interpolation::Color,
            AnimProp::ShadowColor | AnimProp::D | AnimProp::Points => Interpolation::Discrete,
            _ => Interpolation::Numeric,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AnimProp::X => "x",
            AnimProp::Y => "y",
            AnimProp::Width => "width",
            AnimProp::Height => "height",
            AnimProp::Rotation => "rotation",
            AnimProp::ScaleX => "scaleX",
            AnimProp::ScaleY => "scaleY",
            AnimProp::Opacity => "opacity",
            AnimProp::CornerRadius => "rx",
            AnimProp::FillColor => "fillColor",
            AnimProp::StrokeColor => "strokeColor",
            AnimProp::StrokeWidth => "strokeWidth",
            AnimProp::FontSize => "fontSize",
            AnimProp::Blur => "blur",
            AnimProp::ShadowX => "shadowX",
            AnimProp::ShadowY => "shadowY",
            AnimProp::ShadowBlur => "shadowBlur",
            AnimProp::ShadowOpacity => "shadowOpacity",
            AnimProp::ShadowColor => "shadowColor",
            AnimProp::D => "d",
            AnimProp::Points => "points",
            AnimProp::TransformOriginX => "transformOriginX",
            AnimProp::TransformOriginY => "transformOriginY",
        }
    }
}

impl fmt::Display for AnimProp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A property value: a number, a string (colours, path data) or a point list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Number(f64),
    Text(String),
    Points(Vec<PathPoint>),
}

impl PropValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Number(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Text(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Text(v)
    }
}

impl From<Vec<PathPoint>> for PropValue {
    fn from(v: Vec<PathPoint>) -> Self {
        PropValue::Points(v)
    }
}

/// A partial mapping of properties to values. Ordered so that iteration and
/// serialization are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyPatch(BTreeMap<AnimProp, PropValue>);

impl PropertyPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, prop: AnimProp, value: impl Into<PropValue>) -> Self {
        self.0.insert(prop, value.into());
        self
    }

    pub fn insert(&mut self, prop: AnimProp, value: impl Into<PropValue>) -> Option<PropValue> {
        self.0.insert(prop, value.into())
    }

    pub fn get(&self, prop: AnimProp) -> Option<&PropValue> {
        self.0.get(&prop)
    }

    pub fn number(&self, prop: AnimProp) -> Option<f64> {
        self.get(prop).and_then(PropValue::as_number)
    }

    pub fn text(&self, prop: AnimProp) -> Option<&str> {
        self.get(prop).and_then(PropValue::as_text)
    }

    pub fn contains(&self, prop: AnimProp) -> bool {
        self.0.contains_key(&prop)
    }

    pub fn keys(&self) -> impl Iterator<Item = AnimProp> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AnimProp, &PropValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(AnimProp, PropValue)> for PropertyPatch {
    fn from_iter<I: IntoIterator<Item = (AnimProp, PropValue)>>(iter: I) -> Self {
        PropertyPatch(iter.into_iter().collect())
    }
}

impl IntoIterator for PropertyPatch {
    type Item = (AnimProp, PropValue);
    type IntoIter = btree_map::IntoIter<AnimProp, PropValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
