//! Accumulated, human-readable export warnings.

use serde::Serialize;
use tracing::warn;

/// An ordered set of warning messages, deduplicated by text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Warnings {
    messages: Vec<String>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` unless an identical message is already present.
    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.messages.iter().any(|m| *m == message) {
            return;
        }
        warn!(target: "loopa::export", "{}", message);
        self.messages.push(message);
    }

    pub fn contains(&self, message: &str) -> bool {
        self.messages.iter().any(|m| m == message)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.messages
    }
}

/// An export artifact together with the warnings collected while building it.
#[derive(Debug, Clone)]
pub struct Exported<T> {
    pub artifact: T,
    pub warnings: Vec<String>,
}

impl<T> Exported<T> {
    pub fn new(artifact: T, warnings: Warnings) -> Self {
        Self {
            artifact,
            warnings: warnings.into_vec(),
        }
    }
}
