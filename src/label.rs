use std::fmt;

/// Normalized judge verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Correct,
    Incorrect,
    Invalid,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Correct => "correct",
            Label::Incorrect => "incorrect",
            Label::Invalid => "invalid",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label plus whether the judge answered with one of the two accepted tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelResult {
    pub label: Label,
    pub valid: bool,
}

/// Map raw judge text to a label.
///
/// Only exact (case-insensitive, whitespace-trimmed) matches of `correct` and
/// `incorrect` are accepted. Everything else, including the empty string
/// produced by a failed judge call, is `Invalid`.
pub fn normalize(raw: &str) -> LabelResult {
    let label = match raw.trim().to_lowercase().as_str() {
        "correct" => Label::Correct,
        "incorrect" => Label::Incorrect,
        _ => Label::Invalid,
    };

    LabelResult {
        label,
        valid: label != Label::Invalid,
    }
}
