//! Name patterns: turning an ordinal into a fully qualified name.
//!
//! A pattern is literal text with one or more `{{ordinal}}` placeholders:
//!
//! ```text
//! worker{{ordinal}}.tf.local.   ->  worker1.tf.local., worker2.tf.local., ...
//! ```
//!
//! `{{.ID}}` is accepted as an alias so Corefile-era patterns keep working.
//! Every accepted pattern contains at least one placeholder, which makes
//! rendering injective: distinct ordinals always give distinct names.

use thiserror::Error;

/// Longest name (without the trailing dot) a DNS message can carry.
const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Errors from parsing or rendering a [`NamePattern`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("pattern is empty")]
    Empty,

    #[error("unterminated placeholder starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("unexpected '}}}}' at byte {offset}")]
    UnexpectedClose { offset: usize },

    #[error("unknown placeholder '{{{{{0}}}}}'; only {{{{ordinal}}}} is supported")]
    UnknownPlaceholder(String),

    #[error("pattern has no {{{{ordinal}}}} placeholder, every node would render the same name")]
    MissingOrdinal,

    #[error("ordinal must be at least 1, got {0}")]
    InvalidOrdinal(u32),

    #[error("rendered name '{name}' is not a valid domain name: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Ordinal,
}

/// A parsed name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    source: String,
    segments: Vec<Segment>,
}

impl NamePattern {
    /// Parse a pattern. Rendering ordinal 1 is attempted as part of parsing so
    /// patterns that can never produce a valid name are rejected up front.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        if source.trim().is_empty() {
            return Err(TemplateError::Empty);
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;
        let mut offset = 0;

        while !rest.is_empty() {
            if let Some(after_open) = rest.strip_prefix("{{") {
                let close = after_open
                    .find("}}")
                    .ok_or(TemplateError::Unterminated { offset })?;
                let inner = after_open[..close].trim();
                match inner {
                    "ordinal" | ".ID" => {
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        segments.push(Segment::Ordinal);
                    }
                    other => return Err(TemplateError::UnknownPlaceholder(other.to_string())),
                }
                let consumed = 2 + close + 2;
                rest = &rest[consumed..];
                offset += consumed;
            } else if rest.starts_with("}}") {
                return Err(TemplateError::UnexpectedClose { offset });
            } else {
                let ch = rest.chars().next().unwrap_or_default();
                literal.push(ch);
                rest = &rest[ch.len_utf8()..];
                offset += ch.len_utf8();
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !segments.contains(&Segment::Ordinal) {
            return Err(TemplateError::MissingOrdinal);
        }

        let pattern = Self {
            source: source.to_string(),
            segments,
        };
        pattern.render(1)?;
        Ok(pattern)
    }

    /// The pattern text as configured.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render the name for `ordinal`, lowercased and fully qualified.
    pub fn render(&self, ordinal: u32) -> Result<String, TemplateError> {
        if ordinal == 0 {
            return Err(TemplateError::InvalidOrdinal(ordinal));
        }

        let mut name = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => name.push_str(text),
                Segment::Ordinal => name.push_str(&ordinal.to_string()),
            }
        }
        let name = normalize_name(&name);
        validate_name(&name)?;
        Ok(name)
    }
}

impl std::fmt::Display for NamePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for NamePattern {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Lowercase a name and make it fully qualified.
///
/// Store keys and query names both pass through here so they compare equal.
pub fn normalize_name(name: &str) -> String {
    let mut name = name.trim().to_ascii_lowercase();
    if !name.ends_with('.') {
        name.push('.');
    }
    name
}

fn validate_name(name: &str) -> Result<(), TemplateError> {
    let invalid = |reason| TemplateError::InvalidName {
        name: name.to_string(),
        reason,
    };

    let bare = name.strip_suffix('.').unwrap_or(name);
    if bare.is_empty() {
        return Err(invalid("name is empty"));
    }
    if bare.len() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 253 bytes"));
    }
    for label in bare.split('.') {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(invalid("label is longer than 63 bytes"));
        }
        if !label.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(invalid("label contains whitespace or non-ASCII characters"));
        }
    }
    Ok(())
}
