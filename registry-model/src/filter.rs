use std::fmt;

use serde::{Deserialize, Serialize};

/// What a [Filter] is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// The full repository name.
    Name,

    /// Tag names of an artifact.
    Tag,

    /// Label names of an artifact.
    Label,

    /// The resource type of an artifact.
    Resource,
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterType::Name => f.write_str("name"),
            FilterType::Tag => f.write_str("tag"),
            FilterType::Label => f.write_str("label"),
            FilterType::Resource => f.write_str("resource"),
        }
    }
}

/// A predicate narrowing what an adapter lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    /// What the value is matched against.
    #[serde(rename = "type")]
    pub kind: FilterType,

    /// The pattern or name to match.
    pub value: String,
}

impl Filter {
    /// A filter of `kind` matching `value`.
    pub fn new(kind: FilterType, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Match repository names against a pattern.
    pub fn name(value: impl Into<String>) -> Self {
        Self::new(FilterType::Name, value)
    }

    /// Match tags against a pattern.
    pub fn tag(value: impl Into<String>) -> Self {
        Self::new(FilterType::Tag, value)
    }

    /// Require a label.
    pub fn label(value: impl Into<String>) -> Self {
        Self::new(FilterType::Label, value)
    }

    /// Require a resource type.
    pub fn resource(value: impl Into<String>) -> Self {
        Self::new(FilterType::Resource, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_json() {
        let filter: Filter =
            serde_json::from_str(r#"{"type": "name", "value": "library/**"}"#).unwrap();
        assert_eq!(filter, Filter::name("library/**"));

        let json = serde_json::to_value(Filter::resource("image")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "resource", "value": "image"}));
    }
}
