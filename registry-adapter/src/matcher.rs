//! Namespace expansion and artifact filtering.
//!
//! Nothing in here performs I/O. Adapters compile the caller's filters into a
//! [FilterSet] once per listing, use it to prune repositories before asking
//! for their artifacts, and then narrow each artifact.
//!
//! Filters of different types are ANDed, and so are filters of the same type:
//! every filter must hold.
//!
//! - `name`: a glob over the full repository name, where `*` does not cross
//!   `/` and `**` spans path segments. A value without wildcards must match
//!   exactly.
//! - `tag`: a glob over tag names. An artifact keeps only the tags matching
//!   every tag filter, and is dropped when none remain. Untagged artifacts
//!   never pass a tag filter.
//! - `label`: an exact label name which must be present.
//! - `resource`: a resource type which must admit the artifact's type.

use glob::{MatchOptions, Pattern};
use registry_model::{AdapterInfo, Artifact, Filter, FilterType, ResourceType};

use crate::error::{AdapterError, AdapterErrorKind};

const MATCHER: &str = "matcher";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn has_wildcard(value: &str) -> bool {
    value.contains(&['*', '?', '[', ']'][..])
}

fn bad_pattern(pattern: &str, reason: &str) -> AdapterError {
    AdapterError::builder(
        MATCHER,
        AdapterErrorKind::BadPattern,
        format!("{reason}: {pattern:?}"),
    )
    .build()
}

/// Resolve a namespace pattern to concrete candidate namespaces.
///
/// An exact namespace is its own single candidate, and `prefix/*` resolves to
/// `prefix`. A wildcard anywhere else is a [AdapterErrorKind::BadPattern].
///
/// ```rust
/// use registry_adapter::expand_wildcard_namespace;
///
/// assert_eq!(expand_wildcard_namespace("library/*").unwrap(), vec!["library"]);
/// assert!(expand_wildcard_namespace("a/*/b").is_err());
/// ```
pub fn expand_wildcard_namespace(pattern: &str) -> Result<Vec<String>, AdapterError> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(bad_pattern(pattern, "empty namespace pattern"));
    }

    if !has_wildcard(pattern) {
        return Ok(vec![pattern.to_owned()]);
    }

    match pattern.strip_suffix("/*") {
        Some(prefix) if !prefix.is_empty() && !has_wildcard(prefix) => Ok(vec![prefix.to_owned()]),
        _ => Err(bad_pattern(
            pattern,
            "only a trailing /* wildcard is supported in namespaces",
        )),
    }
}

#[derive(Debug, Clone)]
enum NameMatcher {
    Exact(String),
    Glob(Pattern),
}

impl NameMatcher {
    fn compile(value: &str) -> Result<Self, AdapterError> {
        let value = value.trim();
        if !has_wildcard(value) {
            return Ok(NameMatcher::Exact(value.to_owned()));
        }

        Pattern::new(value)
            .map(NameMatcher::Glob)
            .map_err(|error| {
                AdapterError::builder(MATCHER, AdapterErrorKind::BadPattern, error)
                    .context(format!("pattern {value:?}"))
                    .build()
            })
    }

    fn matches(&self, candidate: &str) -> bool {
        match self {
            NameMatcher::Exact(value) => value == candidate,
            NameMatcher::Glob(pattern) => pattern.matches_with(candidate, MATCH_OPTIONS),
        }
    }

    fn exact(&self) -> Option<&str> {
        match self {
            NameMatcher::Exact(value) => Some(value),
            NameMatcher::Glob(_) => None,
        }
    }

    fn source(&self) -> &str {
        match self {
            NameMatcher::Exact(value) => value,
            NameMatcher::Glob(pattern) => pattern.as_str(),
        }
    }
}

/// A compiled list of filters.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    names: Vec<NameMatcher>,
    tags: Vec<NameMatcher>,
    labels: Vec<String>,
    resource_types: Vec<ResourceType>,
}

impl FilterSet {
    /// Compile `filters`, rejecting malformed globs and unknown resource types.
    pub fn new(filters: &[Filter]) -> Result<Self, AdapterError> {
        let mut set = FilterSet::default();

        for filter in filters {
            match filter.kind {
                FilterType::Name => set.names.push(NameMatcher::compile(&filter.value)?),
                FilterType::Tag => set.tags.push(NameMatcher::compile(&filter.value)?),
                FilterType::Label => set.labels.push(filter.value.trim().to_owned()),
                FilterType::Resource => {
                    let kind = filter
                        .value
                        .parse()
                        .map_err(AdapterError::with(MATCHER, AdapterErrorKind::BadPattern))?;
                    set.resource_types.push(kind);
                }
            }
        }

        Ok(set)
    }

    /// True when nothing is filtered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
            && self.tags.is_empty()
            && self.labels.is_empty()
            && self.resource_types.is_empty()
    }

    /// Whether every resource type filter overlaps what the adapter supports.
    ///
    /// When this is false the listing is empty, and no remote call is needed.
    pub fn admits_any(&self, info: &AdapterInfo) -> bool {
        self.resource_types.iter().all(|kind| info.supports(*kind))
    }

    /// The single repository the name filters allow, when one of them is exact.
    pub fn exact_repository(&self) -> Option<&str> {
        let exact = self.names.iter().find_map(NameMatcher::exact)?;
        self.matches_repository(exact).then_some(exact)
    }

    /// The namespace every matching repository must live in, when the name
    /// filters pin one down with a literal first path segment.
    pub fn namespace(&self) -> Option<&str> {
        self.names.iter().find_map(|name| {
            let source = name.source();
            let (namespace, _) = source.split_once('/')?;
            (!namespace.is_empty() && !has_wildcard(namespace)).then_some(namespace)
        })
    }

    /// Whether `repository` passes every name filter.
    pub fn matches_repository(&self, repository: &str) -> bool {
        self.names.iter().all(|name| name.matches(repository))
    }

    /// Whether a tag passes every tag filter.
    pub fn matches_tag(&self, tag: &str) -> bool {
        self.tags.iter().all(|pattern| pattern.matches(tag))
    }

    /// Whether the artifact's type and labels pass, ignoring tags.
    fn matches_attributes(&self, artifact: &Artifact) -> bool {
        self.resource_types
            .iter()
            .all(|kind| kind.admits(&artifact.kind))
            && self
                .labels
                .iter()
                .all(|label| artifact.labels.contains(label))
    }

    /// Narrow an artifact to the tags which pass, or drop it.
    ///
    /// Type and label checks run first, since they don't depend on tags.
    pub fn narrow(&self, mut artifact: Artifact) -> Option<Artifact> {
        if !self.matches_attributes(&artifact) {
            return None;
        }

        if self.tags.is_empty() {
            return Some(artifact);
        }

        artifact.tags.retain(|tag| self.matches_tag(tag));
        (!artifact.tags.is_empty()).then_some(artifact)
    }

    /// Narrow every artifact of one repository, keeping server order.
    pub fn select<I>(&self, artifacts: I) -> Vec<Artifact>
    where
        I: IntoIterator<Item = Artifact>,
    {
        artifacts
            .into_iter()
            .filter_map(|artifact| self.narrow(artifact))
            .collect()
    }

    /// Whether `artifact` in `repository` passes every filter as-is.
    pub fn matches(&self, repository: &str, artifact: &Artifact) -> bool {
        self.matches_attributes(artifact)
            && self.matches_repository(repository)
            && (self.tags.is_empty() || artifact.tags.iter().any(|tag| self.matches_tag(tag)))
    }
}

/// Check whether `artifact`, found in `repository`, passes every filter.
pub fn matches_all_filters(
    repository: &str,
    artifact: &Artifact,
    filters: &[Filter],
) -> Result<bool, AdapterError> {
    Ok(FilterSet::new(filters)?.matches(repository, artifact))
}
