//! Operation parameter bags and their validation.
//!
//! Hosts deliver parameters as an ordered list of `tag`/`value` string pairs.
//! When a tag repeats, the first pair wins. Each operation declares the tags
//! it understands as [`ParamSpec`]s; [`Params::resolve`] applies defaults,
//! checks required tags and validates typed values.

use std::collections::BTreeMap;

use tracing::debug;

use crate::errors::ActionError;

/// Tracing target for parameter handling.
const PARAMS_TARGET: &str = "xmnr_actions::params";

/// Value type accepted by a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Free text, possibly empty.
    Text,
    /// `true` or `false`.
    Bool,
    /// Non-negative decimal integer.
    UInt,
    /// Non-empty state name without path separators.
    StateName,
    /// Non-empty filesystem path or glob.
    Path,
}

/// Declaration of one parameter an operation understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Parameter tag.
    pub tag: &'static str,
    /// Value type.
    pub kind: ParamKind,
    /// Default value; `None` makes the parameter required.
    pub default: Option<&'static str>,
}

impl ParamSpec {
    /// Declares a required parameter.
    #[must_use]
    pub const fn required(tag: &'static str, kind: ParamKind) -> Self {
        Self {
            tag,
            kind,
            default: None,
        }
    }

    /// Declares an optional parameter with a default.
    #[must_use]
    pub const fn optional(tag: &'static str, kind: ParamKind, default: &'static str) -> Self {
        Self {
            tag,
            kind,
            default: Some(default),
        }
    }

    fn validate(&self, value: &str) -> Result<(), ActionError> {
        let reject = |message: &str| Err(ActionError::invalid_parameter(self.tag, message));
        match self.kind {
            ParamKind::Text => Ok(()),
            ParamKind::Bool if matches!(value, "true" | "false") => Ok(()),
            ParamKind::Bool => reject("expected 'true' or 'false'"),
            ParamKind::UInt if value.parse::<u64>().is_ok() => Ok(()),
            ParamKind::UInt => reject("expected a non-negative integer"),
            ParamKind::StateName => validate_state_name(self.tag, value),
            ParamKind::Path if value.trim().is_empty() => reject("must not be empty"),
            ParamKind::Path => Ok(()),
        }
    }
}

/// Checks that `value` is usable as a state file stem.
///
/// # Errors
///
/// Returns [`ActionError::InvalidParameter`] for empty names, names with
/// path separators, and the special names `.` and `..`.
pub fn validate_state_name(tag: &str, value: &str) -> Result<(), ActionError> {
    if value.trim().is_empty() {
        return Err(ActionError::invalid_parameter(tag, "must not be empty"));
    }
    if value.contains(['/', '\\']) || matches!(value, "." | "..") {
        return Err(ActionError::invalid_parameter(
            tag,
            "must not contain path separators",
        ));
    }
    Ok(())
}

/// Ordered parameter bag as delivered by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pair, keeping any earlier pair with the same tag.
    #[must_use]
    pub fn with(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(tag, value);
        self
    }

    /// Appends a pair.
    pub fn push(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((tag.into(), value.into()));
    }

    /// Returns the value of the first pair with `tag`.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(candidate, _)| candidate == tag)
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` when the bag has no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates the pairs in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .map(|(tag, value)| (tag.as_str(), value.as_str()))
    }

    /// Applies `specs` to the bag.
    ///
    /// Tags not named by any spec are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::InvalidParameter`] when a required tag is
    /// missing or a value does not match its kind.
    pub fn resolve(&self, specs: &[ParamSpec]) -> Result<ResolvedParams, ActionError> {
        let mut values = BTreeMap::new();
        for spec in specs {
            let value = match (self.get(spec.tag), spec.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default,
                (None, None) => {
                    return Err(ActionError::invalid_parameter(
                        spec.tag,
                        "missing required parameter",
                    ));
                }
            };
            spec.validate(value)?;
            values.insert(spec.tag.to_owned(), value.to_owned());
        }
        for (tag, _) in self.iter() {
            if !specs.iter().any(|spec| spec.tag == tag) {
                debug!(target: PARAMS_TARGET, tag, "ignoring unrecognised parameter");
            }
        }
        Ok(ResolvedParams { values })
    }
}

impl<T, V> FromIterator<(T, V)> for Params
where
    T: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (T, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(tag, value)| (tag.into(), value.into()))
                .collect(),
        }
    }
}

/// Validated parameters with defaults applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedParams {
    values: BTreeMap<String, String>,
}

impl ResolvedParams {
    /// Returns the value for `tag`, if the operation declares it.
    #[must_use]
    pub fn text(&self, tag: &str) -> Option<&str> {
        self.values.get(tag).map(String::as_str)
    }

    /// Returns the value for a required `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Internal`] if the operation never declared
    /// `tag`.
    pub fn require(&self, tag: &str) -> Result<&str, ActionError> {
        self.text(tag)
            .ok_or_else(|| ActionError::internal(format!("parameter '{tag}' was not declared")))
    }

    /// Returns `true` when a boolean `tag` is set to `true`.
    #[must_use]
    pub fn flag(&self, tag: &str) -> bool {
        self.text(tag) == Some("true")
    }

    /// All resolved values keyed by tag.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const SPECS: &[ParamSpec] = &[
        ParamSpec::required("state-name", ParamKind::StateName),
        ParamSpec::optional("including-rollbacks", ParamKind::UInt, "0"),
        ParamSpec::optional("overwrite", ParamKind::Bool, "false"),
    ];

    #[test]
    fn first_matching_pair_wins() {
        let params = Params::new()
            .with("state-name", "first")
            .with("state-name", "second");
        assert_eq!(params.get("state-name"), Some("first"));
    }

    #[test]
    fn defaults_fill_absent_tags() {
        let resolved = Params::new()
            .with("state-name", "base")
            .resolve(SPECS)
            .expect("resolve");
        assert_eq!(resolved.text("including-rollbacks"), Some("0"));
        assert!(!resolved.flag("overwrite"));
        assert_eq!(resolved.require("state-name").expect("declared"), "base");
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let resolved = Params::from_iter([("state-name", "base"), ("colour", "blue")])
            .resolve(SPECS)
            .expect("resolve");
        assert_eq!(resolved.text("colour"), None);
        assert_eq!(resolved.values().len(), 3);
    }

    #[test]
    fn missing_required_tag_is_rejected() {
        let error = Params::new().resolve(SPECS).expect_err("missing tag");
        assert!(matches!(
            error,
            ActionError::InvalidParameter { ref tag, .. } if tag == "state-name"
        ));
    }

    #[rstest]
    #[case("overwrite", "yes")]
    #[case("including-rollbacks", "-1")]
    #[case("including-rollbacks", "two")]
    #[case("state-name", "")]
    #[case("state-name", "../escape")]
    #[case("state-name", "..")]
    fn invalid_values_are_rejected(#[case] tag: &str, #[case] value: &str) {
        let mut params = Params::new().with(tag, value);
        params.push("state-name", "base");

        let error = params.resolve(SPECS).expect_err("invalid value");

        assert!(matches!(
            error,
            ActionError::InvalidParameter { tag: ref rejected, .. } if rejected == tag
        ));
    }

    #[test]
    fn undeclared_required_tag_is_internal() {
        let resolved = ResolvedParams::default();
        assert!(matches!(
            resolved.require("state-name"),
            Err(ActionError::Internal { .. })
        ));
    }
}
