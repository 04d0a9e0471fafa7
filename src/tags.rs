// Metric dimensions
// This file defines the immutable tag set attached to every metric sample
// and the fixed dimension names shared with the backend dashboards
//
// Numan Thabit 2025 Nov

use std::collections::BTreeMap;
use std::fmt;

pub const TAG_APPLICATION_NAME: &str = "Application Name";
pub const TAG_INSTANCE_TYPE: &str = "Instance Type";
pub const TAG_ENVIRONMENT: &str = "Environment";
/// Outcome of the measured operation, `Success` or `Failure`.
pub const TAG_RESULT: &str = "Result";

pub const SUCCESS: &str = "Success";
pub const FAILURE: &str = "Failure";

/// Value of the `Result` dimension for an outcome.
pub fn result_value(success: bool) -> &'static str {
    if success {
        SUCCESS
    } else {
        FAILURE
    }
}

/// Key-unique set of dimensions.
///
/// Backed by an ordered map so two sets holding the same pairs compare and
/// hash equal no matter how they were built. Every combinator returns a new
/// set; the receiver is left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tags {
    inner: BTreeMap<String, String>,
}

impl Tags {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Singleton set.
    pub fn of(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::empty().and(name, value)
    }

    /// Copy of this set with `name` bound to `value`, replacing any prior value.
    pub fn and(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut inner = self.inner.clone();
        inner.insert(name.into(), value.into());
        Self { inner }
    }

    /// Union of both sets; on a shared key the value from `other` wins.
    pub fn merge(&self, other: &Tags) -> Self {
        let mut inner = self.inner.clone();
        inner.extend(other.inner.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { inner }
    }

    /// Shorthand for `and(TAG_RESULT, ...)`.
    pub fn with_result(&self, success: bool) -> Self {
        self.and(TAG_RESULT, result_value(success))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Tags
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_insertion_order() {
        let a = Tags::of("a", "1").and("b", "2");
        let b = Tags::of("b", "2").and("a", "1");
        assert_eq!(a, b);
    }

    #[test]
    fn and_does_not_mutate_receiver() {
        let base = Tags::of("a", "1");
        let extended = base.and("b", "2");
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
    }

    #[test]
    fn and_overwrites_existing_key() {
        let tags = Tags::of("a", "1").and("a", "2");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.get("a"), Some("2"));
    }

    #[test]
    fn merge_prefers_argument_on_conflict() {
        let base = Tags::of(TAG_ENVIRONMENT, "dev").and(TAG_APPLICATION_NAME, "svc");
        let call = Tags::of(TAG_ENVIRONMENT, "prod").with_result(false);
        let merged = base.merge(&call);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get(TAG_ENVIRONMENT), Some("prod"));
        assert_eq!(merged.get(TAG_RESULT), Some(FAILURE));
        assert_eq!(base.get(TAG_ENVIRONMENT), Some("dev"));
    }

    #[test]
    fn display_is_sorted() {
        let tags: Tags = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(tags.to_string(), "{a=1, b=2}");
    }
}
