//! Origin checks applied before a connection is upgraded

use std::fmt;
use std::sync::Arc;

/// Decides whether a browser `Origin` is allowed to open a channel connection.
///
/// Requests without an `Origin` header come from non-browser clients and are
/// never checked.
#[derive(Clone, Default)]
pub enum OriginPolicy {
    /// Accept every origin
    #[default]
    AllowAll,
    /// Accept only origins that match one of the entries exactly
    AllowList(Vec<String>),
    /// Delegate the decision to a caller-supplied predicate
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl OriginPolicy {
    pub fn allow_list<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowList(origins.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(check))
    }

    /// Check a request's origin header value
    pub fn allows(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return true;
        };

        match self {
            Self::AllowAll => true,
            Self::AllowList(allowed) => allowed
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(origin)),
            Self::Custom(check) => check(origin),
        }
    }
}

impl fmt::Debug for OriginPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowAll => f.write_str("AllowAll"),
            Self::AllowList(allowed) => f.debug_tuple("AllowList").field(allowed).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
