//! Retry triggers: boolean tests over an operation's error or result.
//!
//! Error predicates match on an error's kind through the [`Classify`]
//! capability, or on the concrete error through a custom function. Result
//! predicates match by value equality, JSON equality, or a custom function.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ConfigError;

/// Classification of an error into named kinds.
///
/// `is_a` defaults to an exact kind match; override it to model kind
/// hierarchies (e.g. a `"connection_reset"` error that is also an `"io"` error).
pub trait Classify {
    /// Name of this error's most specific kind.
    fn kind(&self) -> &str;

    /// Returns `true` if this error belongs to `kind`.
    fn is_a(&self, kind: &str) -> bool {
        self.kind() == kind
    }
}

impl Classify for io::Error {
    fn kind(&self) -> &str {
        io_kind_name(io::Error::kind(self))
    }

    fn is_a(&self, kind: &str) -> bool {
        kind == "io" || Classify::kind(self) == kind
    }
}

fn io_kind_name(kind: io::ErrorKind) -> &'static str {
    match kind {
        io::ErrorKind::NotFound => "not_found",
        io::ErrorKind::PermissionDenied => "permission_denied",
        io::ErrorKind::ConnectionRefused => "connection_refused",
        io::ErrorKind::ConnectionReset => "connection_reset",
        io::ErrorKind::ConnectionAborted => "connection_aborted",
        io::ErrorKind::NotConnected => "not_connected",
        io::ErrorKind::AddrInUse => "addr_in_use",
        io::ErrorKind::BrokenPipe => "broken_pipe",
        io::ErrorKind::WouldBlock => "would_block",
        io::ErrorKind::InvalidInput => "invalid_input",
        io::ErrorKind::InvalidData => "invalid_data",
        io::ErrorKind::TimedOut => "timed_out",
        io::ErrorKind::Interrupted => "interrupted",
        io::ErrorKind::UnexpectedEof => "unexpected_eof",
        _ => "other",
    }
}

type TestFn<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

enum Test<A> {
    Always,
    Never,
    Custom(TestFn<A>),
}

/// A pure boolean test deciding whether an error or result triggers a retry.
///
/// Predicates carry no mutable state: they are cheap to clone and safe to
/// evaluate concurrently from any number of threads.
pub struct Predicate<A> {
    test: Test<A>,
    label: Arc<str>,
}

impl<A> Predicate<A> {
    /// Matches everything. The default error predicate (retry on any error).
    pub fn always() -> Self {
        Self {
            test: Test::Always,
            label: Arc::from("always"),
        }
    }

    /// Matches nothing. The default result predicate (never retry on a result).
    pub fn never() -> Self {
        Self {
            test: Test::Never,
            label: Arc::from("never"),
        }
    }

    /// Wraps a custom test. Error predicates receive the concrete error, so
    /// the test can inspect more than its kind.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        Self::custom("custom", f)
    }

    fn custom<F>(label: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        Self {
            test: Test::Custom(Arc::new(f)),
            label: label.into(),
        }
    }

    /// Evaluates the predicate.
    pub fn test(&self, candidate: &A) -> bool {
        match &self.test {
            Test::Always => true,
            Test::Never => false,
            Test::Custom(f) => f(candidate),
        }
    }

    /// Returns `true` if this predicate can never match.
    pub fn is_never(&self) -> bool {
        matches!(self.test, Test::Never)
    }

    /// Short human-readable description, e.g. `any_of[timed_out, connection_reset]`.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<A: PartialEq + fmt::Debug + Send + Sync + 'static> Predicate<A> {
    /// Matches results equal to `expected`.
    pub fn equal_to(expected: A) -> Self {
        let label = format!("equal_to({expected:?})");
        Self::custom(label, move |candidate: &A| *candidate == expected)
    }
}

impl<A: Serialize + 'static> Predicate<A> {
    /// Matches results whose JSON form equals `expected`. A `null` expectation
    /// matches absent values such as `None`.
    ///
    /// Values that fail to serialize never match.
    pub fn equals_json(expected: serde_json::Value) -> Self {
        let label = format!("equals_json({expected})");
        Self::custom(label, move |candidate: &A| {
            serde_json::to_value(candidate).is_ok_and(|actual| actual == expected)
        })
    }
}

impl<U: 'static> Predicate<Option<U>> {
    /// Matches absent results.
    pub fn is_none() -> Self {
        Self::custom("is_none", |candidate: &Option<U>| candidate.is_none())
    }
}

impl<A: Classify + 'static> Predicate<A> {
    /// Matches errors that are of `kind`.
    pub fn is_a(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self::custom(format!("is_a({kind})"), move |e: &A| e.is_a(&kind))
    }

    /// Matches errors that are of any of `kinds`. Order and duplicates are
    /// irrelevant; an empty or blank kind is rejected.
    pub fn any_of<I, S>(kinds: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kinds: BTreeSet<String> = kinds.into_iter().map(Into::into).collect();
        if kinds.is_empty() {
            return Err(ConfigError::Predicate(
                "an error kind list must name at least one kind".into(),
            ));
        }
        if kinds.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Predicate("error kinds must not be blank".into()));
        }

        let label = format!(
            "any_of[{}]",
            kinds.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
        );
        Ok(Self::custom(label, move |e: &A| kinds.iter().any(|k| e.is_a(k))))
    }
}

impl<A> Clone for Predicate<A> {
    fn clone(&self) -> Self {
        let test = match &self.test {
            Test::Always => Test::Always,
            Test::Never => Test::Never,
            Test::Custom(f) => Test::Custom(Arc::clone(f)),
        };
        Self {
            test,
            label: Arc::clone(&self.label),
        }
    }
}

impl<A> fmt::Debug for Predicate<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.label).finish()
    }
}
