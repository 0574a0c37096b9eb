//! The `expected` side of the unified insert/update primitive.
//!
//! The original C API accepts three kinds of sentinel argument for
//! `expected` (`NOT_FOUND`, `ANY`, or a concrete value). Rather than thread
//! singleton sentinel objects through the Rust API, this is modeled as a
//! small sum type per §9 ("Sum types over polymorphism").

/// What the caller expects the current value under a key to be, before an
/// insert/update/compare-and-set is allowed to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation<V> {
    /// The key must currently be absent (or tombstoned).
    NotFound,
    /// Any current value is acceptable; always proceed (this is `set`).
    Any,
    /// The key must currently hold exactly this value.
    Value(V),
}

impl<V> Expectation<V> {
    /// Returns `true` if `current` (the entry's present value, or `None` if
    /// absent/tombstoned) satisfies this expectation.
    pub fn is_satisfied_by(&self, current: Option<&V>) -> bool
    where
        V: PartialEq,
    {
        match (self, current) {
            (Expectation::NotFound, None) => true,
            (Expectation::NotFound, Some(_)) => false,
            (Expectation::Any, _) => true,
            (Expectation::Value(expected), Some(v)) => expected == v,
            (Expectation::Value(_), None) => false,
        }
    }
}

/// Outcome of the unified `expected_insert_or_update` primitive (§4.5).
#[derive(Debug, Clone)]
pub enum CasOutcome<V> {
    /// The key was absent; `desired` was inserted.
    Inserted,
    /// The key was present with this previous value; it was replaced with
    /// `desired`.
    Replaced(V),
    /// `expected` did not match the key's current state.
    ExpectationFailed,
}
