//! Call-count expectations.

use std::fmt;

/// Expected number of matching calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Times {
    /// Exactly this many.
    Exactly(usize),
    /// This many or more.
    AtLeast(usize),
    /// This many or fewer.
    AtMost(usize),
    /// Inclusive on both ends.
    Between(usize, usize),
    /// Zero.
    Never,
}

impl Times {
    /// Exactly one.
    pub fn once() -> Self {
        Times::Exactly(1)
    }

    /// Zero.
    pub fn never() -> Self {
        Times::Never
    }

    /// Exactly `count`.
    pub fn exactly(count: usize) -> Self {
        Times::Exactly(count)
    }

    /// At least `count`.
    pub fn at_least(count: usize) -> Self {
        Times::AtLeast(count)
    }

    /// One or more.
    pub fn at_least_once() -> Self {
        Times::AtLeast(1)
    }

    /// At most `count`.
    pub fn at_most(count: usize) -> Self {
        Times::AtMost(count)
    }

    /// From `low` to `high`, inclusive.
    pub fn between(low: usize, high: usize) -> Self {
        Times::Between(low, high)
    }

    /// Whether `count` satisfies the expectation.
    pub fn matches(self, count: usize) -> bool {
        match self {
            Times::Exactly(expected) => count == expected,
            Times::AtLeast(low) => count >= low,
            Times::AtMost(high) => count <= high,
            Times::Between(low, high) => (low..=high).contains(&count),
            Times::Never => count == 0,
        }
    }
}

impl fmt::Display for Times {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Times::Exactly(count) => write!(f, "exactly {count}"),
            Times::AtLeast(count) => write!(f, "at least {count}"),
            Times::AtMost(count) => write!(f, "at most {count}"),
            Times::Between(low, high) => write!(f, "between {low} and {high}"),
            Times::Never => f.write_str("no"),
        }
    }
}

/// A verification that did not hold, with the calls that were recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailure {
    /// What was verified, e.g. the mock and its type parameter.
    pub subject: String,
    /// The expectation that failed.
    pub expected: Times,
    /// How many calls matched.
    pub actual: usize,
    /// Every recorded call, rendered.
    pub recorded: Vec<String>,
}

impl VerificationFailure {
    pub(crate) fn check(
        subject: impl Into<String>,
        expected: Times,
        actual: usize,
        recorded: impl FnOnce() -> Vec<String>,
    ) -> Result<(), Self> {
        if expected.matches(actual) {
            return Ok(());
        }
        Err(Self {
            subject: subject.into(),
            expected,
            actual,
            recorded: recorded(),
        })
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "verification failed for {}: expected {} matching call(s), found {}",
            self.subject, self.expected, self.actual
        )?;
        if self.recorded.is_empty() {
            return f.write_str("\nno calls were recorded");
        }
        f.write_str("\nrecorded calls:")?;
        for (index, call) in self.recorded.iter().enumerate() {
            write!(f, "\n  {index}: {call}")?;
        }
        Ok(())
    }
}

impl std::error::Error for VerificationFailure {}

/// Panics with the rendered failure.
#[track_caller]
pub(crate) fn assert_verified(result: Result<(), VerificationFailure>) {
    if let Err(failure) = result {
        panic!("{failure}");
    }
}
