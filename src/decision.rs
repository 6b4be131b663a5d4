//! Decision types for the admission engine's results.
//!
//! An admission call returns a [`Decision`]: whether the request was allowed
//! and, when it was not, which of the three quota dimensions tripped first.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The reason an admission was denied, or `Allowed` when it was not.
///
/// Variants are evaluated and reported in the order `Rpm -> InputTpm ->
/// OutputTpm`: when a request would violate more than one quota, the first
/// violated in this order is the one returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    /// The request was admitted.
    Allowed,
    /// The requests-per-minute quota was exhausted.
    RpmExceeded,
    /// The input-tokens-per-minute quota would be exceeded.
    InputTpmExceeded,
    /// The output-tokens-per-minute quota would be exceeded.
    OutputTpmExceeded,
}

impl Reason {
    /// The wire string used by the admission script and the 429 body.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "ALLOWED",
            Self::RpmExceeded => "RPM_EXCEEDED",
            Self::InputTpmExceeded => "INPUT_TPM_EXCEEDED",
            Self::OutputTpmExceeded => "OUTPUT_TPM_EXCEEDED",
        }
    }

    /// Parse the wire string returned by the store.
    ///
    /// Unrecognized strings map to `Allowed` -- the caller is expected to
    /// also check the boolean `allowed` flag returned alongside the reason,
    /// so an unknown reason string never by itself causes a spurious denial.
    pub fn parse(s: &str) -> Self {
        match s {
            "RPM_EXCEEDED" => Self::RpmExceeded,
            "INPUT_TPM_EXCEEDED" => Self::InputTpmExceeded,
            "OUTPUT_TPM_EXCEEDED" => Self::OutputTpmExceeded,
            _ => Self::Allowed,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    allowed: bool,
    reason: Reason,
}

impl Decision {
    /// Build an "allowed" decision.
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: Reason::Allowed,
        }
    }

    /// Build a "denied" decision carrying the tripped reason.
    ///
    /// # Panics
    ///
    /// Panics if `reason` is [`Reason::Allowed`] -- a denial must carry one
    /// of the three quota-exceeded reasons.
    pub fn denied(reason: Reason) -> Self {
        assert_ne!(
            reason,
            Reason::Allowed,
            "a denied decision must carry a quota-exceeded reason"
        );
        Self {
            allowed: false,
            reason,
        }
    }

    /// Whether the request is allowed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Whether the request is denied.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// The reason reported by the admission script.
    pub fn reason(&self) -> Reason {
        self.reason
    }
}
