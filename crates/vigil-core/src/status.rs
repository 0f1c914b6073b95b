//! Round status snapshots.
//!
//! A `Status` is produced once per completed round and never changes
//! afterwards. During the round, outcomes are accumulated in a
//! `StatusBuilder` and frozen with `finish()` once every probe is done.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

/// Why a single probe failed in a round.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// The probe's check returned an error.
    #[error("{0:#}")]
    Check(Arc<anyhow::Error>),

    /// The probe did not finish before its deadline and was abandoned.
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// The probe panicked; the payload message is kept when it is a string.
    #[error("probe panicked: {0}")]
    Panic(String),
}

impl ProbeError {
    pub fn check(err: anyhow::Error) -> Self {
        Self::Check(Arc::new(err))
    }

    /// Reach the error the probe returned, if it is an `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        match self {
            Self::Check(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panic(_))
    }
}

impl PartialEq for ProbeError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Check(a), Self::Check(b)) => Arc::ptr_eq(a, b),
            (Self::Timeout(a), Self::Timeout(b)) => a == b,
            (Self::Panic(a), Self::Panic(b)) => a == b,
            _ => false,
        }
    }
}

/// Aggregate error of a failing round.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("health check failed with {} errors: {}", .failures.len(), join(.failures))]
pub struct StatusError {
    failures: Vec<ProbeError>,
}

impl StatusError {
    pub fn failures(&self) -> &[ProbeError] {
        &self.failures
    }

    /// The first wrapped probe error of type `E`.
    pub fn find<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.failures.iter().find_map(|f| f.downcast_ref::<E>())
    }

    pub fn is<E>(&self) -> bool
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.find::<E>().is_some()
    }
}

fn join(failures: &[ProbeError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome of one round: per-probe results, failures in completion
/// order, and the round's wall-clock duration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    outcomes: BTreeMap<String, Option<ProbeError>>,
    failures: Vec<ProbeError>,
    duration: Duration,
}

impl Status {
    pub fn builder() -> StatusBuilder {
        StatusBuilder::default()
    }

    /// Per-probe outcomes; `None` means the probe passed.
    pub fn outcomes(&self) -> &BTreeMap<String, Option<ProbeError>> {
        &self.outcomes
    }

    /// Outcome for one probe. `None` if the probe is not part of this round.
    pub fn outcome(&self, name: &str) -> Option<Option<&ProbeError>> {
        self.outcomes.get(name).map(Option::as_ref)
    }

    /// Failures in the order their probes completed.
    pub fn failures(&self) -> &[ProbeError] {
        &self.failures
    }

    /// Names of probes that failed this round.
    pub fn failing_probes(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_some())
            .map(|(name, _)| name.as_str())
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_healthy(&self) -> bool {
        self.failures.is_empty()
    }

    /// All failures folded into one error, or `None` for a healthy round.
    pub fn as_error(&self) -> Option<StatusError> {
        if self.failures.is_empty() {
            return None;
        }
        Some(StatusError {
            failures: self.failures.clone(),
        })
    }

    /// Probe name → `"ok"` or the failure message.
    pub fn summary(&self) -> BTreeMap<String, String> {
        self.outcomes
            .iter()
            .map(|(name, outcome)| {
                let text = match outcome {
                    None => "ok".to_string(),
                    Some(err) => err.to_string(),
                };
                (name.clone(), text)
            })
            .collect()
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Status", 3)?;
        s.serialize_field("healthy", &self.is_healthy())?;
        s.serialize_field(
            "duration_ms",
            &u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
        )?;
        s.serialize_field("probes", &self.summary())?;
        s.end()
    }
}

/// Mutable accumulator for a round in progress.
#[derive(Debug, Default)]
pub struct StatusBuilder {
    outcomes: BTreeMap<String, Option<ProbeError>>,
    failures: Vec<(String, ProbeError)>,
}

impl StatusBuilder {
    /// Record a probe outcome. A later record for the same name replaces
    /// the earlier one, including its place in the failure list.
    pub fn record(&mut self, name: impl Into<String>, outcome: Option<ProbeError>) -> &mut Self {
        let name = name.into();
        if let Some(Some(_)) = self.outcomes.get(&name) {
            self.failures.retain(|(n, _)| n != &name);
        }
        if let Some(err) = &outcome {
            self.failures.push((name.clone(), err.clone()));
        }
        self.outcomes.insert(name, outcome);
        self
    }

    /// Consuming form of `record`, handy for building fixtures.
    pub fn with(mut self, name: impl Into<String>, outcome: Option<ProbeError>) -> Self {
        self.record(name, outcome);
        self
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Freeze into an immutable `Status`.
    pub fn finish(self, duration: Duration) -> Status {
        Status {
            outcomes: self.outcomes,
            failures: self.failures.into_iter().map(|(_, err)| err).collect(),
            duration,
        }
    }
}
