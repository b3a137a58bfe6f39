/// Resolution state definitions
///
/// Every resolution moves through a fixed sequence of states. Catalog
/// resolutions normalize before caching; stream resolutions cache the parsed
/// reference directly and may take an extra embed hop.
use crate::ResolveError;
use std::fmt;

/// Why a resolution ended in failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Network,
    UnsupportedProvider,
    Parse,
    InvalidRequest,
    Cancelled,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::UnsupportedProvider => "unsupported_provider",
            Self::Parse => "parse",
            Self::InvalidRequest => "invalid_request",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents where a resolution currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionState {
    // ===== Active States =====
    /// Request accepted, nothing checked yet
    Received,

    /// A provider claimed the request
    ProviderMatched,

    /// Fetching the provider's page
    Fetching,

    /// Extracting records or a stream reference from a fetched page
    Parsing,

    /// Fetching the embed page of a two-hop provider
    EmbedFetching,

    /// Converting extracted records to canonical episodes
    Normalizing,

    /// Result committed to the cache
    Cached,

    // ===== Terminal States =====
    /// Result delivered
    Done,

    /// Resolution gave up
    Failed(FailureKind),
}

impl ResolutionState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Returns true if `next` may follow this state
    ///
    /// Any active state may fail. Cache hits skip straight from
    /// `ProviderMatched` to `Done`.
    pub fn can_transition_to(&self, next: ResolutionState) -> bool {
        use ResolutionState::*;

        if let Failed(_) = next {
            return !self.is_terminal();
        }

        matches!(
            (*self, next),
            (Received, ProviderMatched)
                | (ProviderMatched, Fetching)
                | (ProviderMatched, Done)
                | (Fetching, Parsing)
                | (Parsing, EmbedFetching)
                | (Parsing, Normalizing)
                | (Parsing, Cached)
                | (EmbedFetching, Parsing)
                | (Normalizing, Cached)
                | (Cached, Done)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ProviderMatched => "provider_matched",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::EmbedFetching => "embed_fetching",
            Self::Normalizing => "normalizing",
            Self::Cached => "cached",
            Self::Done => "done",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(kind) => write!(f, "failed({})", kind),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Tracks one resolution's state and traces every transition
#[derive(Debug)]
pub struct StateTracker {
    subject: String,
    state: ResolutionState,
}

impl StateTracker {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            state: ResolutionState::Received,
        }
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    /// Moves to `next`, rejecting transitions the state machine forbids
    pub fn advance(&mut self, next: ResolutionState) -> Result<(), ResolveError> {
        if !self.state.can_transition_to(next) {
            return Err(ResolveError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!("{}: {} -> {}", self.subject, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Records the failure behind `error` and hands the error back
    pub fn fail(&mut self, error: ResolveError) -> ResolveError {
        let next = ResolutionState::Failed(error.failure_kind());
        if self.state.can_transition_to(next) {
            tracing::debug!("{}: {} -> {}", self.subject, self.state, next);
            self.state = next;
        }
        error
    }
}
