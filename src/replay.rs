//! Replay a closed trace through the I/O state provider

use anyhow::Result;
use std::path::Path;

use crate::event::{read_trace, TraceEvent};
use crate::filter::SyscallFilter;
use crate::io::{IoStateProvider, ProviderStats};
use crate::layout::EventLayout;
use crate::state_system::StateSystem;

/// What to replay and how to read it
#[derive(Debug, Clone, Default)]
pub struct ReplayConfig {
    pub layout: EventLayout,
    pub filter: SyscallFilter,
}

/// Populated store and dispatch counters of a finished replay
#[derive(Debug)]
pub struct ReplayOutcome {
    pub state: StateSystem,
    pub stats: ProviderStats,
    /// Timestamp of the last event, if any
    pub end_time: Option<i64>,
}

/// Replay `events`, in order, into a fresh store
///
/// The store starts at the first event's timestamp and is sealed at the last
/// one, so every value still in effect at trace end can be queried there.
pub fn replay_events(events: &[TraceEvent], config: &ReplayConfig) -> ReplayOutcome {
    let start = events.first().map_or(0, |e| e.timestamp);
    let mut state = StateSystem::new(start);
    let mut provider = IoStateProvider::new(config.layout.clone(), &config.filter);

    for event in events {
        provider.handle_event(&mut state, event);
    }

    let end_time = events.last().map(|e| e.timestamp);
    if let Some(end) = end_time {
        state.close_history(end);
    }

    let stats = provider.stats().clone();
    if provider.requests_in_flight() > 0 {
        tracing::debug!(
            "{} requests never settled, their pool slots stay in use",
            provider.requests_in_flight()
        );
    }
    tracing::info!(
        "Replayed {} events ({} handled, {} errors) into {} attributes",
        stats.events,
        stats.handled,
        stats.errors,
        state.attribute_count()
    );

    ReplayOutcome {
        state,
        stats,
        end_time,
    }
}

/// Load a JSON-lines trace and replay it
pub fn replay_file<P: AsRef<Path>>(path: P, config: &ReplayConfig) -> Result<ReplayOutcome> {
    let events = read_trace(path)?;
    Ok(replay_events(&events, config))
}
