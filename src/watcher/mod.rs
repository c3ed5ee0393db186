//! Token presence tracking

pub mod presence;

pub use presence::{
    dedupe_events, PresenceReader, PresenceState, PresenceTransition, PresenceWatcher, TransitionSink,
    WatcherOptions,
};
