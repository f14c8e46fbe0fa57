// SERENADE Engine Events
// Copyright (c) 2026 SERENADE Project

use crate::timeline::LayerId;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Playback state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Seeking,
    Error,
}

/// Everything the engine reports to the outside world. Dispatched
/// synchronously on the engine thread.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChange { from: EngineState, to: EngineState },
    TimeUpdate { time_ms: f64 },
    BlockStart { block_id: String, layer: LayerId },
    BlockEnd { block_id: String, layer: LayerId },
    PlaybackStart,
    PlaybackPause,
    PlaybackStop,
    PlaybackEnd,
    TimelineLoaded { id: String, name: String },
    /// Lip-sync word advance, bridged to lyric overlays.
    WordChange { word: String, index: usize },
    EngineError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChange,
    TimeUpdate,
    BlockStart,
    BlockEnd,
    PlaybackStart,
    PlaybackPause,
    PlaybackStop,
    PlaybackEnd,
    TimelineLoaded,
    WordChange,
    Error,
    /// Wildcard subscription.
    Any,
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::StateChange { .. } => EventKind::StateChange,
            EngineEvent::TimeUpdate { .. } => EventKind::TimeUpdate,
            EngineEvent::BlockStart { .. } => EventKind::BlockStart,
            EngineEvent::BlockEnd { .. } => EventKind::BlockEnd,
            EngineEvent::PlaybackStart => EventKind::PlaybackStart,
            EngineEvent::PlaybackPause => EventKind::PlaybackPause,
            EngineEvent::PlaybackStop => EventKind::PlaybackStop,
            EngineEvent::PlaybackEnd => EventKind::PlaybackEnd,
            EngineEvent::TimelineLoaded { .. } => EventKind::TimelineLoaded,
            EngineEvent::WordChange { .. } => EventKind::WordChange,
            EngineEvent::EngineError { .. } => EventKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&EngineEvent)>;

/// Synchronous listener registry. A panicking listener is logged and skipped;
/// it never takes the other listeners down with it.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(u64, EventKind, Listener)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, kind: EventKind, listener: impl FnMut(&EngineEvent) + 'static) -> ListenerId {
        self.next_id += 1;
        self.listeners.push((self.next_id, kind, Box::new(listener)));
        ListenerId(self.next_id)
    }

    pub fn off(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _, _)| *lid != id.0);
    }

    pub fn emit(&mut self, event: &EngineEvent) {
        let kind = event.kind();
        for (_, wanted, listener) in self.listeners.iter_mut() {
            if *wanted != kind && *wanted != EventKind::Any {
                continue;
            }
            let result = catch_unwind(AssertUnwindSafe(|| listener(event)));
            if result.is_err() {
                error!("[ENGINE] listener panicked on {:?}; continuing", kind);
            }
        }
    }
}
