// SERENADE Performance Engine - frame-driven playback state machine
// Copyright (c) 2026 SERENADE Project
//
// The engine owns the playback clock. Each tick it selects the active block
// set per track, fires start/end edges (dispatching cross-layer triggers
// before any executor update sees the block), runs the executors, and emits
// timeUpdate. Single-threaded cooperative throughout: one tick runs to
// completion before anything else touches the rig.

pub mod events;
pub mod executors;

pub use events::{EngineEvent, EngineState, EventBus, EventKind, ListenerId};

use crate::error::EngineError;
use crate::stage::{Effects, Head};
use crate::timeline::{Block, LayerId, Timeline, TriggerEdge};
use executors::{
    BlendshapeExecutor, CameraExecutor, DanceExecutor, EmojiExecutor, FxExecutor,
    LayerExecutor, LightingExecutor, StageContext, VisemeExecutor,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct DeferredTrigger {
    due_ms: f64,
    target: LayerId,
    action: String,
    args: Value,
}

pub struct PerformanceEngine {
    state: EngineState,
    timeline: Option<Timeline>,
    current_time_ms: f64,
    playback_rate: f64,
    looping: bool,
    last_frame: Option<Instant>,
    previously_active: HashSet<String>,
    executors: Vec<Box<dyn LayerExecutor>>,
    head: Box<dyn Head>,
    effects: Box<dyn Effects>,
    bus: EventBus,
    deferred: Vec<DeferredTrigger>,
    outbox: Vec<EngineEvent>,
}

impl PerformanceEngine {
    pub fn new(head: Box<dyn Head>, effects: Box<dyn Effects>) -> Self {
        let executors: Vec<Box<dyn LayerExecutor>> = vec![
            Box::new(VisemeExecutor::new()),
            Box::new(DanceExecutor::new()),
            Box::new(BlendshapeExecutor::new()),
            Box::new(EmojiExecutor::new()),
            Box::new(LightingExecutor::new()),
            Box::new(CameraExecutor::new()),
            Box::new(FxExecutor::new()),
        ];
        Self {
            state: EngineState::Idle,
            timeline: None,
            current_time_ms: 0.0,
            playback_rate: 1.0,
            looping: false,
            last_frame: None,
            previously_active: HashSet::new(),
            executors,
            head,
            effects,
            bus: EventBus::new(),
            deferred: Vec::new(),
            outbox: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn current_time_ms(&self) -> f64 {
        self.current_time_ms
    }

    pub fn duration_ms(&self) -> u64 {
        self.timeline.as_ref().map(|t| t.duration_ms).unwrap_or(0)
    }

    pub fn timeline(&self) -> Option<&Timeline> {
        self.timeline.as_ref()
    }

    /// The editor collaborator mutates blocks in place; the engine re-selects
    /// active blocks every tick, so edits show up on the next frame.
    pub fn timeline_mut(&mut self) -> Option<&mut Timeline> {
        self.timeline.as_mut()
    }

    pub fn head_mut(&mut self) -> &mut dyn Head {
        &mut *self.head
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.playback_rate = rate.max(0.01);
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn on(
        &mut self,
        kind: EventKind,
        listener: impl FnMut(&EngineEvent) + 'static,
    ) -> ListenerId {
        self.bus.on(kind, listener)
    }

    pub fn off(&mut self, id: ListenerId) {
        self.bus.off(id);
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    fn set_state(&mut self, to: EngineState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        self.bus.emit(&EngineEvent::StateChange { from, to });
    }

    /// Load a timeline: idle/ready/error -> loading -> ready, or error when a
    /// layer cannot load its resources. Error is terminal until the next
    /// `set_timeline` or `dispose`.
    pub fn set_timeline(&mut self, timeline: Timeline) -> Result<(), EngineError> {
        self.set_state(EngineState::Loading);
        self.current_time_ms = 0.0;
        self.previously_active.clear();
        self.deferred.clear();
        self.last_frame = None;

        let load_result = {
            let Self {
                executors,
                head,
                effects,
                outbox,
                ..
            } = self;
            let mut result = Ok(());
            for exec in executors.iter_mut() {
                let mut ctx = StageContext {
                    head: &mut **head,
                    effects: &mut **effects,
                    outbox,
                };
                if let Err(e) = exec.load_resources(&timeline, &mut ctx) {
                    result = Err(e);
                    break;
                }
            }
            result
        };

        if let Err(e) = load_result {
            self.set_state(EngineState::Error);
            self.bus.emit(&EngineEvent::EngineError {
                message: e.to_string(),
            });
            return Err(e);
        }

        info!(
            "[ENGINE] timeline '{}' loaded: {} blocks over {} ms",
            timeline.name,
            timeline.blocks.len(),
            timeline.duration_ms
        );
        let (id, name) = (timeline.id.clone(), timeline.name.clone());
        self.timeline = Some(timeline);
        self.set_state(EngineState::Ready);
        self.bus.emit(&EngineEvent::TimelineLoaded { id, name });
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Ready | EngineState::Paused => {
                self.last_frame = None;
                self.set_state(EngineState::Playing);
                self.notify_executors_state();
                self.bus.emit(&EngineEvent::PlaybackStart);
                Ok(())
            }
            _ => Err(EngineError::InvalidState("play")),
        }
    }

    pub fn pause(&mut self) {
        if self.state != EngineState::Playing {
            return;
        }
        self.set_state(EngineState::Paused);
        {
            let Self {
                executors,
                head,
                effects,
                outbox,
                ..
            } = self;
            for exec in executors.iter_mut() {
                let mut ctx = StageContext {
                    head: &mut **head,
                    effects: &mut **effects,
                    outbox,
                };
                exec.pause(&mut ctx);
            }
        }
        self.notify_executors_state();
        self.bus.emit(&EngineEvent::PlaybackPause);
    }

    pub fn stop(&mut self) {
        if !matches!(
            self.state,
            EngineState::Playing | EngineState::Paused | EngineState::Seeking | EngineState::Ready
        ) {
            return;
        }
        self.current_time_ms = 0.0;
        self.previously_active.clear();
        self.deferred.clear();
        self.last_frame = None;
        {
            let Self {
                executors,
                head,
                effects,
                outbox,
                ..
            } = self;
            for exec in executors.iter_mut() {
                let mut ctx = StageContext {
                    head: &mut **head,
                    effects: &mut **effects,
                    outbox,
                };
                exec.stop(&mut ctx);
            }
        }
        self.set_state(EngineState::Ready);
        self.notify_executors_state();
        self.bus.emit(&EngineEvent::PlaybackStop);
        self.flush_outbox();
    }

    /// Jump the clock. Every still-active block is deactivated here and
    /// re-fires its start edge on the next tick.
    pub fn seek(&mut self, time_ms: f64) {
        if self.timeline.is_none() || self.state == EngineState::Error {
            return;
        }
        let was = self.state;
        self.set_state(EngineState::Seeking);
        let duration = self.duration_ms() as f64;
        let target = time_ms.clamp(0.0, duration);

        // End edges for whatever was active.
        {
            let Self {
                timeline,
                executors,
                head,
                effects,
                bus,
                previously_active,
                outbox,
                ..
            } = self;
            let timeline = timeline.as_ref().expect("checked above");
            for block in &timeline.blocks {
                if previously_active.contains(&block.id) {
                    bus.emit(&EngineEvent::BlockEnd {
                        block_id: block.id.clone(),
                        layer: block.layer,
                    });
                    dispatch_block_triggers(
                        block,
                        TriggerEdge::End,
                        executors,
                        &mut **head,
                        &mut **effects,
                        outbox,
                    );
                }
            }
            previously_active.clear();
        }
        self.deferred.clear();
        self.current_time_ms = target;

        {
            let Self {
                executors,
                head,
                effects,
                outbox,
                ..
            } = self;
            for exec in executors.iter_mut() {
                let mut ctx = StageContext {
                    head: &mut **head,
                    effects: &mut **effects,
                    outbox,
                };
                exec.seek(target, &mut ctx);
            }
        }
        self.flush_outbox();

        // seeking -> resume into whatever we were doing.
        let resume = match was {
            EngineState::Playing => EngineState::Playing,
            EngineState::Paused => EngineState::Paused,
            _ => EngineState::Ready,
        };
        self.set_state(resume);
        self.bus.emit(&EngineEvent::TimeUpdate {
            time_ms: self.current_time_ms,
        });
    }

    pub fn dispose(&mut self) {
        {
            let Self {
                executors,
                head,
                effects,
                outbox,
                ..
            } = self;
            for exec in executors.iter_mut() {
                let mut ctx = StageContext {
                    head: &mut **head,
                    effects: &mut **effects,
                    outbox,
                };
                exec.dispose(&mut ctx);
            }
        }
        self.timeline = None;
        self.previously_active.clear();
        self.deferred.clear();
        self.set_state(EngineState::Idle);
    }

    fn notify_executors_state(&mut self) {
        let state = self.state;
        let Self {
            executors,
            head,
            effects,
            outbox,
            ..
        } = self;
        for exec in executors.iter_mut() {
            let mut ctx = StageContext {
                head: &mut **head,
                effects: &mut **effects,
                outbox,
            };
            exec.on_state_change(state, &mut ctx);
        }
    }

    // ------------------------------------------------------------------
    // The tick
    // ------------------------------------------------------------------

    /// Frame-clock entry point: real delta, scaled by the playback rate.
    pub fn tick(&mut self, now: Instant) {
        if self.state != EngineState::Playing {
            self.last_frame = Some(now);
            return;
        }
        let delta_ms = match self.last_frame {
            Some(prev) => now.duration_since(prev).as_secs_f64() * 1000.0,
            None => 0.0,
        };
        self.last_frame = Some(now);
        self.step(delta_ms * self.playback_rate);
    }

    /// Advance the clock by an explicit delta. Public so simulations and
    /// tests can drive playback with a synthetic clock.
    pub fn step(&mut self, delta_ms: f64) {
        if self.state != EngineState::Playing || self.timeline.is_none() {
            return;
        }
        let duration = self.duration_ms() as f64;
        self.current_time_ms += delta_ms;

        if self.current_time_ms >= duration {
            if self.looping && duration > 0.0 {
                self.current_time_ms %= duration;
                self.previously_active.clear();
                self.deferred.clear();
                debug!("[ENGINE] loop wrap");
            } else {
                self.current_time_ms = duration;
                self.process_frame(delta_ms);
                self.bus.emit(&EngineEvent::PlaybackEnd);
                self.stop();
                return;
            }
        }

        self.process_frame(delta_ms);
        self.bus.emit(&EngineEvent::TimeUpdate {
            time_ms: self.current_time_ms,
        });
    }

    fn process_frame(&mut self, delta_ms: f64) {
        let t = self.current_time_ms;
        let Self {
            timeline,
            executors,
            head,
            effects,
            bus,
            previously_active,
            deferred,
            outbox,
            ..
        } = self;
        let timeline = timeline.as_ref().expect("checked by step");

        // Layer gates: disabled or muted layers contribute no active blocks.
        let mut gate: HashMap<LayerId, bool> = HashMap::with_capacity(7);
        for layer in &timeline.layers {
            gate.insert(layer.id, layer.enabled && !layer.muted);
        }

        let mut active_ids: HashSet<String> = HashSet::new();
        let mut active_blocks: Vec<&Block> = Vec::new();
        for block in &timeline.blocks {
            if *gate.get(&block.layer).unwrap_or(&false) && block.is_active_at(t) {
                active_ids.insert(block.id.clone());
                active_blocks.push(block);
            }
        }

        // Edges are detected before executors run: end edges first, then
        // start edges with their triggers, so blockStart listeners observe
        // the edge before the first update that sees the block active.
        for block in &timeline.blocks {
            if previously_active.contains(&block.id) && !active_ids.contains(&block.id) {
                bus.emit(&EngineEvent::BlockEnd {
                    block_id: block.id.clone(),
                    layer: block.layer,
                });
                dispatch_block_triggers(
                    block,
                    TriggerEdge::End,
                    executors,
                    &mut **head,
                    &mut **effects,
                    outbox,
                );
            }
        }
        for block in &active_blocks {
            if !previously_active.contains(&block.id) {
                bus.emit(&EngineEvent::BlockStart {
                    block_id: block.id.clone(),
                    layer: block.layer,
                });
                for trigger in &block.trigger_events {
                    if trigger.edge != TriggerEdge::Start {
                        continue;
                    }
                    if trigger.delay_ms == 0 {
                        route_action(
                            executors,
                            &mut **head,
                            &mut **effects,
                            outbox,
                            trigger.target,
                            &trigger.action,
                            &trigger.args,
                        );
                    } else {
                        deferred.push(DeferredTrigger {
                            due_ms: t + trigger.delay_ms as f64,
                            target: trigger.target,
                            action: trigger.action.clone(),
                            args: trigger.args.clone(),
                        });
                    }
                }
            }
        }
        *previously_active = active_ids;

        // Delayed triggers that have matured; same-instant order is enqueue
        // order.
        let mut matured = Vec::new();
        deferred.retain(|d| {
            if d.due_ms <= t {
                matured.push(d.clone());
                false
            } else {
                true
            }
        });
        for d in matured {
            route_action(
                executors,
                &mut **head,
                &mut **effects,
                outbox,
                d.target,
                &d.action,
                &d.args,
            );
        }

        // Executor updates, winners first within each layer.
        for exec in executors.iter_mut() {
            let layer = exec.layer();
            let mut mine: Vec<&Block> = active_blocks
                .iter()
                .filter(|b| b.layer == layer)
                .copied()
                .collect();
            mine.sort_by(|a, b| a.start_ms.cmp(&b.start_ms).then_with(|| a.id.cmp(&b.id)));
            let mut ctx = StageContext {
                head: &mut **head,
                effects: &mut **effects,
                outbox,
            };
            exec.update(t, delta_ms, &mine, &mut ctx);
        }

        // Executor-produced events go out after the frame's mutations.
        let pending: Vec<EngineEvent> = outbox.drain(..).collect();
        for event in pending {
            bus.emit(&event);
        }
    }

    fn flush_outbox(&mut self) {
        let pending: Vec<EngineEvent> = self.outbox.drain(..).collect();
        for event in pending {
            self.bus.emit(&event);
        }
    }

    /// Route a cross-layer action to the executor that owns the target layer.
    pub fn execute_action(&mut self, target: LayerId, action: &str, args: &Value) {
        let Self {
            executors,
            head,
            effects,
            outbox,
            ..
        } = self;
        route_action(
            executors,
            &mut **head,
            &mut **effects,
            outbox,
            target,
            action,
            args,
        );
        self.flush_outbox();
    }
}

fn route_action(
    executors: &mut [Box<dyn LayerExecutor>],
    head: &mut dyn Head,
    effects: &mut dyn Effects,
    outbox: &mut Vec<EngineEvent>,
    target: LayerId,
    action: &str,
    args: &Value,
) {
    let Some(exec) = executors.iter_mut().find(|e| e.layer() == target) else {
        return;
    };
    let mut ctx = StageContext {
        head,
        effects,
        outbox,
    };
    exec.execute_action(action, args, &mut ctx);
}

fn dispatch_block_triggers(
    block: &Block,
    edge: TriggerEdge,
    executors: &mut [Box<dyn LayerExecutor>],
    head: &mut dyn Head,
    effects: &mut dyn Effects,
    outbox: &mut Vec<EngineEvent>,
) {
    for trigger in &block.trigger_events {
        if trigger.edge == edge {
            route_action(
                executors,
                head,
                effects,
                outbox,
                trigger.target,
                &trigger.action,
                &trigger.args,
            );
        }
    }
}
