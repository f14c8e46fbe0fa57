// Playback semantics: active-set windows, trigger routing, seek edges.

use serde_json::json;
use serenade_core::engine::{EngineEvent, EngineState, EventKind, PerformanceEngine};
use serenade_core::stage::{HeadCall, NullEffects, ProbeHead};
use serenade_core::timeline::{
    Block, BlendshapeData, EmojiData, LayerData, LayerId, Timeline, TriggerEdge, TriggerEvent,
};
use std::cell::RefCell;
use std::rc::Rc;

fn emoji_block(id: &str, start: u64, dur: u64) -> Block {
    Block::new(
        id,
        start,
        dur,
        LayerData::Emoji(EmojiData {
            emoji: "🎵".to_string(),
        }),
    )
}

fn engine_with(blocks: Vec<Block>, duration_ms: u64) -> PerformanceEngine {
    let mut timeline = Timeline::new("t", "test", duration_ms);
    timeline.blocks = blocks;
    let (head, _) = ProbeHead::new();
    let mut engine = PerformanceEngine::new(Box::new(head), Box::new(NullEffects));
    engine.set_timeline(timeline).unwrap();
    engine
}

type EdgeLog = Rc<RefCell<Vec<(String, String)>>>;

fn record_edges(engine: &mut PerformanceEngine) -> EdgeLog {
    let log: EdgeLog = Rc::new(RefCell::new(Vec::new()));
    let starts = log.clone();
    engine.on(EventKind::BlockStart, move |e| {
        if let EngineEvent::BlockStart { block_id, .. } = e {
            starts.borrow_mut().push(("start".to_string(), block_id.clone()));
        }
    });
    let ends = log.clone();
    engine.on(EventKind::BlockEnd, move |e| {
        if let EngineEvent::BlockEnd { block_id, .. } = e {
            ends.borrow_mut().push(("end".to_string(), block_id.clone()));
        }
    });
    log
}

// Overlapping blocks on one layer: the active set at each boundary follows
// the half-open window rule exactly.
#[test]
fn active_set_follows_half_open_windows() {
    let mut engine = engine_with(
        vec![emoji_block("B1", 0, 1000), emoji_block("B2", 500, 1000)],
        2000,
    );
    let log = record_edges(&mut engine);
    engine.play().unwrap();

    engine.step(499.0); // t = 499: only B1
    assert_eq!(
        *log.borrow(),
        vec![("start".to_string(), "B1".to_string())]
    );

    engine.step(1.0); // t = 500: B1 and B2
    assert!(log
        .borrow()
        .contains(&("start".to_string(), "B2".to_string())));

    engine.step(500.0); // t = 1000: B1 out, B2 still in
    assert!(log.borrow().contains(&("end".to_string(), "B1".to_string())));
    assert!(!log.borrow().contains(&("end".to_string(), "B2".to_string())));

    engine.step(500.0); // t = 1500: B2 out
    assert!(log.borrow().contains(&("end".to_string(), "B2".to_string())));
}

// A compiled trigger pulse delivers its action to the camera executor in the
// same tick as the blockStart edge.
#[test]
fn start_trigger_reaches_the_camera_executor_same_tick() {
    let mut pulse = Block::new(
        "pulse",
        200,
        160,
        LayerData::Blendshape(BlendshapeData {
            intensity: 0.0,
            ..Default::default()
        }),
    );
    pulse.trigger_events.push(TriggerEvent {
        edge: TriggerEdge::Start,
        target: LayerId::Camera,
        action: "look_at_camera".to_string(),
        args: json!({"t": 600}),
        delay_ms: 0,
    });

    let mut timeline = Timeline::new("t", "trigger test", 1000);
    timeline.blocks = vec![pulse];
    let (head, log) = ProbeHead::new();
    let mut engine = PerformanceEngine::new(Box::new(head), Box::new(NullEffects));
    engine.set_timeline(timeline).unwrap();

    let starts = Rc::new(RefCell::new(0));
    let starts2 = starts.clone();
    engine.on(EventKind::BlockStart, move |_| {
        *starts2.borrow_mut() += 1;
    });

    engine.play().unwrap();
    engine.step(250.0); // crosses the pulse start

    assert_eq!(*starts.borrow(), 1);
    assert!(
        log.borrow().contains(&HeadCall::LookAtCamera(600)),
        "camera action arrived in the same tick: {:?}",
        log.borrow()
    );
}

#[test]
fn delayed_trigger_fires_after_its_delay() {
    let mut pulse = emoji_block("p", 0, 2000);
    pulse.trigger_events.push(TriggerEvent {
        edge: TriggerEdge::Start,
        target: LayerId::Camera,
        action: "look_at_camera".to_string(),
        args: json!({"t": 300}),
        delay_ms: 500,
    });

    let mut timeline = Timeline::new("t", "delay test", 3000);
    timeline.blocks = vec![pulse];
    let (head, log) = ProbeHead::new();
    let mut engine = PerformanceEngine::new(Box::new(head), Box::new(NullEffects));
    engine.set_timeline(timeline).unwrap();
    engine.play().unwrap();

    engine.step(100.0);
    assert!(!log.borrow().contains(&HeadCall::LookAtCamera(300)));
    engine.step(300.0); // t = 400, still before the delay matures
    assert!(!log.borrow().contains(&HeadCall::LookAtCamera(300)));
    engine.step(200.0); // t = 600 >= 500
    assert!(log.borrow().contains(&HeadCall::LookAtCamera(300)));
}

// Seek inside an active block deactivates it and the next tick re-fires its
// start edge.
#[test]
fn seek_refires_edges_for_still_active_blocks() {
    let mut engine = engine_with(vec![emoji_block("B1", 0, 1000)], 2000);
    let log = record_edges(&mut engine);
    engine.play().unwrap();

    engine.step(300.0);
    engine.seek(200.0);
    engine.step(1.0);

    let events = log.borrow().clone();
    assert_eq!(
        events,
        vec![
            ("start".to_string(), "B1".to_string()),
            ("end".to_string(), "B1".to_string()),
            ("start".to_string(), "B1".to_string()),
        ]
    );
}

// Every block that ends was started first, across a whole run.
#[test]
fn no_end_without_a_start() {
    let blocks = vec![
        emoji_block("a", 0, 300),
        emoji_block("b", 100, 900),
        emoji_block("c", 500, 200),
        emoji_block("d", 1500, 400),
    ];
    let mut engine = engine_with(blocks, 2000);
    let log = record_edges(&mut engine);
    engine.play().unwrap();

    let mut t = 0.0;
    while engine.state() == EngineState::Playing {
        engine.step(47.0);
        t += 47.0;
        assert!(t < 10_000.0, "runaway playback");
    }

    let mut started = std::collections::HashSet::new();
    for (kind, id) in log.borrow().iter() {
        match kind.as_str() {
            "start" => {
                started.insert(id.clone());
            }
            _ => {
                assert!(started.contains(id), "block {} ended without starting", id);
            }
        }
    }
    // Everything eventually started and ended.
    assert_eq!(started.len(), 4);
}

#[test]
fn time_updates_are_monotonic_while_playing() {
    let mut engine = engine_with(vec![emoji_block("a", 0, 900)], 1000);
    let times = Rc::new(RefCell::new(Vec::new()));
    let times2 = times.clone();
    engine.on(EventKind::TimeUpdate, move |e| {
        if let EngineEvent::TimeUpdate { time_ms } = e {
            times2.borrow_mut().push(*time_ms);
        }
    });
    engine.play().unwrap();
    for _ in 0..20 {
        engine.step(33.0);
    }
    let times = times.borrow();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}
