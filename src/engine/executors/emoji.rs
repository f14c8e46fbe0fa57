// SERENADE Emoji Executor
// Copyright (c) 2026 SERENADE Project

use crate::engine::executors::{LayerExecutor, StageContext};
use crate::timeline::{Block, LayerData, LayerId};
use std::collections::HashSet;

/// Fires each emoji block exactly once near its start. Block ids are
/// remembered until stop or seek so a block never double-fires.
#[derive(Default)]
pub struct EmojiExecutor {
    fired: HashSet<String>,
}

impl EmojiExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LayerExecutor for EmojiExecutor {
    fn layer(&self) -> LayerId {
        LayerId::Emoji
    }

    fn update(
        &mut self,
        time_ms: f64,
        _delta_ms: f64,
        active: &[&Block],
        ctx: &mut StageContext<'_>,
    ) {
        for block in active {
            let LayerData::Emoji(data) = &block.data else {
                continue;
            };
            if block.progress_at(time_ms) < 0.1 && !self.fired.contains(&block.id) {
                ctx.head.speak_emoji(&data.emoji);
                self.fired.insert(block.id.clone());
            }
        }
    }

    fn stop(&mut self, _ctx: &mut StageContext<'_>) {
        self.fired.clear();
    }

    fn seek(&mut self, _time_ms: f64, _ctx: &mut StageContext<'_>) {
        self.fired.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{HeadCall, NullEffects, RecordingHead};
    use crate::timeline::EmojiData;

    fn emoji_block(id: &str, start: u64, dur: u64) -> Block {
        Block::new(
            id,
            start,
            dur,
            LayerData::Emoji(EmojiData {
                emoji: "🔥".to_string(),
            }),
        )
    }

    #[test]
    fn fires_once_near_start() {
        let mut exec = EmojiExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();
        let block = emoji_block("e1", 0, 1000);

        for t in [10.0, 30.0, 60.0] {
            exec.update(
                t,
                16.0,
                &[&block],
                &mut StageContext {
                    head: &mut head,
                    effects: &mut fxs,
                    outbox: &mut outbox,
                },
            );
        }
        assert_eq!(head.calls, vec![HeadCall::SpeakEmoji("🔥".to_string())]);
    }

    #[test]
    fn does_not_fire_late_into_the_block() {
        let mut exec = EmojiExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();
        let block = emoji_block("e1", 0, 1000);

        // First seen already past the 10% window.
        exec.update(
            500.0,
            16.0,
            &[&block],
            &mut StageContext {
                head: &mut head,
                effects: &mut fxs,
                outbox: &mut outbox,
            },
        );
        assert!(head.calls.is_empty());
    }

    #[test]
    fn seek_allows_refire() {
        let mut exec = EmojiExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();
        let block = emoji_block("e1", 0, 1000);

        let mut ctx = StageContext {
            head: &mut head,
            effects: &mut fxs,
            outbox: &mut outbox,
        };
        exec.update(10.0, 16.0, &[&block], &mut ctx);
        exec.seek(0.0, &mut ctx);
        exec.update(20.0, 16.0, &[&block], &mut ctx);
        drop(ctx);
        assert_eq!(head.calls.len(), 2);
    }
}
