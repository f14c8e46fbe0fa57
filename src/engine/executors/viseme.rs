// SERENADE Viseme Executor - lip-sync dispatch and word tracking
// Copyright (c) 2026 SERENADE Project

use crate::engine::events::EngineEvent;
use crate::engine::executors::{arg_str, arg_u64, LayerExecutor, StageContext};
use crate::stage::SpeechCue;
use crate::timeline::{Block, LayerData, LayerId, Timeline, VisemeData};
use serde_json::Value;
use tracing::debug;

/// At most one viseme block spans the song. On block start the full speech
/// cue is handed to the rig (which owns the audio clock); while active we
/// track the current word so lyric overlays can follow along.
#[derive(Default)]
pub struct VisemeExecutor {
    current_block: Option<String>,
    word_index: Option<usize>,
}

impl VisemeExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cue_from(data: &VisemeData) -> Option<SpeechCue> {
    let audio_url = data.audio_url.clone()?;
    if data.words.is_empty() {
        return None;
    }
    Some(SpeechCue {
        audio_url,
        words: data.words.clone(),
        wtimes: data.wtimes.clone(),
        wdurations: data.wdurations.clone(),
        visemes: data.visemes.clone(),
        vtimes: data.vtimes.clone(),
        vdurations: data.vdurations.clone(),
    })
}

impl LayerExecutor for VisemeExecutor {
    fn layer(&self) -> LayerId {
        LayerId::Viseme
    }

    fn load_resources(
        &mut self,
        timeline: &Timeline,
        _ctx: &mut StageContext<'_>,
    ) -> Result<(), crate::error::EngineError> {
        for block in timeline.blocks_on(LayerId::Viseme) {
            if let LayerData::Viseme(data) = &block.data {
                if let Some(url) = &data.audio_url {
                    debug!("[ENGINE] speech audio queued: {}", url);
                }
            }
        }
        Ok(())
    }

    fn update(
        &mut self,
        time_ms: f64,
        _delta_ms: f64,
        active: &[&Block],
        ctx: &mut StageContext<'_>,
    ) {
        let winner = active.iter().find_map(|b| match &b.data {
            LayerData::Viseme(data) => Some((*b, data)),
            _ => None,
        });

        let Some((block, data)) = winner else {
            self.current_block = None;
            self.word_index = None;
            return;
        };

        if self.current_block.as_deref() != Some(block.id.as_str()) {
            if let Some(cue) = cue_from(data) {
                ctx.head.speak_audio(cue);
            }
            self.current_block = Some(block.id.clone());
            self.word_index = None;
        }

        // Walk the word track against block-local time.
        let local = time_ms - block.start_ms as f64;
        let mut index = None;
        for (i, wt) in data.wtimes.iter().enumerate() {
            if *wt as f64 <= local {
                index = Some(i);
            } else {
                break;
            }
        }
        if let Some(i) = index {
            if self.word_index != Some(i) {
                self.word_index = Some(i);
                if let Some(word) = data.words.get(i) {
                    ctx.outbox.push(EngineEvent::WordChange {
                        word: word.clone(),
                        index: i,
                    });
                }
            }
        }
    }

    fn stop(&mut self, _ctx: &mut StageContext<'_>) {
        self.current_block = None;
        self.word_index = None;
    }

    fn seek(&mut self, _time_ms: f64, _ctx: &mut StageContext<'_>) {
        // Audio re-kicks on the next active frame.
        self.current_block = None;
        self.word_index = None;
    }

    fn execute_action(&mut self, action: &str, args: &Value, ctx: &mut StageContext<'_>) {
        match action {
            "speak_break" => {
                ctx.head.speak_break(arg_u64(args, "ms").unwrap_or(500));
            }
            "speak_marker" => {
                debug!(
                    "[ENGINE] speech marker '{}'",
                    arg_str(args, "text").unwrap_or("")
                );
            }
            "speak" => {
                if let Some(text) = arg_str(args, "text") {
                    ctx.head.speak(text);
                }
            }
            other => {
                tracing::warn!("[ENGINE] viseme executor ignoring action '{}'", other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{HeadCall, NullEffects, RecordingHead};

    fn speech_block() -> Block {
        Block::new(
            "v1",
            0,
            3000,
            LayerData::Viseme(VisemeData {
                audio_url: Some("song.mp3".to_string()),
                words: vec!["la".to_string(), "di".to_string(), "da".to_string()],
                wtimes: vec![0, 1000, 2000],
                wdurations: vec![400, 400, 400],
                visemes: vec!["aa".to_string()],
                vtimes: vec![0],
                vdurations: vec![200],
            }),
        )
    }

    #[test]
    fn audio_kicks_once_and_words_advance() {
        let mut exec = VisemeExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();
        let block = speech_block();

        let mut ctx = StageContext {
            head: &mut head,
            effects: &mut fxs,
            outbox: &mut outbox,
        };
        exec.update(10.0, 16.0, &[&block], &mut ctx);
        exec.update(500.0, 16.0, &[&block], &mut ctx);
        exec.update(1500.0, 16.0, &[&block], &mut ctx);
        drop(ctx);

        let audio = head.calls_named(|c| matches!(c, HeadCall::SpeakAudio(_)));
        assert_eq!(audio.len(), 1);

        let words: Vec<(String, usize)> = outbox
            .iter()
            .filter_map(|e| match e {
                EngineEvent::WordChange { word, index } => Some((word.clone(), *index)),
                _ => None,
            })
            .collect();
        assert_eq!(words, vec![("la".to_string(), 0), ("di".to_string(), 1)]);
    }

    #[test]
    fn seek_rekicks_audio() {
        let mut exec = VisemeExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();
        let block = speech_block();

        let mut ctx = StageContext {
            head: &mut head,
            effects: &mut fxs,
            outbox: &mut outbox,
        };
        exec.update(10.0, 16.0, &[&block], &mut ctx);
        exec.seek(2000.0, &mut ctx);
        exec.update(2000.0, 16.0, &[&block], &mut ctx);
        drop(ctx);

        let audio = head.calls_named(|c| matches!(c, HeadCall::SpeakAudio(_)));
        assert_eq!(audio.len(), 2);
    }
}
