// SERENADE Lyric Ingestion - timed words into sections and lip-sync cues
// Copyright (c) 2026 SERENADE Project
//
// Upstream tooling supplies per-word timings for the song. Here they become
// the two things the kernel needs: section windows for the directors and a
// viseme track for the lip-sync layer.

use crate::director::plan::Section;
use crate::timeline::VisemeData;
use serde::{Deserialize, Serialize};

/// One sung word with its absolute position in the song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start_ms: u64,
    pub duration_ms: u64,
}

impl WordTiming {
    pub fn end_ms(&self) -> u64 {
        self.start_ms + self.duration_ms
    }
}

/// Default silence that splits two lyrical sections.
pub const SECTION_GAP_MS: u64 = 1_500;

/// Partition the song into sections at silences of `gap_ms` or longer.
///
/// Sections tile the whole `[0, duration_ms)` range: the first starts at 0,
/// each subsequent one starts where the silence breaks, and the last ends at
/// the song end. Text is the words joined in order.
pub fn sections_from_words(
    words: &[WordTiming],
    duration_ms: u64,
    gap_ms: u64,
) -> Vec<Section> {
    if words.is_empty() || duration_ms == 0 {
        return Vec::new();
    }

    let mut groups: Vec<Vec<&WordTiming>> = vec![Vec::new()];
    let mut prev_end = 0;
    for word in words {
        if !groups.last().unwrap().is_empty() && word.start_ms.saturating_sub(prev_end) >= gap_ms
        {
            groups.push(Vec::new());
        }
        groups.last_mut().unwrap().push(word);
        prev_end = word.end_ms();
    }

    let starts: Vec<u64> = groups
        .iter()
        .enumerate()
        .map(|(i, g)| if i == 0 { 0 } else { g[0].start_ms })
        .collect();

    groups
        .iter()
        .enumerate()
        .map(|(i, group)| {
            let start_ms = starts[i];
            let end_ms = if i + 1 < starts.len() {
                starts[i + 1]
            } else {
                duration_ms
            };
            let text = group
                .iter()
                .map(|w| w.word.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            Section {
                start_ms,
                end_ms: end_ms.min(duration_ms),
                text,
            }
        })
        .filter(|s| s.end_ms > s.start_ms)
        .collect()
}

/// Oculus-style viseme key for one letter. Coarse, but the rig smooths the
/// mouth anyway.
fn viseme_for_char(c: char) -> Option<&'static str> {
    match c.to_ascii_lowercase() {
        'a' => Some("aa"),
        'e' => Some("E"),
        'i' | 'y' => Some("I"),
        'o' => Some("O"),
        'u' | 'w' => Some("U"),
        'b' | 'p' | 'm' => Some("PP"),
        'f' | 'v' => Some("FF"),
        'd' | 't' => Some("DD"),
        'k' | 'g' | 'c' | 'q' => Some("kk"),
        'j' => Some("CH"),
        's' | 'z' | 'x' => Some("SS"),
        'n' | 'l' => Some("nn"),
        'r' => Some("RR"),
        'h' => Some("TH"),
        _ => None,
    }
}

/// Build the full lip-sync payload: parallel word and viseme tracks, viseme
/// timings spread evenly across each word's duration.
pub fn viseme_track(words: &[WordTiming], audio_url: &str) -> VisemeData {
    let mut data = VisemeData {
        audio_url: Some(audio_url.to_string()),
        ..Default::default()
    };

    for word in words {
        data.words.push(word.word.clone());
        data.wtimes.push(word.start_ms);
        data.wdurations.push(word.duration_ms);

        let keys: Vec<&str> = word.word.chars().filter_map(viseme_for_char).collect();
        if keys.is_empty() {
            continue;
        }
        let slot = (word.duration_ms / keys.len() as u64).max(1);
        for (i, key) in keys.iter().enumerate() {
            data.visemes.push(key.to_string());
            data.vtimes.push(word.start_ms + slot * i as u64);
            data.vdurations.push(slot);
        }
    }

    data
}
