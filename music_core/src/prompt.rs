//! Generation prompts for instrument demos.

use std::collections::HashMap;

use crate::normalize::normalize;

/// Identity -> timbre clause. Keys are in normalized form; lookups go
/// through [`lookup_key`] on both sides.
const DESCRIPTORS: &[(&str, &str)] = &[
    ("sao truc", "Vietnamese bamboo transverse flute Sáo Trúc, airy, soft timbre, capable of bending notes"),
    ("sao tieu", "Vietnamese vertical bamboo flute Sáo Tiêu, mellow meditative low tone"),
    ("ken bau", "Vietnamese conical oboe Kèn Bầu, reedy, buzzing and powerful sound"),
    ("dan tranh", "Vietnamese 16-string zither Đàn Tranh, bright, metallic cascading tones with glissando"),
    ("dan bau", "Vietnamese monochord Đàn Bầu, expressive bending pitch, soulful vocal-like timbre"),
    ("dan nguyet", "Vietnamese moon lute Đàn Nguyệt, clear metallic tone, traditional opera instrument"),
    ("dan tinh", "Vietnamese lute Đàn Tính, gentle storytelling tone used in spiritual folk songs"),
    ("dan ty ba", "Vietnamese pear-shaped lute Đàn Tỳ Bà, delicate articulate plucking tone"),
    ("dan nhi", "Vietnamese two-string fiddle Đàn Nhị, nasal, emotional, expressive"),
    ("dan gao", "Vietnamese coconut-shell fiddle Đàn Gáo, rustic, folk tone"),
    ("dan co", "Vietnamese spike fiddle Đàn Cò, high-pitched crying timbre"),
    ("trong com", "Vietnamese barrel drum Trống Cơm, resonant deep bass sound"),
    ("phach", "Vietnamese wooden clappers Phách, dry sharp percussive click"),
    ("song lang", "Vietnamese bamboo clapper Song Lang, sharp timing click"),
    ("chieng", "Vietnamese gong Chiêng, metallic reverberant tone"),
    ("t'rung", "Vietnamese bamboo xylophone T’rưng, bright cascading mountain echo tones"),
    ("k'longput", "Vietnamese bamboo percussion K’longput, resonant airy tones from clapped air"),
    ("dan k'ni", "Vietnamese mouth fiddle Đàn K’ni, haunting vocal-like resonance"),
];

/// Builds the text prompt handed to the music model.
///
/// The descriptor table is built once and never changes; lookups that miss
/// fall back to a generic description quoting the caller's original text.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    descriptors: HashMap<String, &'static str>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            descriptors: DESCRIPTORS
                .iter()
                .map(|&(name, desc)| (lookup_key(name), desc))
                .collect(),
        }
    }

    /// Number of instruments with a dedicated description.
    pub fn known_instruments(&self) -> usize {
        self.descriptors.len()
    }

    /// Timbre clause for `instrument`. Never fails.
    pub fn descriptor(&self, instrument: &str) -> String {
        match self.descriptors.get(lookup_key(instrument).as_str()) {
            Some(desc) => (*desc).to_string(),
            None => format!("Vietnamese folk instrument {instrument}"),
        }
    }

    pub fn build(&self, instrument: &str, style: &str) -> String {
        let desc = self.descriptor(instrument);
        format!(
            "A high-quality {style} solo performance played only with the {desc}. \
             Expressive and natural playing, clean audio recording, \
             authentic Vietnamese sound. \
             No accompaniment, no background, no drums, no percussion, \
             no other instruments."
        )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// Separators carry no identity here: `dan_tranh`, `dan tranh`, `t_rung`,
// `t'rưng` and `t’rưng` all compact to the same key.
fn lookup_key(instrument: &str) -> String {
    normalize(instrument)
        .chars()
        .filter(|c| !matches!(c, '_' | '\'' | '’' | '‘') && !c.is_whitespace())
        .collect()
}
