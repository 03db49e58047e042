use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Tempo used when the analysis gives none or an unusable one
pub const DEFAULT_BPM: u32 = 120;

/// Voice used when the studio config does not pick one
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

/// User-supplied studio tuning; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioConfig {
    /// Override the synthesis voice
    pub voice_id: Option<String>,
    pub stability: Option<f32>,
    pub similarity: Option<f32>,
    pub style: Option<f32>,
    /// Low band EQ, roughly -10..10
    pub bass: Option<f32>,
    /// High band EQ, roughly -10..10
    pub treble: Option<f32>,
    /// Semitones, roughly -12..12
    pub pitch: Option<f32>,
    /// dB moved from the instrumental to the vocal
    pub vocal_balance: Option<f32>,
}

impl StudioConfig {
    /// Fill defaults and clamp everything into range
    pub fn resolve(&self) -> StudioSettings {
        let unit = |v: Option<f32>, default: f32| v.unwrap_or(default).clamp(0.0, 1.0);
        let ranged = |v: Option<f32>, limit: f32| v.unwrap_or(0.0).clamp(-limit, limit);

        StudioSettings {
            voice: VoiceSettings {
                voice_id: self
                    .voice_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string),
                stability: unit(self.stability, 0.3),
                similarity: unit(self.similarity, 0.75),
                style: unit(self.style, 0.45),
            },
            bass: ranged(self.bass, 10.0),
            treble: ranged(self.treble, 10.0),
            pitch: ranged(self.pitch, 12.0),
            vocal_balance: ranged(self.vocal_balance, 12.0),
        }
    }
}

/// Voice model parameters handed to the vocal generator
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub voice_id: Option<String>,
    pub stability: f32,
    pub similarity: f32,
    pub style: f32,
}

impl VoiceSettings {
    pub fn voice_id(&self) -> &str {
        self.voice_id.as_deref().unwrap_or(DEFAULT_VOICE_ID)
    }
}

/// Studio config with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct StudioSettings {
    pub voice: VoiceSettings,
    pub bass: f32,
    pub treble: f32,
    pub pitch: f32,
    pub vocal_balance: f32,
}

/// What the language model made of the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// False when the memo was wordless humming or scatting
    #[serde(default = "default_true")]
    pub contains_lyrics: bool,
    #[serde(default = "default_title", alias = "title")]
    pub song_title: String,
    #[serde(default)]
    pub cleaned_lyrics: String,
    pub style_prompt: String,
    #[serde(default)]
    pub detected_genre: String,
    #[serde(default = "default_mood")]
    pub mood: String,
    #[serde(default = "default_bpm", deserialize_with = "deserialize_bpm")]
    pub bpm: u32,
    #[serde(default)]
    pub key: String,
}

fn default_true() -> bool {
    true
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn default_mood() -> String {
    "neutral".to_string()
}

fn default_bpm() -> u32 {
    DEFAULT_BPM
}

/// Extract the digits of a textual tempo ("120 BPM" -> 120).
///
/// Falls back to the default when nothing usable remains.
pub fn normalize_bpm(text: &str) -> u32 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u32>() {
        Ok(bpm) if bpm > 0 => bpm,
        _ => DEFAULT_BPM,
    }
}

fn deserialize_bpm<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f.round() as u64))
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_BPM),
        serde_json::Value::String(s) => normalize_bpm(&s),
        _ => DEFAULT_BPM,
    })
}

/// One finished song
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub output_path: PathBuf,
    pub title: String,
    pub lyrics: String,
    pub mood: String,
    pub bpm: u32,
    pub genre: String,
    pub key: String,
    pub duration_secs: f32,
    /// Vocal generation failed and the song is instrumental only
    pub vocals_omitted: bool,
    /// The refinement service replaced the analysed lyrics
    pub lyrics_refined: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bpm_from_text() {
        assert_eq!(normalize_bpm("120 BPM"), 120);
        assert_eq!(normalize_bpm("~95bpm"), 95);
        assert_eq!(normalize_bpm("fast"), DEFAULT_BPM);
        assert_eq!(normalize_bpm(""), DEFAULT_BPM);
        assert_eq!(normalize_bpm("99999999999999"), DEFAULT_BPM);
    }

    #[test]
    fn test_analysis_accepts_string_bpm() {
        let json = r#"{"style_prompt": "lofi", "bpm": "90 BPM"}"#;
        let analysis: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.bpm, 90);
    }

    #[test]
    fn test_analysis_defaults() {
        let json = r#"{"contains_lyrics": true, "cleaned_lyrics": "lyrics", "style_prompt": "style"}"#;
        let analysis: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.mood, "neutral");
        assert_eq!(analysis.bpm, DEFAULT_BPM);
        assert_eq!(analysis.song_title, "Untitled");
        assert!(analysis.detected_genre.is_empty());
    }

    #[test]
    fn test_analysis_bpm_odd_values() {
        let null: AnalysisResult =
            serde_json::from_str(r#"{"style_prompt": "x", "bpm": null}"#).unwrap();
        assert_eq!(null.bpm, DEFAULT_BPM);

        let float: AnalysisResult =
            serde_json::from_str(r#"{"style_prompt": "x", "bpm": 97.6}"#).unwrap();
        assert_eq!(float.bpm, 98);

        let negative: AnalysisResult =
            serde_json::from_str(r#"{"style_prompt": "x", "bpm": -5}"#).unwrap();
        assert_eq!(negative.bpm, DEFAULT_BPM);
    }

    #[test]
    fn test_missing_style_prompt_is_rejected() {
        let result = serde_json::from_str::<AnalysisResult>(r#"{"cleaned_lyrics": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_studio_defaults() {
        let settings = StudioConfig::default().resolve();
        assert_eq!(settings.voice.stability, 0.3);
        assert_eq!(settings.voice.similarity, 0.75);
        assert_eq!(settings.voice.style, 0.45);
        assert_eq!(settings.voice.voice_id(), DEFAULT_VOICE_ID);
        assert_eq!(settings.bass, 0.0);
        assert_eq!(settings.treble, 0.0);
        assert_eq!(settings.pitch, 0.0);
        assert_eq!(settings.vocal_balance, 0.0);
    }

    #[test]
    fn test_studio_clamps_and_parses_camel_case() {
        let json = r#"{"voiceId": "abc", "stability": 1.7, "bass": -40, "pitch": 3, "vocalBalance": 2}"#;
        let config: StudioConfig = serde_json::from_str(json).unwrap();
        let settings = config.resolve();

        assert_eq!(settings.voice.voice_id(), "abc");
        assert_eq!(settings.voice.stability, 1.0);
        assert_eq!(settings.bass, -10.0);
        assert_eq!(settings.pitch, 3.0);
        assert_eq!(settings.vocal_balance, 2.0);
    }

    #[test]
    fn test_blank_voice_id_falls_back() {
        let config = StudioConfig {
            voice_id: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(config.resolve().voice.voice_id(), DEFAULT_VOICE_ID);
    }
}
