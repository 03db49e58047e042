use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::app::StudioConfig;
use crate::audio::OutputFormat;

#[derive(Parser, Debug, Clone)]
#[command(name = "memomuse")]
#[command(about = "Turn a rough voice memo into a finished song")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    // Storage
    /// Directory for scratch and rendered files
    #[arg(long, global = true, env = "MEMOMUSE_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Rendered song format
    #[arg(long, global = true, value_enum, default_value = "mp3")]
    pub format: OutputFormat,

    // Generation
    /// Length of the generated instrumental (seconds)
    #[arg(
        long,
        global = true,
        default_value = "30",
        value_parser = clap::value_parser!(u32).range(30..=60)
    )]
    pub instrumental_seconds: u32,

    /// Whisper executable
    #[arg(long, global = true, env = "WHISPER_BIN", default_value = "whisper")]
    pub whisper_bin: String,

    /// Whisper model name
    #[arg(long, global = true, env = "WHISPER_MODEL", default_value = "base")]
    pub whisper_model: String,

    // Credentials
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, global = true, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    pub elevenlabs_api_key: Option<String>,

    #[arg(long, global = true, env = "FEATHERLESS_API_KEY", hide_env_values = true)]
    pub featherless_api_key: Option<String>,

    #[arg(long, global = true, env = "BACKBOARD_API_KEY", hide_env_values = true)]
    pub backboard_api_key: Option<String>,

    // Debug
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Produce one song from a recording
    Generate(GenerateArgs),

    /// Run the HTTP API
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(long, default_value = "8000")]
        port: u16,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct GenerateArgs {
    /// Voice memo to turn into a song
    pub input: PathBuf,

    /// Target genre
    #[arg(long, default_value = "pop")]
    pub genre: String,

    /// Copy the rendered song here
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    // Voice
    /// Synthesis voice
    #[arg(long)]
    pub voice_id: Option<String>,

    /// Voice stability (0..1)
    #[arg(long)]
    pub stability: Option<f32>,

    /// Voice similarity boost (0..1)
    #[arg(long)]
    pub similarity: Option<f32>,

    /// Voice style exaggeration (0..1)
    #[arg(long)]
    pub style: Option<f32>,

    // Mix
    /// Low band EQ (-10..10)
    #[arg(long, allow_hyphen_values = true)]
    pub bass: Option<f32>,

    /// High band EQ (-10..10)
    #[arg(long, allow_hyphen_values = true)]
    pub treble: Option<f32>,

    /// Pitch shift in semitones (-12..12)
    #[arg(long, allow_hyphen_values = true)]
    pub pitch: Option<f32>,

    /// dB moved from the instrumental to the vocal (-12..12)
    #[arg(long, allow_hyphen_values = true)]
    pub vocal_balance: Option<f32>,
}

impl GenerateArgs {
    /// Studio flags as the config the pipeline expects
    pub fn studio(&self) -> StudioConfig {
        StudioConfig {
            voice_id: self.voice_id.clone(),
            stability: self.stability,
            similarity: self.similarity,
            style: self.style,
            bass: self.bass,
            treble: self.treble,
            pitch: self.pitch,
            vocal_balance: self.vocal_balance,
        }
    }
}

impl Args {
    /// Work directory, defaulting to the user cache
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("memomuse")
        })
    }
}
