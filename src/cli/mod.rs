use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "polydub",
    about = "Polydub - Dub videos into other languages using the ElevenLabs Dubbing API",
    version,
    long_about = "A CLI tool for dubbing video files into other languages. Submits videos to the ElevenLabs dubbing service, waits for the job to finish, and merges the dubbed audio back onto the original video. Can also fetch YouTube transcripts via yt-dlp."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    /// Default tracing filter when RUST_LOG is not set
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            "polydub=warn"
        } else if self.verbose {
            "polydub=debug"
        } else {
            "polydub=info"
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dub a video file, or every video in a directory, into a target language
    Dub {
        /// Video file or directory of clips to dub
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Target language code (e.g. hi, ta, en)
        #[arg(short, long, value_name = "LANG")]
        language: Option<String>,

        /// Directory for the dubbed output videos
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// ElevenLabs API key
        #[arg(long, env = "ELEVENLABS_API_KEY", value_name = "KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Disable the provider watermark (requires a paid plan)
        #[arg(long)]
        no_watermark: bool,

        /// Maximum clips dubbed concurrently in directory mode
        #[arg(long, value_name = "COUNT")]
        max_concurrent: Option<usize>,
    },

    /// Fetch the transcript of a YouTube video as plain text
    Transcript {
        /// YouTube video URL
        #[arg(value_name = "URL")]
        url: String,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Configure API credentials and settings
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List common dubbing language codes
    Languages,
}
