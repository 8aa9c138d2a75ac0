use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "clipforge",
    about = "Clipforge - Cut audio segments out of YouTube videos",
    version,
    long_about = "Downloads a YouTube video with yt-dlp, cuts the requested time range with ffmpeg and saves it as MP3 or WAV, along with a screenshot and the video thumbnail when available."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// How finished jobs are reported
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub report: ReportFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract one audio segment
    Extract {
        /// YouTube video URL (youtube.com/watch, youtu.be, shorts, embed, live)
        #[arg(value_name = "URL")]
        url: String,

        /// Segment start: seconds, M:SS or H:MM:SS
        #[arg(value_name = "START")]
        start: String,

        /// Segment end: seconds, M:SS or H:MM:SS
        #[arg(value_name = "END")]
        end: String,

        /// Output audio format (mp3 or wav)
        #[arg(short, long, default_value = "mp3")]
        format: String,

        /// Directory for finished files (overrides the configured output_dir)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Run every request listed in a YAML file
    Batch {
        /// YAML list of {source_url, start_time, end_time, output_format}
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Directory for finished files (overrides the configured output_dir)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Show or initialize the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write a configuration file with default values
        #[arg(long)]
        init: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    /// Human-readable summary
    Text,
    /// Job status record as JSON
    Json,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Text => write!(f, "text"),
            ReportFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_args() {
        let cli = Cli::try_parse_from([
            "clipforge",
            "extract",
            "https://youtu.be/dQw4w9WgXcQ",
            "0:05",
            "8",
            "--format",
            "wav",
            "--report",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.report, ReportFormat::Json);
        match cli.command {
            Commands::Extract { url, start, end, format, output } => {
                assert_eq!(url, "https://youtu.be/dQw4w9WgXcQ");
                assert_eq!(start, "0:05");
                assert_eq!(end, "8");
                assert_eq!(format, "wav");
                assert!(output.is_none());
            }
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["clipforge", "config", "--show"]).unwrap();
        assert_eq!(cli.report, ReportFormat::Text);
        assert!(!cli.verbose && !cli.json_logs);
        assert!(matches!(
            cli.command,
            Commands::Config {
                show: true,
                init: false
            }
        ));
    }

    #[test]
    fn test_extract_requires_range() {
        assert!(Cli::try_parse_from(["clipforge", "extract", "https://youtu.be/x"]).is_err());
    }
}
