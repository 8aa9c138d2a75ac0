use crate::config::Config;

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Sanitize a video title for use in a file name
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
            _ => '_',
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Report configured external tools that cannot be run
pub async fn check_dependencies(config: &Config) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(&config.fetcher.yt_dlp_path, "--version").await {
        missing.push(format!(
            "{} - required to download source media",
            config.fetcher.yt_dlp_path
        ));
    }

    if !check_command_available(&config.transcoder.ffmpeg_path, "-version").await {
        missing.push(format!(
            "{} - required to cut and encode audio",
            config.transcoder.ffmpeg_path
        ));
    }

    missing
}

async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World!"), "Hello World_");
        assert_eq!(sanitize_filename("AC/DC: Live?"), "AC_DC_ Live_");
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
    }

    #[tokio::test]
    async fn test_missing_tools_are_reported() {
        let mut config = Config::default();
        config.fetcher.yt_dlp_path = "/nonexistent/yt-dlp".to_string();
        config.transcoder.ffmpeg_path = "/nonexistent/ffmpeg".to_string();

        let missing = check_dependencies(&config).await;
        assert_eq!(missing.len(), 2);
        assert!(missing[0].starts_with("/nonexistent/yt-dlp"));
    }
}
