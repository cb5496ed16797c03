pub mod fs;
pub mod logger;

/// Longest file stem `sanitize_filename` produces, in characters
pub const MAX_FILENAME_CHARS: usize = 150;

/// Utility functions for the application
pub struct Utils;

impl Utils {
    /// Reduce an arbitrary track/artist string to a name that is safe on every
    /// filesystem we write to.
    ///
    /// Keeps letters, digits, spaces and `-` `.` `(` `)`, trims the result and caps it
    /// at [`MAX_FILENAME_CHARS`]. Applying it twice yields the same string.
    pub fn sanitize_filename(name: &str) -> String {
        let kept: String = name
            .chars()
            .filter(|c| Self::is_allowed_filename_char(*c))
            .collect();

        kept.trim()
            .chars()
            .take(MAX_FILENAME_CHARS)
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    pub fn is_allowed_filename_char(c: char) -> bool {
        c.is_alphanumeric() || matches!(c, ' ' | '-' | '.' | '(' | ')')
    }

    /// Format file size in human readable format
    pub fn format_file_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.1} {}", size, UNITS[unit_index])
        }
    }

    /// Format duration in milliseconds as `m:ss` or `h:mm:ss`
    pub fn format_duration_ms(milliseconds: u32) -> String {
        let seconds = milliseconds / 1000;
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        let secs = seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{}:{:02}", minutes, secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_disallowed_characters() {
        assert_eq!(
            Utils::sanitize_filename("AC/DC - Back In Black: Live?"),
            "ACDC - Back In Black Live"
        );
        assert_eq!(Utils::sanitize_filename("  Sigur Rós - Hoppípolla  "), "Sigur Rós - Hoppípolla");
        assert_eq!(Utils::sanitize_filename("a_b;c\t(d).mp3"), "abc(d).mp3");
        assert_eq!(Utils::sanitize_filename("???"), "");
    }

    #[test]
    fn sanitize_is_idempotent_and_bounded() {
        let inputs = [
            String::new(),
            "   leading and trailing   ".to_string(),
            "x".repeat(400),
            format!("{} tail", "y".repeat(149)),
            "*/\\|<>\"".to_string(),
            "Beyoncé - Déjà Vu (feat. Jay-Z)".to_string(),
        ];

        for input in &inputs {
            let once = Utils::sanitize_filename(input);
            assert_eq!(Utils::sanitize_filename(&once), once, "input: {input:?}");
            assert!(once.chars().count() <= MAX_FILENAME_CHARS);
            assert!(once.chars().all(Utils::is_allowed_filename_char));
            assert_eq!(once.trim(), once);
        }
    }

    #[test]
    fn truncation_does_not_leave_trailing_space() {
        let input = format!("{} b", "a".repeat(149));
        let once = Utils::sanitize_filename(&input);
        assert_eq!(once, "a".repeat(149));
    }

    #[test]
    fn formats_sizes_and_durations() {
        assert_eq!(Utils::format_file_size(512), "512 B");
        assert_eq!(Utils::format_file_size(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(Utils::format_duration_ms(215_000), "3:35");
        assert_eq!(Utils::format_duration_ms(3_725_000), "1:02:05");
    }
}
