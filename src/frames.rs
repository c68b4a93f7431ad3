//! Frame discovery from a printf-style file pattern.

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Substitutes `index` into `pattern`.
///
/// Supports `%d`, `%Nd` (space padded), `%0Nd` (zero padded) and `%%`.
/// Any other conversion is an input error.
pub fn format_pattern(pattern: &str, index: u64) -> Result<String> {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let zero = chars.next_if_eq(&'0').is_some();
        let mut width = 0usize;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width * 10 + d as usize;
            chars.next();
        }
        match chars.next() {
            Some('d') if zero => out.push_str(&format!("{index:0width$}")),
            Some('d') => out.push_str(&format!("{index:width$}")),
            other => {
                return Err(Error::input(format!(
                    "unsupported conversion in input pattern \"{pattern}\" (found {:?})",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Lists the frame files of a run.
///
/// Starting at `first`, each existing file is appended; the scan stops
/// after `last` when `last >= 0`. With `last < 0`, the first missing
/// index after `first` ends the sequence. Any other missing file is an
/// input error.
pub fn discover_frames(pattern: &str, first: i64, last: i64) -> Result<Vec<PathBuf>> {
    if first < 0 {
        return Err(Error::input(format!(
            "frame_first must be at least 0, got {first}"
        )));
    }
    if last >= 0 && last < first {
        return Err(Error::input(format!(
            "frame_last ({last}) must not precede frame_first ({first})"
        )));
    }

    let mut frames = Vec::new();
    for i in first.. {
        let path = PathBuf::from(format_pattern(pattern, i as u64)?);
        if path.is_file() {
            frames.push(path);
            if i == last {
                break;
            }
        } else if last < 0 && i != first {
            break;
        } else {
            return Err(Error::input(format!(
                "input file not found \"{}\"",
                path.display()
            )));
        }
    }
    tracing::debug!(count = frames.len(), pattern, "frames discovered");
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch_frames(dir: &std::path::Path, indices: &[u64]) -> String {
        for i in indices {
            fs::write(dir.join(format!("frame{i:03}.png")), b"").unwrap();
        }
        dir.join("frame%03d.png").to_string_lossy().into_owned()
    }

    #[test]
    fn test_format_pattern() {
        assert_eq!(format_pattern("f%d.png", 7).unwrap(), "f7.png");
        assert_eq!(format_pattern("f%03d.png", 7).unwrap(), "f007.png");
        assert_eq!(format_pattern("f%3d.png", 7).unwrap(), "f  7.png");
        assert_eq!(format_pattern("100%%_%d", 2).unwrap(), "100%_2");
        assert_eq!(format_pattern("plain.png", 3).unwrap(), "plain.png");
        assert!(format_pattern("f%s.png", 1).is_err());
        assert!(format_pattern("f%", 1).is_err());
    }

    #[test]
    fn test_open_ended_stops_at_gap() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = touch_frames(dir.path(), &[0, 1, 2, 4]);
        let frames = discover_frames(&pattern, 0, -1).unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames[2].ends_with("frame002.png"));
    }

    #[test]
    fn test_bounded_range() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = touch_frames(dir.path(), &[0, 1, 2, 3]);
        let frames = discover_frames(&pattern, 1, 2).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].ends_with("frame001.png"));
    }

    #[test]
    fn test_bounded_range_with_gap_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = touch_frames(dir.path(), &[0, 1, 3]);
        assert!(matches!(
            discover_frames(&pattern, 0, 3),
            Err(Error::Input(_))
        ));
    }

    #[test]
    fn test_missing_first_frame_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = touch_frames(dir.path(), &[1, 2]);
        assert!(discover_frames(&pattern, 0, -1).is_err());
    }

    #[test]
    fn test_invalid_interval() {
        assert!(discover_frames("f%d", -1, -1).is_err());
        assert!(discover_frames("f%d", 5, 2).is_err());
    }
}
