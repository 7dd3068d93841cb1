//! File classification shared by the watcher, full sync and the engine.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{LinkError, Result};

pub const VIDEO_FILE_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "rmvb", "wmv", "m2ts", "iso", "ts", "flv", "mpeg", "mpg", "mov",
];

pub const SUBTITLE_FILE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sub", "idx", "sup", "vtt"];

static YEAR_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\d{4}\)").expect("year suffix regex should compile"));

/// True for video and subtitle files, by extension (case-insensitive).
pub fn is_media_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    VIDEO_FILE_EXTENSIONS.contains(&ext.as_str()) || SUBTITLE_FILE_EXTENSIONS.contains(&ext.as_str())
}

/// Glob patterns matched against a file name.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                Pattern::new(raw).map_err(|source| LinkError::Pattern {
                    pattern: raw.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// The first pattern matching the file name of `path`, if any.
    pub fn matching(&self, path: &Path) -> Option<&str> {
        let name = path.file_name()?.to_str()?;
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        self.patterns
            .iter()
            .find(|p| p.matches_with(name, options))
            .map(Pattern::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Path of `path` relative to `root`, rejecting anything that escapes it.
pub fn relative_within(root: &Path, path: &Path) -> Option<PathBuf> {
    let rel = path.strip_prefix(root).ok()?;
    let mut clean = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(seg) => clean.push(seg),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return None;
                }
            }
            _ => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

/// Human-readable show or movie name for a media path.
///
/// Prefers the nearest ancestor whose name carries a `(YYYY)` tag, otherwise
/// the third-from-last component, otherwise the file stem.
pub fn display_name(path: &Path) -> String {
    let from_year = path
        .ancestors()
        .skip(1)
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .find(|name| YEAR_SUFFIX.is_match(name));
    if let Some(name) = from_year {
        return name.to_string();
    }

    let parts: Vec<_> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(seg) => Some(seg.to_string_lossy()),
            _ => None,
        })
        .collect();
    if parts.len() >= 3 {
        return parts[parts.len() - 3].to_string();
    }

    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Stable string key for a source path.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_files_are_detected_case_insensitively() {
        assert!(is_media_file(Path::new("/a/b/Movie.MKV")));
        assert!(is_media_file(Path::new("/a/b/Movie.zh.ass")));
        assert!(!is_media_file(Path::new("/a/b/poster.jpg")));
        assert!(!is_media_file(Path::new("/a/b/README")));
    }

    #[test]
    fn exclude_patterns_match_file_name_only() {
        let set = ExcludeSet::new(&["*.part", "sample*"]).unwrap();
        assert_eq!(set.matching(Path::new("/src/show/ep1.mkv.part")), Some("*.part"));
        assert_eq!(set.matching(Path::new("/src/sample/ep1.mkv")), None);
        assert_eq!(set.matching(Path::new("/src/show/sample-ep1.mkv")), Some("sample*"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = ExcludeSet::new(&["[abc"]).unwrap_err();
        assert!(matches!(err, LinkError::Pattern { .. }));
    }

    #[test]
    fn relative_paths_cannot_escape_root() {
        let root = Path::new("/src");
        assert_eq!(
            relative_within(root, Path::new("/src/TV/Show/ep.mkv")),
            Some(PathBuf::from("TV/Show/ep.mkv"))
        );
        assert_eq!(relative_within(root, Path::new("/other/ep.mkv")), None);
        assert_eq!(relative_within(root, Path::new("/src/../etc/passwd")), None);
        assert_eq!(relative_within(root, Path::new("/src")), None);
    }

    #[test]
    fn display_name_prefers_year_tagged_ancestor() {
        assert_eq!(
            display_name(Path::new("/src/TV/Show (2020)/Season 1/ep.mkv")),
            "Show (2020)"
        );
        assert_eq!(display_name(Path::new("/src/TV/Show/Season 1/ep.mkv")), "Show");
        assert_eq!(display_name(Path::new("ep.mkv")), "ep");
    }
}
