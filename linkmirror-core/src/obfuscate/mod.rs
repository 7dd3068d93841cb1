//! Deterministic name obfuscation for target trees.
//!
//! Every transformation here is a pure function of its input and the fixed
//! lookup tables, so a restarted process resolves the same target paths.

pub mod digest;
pub mod tables;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::{FileNaming, ObfuscationSettings};
use digest::{bits, digest_int};

const FILLERS: [char; 2] = ['_', '-'];

/// Sub-directory names that are never obfuscated (compared case-insensitively).
pub const EXEMPT_DIRECTORIES: &[&str] = &[
    "extras",
    "bonus",
    "specials",
    "featurettes",
    "behind the scenes",
    "deleted scenes",
];

static YEAR_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\((\d{4})\)$").expect("year tail regex should compile"));
static SEASON_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^season\s+\d+$").expect("season regex should compile"));
static EPISODE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[Ss](\d+)[Ee](\d+)").expect("episode tag regex should compile"));
static QUALITY_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{3,4}[pP]|[248][kK]|[hH][dD]|[uU][hH][dD])")
        .expect("quality tag regex should compile")
});

/// Which scheme produced an obfuscated segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Legacy,
    CharSplit,
    Literal,
}

/// Result of obfuscating one path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObfuscationDecision {
    pub original: String,
    pub obfuscated: String,
    pub algorithm: Algorithm,
}

impl fmt::Display for ObfuscationDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({:?})",
            self.original, self.obfuscated, self.algorithm
        )
    }
}

pub fn is_cjk(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&ch)
}

/// Splits a trailing `(YYYY)` tag off `name`.
///
/// Returns the name without the tag (and the whitespace before it) plus the
/// normalised `" (YYYY)"` suffix, or an empty suffix when there is no tag.
pub fn split_year(name: &str) -> (&str, String) {
    match YEAR_TAIL.captures(name) {
        Some(caps) => {
            let start = caps.get(0).map_or(name.len(), |m| m.start());
            (&name[..start], format!(" ({})", &caps[1]))
        }
        None => (name, String::new()),
    }
}

/// `Season N` and the common extras directories.
pub fn is_sub_directory(segment: &str) -> bool {
    let segment = segment.trim();
    SEASON_DIR.is_match(segment)
        || EXEMPT_DIRECTORIES
            .iter()
            .any(|exempt| segment.eq_ignore_ascii_case(exempt))
}

/// True for path components that keep their original name.
pub fn is_literal_segment(index: usize, segment: &str) -> bool {
    index == 0 || is_sub_directory(segment)
}

#[derive(Debug, Clone, Default)]
pub struct NameObfuscator {
    max_length: usize,
    overrides: BTreeMap<String, String>,
}

impl NameObfuscator {
    pub fn new(settings: ObfuscationSettings) -> Self {
        Self {
            max_length: settings.max_length,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Mixed keep-or-romanise scheme driven by the MD5 of the year-stripped name.
    pub fn legacy(&self, name: &str) -> String {
        let (base, year) = split_year(name);
        let hash = digest_int(base);
        let mut out = String::with_capacity(base.len() * 2 + year.len());
        for (i, ch) in base.chars().enumerate() {
            if !is_cjk(ch) {
                out.push(ch);
                continue;
            }
            match tables::pinyin(ch) {
                Some(romanised) if bits(hash, i * 3) % 2 == 1 => out.push_str(romanised),
                _ => out.push(ch),
            }
            if bits(hash, i * 5) % 10 < 3 {
                out.push(FILLERS[(bits(hash, i * 7) % 2) as usize]);
            }
        }
        out.push_str(&year);
        out
    }

    /// Replaces each ideograph with its component glyphs until the output budget runs out.
    pub fn char_split(&self, name: &str) -> String {
        let (base, year) = split_year(name);
        let mut out = String::with_capacity(base.len() * 3 + year.len());
        let mut emitted = 0usize;
        for (i, ch) in base.chars().enumerate() {
            if !is_cjk(ch) || emitted > self.max_length {
                out.push(ch);
                emitted += 1;
                continue;
            }
            match tables::split_components(ch) {
                Some(parts) => {
                    out.push_str(parts);
                    emitted += parts.chars().count();
                }
                None => {
                    let single = single_char(ch, i);
                    emitted += single.chars().count();
                    out.push_str(&single);
                }
            }
        }
        out.push_str(&year);
        out
    }

    /// Legacy scheme first; char-split when legacy leaves the name unchanged.
    pub fn obfuscate(&self, name: &str) -> ObfuscationDecision {
        let legacy = self.legacy(name);
        if legacy != name {
            return decision(name, legacy, Algorithm::Legacy);
        }
        let split = self.char_split(name);
        if split != name {
            return decision(name, split, Algorithm::CharSplit);
        }
        decision(name, name.to_string(), Algorithm::Literal)
    }

    /// [`Self::obfuscate`] prefixed with the phonetic initial of the original name.
    pub fn obfuscate_with_initial(&self, name: &str) -> ObfuscationDecision {
        let (base, year) = split_year(name);
        let inner = self.obfuscate(base);
        let obfuscated = match phonetic_initial(base) {
            Some(initial) => format!("{initial} {}{year}", inner.obfuscated),
            None => format!("{}{year}", inner.obfuscated),
        };
        decision(name, obfuscated, inner.algorithm)
    }

    /// Current naming for a relative directory path: configured overrides
    /// first, then the initial-prefixed scheme.
    pub fn obfuscate_directory<S: AsRef<str>>(&self, parts: &[S]) -> Vec<String> {
        self.map_segments(parts, |segment| {
            self.overrides
                .get(segment)
                .cloned()
                .unwrap_or_else(|| self.obfuscate_with_initial(segment).obfuscated)
        })
    }

    /// Naming produced by earlier releases, used to find trees that already exist.
    pub fn legacy_directory<S: AsRef<str>>(&self, parts: &[S]) -> Vec<String> {
        self.map_segments(parts, |segment| self.legacy(segment))
    }

    /// Target file name for a source file name.
    pub fn rename_file(&self, file_name: &str, naming: FileNaming) -> String {
        let path = Path::new(file_name);
        let (Some(stem), ext) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|e| e.to_str()),
        ) else {
            return file_name.to_string();
        };

        let new_stem = match naming {
            FileNaming::Obfuscated => self.obfuscate(stem).obfuscated,
            FileNaming::EpisodeTag => episode_tag(stem),
        };
        match ext {
            Some(ext) => format!("{new_stem}.{ext}"),
            None => new_stem,
        }
    }

    fn map_segments<S, F>(&self, parts: &[S], transform: F) -> Vec<String>
    where
        S: AsRef<str>,
        F: Fn(&str) -> String,
    {
        parts
            .iter()
            .enumerate()
            .map(|(i, part)| {
                let part = part.as_ref();
                if is_literal_segment(i, part) {
                    part.to_string()
                } else {
                    transform(part)
                }
            })
            .collect()
    }
}

/// Uppercase initial of the first ideograph in `name`.
///
/// Ideographs missing from the romanisation table get a letter derived from
/// their digest. Names without ideographs have no initial.
pub fn phonetic_initial(name: &str) -> Option<char> {
    let ch = name.chars().find(|c| is_cjk(*c))?;
    let letter = match tables::pinyin(ch).and_then(|p| p.chars().next()) {
        Some(first) => first,
        None => {
            let offset = (digest_int(&ch.to_string()) % 26) as u8;
            char::from(b'a' + offset)
        }
    };
    Some(letter.to_ascii_uppercase())
}

/// `S01E02-1080p`, `1080p` or `movie` for a source file stem.
pub fn episode_tag(stem: &str) -> String {
    let quality = QUALITY_TAG.captures(stem).map(|c| c[1].to_string());
    match (EPISODE_TAG.captures(stem), quality) {
        (Some(ep), Some(q)) => format!("S{}E{}-{q}", &ep[1], &ep[2]),
        (Some(ep), None) => format!("S{}E{}", &ep[1], &ep[2]),
        (None, Some(q)) => q,
        (None, None) => "movie".to_string(),
    }
}

fn single_char(ch: char, position: usize) -> String {
    let hash = digest_int(&ch.to_string());
    if bits(hash, position * 3) % 2 == 0 {
        ch.to_string()
    } else {
        tables::pinyin(ch)
            .map(str::to_string)
            .unwrap_or_else(|| ch.to_string())
    }
}

fn decision(original: &str, obfuscated: String, algorithm: Algorithm) -> ObfuscationDecision {
    ObfuscationDecision {
        original: original.to_string(),
        obfuscated,
        algorithm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obfuscator() -> NameObfuscator {
        NameObfuscator::new(ObfuscationSettings::default())
    }

    #[test]
    fn legacy_matches_known_vectors() {
        let o = obfuscator();
        assert_eq!(o.legacy("三体"), "san-体-");
        assert_eq!(o.legacy("流浪地球 (2019)"), "流_浪_地-球 (2019)");
        assert_eq!(o.legacy("超感迷宫 (2025)"), "超_感迷_宫 (2025)");
        assert_eq!(o.legacy("黑镜"), "hei-镜");
        assert_eq!(o.legacy("Breaking Bad"), "Breaking Bad");
    }

    #[test]
    fn char_split_matches_known_vectors() {
        let o = obfuscator();
        assert_eq!(o.char_split("双轨"), "又又车九");
        assert_eq!(o.char_split("流浪地球 (2019)"), "氵㐬氵良土也王求 (2019)");
        assert_eq!(o.char_split("机器人"), "木几口口口犬人");
    }

    #[test]
    fn char_split_stops_expanding_past_budget() {
        let o = obfuscator();
        assert_eq!(
            o.char_split("器器器器器器器器"),
            "口口口犬口口口犬口口口犬口口口犬口口口犬口口口犬器器"
        );
    }

    #[test]
    fn obfuscate_falls_back_in_order() {
        let o = obfuscator();
        assert_eq!(o.obfuscate("三体").algorithm, Algorithm::Legacy);

        let split = o.obfuscate("双轨 (2021)");
        assert_eq!(split.algorithm, Algorithm::CharSplit);
        assert_eq!(split.obfuscated, "又又车九 (2021)");

        let literal = o.obfuscate("Breaking Bad (2008)");
        assert_eq!(literal.algorithm, Algorithm::Literal);
        assert_eq!(literal.obfuscated, "Breaking Bad (2008)");
    }

    #[test]
    fn obfuscate_is_deterministic_across_instances() {
        let names = ["三体", "漫长的季节 (2023)", "狂飙", "雷霆", "Movie (2024)"];
        for name in names {
            assert_eq!(obfuscator().obfuscate(name), obfuscator().obfuscate(name));
        }
    }

    #[test]
    fn year_suffix_is_preserved() {
        let o = obfuscator();
        for name in ["流浪地球 (2019)", "双轨 (2021)", "Movie (2024)", "漫长的季节 (2023)"] {
            assert!(o.obfuscate(name).obfuscated.ends_with(&name[name.len() - 7..]));
            assert!(o.obfuscate_with_initial(name).obfuscated.ends_with(&name[name.len() - 7..]));
        }
    }

    #[test]
    fn initial_is_taken_from_original_name() {
        let o = obfuscator();
        assert_eq!(o.obfuscate_with_initial("三体").obfuscated, "S san-体-");
        assert_eq!(o.obfuscate_with_initial("双轨").obfuscated, "S 又又车九");
        assert_eq!(
            o.obfuscate_with_initial("超感迷宫 (2025)").obfuscated,
            "C 超_感迷_宫 (2025)"
        );
        assert_eq!(o.obfuscate_with_initial("Breaking Bad").obfuscated, "Breaking Bad");
    }

    #[test]
    fn unknown_ideograph_initial_comes_from_digest() {
        assert_eq!(phonetic_initial("流浪地球"), Some('K'));
        assert_eq!(phonetic_initial("Dune"), None);
    }

    #[test]
    fn category_and_season_segments_stay_literal() {
        let o = obfuscator();
        let parts = ["电视剧", "三体", "Season 1", "Extras", "season 02"];
        let current = o.obfuscate_directory(&parts);
        assert_eq!(current[0], "电视剧");
        assert_eq!(current[1], "S san-体-");
        assert_eq!(&current[2..], &["Season 1", "Extras", "season 02"]);

        let legacy = o.legacy_directory(&parts);
        assert_eq!(legacy[0], "电视剧");
        assert_eq!(legacy[1], "san-体-");
        assert_eq!(legacy[2], "Season 1");
    }

    #[test]
    fn overrides_win_over_algorithm() {
        let o = obfuscator().with_overrides(BTreeMap::from([(
            "三体".to_string(),
            "Santi".to_string(),
        )]));
        assert_eq!(o.obfuscate_directory(&["TV", "三体"]), vec!["TV", "Santi"]);
    }

    #[test]
    fn file_rename_keeps_extension() {
        let o = obfuscator();
        assert_eq!(o.rename_file("三体.mkv", FileNaming::Obfuscated), "san-体-.mkv");
        assert_eq!(o.rename_file("Dune.mkv", FileNaming::Obfuscated), "Dune.mkv");
        assert_eq!(
            o.rename_file("三体.S01E02.2160p.WEB-DL.mkv", FileNaming::EpisodeTag),
            "S01E02-2160p.mkv"
        );
        assert_eq!(o.rename_file("Dune.1080p.mp4", FileNaming::EpisodeTag), "1080p.mp4");
        assert_eq!(o.rename_file("Dune.mp4", FileNaming::EpisodeTag), "movie.mp4");
    }

    #[test]
    fn split_year_strips_whitespace_before_tag() {
        assert_eq!(split_year("Dune  (2021)"), ("Dune", " (2021)".to_string()));
        assert_eq!(split_year("Dune(2021)"), ("Dune", " (2021)".to_string()));
        assert_eq!(split_year("Dune"), ("Dune", String::new()));
    }
}
