//! Resolves target paths and makes source files reachable there.

pub mod template;

use std::fs::{self, File, FileTimes, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{FileNaming, MonitorDefinition, ObfuscationSettings};
use crate::error::{LinkError, Result};
use crate::media::relative_within;
use crate::obfuscate::NameObfuscator;

pub use template::{TemplateReport, link_templates, show_directory};

/// How a source file was made reachable on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMethod {
    Hardlink,
    Copy,
}

/// Outcome of materialising one source file on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum MaterializeOutcome {
    Materialized { path: PathBuf, method: LinkMethod },
    Skipped { reason: String },
    Failed { error: String },
}

impl MaterializeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Materialized { .. })
    }
}

/// Turns (source, source root, target root) into a linked file on the target.
#[derive(Debug)]
pub struct LinkMaterializer {
    obfuscator: NameObfuscator,
    obfuscate_enabled: bool,
    naming: FileNaming,
}

impl LinkMaterializer {
    pub fn new(obfuscator: NameObfuscator, obfuscate_enabled: bool, naming: FileNaming) -> Self {
        Self {
            obfuscator,
            obfuscate_enabled,
            naming,
        }
    }

    pub fn for_monitor(monitor: &MonitorDefinition, settings: ObfuscationSettings) -> Self {
        let obfuscator = NameObfuscator::new(settings).with_overrides(monitor.name_overrides.clone());
        Self::new(obfuscator, monitor.obfuscate_enabled, monitor.file_naming)
    }

    pub fn obfuscator(&self) -> &NameObfuscator {
        &self.obfuscator
    }

    /// Target path for `source`, reusing an existing legacy directory when present.
    pub fn resolve_target(
        &self,
        source: &Path,
        source_root: &Path,
        target_root: &Path,
    ) -> Result<PathBuf> {
        let relative = relative_within(source_root, source).ok_or_else(|| {
            LinkError::InvalidPath(format!(
                "{} is not inside source root {}",
                source.display(),
                source_root.display()
            ))
        })?;

        if !self.obfuscate_enabled {
            return Ok(target_root.join(relative));
        }

        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LinkError::InvalidPath(format!("{} has no file name", source.display())))?;
        let new_name = self.obfuscator.rename_file(&file_name, self.naming);

        let dir_parts: Vec<String> = relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        if dir_parts.is_empty() {
            return Ok(target_root.join(new_name));
        }
        Ok(self.resolve_directory(target_root, &dir_parts).join(new_name))
    }

    /// Directory for `parts` on the target.
    ///
    /// When the legacy directory at the first segment where the two schemes
    /// diverge exists on disk, the whole path stays in the legacy scheme.
    /// Existence is checked on every call.
    fn resolve_directory(&self, target_root: &Path, parts: &[String]) -> PathBuf {
        let current = self.obfuscator.obfuscate_directory(parts);
        let legacy = self.obfuscator.legacy_directory(parts);

        let Some(diverges_at) = current.iter().zip(&legacy).position(|(c, l)| c != l) else {
            return join_all(target_root, &current);
        };
        let legacy_anchor = join_all(target_root, &legacy[..=diverges_at]);
        if legacy_anchor.is_dir() {
            debug!(legacy = %legacy_anchor.display(), "reusing existing legacy directory");
            return join_all(target_root, &legacy);
        }
        join_all(target_root, &current)
    }

    /// Resolves the target for `source` and links it there.
    ///
    /// Blocking; callers on the async runtime wrap this in `spawn_blocking`.
    pub fn materialize(
        &self,
        source: &Path,
        source_root: &Path,
        target_root: &Path,
    ) -> MaterializeOutcome {
        let target = match self.resolve_target(source, source_root, target_root) {
            Ok(target) => target,
            Err(err) => {
                return MaterializeOutcome::Failed {
                    error: err.to_string(),
                };
            }
        };

        match link_file(source, &target) {
            Ok(method) => MaterializeOutcome::Materialized {
                path: target,
                method,
            },
            Err(err) => MaterializeOutcome::Failed {
                error: err.to_string(),
            },
        }
    }
}

fn join_all(root: &Path, segments: &[String]) -> PathBuf {
    segments.iter().fold(root.to_path_buf(), |path, seg| path.join(seg))
}

/// Replaces `target` with a hardlink to `source`, copying when linking fails.
///
/// The existing target is only removed once `source` is confirmed to be a
/// readable regular file.
pub fn link_file(source: &Path, target: &Path) -> Result<LinkMethod> {
    link_file_with(source, target, |from, to| fs::hard_link(from, to))
}

fn link_file_with<F>(source: &Path, target: &Path, hard_link: F) -> Result<LinkMethod>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    let meta = fs::metadata(source)?;
    if !meta.is_file() {
        return Err(LinkError::InvalidPath(format!(
            "{} is not a regular file",
            source.display()
        )));
    }
    File::open(source)?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::symlink_metadata(target) {
        Ok(existing) if existing.is_dir() => {
            return Err(LinkError::InvalidPath(format!(
                "{} is a directory",
                target.display()
            )));
        }
        Ok(_) => {
            info!(target = %target.display(), "replacing existing target file");
            fs::remove_file(target)?;
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    place(source, target, &meta, hard_link)
}

/// Hardlink, else copy. `target` must not exist.
pub(crate) fn place<F>(
    source: &Path,
    target: &Path,
    meta: &fs::Metadata,
    hard_link: F,
) -> Result<LinkMethod>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    match hard_link(source, target) {
        Ok(()) => Ok(LinkMethod::Hardlink),
        Err(link_err) => {
            warn!(
                source = %source.display(),
                target = %target.display(),
                reason = %link_err,
                "hardlink failed, copying instead"
            );
            fs::copy(source, target)?;
            preserve_times(target, meta);
            Ok(LinkMethod::Copy)
        }
    }
}

fn preserve_times(target: &Path, meta: &fs::Metadata) {
    let mut times = FileTimes::new();
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    let result = OpenOptions::new()
        .write(true)
        .open(target)
        .and_then(|file| file.set_times(times));
    if let Err(err) = result {
        warn!(target = %target.display(), reason = %err, "could not preserve timestamps on copy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    #[cfg(unix)]
    use std::os::unix::fs::MetadataExt;

    use anyhow::Result;
    use tempfile::tempdir;

    fn materializer(obfuscate: bool) -> LinkMaterializer {
        LinkMaterializer::new(
            NameObfuscator::new(ObfuscationSettings::default()),
            obfuscate,
            FileNaming::Obfuscated,
        )
    }

    fn write(path: &Path, contents: &str) -> Result<()> {
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(path, contents)?;
        Ok(())
    }

    #[test]
    fn plain_mirror_when_obfuscation_disabled() -> Result<()> {
        let m = materializer(false);
        let target = m.resolve_target(
            Path::new("/src/TV/三体/Season 1/三体.S01E01.mkv"),
            Path::new("/src"),
            Path::new("/dst"),
        )?;
        assert_eq!(target, PathBuf::from("/dst/TV/三体/Season 1/三体.S01E01.mkv"));
        Ok(())
    }

    #[test]
    fn obfuscated_target_keeps_category_and_season() -> Result<()> {
        let m = materializer(true);
        let target = m.resolve_target(
            Path::new("/src/TV/三体/Season 1/三体.mkv"),
            Path::new("/src"),
            Path::new("/dst"),
        )?;
        assert_eq!(target, PathBuf::from("/dst/TV/S san-体-/Season 1/san-体-.mkv"));
        Ok(())
    }

    #[test]
    fn sources_outside_root_are_rejected() {
        let m = materializer(true);
        let err = m
            .resolve_target(Path::new("/elsewhere/a.mkv"), Path::new("/src"), Path::new("/dst"))
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidPath(_)));
    }

    #[test]
    fn existing_legacy_directory_is_reused() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let source = src.join("TV/三体/Season 1/new-episode.mkv");
        write(&source, "video")?;
        fs::create_dir_all(dst.join("TV/san-体-/Season 1"))?;

        let m = materializer(true);
        let outcome = m.materialize(&source, &src, &dst);
        let MaterializeOutcome::Materialized { path, .. } = outcome else {
            panic!("expected materialized, got {outcome:?}");
        };
        assert_eq!(path, dst.join("TV/san-体-/Season 1/new-episode.mkv"));
        assert!(!dst.join("TV/S san-体-").exists());
        Ok(())
    }

    #[test]
    fn new_season_lands_under_existing_legacy_show() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let source = src.join("TV/三体/Season 2/e1.mkv");
        write(&source, "video")?;
        fs::create_dir_all(dst.join("TV/san-体-/Season 1"))?;

        let outcome = materializer(true).materialize(&source, &src, &dst);
        let MaterializeOutcome::Materialized { path, .. } = outcome else {
            panic!("expected materialized, got {outcome:?}");
        };
        assert_eq!(path, dst.join("TV/san-体-/Season 2/e1.mkv"));
        assert!(!dst.join("TV/S san-体-").exists());
        assert_eq!(fs::read_dir(dst.join("TV"))?.count(), 1);
        Ok(())
    }

    #[test]
    fn removed_legacy_show_is_not_reused() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let first = src.join("TV/三体/Season 1/e1.mkv");
        let second = src.join("TV/三体/Season 1/e2.mkv");
        write(&first, "one")?;
        write(&second, "two")?;
        fs::create_dir_all(dst.join("TV/san-体-"))?;

        let m = materializer(true);
        assert_eq!(
            m.materialize(&first, &src, &dst),
            MaterializeOutcome::Materialized {
                path: dst.join("TV/san-体-/Season 1/e1.mkv"),
                method: LinkMethod::Hardlink,
            }
        );

        fs::remove_dir_all(dst.join("TV/san-体-"))?;
        let outcome = m.materialize(&second, &src, &dst);
        let MaterializeOutcome::Materialized { path, .. } = outcome else {
            panic!("expected materialized, got {outcome:?}");
        };
        assert_eq!(path, dst.join("TV/S san-体-/Season 1/e2.mkv"));
        assert!(!dst.join("TV/san-体-").exists());
        Ok(())
    }

    #[test]
    fn overrides_apply_to_new_directories() -> Result<()> {
        let monitor = MonitorDefinition {
            obfuscate_enabled: true,
            name_overrides: BTreeMap::from([("三体".to_string(), "ST".to_string())]),
            ..MonitorDefinition::new("/src")
        };
        let m = LinkMaterializer::for_monitor(&monitor, ObfuscationSettings::default());
        let target = m.resolve_target(
            Path::new("/src/TV/三体/a.mkv"),
            Path::new("/src"),
            Path::new("/dst"),
        )?;
        assert_eq!(target, PathBuf::from("/dst/TV/ST/a.mkv"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn materialize_creates_hardlink_and_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let source = src.join("Movie (2024)/Movie.mkv");
        write(&source, "frames")?;

        let m = materializer(true);
        let first = m.materialize(&source, &src, &dst);
        let second = m.materialize(&source, &src, &dst);
        assert_eq!(first, second);

        let MaterializeOutcome::Materialized { path, method } = first else {
            panic!("expected materialized, got {first:?}");
        };
        assert_eq!(method, LinkMethod::Hardlink);
        assert_eq!(path, dst.join("Movie (2024)/Movie.mkv"));
        assert_eq!(fs::metadata(&path)?.ino(), fs::metadata(&source)?.ino());
        Ok(())
    }

    #[test]
    fn copy_fallback_when_hardlink_fails() -> Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("a.mkv");
        let target = dir.path().join("out/a.mkv");
        write(&source, "bytes")?;

        let method = link_file_with(&source, &target, |_, _| {
            Err(io::Error::other("cross-device link"))
        })?;
        assert_eq!(method, LinkMethod::Copy);
        assert_eq!(fs::read_to_string(&target)?, "bytes");
        assert_eq!(fs::metadata(&target)?.modified()?, fs::metadata(&source)?.modified()?);
        Ok(())
    }

    #[test]
    fn missing_source_leaves_existing_target_untouched() -> Result<()> {
        let dir = tempdir()?;
        let target = dir.path().join("dst/a.mkv");
        write(&target, "old")?;

        let err = link_file(&dir.path().join("missing.mkv"), &target).unwrap_err();
        assert!(matches!(err, LinkError::Io(_)));
        assert_eq!(fs::read_to_string(&target)?, "old");
        Ok(())
    }

    #[test]
    fn existing_target_is_replaced() -> Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("a.mkv");
        let target = dir.path().join("dst/a.mkv");
        write(&source, "new")?;
        write(&target, "old")?;

        link_file(&source, &target)?;
        assert_eq!(fs::read_to_string(&target)?, "new");
        Ok(())
    }
}
