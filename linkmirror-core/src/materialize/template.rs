//! Seeding show directories with template files (posters, nfo stubs, ...).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::place;
use crate::error::{LinkError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateReport {
    pub linked: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Show directory that owns a resolved target file.
///
/// Targets are laid out as `category/show/[season]/file`, so this is the
/// second level below `target_root`. Files sitting directly in a category,
/// or in the root itself, have no show directory.
pub fn show_directory(resolved: &Path, target_root: &Path) -> Option<PathBuf> {
    let relative = resolved.strip_prefix(target_root).ok()?;
    let mut levels = relative.components();
    let (category, show) = (levels.next()?, levels.next()?);
    levels.next()?;
    Some(target_root.join(category).join(show))
}

/// Links every regular file in `template_dir` into `show_dir`.
///
/// Destinations that already exist are left alone.
pub fn link_templates(template_dir: &Path, show_dir: &Path) -> Result<TemplateReport> {
    if !template_dir.is_dir() {
        return Err(LinkError::NotFound(format!(
            "template directory {}",
            template_dir.display()
        )));
    }
    fs::create_dir_all(show_dir)?;

    let mut entries = fs::read_dir(template_dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut report = TemplateReport::default();
    for entry in entries {
        if !entry.file_type()?.is_file() {
            continue;
        }
        let dest = show_dir.join(entry.file_name());
        if fs::symlink_metadata(&dest).is_ok() {
            report.skipped.push(dest);
            continue;
        }
        let source = entry.path();
        let meta = entry.metadata()?;
        let method = place(&source, &dest, &meta, |from, to| fs::hard_link(from, to))?;
        debug!(template = %source.display(), dest = %dest.display(), ?method, "seeded template file");
        report.linked.push(dest);
    }
    Ok(report)
}
