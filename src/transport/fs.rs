use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::constants::source::DEFAULT_EXTENSIONS;
use crate::errors::PipelineError;
use crate::types::SourceId;

/// Filesystem transport that finds experiment output files under a root.
pub struct FileDiscovery {
    root: PathBuf,
    follow_links: bool,
    extensions: Vec<String>,
}

impl FileDiscovery {
    /// Discover files rooted at `root` with the default extensions.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_links: false,
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }

    /// Configure symlink traversal.
    pub fn with_follow_symlinks(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Restrict discovery to these extensions (case-insensitive, no dot).
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    /// Root directory being walked.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the root and return matching files in lexicographic path order.
    pub fn discover(&self) -> Result<Vec<PathBuf>, PipelineError> {
        if !self.root.is_dir() {
            return Err(PipelineError::MissingSource {
                source_id: self.root.display().to_string(),
                path: self.root.display().to_string(),
            });
        }
        let mut walker = WalkDir::new(&self.root);
        if self.follow_links {
            walker = walker.follow_links(true);
        }
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|err| {
                PipelineError::Io(err.into_io_error().unwrap_or_else(|| {
                    std::io::Error::other("filesystem loop while walking source root")
                }))
            })?;
            if entry.file_type().is_file() && self.matches_extension(entry.path()) {
                paths.push(entry.path().to_path_buf());
            }
        }
        paths.sort();
        debug!(
            root = %self.root.display(),
            files = paths.len(),
            "discovered record sources"
        );
        Ok(paths)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|wanted| wanted.eq_ignore_ascii_case(ext))
    }
}

/// Source id for `path`: its path relative to `root`, without extension,
/// using `/` separators (for example `sptree_size/100_1_1_f`).
pub fn source_id_for(root: &Path, path: &Path) -> SourceId {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    relative
        .iter()
        .map(|segment| segment.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// File stem of `path`, used as a per-source tag value (for example `gnp`).
pub fn file_stem_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discover_filters_by_extension_and_sorts() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        for name in ["rhg.out", "gnp.out", "notes.txt", "nested/dsf.OUT"] {
            fs::write(root.join(name), b"round,rate\n").unwrap();
        }

        let found = FileDiscovery::new(root)
            .with_extensions([".out"])
            .discover()
            .unwrap();
        let ids: Vec<SourceId> = found.iter().map(|path| source_id_for(root, path)).collect();
        assert_eq!(ids, vec!["gnp", "nested/dsf", "rhg"]);
    }

    #[test]
    fn missing_root_is_missing_source() {
        let temp = tempdir().unwrap();
        let err = FileDiscovery::new(temp.path().join("absent"))
            .discover()
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingSource { .. }));
    }

    #[test]
    fn file_stem_label_strips_directory_and_extension() {
        assert_eq!(file_stem_label(Path::new("data/acceptance/gnp.out")), "gnp");
        assert_eq!(file_stem_label(Path::new("")), "");
    }
}
