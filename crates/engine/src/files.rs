use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{0:?} does not exist! Cannot continue...")]
    Missing(PathBuf),
    #[error("Cannot process file of type \"{0}\"...")]
    UnsupportedType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Video,
    Subtitle,
}

/// Alternating row colour so neighbouring files stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTag {
    Even,
    Odd,
}

impl ColorTag {
    fn for_index(index: usize) -> Self {
        if index % 2 == 0 {
            ColorTag::Even
        } else {
            ColorTag::Odd
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Logical identity used by jobs. Compacted when an earlier file is forgotten.
    pub index: usize,
    pub directory: PathBuf,
    pub filename: String,
    /// Row within the file list; negative or past the viewport means off-screen.
    pub display_position: isize,
    pub color: ColorTag,
    pub media_type: MediaType,
}

impl MediaFile {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    pub fn stem(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone())
    }

    pub fn is_subtitle(&self) -> bool {
        self.media_type == MediaType::Subtitle
    }
}

/// The ordered selection of input files.
#[derive(Debug, Clone, Default)]
pub struct FileRegistry {
    files: Vec<MediaFile>,
}

impl FileRegistry {
    pub fn from_paths<P: AsRef<Path>>(paths: &[P], config: &AppConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for path in paths {
            registry.push(path.as_ref(), config)?;
        }
        Ok(registry)
    }

    /// Validate and append a file, placing it on the row after the last one.
    pub fn push(&mut self, path: &Path, config: &AppConfig) -> Result<usize, RegistryError> {
        let absolute = path
            .canonicalize()
            .map_err(|_| RegistryError::Missing(path.to_path_buf()))?;
        if !absolute.is_file() {
            return Err(RegistryError::Missing(path.to_path_buf()));
        }
        if !config.accepts(&absolute) {
            let ext = absolute
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            return Err(RegistryError::UnsupportedType(ext));
        }

        let directory = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let filename = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let media_type = if config.is_subtitle(&absolute) {
            MediaType::Subtitle
        } else {
            MediaType::Video
        };

        let index = self.files.len();
        let display_position = self
            .files
            .iter()
            .map(|f| f.display_position + 1)
            .max()
            .unwrap_or(0);
        debug!("Selected {:?} as file {}", absolute, index);
        self.files.push(MediaFile {
            index,
            directory,
            filename,
            display_position,
            color: ColorTag::for_index(index),
            media_type,
        });
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<&MediaFile> {
        self.files.get(index)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaFile> {
        self.files.iter()
    }

    pub fn index_of_path(&self, path: &Path) -> Option<usize> {
        self.files.iter().position(|f| f.path() == path)
    }

    /// Move every file from `start` onwards by `delta` rows.
    pub fn shift_rows_from(&mut self, start: usize, delta: isize) {
        for file in self.files.iter_mut().filter(|f| f.index >= start) {
            file.display_position += delta;
        }
    }

    /// Scroll the whole list by `delta` rows.
    pub fn scroll(&mut self, delta: isize) {
        self.shift_rows_from(0, delta);
    }

    /// Drop a file from the selection. Later files move up one row and their
    /// indices shift down by one, so callers must ensure nothing still refers
    /// to `index`.
    pub fn forget(&mut self, index: usize) -> Option<MediaFile> {
        if index >= self.files.len() {
            return None;
        }
        let removed = self.files.remove(index);
        for file in self.files.iter_mut().skip(index) {
            file.index -= 1;
            file.display_position -= 1;
        }
        Some(removed)
    }
}
