//! Track catalog management
//!
//! This module maintains the ordered, read-only list of tracks the server
//! can stream. The catalog is built once at startup by scanning the media
//! directory and is never mutated by the serving loop.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// File extension a file must carry to be picked up by the scan.
const MEDIA_EXTENSION: &str = "mp3";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read media directory {dir}: {source}")]
    Scan {
        dir: PathBuf,
        source: std::io::Error,
    },
}

/// A single servable track.
#[derive(Debug, Clone)]
pub struct Track {
    path: PathBuf,
    name: String,
}

impl Track {
    fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    /// File name of the track, as shown in listings.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path to the track's byte content on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Descriptive text for the track.
    ///
    /// Reads the `<name>.mp3.info` sidecar file next to the track if one
    /// exists; otherwise falls back to the track name and a placeholder.
    pub fn info_text(&self) -> String {
        let sidecar = self.path.with_extension(format!("{MEDIA_EXTENSION}.info"));
        match std::fs::read_to_string(&sidecar) {
            Ok(text) => {
                if text.ends_with('\n') {
                    text
                } else {
                    format!("{text}\n")
                }
            }
            Err(_) => format!("{}\n(no additional info)\n", self.name),
        }
    }
}

/// Ordered collection of the tracks available for streaming.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tracks: Vec<Track>,
}

impl Catalog {
    /// Builds a catalog by scanning `dir` for media files.
    ///
    /// Entries are sorted by file name so track indices are stable across
    /// runs regardless of directory iteration order.
    pub fn scan(dir: &Path) -> Result<Self, CatalogError> {
        let entries = std::fs::read_dir(dir).map_err(|source| CatalogError::Scan {
            dir: dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::Scan {
                dir: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let is_media = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(MEDIA_EXTENSION));
            if path.is_file() && is_media {
                paths.push(path);
            }
        }
        paths.sort();

        Ok(Self::from_paths(paths))
    }

    /// Builds a catalog directly from a list of file paths, preserving
    /// their order.
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            tracks: paths.into_iter().map(Track::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Looks up a track by its ordinal index.
    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Renders the reply for the `list` command: one line per track,
    /// `(index)\tname`.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (index, track) in self.tracks.iter().enumerate() {
            out.push_str(&format!("({index})\t{}\n", track.name()));
        }
        out
    }
}
