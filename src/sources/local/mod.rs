use std::path::{Path, PathBuf};

use async_trait::async_trait;
use symphonia::core::{
    codecs::CODEC_TYPE_NULL,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::{MetadataOptions, StandardTagKey},
    probe::Hint,
};
use tracing::{debug, error, warn};

use crate::{
    common::types::UserId,
    protocol::{MediaHandle, Track},
    sources::{ResolveError, TrackResolver},
};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "opus", "webm"];

/// Serves audio files already present in a directory.
///
/// A query is either a path to a file (absolute, or relative to the music
/// directory) or words matched case-insensitively against file names.
pub struct LocalSource {
    music_dir: PathBuf,
}

struct Probed {
    title: Option<String>,
    duration_seconds: Option<u64>,
}

impl LocalSource {
    pub fn new(music_dir: impl Into<PathBuf>) -> Self {
        Self {
            music_dir: music_dir.into(),
        }
    }

    pub fn music_dir(&self) -> &Path {
        &self.music_dir
    }

    fn probe_file(path: &Path) -> Result<Probed, ResolveError> {
        let probe_err = |reason: String| ResolveError::Probe {
            path: path.display().to_string(),
            reason,
        };

        let file = std::fs::File::open(path)?;
        let mut hint = Hint::new();
        if let Some(ext) = extension_of(path) {
            hint.with_extension(&ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| probe_err(e.to_string()))?;

        let mut format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| probe_err("no audio track found".into()))?;

        let duration_seconds = match (track.codec_params.n_frames, track.codec_params.sample_rate) {
            (Some(frames), Some(rate)) if rate > 0 => {
                Some((frames as f64 / rate as f64).round() as u64).filter(|d| *d > 0)
            }
            _ => None,
        };

        let mut title = None;
        let tags = format
            .metadata()
            .current()
            .map(|m| m.tags().to_vec())
            .or_else(|| {
                probed
                    .metadata
                    .get()
                    .and_then(|m| m.current().map(|r| r.tags().to_vec()))
            })
            .unwrap_or_default();
        for tag in tags {
            if tag.std_key == Some(StandardTagKey::TrackTitle) {
                title = Some(tag.value.to_string()).filter(|t| !t.trim().is_empty());
            }
        }

        Ok(Probed {
            title,
            duration_seconds,
        })
    }

    fn track_for(path: &Path, requested_by: UserId) -> Result<Track, ResolveError> {
        let probed = Self::probe_file(path)?;
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Track {
            source_url: format!("file://{}", path.display()),
            title: probed.title.unwrap_or_else(|| id.clone()),
            id,
            media_handle: MediaHandle(path.display().to_string()),
            thumbnail_url: String::new(),
            requested_by,
            duration_seconds: probed.duration_seconds,
        })
    }

    /// Path named directly by `query`, if it points at a file.
    fn direct_path(&self, query: &str) -> Option<PathBuf> {
        let raw = query.strip_prefix("file://").unwrap_or(query);
        let path = Path::new(raw);
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        let joined = self.music_dir.join(path);
        joined.is_file().then_some(joined)
    }

    /// Audio files whose name contains every word of `query`, ranked exact
    /// name first, then prefix matches, then the rest, ties by name.
    fn find_matches(&self, query: &str) -> Result<Vec<PathBuf>, ResolveError> {
        let needle = query.trim().to_lowercase();
        let words: Vec<&str> = needle.split_whitespace().collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked = Vec::new();
        for path in audio_files(&self.music_dir)? {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let name = stem.to_lowercase().replace(['_', '-'], " ");
            if !words.iter().all(|w| name.contains(w)) {
                continue;
            }
            let rank = if name == needle {
                0
            } else if name.starts_with(&needle) {
                1
            } else {
                2
            };
            ranked.push((rank, name, path));
        }

        ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(ranked.into_iter().map(|(_, _, path)| path).collect())
    }

    async fn blocking<T, F>(f: F) -> Result<T, ResolveError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ResolveError> + Send + 'static,
    {
        match tokio::task::spawn_blocking(f).await {
            Ok(result) => result,
            Err(e) => {
                error!("Local source: task join error: {}", e);
                Err(ResolveError::Io(std::io::Error::other(e.to_string())))
            }
        }
    }
}

#[async_trait]
impl TrackResolver for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track, ResolveError> {
        let path = match self.direct_path(query) {
            Some(path) => path,
            None => {
                let matches = Self::blocking({
                    let source = Self::new(self.music_dir.clone());
                    let query = query.to_string();
                    move || source.find_matches(&query)
                })
                .await?;
                matches
                    .into_iter()
                    .next()
                    .ok_or_else(|| ResolveError::NotFound(query.to_string()))?
            }
        };

        debug!("Local source probing file: {}", path.display());
        Self::blocking(move || Self::track_for(&path, requested_by))
            .await
            .inspect_err(|e| warn!("Local source: failed to load '{}': {}", query, e))
    }

    async fn search(
        &self,
        query: &str,
        requested_by: UserId,
        limit: usize,
    ) -> Result<Vec<Track>, ResolveError> {
        let source = Self::new(self.music_dir.clone());
        let query = query.to_string();

        Self::blocking(move || {
            let mut tracks = Vec::new();
            for path in source.find_matches(&query)? {
                if tracks.len() >= limit {
                    break;
                }
                match Self::track_for(&path, requested_by) {
                    Ok(track) => tracks.push(track),
                    Err(e) => debug!("Local source: skipping {}: {}", path.display(), e),
                }
            }
            Ok(tracks)
        })
        .await
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
}

fn audio_files(dir: &Path) -> Result<Vec<PathBuf>, ResolveError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if extension_of(&path).is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.as_str())) {
                files.push(path);
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{io::Write, path::Path};

    /// Writes a silent 8 kHz mono 16-bit WAV of `seconds` length.
    pub fn write_wav(path: &Path, seconds: u32) {
        let rate: u32 = 8000;
        let data_len = rate * 2 * seconds;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(44 + data_len as usize, 0);

        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(&bytes).unwrap();
    }
}
