//! Persists raw waveform captures for offline inspection.
//!
//! Each recording session writes one `{title}_{yyyyMMdd_HHmmss}.pcm` file in
//! the configured directory. The file holds nothing but the captured bytes,
//! one signed 8-bit sample each, in delivery order.

use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{config::RecordingConfig, Result, VisualizerError};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const EXTENSION: &str = "pcm";

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_file_name(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File name for a session that started at `started`.
pub fn session_file_name(title: &str, started: NaiveDateTime) -> String {
    format!(
        "{}_{}.{EXTENSION}",
        sanitize_file_name(title),
        started.format(TIMESTAMP_FORMAT)
    )
}

/// Byte destination of a recording session.
pub trait RecordingSink: Write {
    /// Pushes written bytes down to durable storage.
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl RecordingSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Open output stream of an active session.
pub struct RecordingSession {
    path: PathBuf,
    sink: Box<dyn RecordingSink>,
    bytes_written: u64,
}

impl fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSession")
            .field("path", &self.path)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}

impl RecordingSession {
    pub fn output_path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Appends raw waveform captures to a session-scoped file.
#[derive(Debug)]
pub struct Recorder {
    output_dir: PathBuf,
    session: Option<RecordingSession>,
    last_path: Option<PathBuf>,
}

impl Recorder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            session: None,
            last_path: None,
        }
    }

    pub fn from_config(config: &RecordingConfig) -> Self {
        Self::new(config.output_dir.clone())
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Path of the open session, or of the last one closed.
    pub fn output_path(&self) -> Option<&Path> {
        self.session
            .as_ref()
            .map(RecordingSession::output_path)
            .or(self.last_path.as_deref())
    }

    pub fn bytes_written(&self) -> u64 {
        self.session
            .as_ref()
            .map(RecordingSession::bytes_written)
            .unwrap_or(0)
    }

    /// Opens a new session stamped with the current local time.
    pub fn start(&mut self, base_name: &str) -> Result<PathBuf> {
        self.start_at(base_name, Local::now().naive_local())
    }

    /// Opens a new session stamped with `started`. Calling it while already
    /// recording returns the open path unchanged.
    pub fn start_at(&mut self, base_name: &str, started: NaiveDateTime) -> Result<PathBuf> {
        if let Some(session) = &self.session {
            return Ok(session.path.clone());
        }

        std::fs::create_dir_all(&self.output_dir).map_err(|source| VisualizerError::Recording {
            path: self.output_dir.clone(),
            source,
        })?;

        let name = session_file_name(base_name, started);
        let (path, file) = self.create_unique(&name)?;
        Ok(self.start_with_sink(path, Box::new(file)))
    }

    /// Opens a session that writes into `sink`, reported under `path`.
    /// Calling it while already recording returns the open path unchanged
    /// and drops `sink`.
    pub fn start_with_sink(&mut self, path: impl Into<PathBuf>, sink: Box<dyn RecordingSink>) -> PathBuf {
        if let Some(session) = &self.session {
            return session.path.clone();
        }

        let path = path.into();
        tracing::info!(path = %path.display(), "recording waveform data");
        self.session = Some(RecordingSession {
            path: path.clone(),
            sink,
            bytes_written: 0,
        });
        path
    }

    /// Writes `waveform` verbatim and flushes it, so a failing disk is
    /// reported by the capture that hit it. A failed write closes the
    /// session before the error is returned.
    pub fn append(&mut self, waveform: &[i8]) -> Result<()> {
        let session = self.session.as_mut().ok_or(VisualizerError::NotRecording)?;
        let bytes: Vec<u8> = waveform.iter().map(|&sample| sample as u8).collect();

        let written = session
            .sink
            .write_all(&bytes)
            .and_then(|()| session.sink.flush());
        match written {
            Ok(()) => {
                session.bytes_written += bytes.len() as u64;
                Ok(())
            }
            Err(source) => {
                let path = session.path.clone();
                tracing::error!(path = %path.display(), %source, "writing waveform data failed");
                if let Err(err) = self.stop() {
                    tracing::warn!(%err, "closing the failed recording also failed");
                }
                Err(VisualizerError::Recording { path, source })
            }
        }
    }

    /// Flushes and closes the session. Does nothing when not recording.
    pub fn stop(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let RecordingSession {
            path,
            mut sink,
            bytes_written,
        } = session;
        self.last_path = Some(path.clone());

        sink.flush()
            .and_then(|()| sink.sync())
            .map_err(|source| VisualizerError::Recording {
                path: path.clone(),
                source,
            })?;

        tracing::info!(path = %path.display(), bytes = bytes_written, "recording stopped");
        Ok(())
    }

    fn create_unique(&self, name: &str) -> Result<(PathBuf, File)> {
        let stem = name.trim_end_matches(&format!(".{EXTENSION}")[..]);
        let mut attempt = 1_u32;
        loop {
            let path = if attempt == 1 {
                self.output_dir.join(name)
            } else {
                self.output_dir.join(format!("{stem}_{attempt}.{EXTENSION}"))
            };
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(VisualizerError::Recording { path, source }),
            }
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(%err, "closing recording on drop failed");
        }
    }
}

/// Summary of a recorded `.pcm` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingStats {
    pub samples: usize,
    pub min: i8,
    pub max: i8,
    pub mean_abs: f32,
    pub rms: f32,
}

impl RecordingStats {
    pub fn from_samples(samples: &[i8]) -> Self {
        if samples.is_empty() {
            return Self {
                samples: 0,
                min: 0,
                max: 0,
                mean_abs: 0.0,
                rms: 0.0,
            };
        }
        let count = samples.len() as f32;
        let mut min = i8::MAX;
        let mut max = i8::MIN;
        let mut abs_sum = 0.0_f32;
        let mut square_sum = 0.0_f32;
        for &sample in samples {
            min = min.min(sample);
            max = max.max(sample);
            let value = f32::from(sample);
            abs_sum += value.abs();
            square_sum += value * value;
        }
        Self {
            samples: samples.len(),
            min,
            max,
            mean_abs: abs_sum / count,
            rms: (square_sum / count).sqrt(),
        }
    }
}

/// Reads every sample of a recording back.
pub fn read_samples(path: impl AsRef<Path>) -> Result<Vec<i8>> {
    let mut bytes = Vec::new();
    File::open(path.as_ref())?.read_to_end(&mut bytes)?;
    Ok(bytes.into_iter().map(|byte| byte as i8).collect())
}

pub fn inspect(path: impl AsRef<Path>) -> Result<RecordingStats> {
    Ok(RecordingStats::from_samples(&read_samples(path)?))
}
