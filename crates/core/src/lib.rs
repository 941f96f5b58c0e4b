//! Core library for the Pulsescope audio visualiser.
//!
//! Periodic waveform and spectrum captures flow from a [`CaptureSource`] into
//! a [`Smoother`] that eases them into an [`AnimatedSignal`], which the
//! [`Renderer`] turns into draw commands once per display refresh. The same
//! captures are appended verbatim to a per-session file by the [`Recorder`].
//! [`VisualizerLifecycle`] keeps capture and recording in step with the
//! player, and [`Runtime`] dispatches every periodic callback from a single
//! deterministic [`Scheduler`].

pub mod analysis;
pub mod capture;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod player;
pub mod progress;
pub mod record;
pub mod render;
pub mod runtime;
pub mod smoothing;
pub mod timeline;
pub mod view;

pub use analysis::FftQuantizer;
pub use capture::{
    CaptureBackend, CaptureFrame, CaptureSource, CaptureTap, FrameConsumer, SyntheticBackend, Tone,
};
pub use config::VisualizerConfig;
pub use error::{ErrorKind, Permission, Result, VisualizerError};
pub use lifecycle::{Permissions, VisualizerLifecycle, VisualizerState};
pub use player::{MediaPlayer, PlaybackState, PlayerEvent, SessionId, SimulatedPlayer, Song};
pub use progress::{Progress, ProgressTracker};
pub use record::{Recorder, RecordingStats};
pub use render::{DrawCommand, DrawingMode, Renderer, Viewport};
pub use runtime::{CollectingSurface, DisplaySurface, Incident, Runtime};
pub use smoothing::{AnimatedSignal, Rotation, Smoother};
pub use timeline::{Scheduler, TaskKind};
pub use view::VisualizerView;
