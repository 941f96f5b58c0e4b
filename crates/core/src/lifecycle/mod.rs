//! Coordinates the capture tap and the recorder across playback changes.
//!
//! ```text
//! Uninitialized --setup_and_start--> Active <--pause/resume--> Paused
//!        any state --release--> Released --setup_and_start--> Active
//! ```

use std::{path::PathBuf, time::Duration};

use crate::{
    capture::{CaptureBackend, CaptureSource, FrameConsumer},
    config::VisualizerConfig,
    error::Permission,
    player::{PlaybackState, SessionId},
    record::Recorder,
    timeline::Scheduler,
    view::VisualizerView,
    Result, VisualizerError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizerState {
    Uninitialized,
    Active,
    Paused,
    Released,
}

/// Runtime permissions known to the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub capture: bool,
    pub storage: bool,
}

impl Permissions {
    pub fn granted() -> Self {
        Self {
            capture: true,
            storage: true,
        }
    }

    pub fn denied() -> Self {
        Self {
            capture: false,
            storage: false,
        }
    }

    pub fn grant(&mut self, permission: Permission) {
        match permission {
            Permission::Capture => self.capture = true,
            Permission::Storage => self.storage = true,
        }
    }

    /// First permission still missing, if any.
    pub fn missing(&self) -> Option<Permission> {
        if !self.capture {
            Some(Permission::Capture)
        } else if !self.storage {
            Some(Permission::Storage)
        } else {
            None
        }
    }
}

/// Routes each capture to the view for animation and to the recorder for
/// persistence.
struct FrameFanout<'a> {
    view: &'a mut VisualizerView,
    recorder: &'a mut Recorder,
    now: Duration,
    write_error: Option<VisualizerError>,
}

impl FrameConsumer for FrameFanout<'_> {
    fn on_waveform(&mut self, waveform: &[i8], _sampling_rate: u32) {
        self.view.update_waveform(waveform, self.now);
        if self.recorder.is_recording() {
            if let Err(err) = self.recorder.append(waveform) {
                self.write_error = Some(err);
            }
        }
    }

    fn on_spectrum(&mut self, fft: &[i8], _sampling_rate: u32) {
        self.view.update_fft(fft, self.now);
    }
}

/// Owns the capture source and the recorder of the current track.
pub struct VisualizerLifecycle<B> {
    state: VisualizerState,
    backend: B,
    capture: Option<CaptureSource>,
    recorder: Recorder,
    title: String,
    capture_size: usize,
    rate_hint_millihertz: u32,
    recording_enabled: bool,
    is_setup: bool,
    permissions: Permissions,
    /// A setup was refused for lack of permission and should be retried.
    setup_pending: bool,
    incidents: Vec<VisualizerError>,
}

impl<B: CaptureBackend> VisualizerLifecycle<B> {
    pub fn new(backend: B, config: &VisualizerConfig, permissions: Permissions) -> Self {
        Self {
            state: VisualizerState::Uninitialized,
            backend,
            capture: None,
            recorder: Recorder::from_config(&config.recording),
            title: "unknown".to_string(),
            capture_size: config.capture.capture_size,
            rate_hint_millihertz: config.capture.rate_hint_millihertz,
            recording_enabled: config.recording.enabled,
            is_setup: false,
            permissions,
            setup_pending: false,
            incidents: Vec::new(),
        }
    }

    pub fn state(&self) -> VisualizerState {
        self.state
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Names the recordings of the next session.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn capture(&self) -> Option<&CaptureSource> {
        self.capture.as_ref()
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn is_setup_pending(&self) -> bool {
        self.setup_pending
    }

    /// Errors that were reported without failing the calling operation.
    pub fn take_incidents(&mut self) -> Vec<VisualizerError> {
        std::mem::take(&mut self.incidents)
    }

    /// Attaches a fresh tap to `session` and enables it.
    pub fn setup_and_start(&mut self, session: SessionId, scheduler: &mut Scheduler) -> Result<()> {
        if let Some(permission) = self.permissions.missing() {
            self.setup_pending = true;
            tracing::warn!(%permission, "visualizer setup skipped until permission is granted");
            return Err(VisualizerError::PermissionDenied(permission));
        }
        if !session.is_valid() {
            tracing::error!(session = session.0, "invalid audio session id");
            return Err(VisualizerError::InvalidSession(session.0));
        }

        tracing::debug!(session = session.0, title = %self.title, "setting up visualizer");
        if let Some(mut previous) = self.capture.take() {
            previous.release(scheduler);
            if self.state == VisualizerState::Active || self.state == VisualizerState::Paused {
                self.state = VisualizerState::Uninitialized;
            }
            self.is_setup = false;
        }

        let mut capture = CaptureSource::builder()
            .capture_size(self.capture_size)
            .rate_hint_millihertz(self.rate_hint_millihertz)
            .attach(&mut self.backend, session)?;
        if let Err(err) = capture.enable(scheduler) {
            capture.release(scheduler);
            return Err(err);
        }

        self.capture = Some(capture);
        self.is_setup = true;
        self.setup_pending = false;
        self.state = VisualizerState::Active;
        tracing::debug!("visualizer enabled");
        Ok(())
    }

    /// Opens a recording for the current title. Returns `None` when
    /// recording is turned off or a session is already open.
    pub fn start_recording(&mut self) -> Result<Option<PathBuf>> {
        if !self.recording_enabled || self.recorder.is_recording() {
            return Ok(None);
        }
        if !self.permissions.storage {
            return Err(VisualizerError::PermissionDenied(Permission::Storage));
        }
        self.recorder.start(&self.title).map(Some)
    }

    pub fn stop_recording(&mut self) -> Result<()> {
        self.recorder.stop()
    }

    /// Disables capture and closes the recording. No-op unless active.
    pub fn pause(&mut self, scheduler: &mut Scheduler) {
        if self.state != VisualizerState::Active {
            return;
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.disable(scheduler);
        }
        if let Err(err) = self.recorder.stop() {
            self.report(err);
        }
        self.state = VisualizerState::Paused;
        tracing::debug!("visualizer paused");
    }

    /// Re-enables capture and opens a new recording, or performs a full
    /// setup when nothing was set up yet.
    pub fn resume(&mut self, session: SessionId, scheduler: &mut Scheduler) -> Result<()> {
        match self.state {
            VisualizerState::Active => return Ok(()),
            VisualizerState::Paused if self.is_setup && self.capture.is_some() => {
                if let Some(capture) = self.capture.as_mut() {
                    capture.enable(scheduler)?;
                }
                self.state = VisualizerState::Active;
                tracing::debug!("visualizer resumed");
            }
            _ => self.setup_and_start(session, scheduler)?,
        }

        if let Err(err) = self.start_recording() {
            self.report(err);
        }
        Ok(())
    }

    /// Stops recording and frees the tap. Safe to call repeatedly.
    pub fn release(&mut self, scheduler: &mut Scheduler) {
        if let Err(err) = self.recorder.stop() {
            self.report(err);
        }
        if let Some(mut capture) = self.capture.take() {
            capture.release(scheduler);
        }
        self.is_setup = false;
        if self.state != VisualizerState::Released {
            self.state = VisualizerState::Released;
            tracing::debug!("visualizer released");
        }
    }

    /// Releases everything and returns to `Uninitialized`, ready for a new
    /// track or a retried setup.
    pub fn reset(&mut self, scheduler: &mut Scheduler) {
        self.release(scheduler);
        self.state = VisualizerState::Uninitialized;
    }

    /// Reacts to a playback-state notification from the player.
    pub fn on_playback_state(
        &mut self,
        playback: PlaybackState,
        session: SessionId,
        scheduler: &mut Scheduler,
    ) -> Result<()> {
        match playback {
            PlaybackState::Playing => self.resume(session, scheduler),
            PlaybackState::Paused => {
                self.pause(scheduler);
                Ok(())
            }
        }
    }

    /// Records the grant and, if an earlier setup was refused, enters the
    /// lifecycle again from scratch. Returns true when setup was re-issued.
    pub fn permission_granted(
        &mut self,
        permission: Permission,
        session: SessionId,
        scheduler: &mut Scheduler,
    ) -> Result<bool> {
        self.permissions.grant(permission);
        if !self.setup_pending || self.permissions.missing().is_some() {
            return Ok(false);
        }

        self.reset(scheduler);
        self.setup_and_start(session, scheduler)?;
        if let Err(err) = self.start_recording() {
            self.report(err);
        }
        Ok(true)
    }

    /// Capture callback: delivers one frame to the view and the recorder.
    pub fn on_capture_tick(&mut self, view: &mut VisualizerView, now: Duration) {
        if self.state != VisualizerState::Active {
            return;
        }
        let Some(capture) = self.capture.as_mut() else {
            return;
        };

        let mut fanout = FrameFanout {
            view,
            recorder: &mut self.recorder,
            now,
            write_error: None,
        };
        let delivered = capture.deliver(&mut fanout);
        let write_error = fanout.write_error.take();

        match delivered {
            Ok(true) => tracing::trace!(?now, "capture frame delivered"),
            Ok(false) => {}
            Err(err) => self.report(err),
        }
        if let Some(err) = write_error {
            self.report(err);
        }
    }

    fn report(&mut self, err: VisualizerError) {
        tracing::warn!(%err, kind = ?err.kind(), "visualizer degraded");
        self.incidents.push(err);
    }
}

impl<B> std::fmt::Debug for VisualizerLifecycle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualizerLifecycle")
            .field("state", &self.state)
            .field("title", &self.title)
            .field("capture", &self.capture)
            .field("recorder", &self.recorder)
            .field("permissions", &self.permissions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::{SyntheticBackend, Tone},
        timeline::TaskKind,
    };

    struct Fixture {
        lifecycle: VisualizerLifecycle<SyntheticBackend>,
        scheduler: Scheduler,
        view: VisualizerView,
        _dir: tempfile::TempDir,
    }

    fn fixture(permissions: Permissions) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = VisualizerConfig::default();
        config.recording.output_dir = dir.path().to_path_buf();
        let backend = SyntheticBackend::new(vec![Tone::new(220.0, 0.8)]);
        let mut lifecycle = VisualizerLifecycle::new(backend, &config, permissions);
        lifecycle.set_title("Test Song");
        Fixture {
            lifecycle,
            scheduler: Scheduler::new(),
            view: VisualizerView::new(&config, Duration::ZERO),
            _dir: dir,
        }
    }

    #[test]
    fn setup_activates_capture() {
        let mut fx = fixture(Permissions::granted());
        fx.lifecycle.setup_and_start(SessionId(7), &mut fx.scheduler).unwrap();

        assert_eq!(fx.lifecycle.state(), VisualizerState::Active);
        assert!(fx.lifecycle.capture().unwrap().is_enabled());
        assert_eq!(fx.scheduler.count(TaskKind::Capture), 1);
    }

    #[test]
    fn invalid_session_leaves_lifecycle_uninitialized() {
        let mut fx = fixture(Permissions::granted());
        let err = fx
            .lifecycle
            .setup_and_start(SessionId::INVALID, &mut fx.scheduler)
            .unwrap_err();

        assert!(matches!(err, VisualizerError::InvalidSession(-1)));
        assert_eq!(fx.lifecycle.state(), VisualizerState::Uninitialized);
        assert_eq!(fx.lifecycle.backend().counters().opened(), 0);
    }

    #[test]
    fn repeated_setup_holds_a_single_tap() {
        let mut fx = fixture(Permissions::granted());
        fx.lifecycle.setup_and_start(SessionId(1), &mut fx.scheduler).unwrap();
        fx.lifecycle.setup_and_start(SessionId(1), &mut fx.scheduler).unwrap();

        let counters = fx.lifecycle.backend().counters();
        assert_eq!(counters.opened(), 2);
        assert_eq!(counters.live(), 1);
        assert_eq!(fx.scheduler.count(TaskKind::Capture), 1);
    }

    #[test]
    fn unavailable_backend_during_resetup_leaves_no_tap() {
        let mut fx = fixture(Permissions::granted());
        fx.lifecycle.setup_and_start(SessionId(1), &mut fx.scheduler).unwrap();

        fx.lifecycle.backend_mut().set_available(false);
        let err = fx
            .lifecycle
            .setup_and_start(SessionId(1), &mut fx.scheduler)
            .unwrap_err();
        assert!(matches!(err, VisualizerError::Capture(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Resource);
        assert_eq!(fx.lifecycle.state(), VisualizerState::Uninitialized);
        assert!(fx.lifecycle.capture().is_none());
        assert_eq!(fx.scheduler.count(TaskKind::Capture), 0);
        let counters = fx.lifecycle.backend().counters();
        assert_eq!(counters.released(), 1);
        assert_eq!(counters.live(), 0);

        fx.lifecycle.backend_mut().set_available(true);
        fx.lifecycle.setup_and_start(SessionId(1), &mut fx.scheduler).unwrap();
        assert_eq!(fx.lifecycle.state(), VisualizerState::Active);
    }

    #[test]
    fn reset_returns_to_uninitialized() {
        let mut fx = fixture(Permissions::granted());
        fx.lifecycle.setup_and_start(SessionId(1), &mut fx.scheduler).unwrap();
        fx.lifecycle.start_recording().unwrap();

        fx.lifecycle.reset(&mut fx.scheduler);
        assert_eq!(fx.lifecycle.state(), VisualizerState::Uninitialized);
        assert!(!fx.lifecycle.recorder().is_recording());
        assert_eq!(fx.lifecycle.backend().counters().live(), 0);
    }

    #[test]
    fn pause_and_resume_cycle_recordings() {
        let mut fx = fixture(Permissions::granted());
        fx.lifecycle.setup_and_start(SessionId(1), &mut fx.scheduler).unwrap();
        let first = fx.lifecycle.start_recording().unwrap().unwrap();
        fx.lifecycle.on_capture_tick(&mut fx.view, Duration::from_millis(100));

        fx.lifecycle.pause(&mut fx.scheduler);
        assert_eq!(fx.lifecycle.state(), VisualizerState::Paused);
        assert!(!fx.lifecycle.recorder().is_recording());
        assert_eq!(fx.scheduler.count(TaskKind::Capture), 0);
        assert!(fx.lifecycle.capture().unwrap().is_attached());
        assert_eq!(std::fs::metadata(&first).unwrap().len(), 512);

        fx.lifecycle.pause(&mut fx.scheduler);
        assert_eq!(fx.lifecycle.state(), VisualizerState::Paused);

        fx.lifecycle.resume(SessionId(1), &mut fx.scheduler).unwrap();
        assert_eq!(fx.lifecycle.state(), VisualizerState::Active);
        assert!(fx.lifecycle.recorder().is_recording());
        assert_ne!(fx.lifecycle.recorder().output_path().unwrap(), first.as_path());
        assert_eq!(fx.lifecycle.backend().counters().opened(), 1);
        assert!(fx.lifecycle.take_incidents().is_empty());
    }

    #[test]
    fn resume_without_setup_performs_setup() {
        let mut fx = fixture(Permissions::granted());
        fx.lifecycle.resume(SessionId(2), &mut fx.scheduler).unwrap();
        assert_eq!(fx.lifecycle.state(), VisualizerState::Active);
        assert!(fx.lifecycle.recorder().is_recording());
    }

    #[test]
    fn release_is_idempotent() {
        let mut fx = fixture(Permissions::granted());
        fx.lifecycle.setup_and_start(SessionId(1), &mut fx.scheduler).unwrap();
        fx.lifecycle.start_recording().unwrap();

        fx.lifecycle.release(&mut fx.scheduler);
        fx.lifecycle.release(&mut fx.scheduler);

        let counters = fx.lifecycle.backend().counters();
        assert_eq!(fx.lifecycle.state(), VisualizerState::Released);
        assert_eq!(counters.released(), 1);
        assert_eq!(counters.live(), 0);
        assert_eq!(fx.scheduler.count(TaskKind::Capture), 0);
        assert!(fx.lifecycle.take_incidents().is_empty());

        fx.lifecycle.pause(&mut fx.scheduler);
        assert_eq!(fx.lifecycle.state(), VisualizerState::Released);
        fx.lifecycle.setup_and_start(SessionId(3), &mut fx.scheduler).unwrap();
        assert_eq!(fx.lifecycle.state(), VisualizerState::Active);
    }

    #[test]
    fn capture_ticks_feed_view_and_recorder() {
        let mut fx = fixture(Permissions::granted());
        fx.lifecycle.setup_and_start(SessionId(1), &mut fx.scheduler).unwrap();
        let path = fx.lifecycle.start_recording().unwrap().unwrap();

        for tick in 1..=3 {
            fx.lifecycle
                .on_capture_tick(&mut fx.view, Duration::from_millis(100 * tick));
        }
        assert!(fx.view.smoother().is_animating());
        assert_eq!(fx.lifecycle.recorder().bytes_written(), 3 * 512);
        fx.lifecycle.release(&mut fx.scheduler);
        assert_eq!(std::fs::metadata(path).unwrap().len(), 3 * 512);
    }

    #[test]
    fn missing_permission_defers_setup_until_granted() {
        let mut fx = fixture(Permissions::denied());
        let err = fx
            .lifecycle
            .setup_and_start(SessionId(1), &mut fx.scheduler)
            .unwrap_err();
        assert!(matches!(err, VisualizerError::PermissionDenied(Permission::Capture)));
        assert!(fx.lifecycle.is_setup_pending());
        assert_eq!(fx.lifecycle.state(), VisualizerState::Uninitialized);

        let restarted = fx
            .lifecycle
            .permission_granted(Permission::Capture, SessionId(1), &mut fx.scheduler)
            .unwrap();
        assert!(!restarted);

        let restarted = fx
            .lifecycle
            .permission_granted(Permission::Storage, SessionId(1), &mut fx.scheduler)
            .unwrap();
        assert!(restarted);
        assert_eq!(fx.lifecycle.state(), VisualizerState::Active);
        assert!(fx.lifecycle.recorder().is_recording());
    }

    #[test]
    fn playback_notifications_drive_pause_and_resume() {
        let mut fx = fixture(Permissions::granted());
        fx.lifecycle.setup_and_start(SessionId(1), &mut fx.scheduler).unwrap();

        fx.lifecycle
            .on_playback_state(PlaybackState::Paused, SessionId(1), &mut fx.scheduler)
            .unwrap();
        assert_eq!(fx.lifecycle.state(), VisualizerState::Paused);

        fx.lifecycle
            .on_playback_state(PlaybackState::Playing, SessionId(1), &mut fx.scheduler)
            .unwrap();
        assert_eq!(fx.lifecycle.state(), VisualizerState::Active);
    }

    #[test]
    fn recorder_failure_does_not_stop_visualisation() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let mut config = VisualizerConfig::default();
        config.recording.output_dir = blocker;
        let backend = SyntheticBackend::new(vec![Tone::new(220.0, 0.8)]);
        let mut lifecycle = VisualizerLifecycle::new(backend, &config, Permissions::granted());
        let mut scheduler = Scheduler::new();

        lifecycle.resume(SessionId(1), &mut scheduler).unwrap();
        assert_eq!(lifecycle.state(), VisualizerState::Active);
        assert!(!lifecycle.recorder().is_recording());
        let incidents = lifecycle.take_incidents();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].kind(), crate::ErrorKind::Resource);
    }
}
