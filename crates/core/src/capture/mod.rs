//! Audio-session tap that periodically hands waveform and spectrum captures
//! to a [`FrameConsumer`].

mod synthetic;

use std::time::Duration;

use crate::{
    timeline::{Scheduler, TaskId, TaskKind},
    Result, SessionId, VisualizerError,
};

pub use synthetic::{SyntheticBackend, TapCounters, Tone};

/// One delivery from the tap. Both buffers have the capture size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFrame {
    pub waveform: Vec<i8>,
    pub fft: Vec<i8>,
    pub sampling_rate: u32,
}

/// Receiver of the two independent deliveries made on every capture tick.
pub trait FrameConsumer {
    fn on_waveform(&mut self, waveform: &[i8], sampling_rate: u32);
    fn on_spectrum(&mut self, fft: &[i8], sampling_rate: u32);
}

/// Handle to an opened platform tap.
pub trait CaptureTap {
    /// Sampling rate of the tapped stream in hertz.
    fn sampling_rate(&self) -> u32;
    fn set_enabled(&mut self, enabled: bool) -> Result<()>;
    fn read_waveform(&mut self, out: &mut [i8]) -> Result<()>;
    fn read_fft(&mut self, out: &mut [i8]) -> Result<()>;
    /// Frees the underlying device handle.
    fn release(&mut self);
}

/// Factory for taps bound to an audio session.
pub trait CaptureBackend {
    /// Highest delivery rate the platform supports, in millihertz.
    fn max_capture_rate(&self) -> u32;
    fn open(&mut self, session: SessionId, capture_size: usize) -> Result<Box<dyn CaptureTap>>;
}

/// Validated construction of a [`CaptureSource`].
#[derive(Debug, Clone)]
pub struct CaptureSourceBuilder {
    capture_size: usize,
    rate_hint_millihertz: u32,
}

impl Default for CaptureSourceBuilder {
    fn default() -> Self {
        Self {
            capture_size: 512,
            rate_hint_millihertz: u32::MAX,
        }
    }
}

impl CaptureSourceBuilder {
    pub fn capture_size(mut self, capture_size: usize) -> Self {
        self.capture_size = capture_size;
        self
    }

    pub fn rate_hint_millihertz(mut self, rate: u32) -> Self {
        self.rate_hint_millihertz = rate;
        self
    }

    /// Opens a tap on `session`. The source starts disabled.
    pub fn attach(
        self,
        backend: &mut dyn CaptureBackend,
        session: SessionId,
    ) -> Result<CaptureSource> {
        if !session.is_valid() {
            return Err(VisualizerError::InvalidSession(session.0));
        }
        if self.capture_size == 0 || !self.capture_size.is_power_of_two() {
            return Err(VisualizerError::CaptureSize(self.capture_size));
        }

        let rate_millihertz = self.rate_hint_millihertz.min(backend.max_capture_rate()) / 2;
        if rate_millihertz == 0 {
            return Err(VisualizerError::Config(
                "capture rate resolves to zero".to_string(),
            ));
        }

        let mut tap = backend.open(session, self.capture_size)?;
        tap.set_enabled(false)?;
        tracing::debug!(
            session = session.0,
            capture_size = self.capture_size,
            rate_millihertz,
            "capture tap attached"
        );

        Ok(CaptureSource {
            tap: Some(tap),
            task: None,
            capture_size: self.capture_size,
            rate_millihertz,
            waveform: vec![0; self.capture_size],
            fft: vec![0; self.capture_size],
        })
    }
}

/// Owns exactly one platform tap and the periodic task that polls it.
pub struct CaptureSource {
    tap: Option<Box<dyn CaptureTap>>,
    task: Option<TaskId>,
    capture_size: usize,
    rate_millihertz: u32,
    waveform: Vec<i8>,
    fft: Vec<i8>,
}

impl CaptureSource {
    pub fn builder() -> CaptureSourceBuilder {
        CaptureSourceBuilder::default()
    }

    /// Shorthand for the builder with every field supplied.
    pub fn attach(
        backend: &mut dyn CaptureBackend,
        session: SessionId,
        capture_size: usize,
        rate_hint_millihertz: u32,
    ) -> Result<Self> {
        Self::builder()
            .capture_size(capture_size)
            .rate_hint_millihertz(rate_hint_millihertz)
            .attach(backend, session)
    }

    pub fn capture_size(&self) -> usize {
        self.capture_size
    }

    /// Effective delivery rate: half of the smaller of hint and platform max.
    pub fn rate_millihertz(&self) -> u32 {
        self.rate_millihertz
    }

    pub fn interval(&self) -> Duration {
        Duration::from_micros(1_000_000_000 / u64::from(self.rate_millihertz))
    }

    pub fn is_enabled(&self) -> bool {
        self.task.is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.tap.is_some()
    }

    /// Id of the periodic capture task while enabled.
    pub fn task(&self) -> Option<TaskId> {
        self.task
    }

    /// Turns the tap on and registers the periodic delivery.
    pub fn enable(&mut self, scheduler: &mut Scheduler) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }
        let tap = self
            .tap
            .as_mut()
            .ok_or_else(|| VisualizerError::Capture("tap has been released".to_string()))?;
        tap.set_enabled(true)?;
        self.task = Some(scheduler.schedule_repeating(TaskKind::Capture, self.interval()));
        Ok(())
    }

    /// Stops deliveries but keeps the tap open.
    pub fn disable(&mut self, scheduler: &mut Scheduler) {
        if let Some(task) = self.task.take() {
            scheduler.cancel(task);
        }
        if let Some(tap) = self.tap.as_mut() {
            if let Err(err) = tap.set_enabled(false) {
                tracing::warn!(%err, "failed to disable capture tap");
            }
        }
    }

    /// Cancels deliveries and frees the tap, whatever state it is in.
    pub fn release(&mut self, scheduler: &mut Scheduler) {
        if let Some(task) = self.task.take() {
            scheduler.cancel(task);
        }
        if let Some(mut tap) = self.tap.take() {
            tap.release();
            tracing::debug!("capture tap released");
        }
    }

    /// Reads one capture and hands the waveform, then the spectrum, to
    /// `consumer`. Returns false when the source is not enabled.
    pub fn deliver(&mut self, consumer: &mut dyn FrameConsumer) -> Result<bool> {
        if self.task.is_none() {
            return Ok(false);
        }
        let Some(tap) = self.tap.as_mut() else {
            return Ok(false);
        };

        let sampling_rate = tap.sampling_rate();
        tap.read_waveform(&mut self.waveform)?;
        consumer.on_waveform(&self.waveform, sampling_rate);
        tap.read_fft(&mut self.fft)?;
        consumer.on_spectrum(&self.fft, sampling_rate);
        Ok(true)
    }

    /// Reads one capture into an owned frame.
    pub fn capture_frame(&mut self) -> Result<Option<CaptureFrame>> {
        let mut collector = FrameCollector::default();
        if !self.deliver(&mut collector)? {
            return Ok(None);
        }
        Ok(Some(CaptureFrame {
            waveform: collector.waveform,
            fft: collector.fft,
            sampling_rate: collector.sampling_rate,
        }))
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        if let Some(mut tap) = self.tap.take() {
            tap.release();
        }
    }
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("attached", &self.is_attached())
            .field("enabled", &self.is_enabled())
            .field("capture_size", &self.capture_size)
            .field("rate_millihertz", &self.rate_millihertz)
            .finish()
    }
}

#[derive(Default)]
struct FrameCollector {
    waveform: Vec<i8>,
    fft: Vec<i8>,
    sampling_rate: u32,
}

impl FrameConsumer for FrameCollector {
    fn on_waveform(&mut self, waveform: &[i8], sampling_rate: u32) {
        self.waveform = waveform.to_vec();
        self.sampling_rate = sampling_rate;
    }

    fn on_spectrum(&mut self, fft: &[i8], _sampling_rate: u32) {
        self.fft = fft.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SyntheticBackend {
        SyntheticBackend::new(vec![Tone::new(440.0, 0.5)])
    }

    #[test]
    fn attach_validates_session_and_size() {
        let mut backend = backend();
        let err = CaptureSource::attach(&mut backend, SessionId::INVALID, 512, u32::MAX).unwrap_err();
        assert!(matches!(err, VisualizerError::InvalidSession(-1)));

        let err = CaptureSource::attach(&mut backend, SessionId(3), 500, u32::MAX).unwrap_err();
        assert!(matches!(err, VisualizerError::CaptureSize(500)));
        assert_eq!(backend.counters().opened(), 0);
    }

    #[test]
    fn platform_maximum_caps_the_rate() {
        let mut slow = SyntheticBackend::new(vec![Tone::new(440.0, 0.5)]).with_max_capture_rate(1_000);
        let source = CaptureSource::attach(&mut slow, SessionId(1), 512, u32::MAX).unwrap();
        assert_eq!(source.rate_millihertz(), 500);
        assert_eq!(source.interval(), Duration::from_secs(2));

        let mut stalled = SyntheticBackend::new(vec![Tone::new(440.0, 0.5)]).with_max_capture_rate(1);
        let err = CaptureSource::attach(&mut stalled, SessionId(1), 512, u32::MAX).unwrap_err();
        assert!(matches!(err, VisualizerError::Config(_)));
        assert_eq!(stalled.counters().opened(), 0);
    }

    #[test]
    fn rate_is_half_of_the_capped_hint() {
        let mut backend = backend();
        let source = CaptureSource::attach(&mut backend, SessionId(1), 512, u32::MAX).unwrap();
        assert_eq!(source.rate_millihertz(), 10_000);
        assert_eq!(source.interval(), Duration::from_millis(100));

        let source = CaptureSource::attach(&mut backend, SessionId(1), 512, 8_000).unwrap();
        assert_eq!(source.rate_millihertz(), 4_000);
        assert_eq!(source.interval(), Duration::from_millis(250));
    }

    #[test]
    fn delivers_only_while_enabled() {
        let mut backend = backend();
        let mut scheduler = Scheduler::new();
        let mut source = CaptureSource::attach(&mut backend, SessionId(1), 256, u32::MAX).unwrap();

        assert!(source.capture_frame().unwrap().is_none());

        source.enable(&mut scheduler).unwrap();
        assert_eq!(scheduler.count(TaskKind::Capture), 1);
        let frame = source.capture_frame().unwrap().unwrap();
        assert_eq!(frame.waveform.len(), 256);
        assert_eq!(frame.fft.len(), 256);
        assert_eq!(frame.sampling_rate, 44_100);
        assert!(frame.waveform.iter().any(|&s| s != 0));

        source.disable(&mut scheduler);
        assert_eq!(scheduler.count(TaskKind::Capture), 0);
        assert!(source.is_attached());
        assert!(source.capture_frame().unwrap().is_none());
    }

    #[test]
    fn release_frees_the_tap_once() {
        let mut backend = backend();
        let counters = backend.counters();
        let mut scheduler = Scheduler::new();
        let mut source = CaptureSource::attach(&mut backend, SessionId(1), 512, u32::MAX).unwrap();
        source.enable(&mut scheduler).unwrap();
        source.disable(&mut scheduler);

        source.release(&mut scheduler);
        source.release(&mut scheduler);
        drop(source);

        assert_eq!(counters.opened(), 1);
        assert_eq!(counters.released(), 1);
        assert_eq!(counters.live(), 0);
        assert_eq!(scheduler.count(TaskKind::Capture), 0);
    }
}
