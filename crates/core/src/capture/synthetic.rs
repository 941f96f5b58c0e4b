use std::{cell::Cell, f32::consts::PI, rc::Rc};

use crate::{analysis::FftQuantizer, Result, SessionId, VisualizerError};

use super::{CaptureBackend, CaptureTap};

/// Slow amplitude swell applied to the generated signal, in hertz.
const ENVELOPE_HZ: f32 = 0.5;

/// Sine component of the generated signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: f32,
    /// Peak amplitude relative to full scale.
    pub amplitude: f32,
}

impl Tone {
    pub fn new(frequency_hz: f32, amplitude: f32) -> Self {
        Self {
            frequency_hz,
            amplitude,
        }
    }
}

/// Shared bookkeeping of how many taps were opened and released.
#[derive(Debug, Clone, Default)]
pub struct TapCounters {
    opened: Rc<Cell<usize>>,
    released: Rc<Cell<usize>>,
}

impl TapCounters {
    pub fn opened(&self) -> usize {
        self.opened.get()
    }

    pub fn released(&self) -> usize {
        self.released.get()
    }

    /// Taps currently holding a device handle.
    pub fn live(&self) -> usize {
        self.opened().saturating_sub(self.released())
    }
}

/// Backend that synthesises a deterministic tone mix instead of tapping a
/// real output stream.
#[derive(Debug)]
pub struct SyntheticBackend {
    tones: Vec<Tone>,
    sampling_rate: u32,
    max_capture_rate: u32,
    available: bool,
    counters: TapCounters,
}

impl SyntheticBackend {
    pub fn new(tones: Vec<Tone>) -> Self {
        Self {
            tones,
            sampling_rate: 44_100,
            max_capture_rate: 20_000,
            available: true,
            counters: TapCounters::default(),
        }
    }

    pub fn with_max_capture_rate(mut self, millihertz: u32) -> Self {
        self.max_capture_rate = millihertz;
        self
    }

    /// Makes every subsequent `open` fail, as when the device is busy.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    pub fn counters(&self) -> TapCounters {
        self.counters.clone()
    }
}

impl CaptureBackend for SyntheticBackend {
    fn max_capture_rate(&self) -> u32 {
        self.max_capture_rate
    }

    fn open(&mut self, session: SessionId, capture_size: usize) -> Result<Box<dyn CaptureTap>> {
        if !session.is_valid() {
            return Err(VisualizerError::InvalidSession(session.0));
        }
        if !self.available {
            return Err(VisualizerError::Capture(format!(
                "no tap available for session {}",
                session.0
            )));
        }

        self.counters.opened.set(self.counters.opened.get() + 1);
        Ok(Box::new(SyntheticTap {
            tones: self.tones.clone(),
            sampling_rate: self.sampling_rate,
            cursor: 0,
            enabled: false,
            released: false,
            last_waveform: vec![0; capture_size],
            quantizer: FftQuantizer::new(),
            counters: self.counters.clone(),
        }))
    }
}

struct SyntheticTap {
    tones: Vec<Tone>,
    sampling_rate: u32,
    cursor: u64,
    enabled: bool,
    released: bool,
    last_waveform: Vec<i8>,
    quantizer: FftQuantizer,
    counters: TapCounters,
}

impl SyntheticTap {
    fn ensure_readable(&self) -> Result<()> {
        if self.released {
            return Err(VisualizerError::Capture("tap has been released".to_string()));
        }
        if !self.enabled {
            return Err(VisualizerError::Capture("tap is disabled".to_string()));
        }
        Ok(())
    }

    fn sample(&self, index: u64) -> i8 {
        let t = index as f32 / self.sampling_rate as f32;
        let envelope = 0.6 + 0.4 * (2.0 * PI * ENVELOPE_HZ * t).sin();
        let mix: f32 = self
            .tones
            .iter()
            .map(|tone| tone.amplitude * (2.0 * PI * tone.frequency_hz * t).sin())
            .sum();
        (mix * envelope * 127.0).round().clamp(-128.0, 127.0) as i8
    }
}

impl CaptureTap for SyntheticTap {
    fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if self.released {
            return Err(VisualizerError::Capture("tap has been released".to_string()));
        }
        self.enabled = enabled;
        Ok(())
    }

    fn read_waveform(&mut self, out: &mut [i8]) -> Result<()> {
        self.ensure_readable()?;
        for (offset, slot) in out.iter_mut().enumerate() {
            *slot = self.sample(self.cursor + offset as u64);
        }
        self.cursor += out.len() as u64;
        self.last_waveform.clear();
        self.last_waveform.extend_from_slice(out);
        Ok(())
    }

    fn read_fft(&mut self, out: &mut [i8]) -> Result<()> {
        self.ensure_readable()?;
        if self.last_waveform.len() != out.len() {
            self.last_waveform.resize(out.len(), 0);
        }
        self.quantizer.quantize(&self.last_waveform, out)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.enabled = false;
        self.counters.released.set(self.counters.released.get() + 1);
    }
}

impl Drop for SyntheticTap {
    fn drop(&mut self) {
        self.release();
    }
}
