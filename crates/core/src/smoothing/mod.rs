//! Turns the latest raw captures into a continuously animated signal.
//!
//! Every capture restarts a fixed-length ease-out animation. The spectrum
//! channel interpolates from a baseline snapshotted at retarget time, while
//! the waveform channel chases its target from wherever it currently is.
//! Both use the same curve, so a retarget mid-flight never jumps.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::AnimationConfig;

/// Decelerating curve `1 - (1 - t)^2`, fixed at 0 and 1.
pub fn ease_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t) * (1.0 - t)
}

/// Raw spectrum byte mapped into `[0, 1]`.
pub fn spectrum_target(raw: i8) -> f32 {
    (f32::from(raw).abs() / 255.0).min(1.0)
}

/// Animated values read by the renderer every display frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimatedSignal {
    /// Sample amplitudes on the raw signed scale.
    pub waveform: Vec<f32>,
    /// Magnitudes in `[0, 1]`.
    pub spectrum: Vec<f32>,
    /// Degrees in `[0, 360)`.
    pub rotation_angle: f32,
}

impl AnimatedSignal {
    pub fn zeroed(points: usize) -> Self {
        Self {
            waveform: vec![0.0; points],
            spectrum: vec![0.0; points],
            rotation_angle: 0.0,
        }
    }
}

#[derive(Debug)]
pub struct Smoother {
    signal: AnimatedSignal,
    waveform_target: Vec<f32>,
    spectrum_target: Vec<f32>,
    previous_spectrum: Vec<f32>,
    capacity: usize,
    duration: Duration,
    /// Start of the in-flight animation.
    started: Option<Duration>,
}

impl Smoother {
    /// `capacity` bounds how many leading samples of each capture animate.
    pub fn new(capacity: usize, duration: Duration) -> Self {
        Self {
            signal: AnimatedSignal::zeroed(capacity),
            waveform_target: vec![0.0; capacity],
            spectrum_target: vec![0.0; capacity],
            previous_spectrum: vec![0.0; capacity],
            capacity,
            duration,
            started: None,
        }
    }

    pub fn from_config(config: &AnimationConfig) -> Self {
        Self::new(config.max_points, config.duration())
    }

    pub fn signal(&self) -> &AnimatedSignal {
        &self.signal
    }

    pub fn signal_mut(&mut self) -> &mut AnimatedSignal {
        &mut self.signal
    }

    pub fn is_animating(&self) -> bool {
        self.started.is_some()
    }

    /// Baseline the spectrum channel is interpolating from.
    pub fn spectrum_baseline(&self) -> &[f32] {
        &self.previous_spectrum
    }

    /// True while both channels hold at least one point.
    pub fn has_data(&self) -> bool {
        !self.signal.waveform.is_empty() && !self.signal.spectrum.is_empty()
    }

    /// Retargets both channels from one capture frame.
    pub fn retarget(&mut self, waveform: &[i8], fft: &[i8], now: Duration) {
        self.load_waveform(waveform);
        self.load_spectrum(fft);
        self.restart(now);
    }

    pub fn retarget_waveform(&mut self, waveform: &[i8], now: Duration) {
        self.load_waveform(waveform);
        self.restart(now);
    }

    pub fn retarget_spectrum(&mut self, fft: &[i8], now: Duration) {
        self.load_spectrum(fft);
        self.restart(now);
    }

    /// Applies one animation step at eased `fraction`.
    pub fn tick(&mut self, fraction: f32) -> &AnimatedSignal {
        let fraction = fraction.clamp(0.0, 1.0);

        for (value, target) in self.signal.waveform.iter_mut().zip(&self.waveform_target) {
            *value += (target - *value) * fraction;
        }
        for ((value, target), start) in self
            .signal
            .spectrum
            .iter_mut()
            .zip(&self.spectrum_target)
            .zip(&self.previous_spectrum)
        {
            *value = start + (target - start) * fraction;
        }

        &self.signal
    }

    /// Steps the in-flight animation to `now`. Returns true while it is
    /// still running.
    pub fn advance(&mut self, now: Duration) -> bool {
        let Some(started) = self.started else {
            return false;
        };

        let elapsed = now.saturating_sub(started);
        let linear = if self.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
        };
        self.tick(ease_out(linear));

        if linear >= 1.0 {
            self.started = None;
        }
        self.started.is_some()
    }

    /// Drops any in-flight animation, leaving values where they are.
    pub fn cancel(&mut self) {
        self.started = None;
    }

    fn restart(&mut self, now: Duration) {
        self.previous_spectrum.clear();
        self.previous_spectrum.extend_from_slice(&self.signal.spectrum);
        self.started = Some(now);
    }

    fn load_waveform(&mut self, raw: &[i8]) {
        let points = raw.len().min(self.capacity);
        self.waveform_target.clear();
        self.waveform_target
            .extend(raw[..points].iter().map(|&sample| f32::from(sample)));
        self.signal.waveform.resize(points, 0.0);
    }

    fn load_spectrum(&mut self, raw: &[i8]) {
        let points = raw.len().min(self.capacity);
        self.spectrum_target.clear();
        self.spectrum_target
            .extend(raw[..points].iter().map(|&bin| spectrum_target(bin)));
        self.signal.spectrum.resize(points, 0.0);
    }
}

/// Endless full turn, decelerating within every cycle.
#[derive(Debug, Clone)]
pub struct Rotation {
    period: Duration,
    started: Duration,
}

impl Rotation {
    pub fn new(period: Duration, started: Duration) -> Self {
        Self { period, started }
    }

    pub fn angle_at(&self, now: Duration) -> f32 {
        if self.period.is_zero() {
            return 0.0;
        }
        let elapsed = now.saturating_sub(self.started).as_secs_f64();
        let cycle = (elapsed / self.period.as_secs_f64()).fract() as f32;
        let angle = 360.0 * ease_out(cycle);
        if angle >= 360.0 {
            0.0
        } else {
            angle
        }
    }
}
