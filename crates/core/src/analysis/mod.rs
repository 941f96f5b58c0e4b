use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{Result, VisualizerError};

/// Compensates the amplitude lost to the Hann window.
const WINDOW_GAIN: f32 = 2.0;

/// Converts signed 8-bit waveform captures into the 8-bit spectrum layout the
/// platform tap delivers: `[dc_re, nyquist_re, re1, im1, re2, im2, ...]`, one
/// byte per slot and as many bytes as waveform samples.
pub struct FftQuantizer {
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl FftQuantizer {
    pub fn new() -> Self {
        Self {
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    /// Fills `out` with the quantised spectrum of `waveform`.
    pub fn quantize(&mut self, waveform: &[i8], out: &mut [i8]) -> Result<()> {
        let len = waveform.len();
        if len < 2 || len % 2 != 0 {
            return Err(VisualizerError::msg(
                "spectrum quantisation requires an even block of at least two samples",
            ));
        }
        if out.len() != len {
            return Err(VisualizerError::msg(format!(
                "spectrum buffer holds {} bytes but the waveform has {len}",
                out.len()
            )));
        }

        let fft = self.prepare_fft(len);
        for (index, sample) in waveform.iter().enumerate() {
            fft.input[index] = f32::from(*sample) / 128.0 * hann_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| VisualizerError::Capture(err.to_string()))?;

        let half = len / 2;
        let scale = WINDOW_GAIN * 128.0 / half as f32;
        let quantize = |value: f32| (value * scale).round().clamp(-128.0, 127.0) as i8;

        out[0] = quantize(fft.spectrum[0].re);
        out[1] = quantize(fft.spectrum[half].re);
        for bin in 1..half {
            out[2 * bin] = quantize(fft.spectrum[bin].re);
            out[2 * bin + 1] = quantize(fft.spectrum[bin].im);
        }
        Ok(())
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        let rebuild = self
            .fft
            .as_ref()
            .map(|fft| fft.size != size)
            .unwrap_or(true);
        if rebuild {
            self.fft = None;
        }

        let planner = &mut self.fft_planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            let scratch = plan.make_scratch_vec();
            let spectrum = plan.make_output_vec();
            let input = plan.make_input_vec();
            FftResources {
                size,
                plan,
                scratch,
                spectrum,
                input,
            }
        })
    }
}

impl Default for FftQuantizer {
    fn default() -> Self {
        Self::new()
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for FftQuantizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftQuantizer")
            .field("size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

/// Magnitude of spectrum bin `k` from the interleaved byte layout.
pub fn bin_magnitude(fft: &[i8], k: usize) -> f32 {
    let half = fft.len() / 2;
    match k {
        0 => f32::from(fft[0]).abs(),
        k if k == half => f32::from(fft[1]).abs(),
        k if k < half => f32::from(fft[2 * k]).hypot(f32::from(fft[2 * k + 1])),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, cycles: f32, amplitude: f32) -> Vec<i8> {
        (0..len)
            .map(|i| {
                let phase = 2.0 * PI * cycles * i as f32 / len as f32;
                (phase.sin() * amplitude).round() as i8
            })
            .collect()
    }

    #[test]
    fn silence_produces_an_empty_spectrum() {
        let mut quantizer = FftQuantizer::new();
        let mut out = vec![1_i8; 64];
        quantizer.quantize(&[0; 64], &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn tone_peaks_in_its_bin() {
        let mut quantizer = FftQuantizer::new();
        let waveform = sine(256, 8.0, 100.0);
        let mut out = vec![0_i8; 256];
        quantizer.quantize(&waveform, &mut out).unwrap();

        let peak = (1..128)
            .max_by(|a, b| {
                bin_magnitude(&out, *a)
                    .partial_cmp(&bin_magnitude(&out, *b))
                    .unwrap()
            })
            .unwrap();
        assert_eq!(peak, 8);
        assert!(bin_magnitude(&out, 8) > 40.0);
    }

    #[test]
    fn rejects_mismatched_buffers() {
        let mut quantizer = FftQuantizer::new();
        let mut out = vec![0_i8; 32];
        assert!(quantizer.quantize(&[0; 64], &mut out).is_err());
        assert!(quantizer.quantize(&[0; 3], &mut out[..3]).is_err());
    }
}
