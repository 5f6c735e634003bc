/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::{Result, VoiceError};

/// Maximum supported FFT frame length. All persistent working buffers are
/// sized against this so reconfiguring the frame size never reallocates.
pub const MAX_FFT_FRAME: usize = 8192;

/// Smallest accepted FFT frame length
const MIN_FFT_FRAME: usize = 64;

/// Shift factors closer to 1.0 than this are treated as a no-op
pub const UNITY_EPSILON: f32 = 1e-3;

/// Supported pitch shift range
pub const MIN_FACTOR: f32 = 0.5;
pub const MAX_FACTOR: f32 = 2.0;

/// Pitch shifter configuration
#[derive(Debug, Clone)]
pub struct PitchConfig {
    /// Whether rendered audio is routed through the shifter at all
    pub enabled: bool,
    /// Shift ratio; 1.0 is a no-op. Clamped to [0.5, 2.0].
    pub factor: f32,
    /// STFT frame length, power of two
    pub fft_frame_size: usize,
    /// Analysis oversampling (quality/cost trade-off). Clamped to [4, 32].
    pub oversampling: usize,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            factor: 1.0,
            fft_frame_size: 2048,
            oversampling: 8,
        }
    }
}

impl PitchConfig {
    /// Validate the FFT frame size. Factor and oversampling are clamped at
    /// construction instead of rejected.
    pub fn validate(&self) -> Result<()> {
        let n = self.fft_frame_size;
        if !n.is_power_of_two() || !(MIN_FFT_FRAME..=MAX_FFT_FRAME).contains(&n) {
            return Err(VoiceError::InvalidFftFrameSize(n, MAX_FFT_FRAME));
        }
        Ok(())
    }
}

/// Streaming STFT phase-vocoder pitch shifter.
///
/// Shifts perceived pitch while preserving duration, operating sample by
/// sample across repeated `process` calls: phase and overlap state carry over
/// between calls, giving a constant-latency transform of
/// `fft_frame_size - fft_frame_size / oversampling` samples.
///
/// All analysis/synthesis math runs in f64 to keep phase-unwrapping error from
/// accumulating over long streams; sample I/O stays f32. Every buffer is
/// allocated at construction; `process` never allocates.
pub struct PitchShifter {
    factor: f32,
    fft_frame_size: usize,
    oversampling: usize,
    sample_rate: u32,

    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,

    /// Raised-cosine analysis/synthesis window, length `fft_frame_size`
    window: Vec<f64>,

    /// Rolling input samples; the rover cursor writes here
    in_fifo: Vec<f64>,
    /// Synthesized samples awaiting output
    out_fifo: Vec<f64>,
    /// Rolling write cursor into the FIFOs
    rover: usize,

    /// Windowed frame handed to the forward transform (mutated in place)
    fft_in: Vec<f64>,
    /// Inverse transform output
    fft_out: Vec<f64>,
    /// Frequency-domain frame, `fft_frame_size / 2 + 1` bins
    spectrum: Vec<Complex<f64>>,
    scratch_fwd: Vec<Complex<f64>>,
    scratch_inv: Vec<Complex<f64>>,

    /// Previous analysis phase per bin
    last_phase: Vec<f64>,
    /// Running synthesis phase accumulator per bin
    sum_phase: Vec<f64>,
    /// Overlap-add accumulator, `2 * MAX_FFT_FRAME`
    output_accum: Vec<f64>,

    ana_magn: Vec<f64>,
    ana_freq: Vec<f64>,
    syn_magn: Vec<f64>,
    syn_freq: Vec<f64>,

    /// Frames transformed since creation (diagnostic)
    frames_processed: u64,
}

impl PitchShifter {
    /// Create a pitch shifter for the given configuration.
    ///
    /// The FFT frame size must be a power of two in `[64, MAX_FFT_FRAME]`;
    /// factor and oversampling outside their supported ranges are clamped.
    pub fn new(config: &PitchConfig, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(VoiceError::InvalidSampleRate(sample_rate));
        }
        config.validate()?;
        let n = config.fft_frame_size;

        let oversampling = config.oversampling.clamp(4, 32);
        if oversampling != config.oversampling {
            log::warn!(
                "oversampling {} out of range, clamped to {oversampling}",
                config.oversampling
            );
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);

        let window = (0..n)
            .map(|k| -0.5 * (TAU * k as f64 / n as f64).cos() + 0.5)
            .collect();

        let spectrum = forward.make_output_vec();
        let scratch_fwd = forward.make_scratch_vec();
        let scratch_inv = inverse.make_scratch_vec();

        let mut shifter = Self {
            factor: 1.0,
            fft_frame_size: n,
            oversampling,
            sample_rate,
            forward,
            inverse,
            window,
            in_fifo: vec![0.0; MAX_FFT_FRAME],
            out_fifo: vec![0.0; MAX_FFT_FRAME],
            rover: 0,
            fft_in: vec![0.0; n],
            fft_out: vec![0.0; n],
            spectrum,
            scratch_fwd,
            scratch_inv,
            last_phase: vec![0.0; MAX_FFT_FRAME / 2 + 1],
            sum_phase: vec![0.0; MAX_FFT_FRAME / 2 + 1],
            output_accum: vec![0.0; 2 * MAX_FFT_FRAME],
            ana_magn: vec![0.0; MAX_FFT_FRAME / 2 + 1],
            ana_freq: vec![0.0; MAX_FFT_FRAME / 2 + 1],
            syn_magn: vec![0.0; MAX_FFT_FRAME / 2 + 1],
            syn_freq: vec![0.0; MAX_FFT_FRAME / 2 + 1],
            frames_processed: 0,
        };
        shifter.set_factor(config.factor);
        Ok(shifter)
    }

    /// Set the shift factor, clamping to the supported range.
    pub fn set_factor(&mut self, factor: f32) {
        let clamped = factor.clamp(MIN_FACTOR, MAX_FACTOR);
        if clamped != factor {
            log::warn!("pitch factor {factor} out of range, clamped to {clamped}");
        }
        self.factor = clamped;
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// True when the configured factor makes processing a no-op.
    pub fn is_noop(&self) -> bool {
        (self.factor - 1.0).abs() < UNITY_EPSILON
    }

    /// Transform latency in samples
    pub fn latency_samples(&self) -> usize {
        self.fft_frame_size - self.fft_frame_size / self.oversampling
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Clear all phase, overlap and FIFO state.
    ///
    /// Must be called when the shifter is rebound to a different participant
    /// or when playback resumes after starvation; stale phase history would
    /// otherwise color the first frames of new audio.
    pub fn reset(&mut self) {
        self.in_fifo.fill(0.0);
        self.out_fifo.fill(0.0);
        self.last_phase.fill(0.0);
        self.sum_phase.fill(0.0);
        self.output_accum.fill(0.0);
        self.ana_magn.fill(0.0);
        self.ana_freq.fill(0.0);
        self.syn_magn.fill(0.0);
        self.syn_freq.fill(0.0);
        self.rover = 0;
    }

    /// Pitch-shift `data` in place.
    ///
    /// Fast-paths to an exact no-op when the factor is within epsilon of 1.0.
    pub fn process(&mut self, data: &mut [f32]) {
        if self.is_noop() {
            return;
        }

        let latency = self.latency_samples();
        if self.rover == 0 {
            self.rover = latency;
        }

        for sample in data.iter_mut() {
            self.in_fifo[self.rover] = *sample as f64;
            *sample = self.out_fifo[self.rover - latency] as f32;
            self.rover += 1;

            if self.rover >= self.fft_frame_size {
                self.rover = latency;
                self.process_frame();
            }
        }
    }

    /// One analysis/synthesis cycle over a full input frame.
    fn process_frame(&mut self) {
        let n = self.fft_frame_size;
        let half = n / 2;
        let step = n / self.oversampling;
        let freq_per_bin = self.sample_rate as f64 / n as f64;
        // Expected phase advance per hop for each bin
        let expected = TAU * step as f64 / n as f64;
        let factor = self.factor as f64;

        for k in 0..n {
            self.fft_in[k] = self.in_fifo[k] * self.window[k];
        }
        if let Err(e) =
            self.forward
                .process_with_scratch(&mut self.fft_in, &mut self.spectrum, &mut self.scratch_fwd)
        {
            log::error!("forward FFT failed: {e}");
            return;
        }

        // Analysis: true instantaneous frequency per bin from the unwrapped
        // phase difference against the previous frame.
        for k in 0..=half {
            let magn = self.spectrum[k].norm();
            let phase = self.spectrum[k].arg();

            let mut delta = phase - self.last_phase[k];
            self.last_phase[k] = phase;

            delta -= k as f64 * expected;

            // Map into the principal value range (-PI, PI]
            let mut qpd = (delta / PI) as i64;
            if qpd >= 0 {
                qpd += qpd & 1;
            } else {
                qpd -= qpd & 1;
            }
            delta -= PI * qpd as f64;

            let deviation = self.oversampling as f64 * delta / TAU;
            self.ana_magn[k] = magn;
            self.ana_freq[k] = (k as f64 + deviation) * freq_per_bin;
        }

        // Pitch shift: remap analysis bins onto synthesis bins, accumulating
        // magnitude and scaling frequency. Bins past Nyquist are discarded.
        self.syn_magn[..=half].fill(0.0);
        self.syn_freq[..=half].fill(0.0);
        for k in 0..=half {
            let target = (k as f64 * factor).round() as usize;
            if target <= half {
                self.syn_magn[target] += self.ana_magn[k];
                self.syn_freq[target] = self.ana_freq[k] * factor;
            }
        }

        // Synthesis: integrate the shifted frequencies back into running
        // phases and rebuild the spectrum.
        for k in 0..=half {
            let mut advance = self.syn_freq[k] - k as f64 * freq_per_bin;
            advance /= freq_per_bin;
            advance = TAU * advance / self.oversampling as f64;
            advance += k as f64 * expected;
            self.sum_phase[k] += advance;

            self.spectrum[k] = Complex::from_polar(self.syn_magn[k], self.sum_phase[k]);
        }
        // The real inverse transform requires purely real DC and Nyquist bins.
        self.spectrum[0].im = 0.0;
        self.spectrum[half].im = 0.0;

        if let Err(e) =
            self.inverse
                .process_with_scratch(&mut self.spectrum, &mut self.fft_out, &mut self.scratch_inv)
        {
            log::error!("inverse FFT failed: {e}");
            return;
        }

        // Overlap-add. The unnormalized inverse reconstructs the windowed
        // frame at amplitude n from the half spectrum; the rest of the factor
        // compensates the analysis window overlap.
        let norm = 1.0 / (half as f64 * self.oversampling as f64);
        for k in 0..n {
            self.output_accum[k] += self.window[k] * self.fft_out[k] * norm;
        }
        self.out_fifo[..step].copy_from_slice(&self.output_accum[..step]);

        // Shift the accumulator and input FIFO left by one hop. Entries past
        // `n` in the accumulator are never written, so zeros shift in.
        self.output_accum.copy_within(step..step + n, 0);
        self.in_fifo.copy_within(step..n, 0);

        self.frames_processed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, frequency: f64, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                ((TAU * frequency * t).sin() * 0.5) as f32
            })
            .collect()
    }

    /// Goertzel power of `samples` at `frequency`.
    fn goertzel_power(samples: &[f32], frequency: f64, sample_rate: u32) -> f64 {
        let omega = TAU * frequency / sample_rate as f64;
        let coeff = 2.0 * omega.cos();
        let mut s_prev = 0.0f64;
        let mut s_prev2 = 0.0f64;
        for &x in samples {
            let s = x as f64 + coeff * s_prev - s_prev2;
            s_prev2 = s_prev;
            s_prev = s;
        }
        s_prev2 * s_prev2 + s_prev * s_prev - coeff * s_prev * s_prev2
    }

    /// Scan integer frequencies for the dominant component.
    fn dominant_frequency(samples: &[f32], sample_rate: u32, lo: u32, hi: u32) -> u32 {
        let mut best_freq = lo;
        let mut best_power = f64::MIN;
        for f in lo..=hi {
            let p = goertzel_power(samples, f as f64, sample_rate);
            if p > best_power {
                best_power = p;
                best_freq = f;
            }
        }
        best_freq
    }

    fn shifter(factor: f32) -> PitchShifter {
        let config = PitchConfig {
            enabled: true,
            factor,
            fft_frame_size: 2048,
            oversampling: 8,
        };
        PitchShifter::new(&config, 48000).unwrap()
    }

    #[test]
    fn test_invalid_fft_size_rejected() {
        let mut config = PitchConfig {
            fft_frame_size: 1000,
            ..PitchConfig::default()
        };
        assert!(PitchShifter::new(&config, 48000).is_err());

        config.fft_frame_size = 16384;
        assert!(PitchShifter::new(&config, 48000).is_err());

        config.fft_frame_size = 2048;
        assert!(PitchShifter::new(&config, 0).is_err());
        assert!(PitchShifter::new(&config, 48000).is_ok());
    }

    #[test]
    fn test_factor_clamped_to_supported_range() {
        let mut shifter = shifter(3.0);
        assert_eq!(shifter.factor(), 2.0);

        shifter.set_factor(0.1);
        assert_eq!(shifter.factor(), 0.5);
    }

    #[test]
    fn test_unity_factor_is_exact_noop() {
        let mut shifter = shifter(1.0);
        let original = sine(4096, 440.0, 48000);
        let mut data = original.clone();

        shifter.process(&mut data);
        assert_eq!(data, original);
        assert!(shifter.is_noop());
        assert_eq!(shifter.frames_processed(), 0);
    }

    #[test]
    fn test_octave_up_moves_dominant_frequency() {
        let mut shifter = shifter(2.0);
        let mut data = sine(48000, 440.0, 48000);

        for chunk in data.chunks_mut(480) {
            shifter.process(chunk);
        }

        // Skip the transform latency plus settling time before measuring.
        let settled = &data[3 * shifter.latency_samples()..];
        let dominant = dominant_frequency(&settled[..9600], 48000, 200, 1600);
        assert!(
            (dominant as i64 - 880).unsigned_abs() <= 5,
            "expected ~880 Hz, measured {dominant} Hz"
        );
    }

    #[test]
    fn test_round_trip_restores_dominant_frequency() {
        // 440 Hz through x2.0 then x0.5 should land back within a few Hz.
        let mut up = shifter(2.0);
        let mut down = shifter(0.5);
        let mut data = sine(48000, 440.0, 48000);

        for chunk in data.chunks_mut(480) {
            up.process(chunk);
            down.process(chunk);
        }

        let settled = &data[3 * (up.latency_samples() + down.latency_samples())..];
        let dominant = dominant_frequency(&settled[..9600], 48000, 100, 1000);
        assert!(
            (dominant as i64 - 440).unsigned_abs() <= 5,
            "expected ~440 Hz after round trip, measured {dominant} Hz"
        );
    }

    #[test]
    fn test_reset_clears_pending_output() {
        let mut shifter = shifter(1.5);
        let mut data = sine(8192, 440.0, 48000);
        shifter.process(&mut data);
        assert!(shifter.frames_processed() > 0);

        shifter.reset();

        // With cleared FIFOs the first latency's worth of output is silence.
        let mut resumed = sine(512, 440.0, 48000);
        shifter.process(&mut resumed);
        assert!(resumed.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_full_scale_input_does_not_clip() {
        // A hot but in-range voice signal must come out no louder than it
        // went in, or the device will clip it.
        let mut shifter = shifter(1.01);
        let mut data: Vec<f32> = sine(48000, 440.0, 48000)
            .iter()
            .map(|s| s * 1.8)
            .collect();
        for chunk in data.chunks_mut(480) {
            shifter.process(chunk);
        }

        let settled = &data[2 * shifter.latency_samples()..];
        let peak = settled.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak <= 0.9, "output peak {peak} exceeds input peak 0.9");
        assert!(peak > 0.3, "output peak {peak} suspiciously quiet");
    }

    #[test]
    fn test_output_stays_bounded() {
        let mut shifter = shifter(1.3);
        let mut data = sine(48000, 300.0, 48000);
        for chunk in data.chunks_mut(960) {
            shifter.process(chunk);
        }
        assert!(data.iter().all(|s| s.abs() <= 1.5));
        assert!(data.iter().any(|&s| s.abs() > 0.01));
    }
}
