use std::{collections::VecDeque, f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::AudioConfig, particle::WAVEFORM_CENTER, Result, VisualiserError};

/// Turns a stream of samples into the byte spectrum and waveform frames the
/// particle controller consumes.
///
/// Frequency data is windowed with a Blackman window, normalised by the
/// transform size, smoothed exponentially between calls and mapped from
/// `[min_db, max_db]` onto `0..=255`. Both frame kinds hold `fft_size / 2`
/// entries.
pub struct Analyser {
    fft_size: usize,
    smoothing_time_constant: f32,
    min_db: f32,
    max_db: f32,
    samples: VecDeque<f32>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    fft: FftResources,
}

impl Analyser {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let fft_size = config.fft_size;
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(VisualiserError::config(format!(
                "fft_size must be a power of two of at least 2, got {fft_size}"
            )));
        }

        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let fft = FftResources {
            input: plan.make_input_vec(),
            spectrum: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            plan,
        };

        Ok(Self {
            fft_size,
            smoothing_time_constant: config.smoothing_time_constant,
            min_db: config.min_db,
            max_db: config.max_db,
            samples: std::iter::repeat(0.0).take(fft_size).collect(),
            window: (0..fft_size).map(|n| blackman_value(n, fft_size)).collect(),
            smoothed: vec![0.0; fft_size / 2],
            fft,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Appends samples, keeping only the most recent `fft_size` of them.
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Err(VisualiserError::InvalidInput(
                "analysis requires at least one sample",
            ));
        }

        let keep = samples.len().min(self.fft_size);
        let overflow = (self.samples.len() + keep).saturating_sub(self.fft_size);
        self.samples.drain(..overflow);
        self.samples.extend(&samples[samples.len() - keep..]);
        Ok(())
    }

    /// Forgets buffered samples and smoothing state.
    pub fn reset(&mut self) {
        self.samples.iter_mut().for_each(|sample| *sample = 0.0);
        self.smoothed.fill(0.0);
    }

    /// Writes the current spectrum into `out` and advances the smoothing state.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<()> {
        if out.len() != self.bin_count() {
            return Err(VisualiserError::InvalidInput(
                "frequency buffer must hold fft_size / 2 bins",
            ));
        }

        for ((slot, sample), weight) in self
            .fft
            .input
            .iter_mut()
            .zip(&self.samples)
            .zip(&self.window)
        {
            *slot = sample * weight;
        }

        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;

        let scale = 1.0 / self.fft_size as f32;
        let tau = self.smoothing_time_constant;
        let range = self.max_db - self.min_db;
        for ((byte, smoothed), bin) in out
            .iter_mut()
            .zip(self.smoothed.iter_mut())
            .zip(&self.fft.spectrum)
        {
            *smoothed = tau * *smoothed + (1.0 - tau) * bin.norm() * scale;
            let db = 20.0 * smoothed.log10();
            *byte = if db.is_finite() {
                (255.0 * (db - self.min_db) / range).clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }

        Ok(())
    }

    /// Writes the most recent `out.len()` samples as bytes centred on 128.
    pub fn byte_time_domain_data(&self, out: &mut [u8]) -> Result<()> {
        if out.len() > self.fft_size {
            return Err(VisualiserError::InvalidInput(
                "waveform buffer exceeds the analysis window",
            ));
        }

        let start = self.fft_size - out.len();
        for (byte, sample) in out.iter_mut().zip(self.samples.range(start..)) {
            *byte = (WAVEFORM_CENTER * (1.0 + sample)).clamp(0.0, 255.0) as u8;
        }
        Ok(())
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing_time_constant", &self.smoothing_time_constant)
            .field("min_db", &self.min_db)
            .field("max_db", &self.max_db)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    let phase = 2.0 * PI * index as f32 / len as f32;
    a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser() -> Analyser {
        Analyser::new(&AudioConfig::default()).unwrap()
    }

    fn sine(bin: usize, amplitude: f32, len: usize) -> Vec<f32> {
        let config = AudioConfig::default();
        let hz = config.frequency_hz(bin);
        (0..len)
            .map(|n| amplitude * (2.0 * PI * hz * n as f32 / config.sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero_spectrum_and_centred_waveform() {
        let mut analyser = analyser();
        analyser.push_samples(&[0.0; 735]).unwrap();

        let mut spectrum = vec![255; 256];
        analyser.byte_frequency_data(&mut spectrum).unwrap();
        assert!(spectrum.iter().all(|&bin| bin == 0));

        let mut waveform = vec![0; 256];
        analyser.byte_time_domain_data(&mut waveform).unwrap();
        assert!(waveform.iter().all(|&sample| sample == 128));
    }

    #[test]
    fn sine_peaks_in_its_bin() {
        let mut analyser = analyser();
        let mut spectrum = vec![0; 256];
        for _ in 0..4 {
            analyser.push_samples(&sine(40, 0.08, 512)).unwrap();
            analyser.byte_frequency_data(&mut spectrum).unwrap();
        }

        let loudest = (0..spectrum.len()).max_by_key(|&bin| spectrum[bin]).unwrap();
        assert_eq!(loudest, 40);
        assert!(spectrum[40] > 200);
        assert!(spectrum[120] < spectrum[40] / 2);
    }

    #[test]
    fn waveform_bytes_follow_recent_samples() {
        let mut analyser = analyser();
        analyser.push_samples(&[1.0; 512]).unwrap();
        analyser.push_samples(&[-0.5; 4]).unwrap();

        let mut waveform = vec![0; 8];
        analyser.byte_time_domain_data(&mut waveform).unwrap();
        assert_eq!(&waveform[..4], &[255; 4]);
        assert_eq!(&waveform[4..], &[64; 4]);
    }

    #[test]
    fn rejects_bad_buffers() {
        let mut analyser = analyser();
        assert!(analyser.push_samples(&[]).is_err());
        assert!(analyser.byte_frequency_data(&mut [0; 10]).is_err());
        assert!(analyser.byte_time_domain_data(&mut [0; 1024]).is_err());
    }

    #[test]
    fn reset_clears_smoothing_history() {
        let mut analyser = analyser();
        let mut spectrum = vec![0; 256];
        analyser.push_samples(&sine(10, 1.0, 512)).unwrap();
        analyser.byte_frequency_data(&mut spectrum).unwrap();
        assert!(spectrum[10] > 0);

        analyser.reset();
        analyser.byte_frequency_data(&mut spectrum).unwrap();
        assert!(spectrum.iter().all(|&bin| bin == 0));
    }
}
