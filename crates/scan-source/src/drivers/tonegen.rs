//! Synthetic tone generator.
//!
//! Produces `amplitude * exp(j * phase)` advancing by
//! `2 * pi * tone_frequency / sample_rate` per sample, plus circular complex
//! Gaussian noise with standard deviation `noise_level`. Phase carries over
//! between reads, so consecutive windows join without a discontinuity.

use std::f64::consts::{PI, TAU};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use scan_core::Sample;
use tracing::info;

use super::pacer::Pacer;
use crate::{Result, SampleSource, SourceCapabilities, SourceDriver, SourceError, SourceParams};

/// Endless test signal; useful without hardware and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToneGenDriver;

impl SourceDriver for ToneGenDriver {
    fn name(&self) -> &'static str {
        "tonegen"
    }

    fn description(&self) -> &'static str {
        "Synthetic complex tone with Gaussian noise"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::INFINITE | SourceCapabilities::THROTTLE
    }

    fn open(&self, params: &SourceParams) -> Result<Box<dyn SampleSource>> {
        let sample_rate = super::check_sample_rate(params.sample_rate)?;
        if !params.tone_frequency.is_finite() || params.tone_frequency.abs() > sample_rate / 2.0 {
            return Err(SourceError::Config(format!(
                "tone_frequency {} Hz is outside +/- {} Hz",
                params.tone_frequency,
                sample_rate / 2.0
            )));
        }
        if params.noise_level.is_nan() || params.noise_level < 0.0 || !params.amplitude.is_finite() {
            return Err(SourceError::Config(
                "amplitude must be finite and noise_level non-negative".into(),
            ));
        }

        let rng = match params.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        info!(
            sample_rate,
            tone_frequency = params.tone_frequency,
            amplitude = params.amplitude,
            noise_level = params.noise_level,
            seeded = params.seed.is_some(),
            "Tone generator opened"
        );

        Ok(Box::new(ToneGenerator {
            rng,
            phase: 0.0,
            step: TAU * params.tone_frequency / sample_rate,
            amplitude: params.amplitude,
            noise_level: params.noise_level,
            sample_rate,
            frequency: params.frequency,
            pacer: params.throttle.then(|| Pacer::new(sample_rate)),
            closed: false,
        }))
    }
}

struct ToneGenerator {
    rng: ChaCha8Rng,
    phase: f64,
    step: f64,
    amplitude: f32,
    noise_level: f32,
    sample_rate: f64,
    frequency: f64,
    pacer: Option<Pacer>,
    closed: bool,
}

impl ToneGenerator {
    /// One pair of independent standard normals (Box-Muller).
    fn gaussian_pair(&mut self) -> (f32, f32) {
        // Open interval (0, 1] keeps ln() finite.
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = TAU * u2;
        ((r * theta.cos()) as f32, (r * theta.sin()) as f32)
    }
}

impl SampleSource for ToneGenerator {
    fn read(&mut self, dst: &mut [Sample]) -> Result<usize> {
        if self.closed {
            return Ok(0);
        }

        // Each component gets half the noise power.
        let sigma = self.noise_level * std::f32::consts::FRAC_1_SQRT_2;
        for slot in dst.iter_mut() {
            let tone = Sample::from_polar(self.amplitude, self.phase as f32);
            let noise = if sigma > 0.0 {
                let (ni, nq) = self.gaussian_pair();
                Sample::new(ni * sigma, nq * sigma)
            } else {
                Sample::default()
            };
            *slot = tone + noise;

            self.phase += self.step;
            if self.phase >= PI {
                self.phase -= TAU;
            } else if self.phase < -PI {
                self.phase += TAU;
            }
        }

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.pace(dst.len());
        }
        Ok(dst.len())
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn frequency(&self) -> f64 {
        self.frequency
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(noise_level: f32) -> SourceParams {
        SourceParams {
            sample_rate: 48_000.0,
            tone_frequency: 1_000.0,
            amplitude: 0.5,
            noise_level,
            seed: Some(7),
            ..SourceParams::default()
        }
    }

    #[test]
    fn test_clean_tone_has_constant_magnitude() {
        let mut source = ToneGenDriver.open(&params(0.0)).unwrap();
        let mut dst = vec![Sample::default(); 1000];
        assert_eq!(source.read(&mut dst).unwrap(), 1000);
        for s in &dst {
            assert!((s.norm() - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_phase_continuous_across_reads() {
        let mut one = ToneGenDriver.open(&params(0.0)).unwrap();
        let mut whole = vec![Sample::default(); 200];
        one.read(&mut whole).unwrap();

        let mut two = ToneGenDriver.open(&params(0.0)).unwrap();
        let mut first = vec![Sample::default(); 73];
        let mut second = vec![Sample::default(); 127];
        two.read(&mut first).unwrap();
        two.read(&mut second).unwrap();

        let joined: Vec<Sample> = first.into_iter().chain(second).collect();
        for (a, b) in whole.iter().zip(&joined) {
            assert!((a - b).norm() < 1e-5);
        }
    }

    #[test]
    fn test_same_seed_same_noise() {
        let mut a = ToneGenDriver.open(&params(0.1)).unwrap();
        let mut b = ToneGenDriver.open(&params(0.1)).unwrap();
        let mut da = vec![Sample::default(); 64];
        let mut db = vec![Sample::default(); 64];
        a.read(&mut da).unwrap();
        b.read(&mut db).unwrap();
        assert_eq!(da, db);
    }

    #[test]
    fn test_noise_power_matches_level() {
        let mut source = ToneGenDriver
            .open(&SourceParams {
                amplitude: 0.0,
                ..params(0.2)
            })
            .unwrap();
        let mut dst = vec![Sample::default(); 50_000];
        source.read(&mut dst).unwrap();

        let power = dst.iter().map(|s| s.norm_sqr()).sum::<f32>() / dst.len() as f32;
        assert!((power - 0.04).abs() < 0.004, "power = {power}");
    }

    #[test]
    fn test_tone_above_nyquist_rejected() {
        let result = ToneGenDriver.open(&SourceParams {
            tone_frequency: 30_000.0,
            ..params(0.0)
        });
        assert!(matches!(result, Err(SourceError::Config(_))));
    }
}
