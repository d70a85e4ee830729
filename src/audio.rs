use std::path::Path;

use anyhow::Context;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Sample rate of generated silence.
pub const SILENCE_SAMPLE_RATE: u32 = 22_050;

pub fn wav_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open WAV {}", path.display()))?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

/// Write a mono 16-bit silent WAV of `seconds` length.
pub fn write_silence(path: &Path, seconds: f64, sample_rate: u32) -> anyhow::Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let frames = (seconds.max(0.0) * sample_rate as f64).round() as u64;
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create WAV {}", path.display()))?;
    for _ in 0..frames {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Concatenate WAV files in order into `output`.
///
/// All inputs must share one format. Returns the measured length of the
/// result in seconds.
pub fn concat_wavs(inputs: &[&Path], output: &Path) -> anyhow::Result<f64> {
    let first = inputs.first().context("no WAV inputs to concatenate")?;
    let spec = WavReader::open(first)
        .with_context(|| format!("failed to open WAV {}", first.display()))?
        .spec();

    let mut writer = WavWriter::create(output, spec)
        .with_context(|| format!("failed to create WAV {}", output.display()))?;
    let mut samples = 0u64;
    for input in inputs {
        let mut reader = WavReader::open(input)
            .with_context(|| format!("failed to open WAV {}", input.display()))?;
        if reader.spec() != spec {
            anyhow::bail!(
                "WAV {} has format {:?}, expected {:?}",
                input.display(),
                reader.spec(),
                spec
            );
        }
        match spec.sample_format {
            SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    writer.write_sample(sample?)?;
                    samples += 1;
                }
            }
            SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    writer.write_sample(sample?)?;
                    samples += 1;
                }
            }
        }
    }
    writer.finalize()?;
    Ok(samples as f64 / spec.channels as f64 / spec.sample_rate as f64)
}
