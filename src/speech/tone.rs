//! Acknowledgment beep played when a trigger is accepted.

use std::f32::consts::PI;
use std::io::Cursor;

use super::synthesizer::SpeechError;

const RATE: u32 = 16_000;
const FREQ_HZ: f32 = 880.0;
const DURATION_SECS: f32 = 0.15;
const AMPLITUDE: f32 = 24_000.0;

/// A short 880 Hz sine beep as 16-bit mono WAV bytes.
pub fn ack_tone() -> Result<Vec<u8>, SpeechError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_err)?;
        let n = (RATE as f32 * DURATION_SECS) as u32;
        for i in 0..n {
            let t = i as f32 / RATE as f32;
            let sample = AMPLITUDE * (2.0 * PI * FREQ_HZ * t).sin();
            writer.write_sample(sample as i16).map_err(wav_err)?;
        }
        writer.finalize().map_err(wav_err)?;
    }
    Ok(cursor.into_inner())
}

fn wav_err(e: hound::Error) -> SpeechError {
    SpeechError::Failed(format!("beep encoding: {e}"))
}
