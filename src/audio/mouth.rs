//! Mouth-openness envelope derived from decoded speech amplitude.

use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// RMS scale applied before the response curve; speech RMS rarely exceeds 0.25.
const RMS_GAIN: f32 = 4.0;
/// Response curve exponent; opens the mouth more readily at low levels.
const CURVE: f32 = 0.8;

/// Per-frame openness values for one segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MouthEnvelope {
    pub fps: u32,
    /// Openness per frame, each in `[0, 1]`.
    pub levels: Vec<f32>,
    /// Audio duration, `None` when the audio could not be decoded.
    pub duration: Option<Duration>,
}

impl MouthEnvelope {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Decode WAV `audio` and compute one openness value per `1/fps` seconds.
///
/// Undecodable audio yields an empty envelope with unknown duration.
pub fn mouth_envelope(audio: &[u8], fps: u32) -> MouthEnvelope {
    let fps = fps.max(1);
    let empty = MouthEnvelope {
        fps,
        ..MouthEnvelope::default()
    };
    let mut reader = match hound::WavReader::new(Cursor::new(audio)) {
        Ok(r) => r,
        Err(e) => {
            debug!("mouth envelope skipped, audio is not WAV: {e}");
            return empty;
        }
    };
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().filter_map(|s| s.ok()).collect(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
            reader
                .samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / scale)
                .collect()
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let rate = spec.sample_rate.max(1);
    let frames = samples.len() / channels;
    let duration = Duration::from_secs_f64(frames as f64 / f64::from(rate));
    let window = ((rate / fps).max(1) as usize) * channels;

    let levels = samples
        .chunks(window)
        .map(|chunk| {
            let mean_sq = chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32;
            (mean_sq.sqrt() * RMS_GAIN).clamp(0.0, 1.0).powf(CURVE)
        })
        .collect();

    MouthEnvelope {
        fps,
        levels,
        duration: Some(duration),
    }
}
