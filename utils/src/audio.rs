use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree};

pub fn create_resampler(in_sampling_rate: f64, out_sampling_rate: f64, chunk_size: usize) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1
    )?;
    Ok(resampler)
}

pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples.chunks(chunk_size).map(|chunk| {
        let mut chunk = chunk.to_vec();
        chunk.resize(chunk_size, 0.0);
        chunk
    }).collect()
}

pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Playback length in seconds of a mono sample buffer at the given rate.
pub fn duration_secs(samples: usize, sample_rate: f64) -> f64 {
    samples as f64 / sample_rate
}

pub fn decode(fragment: &str) -> Vec<f32> {
    if let Ok(pcm16) = base64::engine::general_purpose::STANDARD.decode(fragment) {
        pcm16.chunks_exact(2).map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / i16::MAX as f32).clamp(-1.0, 1.0)
        }).collect()
    } else {
        tracing::error!("Failed to decode base64 fragment");
        Vec::new()
    }
}

pub fn encode(pcm32: &[f32]) -> String {
    let pcm16: Vec<u8> = pcm32.iter().flat_map(|&sample| {
        ((sample * i16::MAX as f32) as i16).clamp(i16::MIN, i16::MAX).to_le_bytes().to_vec()
    }).collect();
    base64::engine::general_purpose::STANDARD.encode(&pcm16)
}
