/// Convert interleaved audio between channel counts.
///
/// - same count: passthrough
/// - to mono: average of all channels per frame
/// - from mono: the mono sample duplicated into every output channel
/// - otherwise: the first `to` channels, padding missing ones with silence
pub fn remap_channels(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    if to == 1 {
        return downmix_to_mono(samples, from);
    }

    let frame_count = samples.len() / from;
    let mut out = Vec::with_capacity(frame_count * to);
    for frame in samples.chunks_exact(from) {
        if from == 1 {
            out.extend(std::iter::repeat_n(frame[0], to));
        } else {
            for ch in 0..to {
                out.push(frame.get(ch).copied().unwrap_or(0.0));
            }
        }
    }
    out
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}
