//! Creative effects for adventurous transitions
//!
//! Beyond the bread-and-butter EQ and tails: a flanger for jet-swoosh
//! exits, a phaser for psychedelic passages, beat repeat for stutter
//! buildups, and a rhythmic gate for choppy energy. None of these are on the
//! default transition paths; plans opt into them.

/// Apply a flanger effect
///
/// Mixes the signal with a copy whose delay oscillates between 1 and 10 ms,
/// producing the classic sweeping jet sound.
///
/// # Arguments
/// * `rate` - LFO rate in Hz (0.1-5)
/// * `depth` - Modulation depth (0-1)
/// * `mix` - Wet/dry ratio (0-1)
/// * `feedback` - Amount of wet signal fed back (0-0.9)
pub fn apply_flanger(
    samples: &[f32],
    rate: f32,
    depth: f32,
    mix: f32,
    feedback: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }

    let min_delay = (0.001 * sample_rate as f32) as usize;
    let max_delay = (0.010 * sample_rate as f32) as usize;
    let range = (max_delay - min_delay) as f32;
    let feedback = feedback.clamp(0.0, 0.9);
    let mix = mix.clamp(0.0, 1.0);

    let mut output = vec![0.0f32; n];
    let mut wet_history = vec![0.0f32; n];

    for i in 0..n {
        let lfo = ((2.0 * std::f32::consts::PI * rate * i as f32 / sample_rate as f32).sin()
            + 1.0)
            / 2.0;
        let delay = min_delay + (lfo * range * depth.clamp(0.0, 1.0)) as usize;

        if i >= delay {
            let delayed = samples[i - delay] + wet_history[i - delay] * feedback;
            output[i] = samples[i] * (1.0 - mix) + delayed * mix;
            wet_history[i] = delayed;
        } else {
            output[i] = samples[i];
        }
    }

    output
}

/// Apply a phaser effect
///
/// Runs the signal through a cascade of all-pass stages whose corner
/// frequency sweeps between 200 Hz and 2 kHz under an LFO.
pub fn apply_phaser(
    samples: &[f32],
    rate: f32,
    stages: usize,
    depth: f32,
    mix: f32,
    feedback: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }

    // Even stage counts between 2 and 12
    let stages = stages.clamp(2, 12) & !1;
    let mix = mix.clamp(0.0, 1.0);
    let feedback = feedback.clamp(0.0, 0.9);
    let depth = depth.clamp(0.0, 1.0);

    let (min_freq, max_freq) = (200.0f32, 2000.0f32);
    let mut states = vec![0.0f32; stages];
    let mut output = vec![0.0f32; n];
    let mut fb_sample = 0.0f32;

    for i in 0..n {
        let lfo = ((2.0 * std::f32::consts::PI * rate * i as f32 / sample_rate as f32).sin()
            + 1.0)
            / 2.0
            * depth;
        let freq = min_freq + lfo * (max_freq - min_freq);
        let tan = (std::f32::consts::PI * freq / sample_rate as f32).tan();
        let coefficient = (1.0 - tan) / (1.0 + tan);

        let mut processed = samples[i] + fb_sample * feedback;
        for state in states.iter_mut() {
            // First-order all-pass: y = -a*x + x[n-1] + a*y[n-1]
            let new_state = -coefficient * processed + *state;
            processed = coefficient * new_state + processed;
            *state = new_state;
        }
        fb_sample = processed;

        output[i] = samples[i] * (1.0 - mix) + processed * mix;
    }

    output
}

/// Apply a beat-repeat (stutter) effect
///
/// Captures a slice at `start_time` and repeats it, optionally decaying per
/// repeat. Great under a buildup.
///
/// # Arguments
/// * `repeat_length_beats` - Slice length as a beat fraction (0.125-1.0)
/// * `repeats` - Number of repetitions
/// * `decay` - Volume lost per repeat (0-0.5)
pub fn apply_beat_repeat(
    samples: &[f32],
    bpm: f32,
    repeat_length_beats: f32,
    repeats: usize,
    start_time: f32,
    decay: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let beat_samples = crate::audio::samples_per_beat(bpm, sample_rate);
    let slice_len = (beat_samples as f32 * repeat_length_beats.clamp(0.125, 1.0)) as usize;
    if slice_len < 100 {
        return samples.to_vec();
    }

    let start = (start_time * sample_rate as f32) as usize;
    if start + slice_len > samples.len() {
        return samples.to_vec();
    }

    let mut output = samples.to_vec();
    let slice: Vec<f32> = samples[start..start + slice_len].to_vec();

    for r in 0..repeats {
        let level = (1.0 - decay.clamp(0.0, 0.5) * r as f32).max(0.1);
        let pos = start + r * slice_len;
        if pos >= output.len() {
            break;
        }
        let end = (pos + slice_len).min(output.len());
        for (k, sample) in output[pos..end].iter_mut().enumerate() {
            *sample = slice[k] * level;
        }
    }

    output
}

/// Apply a rhythmic gate
///
/// Opens and closes the signal in an eighth-note pattern; short attack and
/// release ramps keep the chops click-free.
pub fn apply_gater(
    samples: &[f32],
    bpm: f32,
    pattern: &[bool],
    smoothing_ms: f32,
    sample_rate: u32,
) -> Vec<f32> {
    if samples.is_empty() || pattern.is_empty() {
        return samples.to_vec();
    }

    let step = crate::audio::samples_per_beat(bpm, sample_rate) / 2; // 1/8 note
    let ramp = ((smoothing_ms / 1000.0) * sample_rate as f32) as usize;

    let mut envelope = vec![0.0f32; samples.len()];
    for (i, value) in envelope.iter_mut().enumerate() {
        let slot = (i / step.max(1)) % pattern.len();
        *value = if pattern[slot] { 1.0 } else { 0.0 };
    }

    // Smooth the gate edges
    let smoothed = if ramp > 1 {
        crate::analysis::features::moving_average(&envelope, ramp)
    } else {
        envelope
    };

    samples
        .iter()
        .zip(smoothed.iter())
        .map(|(&s, &g)| s * g)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44_100;

    fn tone(freq: f32, seconds: f32) -> Vec<f32> {
        let n = (SR as f32 * seconds) as usize;
        (0..n)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / SR as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_flanger_preserves_length_and_level() {
        let input = tone(440.0, 0.5);
        let out = apply_flanger(&input, 0.5, 0.7, 0.5, 0.3, SR);
        assert_eq!(out.len(), input.len());
        // Comb filtering moves energy around but not wildly
        let ratio = crate::audio::rms(&out) / crate::audio::rms(&input);
        assert!(ratio > 0.3 && ratio < 2.0, "rms ratio {}", ratio);
    }

    #[test]
    fn test_phaser_stays_bounded() {
        let input = tone(440.0, 0.5);
        let out = apply_phaser(&input, 0.3, 4, 0.7, 0.5, 0.3, SR);
        assert_eq!(out.len(), input.len());
        assert!(crate::audio::peak(&out) < 2.0);
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_beat_repeat_stutters() {
        // A ramp makes repeats visible: after the effect, the slice at the
        // start position recurs
        let n = SR as usize;
        let input: Vec<f32> = (0..n).map(|i| i as f32 / n as f32).collect();
        let out = apply_beat_repeat(&input, 120.0, 0.25, 4, 0.0, 0.0, SR);

        let slice_len = (crate::audio::samples_per_beat(120.0, SR) as f32 * 0.25) as usize;
        // Second repeat equals the first slice
        assert!((out[slice_len] - input[0]).abs() < 1e-6);
        assert!((out[slice_len + 100] - input[100]).abs() < 1e-6);
    }

    #[test]
    fn test_beat_repeat_decay() {
        let input = vec![0.5f32; SR as usize];
        let out = apply_beat_repeat(&input, 120.0, 0.25, 3, 0.0, 0.4, SR);
        let slice_len = (crate::audio::samples_per_beat(120.0, SR) as f32 * 0.25) as usize;
        // Third repeat is quieter than the first
        assert!(out[slice_len * 2 + 10] < out[10]);
    }

    #[test]
    fn test_gater_silences_closed_slots() {
        let input = vec![0.5f32; SR as usize];
        let pattern = [true, false, true, false, true, true, false, true];
        let out = apply_gater(&input, 120.0, &pattern, 5.0, SR);

        let step = crate::audio::samples_per_beat(120.0, SR) / 2;
        // Middle of an open slot is passed, middle of a closed one is gone
        assert!(out[step / 2] > 0.4);
        assert!(out[step + step / 2] < 0.1);
    }
}
