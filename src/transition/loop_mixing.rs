//! Loop mixing: extend or repeat sections on the grid
//!
//! Looping buys time: an intro too short for the planned blend gets
//! extended, a breakdown holds for extra tension, a phrase repeats while
//! the incoming track settles. Standard loop sizes are 1, 2, 4, 8 and 16
//! bars; boundaries carry short crossfades so repeats never click.

/// Boundary crossfade inside a loop (seconds)
const LOOP_FADE_S: f32 = 0.01;

/// Create a tempo-synced loop
///
/// Extracts `loop_length_bars` starting at `loop_start_s` and repeats it
/// `repetitions` times, crossfading each seam so the joins are seamless.
pub fn create_loop(
    audio: &[f32],
    loop_start_s: f32,
    loop_length_bars: u32,
    bpm: f32,
    repetitions: u32,
    sample_rate: u32,
) -> Vec<f32> {
    let start = (loop_start_s * sample_rate as f32) as usize;
    if start >= audio.len() {
        log::warn!("loop start beyond the audio; returning input");
        return audio.to_vec();
    }

    let bar_samples = crate::audio::samples_per_bar(bpm, sample_rate);
    let loop_samples = (bar_samples * loop_length_bars as usize).min(audio.len() - start);

    let mut loop_audio = audio[start..start + loop_samples].to_vec();

    let fade = ((LOOP_FADE_S * sample_rate as f32) as usize).min(loop_samples / 4);
    crate::audio::apply_fade_in(&mut loop_audio, fade);
    crate::audio::apply_fade_out(&mut loop_audio, fade);

    if repetitions <= 1 {
        return loop_audio;
    }

    // Seam segment: the faded end of one pass over the faded start of the
    // next
    let seam: Vec<f32> = if fade > 0 && loop_samples > fade * 2 {
        (0..fade)
            .map(|i| {
                let t = i as f32 / fade as f32;
                loop_audio[loop_samples - fade + i] * (1.0 - t) + loop_audio[i] * t
            })
            .collect()
    } else {
        Vec::new()
    };

    let mut out = Vec::with_capacity(loop_samples * repetitions as usize);
    out.extend_from_slice(&loop_audio);
    for _ in 1..repetitions {
        if !seam.is_empty() {
            out.truncate(out.len() - seam.len());
            out.extend_from_slice(&seam);
            out.extend_from_slice(&loop_audio[seam.len()..]);
        } else {
            out.extend_from_slice(&loop_audio);
        }
    }
    out
}

/// Extend a section (intro, outro, breakdown) to a target length
///
/// The section is looped until it covers `target_bars`, trimmed to the
/// exact target, and spliced back between the surrounding audio. When the
/// section is already long enough the input comes back untouched.
pub fn extend_section(
    audio: &[f32],
    section_start_s: f32,
    section_end_s: f32,
    target_bars: u32,
    bpm: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let bar_s = crate::audio::bar_duration(bpm);
    let current_s = section_end_s - section_start_s;
    let target_s = target_bars as f32 * bar_s;

    if target_s <= current_s || current_s <= 0.0 {
        return audio.to_vec();
    }

    // One spare repetition: each seam consumes a crossfade's worth of
    // samples, so the naive count can land just short of the target
    let repetitions = (target_s / current_s).ceil() as u32 + 1;
    let section_bars = (current_s / bar_s).ceil() as u32;
    let mut extended = create_loop(
        audio,
        section_start_s,
        section_bars,
        bpm,
        repetitions,
        sample_rate,
    );

    let target_samples = (target_s * sample_rate as f32) as usize;
    extended.truncate(target_samples);

    let start = (section_start_s * sample_rate as f32) as usize;
    let end = ((section_end_s * sample_rate as f32) as usize).min(audio.len());
    crate::audio::concat(&[&audio[..start.min(audio.len())], &extended, &audio[end..]])
}

/// Cut a segment that loops back on itself cleanly
///
/// The seam (end wrapping to start) is pre-crossfaded into the tail, so a
/// player repeating the returned buffer hears no discontinuity.
pub fn create_seamless_loop(
    audio: &[f32],
    loop_start_s: f32,
    loop_end_s: f32,
    crossfade_s: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let start = (loop_start_s * sample_rate as f32) as usize;
    let end = ((loop_end_s * sample_rate as f32) as usize).min(audio.len());
    if start >= end {
        return Vec::new();
    }
    let fade = (crossfade_s * sample_rate as f32) as usize;
    if end - start < fade * 2 || fade == 0 {
        return audio[start..end].to_vec();
    }

    // Middle of the segment, then a tail that blends the end into the start
    let mut out = audio[start + fade..end - fade].to_vec();
    for i in 0..fade {
        let t = i as f32 / fade as f32;
        out.push(audio[end - fade + i] * (1.0 - t) + audio[start + i] * t);
    }
    out
}

/// Build a transition that loops A before handing over to B
///
/// A plays to the loop point, the loop section repeats, and the final
/// `transition_bars` crossfade (equal-power) into the head of B.
#[allow(clippy::too_many_arguments)]
pub fn create_loop_transition(
    audio_a: &[f32],
    audio_b: &[f32],
    loop_start_s: f32,
    loop_end_s: f32,
    repetitions: u32,
    transition_bars: u32,
    bpm: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let bar_s = crate::audio::bar_duration(bpm);
    let loop_bars = ((loop_end_s - loop_start_s) / bar_s).ceil().max(1.0) as u32;

    let looped = create_loop(
        audio_a,
        loop_start_s,
        loop_bars,
        bpm,
        repetitions,
        sample_rate,
    );

    let before_end = ((loop_start_s * sample_rate as f32) as usize).min(audio_a.len());
    let before = &audio_a[..before_end];

    let trans_samples = crate::audio::samples_per_bar(bpm, sample_rate) * transition_bars as usize;

    if trans_samples <= looped.len() && trans_samples <= audio_b.len() {
        let keep = looped.len() - trans_samples;
        let mut out = Vec::with_capacity(before.len() + looped.len() + audio_b.len());
        out.extend_from_slice(before);
        out.extend_from_slice(&looped[..keep]);
        for i in 0..trans_samples {
            let angle = i as f32 / trans_samples as f32 * std::f32::consts::FRAC_PI_2;
            out.push(looped[keep + i] * angle.cos() + audio_b[i] * angle.sin());
        }
        out.extend_from_slice(&audio_b[trans_samples..]);
        out
    } else {
        crate::audio::concat(&[before, &looped, audio_b])
    }
}

/// Find the loop window whose boundaries match best
///
/// Scans the search region in half-second steps and picks the start where
/// the energy at the window's two ends is closest — a matched boundary
/// loops without a lurch.
pub fn find_best_loop_point(
    audio: &[f32],
    target_bars: u32,
    bpm: f32,
    search_start_s: f32,
    search_end_s: Option<f32>,
    sample_rate: u32,
) -> (f32, f32) {
    let target_samples = crate::audio::samples_per_bar(bpm, sample_rate) * target_bars as usize;
    let duration_s = audio.len() as f32 / sample_rate as f32;
    let search_end_s =
        search_end_s.unwrap_or(duration_s - target_samples as f32 / sample_rate as f32);

    let window = 2048usize;
    let rms = crate::analysis::features::windowed_rms(audio, window);

    let step = sample_rate as usize / 2;
    let search_start = (search_start_s * sample_rate as f32) as usize;
    let search_end = ((search_end_s * sample_rate as f32) as usize).min(audio.len());

    let mut best_start = search_start;
    let mut best_score = f32::MAX;

    let mut start = search_start;
    while start + target_samples <= audio.len() && start < search_end {
        let start_window = start / window;
        let end_window = (start + target_samples) / window;
        if let (Some(&a), Some(&b)) = (rms.get(start_window), rms.get(end_window)) {
            let score = (a - b).abs();
            if score < best_score {
                best_score = score;
                best_start = start;
            }
        }
        start += step;
    }

    let start_s = best_start as f32 / sample_rate as f32;
    (
        start_s,
        start_s + target_samples as f32 / sample_rate as f32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44_100;
    const BPM: f32 = 120.0;

    fn tone(freq: f32, seconds: f32, amp: f32) -> Vec<f32> {
        let n = (SR as f32 * seconds) as usize;
        (0..n)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / SR as f32).sin() * amp)
            .collect()
    }

    #[test]
    fn test_loop_length_formula() {
        // 2 bars at 120 BPM = 4s; each extra repetition adds the loop minus
        // one seam
        let audio = tone(220.0, 20.0, 0.5);
        let out = create_loop(&audio, 0.0, 2, BPM, 3, SR);

        let loop_samples = crate::audio::samples_per_bar(BPM, SR) * 2;
        let seam = (LOOP_FADE_S * SR as f32) as usize;
        let expected = loop_samples + 2 * (loop_samples - seam);
        assert_eq!(out.len(), expected);
    }

    #[test]
    fn test_single_repetition_is_just_the_section() {
        let audio = tone(220.0, 20.0, 0.5);
        let out = create_loop(&audio, 2.0, 4, BPM, 1, SR);
        assert_eq!(out.len(), crate::audio::samples_per_bar(BPM, SR) * 4);
    }

    #[test]
    fn test_loop_seams_do_not_click() {
        let audio = tone(220.0, 20.0, 0.5);
        let out = create_loop(&audio, 0.0, 1, BPM, 4, SR);

        // A 220 Hz tone at 0.5 moves at most ~0.016 per sample; seams may
        // blend two phases but must not jump
        let max_jump = out
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        assert!(max_jump < 0.1, "seam click of {}", max_jump);
    }

    #[test]
    fn test_extend_section_reaches_target() {
        // A 2s section extended to 8 bars (16s at 120 BPM)
        let audio = tone(220.0, 20.0, 0.5);
        let out = extend_section(&audio, 5.0, 7.0, 8, BPM, SR);

        let before = (5.0 * SR as f32) as usize;
        let after = audio.len() - (7.0 * SR as f32) as usize;
        let target = (8.0 * crate::audio::bar_duration(BPM) * SR as f32) as usize;
        assert_eq!(out.len(), before + target + after);
    }

    #[test]
    fn test_extend_section_noop_when_long_enough() {
        let audio = tone(220.0, 20.0, 0.5);
        // 10s section, 2-bar target (4s): nothing to do
        let out = extend_section(&audio, 2.0, 12.0, 2, BPM, SR);
        assert_eq!(out.len(), audio.len());
    }

    #[test]
    fn test_seamless_loop_wraps_cleanly() {
        let audio = tone(220.0, 10.0, 0.5);
        let out = create_seamless_loop(&audio, 1.0, 5.0, 0.05, SR);
        // The wrap blend folds one crossfade into the segment length
        let expected = (4.0 * SR as f32) as usize - (0.05 * SR as f32) as usize;
        assert_eq!(out.len(), expected);

        // Played twice back to back, the wrap point must not jump
        let wrap_jump = (out[0] - *out.last().unwrap()).abs();
        assert!(wrap_jump < 0.1, "wrap jump of {}", wrap_jump);
    }

    #[test]
    fn test_loop_transition_hands_over_to_b() {
        let audio_a = tone(220.0, 20.0, 0.5);
        let audio_b = tone(440.0, 20.0, 0.5);
        let out = create_loop_transition(&audio_a, &audio_b, 8.0, 12.0, 2, 2, BPM, SR);

        // Before-loop + looped section + all of B minus the overlapped bars
        let before = (8.0 * SR as f32) as usize;
        assert!(out.len() > before + audio_b.len());
        // The tail is pure B
        let tail = &out[out.len() - 1000..];
        let b_tail = &audio_b[audio_b.len() - 1000..];
        for (x, y) in tail.iter().zip(b_tail.iter()).step_by(100) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_find_best_loop_point_prefers_matched_energy() {
        // Quiet first half, loud second half: a window inside the quiet
        // region has matched boundaries, one straddling the step does not
        let mut audio = tone(220.0, 10.0, 0.1);
        audio.extend(tone(220.0, 10.0, 0.8));

        // 4 bars at 120 BPM = 8s
        let (start, end) = find_best_loop_point(&audio, 4, BPM, 0.0, None, SR);
        assert!((end - start - 8.0).abs() < 0.05);
        assert!(start < 2.5, "boundary-matched window expected, got {}", start);
    }
}
