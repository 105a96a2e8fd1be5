// Post-processing applied to an assembled sequence before hand-off.
//
// Two independent passes:
//
// `prune()` smooths melodic outliers. Each symbol's pitch proxy (mean MIDI
// number of its pitches, symbol.rs) is taken; rests and anything unparsable
// are skipped. Absolute differences between consecutive proxies give a
// mean and population standard deviation; each jump larger than
// `mean + 2 * std` is flattened by overwriting the earlier symbol of the
// pair with the later one. All differences are computed up front, so
// replacements never change which jumps qualify. Length never changes.
//
// `quantize()` snaps durations to 4-beat bars. A running bar position
// starts at 0. On a bar line the duration starts a new position (taken
// modulo the bar so an over-long note cannot push the accumulator past 4);
// otherwise a duration that would cross the bar line is clipped to end
// exactly on it. Reaching a bar line resets the position to 0.
//
// segment.rs and composer.rs expose both passes as methods.

use crate::symbol::Symbol;

/// Bar length in quarter notes.
pub const BAR_LENGTH: f64 = 4.0;

/// Tolerance for bar-line comparisons.
const EPSILON: f64 = 1e-9;

/// Replace melodic outliers in place. Returns how many symbols changed.
pub fn prune(symbols: &mut [Symbol]) -> usize {
    let proxies: Vec<(usize, f64)> = symbols
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.pitch_proxy().map(|p| (i, p)))
        .collect();
    if proxies.len() < 3 {
        return 0;
    }

    let diffs: Vec<f64> = proxies
        .windows(2)
        .map(|w| (w[1].1 - w[0].1).abs())
        .collect();
    let n = diffs.len() as f64;
    let mean = diffs.iter().sum::<f64>() / n;
    let variance = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std <= 0.0 {
        return 0;
    }

    let threshold = mean + 2.0 * std;
    let mut replaced = 0;
    for (pair, &diff) in proxies.windows(2).zip(&diffs) {
        if diff > threshold {
            let (earlier, later) = (pair[0].0, pair[1].0);
            symbols[earlier] = symbols[later].clone();
            replaced += 1;
        }
    }
    replaced
}

/// Clip durations in place so no note crosses a bar line.
pub fn quantize(durations: &mut [f64]) {
    let mut position = 0.0;
    for duration in durations.iter_mut() {
        if on_bar_line(position) {
            position = *duration % BAR_LENGTH;
        } else if position + *duration > BAR_LENGTH + EPSILON {
            *duration = BAR_LENGTH - position;
            position = 0.0;
        } else {
            position += *duration;
        }
        if on_bar_line(position) {
            position = 0.0;
        }
    }
}

fn on_bar_line(position: f64) -> bool {
    let offset = position.rem_euclid(BAR_LENGTH);
    offset < EPSILON || BAR_LENGTH - offset < EPSILON
}
