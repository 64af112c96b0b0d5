/// Collapse runs of interleaved points whose timestamps lie within `window`
/// of the run's first point into one averaged (voltage, time) point.
///
/// Works in place on freshly built ETS arrays and truncates both to the
/// number of emitted points. Running it twice on the same arrays averages
/// already-averaged points, so callers apply it exactly once.
pub fn smooth_in_place(voltages: &mut Vec<f64>, times: &mut Vec<f64>, window: f64) {
    let n = voltages.len().min(times.len());
    if n == 0 {
        voltages.clear();
        times.clear();
        return;
    }

    let mut written = 0;
    let mut patch_start = 0;
    let mut sum_v = 0.0;
    let mut sum_t = 0.0;
    let mut count = 0usize;

    for i in 0..n {
        if count > 0 && times[i] - times[patch_start] > window {
            // written <= patch_start <= i, so no unread input is clobbered
            voltages[written] = sum_v / count as f64;
            times[written] = sum_t / count as f64;
            written += 1;

            patch_start = i;
            sum_v = 0.0;
            sum_t = 0.0;
            count = 0;
        }
        sum_v += voltages[i];
        sum_t += times[i];
        count += 1;
    }

    voltages[written] = sum_v / count as f64;
    times[written] = sum_t / count as f64;
    written += 1;

    voltages.truncate(written);
    times.truncate(written);
}
