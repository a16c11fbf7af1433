use std::time::{Duration, Instant};

/// Progress prefix for item `index` of `total`, timed from `start`.
pub fn format_progress(index: usize, total: usize, start: Instant) -> String {
    render_progress(index, total, start.elapsed())
}

/// Renders `[ i/total] pct% elapsed`. The width only depends on `total`, so
/// successive lines of one pass line up.
///
/// `total` must be non-zero.
pub fn render_progress(index: usize, total: usize, elapsed: Duration) -> String {
    debug_assert!(total > 0, "progress total must be positive");
    let total = total.max(1);
    let percentage = 100 * index / total;
    let width = total.to_string().len();
    format!(
        "[{:>width$}/{}] {:>3}% {:>7}",
        index,
        total,
        percentage,
        format_elapsed(elapsed),
        width = width
    )
}

pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}
