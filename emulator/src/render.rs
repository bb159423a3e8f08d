use std::time::Duration;

pub const BAR_WIDTH: usize = 20;

/// Renders `elapsed / total` as a fixed-width bar, e.g. `[#####-----]  50% start`.
pub fn progress_bar(label: &str, elapsed: Duration, total: Duration) -> String {
    let percent = if total.as_millis() == 0 {
        100
    } else {
        (elapsed.as_millis() * 100 / total.as_millis()).min(100)
    };
    let filled = usize::try_from(percent).unwrap_or(100) * BAR_WIDTH / 100;
    format!(
        "[{}{}] {percent:>3}% {label}",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

/// Short human form used in status lines: `850ms`, `1.500s`.
pub fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_fills_proportionally() {
        assert_eq!(
            progress_bar("start", Duration::from_millis(500), Duration::from_secs(1)),
            "[##########----------]  50% start"
        );
        assert_eq!(
            progress_bar("exit", Duration::from_secs(3), Duration::from_secs(1)),
            "[####################] 100% exit"
        );
        assert_eq!(
            progress_bar("exit", Duration::ZERO, Duration::ZERO),
            "[####################] 100% exit"
        );
    }

    #[test]
    fn short_durations() {
        assert_eq!(format_duration_short(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration_short(Duration::from_millis(1500)), "1.500s");
    }
}
