use std::time::Duration;

/// Items per second with a `k`, `M` or `G` suffix above a thousand.
pub(super) fn rate(per_sec: f64) -> String {
	let units = [(1e9, "G"), (1e6, "M"), (1e3, "k")];
	match units.iter().find(|(scale, _)| per_sec >= *scale) {
		Some((scale, unit)) => format!("{:.1}{unit}/s", per_sec / scale),
		None => format!("{per_sec:.0}/s"),
	}
}

/// `m:ss` below an hour, `h:mm:ss` above.
pub(super) fn clock(d: Duration) -> String {
	let secs = d.as_secs();
	let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
	if hours == 0 {
		format!("{minutes}:{seconds:02}")
	} else {
		format!("{hours}:{minutes:02}:{seconds:02}")
	}
}

pub(super) fn bar(fraction: f64, width: usize) -> String {
	let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
	format!("{}{}", "█".repeat(filled), " ".repeat(width - filled))
}

pub(super) fn terminal_width() -> usize {
	terminal_size::terminal_size().map_or(80, |(width, _)| usize::from(width.0).max(10))
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(0.4, "0/s")]
	#[case(999.0, "999/s")]
	#[case(1_500.0, "1.5k/s")]
	#[case(2_500_000.0, "2.5M/s")]
	fn rates(#[case] value: f64, #[case] expected: &str) {
		assert_eq!(rate(value), expected);
	}

	#[rstest]
	#[case(45, "0:45")]
	#[case(754, "12:34")]
	#[case(11_142, "3:05:42")]
	fn clocks(#[case] secs: u64, #[case] expected: &str) {
		assert_eq!(clock(Duration::from_secs(secs)), expected);
	}

	#[test]
	fn bars_have_requested_width() {
		assert_eq!(bar(0.0, 4), "    ");
		assert_eq!(bar(1.0, 4), "████");
		assert_eq!(bar(0.5, 4), "██  ");
		assert_eq!(bar(2.0, 3).chars().count(), 3);
	}
}
