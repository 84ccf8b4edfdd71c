use super::{
	ProgressId, ProgressSink, ProgressState, ProgressUpdate,
	format::{bar, clock, rate, terminal_width},
};
use parking_lot::Mutex;
use std::{
	collections::BTreeMap,
	io::Write,
	time::{Duration, Instant},
};

const REDRAW_INTERVAL: Duration = Duration::from_millis(500);

/// Draws the most recently updated task as a single bar line on stderr.
///
/// Tasks without a known total are drawn as a message with a running counter.
#[derive(Debug)]
pub struct TerminalProgress {
	inner: Mutex<Inner>,
	enabled: bool,
}

#[derive(Debug)]
struct Inner {
	next_id: u32,
	tasks: BTreeMap<ProgressId, (ProgressState, Instant)>,
	next_draw: Instant,
}

impl TerminalProgress {
	/// With `enabled == false` state is still tracked but nothing is written.
	pub fn new(enabled: bool) -> Self {
		Self {
			inner: Mutex::new(Inner {
				next_id: 0,
				tasks: BTreeMap::new(),
				next_draw: Instant::now(),
			}),
			enabled: enabled && !cfg!(feature = "test"),
		}
	}

	fn draw(&self, inner: &mut Inner, id: ProgressId, force: bool) {
		if !self.enabled {
			return;
		}
		let now = Instant::now();
		if !force && now < inner.next_draw {
			return;
		}
		inner.next_draw = now + REDRAW_INTERVAL;

		let Some((state, start)) = inner.tasks.get(&id) else {
			return;
		};
		let line = render_line(state, start.elapsed(), terminal_width());

		let mut output = std::io::stderr();
		let _ = write!(output, "\r\x1b[2K{line}");
		let _ = output.flush();
	}
}

fn render_line(state: &ProgressState, elapsed: Duration, width: usize) -> String {
	let msg = &state.description;
	let pos = state.position;
	let Some(total) = state.total else {
		return format!("{msg} {pos}");
	};
	let total = total.max(1);
	let pos = pos.min(total);

	let secs = elapsed.as_secs_f64();
	let per_sec = if secs > 0.0 { pos as f64 / secs } else { 0.0 };
	let eta = if pos > 0 {
		Duration::from_secs_f64(secs * (total - pos) as f64 / pos as f64)
	} else {
		Duration::ZERO
	};
	let fraction = pos as f64 / total as f64;
	let percent = (fraction * 100.0).floor() as u64;
	let speed = rate(per_sec);
	let remaining = clock(eta);

	let line = |filled: &str| format!("{msg}▕{filled}▏{pos}/{total} ({percent:>3}%) {speed:>7} {remaining:>7}");
	let available = width.saturating_sub(line("").chars().count());
	line(&bar(fraction, available))
}

impl ProgressSink for TerminalProgress {
	fn add(&self, description: &str, total: Option<u64>) -> ProgressId {
		let mut inner = self.inner.lock();
		inner.next_id = inner.next_id.wrapping_add(1);
		let id = ProgressId(inner.next_id);
		inner
			.tasks
			.insert(id, (ProgressState::new(id, description, total), Instant::now()));
		self.draw(&mut inner, id, true);
		id
	}

	fn update(&self, id: ProgressId, update: ProgressUpdate) {
		let mut inner = self.inner.lock();
		let Some((state, _)) = inner.tasks.get_mut(&id) else {
			return;
		};
		state.apply(update);
		self.draw(&mut inner, id, false);
	}

	fn remove(&self, id: ProgressId) {
		let mut inner = self.inner.lock();
		inner.tasks.remove(&id);
		if !self.enabled {
			return;
		}
		match inner.tasks.keys().next_back().copied() {
			Some(last) => self.draw(&mut inner, last, true),
			None => {
				let mut output = std::io::stderr();
				let _ = write!(output, "\r\x1b[2K");
				let _ = output.flush();
			}
		}
	}
}
