//! Transfer progress: cumulative bytes, smoothed rate and ETA.
//!
//! The rate is measured over a window that starts at one second and widens
//! by a second after each measurement, up to ten. Early numbers react fast;
//! later ones stop jittering.

use indicatif::HumanBytes;
use std::io::{self, Write};
use std::time::{Duration, Instant};

const INITIAL_WINDOW: Duration = Duration::from_secs(1);
const WINDOW_STEP: Duration = Duration::from_secs(1);
const MAX_WINDOW: Duration = Duration::from_secs(10);

/// Minimum time between two redraws of the status line.
const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

pub struct ProgressTracker<W: Write = io::Stderr> {
    out: W,
    label: String,
    total: u64,
    current: u64,
    rate: f64,
    window: Duration,
    window_start: Instant,
    window_bytes: u64,
    last_draw: Option<Instant>,
}

impl ProgressTracker<io::Stderr> {
    pub fn stderr(label: impl Into<String>, total: u64) -> Self {
        Self::new(label, total, io::stderr())
    }
}

impl<W: Write> ProgressTracker<W> {
    pub fn new(label: impl Into<String>, total: u64, out: W) -> Self {
        Self::starting_at(label, total, out, Instant::now())
    }

    pub fn starting_at(label: impl Into<String>, total: u64, out: W, start: Instant) -> Self {
        Self {
            out,
            label: label.into(),
            total,
            current: 0,
            rate: 0.0,
            window: INITIAL_WINDOW,
            window_start: start,
            window_bytes: 0,
            last_draw: None,
        }
    }

    pub fn step(&mut self, n: u64) -> io::Result<()> {
        self.step_at(n, Instant::now())
    }

    pub fn step_at(&mut self, n: u64, now: Instant) -> io::Result<()> {
        self.current = self.current.saturating_add(n);

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= self.window {
            self.rate = (self.current - self.window_bytes) as f64 / elapsed.as_secs_f64();
            self.window_start = now;
            self.window_bytes = self.current;
            self.window = (self.window + WINDOW_STEP).min(MAX_WINDOW);
        }

        let due = match self.last_draw {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= REDRAW_INTERVAL,
        };
        if due || self.current >= self.total {
            self.last_draw = Some(now);
            write!(self.out, "\r{}\x1b[K", self.status_line())?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// Print the final status and end the line.
    pub fn done(&mut self) -> io::Result<()> {
        writeln!(self.out, "\r{}\x1b[K", self.status_line())?;
        self.out.flush()
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes per second from the most recent window; zero until one closes.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.current as f64 / self.total as f64).min(1.0)
    }

    /// `None` while the rate is still unknown.
    pub fn eta(&self) -> Option<Duration> {
        if self.rate <= 0.0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.current) as f64;
        Some(Duration::from_secs_f64(remaining / self.rate))
    }

    pub fn status_line(&self) -> String {
        let eta = match self.eta() {
            Some(eta) => {
                let secs = eta.as_secs();
                format!("{:02}:{:02}", secs / 60, secs % 60)
            }
            None => "--:--".to_string(),
        };
        format!(
            "{} {:5.1}% {}/{} {}/s ETA {}",
            self.label,
            self.fraction() * 100.0,
            HumanBytes(self.current),
            HumanBytes(self.total),
            HumanBytes(self.rate as u64),
            eta
        )
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(total: u64, t0: Instant) -> ProgressTracker<Vec<u8>> {
        ProgressTracker::starting_at("put", total, Vec::new(), t0)
    }

    #[test]
    fn test_rate_unknown_until_first_window() {
        let t0 = Instant::now();
        let mut p = tracker(10_000, t0);
        p.step_at(500, t0 + Duration::from_millis(500)).unwrap();

        assert_eq!(p.rate(), 0.0);
        assert!(p.eta().is_none());
        assert!(p.status_line().ends_with("ETA --:--"));
    }

    #[test]
    fn test_rate_and_eta_after_window() {
        let t0 = Instant::now();
        let mut p = tracker(10_000, t0);
        p.step_at(500, t0 + Duration::from_millis(500)).unwrap();
        p.step_at(500, t0 + Duration::from_secs(1)).unwrap();

        assert!((p.rate() - 1000.0).abs() < 1e-6);
        assert_eq!(p.eta(), Some(Duration::from_secs(9)));
        assert_eq!(p.window(), Duration::from_secs(2));
        assert!(p.status_line().contains("ETA 00:09"));
    }

    #[test]
    fn test_window_widens_to_ceiling() {
        let t0 = Instant::now();
        let mut p = tracker(u64::MAX, t0);
        let mut now = t0;
        for _ in 0..20 {
            now += Duration::from_secs(10);
            p.step_at(1, now).unwrap();
        }
        assert_eq!(p.window(), MAX_WINDOW);
    }

    #[test]
    fn test_fraction_reaches_one_at_total() {
        let t0 = Instant::now();
        let mut p = tracker(100, t0);
        let mut last = 0;
        for i in 1..=10 {
            p.step_at(10, t0 + Duration::from_millis(i * 50)).unwrap();
            assert!(p.current() >= last);
            last = p.current();
            if p.current() < 100 {
                assert!(p.fraction() < 1.0);
            }
        }
        assert_eq!(p.current(), 100);
        assert_eq!(p.fraction(), 1.0);
    }

    #[test]
    fn test_empty_total_is_complete() {
        let p = tracker(0, Instant::now());
        assert_eq!(p.fraction(), 1.0);
    }

    #[test]
    fn test_done_terminates_line() {
        let t0 = Instant::now();
        let mut p = tracker(2048, t0);
        p.step_at(2048, t0 + Duration::from_secs(2)).unwrap();
        p.done().unwrap();

        let out = String::from_utf8(p.into_inner()).unwrap();
        assert!(out.ends_with('\n'));
        assert!(out.contains("100.0%"));
        assert!(out.contains("2.00 KiB"));
    }
}
