//! Soonest GPU release estimate for a partition.
use crate::*;
use chrono::{DateTime, Duration, Local};
use serde::Serialize;

/// A running job, described by when it will free its GPUs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReleaseCandidate {
    /// Seconds until the job reaches its time limit
    pub time_left: u64,
    pub gpus: u64,
    pub user: String,
}

/// The soonest release in a partition, widened to everything released shortly after it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReleaseEntry {
    pub time_left: u64,
    pub gpus: u64,
    pub user: String,
    /// GPUs freed by every job within the window of the soonest one
    pub total_in_window: u64,
    pub label: String,
    /// `None` when the time left is too large to place on the calendar
    pub expected_at: Option<DateTime<Local>>,
}

/// Tracks the job closest to its time limit together with all jobs whose time left is within
/// `width` seconds of it.  The window is anchored on the current minimum, so a new minimum can
/// push earlier members out.
#[derive(Clone, Debug)]
pub struct ReleaseWindow {
    width: u64,
    min: Option<ReleaseCandidate>,
    members: Vec<ReleaseCandidate>,
    total: u64,
}

impl ReleaseWindow {
    pub fn new(width: u64) -> Self {
        ReleaseWindow {
            width,
            min: None,
            members: Vec::new(),
            total: 0,
        }
    }

    pub fn offer(&mut self, c: ReleaseCandidate) {
        let recenter = match &self.min {
            None => true,
            Some(min) => c.time_left < min.time_left,
        };
        if recenter {
            self.min = Some(c.clone());
            self.retain_window();
        }
        self.members.push(c);
        self.retain_window();
        self.total = self.members.iter().map(|m| m.gpus).sum();
    }

    fn retain_window(&mut self) {
        let min = match &self.min {
            Some(m) => m.time_left,
            None => return,
        };
        let width = self.width;
        self.members
            .retain(|m| m.time_left.saturating_sub(min) < width);
    }

    pub fn soonest(&self) -> Option<&ReleaseCandidate> {
        self.min.as_ref()
    }

    pub fn members(&self) -> &[ReleaseCandidate] {
        &self.members
    }

    pub fn total_in_window(&self) -> u64 {
        self.total
    }

    /// `[D-]HH:MM:SS (total)`
    pub fn label(&self) -> Option<String> {
        self.min
            .as_ref()
            .map(|m| format!("{} ({})", format_duration(m.time_left), self.total))
    }

    pub fn entry(&self, now: DateTime<Local>) -> Option<ReleaseEntry> {
        let min = self.min.as_ref()?;
        Some(ReleaseEntry {
            time_left: min.time_left,
            gpus: min.gpus,
            user: min.user.clone(),
            total_in_window: self.total,
            label: self.label()?,
            expected_at: Duration::from_std(std::time::Duration::from_secs(min.time_left))
                .ok()
                .and_then(|d| now.checked_add_signed(d)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(time_left: u64, gpus: u64, user: &str) -> ReleaseCandidate {
        ReleaseCandidate {
            time_left,
            gpus,
            user: user.to_string(),
        }
    }

    fn check_invariants(w: &ReleaseWindow) {
        let min = w.soonest().unwrap().time_left;
        for m in w.members() {
            assert!(m.time_left >= min);
            assert!(m.time_left - min < w.width);
        }
        assert_eq!(
            w.total_in_window(),
            w.members().iter().map(|m| m.gpus).sum::<u64>()
        );
    }

    #[test]
    fn empty_window() {
        let w = ReleaseWindow::new(300);
        assert!(w.soonest().is_none());
        assert!(w.label().is_none());
        assert!(w.entry(Local::now()).is_none());
    }

    #[test]
    fn single_entry() {
        let mut w = ReleaseWindow::new(300);
        w.offer(c(900, 2, "alice"));
        assert_eq!(w.total_in_window(), 2);
        assert_eq!(w.members().len(), 1);
        assert_eq!(w.label().unwrap(), "00:15:00 (2)");
    }

    #[test]
    fn window_recenters() {
        let mut w = ReleaseWindow::new(300);
        w.offer(c(1000, 1, "a"));
        w.offer(c(1200, 2, "b"));
        check_invariants(&w);
        assert_eq!(w.total_in_window(), 3);

        // outside the window of the current minimum
        w.offer(c(1300, 4, "c"));
        check_invariants(&w);
        assert_eq!(w.total_in_window(), 3);

        // new minimum evicts b
        w.offer(c(800, 8, "d"));
        check_invariants(&w);
        assert_eq!(w.soonest().unwrap().user, "d");
        assert_eq!(w.total_in_window(), 9);

        // ties do not replace the minimum
        w.offer(c(800, 1, "e"));
        check_invariants(&w);
        assert_eq!(w.soonest().unwrap().user, "d");
        assert_eq!(w.total_in_window(), 10);
        assert_eq!(w.label().unwrap(), "00:13:20 (10)");
    }

    #[test]
    fn arbitrary_arrivals() {
        let mut w = ReleaseWindow::new(60);
        for (i, t) in [500, 30, 90, 31, 1000, 0, 59, 60, 45].into_iter().enumerate() {
            w.offer(c(t, i as u64 + 1, "u"));
            check_invariants(&w);
        }
        assert_eq!(w.soonest().unwrap().time_left, 0);
        let times: Vec<_> = w.members().iter().map(|m| m.time_left).collect();
        assert_eq!(times, vec![30, 31, 0, 59, 45]);
    }

    #[test]
    fn expected_release_time() {
        let now = Local::now();
        let mut w = ReleaseWindow::new(60);
        w.offer(c(86_400 + 60, 1, "u"));
        let e = w.entry(now).unwrap();
        assert_eq!(e.expected_at.unwrap() - now, Duration::seconds(86_460));
        assert_eq!(e.label, "1-00:01:00 (1)");
    }

    #[test]
    fn far_future_release() {
        let mut w = ReleaseWindow::new(60);
        w.offer(c(115_740_741 * 86_400, 1, "u"));
        let e = w.entry(Local::now()).unwrap();
        assert_eq!(e.expected_at, None);
        assert_eq!(e.label, "115740741-00:00:00 (1)");

        let mut w = ReleaseWindow::new(60);
        w.offer(c(u64::MAX, 1, "u"));
        assert_eq!(w.entry(Local::now()).unwrap().expected_at, None);
    }
}
