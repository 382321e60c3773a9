//! Ordering of users by GPU usage, with a Pareto cut separating heavy users from the long tail.
use crate::aggregate::{UserStatus, UserUsage};
use serde::Serialize;
use std::fmt::Display;

/// Share of running GPUs used for the Pareto cut.  Applied twice: users are ranked while the
/// running total of ranked users stays below `PARETO_SHARE * PARETO_SHARE` of all running GPUs.
pub const PARETO_SHARE: f64 = 0.8;

/// Number of users who always get a medal.
pub const PODIUM: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "position", rename_all = "snake_case")]
pub enum Rank {
    /// 1, 2 or 3
    Podium(usize),
    Ordinal(usize),
    LongTail,
}

impl Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rank::Podium(1) => f.write_str("🥇"),
            Rank::Podium(2) => f.write_str("🥈"),
            Rank::Podium(_) => f.write_str("🥉"),
            Rank::Ordinal(n) => write!(f, "{:>2}.", n),
            Rank::LongTail => f.write_str("🚩"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedUser {
    pub user: String,
    pub rank: Rank,
    pub usage: UserUsage,
}

/// Sort users by `(running, pending)` GPUs, descending, ties broken by user id, and rank them.
pub fn rank_users(users: &UserStatus) -> Vec<RankedUser> {
    let mut order: Vec<_> = users.iter().collect();
    order.sort_by(|(u1, a), (u2, b)| {
        (b.total.running, b.total.pending)
            .cmp(&(a.total.running, a.total.pending))
            .then_with(|| u1.cmp(u2))
    });

    let total_running: u64 = users.values().map(|u| u.total.running).sum();
    let threshold = PARETO_SHARE * PARETO_SHARE * total_running as f64;

    let mut cumulative = 0;
    order
        .into_iter()
        .enumerate()
        .map(|(i, (user, usage))| {
            cumulative += usage.total.running;
            let rank = if i < PODIUM {
                Rank::Podium(i + 1)
            } else if (cumulative as f64) < threshold {
                Rank::Ordinal(i + 1)
            } else {
                Rank::LongTail
            };
            RankedUser {
                user: user.clone(),
                rank,
                usage: usage.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::StateCounts;

    fn status(usage: &[(&str, u64, u64)]) -> UserStatus {
        usage
            .iter()
            .map(|&(u, running, pending)| {
                let usage = UserUsage {
                    total: StateCounts { running, pending },
                    partitions: Default::default(),
                };
                (u.to_string(), usage)
            })
            .collect()
    }

    fn ranks(users: &UserStatus) -> Vec<(String, Rank)> {
        rank_users(users)
            .into_iter()
            .map(|r| (r.user, r.rank))
            .collect()
    }

    #[test]
    fn heavy_users_take_everything() {
        let users = status(&[("e", 1, 0), ("a", 10, 0), ("c", 3, 0), ("b", 5, 0), ("d", 1, 2)]);
        let r = ranks(&users);
        let names: Vec<_> = r.iter().map(|(u, _)| u.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(r[0].1, Rank::Podium(1));
        assert_eq!(r[2].1, Rank::Podium(3));
        assert_eq!(r[3].1, Rank::LongTail);
        assert_eq!(r[4].1, Rank::LongTail);
    }

    #[test]
    fn ordinals_until_cut() {
        let names: Vec<String> = (4..13).map(|i| format!("u{:02}", i)).collect();
        let mut usage = vec![("u00", 4, 0), ("u01", 3, 0), ("u02", 2, 0), ("u03", 2, 0)];
        for n in &names {
            usage.push((n.as_str(), 1, 0));
        }
        let users = status(&usage);
        let r = ranks(&users);

        // 20 running, cut at 12.8
        assert_eq!(r[3].1, Rank::Ordinal(4));
        assert_eq!(r[4].1, Rank::Ordinal(5));
        assert_eq!(r[5].1, Rank::LongTail);
        assert!(r[5..].iter().all(|(_, rank)| *rank == Rank::LongTail));

        let ranked: u64 = r
            .iter()
            .zip(rank_users(&users))
            .filter(|((_, rank), _)| *rank != Rank::LongTail)
            .map(|(_, ru)| ru.usage.total.running)
            .sum();
        assert!((ranked as f64) < PARETO_SHARE * PARETO_SHARE * 20.);
    }

    #[test]
    fn ties_and_pending() {
        let users = status(&[("zoe", 2, 0), ("adam", 2, 0), ("ben", 2, 5), ("cat", 0, 9)]);
        let r = ranks(&users);
        let names: Vec<_> = r.iter().map(|(u, _)| u.as_str()).collect();
        assert_eq!(names, vec!["ben", "adam", "zoe", "cat"]);
    }

    #[test]
    fn nothing_running() {
        let users = status(&[("a", 0, 1), ("b", 0, 2), ("c", 0, 3), ("d", 0, 4)]);
        let r = ranks(&users);
        assert_eq!(r[0].0, "d");
        assert_eq!(r[3].1, Rank::LongTail);
        assert!(ranks(&UserStatus::default()).is_empty());
    }

    #[test]
    fn rank_display() {
        assert_eq!(Rank::Podium(1).to_string(), "🥇");
        assert_eq!(Rank::Ordinal(4).to_string(), " 4.");
        assert_eq!(Rank::Ordinal(12).to_string(), "12.");
        assert_eq!(Rank::LongTail.to_string(), "🚩");
    }
}
