//! Per-partition and per-user GPU accounting over a single snapshot.
use crate::model::{Job, Partition};
use crate::release::{ReleaseCandidate, ReleaseEntry, ReleaseWindow};
use crate::scontrol::EntityRecord;
use crate::*;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;

/// GPU counts split by job state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub running: u64,
    pub pending: u64,
}

impl StateCounts {
    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Running => self.running,
            JobState::Pending => self.pending,
        }
    }

    fn add(&mut self, state: JobState, gpus: u64) {
        match state {
            JobState::Running => self.running += gpus,
            JobState::Pending => self.pending += gpus,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UserUsage {
    /// Totals across all partitions
    pub total: StateCounts,
    pub partitions: IndexMap<String, StateCounts>,
}

impl UserUsage {
    fn add(&mut self, partition: &str, state: JobState, gpus: u64) {
        self.total.add(state, gpus);
        self.partitions
            .entry(partition.to_string())
            .or_default()
            .add(state, gpus);
    }

    /// Usage in `partition`, zero if the user has no jobs there.
    pub fn partition(&self, partition: &str) -> StateCounts {
        self.partitions.get(partition).copied().unwrap_or_default()
    }
}

/// user -> usage
pub type UserStatus = IndexMap<String, UserUsage>;

/// `(job id, GPUs)` pairs by state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct JobsByState {
    pub running: Vec<(JobId, u64)>,
    pub pending: Vec<(JobId, u64)>,
}

impl JobsByState {
    pub fn get(&self, state: JobState) -> &[(JobId, u64)] {
        match state {
            JobState::Running => &self.running,
            JobState::Pending => &self.pending,
        }
    }

    fn push(&mut self, state: JobState, job: (JobId, u64)) {
        match state {
            JobState::Running => self.running.push(job),
            JobState::Pending => self.pending.push(job),
        }
    }
}

/// user -> job name -> partition -> jobs
pub type JobStatusIndex = IndexMap<String, IndexMap<String, IndexMap<String, JobsByState>>>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PartitionGpus {
    /// May go negative if the job and partition snapshots disagree.
    pub available: i64,
    pub total: u64,
    /// Percentage of GPUs in use, `None` when the partition has no GPUs.
    pub usage: Option<f64>,
    pub billing_weight: f64,
    pub upcoming_release: Option<ReleaseEntry>,
    pub max_running_user: Option<String>,
    pub max_pending_user: Option<String>,
}

impl PartitionGpus {
    pub fn max_user(&self, state: JobState) -> Option<&str> {
        match state {
            JobState::Running => self.max_running_user.as_deref(),
            JobState::Pending => self.max_pending_user.as_deref(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GpuTotals {
    pub available: i64,
    pub total: u64,
    pub usage: Option<f64>,
}

impl GpuTotals {
    /// GPUs held by running jobs
    pub fn in_use(&self) -> u64 {
        (self.total as i64 - self.available).max(0) as u64
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GpuResource {
    pub partitions: IndexMap<String, PartitionGpus>,
    pub global: GpuTotals,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Aggregate {
    pub resources: GpuResource,
    pub users: UserStatus,
    pub jobs: JobStatusIndex,
}

pub fn usage_percent(total: u64, available: i64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let used = total as i64 - available;
    Some((used as f64 / total as f64 * 100.).clamp(0., 100.))
}

/// The user holding the most GPUs in `state` on `partition`.  Ties go to the smallest user id.
fn max_user(users: &UserStatus, partition: &str, state: JobState) -> Option<String> {
    users
        .iter()
        .map(|(u, usage)| (u, usage.partition(partition).get(state)))
        .filter(|&(_, n)| n > 0)
        .max_by(|(u1, n1), (u2, n2)| n1.cmp(n2).then_with(|| u2.cmp(u1)))
        .map(|(u, _)| u.clone())
}

/// Account every pending and running job against the GPU partitions.
///
/// Partitions with a zero (or missing) `GRES/gpu` billing weight are dropped, along with every
/// job that would run on them.  `window` is the release window width in seconds.
pub fn aggregate(
    jobs: &IndexMap<JobId, EntityRecord>,
    partitions: &IndexMap<String, EntityRecord>,
    now: DateTime<Local>,
    window: u64,
) -> Aggregate {
    let gating: IndexMap<&str, Partition> = partitions
        .iter()
        .filter_map(|(name, record)| Partition::gating(name, record))
        .map(|p| (p.name, p))
        .collect();

    let mut users = UserStatus::default();
    let mut job_index = JobStatusIndex::default();
    let mut running: HashMap<&str, u64> = HashMap::new();
    let mut releases: HashMap<&str, ReleaseWindow> = HashMap::new();

    for (&id, record) in jobs {
        let job = match Job::from_record(id, record) {
            Ok(Some(job)) => job,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(job_id = id, "skipping job: {}", e);
                continue;
            }
        };

        let partition = match job.partitions.iter().find(|p| gating.contains_key(*p)) {
            Some(&p) => p,
            None => {
                if !job.partitions.iter().any(|p| partitions.contains_key(*p)) {
                    tracing::warn!(
                        job_id = id,
                        "skipping job on unknown partition {:?}",
                        job.partitions
                    );
                }
                continue;
            }
        };

        users
            .entry(job.user.to_string())
            .or_default()
            .add(partition, job.state, job.gpus);

        job_index
            .entry(job.user.to_string())
            .or_default()
            .entry(job.name.to_string())
            .or_default()
            .entry(partition.to_string())
            .or_default()
            .push(job.state, (job.id, job.gpus));

        if job.state == JobState::Running {
            *running.entry(partition).or_default() += job.gpus;

            match job.time_left() {
                Ok(time_left) => releases
                    .entry(partition)
                    .or_insert_with(|| ReleaseWindow::new(window))
                    .offer(ReleaseCandidate {
                        time_left,
                        gpus: job.gpus,
                        user: job.user.to_string(),
                    }),
                Err(e) => tracing::debug!(job_id = id, "no release estimate: {}", e),
            }
        }
    }

    let mut resources = GpuResource::default();
    for (&name, p) in &gating {
        let used = running.get(name).copied().unwrap_or(0);
        let available = p.total_gpus as i64 - used as i64;

        resources.global.total += p.total_gpus;
        resources.global.available += available;

        resources.partitions.insert(
            name.to_string(),
            PartitionGpus {
                available,
                total: p.total_gpus,
                usage: usage_percent(p.total_gpus, available),
                billing_weight: p.billing_weight,
                upcoming_release: releases.get(name).and_then(|w| w.entry(now)),
                max_running_user: max_user(&users, name, JobState::Running),
                max_pending_user: max_user(&users, name, JobState::Pending),
            },
        );
    }
    resources.global.usage = usage_percent(resources.global.total, resources.global.available);

    Aggregate {
        resources,
        users,
        jobs: job_index,
    }
}
