//! The full pipeline: snapshot text in, report out.
use crate::aggregate::{aggregate, GpuResource, JobStatusIndex, PartitionGpus};
use crate::ranges::compress_ids;
use crate::ranking::{rank_users, RankedUser};
use crate::scontrol::{parse_entities, scontrol_show, EntityKind};
use crate::users::UserDirectory;
use crate::*;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;

/// Raw `scontrol` output for jobs and partitions.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub jobs: String,
    pub partitions: String,
}

impl Snapshot {
    pub fn fetch() -> Result<Self> {
        Ok(Snapshot {
            jobs: scontrol_show(EntityKind::Job)?,
            partitions: scontrol_show(EntityKind::Partition)?,
        })
    }

    pub fn from_files(jobs: impl AsRef<Path>, partitions: impl AsRef<Path>) -> Result<Self> {
        let read = |p: &Path| {
            std::fs::read_to_string(p).with_context(|| format!("failed to read {:?}", p))
        };
        Ok(Snapshot {
            jobs: read(jobs.as_ref())?,
            partitions: read(partitions.as_ref())?,
        })
    }
}

/// Helper struct to use [`Ord`] with [`f64`].
#[derive(Clone, Copy, Debug)]
struct OrderF64(f64);

impl PartialEq for OrderF64 {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for OrderF64 {}

impl PartialOrd for OrderF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// GPUs in a partition weighted by their billing cost
fn billed_gpus(p: &PartitionGpus) -> OrderF64 {
    OrderF64(p.total as f64 * p.billing_weight)
}

/// One line of a user's job breakdown
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobRow {
    pub state: JobState,
    pub job_name: String,
    pub partition: String,
    pub count: usize,
    /// Compressed job ids, see [`compress_ids`]
    pub ids: String,
}

/// Break down `user`'s jobs by state, job name and partition.  Within a job name, partitions
/// with the most billed GPUs come first.
pub fn job_breakdown(index: &JobStatusIndex, user: &str, resources: &GpuResource) -> Vec<JobRow> {
    let jobs = match index.get(user) {
        Some(jobs) => jobs,
        None => return Vec::new(),
    };

    let weight = |partition: &str| {
        resources
            .partitions
            .get(partition)
            .map(billed_gpus)
            .unwrap_or(OrderF64(0.))
    };

    let mut rows = Vec::new();
    for state in JobState::ALL {
        for (job_name, by_partition) in jobs {
            let mut partitions: Vec<_> = by_partition
                .iter()
                .filter(|(_, j)| !j.get(state).is_empty())
                .collect();
            partitions.sort_by_key(|(p, _)| std::cmp::Reverse(weight(p.as_str())));

            for (partition, j) in partitions {
                let ids: Vec<JobId> = j.get(state).iter().map(|&(id, _)| id).collect();
                rows.push(JobRow {
                    state,
                    job_name: job_name.clone(),
                    partition: partition.clone(),
                    count: ids.len(),
                    ids: compress_ids(&ids),
                });
            }
        }
    }
    rows
}

#[derive(Clone, Debug, Serialize)]
pub struct Report<'a> {
    pub generated_at: DateTime<Local>,
    pub me: String,
    /// Release window width in seconds
    pub window: u64,
    /// Partitions, most billed GPUs first
    pub resources: GpuResource,
    /// All users, heaviest first
    pub users: Vec<RankedUser>,
    pub my_jobs: Vec<JobRow>,
    #[serde(skip)]
    pub directory: &'a UserDirectory,
}

impl<'a> Report<'a> {
    pub fn build(
        config: &Config,
        directory: &'a UserDirectory,
        snapshot: &Snapshot,
        now: DateTime<Local>,
    ) -> Report<'a> {
        let jobs = parse_entities(&snapshot.jobs, EntityKind::Job);
        let partitions = parse_entities(&snapshot.partitions, EntityKind::Partition);
        let mut agg = aggregate(&jobs, &partitions, now, config.window);
        agg.resources
            .partitions
            .sort_by(|_, a, _, b| billed_gpus(b).cmp(&billed_gpus(a)));

        Report {
            generated_at: now,
            me: config.me.clone(),
            window: config.window,
            users: rank_users(&agg.users),
            my_jobs: job_breakdown(&agg.jobs, &config.me, &agg.resources),
            resources: agg.resources,
            directory,
        }
    }

    /// Display name of `user`
    pub fn label<'b>(&'b self, user: &'b str) -> &'b str {
        self.directory.label(user)
    }
}
