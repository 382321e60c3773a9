//! Typed views over parsed `scontrol` records.
use crate::scontrol::{EntityRecord, Value};
use crate::*;
use std::fmt::Display;

/// Error for a record which cannot take part in aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    /// A required field was missing from the record
    MissingField(&'static str),
    /// A field held a different kind of value than expected
    UnexpectedValue {
        field: &'static str,
        found: Value,
    },
    Parse(ParseError),
}

impl Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::MissingField(n) => write!(f, "Missing field: {}", n),
            RecordError::UnexpectedValue { field, found } => {
                write!(f, "Unexpected value for `{}`: {:?}", field, found)
            }
            RecordError::Parse(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<ParseError> for RecordError {
    fn from(e: ParseError) -> Self {
        RecordError::Parse(e)
    }
}

fn require_field<'a>(
    record: &'a EntityRecord,
    field: &'static str,
) -> StdResult<&'a Value, RecordError> {
    record.get(field).ok_or(RecordError::MissingField(field))
}

fn require_scalar<'a>(
    record: &'a EntityRecord,
    field: &'static str,
) -> StdResult<&'a str, RecordError> {
    match require_field(record, field)? {
        Value::Scalar(s) => Ok(s),
        other => Err(RecordError::UnexpectedValue {
            field,
            found: other.clone(),
        }),
    }
}

/// Strip the numeric uid Slurm appends to user names, as in `alice(1001)`.
pub fn strip_uid(user: &str) -> &str {
    user.split('(').next().unwrap_or(user).trim()
}

/// GPUs requested by one `TresPerNode` entry, or `None` if the entry is not a GPU request.
///
/// Accepts `gres:gpu:2`, `gres/gpu:2`, `gres/gpu:a100:2` and the count-less `gres/gpu`.
fn gpu_request(entry: &str) -> ParseResult<Option<u64>> {
    let spec = entry
        .strip_prefix("gres:")
        .or_else(|| entry.strip_prefix("gres/"))
        .unwrap_or(entry);

    let mut parts = spec.split(':');
    if parts.next() != Some("gpu") {
        return Ok(None);
    }
    match parts.last() {
        None => Ok(Some(1)),
        Some(n) if n.chars().all(|c| c.is_ascii_digit()) => n
            .parse()
            .map(Some)
            .map_err(|_| ParseError::GpuCount(entry.to_string())),
        // A typed request without a count, e.g. `gpu:a100`
        Some(n) if n.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => Ok(Some(1)),
        Some(_) => Err(ParseError::GpuCount(entry.to_string())),
    }
}

/// GPU count held in a job's `TresPerNode` field; jobs without one hold no GPUs.
pub fn gpu_count(tres_per_node: Option<&Value>) -> ParseResult<u64> {
    let mut total = 0;
    match tres_per_node {
        None | Some(Value::Null) => {}
        Some(Value::Scalar(s)) => total += gpu_request(s)?.unwrap_or(0),
        Some(Value::List(entries)) => {
            for e in entries {
                total += gpu_request(e)?.unwrap_or(0);
            }
        }
        Some(Value::Map(m)) => {
            for (k, v) in m {
                if gpu_request(k)?.is_some() {
                    total += v
                        .parse::<u64>()
                        .map_err(|_| ParseError::GpuCount(format!("{}={}", k, v)))?;
                }
            }
        }
    }
    Ok(total)
}

/// A pending or running job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job<'a> {
    pub id: JobId,
    pub state: JobState,
    pub name: &'a str,
    pub user: &'a str,
    /// Candidate partitions.  Pending jobs may list several.
    pub partitions: Vec<&'a str>,
    pub gpus: u64,
    time_limit: Option<&'a str>,
    run_time: Option<&'a str>,
}

impl<'a> Job<'a> {
    /// Build a job from its record.  Returns `Ok(None)` for jobs in untracked states.
    pub fn from_record(id: JobId, record: &'a EntityRecord) -> StdResult<Option<Self>, RecordError> {
        let state = match record.get(fieldname::JOB_STATE).and_then(Value::as_scalar) {
            Some(s) => match JobState::parse(s) {
                Some(state) => state,
                None => return Ok(None),
            },
            None => return Ok(None),
        };

        let partitions = match require_field(record, fieldname::PARTITION)? {
            Value::Scalar(p) => vec![p.as_str()],
            Value::List(ps) => ps.iter().map(String::as_str).collect(),
            other => {
                return Err(RecordError::UnexpectedValue {
                    field: fieldname::PARTITION,
                    found: other.clone(),
                })
            }
        };

        Ok(Some(Job {
            id,
            state,
            name: require_scalar(record, fieldname::JOB_NAME)?,
            user: strip_uid(require_scalar(record, fieldname::USER_ID)?),
            partitions,
            gpus: gpu_count(record.get(fieldname::TRES_PER_NODE))?,
            time_limit: record.get(fieldname::TIME_LIMIT).and_then(Value::as_scalar),
            run_time: record.get(fieldname::RUN_TIME).and_then(Value::as_scalar),
        }))
    }

    /// Seconds until the job hits its time limit.  Jobs already past their limit have zero left.
    pub fn time_left(&self) -> ParseResult<u64> {
        let limit = parse_duration(self.time_limit.unwrap_or_default())?;
        let run = parse_duration(self.run_time.unwrap_or_default())?;
        Ok(limit.saturating_sub(run))
    }
}

/// A partition which grants GPUs.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<'a> {
    pub name: &'a str,
    /// The `GRES/gpu` billing weight
    pub billing_weight: f64,
    pub total_gpus: u64,
}

impl<'a> Partition<'a> {
    /// Returns `None` for partitions whose GPU billing weight is zero or unset.
    pub fn gating(name: &'a str, record: &'a EntityRecord) -> Option<Self> {
        let weight = record
            .get(fieldname::TRES_BILLING_WEIGHTS)
            .and_then(|w| w.lookup(fieldname::BILLING_GPU))?;
        let parsed = weight.parse::<f64>().ok();
        if weight == "0" || parsed == Some(0.0) {
            return None;
        }
        let billing_weight = parsed.unwrap_or(0.0);

        let total_gpus = match record
            .get(fieldname::TRES)
            .and_then(|t| t.lookup(fieldname::TRES_GPU))
        {
            Some(n) => n.parse().unwrap_or_else(|_| {
                tracing::warn!(partition = name, "invalid GPU count in TRES: {}", n);
                0
            }),
            None => 0,
        };

        Some(Partition {
            name,
            billing_weight,
            total_gpus,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scontrol::{parse_entities, EntityKind};

    #[test]
    fn gpu_counts() {
        let s = |s: &str| Value::Scalar(s.to_string());
        assert_eq!(gpu_count(None), Ok(0));
        assert_eq!(gpu_count(Some(&Value::Null)), Ok(0));
        assert_eq!(gpu_count(Some(&s("gres:gpu:2"))), Ok(2));
        assert_eq!(gpu_count(Some(&s("gres/gpu:4"))), Ok(4));
        assert_eq!(gpu_count(Some(&s("gres/gpu:a100:3"))), Ok(3));
        assert_eq!(gpu_count(Some(&s("gres/gpu"))), Ok(1));
        assert_eq!(gpu_count(Some(&s("gres/shard:2"))), Ok(0));
        assert_eq!(gpu_count(Some(&Value::parse("gres/gpu:2,gres/shard:8"))), Ok(2));
        assert!(gpu_count(Some(&s("gres/gpu:-1"))).is_err());
    }

    #[test]
    fn uid_suffix() {
        assert_eq!(strip_uid("alice(1001)"), "alice");
        assert_eq!(strip_uid("bob"), "bob");
        assert_eq!(strip_uid(" carol (7)"), "carol");
    }

    #[test]
    fn jobs_from_records() {
        let text = "JobId=1 JobName=a UserId=alice(1) JobState=RUNNING Partition=gpuA \
            TresPerNode=gres/gpu:2 TimeLimit=1-00:00:00 RunTime=23:00:00 \
            JobId=2 JobName=b UserId=bob(2) JobState=COMPLETED Partition=gpuA \
            JobId=3 JobName=c UserId=carol(3) JobState=PENDING Partition=gpuA,gpuB \
            JobId=4 JobName=d JobState=PENDING Partition=gpuA \
            JobId=5 JobName=e UserId=dan(4) JobState=RUNNING Partition=gpuA \
            TimeLimit=01:00:00 RunTime=01:00:05";
        let records: IndexMap<JobId, EntityRecord> = parse_entities(text, EntityKind::Job);

        let j1 = Job::from_record(1, &records[&1]).unwrap().unwrap();
        assert_eq!(j1.user, "alice");
        assert_eq!(j1.gpus, 2);
        assert_eq!(j1.partitions, vec!["gpuA"]);
        assert_eq!(j1.time_left(), Ok(3600));

        assert_eq!(Job::from_record(2, &records[&2]), Ok(None));

        let j3 = Job::from_record(3, &records[&3]).unwrap().unwrap();
        assert_eq!(j3.partitions, vec!["gpuA", "gpuB"]);
        assert_eq!(j3.gpus, 0);
        assert!(j3.time_left().is_err());

        assert_eq!(
            Job::from_record(4, &records[&4]),
            Err(RecordError::MissingField(fieldname::USER_ID))
        );

        let j5 = Job::from_record(5, &records[&5]).unwrap().unwrap();
        assert_eq!(j5.time_left(), Ok(0));
    }

    #[test]
    fn gating_partitions() {
        let text = "PartitionName=gpuA TRES=cpu=8,gres/gpu=8 TRESBillingWeights=CPU=1,GRES/gpu=2 \
            PartitionName=cpu TRES=cpu=64,mem=1T TRESBillingWeights=CPU=1,GRES/gpu=0 \
            PartitionName=plain TRES=cpu=64,mem=1T \
            PartitionName=solo TRESBillingWeights=GRES/gpu=0.5";
        let records: IndexMap<String, EntityRecord> = parse_entities(text, EntityKind::Partition);

        let a = Partition::gating("gpuA", &records["gpuA"]).unwrap();
        assert_eq!(a.total_gpus, 8);
        assert_eq!(a.billing_weight, 2.0);
        assert!(Partition::gating("cpu", &records["cpu"]).is_none());
        assert!(Partition::gating("plain", &records["plain"]).is_none());

        let solo = Partition::gating("solo", &records["solo"]).unwrap();
        assert_eq!(solo.total_gpus, 0);
        assert_eq!(solo.billing_weight, 0.5);
    }
}
