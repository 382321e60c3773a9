use crate::*;

/// Compress a set of ids into runs, e.g. `[1, 2, 3, 5, 7, 8]` becomes `{1..3} 5 {7..8}`.
pub fn compress_ids(ids: &[JobId]) -> String {
    let mut ids = ids.to_vec();
    ids.sort_unstable();

    let mut runs: Vec<(JobId, JobId)> = Vec::new();
    for id in ids {
        match runs.last_mut() {
            Some((_, last)) if id - *last <= 1 => *last = id,
            _ => runs.push((id, id)),
        }
    }

    let runs: Vec<String> = runs
        .into_iter()
        .map(|(first, last)| {
            if first == last {
                first.to_string()
            } else {
                format!("{{{}..{}}}", first, last)
            }
        })
        .collect();
    runs.join(" ")
}
