use crate::aggregate::StateCounts;
use crate::ranking::RankedUser;
use crate::report::Report;
use crate::*;
use comfy_table::{Attribute, Cell, Color, Table};
use format_num::format_num;

const CROWN: &str = "👑";
const HOURGLASS: &str = "⏳";

fn state_marker(state: JobState) -> &'static str {
    match state {
        JobState::Running => CROWN,
        JobState::Pending => HOURGLASS,
    }
}

fn usage_marker(usage: f64) -> &'static str {
    if usage >= 100. {
        "☠️ "
    } else if usage > 90. {
        "🔥"
    } else if usage == 0. {
        "🏖️ "
    } else if usage < 10. {
        "❄️ "
    } else {
        ""
    }
}

/// `running(pending)`, leaving out whichever part is zero
fn counts(c: StateCounts) -> String {
    let mut s = String::new();
    if c.running > 0 {
        s.push_str(&c.running.to_string());
    }
    if c.pending > 0 {
        s.push_str(&format!("({})", c.pending));
    }
    s
}

fn usage(u: Option<f64>) -> String {
    match u {
        Some(u) => format!("{}{:.2}%", usage_marker(u), u),
        None => "N/A".to_string(),
    }
}

fn gpus(n: impl Into<f64>) -> String {
    format_num!(",.0", n.into())
}

/// Shortest form of a window width, e.g. `5m`
fn window_width(secs: u64) -> String {
    for (unit, len) in [("d", 86_400), ("h", 3600), ("m", 60)] {
        if secs % len == 0 {
            return format!("{}{}", secs / len, unit);
        }
    }
    format!("{}s", secs)
}

fn user_row(r: &Report, u: &RankedUser) -> Vec<Cell> {
    let mut row = vec![Cell::new(format!("{} {}", u.rank, r.label(&u.user)))];
    for (name, p) in &r.resources.partitions {
        let mut cell = String::new();
        for state in [JobState::Pending, JobState::Running] {
            if p.max_user(state) == Some(u.user.as_str()) {
                cell.push_str(state_marker(state));
            }
        }
        cell.push_str(&counts(u.usage.partition(name)));
        row.push(Cell::new(cell));
    }
    row.push(Cell::new(counts(u.usage.total)));

    if u.user == r.me {
        row.into_iter()
            .map(|c| c.fg(Color::Black).bg(Color::Green))
            .collect()
    } else {
        row
    }
}

/// Per-partition GPU availability followed by the user ranking.
pub fn cluster_table(r: &Report) -> Table {
    let parts = &r.resources.partitions;
    let global = &r.resources.global;

    let mut t = Table::new();
    let mut header = vec![Cell::new("Cluster Usage").add_attribute(Attribute::Bold)];
    header.extend(parts.keys().map(Cell::new));
    header.push(Cell::new("Total"));
    t.set_header(header);

    let mut row = vec![Cell::new("Available")];
    row.extend(parts.values().map(|p| Cell::new(gpus(p.available as f64))));
    row.push(Cell::new(gpus(global.available as f64)));
    t.add_row(row);

    let mut row = vec![Cell::new("Total")];
    row.extend(parts.values().map(|p| Cell::new(gpus(p.total as f64))));
    row.push(Cell::new(gpus(global.total as f64)));
    t.add_row(row);

    let mut row = vec![Cell::new("Usage")];
    row.extend(parts.values().map(|p| Cell::new(usage(p.usage))));
    row.push(Cell::new(usage(global.usage)));
    t.add_row(row);

    let mut row = vec![Cell::new(format!(
        "Until release (~{})",
        window_width(r.window)
    ))];
    row.extend(parts.values().map(|p| {
        Cell::new(
            p.upcoming_release
                .as_ref()
                .map(|e| e.label.as_str())
                .unwrap_or_default(),
        )
    }));
    row.push(Cell::new(""));
    t.add_row(row);

    for u in &r.users {
        t.add_row(user_row(r, u));
    }
    t
}

/// The highlighted user's jobs, or `None` if they have none.
pub fn job_table(r: &Report) -> Option<Table> {
    if r.my_jobs.is_empty() {
        return None;
    }
    let mut t = Table::new();
    t.set_header(vec!["Status", "Job", "GPU", "#", "ids"]);

    let mut last_state = None;
    let mut last_name = None;
    for j in &r.my_jobs {
        let new_state = last_state != Some(j.state);
        let new_name = new_state || last_name != Some(j.job_name.as_str());
        t.add_row(vec![
            if new_state { j.state.to_string() } else { String::new() },
            if new_name { j.job_name.clone() } else { String::new() },
            j.partition.clone(),
            j.count.to_string(),
            j.ids.clone(),
        ]);
        last_state = Some(j.state);
        last_name = Some(j.job_name.as_str());
    }
    Some(t)
}

pub fn render(r: &Report) -> String {
    let mut out = cluster_table(r).to_string();
    if let Some(jobs) = job_table(r) {
        out.push_str(&format!("\n\n{}'s Job Status\n{}", r.label(&r.me), jobs));
    }
    out
}
