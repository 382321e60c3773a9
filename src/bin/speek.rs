use chrono::Local;
use clap::Parser;
use speek::render::render;
use speek::report::{Report, Snapshot};
use speek::users::UserDirectory;
use speek::*;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Peek into Slurm GPU usage: free GPUs per partition, upcoming releases and who is using what.
#[derive(Parser, Clone, Debug)]
struct ClArgs {
    /// Highlighted user, defaults to the current user.
    #[clap(short, long)]
    user: Option<String>,

    /// Redraw continuously.
    #[clap(short, long)]
    live: bool,

    /// Seconds between redraws in live mode.
    #[clap(long, default_value_t = 1)]
    interval: u64,

    /// CSV file of display names with columns user,name,affiliation,title.  Defaults to
    /// users.csv in the speek config directory, if present.
    #[clap(short, long)]
    file: Option<PathBuf>,

    /// Time window width for upcoming release, in {m: minutes, h: hours, d: days}.
    #[clap(short = 't', long = "t-avail", default_value = "5 m", parse(try_from_str = parse_time_window))]
    window: u64,

    /// Read `scontrol show job` output from a file instead of running scontrol.
    #[clap(long)]
    jobs_file: Option<PathBuf>,

    /// Read `scontrol show partition` output from a file instead of running scontrol.
    #[clap(long)]
    partitions_file: Option<PathBuf>,

    /// Print the report as JSON.
    #[clap(long)]
    json: bool,

    /// Log debug messages to stderr.
    #[clap(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn snapshot(args: &ClArgs) -> Result<Snapshot> {
    match (&args.jobs_file, &args.partitions_file) {
        (Some(jobs), Some(partitions)) => Snapshot::from_files(jobs, partitions),
        (None, None) => Snapshot::fetch(),
        _ => bail!("--jobs-file and --partitions-file must be given together"),
    }
}

fn show(args: &ClArgs, config: &Config, directory: &UserDirectory) -> Result<()> {
    let report = Report::build(config, directory, &snapshot(args)?, Local::now());
    let out = std::io::stdout();
    let mut out = out.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        out.write_all(b"\n")?;
    } else {
        writeln!(out, "{}", render(&report))?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    reset_sigpipe();
    let args = ClArgs::parse();
    init_logging(args.verbose);
    let config = Config::new(args.user.clone(), args.window, args.file.clone());
    let directory = UserDirectory::for_config(&config);

    if !args.live {
        return show(&args, &config, &directory);
    }

    loop {
        print!("\x1B[2J\x1B[H");
        if let Err(e) = show(&args, &config, &directory) {
            tracing::error!("{:#}", e);
        }
        std::thread::sleep(Duration::from_secs(args.interval.max(1)));
    }
}
