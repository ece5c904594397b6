use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use archappl::{time, Archive, Batch, Config, MatchMode, TimeSpec};
use chrono::{DateTime, Local, Utc};
use futures::future::try_join_all;
use futures::StreamExt;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "aatool",
    about = "Query the EPICS Archiver Appliance: search archived PV names and fetch raw or binned samples."
)]
struct Opt {
    /// Config file path
    #[structopt(short = "C", long, global = true, parse(from_os_str))]
    conf: Option<PathBuf>,

    /// Operation timeout in seconds
    #[structopt(short = "w", long, global = true, default_value = "30")]
    timeout: f64,

    /// Make more noise
    #[structopt(short = "v", long, global = true, parse(from_occurrences))]
    verbose: usize,

    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(StructOpt, Debug)]
struct MatchOpts {
    /// Match names as wildcard patterns
    #[structopt(short = "W", long, conflicts_with = "regexp", conflicts_with = "exact")]
    wildcard: bool,

    /// Match names as regular expressions (default)
    #[structopt(short = "R", long)]
    regexp: bool,

    /// Match names exactly
    #[structopt(long, conflicts_with = "regexp")]
    exact: bool,
}

impl MatchOpts {
    fn mode(&self) -> MatchMode {
        if self.exact {
            MatchMode::Exact
        } else if self.wildcard {
            MatchMode::Wildcard
        } else {
            MatchMode::Regex
        }
    }
}

#[derive(StructOpt, Debug)]
enum Cmd {
    /// Search for archived PV names
    Grep {
        #[structopt(flatten)]
        matching: MatchOpts,

        /// PV name patterns (default: everything)
        #[structopt(name = "PATTERN")]
        names: Vec<String>,
    },

    /// Print samples in a time range
    Get {
        #[structopt(flatten)]
        matching: MatchOpts,

        /// Start of query window ("now", RFC 3339, or eg. -1h)
        #[structopt(short = "s", long)]
        start: Option<String>,

        /// End of query window
        #[structopt(short = "e", long)]
        end: Option<String>,

        /// Query batch size in samples
        #[structopt(short = "l", long)]
        chunk: Option<usize>,

        /// Query method (raw or plot)
        #[structopt(short = "H", long, default_value = "raw")]
        how: String,

        /// Display times in UTC instead of local time
        #[structopt(long)]
        utc: bool,

        /// PV names/patterns
        #[structopt(name = "NAME", required = true)]
        names: Vec<String>,
    },
}

fn main() {
    let opt = Opt::from_args();
    stderrlog::new()
        .verbosity(opt.verbose + 2)
        .init()
        .expect("logger init");

    match run(opt) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        }
    }
}

fn run(opt: Opt) -> Result<i32> {
    let mut conf = Config::load(opt.conf.as_deref()).context("loading configuration")?;
    conf.timeout = opt.timeout;
    log::debug!("{conf:?}");

    let timeout = Duration::from_secs_f64(opt.timeout);
    let rt = tokio::runtime::Runtime::new()?;
    match rt.block_on(tokio::time::timeout(timeout, amain(opt.cmd, conf))) {
        Ok(result) => result,
        Err(_) => {
            eprintln!("Unexpected timeout");
            Ok(1)
        }
    }
}

async fn amain(cmd: Cmd, conf: Config) -> Result<i32> {
    let archive = Archive::connect(conf).await?;
    match cmd {
        Cmd::Grep { matching, names } => grep(&archive, matching.mode(), names).await,
        Cmd::Get {
            matching,
            start,
            end,
            chunk,
            how,
            utc,
            names,
        } => {
            get(
                &archive,
                matching.mode(),
                start.as_deref(),
                end.as_deref(),
                chunk,
                &how,
                utc,
                names,
            )
            .await
        }
    }
}

async fn grep(archive: &Archive, mode: MatchMode, names: Vec<String>) -> Result<i32> {
    let names = if names.is_empty() {
        vec![".*".to_string()]
    } else {
        names
    };

    let groups = try_join_all(names.iter().map(|name| archive.search(name, mode))).await?;
    let mut pvs: Vec<String> = groups.into_iter().flatten().collect();
    pvs.sort();
    pvs.dedup();

    for pv in &pvs {
        println!("{pv}");
    }
    Ok(if pvs.is_empty() { 1 } else { 0 })
}

#[allow(clippy::too_many_arguments)]
async fn get(
    archive: &Archive,
    mode: MatchMode,
    start: Option<&str>,
    end: Option<&str>,
    chunk: Option<usize>,
    how: &str,
    utc: bool,
    names: Vec<String>,
) -> Result<i32> {
    let groups = try_join_all(names.iter().map(|name| archive.search(name, mode))).await?;
    let mut pvs: Vec<String> = Vec::new();
    for pv in groups.into_iter().flatten() {
        if !pvs.contains(&pv) {
            pvs.push(pv);
        }
    }
    if pvs.is_empty() {
        eprintln!("No PVs");
        return Ok(1);
    }
    let print_name = pvs.len() > 1;

    let now = Utc::now();
    let start = match start {
        Some(text) => time::parse_timespec(text, now)?,
        None => TimeSpec::Relative(chrono::Duration::hours(-1)),
    };
    let end = match end {
        Some(text) => time::parse_timespec(text, now)?,
        None => TimeSpec::Absolute(now),
    };
    log::debug!("query window {start:?} .. {end:?}");

    for pv in &pvs {
        match how {
            "raw" => {
                let stream = archive.raw_iter(pv, start, end, chunk);
                futures::pin_mut!(stream);
                while let Some(batch) = stream.next().await {
                    print_batch(pv, print_name, utc, &batch?);
                }
            }
            "plot" => {
                if let Some(batch) = archive.plot(pv, start, end, chunk).await? {
                    print_batch(pv, print_name, utc, &batch);
                }
            }
            other => bail!("unknown query method {other:?} (expected raw or plot)"),
        }
    }
    Ok(0)
}

fn print_batch(pv: &str, print_name: bool, utc: bool, batch: &Batch) {
    let scalar = batch.element_count == 1;
    for row in 0..batch.rows() {
        let meta = &batch.meta[row];
        let mut out = vec![format_stamp(meta.sec, meta.ns, utc)];
        if print_name {
            out.push(pv.to_string());
        }

        // alarm goes after the value for scalars, before the (long)
        // value list for waveforms
        if scalar {
            out.push(batch.values.format_row(row, batch.element_count));
        }
        if meta.severity != 0 {
            out.push(severity_name(meta.severity));
            out.push(meta.status.to_string());
        }
        if !scalar {
            out.push(batch.values.format_row(row, batch.element_count));
        }

        println!("{}", out.join(" "));
    }
}

fn format_stamp(sec: u32, ns: u32, utc: bool) -> String {
    let t: DateTime<Utc> = DateTime::from_timestamp(i64::from(sec), ns.min(999_999_999))
        .unwrap_or_default();
    if utc {
        t.format("%m-%d %H:%M:%S%.6f").to_string()
    } else {
        t.with_timezone(&Local).format("%m-%d %H:%M:%S%.6f").to_string()
    }
}

fn severity_name(severity: u32) -> String {
    match severity {
        1 => "MINOR".to_string(),
        2 => "MAJOR".to_string(),
        3 => "INVALID".to_string(),
        3904 => "DISCONNECT".to_string(),
        other => other.to_string(),
    }
}
