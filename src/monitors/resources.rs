//! CPU and memory pressure alerts.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::storage::{append_journal, kinds, Database};
use crate::{Error, Result};

/// How often the resource monitor samples the machine.
pub const RESOURCE_INTERVAL: Duration = Duration::from_secs(10);

/// A process only counts as "top" above this share of the machine.
const TOP_PROCESS_FLOOR: f64 = 5.0;

/// Process with the largest CPU share in a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TopProcess {
    pub name: String,
    pub cpu_percent: f64,
}

/// One reading of machine load.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub top: Option<TopProcess>,
}

impl fmt::Display for ResourceSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CPU={:.1}%, RAM={:.1}%. Top process: ",
            self.cpu_percent, self.ram_percent
        )?;
        match &self.top {
            Some(top) => write!(f, "{} ({:.1}%)", top.name, top.cpu_percent),
            None => f.write_str("N/A (0.0%)"),
        }
    }
}

/// Source of resource samples.
pub trait ResourceProbe: Send {
    /// Take a sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform counters cannot be read.
    fn sample(&mut self) -> Result<ResourceSample>;
}

/// Alert thresholds, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceThresholds {
    pub cpu: f64,
    pub ram: f64,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            cpu: 85.0,
            ram: 90.0,
        }
    }
}

impl ResourceThresholds {
    /// Whether a sample is over either limit.
    #[must_use]
    pub fn exceeded_by(&self, sample: &ResourceSample) -> bool {
        sample.cpu_percent > self.cpu || sample.ram_percent > self.ram
    }
}

/// Journals a `resource-alert` whenever a sample crosses the thresholds.
pub struct ResourceMonitor {
    probe: Box<dyn ResourceProbe>,
    thresholds: ResourceThresholds,
    interval: Duration,
}

impl ResourceMonitor {
    /// Create a monitor with the default thresholds and interval.
    #[must_use]
    pub fn new(probe: Box<dyn ResourceProbe>) -> Self {
        Self {
            probe,
            thresholds: ResourceThresholds::default(),
            interval: RESOURCE_INTERVAL,
        }
    }

    /// Override the thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: ResourceThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Override the sampling interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sample once and journal an alert if a threshold is crossed.
    ///
    /// Returns the journal entry id when an alert was written.
    ///
    /// # Errors
    ///
    /// Returns an error if sampling or the journal write fails.
    pub fn tick(&mut self, db: &Database) -> Result<Option<i64>> {
        let sample = self.probe.sample()?;
        tracing::trace!(
            cpu = sample.cpu_percent,
            ram = sample.ram_percent,
            "Resource sample"
        );

        if !self.thresholds.exceeded_by(&sample) {
            return Ok(None);
        }

        let context = sample.to_string();
        let id = db.with_conn(|conn| {
            append_journal(conn, kinds::RESOURCE_ALERT, &context, None, None)
        })?;
        tracing::warn!(%context, "Resource alert recorded");
        Ok(Some(id))
    }

    /// Sample on every interval until `shutdown` fires.
    pub async fn run(self, db: Database, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            cpu = self.thresholds.cpu,
            ram = self.thresholds.ram,
            interval_secs = self.interval.as_secs(),
            "Resource monitor started"
        );

        let mut monitor = self;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => match monitor.tick_blocking(&db).await {
                    Some(next) => monitor = next,
                    None => break,
                },
            }
        }

        tracing::info!("Resource monitor stopped");
    }

    /// Sample on the blocking pool, since `/proc` reads and the journal
    /// write are synchronous. `None` if the blocking task died.
    async fn tick_blocking(mut self, db: &Database) -> Option<Self> {
        let db = db.clone();
        let sampled = tokio::task::spawn_blocking(move || {
            let result = self.tick(&db);
            (self, result)
        })
        .await;

        match sampled {
            Ok((monitor, result)) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Resource sample failed");
                }
                Some(monitor)
            }
            Err(e) => {
                tracing::error!(error = %e, "Resource sample task failed");
                None
            }
        }
    }
}

/// Cumulative CPU jiffies from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CpuTimes {
    total: u64,
    idle: u64,
}

/// Linux probe backed by `/proc`.
///
/// CPU figures are deltas against the previous sample; the first sample
/// falls back to the averages since boot.
#[derive(Debug, Default)]
pub struct ProcProbe {
    last_cpu: Option<CpuTimes>,
    last_procs: HashMap<u32, u64>,
}

impl ProcProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_processes() -> HashMap<u32, (String, u64)> {
        let mut procs = HashMap::new();
        let Ok(entries) = fs::read_dir("/proc") else {
            return procs;
        };

        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            // Processes exit between listing and reading.
            let Ok(stat) = fs::read_to_string(entry.path().join("stat")) else {
                continue;
            };
            if let Some(parsed) = parse_process_stat(&stat) {
                procs.insert(pid, parsed);
            }
        }
        procs
    }
}

impl ResourceProbe for ProcProbe {
    fn sample(&mut self) -> Result<ResourceSample> {
        let stat = fs::read_to_string("/proc/stat")?;
        let cpu = stat
            .lines()
            .next()
            .and_then(parse_cpu_line)
            .ok_or_else(|| Error::internal("unreadable cpu line in /proc/stat"))?;

        let meminfo = fs::read_to_string("/proc/meminfo")?;
        let ram_percent = parse_meminfo(&meminfo)
            .ok_or_else(|| Error::internal("unreadable /proc/meminfo"))?;

        let previous = self.last_cpu.unwrap_or_default();
        let total_delta = cpu.total.saturating_sub(previous.total);
        let idle_delta = cpu.idle.saturating_sub(previous.idle);
        let cpu_percent = percent(total_delta.saturating_sub(idle_delta), total_delta);

        let procs = Self::read_processes();
        let top = procs
            .iter()
            .filter_map(|(pid, (name, ticks))| {
                let before = self.last_procs.get(pid)?;
                let share = percent(ticks.saturating_sub(*before), total_delta);
                Some(TopProcess {
                    name: name.clone(),
                    cpu_percent: share,
                })
            })
            .max_by(|a, b| a.cpu_percent.total_cmp(&b.cpu_percent))
            .filter(|top| top.cpu_percent > TOP_PROCESS_FLOOR);

        self.last_cpu = Some(cpu);
        self.last_procs = procs.into_iter().map(|(pid, (_, t))| (pid, t)).collect();

        Ok(ResourceSample {
            cpu_percent,
            ram_percent,
            top,
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
fn parse_cpu_line(line: &str) -> Option<CpuTimes> {
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = fields.map(|f| f.parse().ok()).collect::<Option<_>>()?;
    if values.len() < 4 {
        return None;
    }
    // idle + iowait
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    // guest time is already folded into user and nice
    let total = values.iter().take(8).sum();
    Some(CpuTimes { total, idle })
}

/// Used memory as a percentage, from `MemTotal` and `MemAvailable`.
fn parse_meminfo(meminfo: &str) -> Option<f64> {
    let field = |name: &str| {
        meminfo.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            rest.split_whitespace().next()?.parse::<u64>().ok()
        })
    };
    let total = field("MemTotal")?;
    let available = field("MemAvailable")?;
    Some(percent(total.saturating_sub(available), total))
}

/// Command name and `utime + stime` from `/proc/<pid>/stat`.
fn parse_process_stat(stat: &str) -> Option<(String, u64)> {
    // The command name may itself contain spaces or parentheses.
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    let name = stat.get(open + 1..close)?.to_string();
    let rest: Vec<&str> = stat.get(close + 1..)?.split_whitespace().collect();
    // rest[0] is the state field (3); utime and stime are fields 14 and 15.
    let utime: u64 = rest.get(11)?.parse().ok()?;
    let stime: u64 = rest.get(12)?.parse().ok()?;
    Some((name, utime + stime))
}
