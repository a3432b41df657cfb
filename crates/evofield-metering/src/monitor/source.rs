//! Load sources
//!
//! Provides the pluggable origin of CPU and memory load:
//! - SawtoothLoad: deterministic synthetic ramp
//! - ProcfsLoad: Linux `/proc/stat` and `/proc/meminfo`
//! - ScriptedLoad: replays a fixed sequence

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Load source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One load reading, both axes as fractions in `[0, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSample {
    pub cpu: f64,
    pub memory: f64,
}

impl LoadSample {
    pub fn new(cpu: f64, memory: f64) -> Self {
        Self { cpu, memory }
    }
}

/// Origin of load readings
pub trait LoadSource: Send {
    /// Take the next reading
    fn sample(&mut self) -> Result<LoadSample, SourceError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Deterministic saw-tooth generator
///
/// CPU ramps 0.30 → 0.80 by 0.01 per sample; memory ramps 0.40 → 0.70 by
/// 0.005 per sample. Both wrap back to 0.30.
#[derive(Debug, Clone)]
pub struct SawtoothLoad {
    cpu: f64,
    memory: f64,
}

impl SawtoothLoad {
    const CPU_START: f64 = 0.3;
    const CPU_STEP: f64 = 0.01;
    const CPU_PEAK: f64 = 0.8;
    const MEMORY_START: f64 = 0.4;
    const MEMORY_STEP: f64 = 0.005;
    const MEMORY_PEAK: f64 = 0.7;
    const WRAP_TO: f64 = 0.3;

    pub fn new() -> Self {
        Self {
            cpu: Self::CPU_START,
            memory: Self::MEMORY_START,
        }
    }
}

impl Default for SawtoothLoad {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSource for SawtoothLoad {
    fn sample(&mut self) -> Result<LoadSample, SourceError> {
        self.cpu += Self::CPU_STEP;
        if self.cpu > Self::CPU_PEAK {
            self.cpu = Self::WRAP_TO;
        }
        self.memory += Self::MEMORY_STEP;
        if self.memory > Self::MEMORY_PEAK {
            self.memory = Self::WRAP_TO;
        }
        Ok(LoadSample::new(self.cpu, self.memory))
    }

    fn name(&self) -> &'static str {
        "sawtooth"
    }
}

/// Aggregate CPU jiffies from the first `/proc/stat` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

/// Linux procfs reader
///
/// CPU load is the busy share of jiffies since the previous sample, so the
/// first reading reports zero CPU.
#[derive(Debug, Clone)]
pub struct ProcfsLoad {
    root: PathBuf,
    previous: Option<CpuTimes>,
}

impl ProcfsLoad {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Read from an alternate procfs mount
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            previous: None,
        }
    }

    /// Whether the procfs files are readable on this host
    pub fn is_available(&self) -> bool {
        self.root.join("stat").is_file() && self.root.join("meminfo").is_file()
    }
}

impl Default for ProcfsLoad {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSource for ProcfsLoad {
    fn sample(&mut self) -> Result<LoadSample, SourceError> {
        let stat = fs::read_to_string(self.root.join("stat"))?;
        let meminfo = fs::read_to_string(self.root.join("meminfo"))?;

        let times = parse_cpu_times(&stat)?;
        let cpu = match self.previous {
            Some(prev) if times.total > prev.total => {
                times.busy.saturating_sub(prev.busy) as f64 / (times.total - prev.total) as f64
            }
            _ => 0.0,
        };
        self.previous = Some(times);

        Ok(LoadSample::new(cpu.clamp(0.0, 1.0), parse_memory_usage(&meminfo)?))
    }

    fn name(&self) -> &'static str {
        "procfs"
    }
}

fn parse_cpu_times(stat: &str) -> Result<CpuTimes, SourceError> {
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SourceError::Parse("missing aggregate cpu line".into()))?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .map(|f| {
            f.parse::<u64>()
                .map_err(|e| SourceError::Parse(format!("cpu field {f:?}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if fields.len() < 4 {
        return Err(SourceError::Parse(format!(
            "expected at least 4 cpu fields, got {}",
            fields.len()
        )));
    }

    // user nice system idle iowait irq softirq steal
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    let total: u64 = fields.iter().take(8).sum();
    Ok(CpuTimes {
        busy: total.saturating_sub(idle),
        total,
    })
}

fn parse_memory_usage(meminfo: &str) -> Result<f64, SourceError> {
    let field = |key: &str| -> Option<u64> {
        meminfo
            .lines()
            .find(|l| l.starts_with(key))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse().ok())
    };

    let total = field("MemTotal:")
        .filter(|t| *t > 0)
        .ok_or_else(|| SourceError::Parse("missing MemTotal".into()))?;
    let available = field("MemAvailable:")
        .or_else(|| field("MemFree:"))
        .ok_or_else(|| SourceError::Parse("missing MemAvailable".into()))?;

    Ok((1.0 - available as f64 / total as f64).clamp(0.0, 1.0))
}

/// Replays a fixed sequence, repeating the last reading once exhausted
#[derive(Debug, Clone, Default)]
pub struct ScriptedLoad {
    queue: VecDeque<LoadSample>,
    last: LoadSample,
}

impl ScriptedLoad {
    pub fn new(samples: impl IntoIterator<Item = LoadSample>) -> Self {
        Self {
            queue: samples.into_iter().collect(),
            last: LoadSample::default(),
        }
    }

    /// A source that always reports the same load
    pub fn constant(cpu: f64, memory: f64) -> Self {
        Self {
            queue: VecDeque::new(),
            last: LoadSample::new(cpu, memory),
        }
    }
}

impl LoadSource for ScriptedLoad {
    fn sample(&mut self) -> Result<LoadSample, SourceError> {
        if let Some(next) = self.queue.pop_front() {
            self.last = next;
        }
        Ok(self.last)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
