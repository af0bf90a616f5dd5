//! Command-line surface for the `ossim` binary. The library crate
//! (`ossim-core`) stays CLI-agnostic and only ever sees already-parsed
//! policy enums.

use clap::{Parser, ValueEnum};
use ossim_core::memory::ReplacementPolicy;
use ossim_core::scheduler::SchedulingPolicy;

const DEFAULT_SEED: u64 = 42;
const DEFAULT_QUANTUM: u64 = 100;
const DEFAULT_SJF_ALPHA: f64 = 0.5;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SchedChoice {
    Fcfs,
    Sjf,
    Rr,
    Priority,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReplaceChoice {
    None,
    Random,
    Fifo,
    Lru,
    Clock,
}

impl From<ReplaceChoice> for ReplacementPolicy {
    fn from(choice: ReplaceChoice) -> Self {
        match choice {
            ReplaceChoice::None => ReplacementPolicy::NoReplacement,
            ReplaceChoice::Random => ReplacementPolicy::Random,
            ReplaceChoice::Fifo => ReplacementPolicy::Fifo,
            ReplaceChoice::Lru => ReplacementPolicy::Lru,
            ReplaceChoice::Clock => ReplacementPolicy::Clock,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "ossim", about = "A pedagogical OS kernel simulator")]
pub struct Args {
    /// Run a single executable.
    #[arg(short = 'x', value_name = "EXECUTABLE")]
    pub executable: Option<String>,

    /// Run a batch scenario file (`algo\nprog [prio]\n...`).
    #[arg(short = 'F', value_name = "BATCHFILE")]
    pub batch_file: Option<String>,

    /// RNG seed for the Random page-replacement policy.
    #[arg(long = "rs", default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Scheduling algorithm, when not overridden by a batch file's first line.
    #[arg(long = "sched", value_enum, default_value_t = SchedChoice::Fcfs)]
    pub sched: SchedChoice,

    /// Round-robin quantum, in simulator ticks.
    #[arg(long = "quantum", default_value_t = DEFAULT_QUANTUM)]
    pub quantum: u64,

    /// SJF/priority exponential-smoothing constant, in (0, 1].
    #[arg(long = "alpha", default_value_t = DEFAULT_SJF_ALPHA)]
    pub alpha: f64,

    /// Page-replacement policy.
    #[arg(long = "replace", value_enum, default_value_t = ReplaceChoice::Random)]
    pub replace: ReplaceChoice,

    /// Number of physical frames in the simulated machine.
    #[arg(long = "frames", default_value_t = 32)]
    pub num_frames: usize,

    /// Debug channel mask: comma-separated channel names or a raw bitmask.
    #[arg(short = 'd', long = "debug", default_value = "")]
    pub debug_mask: String,

    /// Also emit the statistics snapshot as a single line of JSON.
    #[arg(long = "stats-json")]
    pub stats_json: bool,
}

impl Args {
    pub fn scheduling_policy(&self) -> SchedulingPolicy {
        match self.sched {
            SchedChoice::Fcfs => SchedulingPolicy::Fcfs,
            SchedChoice::Sjf => SchedulingPolicy::ShortestJobFirst { alpha: self.alpha },
            SchedChoice::Rr => SchedulingPolicy::RoundRobin { quantum: self.quantum },
            SchedChoice::Priority => SchedulingPolicy::Priority { alpha: self.alpha },
        }
    }
}
