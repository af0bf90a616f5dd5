//! The four pluggable scheduling policies, as a tagged enum rather than a
//! trait-object dispatch chain — the critical section that consults this
//! stays short and inlinable, per the "policy pluggability" design note.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulingPolicy {
    /// Non-preemptive first-come first-served.
    Fcfs,
    /// Non-preemptive shortest-job-first with exponential burst estimation:
    /// `predicted := alpha * actual + (1 - alpha) * predicted`.
    ShortestJobFirst { alpha: f64 },
    /// Preemptive round-robin with a fixed quantum, in ticks.
    RoundRobin { quantum: u64 },
    /// Preemptive UNIX-style priority with decaying CPU-usage feedback.
    Priority { alpha: f64 },
}

impl SchedulingPolicy {
    /// Maps the scenario-file algorithm digit (1-4) to a policy, given the
    /// CLI-supplied quantum and burst/decay smoothing constant.
    pub fn from_number(n: u8, quantum: u64, alpha: f64) -> Option<Self> {
        match n {
            1 => Some(Self::Fcfs),
            2 => Some(Self::ShortestJobFirst { alpha }),
            3 => Some(Self::RoundRobin { quantum }),
            4 => Some(Self::Priority { alpha }),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Fcfs => "FCFS",
            Self::ShortestJobFirst { .. } => "SJF",
            Self::RoundRobin { .. } => "Round Robin",
            Self::Priority { .. } => "UNIX Priority",
        }
    }

    pub fn quantum(&self) -> Option<u64> {
        match self {
            Self::RoundRobin { quantum } => Some(*quantum),
            _ => None,
        }
    }

    pub fn is_preemptive(&self) -> bool {
        matches!(self, Self::RoundRobin { .. } | Self::Priority { .. })
    }

    /// Smaller `thread_priority` dispatches first, under SJF and Priority.
    /// FCFS and RR ignore the key entirely and use plain queue order.
    pub fn dispatch_by_key(&self) -> bool {
        matches!(self, Self::ShortestJobFirst { .. } | Self::Priority { .. })
    }
}
