//! Aggregate kernel statistics, printed when the machine halts.

use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulingPolicy;

/// Running totals maintained by the scheduler, the paging subsystem and the
/// console glue. `Statistics` has no behavior of its own beyond bookkeeping
/// and the final report: every field is written by the subsystem that owns
/// the event it counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_ticks: u64,
    pub idle_ticks: u64,
    pub system_ticks: u64,
    pub user_ticks: u64,

    pub num_disk_reads: u64,
    pub num_disk_writes: u64,
    pub num_console_chars_read: u64,
    pub num_console_chars_written: u64,
    pub num_page_faults: u64,
    pub num_packets_sent: u64,
    pub num_packets_received: u64,

    pub cpu_busy_time: u64,
    pub num_cpu_bursts: u64,
    pub max_cpu_burst: u64,
    pub min_cpu_burst: u64,
    pub total_wait_time: u64,
    pub burst_estimate_error: i64,

    pub threads_completed: u64,
    pub max_thread_completion: u64,
    pub min_thread_completion: u64,
    sum_thread_completion: u64,
    sum_sq_thread_completion: f64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            total_ticks: 0,
            idle_ticks: 0,
            system_ticks: 0,
            user_ticks: 0,
            num_disk_reads: 0,
            num_disk_writes: 0,
            num_console_chars_read: 0,
            num_console_chars_written: 0,
            num_page_faults: 0,
            num_packets_sent: 0,
            num_packets_received: 0,
            cpu_busy_time: 0,
            num_cpu_bursts: 0,
            max_cpu_burst: 0,
            min_cpu_burst: u64::MAX,
            total_wait_time: 0,
            burst_estimate_error: 0,
            threads_completed: 0,
            max_thread_completion: 0,
            min_thread_completion: u64::MAX,
            sum_thread_completion: 0,
            sum_sq_thread_completion: 0.0,
        }
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a CPU burst of `run_time` ticks just closed out.
    pub fn record_cpu_burst(&mut self, run_time: u64) {
        self.cpu_busy_time += run_time;
        if run_time > 0 {
            self.num_cpu_bursts += 1;
            self.max_cpu_burst = self.max_cpu_burst.max(run_time);
            self.min_cpu_burst = self.min_cpu_burst.min(run_time);
        }
    }

    /// Records a thread's total completion time (creation to exit), used
    /// for the max/min/mean/variance report.
    pub fn record_thread_completion(&mut self, completion_ticks: u64) {
        self.threads_completed += 1;
        self.max_thread_completion = self.max_thread_completion.max(completion_ticks);
        self.min_thread_completion = self.min_thread_completion.min(completion_ticks);
        self.sum_thread_completion += completion_ticks;
        self.sum_sq_thread_completion += (completion_ticks as f64) * (completion_ticks as f64);
    }

    pub fn mean_thread_completion(&self) -> f64 {
        if self.threads_completed == 0 {
            0.0
        } else {
            self.sum_thread_completion as f64 / self.threads_completed as f64
        }
    }

    pub fn variance_thread_completion(&self) -> f64 {
        if self.threads_completed == 0 {
            return 0.0;
        }
        let mean = self.mean_thread_completion();
        let mean_sq = self.sum_sq_thread_completion / self.threads_completed as f64;
        (mean_sq - mean * mean).max(0.0)
    }

    pub fn average_cpu_burst(&self) -> f64 {
        if self.num_cpu_bursts == 0 {
            0.0
        } else {
            self.cpu_busy_time as f64 / self.num_cpu_bursts as f64
        }
    }

    pub fn average_wait_time(&self) -> f64 {
        if self.threads_completed == 0 {
            0.0
        } else {
            self.total_wait_time as f64 / self.threads_completed as f64
        }
    }

    pub fn cpu_utilization_percent(&self) -> f64 {
        if self.total_ticks == 0 {
            0.0
        } else {
            100.0 * self.cpu_busy_time as f64 / self.total_ticks as f64
        }
    }

    pub fn burst_estimate_error_normalized(&self) -> f64 {
        if self.cpu_busy_time == 0 {
            0.0
        } else {
            self.burst_estimate_error as f64 / self.cpu_busy_time as f64
        }
    }

    /// Renders the human-readable report described in the specification.
    pub fn report(&self, policy: &SchedulingPolicy) -> String {
        use std::fmt::Write;
        let mut out = String::new();

        let _ = writeln!(
            out,
            "Ticks: total {}, idle {}, system {}, user {}",
            self.total_ticks, self.idle_ticks, self.system_ticks, self.user_ticks
        );
        let _ = writeln!(
            out,
            "Disk I/O: reads {}, writes {}",
            self.num_disk_reads, self.num_disk_writes
        );
        let _ = writeln!(
            out,
            "Console I/O: reads {}, writes {}",
            self.num_console_chars_read, self.num_console_chars_written
        );
        let _ = writeln!(out, "Paging: faults {}", self.num_page_faults);
        let _ = writeln!(
            out,
            "Network I/O: packets received {}, sent {}",
            self.num_packets_received, self.num_packets_sent
        );

        let _ = writeln!(out, "\nScheduling algorithm: {}", policy.name());
        if let Some(quantum) = policy.quantum() {
            let _ = writeln!(out, "Quantum: {quantum}");
        }
        let _ = writeln!(out, "Total CPU busy time: {}", self.cpu_busy_time);
        let _ = writeln!(out, "Total execution time: {}", self.total_ticks);
        let _ = writeln!(
            out,
            "CPU utilization: {:.2}%",
            self.cpu_utilization_percent()
        );
        let _ = writeln!(
            out,
            "Number of non-zero CPU bursts: {}",
            self.num_cpu_bursts
        );
        let min_burst = if self.num_cpu_bursts == 0 {
            0
        } else {
            self.min_cpu_burst
        };
        let _ = writeln!(
            out,
            "CPU burst times: max {}, min {}, average {:.2}",
            self.max_cpu_burst,
            min_burst,
            self.average_cpu_burst()
        );
        if matches!(policy, SchedulingPolicy::ShortestJobFirst { .. }) {
            let _ = writeln!(
                out,
                "SJF burst estimate error (normalized): {:.4}",
                self.burst_estimate_error_normalized()
            );
        }
        if self.threads_completed > 1 {
            let _ = writeln!(
                out,
                "Average ready-queue wait time: {:.2}",
                self.average_wait_time()
            );
            let min_completion = if self.threads_completed == 0 {
                0
            } else {
                self.min_thread_completion
            };
            let _ = writeln!(
                out,
                "Thread completion: max {}, min {}, mean {:.2}, variance {:.2}",
                self.max_thread_completion,
                min_completion,
                self.mean_thread_completion(),
                self.variance_thread_completion()
            );
        } else {
            let _ = writeln!(out, "Only one thread ever ran");
        }

        out
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Statistics always serializes")
    }
}
