mod cli;
mod demo_machine;

use std::fs;
use std::process::ExitCode;

use clap::Parser;

use cli::Args;
use demo_machine::{FileSystemExecutables, StdioConsole};
use ossim_core::batch;
use ossim_core::console::ConsoleIo;
use ossim_core::kernel::Kernel;
use ossim_core::logging::{self, DebugMask};
use ossim_core::machine::{ExecutableSource, REG_ARG0, REG_RESULT};
use ossim_core::memory::PageReplacer;
use ossim_core::syscall::{self, DispatchOutcome};

fn main() -> ExitCode {
    let args = Args::parse();
    logging::set_active_mask(DebugMask::parse(&args.debug_mask));

    if args.executable.is_none() && args.batch_file.is_none() {
        eprintln!("ossim: one of -x <executable> or -F <batchfile> is required");
        return ExitCode::FAILURE;
    }

    let exec = FileSystemExecutables;
    let replacer = PageReplacer::new(args.replace.into(), args.seed);
    let mut kernel = Kernel::new(args.num_frames, replacer, args.scheduling_policy());

    if let Some(batch_file) = &args.batch_file {
        let contents = match fs::read_to_string(batch_file) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("ossim: cannot read batch file {batch_file}: {e}");
                return ExitCode::FAILURE;
            }
        };
        let scenario = match batch::parse_scenario(&contents) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("ossim: malformed scenario file: {e}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = kernel.load_scenario(&scenario, &exec, args.quantum, args.alpha, 0) {
            eprintln!("ossim: failed to load scenario: {e}");
            return ExitCode::FAILURE;
        }
    } else if let Some(path) = &args.executable {
        if let Err(e) = kernel.spawn(&exec, path, None, 100, 0) {
            eprintln!("ossim: failed to load {path}: {e}");
            return ExitCode::FAILURE;
        }
    }

    run(kernel, &exec, args.stats_json);
    ExitCode::SUCCESS
}

/// Syscall numbers the demo driver issues directly, matching
/// `syscall::numbers::SyscallNumber::from_u16`.
const SC_EXIT: i64 = 1;
const SC_PRINT_INT: i64 = 13;

/// Drives the scheduler/stats machinery to completion. There is no real
/// instruction-level CPU emulator in this crate (out of scope): rather than
/// stepping real user instructions, each dispatched thread's one and only
/// "instruction" is announcing its own pid and exiting, both issued as real
/// syscalls through [`syscall::dispatch`] so the console glue and the
/// syscall-return PC bookkeeping run exactly as they would under a real
/// emulator. A real emulator would replace only the body of the `Running`
/// arm below — fetching and stepping a user instruction instead of emitting
/// this fixed pair of syscalls — while driving the same `dispatch` entry
/// point and leaving the rest of the kernel untouched.
fn run(mut kernel: Kernel, exec: &dyn ExecutableSource, stats_json: bool) {
    let mut console_io = ConsoleIo::new();
    let mut console = StdioConsole;
    let mut now = 0u64;

    loop {
        if let Some(pid) = kernel.scheduler.select_next_ready(&kernel.process_table) {
            kernel
                .scheduler
                .schedule_thread(&mut kernel.process_table, &mut kernel.stats, pid, now);
            kernel.scheduler.tail(&mut kernel.process_table, &mut kernel.memory);

            let burst = kernel
                .process_table
                .get(pid)
                .map(|t| t.base_priority.max(1) as u64)
                .unwrap_or(1);
            now += burst;

            {
                let thread = kernel.process_table.get_mut(pid).expect("just scheduled");
                thread.user_regs.set(REG_RESULT, SC_PRINT_INT);
                thread.user_regs.set(REG_ARG0, pid as i64);
            }
            syscall::dispatch(&mut kernel, &mut console_io, &mut console, exec, pid, now)
                .expect("register-only PrintInt syscall never fails");
            console_io.put_char(&mut console, &mut kernel.stats, b'\n');

            {
                let thread = kernel.process_table.get_mut(pid).expect("still present");
                thread.user_regs.set(REG_RESULT, SC_EXIT);
                thread.user_regs.set(REG_ARG0, 0);
            }
            let outcome = syscall::dispatch(&mut kernel, &mut console_io, &mut console, exec, pid, now)
                .expect("register-only Exit syscall never fails");
            kernel.scheduler.tail(&mut kernel.process_table, &mut kernel.memory);
            if outcome == DispatchOutcome::Halt {
                break;
            }
        } else if kernel.scheduler.has_sleepers() {
            now = kernel.scheduler.next_wake_tick().expect("has_sleepers implies a wake tick");
            kernel.wake_due_sleepers(now);
        } else {
            break;
        }
    }

    kernel.stats.total_ticks = now;
    print!("{}", kernel.stats.report(&kernel.scheduler.policy()));
    if stats_json {
        println!("{}", kernel.stats.to_json());
    }
}
