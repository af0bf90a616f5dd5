//! Decodes the syscall number and arguments off a thread's register file,
//! validates them, and drives the [`Kernel`] operation they name.

use crate::console::ConsoleIo;
use crate::error::KernelError;
use crate::kernel::{JoinOutcome, Kernel};
use crate::machine::{ConsoleDevice, ExecutableSource, REG_ARG0, REG_RESULT};
use crate::process::{Pid, ThreadState};
use crate::syscall::numbers::SyscallNumber;

/// Outcome of dispatching one syscall, beyond the register writes already
/// applied to the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Execution continues normally.
    Continue,
    /// The calling thread just blocked (sleep, join-on-live-child).
    Blocked,
    /// `Halt` was invoked: print statistics and stop the machine.
    Halt,
}

/// Reads a NUL-terminated byte string starting at `vaddr` in `pid`'s
/// address space, using [`Kernel::translate`] for each byte (faulting is
/// not serviced here — a non-resident read is a translation failure,
/// which the caller may choose to fault in before retrying).
fn read_c_string(
    kernel: &Kernel,
    memory: &[u8],
    pid: Pid,
    vaddr: usize,
) -> Result<Vec<u8>, KernelError> {
    let mut out = Vec::new();
    let mut addr = vaddr;
    loop {
        let pa = kernel
            .translate(pid, addr)
            .ok_or(KernelError::NoSuchProcess(pid))?;
        let byte = memory[pa];
        if byte == 0 {
            break;
        }
        out.push(byte);
        addr += 1;
    }
    Ok(out)
}

/// Dispatches one syscall exception for `pid`. `physical_memory` is the raw
/// byte slab backing every frame (`kernel.memory.frame_table`'s storage),
/// passed separately because `read_c_string` needs to borrow it immutably
/// while the rest of the dispatcher mutates `kernel`.
pub fn dispatch(
    kernel: &mut Kernel,
    console_io: &mut ConsoleIo,
    console: &mut dyn ConsoleDevice,
    exec: &dyn ExecutableSource,
    pid: Pid,
    now: u64,
) -> Result<DispatchOutcome, KernelError> {
    let regs = kernel
        .process_table
        .get(pid)
        .ok_or(KernelError::NoSuchProcess(pid))?
        .user_regs;
    // The call number and the return value share register 2, exactly as
    // in the syscall calling convention: the dispatcher reads it before
    // any handler below has a chance to overwrite it with a result.
    let call_number = regs.get(REG_RESULT) as u16;
    let call = SyscallNumber::from_u16(call_number).ok_or(KernelError::InvalidSyscall(call_number))?;
    let arg0 = regs.get(REG_ARG0);
    crate::debug!(crate::logging::DebugMask::SYSCALL, "pid {pid}: {call:?}(arg0={arg0})");

    let mut outcome = DispatchOutcome::Continue;

    match call {
        SyscallNumber::Halt => {
            outcome = DispatchOutcome::Halt;
        }
        SyscallNumber::PrintInt => {
            console_io.print_int(console, &mut kernel.stats, arg0);
        }
        SyscallNumber::PrintChar => {
            console_io.put_char(console, &mut kernel.stats, arg0 as u8);
        }
        SyscallNumber::PrintIntHex => {
            console_io.print_int_hex(console, &mut kernel.stats, arg0 as u32);
        }
        SyscallNumber::PrintString => {
            let bytes = {
                let frame_bytes = kernel.memory.frame_table_bytes();
                read_c_string(kernel, frame_bytes, pid, arg0 as usize)?
            };
            console_io.print_string(console, &mut kernel.stats, &bytes);
        }
        SyscallNumber::GetReg => {
            let index = arg0 as usize;
            let thread = kernel.process_table.get(pid).ok_or(KernelError::NoSuchProcess(pid))?;
            let value = *thread
                .user_regs
                .regs
                .get(index)
                .ok_or(KernelError::InvalidRegister(index))?;
            set_result(kernel, pid, value)?;
        }
        SyscallNumber::GetPA => {
            let pa = kernel.translate(pid, arg0 as usize);
            set_result(kernel, pid, pa.map(|p| p as i64).unwrap_or(-1))?;
        }
        SyscallNumber::GetPID => {
            set_result(kernel, pid, pid as i64)?;
        }
        SyscallNumber::GetPPID => {
            let ppid = kernel
                .process_table
                .get(pid)
                .ok_or(KernelError::NoSuchProcess(pid))?
                .ppid;
            set_result(kernel, pid, ppid.map(|p| p as i64).unwrap_or(-1))?;
        }
        SyscallNumber::Time => {
            set_result(kernel, pid, now as i64)?;
        }
        SyscallNumber::NumInstr => {
            set_result(kernel, pid, 0)?;
        }
        SyscallNumber::Sleep => {
            kernel.sleep(pid, arg0.max(0) as u64, now);
            if arg0 > 0 {
                outcome = DispatchOutcome::Blocked;
            }
        }
        SyscallNumber::Yield => {
            kernel.yield_cpu(pid, now);
            outcome = DispatchOutcome::Blocked;
        }
        SyscallNumber::Fork => {
            let child_pid = kernel.fork(pid, now)?;
            set_result(kernel, pid, child_pid as i64)?;
        }
        SyscallNumber::Exec => {
            let bytes = {
                let frame_bytes = kernel.memory.frame_table_bytes();
                read_c_string(kernel, frame_bytes, pid, arg0 as usize)?
            };
            let path = String::from_utf8_lossy(&bytes).into_owned();
            kernel.exec(pid, exec, &path)?;
        }
        SyscallNumber::Join => {
            let child_pid = arg0 as Pid;
            match kernel.join(pid, child_pid) {
                Ok(JoinOutcome::Done(status)) => set_result(kernel, pid, status)?,
                Ok(JoinOutcome::Blocked) => outcome = DispatchOutcome::Blocked,
                Err(KernelError::NotAChild(_)) => set_result(kernel, pid, -1)?,
                Err(other) => return Err(other),
            }
        }
        SyscallNumber::Exit => {
            let halt = kernel.exit(pid, arg0, now);
            if halt {
                outcome = DispatchOutcome::Halt;
            }
        }
    }

    if !matches!(call, SyscallNumber::Exec) {
        if let Some(thread) = kernel.process_table.get_mut(pid) {
            if thread.state != ThreadState::Finished {
                thread.user_regs.advance_pc();
            }
        }
    }

    Ok(outcome)
}

fn set_result(kernel: &mut Kernel, pid: Pid, value: i64) -> Result<(), KernelError> {
    kernel
        .process_table
        .get_mut(pid)
        .ok_or(KernelError::NoSuchProcess(pid))?
        .user_regs
        .set(REG_RESULT, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryError;
    use crate::memory::{PageReplacer, ReplacementPolicy};
    use crate::scheduler::SchedulingPolicy;

    struct FixedExecutable(Vec<u8>);
    impl ExecutableSource for FixedExecutable {
        fn open(&self, _path: &str) -> Result<(), MemoryError> {
            Ok(())
        }
        fn read_at(&self, _path: &str, offset: u32, len: usize) -> Result<Vec<u8>, MemoryError> {
            let offset = offset as usize;
            let mut buf = vec![0u8; len];
            for (i, b) in buf.iter_mut().enumerate() {
                *b = self.0.get(offset + i).copied().unwrap_or(0);
            }
            Ok(buf)
        }
    }

    struct Recorder(Vec<u8>);
    impl ConsoleDevice for Recorder {
        fn put_char(&mut self, byte: u8) {
            self.0.push(byte);
        }
        fn get_char(&mut self) -> u8 {
            0
        }
    }

    fn noff_bytes(code_size: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; 40 + code_size as usize];
        bytes[0..4].copy_from_slice(&0xbadfad_u32.to_le_bytes());
        bytes[8..12].copy_from_slice(&40u32.to_le_bytes());
        bytes[12..16].copy_from_slice(&code_size.to_le_bytes());
        bytes
    }

    fn spawn_test_thread(kernel: &mut Kernel, exec: &FixedExecutable) -> Pid {
        kernel.spawn(exec, "prog", None, 100, 0).unwrap()
    }

    #[test]
    fn print_int_syscall_writes_digits_and_advances_pc() {
        let exec = FixedExecutable(noff_bytes(64));
        let mut kernel = Kernel::new(16, PageReplacer::new(ReplacementPolicy::Random, 1), SchedulingPolicy::Fcfs);
        let pid = spawn_test_thread(&mut kernel, &exec);

        {
            let thread = kernel.process_table.get_mut(pid).unwrap();
            thread.user_regs.set(REG_RESULT, 13); // SC_PrintInt
            thread.user_regs.set(REG_ARG0, -7);
        }

        let mut console_io = ConsoleIo::new();
        let mut device = Recorder(Vec::new());
        let outcome = dispatch(&mut kernel, &mut console_io, &mut device, &exec, pid, 0).unwrap();

        assert_eq!(outcome, DispatchOutcome::Continue);
        assert_eq!(String::from_utf8(device.0).unwrap(), "-7");
        assert_eq!(kernel.process_table.get(pid).unwrap().user_regs.get(crate::machine::REG_PREV_PC), 0);
    }

    #[test]
    fn fork_syscall_returns_zero_to_child_and_pid_to_parent() {
        let exec = FixedExecutable(noff_bytes(64));
        let mut kernel = Kernel::new(16, PageReplacer::new(ReplacementPolicy::Random, 1), SchedulingPolicy::Fcfs);
        let parent = spawn_test_thread(&mut kernel, &exec);

        kernel
            .process_table
            .get_mut(parent)
            .unwrap()
            .user_regs
            .set(REG_RESULT, 9); // SC_Fork

        let mut console_io = ConsoleIo::new();
        let mut device = Recorder(Vec::new());
        dispatch(&mut kernel, &mut console_io, &mut device, &exec, parent, 0).unwrap();

        let child_pid = kernel.process_table.get(parent).unwrap().user_regs.get(REG_RESULT) as Pid;
        assert_ne!(child_pid, 0);
        assert_eq!(kernel.process_table.get(child_pid).unwrap().user_regs.get(REG_RESULT), 0);
    }

    #[test]
    fn join_on_non_child_returns_negative_one() {
        let exec = FixedExecutable(noff_bytes(64));
        let mut kernel = Kernel::new(16, PageReplacer::new(ReplacementPolicy::Random, 1), SchedulingPolicy::Fcfs);
        let a = spawn_test_thread(&mut kernel, &exec);
        let b = kernel.spawn(&exec, "other", None, 100, 0).unwrap();

        {
            let thread = kernel.process_table.get_mut(a).unwrap();
            thread.user_regs.set(REG_RESULT, 3); // SC_Join
            thread.user_regs.set(REG_ARG0, b as i64);
        }

        let mut console_io = ConsoleIo::new();
        let mut device = Recorder(Vec::new());
        dispatch(&mut kernel, &mut console_io, &mut device, &exec, a, 0).unwrap();

        assert_eq!(kernel.process_table.get(a).unwrap().user_regs.get(REG_RESULT), -1);
    }
}
