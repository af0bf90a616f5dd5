//! Minimal, in-process implementations of the core's machine traits,
//! sufficient to drive the batch loader and syscall dispatch end-to-end.
//! A real instruction-level CPU emulator is out of scope; this is a stand-in
//! that reads executables straight off disk and talks to the host's stdio.

use std::fs;
use std::io::{Read, Write};

use ossim_core::error::MemoryError;
use ossim_core::machine::{ConsoleDevice, ExecutableSource};

pub struct FileSystemExecutables;

impl ExecutableSource for FileSystemExecutables {
    fn open(&self, path: &str) -> Result<(), MemoryError> {
        fs::metadata(path).map(|_| ()).map_err(|_| MemoryError::UnopenableExecutable(path.to_string()))
    }

    fn read_at(&self, path: &str, offset: u32, len: usize) -> Result<Vec<u8>, MemoryError> {
        let bytes =
            fs::read(path).map_err(|_| MemoryError::UnopenableExecutable(path.to_string()))?;
        let offset = offset as usize;
        let mut buf = vec![0u8; len];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = bytes.get(offset + i).copied().unwrap_or(0);
        }
        Ok(buf)
    }
}

pub struct StdioConsole;

impl ConsoleDevice for StdioConsole {
    fn put_char(&mut self, byte: u8) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(&[byte]);
        let _ = stdout.flush();
    }

    fn get_char(&mut self) -> u8 {
        let mut buf = [0u8; 1];
        std::io::stdin().read_exact(&mut buf).unwrap_or(());
        buf[0]
    }
}
