//! Syscall call numbers, as read from register 2 on a syscall exception.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallNumber {
    Halt,
    Exit,
    Exec,
    Join,
    Fork,
    Yield,
    Sleep,
    PrintInt,
    PrintChar,
    PrintString,
    PrintIntHex,
    GetReg,
    GetPA,
    GetPID,
    GetPPID,
    Time,
    NumInstr,
}

impl SyscallNumber {
    pub fn from_u16(n: u16) -> Option<Self> {
        Some(match n {
            0 => Self::Halt,
            1 => Self::Exit,
            2 => Self::Exec,
            3 => Self::Join,
            9 => Self::Fork,
            10 => Self::Yield,
            11 => Self::Sleep,
            12 => Self::NumInstr,
            13 => Self::PrintInt,
            14 => Self::PrintChar,
            15 => Self::PrintString,
            16 => Self::PrintIntHex,
            17 => Self::GetReg,
            18 => Self::GetPA,
            19 => Self::GetPID,
            20 => Self::GetPPID,
            21 => Self::Time,
            _ => return None,
        })
    }
}
