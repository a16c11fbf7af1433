/// Process exit codes. Shells see these modulo 256 (`Failed` reads as 253).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    UnknownCommand = -1,
    NoCases = -2,
    Failed = -3,
    Interrupted = -4,
    SecurityMode = -5,
    InvalidRuns = -6,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// The status a POSIX shell reports for this code.
    pub fn wrapped(self) -> i32 {
        self.code() & 0xff
    }
}

/// Terminal state of a scheduling or stats pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    NoCases,
    Failed,
    Interrupted,
}

impl From<Disposition> for ExitCode {
    fn from(value: Disposition) -> Self {
        match value {
            Disposition::Success => ExitCode::Success,
            Disposition::NoCases => ExitCode::NoCases,
            Disposition::Failed => ExitCode::Failed,
            Disposition::Interrupted => ExitCode::Interrupted,
        }
    }
}
