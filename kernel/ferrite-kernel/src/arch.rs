//! Architecture boundary: the trap frame and user-mode entry.
//!
//! The saved register file follows the MIPS o32 syscall convention:
//! `v0` carries the syscall number in and the return value out, `a3`
//! the error flag, and `epc` the faulting/resuming program counter.
//! Only the registers the kernel manipulates are modeled; the platform
//! trap code saves and restores the full set around these.

use ferrite_core::addr::VirtAddr;

/// Saved user register state at trap entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrapFrame {
    /// Primary return-value register.
    pub v0: u32,
    /// Secondary return-value register.
    pub v1: u32,
    /// First four argument registers.
    pub a0: u32,
    /// Second argument register.
    pub a1: u32,
    /// Third argument register.
    pub a2: u32,
    /// Fourth argument register; doubles as the syscall error flag.
    pub a3: u32,
    /// Stack pointer.
    pub sp: u32,
    /// Return address.
    pub ra: u32,
    /// Program counter of the trapping instruction.
    pub epc: u32,
}

/// Width of one instruction; the PC advances by this past a syscall.
const INSTRUCTION_SIZE: u32 = 4;

impl TrapFrame {
    /// Prepares the child's copy of a forking parent's trap frame:
    /// the syscall appears to return 0 with no error, resuming after
    /// the syscall instruction.
    pub fn for_child(&self) -> Self {
        let mut tf = *self;
        tf.v0 = 0;
        tf.a3 = 0;
        tf.epc += INSTRUCTION_SIZE;
        tf
    }

    /// Records a successful syscall return value.
    pub fn set_return(&mut self, val: u32) {
        self.v0 = val;
        self.a3 = 0;
        self.epc += INSTRUCTION_SIZE;
    }

    /// Records a failed syscall with the given error number.
    pub fn set_error(&mut self, err: u32) {
        self.v0 = err;
        self.a3 = 1;
        self.epc += INSTRUCTION_SIZE;
    }
}

/// Enters user mode in the context described by `tf`.
///
/// Provided by the platform trap code; restores the register file and
/// returns through the exception path. Never returns to the caller.
///
/// # Panics
///
/// On builds without platform trap code (host tests) this panics
/// immediately; lifecycle tests drive the kernel side of the boundary
/// only.
pub fn enter_user_mode(tf: &TrapFrame) -> ! {
    #[cfg(target_os = "none")]
    {
        unsafe extern "C" {
            /// Assembly exception-return path.
            fn asm_usermode(tf: *const TrapFrame) -> !;
        }
        // SAFETY: The trap frame describes a complete, valid user
        // context prepared by fork or exec.
        unsafe { asm_usermode(core::ptr::from_ref(tf)) }
    }
    #[cfg(not(target_os = "none"))]
    {
        panic!("enter_user_mode: no platform trap path on this build (epc={:#x})", tf.epc);
    }
}

/// Enters a brand-new user process.
///
/// The layout matches the C startup convention: `a0 = argc`,
/// `a1 = argv`, `a2 = envp`, with the stack pointer and entry point
/// taken from exec's stack layout and the executable. Never returns.
pub fn enter_new_process(
    argc: usize,
    argv: VirtAddr,
    envp: VirtAddr,
    sp: VirtAddr,
    entry: VirtAddr,
) -> ! {
    let tf = TrapFrame {
        a0: argc as u32,
        a1: argv.as_u64() as u32,
        a2: envp.as_u64() as u32,
        sp: sp.as_u64() as u32,
        epc: entry.as_u64() as u32,
        ..TrapFrame::default()
    };
    enter_user_mode(&tf)
}
