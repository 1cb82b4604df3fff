//! Exception prioritisation, vector dispatch and supervisor-mode entry.

use crate::bus::Bus;
use crate::core::Core;

/// Every architectural exception the core can deliver.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exception {
    Reset,
    /// Jump target not word aligned.
    InsnAlignment,
    InsnTlbMiss,
    InsnPageFault,
    InsnBusError,
    /// Load/store not naturally aligned.
    DataAlignment,
    DataTlbMiss,
    DataPageFault,
    DataBusError,
    IllegalInsn,
    Syscall,
    Trap,
    /// Arithmetic overflow (Range) exception.
    Range,
    FloatingPoint,
    TickTimer,
    External,
}

impl Exception {
    /// Handler address relative to the exception-prefix base.
    pub fn vector_offset(self) -> u32 {
        match self {
            Self::Reset => 0x100,
            Self::InsnBusError | Self::DataBusError => 0x200,
            Self::DataPageFault => 0x300,
            Self::InsnPageFault => 0x400,
            Self::TickTimer => 0x500,
            Self::InsnAlignment | Self::DataAlignment => 0x600,
            Self::IllegalInsn => 0x700,
            Self::External => 0x800,
            Self::DataTlbMiss => 0x900,
            Self::InsnTlbMiss => 0xa00,
            Self::Range => 0xb00,
            Self::Syscall => 0xc00,
            Self::FloatingPoint => 0xd00,
            Self::Trap => 0xe00,
        }
    }

    /// Asynchronous interrupts take their vector after the PC has already
    /// advanced, so they assign next-PC directly instead of scheduling a
    /// jump.
    fn is_interrupt(self) -> bool {
        matches!(self, Self::TickTimer | Self::External)
    }
}

/// An exception together with the offending effective address, as carried
/// through the execute handlers' `Result` channel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Fault {
    pub exception: Exception,
    pub address: u32,
}

impl Fault {
    pub fn new(exception: Exception, address: u32) -> Self {
        Self { exception, address }
    }
}

impl From<Exception> for Fault {
    fn from(exception: Exception) -> Self {
        Self::new(exception, 0)
    }
}

/// The reset vector, where both PCs point after construction.
pub const RESET_VECTOR: u32 = 0x100;

impl<B: Bus> Core<B> {
    /// Delivers an exception: saves the interrupted context into
    /// EPCR/EEAR/ESR, enters supervisor mode, and redirects execution to
    /// the handler vector.
    pub(crate) fn raise(&mut self, exception: Exception, address: u32) {
        // Maskable kinds are silently dropped while disabled.
        if exception == Exception::External && !self.status.iee() {
            return;
        }
        if exception == Exception::TickTimer && !self.status.tee() {
            return;
        }

        let pending = self.jump_insn != 0;
        let is_jump_insn = pending && self.counters.instructions == self.jump_insn.wrapping_sub(1);
        let is_delay_insn = pending && self.counters.instructions == self.jump_insn;

        self.expc = match exception {
            Exception::Syscall | Exception::FloatingPoint => {
                if is_jump_insn {
                    self.jump_target
                } else {
                    self.next_pc.wrapping_add(4)
                }
            }
            Exception::TickTimer | Exception::External => {
                if is_jump_insn {
                    self.prev_pc
                } else {
                    self.next_pc
                }
            }
            _ => {
                if is_delay_insn {
                    self.prev_pc
                } else {
                    self.next_pc
                }
            }
        };

        // Cancel any outstanding jump.
        self.jump_insn = 0;
        self.exea = address;
        self.exsr = self.status.bits();

        self.status.set_sm(true);
        if is_delay_insn {
            self.status.set_dsx(true);
        }
        self.status.set_iee(false);
        self.status.set_tee(false);
        self.status.set_ime(false);
        self.status.set_dme(false);

        // Wake from doze.
        self.pmr &= !crate::core::pmr::DME;

        let mut target = exception.vector_offset();
        if self.status.eph() {
            target |= 0xf000_0000;
        }

        if exception.is_interrupt() {
            self.next_pc = target;
        } else {
            self.set_jump(target, 0);
        }
    }
}
