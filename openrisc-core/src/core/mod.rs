//! The simulated OR1K core: architectural state, the quantum loop, fetch
//! and the data-transaction path.

mod counters;
mod exception;
mod execute;
mod fpu;
mod spr;
mod status;

use std::io::{self, Write};

use log::warn;
use thiserror::Error;

use crate::bus::{Bus, Path, Port, Request, Response};
use crate::insn::{DecodeCache, DecodeCacheSize, ExecOp, Instruction};
use crate::mmu::{self, Mmu, Translation};
use crate::pic::Pic;
use crate::registers::{Registers, Specifier};
use crate::tick::TickTimer;
use crate::{decode, Endianness};

pub use counters::Counters;
pub use exception::{Exception, Fault, RESET_VECTOR};
pub use execute::nop;
pub use status::Status;

/// Version register: CPU version 0x12, updated-version-registers present,
/// revision 1.
const VERSION: u32 = 0x12 << 24 | 1 << 6 | 0x01;
/// Version register 2: implementation id and version.
const VERSION2: u32 = 0x42 << 24 | 0x000001;
/// Architecture version register: architecture 1.1, revision 1.
const ARCH_VERSION: u32 = 0x01 << 24 | 0x01 << 16 | 0x01 << 8;

/// Unit-present register bits.
mod upr {
    pub const UP: u32 = 1 << 0;
    pub const DMP: u32 = 1 << 3;
    pub const IMP: u32 = 1 << 4;
    pub const MP: u32 = 1 << 5;
    pub const PICP: u32 = 1 << 8;
    pub const PMP: u32 = 1 << 9;
    pub const TTP: u32 = 1 << 10;
}

/// CPU configuration register bits.
pub(crate) mod cpucfg {
    /// ORBIS32 supported
    pub const OB32S: u32 = 1 << 5;
    /// ORFPX32 supported
    pub const OF32S: u32 = 1 << 7;
    /// No delay slot for jumps and branches
    pub const ND: u32 = 1 << 10;
    /// AVR present
    pub const AVRP: u32 = 1 << 11;
    /// AECR/AESR present
    pub const AECSRP: u32 = 1 << 14;
}

/// Arithmetic-exception control/status register bits.
pub(crate) mod aecr {
    /// Carry on add
    pub const CYADDE: u32 = 1 << 0;
    /// Overflow on add
    pub const OVADDE: u32 = 1 << 1;
    /// Carry on multiply
    pub const CYMULE: u32 = 1 << 2;
    /// Overflow on multiply
    pub const OVMULE: u32 = 1 << 3;
    /// Divide by zero
    pub const DBZE: u32 = 1 << 4;
    /// Carry on MAC addition
    pub const CYMACADDE: u32 = 1 << 5;
    /// Overflow on MAC addition
    pub const OVMACADDE: u32 = 1 << 6;
}

/// Power-management register bits.
pub(crate) mod pmr {
    /// Doze mode enable
    pub const DME: u32 = 1 << 4;
}

/// Floating-point control/status register bits.
pub(crate) mod fpcsr {
    /// FP exception enable
    pub const FPEE: u32 = 1 << 0;
    /// Rounding mode field, bits 2..1.
    pub const RM_MASK: u32 = 3 << 1;
    pub const RM_NEAREST: u32 = 0 << 1;
    pub const RM_ZERO: u32 = 1 << 1;
    pub const RM_UP: u32 = 2 << 1;
    pub const RM_DOWN: u32 = 3 << 1;
    /// Overflow flag
    pub const OVF: u32 = 1 << 3;
    /// Underflow flag
    pub const UNF: u32 = 1 << 4;
    /// QNaN flag
    pub const QNF: u32 = 1 << 6;
    /// Zero flag
    pub const ZF: u32 = 1 << 7;
    /// Infinity flag
    pub const INF: u32 = 1 << 10;
    /// Divide-by-zero flag
    pub const DZF: u32 = 1 << 11;
}

/// How a call to [`Core::advance`], [`Core::step`] or [`Core::run`] ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepResult {
    /// The cycle budget was consumed.
    Ok,
    /// The guest requested simulation exit through the NOP side channel.
    Exit,
    Breakpoint,
    Watchpoint,
}

/// Construction-time configuration of a core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Simulated clock frequency, reported through the NOP side channel.
    pub clock_hz: u64,
    pub decode_cache: DecodeCacheSize,
    /// Emit warnings for illegal SPR accesses and unsupported encodings.
    pub warnings: bool,
    /// Level-triggered (rather than edge-triggered) PIC status writes.
    pub level_triggered_pic: bool,
    /// Permit dozing when the guest sets the power-management doze bit.
    pub allow_sleep: bool,
    pub core_id: u32,
    pub num_cores: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clock_hz: 100_000_000,
            decode_cache: DecodeCacheSize::Entries8M,
            warnings: false,
            level_triggered_pic: false,
            allow_sleep: true,
            core_id: 0,
            num_cores: 1,
        }
    }
}

/// Failure of a debugger-initiated memory access.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DebugAccessError {
    #[error("no translation for virtual address {0:#010x}")]
    NoTranslation(u32),
    #[error("bus error at address {0:#010x}")]
    BusError(u32),
}

/// A simulated OR1K core attached to a system bus.
pub struct Core<B: Bus> {
    config: Config,
    port: Port<B>,

    registers: Registers,
    shadow: Box<[u32]>,
    status: Status,
    counters: Counters,
    decode_cache: DecodeCache,

    stop_requested: bool,
    break_requested: bool,
    exit_code: u32,

    /// End of the running quantum, in absolute cycles.
    limit: u64,
    jump_target: u32,
    /// Instruction count at which the pending jump retires; 0 means no
    /// jump pending.
    jump_insn: u64,

    // Fetch fast path: the last translated instruction page.
    virt_ipg: u32,
    phys_ipg: u32,

    prev_pc: u32,
    next_pc: u32,

    evbar: u32,
    dccfg: u32,
    iccfg: u32,
    unit: u32,
    cpucfg: u32,
    fpcsr: u32,
    aecr: u32,
    aesr: u32,

    exsr: u32,
    expc: u32,
    exea: u32,

    mac: u64,
    fmac: u64,
    pmr: u32,

    pic: Pic,
    tick: TickTimer,
    /// Cycle count at which the tick timer was last advanced.
    tick_update: u64,
    dmmu: Mmu,
    immu: Mmu,

    breakpoints: Vec<u32>,
    watchpoints_read: Vec<u32>,
    watchpoints_write: Vec<u32>,
    watchpoint_hit: bool,

    trace_enabled: bool,
    trace_addr: u32,
    trace_sink: Option<Box<dyn Write + Send>>,
    console: Box<dyn Write + Send>,
}

impl<B: Bus> Core<B> {
    /// Builds a core in its reset state, attached to `bus` through a
    /// big-endian port.
    pub fn new(bus: B, config: Config) -> Self {
        let decode_cache = DecodeCache::new(config.decode_cache);
        let pic = Pic::new(config.level_triggered_pic);
        Self {
            port: Port::new(bus, Endianness::BE),
            registers: Registers::new(),
            shadow: vec![0; crate::spr::SHADOW_REGS as usize].into_boxed_slice(),
            status: Status::new(),
            counters: Counters::new(),
            decode_cache,
            stop_requested: false,
            break_requested: false,
            exit_code: 0,
            limit: 0,
            jump_target: 0,
            jump_insn: 0,
            virt_ipg: !0,
            phys_ipg: !0,
            prev_pc: RESET_VECTOR,
            next_pc: RESET_VECTOR,
            evbar: 0,
            dccfg: 0,
            iccfg: 0,
            unit: upr::UP | upr::DMP | upr::IMP | upr::MP | upr::PICP | upr::PMP | upr::TTP,
            cpucfg: cpucfg::OB32S | cpucfg::OF32S | cpucfg::AVRP | cpucfg::AECSRP,
            fpcsr: 0,
            aecr: 0,
            aesr: 0,
            exsr: 0,
            expc: 0,
            exea: 0,
            mac: 0,
            fmac: 0,
            pmr: 0,
            pic,
            tick: TickTimer::new(),
            tick_update: 0,
            dmmu: Mmu::new(mmu::default_config()),
            immu: Mmu::new(mmu::default_config()),
            breakpoints: Vec::new(),
            watchpoints_read: Vec::new(),
            watchpoints_write: Vec::new(),
            watchpoint_hit: false,
            trace_enabled: false,
            trace_addr: 0,
            trace_sink: None,
            console: Box::new(io::stdout()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn port(&self) -> &Port<B> {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut Port<B> {
        &mut self.port
    }

    pub fn gpr(&self, specifier: Specifier) -> u32 {
        self.registers.read(specifier)
    }

    pub fn set_gpr(&mut self, specifier: Specifier, value: u32) {
        self.registers.write(specifier, value);
    }

    pub fn npc(&self) -> u32 {
        self.next_pc
    }

    pub fn set_npc(&mut self, value: u32) {
        self.next_pc = value;
    }

    pub fn ppc(&self) -> u32 {
        self.prev_pc
    }

    pub fn set_ppc(&mut self, value: u32) {
        self.prev_pc = value;
    }

    /// The code the guest passed to the exit NOP, once [`StepResult::Exit`]
    /// has been returned.
    pub fn exit_code(&self) -> u32 {
        self.exit_code
    }

    pub fn dmmu(&self) -> &Mmu {
        &self.dmmu
    }

    pub fn immu(&self) -> &Mmu {
        &self.immu
    }

    /// Redirects guest console output (NOP putc/puts/report).
    pub fn set_console(&mut self, console: Box<dyn Write + Send>) {
        self.console = console;
    }

    /// Enables instruction tracing into `sink`.
    pub fn set_trace(&mut self, sink: Box<dyn Write + Send>) {
        self.trace_sink = Some(sink);
        self.trace_enabled = true;
    }

    /// Drives one external interrupt line of the PIC.
    pub fn interrupt(&mut self, line: u32, raised: bool) {
        self.pic.set_line(line, raised);
    }

    pub fn insert_breakpoint(&mut self, addr: u32) {
        if !self.breakpoints.contains(&addr) {
            self.breakpoints.push(addr);
        }
    }

    pub fn remove_breakpoint(&mut self, addr: u32) {
        self.breakpoints.retain(|&a| a != addr);
    }

    pub fn insert_watchpoint_read(&mut self, addr: u32) {
        if !self.watchpoints_read.contains(&addr) {
            self.watchpoints_read.push(addr);
        }
    }

    pub fn remove_watchpoint_read(&mut self, addr: u32) {
        self.watchpoints_read.retain(|&a| a != addr);
    }

    pub fn insert_watchpoint_write(&mut self, addr: u32) {
        if !self.watchpoints_write.contains(&addr) {
            self.watchpoints_write.push(addr);
        }
    }

    pub fn remove_watchpoint_write(&mut self, addr: u32) {
        self.watchpoints_write.retain(|&a| a != addr);
    }

    /// Runs for (at least) `cycles` cycles and reports how many were
    /// actually consumed; a multi-cycle memory transaction may overshoot
    /// the budget.
    pub fn step(&mut self, cycles: u64) -> (StepResult, u64) {
        let start = self.counters.cycles;
        let result = self.advance(cycles);
        (result, self.counters.cycles - start)
    }

    /// Runs quantum after quantum until the guest exits or a debug stop
    /// fires.
    pub fn run(&mut self, quantum: u64) -> StepResult {
        loop {
            let result = self.advance(quantum);
            if result != StepResult::Ok {
                return result;
            }
        }
    }

    /// The quantum loop: fetch, dispatch, commit, service pending
    /// exceptions at the defined points.
    pub fn advance(&mut self, cycles: u64) -> StepResult {
        // One instruction costs one cycle; transactions may push past the
        // limit.
        self.limit = self.counters.cycles + cycles;

        if self.pic.is_pending() {
            self.raise(Exception::External, 0);
        }

        while self.counters.cycles < self.limit {
            self.stop_requested = false;
            self.break_requested = false;

            // Dozing advances the cycle counter, possibly to the limit;
            // it happens between instructions only.
            self.doze();

            let mut limit = self.limit.min(self.next_breakpoint());
            if self.tick.enabled() {
                limit = limit.min(self.counters.cycles + self.tick.next_tick());
            }

            while self.counters.cycles < limit {
                self.counters.cycles += 1;
                self.counters.instructions += 1;

                if let Some(insn) = self.fetch() {
                    self.dispatch(&insn);
                    if self.trace_enabled {
                        self.do_trace(&insn);
                    }
                }

                // Restore fixed values in case they were tainted. GPR[0]
                // is structurally write-protected by the register file.
                self.status.set_fo_invariant();

                self.prev_pc = self.next_pc;
                self.next_pc = self.next_pc.wrapping_add(4);

                if self.jump_insn != 0 && self.counters.instructions == self.jump_insn {
                    self.next_pc = self.jump_target;
                    self.jump_insn = 0;
                    limit = limit.min(self.next_breakpoint());
                }

                if self.stop_requested {
                    return StepResult::Exit;
                }
                if self.watchpoint_hit {
                    self.watchpoint_hit = false;
                    return StepResult::Watchpoint;
                }
                if self.break_requested {
                    break;
                }
            }

            // No timer exception can fire inside a mini-quantum, so the
            // timer only needs updating here.
            self.update_timer();

            // Interrupts may have arrived while dozing.
            if self.pic.is_pending() {
                self.raise(Exception::External, 0);
            }

            if self.breakpoint_hit() {
                return StepResult::Breakpoint;
            }
        }

        StepResult::Ok
    }

    fn doze(&mut self) {
        if self.pmr & pmr::DME == 0 || !self.config.allow_sleep {
            return;
        }

        let mut skip = u64::MAX;
        if self.tick.enabled() && self.tick.irq_enabled() {
            skip = self.tick.next_tick().min(self.tick.limit() as u64);
        }

        let slept = self.port.sleep(skip);
        if slept > 0 {
            // The external simulator advanced virtual time for us.
            self.counters.cycles += slept;
            self.counters.sleep_cycles += slept;
            self.limit += slept;
            self.pmr &= !pmr::DME;
        } else {
            // Sleep through the rest of the quantum but stay dozing.
            let skip = skip.min(self.limit.saturating_sub(self.counters.cycles));
            self.counters.cycles += skip;
            self.counters.sleep_cycles += skip;
            self.update_timer();
        }
    }

    fn update_timer(&mut self) {
        if self.tick.enabled() {
            self.tick.update(self.counters.cycles - self.tick_update);
            if self.tick.irq_pending() {
                self.raise(Exception::TickTimer, 0);
            }
        }
        self.tick_update = self.counters.cycles;
    }

    // Cycles until the next breakpoint could be reached by straight-line
    // execution, as an absolute cycle count.
    fn next_breakpoint(&self) -> u64 {
        let mut next = u64::MAX;
        for &bp in &self.breakpoints {
            let until = (bp.wrapping_sub(self.next_pc) / 4) as u64;
            next = next.min(until);
        }
        next.saturating_add(self.counters.cycles)
    }

    fn breakpoint_hit(&self) -> bool {
        self.breakpoints.contains(&self.next_pc)
    }

    /// Registers a pending jump without target validation; used for
    /// exception vectors, which are aligned by construction.
    pub(crate) fn set_jump(&mut self, target: u32, delay: u64) {
        self.jump_target = target;
        self.jump_insn = self.counters.instructions + delay;
    }

    /// Registers a pending jump from a branch/jump instruction. A
    /// misaligned target raises Instruction-Alignment immediately.
    pub(crate) fn schedule_jump(&mut self, target: u32, delay: u64) -> Result<(), Fault> {
        self.set_jump(target, delay);
        if !crate::bits::is_aligned(target, 4) {
            return Err(Fault::new(Exception::InsnAlignment, target));
        }
        Ok(())
    }

    /// Instructions following a taken branch: 1 for the architectural
    /// delay slot, 0 when the no-delay-slot configuration bit is set.
    pub(crate) fn jump_delay(&self) -> u64 {
        if self.cpucfg & cpucfg::ND != 0 {
            0
        } else {
            1
        }
    }

    // Fetches and decodes the instruction at next-PC, consulting the
    // instruction MMU and the decode cache. Returns `None` if an
    // exception was raised instead.
    fn fetch(&mut self) -> Option<Instruction> {
        let mut req = Request::fetch(self.next_pc);
        req.supervisor = self.status.sm();

        if self.status.ime() {
            if mmu::same_page(self.virt_ipg, self.next_pc) {
                req.addr = self.phys_ipg | mmu::page_offset(self.next_pc);
            } else {
                match self.immu.translate(&mut req, &mut self.port) {
                    Translation::TlbMiss => {
                        self.raise(Exception::InsnTlbMiss, req.addr);
                        return None;
                    }
                    Translation::PageFault => {
                        self.raise(Exception::InsnPageFault, req.addr);
                        return None;
                    }
                    Translation::Ok => {
                        self.virt_ipg = mmu::page_align(self.next_pc);
                        self.phys_ipg = mmu::page_align(req.addr);
                    }
                }
            }
        }
        let addr = req.addr;

        if self.decode_cache.is_enabled() {
            let slot = self.decode_cache.lookup(addr);
            if slot.addr == addr {
                return Some(*slot);
            }
        }

        let mut data = [0u8; 4];
        match self.port.transact(&mut req, &mut data) {
            Response::Success => {}
            Response::Failed | Response::Error => {
                self.raise(Exception::InsnBusError, addr);
                return None;
            }
        }
        let word = u32::from_ne_bytes(data);

        let Some(opcode) = decode::classify(word) else {
            self.raise(Exception::IllegalInsn, addr);
            return None;
        };
        if !implemented(opcode) {
            if self.config.warnings {
                warn!("unsupported instruction {word:#010x} at {addr:#010x}");
            }
            self.raise(Exception::IllegalInsn, addr);
            return None;
        }

        let slot = self.decode_cache.lookup(addr);
        crate::insn::decode(slot, opcode, word, addr);
        self.counters.compiles += 1;
        Some(*slot)
    }

    /// Issues one data transaction on behalf of an execute handler. The
    /// value travels in host byte order; the port converts to the system
    /// endianness.
    pub(crate) fn transact(
        &mut self,
        req: &mut Request,
        data: &mut [u8],
    ) -> Result<(), Fault> {
        req.supervisor = self.status.sm();
        req.cycles = 0;
        debug_assert_eq!(Path::Data, req.path);

        self.trace_addr = req.addr;

        if !req.is_aligned() && !req.debug {
            return Err(Fault::new(Exception::DataAlignment, req.addr));
        }

        if self.status.dme() {
            match self.dmmu.translate(req, &mut self.port) {
                Translation::TlbMiss => {
                    return Err(Fault::new(Exception::DataTlbMiss, req.addr));
                }
                Translation::PageFault => {
                    return Err(Fault::new(Exception::DataPageFault, req.addr));
                }
                Translation::Ok => {}
            }
        }

        if req.exclusive {
            debug_assert_eq!(4, req.size);
            if req.is_read() {
                self.counters.exclusive_reads += 1;
            } else {
                self.counters.exclusive_writes += 1;
            }
        }

        match self.port.transact(req, data) {
            Response::Error => {
                return Err(Fault::new(Exception::DataBusError, req.addr));
            }
            Response::Failed => {
                debug_assert!(req.exclusive);
                self.status.set_f(false);
                self.counters.exclusive_failures += 1;
            }
            Response::Success => {
                if req.exclusive {
                    self.status.set_f(true);
                }
            }
        }

        if !req.debug {
            self.counters.cycles += req.cycles;
            self.limit += req.cycles;
            let watched = if req.is_write() {
                &self.watchpoints_write
            } else {
                &self.watchpoints_read
            };
            if watched.contains(&req.addr) {
                self.watchpoint_hit = true;
            }
        }

        Ok(())
    }

    pub(crate) fn read_mem(
        &mut self,
        addr: u32,
        size: u32,
        exclusive: bool,
    ) -> Result<u32, Fault> {
        let mut req = Request::data_read(addr, size);
        req.exclusive = exclusive;
        let mut data = [0u8; 4];
        self.transact(&mut req, &mut data[..size as usize])?;
        Ok(match size {
            1 => data[0] as u32,
            2 => u16::from_ne_bytes([data[0], data[1]]) as u32,
            4 => u32::from_ne_bytes(data),
            _ => unreachable!("unsupported load size"),
        })
    }

    pub(crate) fn write_mem(
        &mut self,
        addr: u32,
        size: u32,
        value: u32,
        exclusive: bool,
    ) -> Result<(), Fault> {
        let mut req = Request::data_write(addr, size);
        req.exclusive = exclusive;
        let bytes = value.to_ne_bytes();
        let mut data = [0u8; 4];
        match size {
            1 => data[0] = bytes[0],
            2 => data[..2].copy_from_slice(&u16::to_ne_bytes(value as u16)),
            4 => data = bytes,
            _ => unreachable!("unsupported store size"),
        }
        self.transact(&mut req, &mut data[..size as usize])
    }

    /// Debugger memory read through the guest MMU translation when one of
    /// the MMUs is enabled. The buffer is filled in memory (wire) order.
    pub fn debug_read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), DebugAccessError> {
        self.debug_access(addr, buf.len() as u32, |core, phys, chunk_len, offset, buf| {
            let mut req = Request::debug_read(phys, chunk_len);
            req.endian = core.port.system_endian();
            let chunk = &mut buf[offset..offset + chunk_len as usize];
            match core.port.transact(&mut req, chunk) {
                Response::Success => Ok(()),
                _ => Err(DebugAccessError::BusError(phys)),
            }
        }, buf)
    }

    /// Debugger memory write; the mirror of [`Core::debug_read`].
    pub fn debug_write(&mut self, addr: u32, buf: &[u8]) -> Result<(), DebugAccessError> {
        let mut scratch = buf.to_vec();
        self.debug_access(addr, buf.len() as u32, |core, phys, chunk_len, offset, scratch| {
            let mut req = Request::debug_write(phys, chunk_len);
            req.endian = core.port.system_endian();
            let chunk = &mut scratch[offset..offset + chunk_len as usize];
            match core.port.transact(&mut req, chunk) {
                Response::Success => Ok(()),
                _ => Err(DebugAccessError::BusError(phys)),
            }
        }, &mut scratch)
    }

    // Splits a debug access at page boundaries, translating each page
    // through the DMMU (falling back to the IMMU) when translation is
    // enabled.
    fn debug_access<F>(
        &mut self,
        addr: u32,
        len: u32,
        mut op: F,
        buf: &mut [u8],
    ) -> Result<(), DebugAccessError>
    where
        F: FnMut(&mut Self, u32, u32, usize, &mut [u8]) -> Result<(), DebugAccessError>,
    {
        let mut offset = 0usize;
        let mut virt = addr;
        let mut remaining = len;
        while remaining > 0 {
            let in_page = (mmu::PAGE_SIZE - mmu::page_offset(virt)).min(remaining);
            let phys = self.debug_translate(virt)?;
            op(self, phys, in_page, offset, buf)?;
            offset += in_page as usize;
            virt = virt.wrapping_add(in_page);
            remaining -= in_page;
        }
        Ok(())
    }

    fn debug_translate(&mut self, addr: u32) -> Result<u32, DebugAccessError> {
        if !self.status.dme() && !self.status.ime() {
            return Ok(addr);
        }
        let mut req = Request::debug_read(addr, 4);
        if self.status.dme()
            && self.dmmu.translate(&mut req, &mut self.port) == Translation::Ok
        {
            return Ok(req.addr);
        }
        let mut req = Request::debug_read(addr, 4);
        req.path = Path::Instruction;
        if self.status.ime()
            && self.immu.translate(&mut req, &mut self.port) == Translation::Ok
        {
            return Ok(req.addr);
        }
        Err(DebugAccessError::NoTranslation(addr))
    }

    // One trace line per retired instruction: mode, address, raw word and
    // the primary architectural effect.
    fn do_trace(&mut self, insn: &Instruction) {
        let mode = if self.status.sm() { 'S' } else { 'U' };
        let mut line = format!("{mode} {:08x}: {:08x} ", self.next_pc, insn.raw);

        match insn.exec {
            ExecOp::Mtspr => {
                let reg = self.gpr_or_zero(insn.src1) | insn.imm;
                let value = self.read_spr(reg, true);
                line.push_str(&format!("SPR[{reg:04x}]  = {value:08x} "));
            }
            ExecOp::Sw | ExecOp::Swa => {
                let value = self.gpr_or_zero(insn.src2);
                line.push_str(&format!("[{:08x}] = {value:08x} ", self.trace_addr));
            }
            ExecOp::Sh => {
                let value = self.gpr_or_zero(insn.src2) & 0xffff;
                line.push_str(&format!("[{:08x}] = {value:04x}     ", self.trace_addr));
            }
            ExecOp::Sb => {
                let value = self.gpr_or_zero(insn.src2) & 0xff;
                line.push_str(&format!("[{:08x}] = {value:02x}       ", self.trace_addr));
            }
            _ => match insn.dest {
                Some(dest) => {
                    let value = self.registers.read(dest);
                    line.push_str(&format!("r{:<10} = {value:08x} ", u8::from(dest)));
                }
                None => line.push_str(&" ".repeat(22)),
            },
        }

        line.push_str(&format!(" flag: {}", u32::from(self.status.f())));
        match &mut self.trace_sink {
            Some(sink) => {
                let _ = writeln!(sink, "{line}");
            }
            // Tracing toggled on by the guest with no sink configured.
            None => eprintln!("{line}"),
        }
    }

    pub(crate) fn gpr_or_zero(&self, specifier: Option<Specifier>) -> u32 {
        specifier.map_or(0, |s| self.registers.read(s))
    }
}

// Tags the classifier recognizes but the simulator cannot execute: the
// custom-instruction slots and the ORBIS64 doubleword accesses.
fn implemented(opcode: decode::Opcode) -> bool {
    use decode::Opcode::*;
    !matches!(
        opcode,
        Ld | Sd | Cust1 | Cust2 | Cust3 | Cust4 | Cust5 | Cust6 | Cust7 | Cust8 | Cust1S | Cust1D
    )
}

impl Status {
    // The fixed-one bit is re-forced after every instruction.
    fn set_fo_invariant(&mut self) {
        let bits = self.bits();
        self.set_bits(bits);
    }
}
