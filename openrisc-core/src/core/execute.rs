//! Per-opcode execute handlers for the integer instruction set.
//!
//! Handlers return a tagged result: `Ok` with the control-flow effect the
//! quantum loop must honour, or the [`Fault`] to deliver. Destination and
//! flag writes that architecturally precede a Range exception happen
//! before the fault is returned.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bits::{ffs, fls, sign_extend};
use crate::bus::Bus;
use crate::core::{aecr, Core, Exception, Fault};
use crate::insn::{ExecOp, Instruction};
use crate::registers::Specifier;

/// Control-flow effect of one executed instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Effect {
    Proceed,
    /// End the running mini-quantum so the engine re-reads machine state.
    QuantumBreak,
    /// The guest requested simulation exit.
    Exit,
}

pub(crate) type ExecResult = Result<Effect, Fault>;

impl<B: Bus> Core<B> {
    /// Dispatches a decoded instruction to its handler and folds the
    /// result into engine state.
    pub(crate) fn dispatch(&mut self, insn: &Instruction) {
        let result = match insn.exec {
            ExecOp::Invalid => unreachable!("invalid decode-cache slot dispatched"),
            ExecOp::Mfspr => self.exec_mfspr(insn),
            ExecOp::Mtspr => self.exec_mtspr(insn),
            ExecOp::Movhi => self.exec_movhi(insn),
            ExecOp::Nop => self.exec_nop(insn),
            ExecOp::Bf => self.exec_bf(insn),
            ExecOp::Bnf => self.exec_bnf(insn),
            ExecOp::JumpRel => self.exec_jump_rel(insn),
            ExecOp::JumpAbs => self.exec_jump_abs(insn),
            ExecOp::Lwa => self.exec_load(insn, 4, LoadExtend::Zero, true),
            ExecOp::Lw => self.exec_load(insn, 4, LoadExtend::Zero, false),
            ExecOp::Lhz => self.exec_load(insn, 2, LoadExtend::Zero, false),
            ExecOp::Lhs => self.exec_load(insn, 2, LoadExtend::Sign, false),
            ExecOp::Lbz => self.exec_load(insn, 1, LoadExtend::Zero, false),
            ExecOp::Lbs => self.exec_load(insn, 1, LoadExtend::Sign, false),
            ExecOp::Swa => self.exec_store(insn, 4, true),
            ExecOp::Sw => self.exec_store(insn, 4, false),
            ExecOp::Sh => self.exec_store(insn, 2, false),
            ExecOp::Sb => self.exec_store(insn, 1, false),
            ExecOp::Extw => self.exec_unary(insn, |a| a),
            ExecOp::Exthz => self.exec_unary(insn, |a| a & 0xffff),
            ExecOp::Exths => self.exec_unary(insn, |a| sign_extend(a, 15)),
            ExecOp::Extbz => self.exec_unary(insn, |a| a & 0xff),
            ExecOp::Extbs => self.exec_unary(insn, |a| sign_extend(a, 7)),
            ExecOp::Add => self.exec_add(insn, false),
            ExecOp::Addc => self.exec_add(insn, true),
            ExecOp::Sub => self.exec_sub(insn),
            ExecOp::And => self.exec_binary(insn, |a, b| a & b),
            ExecOp::Or => self.exec_binary(insn, |a, b| a | b),
            ExecOp::Xor => self.exec_binary(insn, |a, b| a ^ b),
            ExecOp::Cmov => self.exec_cmov(insn),
            ExecOp::Ff1 => self.exec_unary(insn, ffs),
            ExecOp::Fl1 => self.exec_unary(insn, fls),
            ExecOp::Sll => self.exec_binary(insn, |a, b| a << (b & 0x1f)),
            ExecOp::Srl => self.exec_binary(insn, |a, b| a >> (b & 0x1f)),
            ExecOp::Sra => self.exec_binary(insn, |a, b| ((a as i32) >> (b & 0x1f)) as u32),
            ExecOp::Ror => self.exec_binary(insn, |a, b| a.rotate_right(b & 0x1f)),
            ExecOp::Mul => self.exec_mul(insn),
            ExecOp::Mulu => self.exec_mulu(insn),
            ExecOp::Muld => self.exec_muld(insn),
            ExecOp::Muldu => self.exec_muldu(insn),
            ExecOp::Div => self.exec_div(insn),
            ExecOp::Divu => self.exec_divu(insn),
            ExecOp::Sfeq => self.exec_compare(insn, |a, b| a == b),
            ExecOp::Sfne => self.exec_compare(insn, |a, b| a != b),
            ExecOp::Sfgtu => self.exec_compare(insn, |a, b| a > b),
            ExecOp::Sfgeu => self.exec_compare(insn, |a, b| a >= b),
            ExecOp::Sfltu => self.exec_compare(insn, |a, b| a < b),
            ExecOp::Sfleu => self.exec_compare(insn, |a, b| a <= b),
            ExecOp::Sfgts => self.exec_compare(insn, |a, b| (a as i32) > (b as i32)),
            ExecOp::Sfges => self.exec_compare(insn, |a, b| (a as i32) >= (b as i32)),
            ExecOp::Sflts => self.exec_compare(insn, |a, b| (a as i32) < (b as i32)),
            ExecOp::Sfles => self.exec_compare(insn, |a, b| (a as i32) <= (b as i32)),
            ExecOp::Mac => self.exec_mac(insn, false),
            ExecOp::Msb => self.exec_mac(insn, true),
            ExecOp::Macu => self.exec_macu(insn, false),
            ExecOp::Msbu => self.exec_macu(insn, true),
            ExecOp::Macrc => self.exec_macrc(insn),
            ExecOp::Sys => Err(Fault::from(Exception::Syscall)),
            ExecOp::Trap => Err(Fault::from(Exception::Trap)),
            ExecOp::Csync | ExecOp::Msync | ExecOp::Psync => Ok(Effect::Proceed),
            ExecOp::Rfe => self.exec_rfe(),
            _ => self.dispatch_fp(insn),
        };

        match result {
            Ok(Effect::Proceed) => {}
            Ok(Effect::QuantumBreak) => self.break_requested = true,
            Ok(Effect::Exit) => self.stop_requested = true,
            Err(fault) => self.raise(fault.exception, fault.address),
        }
    }

    // The second operand: a register when the encoding names one, the
    // materialized immediate otherwise.
    fn operand2(&self, insn: &Instruction) -> u32 {
        match insn.src2 {
            Some(reg) => self.registers.read(reg),
            None => insn.imm,
        }
    }

    fn write_dest(&mut self, insn: &Instruction, value: u32) {
        if let Some(dest) = insn.dest {
            self.registers.write(dest, value);
        }
    }

    // Raises Range if the overflow-exception enable and the matching
    // arithmetic-exception control bit are both set.
    fn arith_exception(&mut self, bit: u32) -> Result<(), Fault> {
        if self.status.ove() && self.aecr & bit != 0 {
            self.aesr |= bit;
            return Err(Fault::from(Exception::Range));
        }
        Ok(())
    }

    fn exec_mfspr(&mut self, insn: &Instruction) -> ExecResult {
        let reg = self.gpr_or_zero(insn.src1) | insn.imm;
        let value = self.read_spr(reg, false);
        self.write_dest(insn, value);
        Ok(Effect::Proceed)
    }

    fn exec_mtspr(&mut self, insn: &Instruction) -> ExecResult {
        let reg = self.gpr_or_zero(insn.src1) | insn.imm;
        let value = self.gpr_or_zero(insn.src2);
        self.write_spr(reg, value, false);
        Ok(Effect::Proceed)
    }

    fn exec_movhi(&mut self, insn: &Instruction) -> ExecResult {
        self.write_dest(insn, insn.imm);
        Ok(Effect::Proceed)
    }

    fn exec_bf(&mut self, insn: &Instruction) -> ExecResult {
        if self.status.f() {
            let target = self.next_pc.wrapping_add(insn.imm);
            self.schedule_jump(target, self.jump_delay())?;
        }
        Ok(Effect::Proceed)
    }

    fn exec_bnf(&mut self, insn: &Instruction) -> ExecResult {
        if !self.status.f() {
            let target = self.next_pc.wrapping_add(insn.imm);
            self.schedule_jump(target, self.jump_delay())?;
        }
        Ok(Effect::Proceed)
    }

    fn exec_jump_rel(&mut self, insn: &Instruction) -> ExecResult {
        let target = self.next_pc.wrapping_add(self.operand2(insn));
        self.exec_jump(insn, target)
    }

    fn exec_jump_abs(&mut self, insn: &Instruction) -> ExecResult {
        let target = self.operand2(insn);
        self.exec_jump(insn, target)
    }

    // The link register is written before the jump is validated.
    fn exec_jump(&mut self, insn: &Instruction, target: u32) -> ExecResult {
        let delay = self.jump_delay();
        if let Some(link) = insn.dest {
            let value = self.next_pc.wrapping_add((delay as u32 + 1) * 4);
            self.registers.write(link, value);
        }
        self.schedule_jump(target, delay)?;
        Ok(Effect::Proceed)
    }

    fn exec_load(
        &mut self,
        insn: &Instruction,
        size: u32,
        extend: LoadExtend,
        exclusive: bool,
    ) -> ExecResult {
        let addr = self.gpr_or_zero(insn.src1).wrapping_add(insn.imm);
        let value = self.read_mem(addr, size, exclusive)?;
        let value = match (extend, size) {
            (LoadExtend::Sign, 2) => sign_extend(value, 15),
            (LoadExtend::Sign, 1) => sign_extend(value, 7),
            _ => value,
        };
        self.write_dest(insn, value);
        Ok(Effect::Proceed)
    }

    fn exec_store(&mut self, insn: &Instruction, size: u32, exclusive: bool) -> ExecResult {
        let addr = self.gpr_or_zero(insn.src1).wrapping_add(insn.imm);
        let value = self.gpr_or_zero(insn.src2);
        self.write_mem(addr, size, value, exclusive)?;
        Ok(Effect::Proceed)
    }

    fn exec_unary(&mut self, insn: &Instruction, op: impl FnOnce(u32) -> u32) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1);
        self.write_dest(insn, op(a));
        Ok(Effect::Proceed)
    }

    fn exec_binary(&mut self, insn: &Instruction, op: impl FnOnce(u32, u32) -> u32) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1);
        let b = self.operand2(insn);
        self.write_dest(insn, op(a, b));
        Ok(Effect::Proceed)
    }

    fn exec_cmov(&mut self, insn: &Instruction) -> ExecResult {
        let value = if self.status.f() {
            self.gpr_or_zero(insn.src1)
        } else {
            self.operand2(insn)
        };
        self.write_dest(insn, value);
        Ok(Effect::Proceed)
    }

    fn exec_compare(&mut self, insn: &Instruction, cmp: impl FnOnce(u32, u32) -> bool) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1);
        let b = self.operand2(insn);
        self.status.set_f(cmp(a, b));
        Ok(Effect::Proceed)
    }

    // l.add/l.addi and the carry-in variants l.addc/l.addic.
    fn exec_add(&mut self, insn: &Instruction, with_carry: bool) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1);
        let b = self.operand2(insn);
        let carry_in = (with_carry && self.status.cy()) as u32;

        let (partial, c1) = a.overflowing_add(b);
        let (result, c2) = partial.overflowing_add(carry_in);
        self.write_dest(insn, result);

        let carry = c1 || c2;
        let overflow = signed_add_overflow(a, b, result);
        self.status.set_cy(carry);
        self.status.set_ov(overflow);

        if with_carry && carry {
            self.arith_exception(aecr::CYADDE)?;
        }
        if overflow {
            self.arith_exception(aecr::OVADDE)?;
        }
        Ok(Effect::Proceed)
    }

    fn exec_sub(&mut self, insn: &Instruction) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1);
        let b = self.operand2(insn);
        let result = a.wrapping_sub(b);
        self.write_dest(insn, result);

        let carry = b > a;
        let overflow = signed_sub_overflow(a, b, result);
        self.status.set_cy(carry);
        self.status.set_ov(overflow);

        if carry {
            self.arith_exception(aecr::CYADDE)?;
        }
        if overflow {
            self.arith_exception(aecr::OVADDE)?;
        }
        Ok(Effect::Proceed)
    }

    fn exec_mul(&mut self, insn: &Instruction) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1) as i32 as i64;
        let b = self.operand2(insn) as i32 as i64;
        let product = a * b;
        self.write_dest(insn, product as u32);

        let overflow = product > i32::MAX as i64 || product < i32::MIN as i64;
        self.status.set_ov(overflow);
        if overflow {
            self.arith_exception(aecr::OVMULE)?;
        }
        Ok(Effect::Proceed)
    }

    fn exec_mulu(&mut self, insn: &Instruction) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1) as u64;
        let b = self.operand2(insn) as u64;
        let product = a * b;
        self.write_dest(insn, product as u32);

        let carry = product > u32::MAX as u64;
        self.status.set_cy(carry);
        if carry {
            self.arith_exception(aecr::CYMULE)?;
        }
        Ok(Effect::Proceed)
    }

    fn exec_muld(&mut self, insn: &Instruction) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1) as i32 as i64;
        let b = self.operand2(insn) as i32 as i64;
        let product = a * b;
        self.mac = product as u64;

        let overflow = product > i32::MAX as i64 || product < i32::MIN as i64;
        self.status.set_ov(overflow);
        if overflow {
            self.arith_exception(aecr::OVMULE)?;
        }
        Ok(Effect::Proceed)
    }

    fn exec_muldu(&mut self, insn: &Instruction) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1) as u64;
        let b = self.operand2(insn) as u64;
        let product = a * b;
        self.mac = product;

        let carry = product > u32::MAX as u64;
        self.status.set_cy(carry);
        if carry {
            self.arith_exception(aecr::CYMULE)?;
        }
        Ok(Effect::Proceed)
    }

    // A zero divisor leaves the destination untouched and reports through
    // the overflow (signed) flag.
    fn exec_div(&mut self, insn: &Instruction) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1) as i32;
        let b = self.operand2(insn) as i32;
        if b == 0 {
            self.status.set_ov(true);
            self.arith_exception(aecr::DBZE)?;
            return Ok(Effect::Proceed);
        }
        self.status.set_ov(false);
        self.write_dest(insn, a.wrapping_div(b) as u32);
        Ok(Effect::Proceed)
    }

    fn exec_divu(&mut self, insn: &Instruction) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1);
        let b = self.operand2(insn);
        if b == 0 {
            self.status.set_cy(true);
            self.arith_exception(aecr::DBZE)?;
            return Ok(Effect::Proceed);
        }
        self.status.set_cy(false);
        self.write_dest(insn, a / b);
        Ok(Effect::Proceed)
    }

    // Accumulate (or subtract) the signed 64-bit product; overflow is
    // judged against the 32-bit truncation.
    fn exec_mac(&mut self, insn: &Instruction, subtract: bool) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1) as i32 as i64;
        let b = self.operand2(insn) as i32 as i64;
        let product = a.wrapping_mul(b);
        let acc = self.mac as i64;
        let result = if subtract {
            acc.wrapping_sub(product)
        } else {
            acc.wrapping_add(product)
        };
        self.mac = result as u64;

        let overflow = result > i32::MAX as i64 || result < i32::MIN as i64;
        self.status.set_ov(overflow);
        if overflow {
            self.arith_exception(aecr::OVMACADDE)?;
        }
        Ok(Effect::Proceed)
    }

    fn exec_macu(&mut self, insn: &Instruction, subtract: bool) -> ExecResult {
        let a = self.gpr_or_zero(insn.src1) as u64;
        let b = self.operand2(insn) as u64;
        let product = a.wrapping_mul(b);
        let result = if subtract {
            self.mac.wrapping_sub(product)
        } else {
            self.mac.wrapping_add(product)
        };
        self.mac = result;

        let carry = result > u32::MAX as u64;
        self.status.set_cy(carry);
        if carry {
            self.arith_exception(aecr::CYMACADDE)?;
        }
        Ok(Effect::Proceed)
    }

    fn exec_macrc(&mut self, insn: &Instruction) -> ExecResult {
        self.write_dest(insn, self.mac as u32);
        self.mac = 0;
        Ok(Effect::Proceed)
    }

    fn exec_rfe(&mut self) -> ExecResult {
        let target = self.expc;
        self.schedule_jump(target, 0)?;
        self.status.set_bits(self.exsr);
        self.invalidate_fetch_page();
        // The restored state must be observed by the next fetch.
        Ok(Effect::QuantumBreak)
    }

    // The l.nop immediate selects a simulation-control hook.
    fn exec_nop(&mut self, insn: &Instruction) -> ExecResult {
        match insn.imm {
            nop::NOP => Ok(Effect::Proceed),
            nop::EXIT => {
                let code = self.gpr_or_zero(insn.src1);
                let _ = writeln!(self.console, "(openrisc) exit({code})");
                self.finish(code)
            }
            nop::REPORT => {
                let value = self.gpr_or_zero(insn.src1);
                let _ = writeln!(self.console, "(openrisc) report({value:#010x})");
                Ok(Effect::Proceed)
            }
            nop::PUTC => {
                let byte = self.gpr_or_zero(insn.src1) as u8;
                let _ = self.console.write_all(&[byte]);
                let _ = self.console.flush();
                Ok(Effect::Proceed)
            }
            nop::CNT_RESET => {
                let _ = writeln!(self.console, "(openrisc) info: statistics reset");
                self.counters.reset_instructions();
                self.counters.reset_compiles();
                // Limits must be recalculated against the fresh counters.
                Ok(Effect::QuantumBreak)
            }
            nop::GET_TICKS => {
                let cycles = self.counters.cycles();
                self.registers.write(Specifier::R11, cycles as u32);
                self.registers.write(Specifier::R12, (cycles >> 32) as u32);
                Ok(Effect::Proceed)
            }
            nop::GET_PS => {
                let ps_per_cycle = 1_000_000_000_000u64 / self.config.clock_hz;
                self.registers.write(Specifier::R11, ps_per_cycle as u32);
                Ok(Effect::Proceed)
            }
            nop::TRACE_ON => {
                self.trace_enabled = true;
                let _ = writeln!(self.console, "(openrisc) info: tracing enabled");
                Ok(Effect::Proceed)
            }
            nop::TRACE_OFF => {
                self.trace_enabled = false;
                let _ = writeln!(self.console, "(openrisc) info: tracing disabled");
                Ok(Effect::Proceed)
            }
            nop::RANDOM => {
                self.registers.write(Specifier::R11, rand::random());
                Ok(Effect::Proceed)
            }
            nop::SIMULATOR => {
                // Report a virtual environment to the guest.
                self.registers.write(Specifier::R11, 2);
                Ok(Effect::Proceed)
            }
            nop::SILENT_EXIT => {
                let code = self.gpr_or_zero(insn.src1);
                self.finish(code)
            }
            nop::HOST_TIME => {
                let ms = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                self.registers.write(Specifier::R11, ms as u32);
                self.registers.write(Specifier::R12, (ms >> 32) as u32);
                Ok(Effect::Proceed)
            }
            nop::PUTS => {
                let addr = self.gpr_or_zero(insn.src1);
                let text = self.read_guest_string(addr);
                let _ = self.console.write_all(&text);
                let _ = self.console.flush();
                Ok(Effect::Proceed)
            }
            _ => Ok(Effect::Proceed),
        }
    }

    // The exiting instruction itself does not count.
    fn finish(&mut self, code: u32) -> ExecResult {
        self.counters.cycles -= 1;
        self.counters.instructions -= 1;
        self.exit_code = code;
        Ok(Effect::Exit)
    }

    fn read_guest_string(&mut self, addr: u32) -> Vec<u8> {
        const MAX: u32 = 4096;
        let mut text = Vec::new();
        for offset in 0..MAX {
            let mut byte = [0u8];
            if self.debug_read(addr.wrapping_add(offset), &mut byte).is_err() || byte[0] == 0 {
                break;
            }
            text.push(byte[0]);
        }
        text
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum LoadExtend {
    Zero,
    Sign,
}

// Two's-complement overflow: operands of equal sign producing a result of
// the opposite sign.
fn signed_add_overflow(a: u32, b: u32, result: u32) -> bool {
    let (a, b, r) = (a as i32, b as i32, result as i32);
    ((a < 0) == (b < 0)) && ((r < 0) != (a < 0))
}

fn signed_sub_overflow(a: u32, b: u32, result: u32) -> bool {
    let (a, b, r) = (a as i32, b as i32, result as i32);
    ((a < 0) && (b >= 0) && (r >= 0)) || ((a >= 0) && (b < 0) && (r < 0))
}

/// NOP side-channel codes (the `l.nop` immediate).
pub mod nop {
    pub const NOP: u32 = 0x0;
    pub const EXIT: u32 = 0x1;
    pub const REPORT: u32 = 0x2;
    pub const PUTC: u32 = 0x4;
    pub const CNT_RESET: u32 = 0x5;
    pub const GET_TICKS: u32 = 0x6;
    pub const GET_PS: u32 = 0x7;
    pub const TRACE_ON: u32 = 0x8;
    pub const TRACE_OFF: u32 = 0x9;
    pub const RANDOM: u32 = 0xa;
    pub const SIMULATOR: u32 = 0xb;
    pub const SILENT_EXIT: u32 = 0xc;
    pub const HOST_TIME: u32 = 0xd;
    pub const PUTS: u32 = 0xe;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_add_overflow() {
        // Property: overflow iff operand signs agree and the result sign
        // differs.
        assert!(signed_add_overflow(0x7fff_ffff, 1, 0x8000_0000));
        assert!(signed_add_overflow(0x8000_0000, 0x8000_0000, 0));
        assert!(!signed_add_overflow(0xffff_ffff, 1, 0));
        assert!(!signed_add_overflow(1, 2, 3));
    }

    #[test]
    fn test_signed_sub_overflow() {
        assert!(signed_sub_overflow(0x8000_0000, 1, 0x7fff_ffff));
        assert!(signed_sub_overflow(0x7fff_ffff, 0xffff_ffff, 0x8000_0000));
        assert!(!signed_sub_overflow(3, 2, 1));
        assert!(!signed_sub_overflow(2, 3, 0xffff_ffff));
    }
}
