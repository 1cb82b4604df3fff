//! ORFPX32/64 execute handlers and FPCSR flag maintenance.
//!
//! Operands are the GPR bit patterns reinterpreted as IEEE 754 values;
//! double-precision values occupy adjacent register pairs with the high
//! word in the named register. Arithmetic uses host floating point with
//! round-to-nearest-even; the FPCSR rounding-mode field is applied to the
//! float-to-integer conversions. After each operation the FPCSR status
//! flags are refreshed from the result, and a Floating-Point exception is
//! raised if enabled.

use crate::bus::Bus;
use crate::core::execute::{Effect, ExecResult};
use crate::core::{fpcsr, Core, Exception, Fault};
use crate::insn::{ExecOp, Instruction};
use crate::registers::Specifier;

// Conditions feeding the FPCSR status flags after one operation.
#[derive(Debug, Default)]
struct FpOutcome {
    zero: bool,
    infinite: bool,
    nan: bool,
    overflow: bool,
    underflow: bool,
    divide_by_zero: bool,
}

impl FpOutcome {
    fn of_f32(result: f32, operands_finite: bool, divide_by_zero: bool) -> Self {
        Self {
            zero: result == 0.0,
            infinite: result.is_infinite(),
            nan: result.is_nan(),
            overflow: result.is_infinite() && operands_finite,
            underflow: result != 0.0 && result.is_subnormal(),
            divide_by_zero,
        }
    }

    fn of_f64(result: f64, operands_finite: bool, divide_by_zero: bool) -> Self {
        Self {
            zero: result == 0.0,
            infinite: result.is_infinite(),
            nan: result.is_nan(),
            overflow: result.is_infinite() && operands_finite,
            underflow: result != 0.0 && result.is_subnormal(),
            divide_by_zero,
        }
    }
}

impl<B: Bus> Core<B> {
    pub(crate) fn dispatch_fp(&mut self, insn: &Instruction) -> ExecResult {
        match insn.exec {
            ExecOp::FaddS => self.fp32_binop(insn, |a, b| a + b, false),
            ExecOp::FsubS => self.fp32_binop(insn, |a, b| a - b, false),
            ExecOp::FmulS => self.fp32_binop(insn, |a, b| a * b, false),
            ExecOp::FdivS => self.fp32_binop(insn, |a, b| a / b, true),
            ExecOp::FremS => self.fp32_binop(insn, |a, b| a % b, false),
            ExecOp::FmaddS => self.fp32_madd(insn),
            ExecOp::FitofS => self.fp32_itof(insn),
            ExecOp::FftoiS => self.fp32_ftoi(insn),
            ExecOp::FsfeqS => self.fp32_compare(insn, |a, b| a == b),
            ExecOp::FsfneS => self.fp32_compare(insn, |a, b| a != b),
            ExecOp::FsfgtS => self.fp32_compare(insn, |a, b| a > b),
            ExecOp::FsfgeS => self.fp32_compare(insn, |a, b| a >= b),
            ExecOp::FsfltS => self.fp32_compare(insn, |a, b| a < b),
            ExecOp::FsfleS => self.fp32_compare(insn, |a, b| a <= b),
            ExecOp::FaddD => self.fp64_binop(insn, |a, b| a + b, false),
            ExecOp::FsubD => self.fp64_binop(insn, |a, b| a - b, false),
            ExecOp::FmulD => self.fp64_binop(insn, |a, b| a * b, false),
            ExecOp::FdivD => self.fp64_binop(insn, |a, b| a / b, true),
            ExecOp::FremD => self.fp64_binop(insn, |a, b| a % b, false),
            ExecOp::FmaddD => self.fp64_madd(insn),
            ExecOp::FitofD => self.fp64_itof(insn),
            ExecOp::FftoiD => self.fp64_ftoi(insn),
            ExecOp::FsfeqD => self.fp64_compare(insn, |a, b| a == b),
            ExecOp::FsfneD => self.fp64_compare(insn, |a, b| a != b),
            ExecOp::FsfgtD => self.fp64_compare(insn, |a, b| a > b),
            ExecOp::FsfgeD => self.fp64_compare(insn, |a, b| a >= b),
            ExecOp::FsfltD => self.fp64_compare(insn, |a, b| a < b),
            ExecOp::FsfleD => self.fp64_compare(insn, |a, b| a <= b),
            other => unreachable!("non-FP op {other:?} routed to the FPU"),
        }
    }

    fn fp32_src(&self, specifier: Option<Specifier>) -> f32 {
        f32::from_bits(self.gpr_or_zero(specifier))
    }

    fn fp64_src(&self, specifier: Option<Specifier>) -> f64 {
        let reg = specifier.unwrap_or(Specifier::R0);
        let hi = self.gpr(reg) as u64;
        let lo = self.gpr(reg.pair()) as u64;
        f64::from_bits(hi << 32 | lo)
    }

    fn write_fp64_dest(&mut self, insn: &Instruction, value: f64) {
        if let Some(dest) = insn.dest {
            let bits = value.to_bits();
            self.set_gpr(dest, (bits >> 32) as u32);
            self.set_gpr(dest.pair(), bits as u32);
        }
    }

    // Refreshes the FPCSR status flags and raises the FP exception when
    // it is enabled and any flag fired.
    fn settle_fp(&mut self, outcome: FpOutcome) -> ExecResult {
        self.fpcsr &= !(fpcsr::ZF | fpcsr::INF | fpcsr::QNF | fpcsr::OVF | fpcsr::UNF | fpcsr::DZF);
        let mut fired = false;
        let mut set = |flags: &mut u32, bit: u32, cond: bool| {
            if cond {
                *flags |= bit;
                fired = true;
            }
        };
        set(&mut self.fpcsr, fpcsr::ZF, outcome.zero);
        set(&mut self.fpcsr, fpcsr::INF, outcome.infinite);
        set(&mut self.fpcsr, fpcsr::QNF, outcome.nan);
        set(&mut self.fpcsr, fpcsr::OVF, outcome.overflow);
        set(&mut self.fpcsr, fpcsr::UNF, outcome.underflow);
        set(&mut self.fpcsr, fpcsr::DZF, outcome.divide_by_zero);

        if fired && self.fpcsr & fpcsr::FPEE != 0 {
            return Err(Fault::from(Exception::FloatingPoint));
        }
        Ok(Effect::Proceed)
    }

    fn fp32_binop(
        &mut self,
        insn: &Instruction,
        op: impl FnOnce(f32, f32) -> f32,
        is_division: bool,
    ) -> ExecResult {
        let a = self.fp32_src(insn.src1);
        let b = self.fp32_src(insn.src2);
        let result = op(a, b);
        if let Some(dest) = insn.dest {
            self.set_gpr(dest, result.to_bits());
        }
        let divide_by_zero = is_division && b == 0.0 && a != 0.0 && a.is_finite();
        self.settle_fp(FpOutcome::of_f32(
            result,
            a.is_finite() && b.is_finite(),
            divide_by_zero,
        ))
    }

    // Multiply-accumulate into the low word of the FP-MAC register.
    fn fp32_madd(&mut self, insn: &Instruction) -> ExecResult {
        let a = self.fp32_src(insn.src1);
        let b = self.fp32_src(insn.src2);
        let acc = f32::from_bits(self.fmac as u32);
        let result = acc + a * b;
        self.fmac = (self.fmac & !0xffff_ffff) | result.to_bits() as u64;
        self.settle_fp(FpOutcome::of_f32(
            result,
            a.is_finite() && b.is_finite() && acc.is_finite(),
            false,
        ))
    }

    fn fp32_itof(&mut self, insn: &Instruction) -> ExecResult {
        let value = self.gpr_or_zero(insn.src1) as i32 as f32;
        if let Some(dest) = insn.dest {
            self.set_gpr(dest, value.to_bits());
        }
        Ok(Effect::Proceed)
    }

    fn fp32_ftoi(&mut self, insn: &Instruction) -> ExecResult {
        let value = self.fp32_src(insn.src1);
        let rounded = round_f32(value, self.fpcsr & fpcsr::RM_MASK);
        if let Some(dest) = insn.dest {
            self.set_gpr(dest, rounded as i32 as u32);
        }
        Ok(Effect::Proceed)
    }

    fn fp32_compare(&mut self, insn: &Instruction, cmp: impl FnOnce(f32, f32) -> bool) -> ExecResult {
        let a = self.fp32_src(insn.src1);
        let b = self.fp32_src(insn.src2);
        self.status.set_f(cmp(a, b));
        Ok(Effect::Proceed)
    }

    fn fp64_binop(
        &mut self,
        insn: &Instruction,
        op: impl FnOnce(f64, f64) -> f64,
        is_division: bool,
    ) -> ExecResult {
        let a = self.fp64_src(insn.src1);
        let b = self.fp64_src(insn.src2);
        let result = op(a, b);
        self.write_fp64_dest(insn, result);
        let divide_by_zero = is_division && b == 0.0 && a != 0.0 && a.is_finite();
        self.settle_fp(FpOutcome::of_f64(
            result,
            a.is_finite() && b.is_finite(),
            divide_by_zero,
        ))
    }

    // Multiply-accumulate into the FP-MAC register viewed as a double.
    fn fp64_madd(&mut self, insn: &Instruction) -> ExecResult {
        let a = self.fp64_src(insn.src1);
        let b = self.fp64_src(insn.src2);
        let acc = f64::from_bits(self.fmac);
        let result = acc + a * b;
        self.fmac = result.to_bits();
        self.settle_fp(FpOutcome::of_f64(
            result,
            a.is_finite() && b.is_finite() && acc.is_finite(),
            false,
        ))
    }

    fn fp64_itof(&mut self, insn: &Instruction) -> ExecResult {
        let bits = {
            let reg = insn.src1.unwrap_or(Specifier::R0);
            (self.gpr(reg) as u64) << 32 | self.gpr(reg.pair()) as u64
        };
        let value = bits as i64 as f64;
        self.write_fp64_dest(insn, value);
        Ok(Effect::Proceed)
    }

    fn fp64_ftoi(&mut self, insn: &Instruction) -> ExecResult {
        let value = self.fp64_src(insn.src1);
        let rounded = round_f64(value, self.fpcsr & fpcsr::RM_MASK);
        if let Some(dest) = insn.dest {
            let result = rounded as i64 as u64;
            self.set_gpr(dest, (result >> 32) as u32);
            self.set_gpr(dest.pair(), result as u32);
        }
        Ok(Effect::Proceed)
    }

    fn fp64_compare(&mut self, insn: &Instruction, cmp: impl FnOnce(f64, f64) -> bool) -> ExecResult {
        let a = self.fp64_src(insn.src1);
        let b = self.fp64_src(insn.src2);
        self.status.set_f(cmp(a, b));
        Ok(Effect::Proceed)
    }
}

fn round_f32(value: f32, mode: u32) -> f32 {
    match mode {
        fpcsr::RM_ZERO => value.trunc(),
        fpcsr::RM_UP => value.ceil(),
        fpcsr::RM_DOWN => value.floor(),
        _ => value.round_ties_even(),
    }
}

fn round_f64(value: f64, mode: u32) -> f64 {
    match mode {
        fpcsr::RM_ZERO => value.trunc(),
        fpcsr::RM_UP => value.ceil(),
        fpcsr::RM_DOWN => value.floor(),
        _ => value.round_ties_even(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding_modes() {
        assert_eq!(2.0, round_f32(2.5, fpcsr::RM_NEAREST));
        assert_eq!(2.0, round_f32(2.5, fpcsr::RM_ZERO));
        assert_eq!(3.0, round_f32(2.5, fpcsr::RM_UP));
        assert_eq!(2.0, round_f32(2.5, fpcsr::RM_DOWN));
        assert_eq!(-2.0, round_f64(-2.5, fpcsr::RM_ZERO));
        assert_eq!(-2.0, round_f64(-2.5, fpcsr::RM_UP));
        assert_eq!(-3.0, round_f64(-2.5, fpcsr::RM_DOWN));
    }

    #[test]
    fn test_outcome_classification() {
        let outcome = FpOutcome::of_f32(f32::INFINITY, true, false);
        assert!(outcome.overflow);
        assert!(outcome.infinite);
        assert!(!outcome.nan);

        let outcome = FpOutcome::of_f32(0.0, true, false);
        assert!(outcome.zero);
        assert!(!outcome.overflow);

        let outcome = FpOutcome::of_f64(f64::NAN, false, false);
        assert!(outcome.nan);
        assert!(!outcome.overflow);
    }
}
