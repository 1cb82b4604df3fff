//! Opcode classification for the ORBIS32 and ORFPX32/64 instruction sets.
//!
//! [`classify`] is a pure function from a 32-bit instruction word to an
//! opcode tag. The primary dispatch is on bits 31..26; the ALU, move,
//! shift-immediate, MAC and FPU families select through secondary fields,
//! and the compare/sync/trap encodings fall through to wider opcode
//! matches (8, 11, 16 and full 32 bits).

use crate::bits::field;

/// Tag for every instruction encoding the simulator recognizes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Opcode {
    // ORBIS32
    Nop,
    Mfspr,
    Mtspr,
    Movhi,

    // Control
    J,
    Jr,
    Jal,
    Jalr,
    Bf,
    Bnf,

    // Load & store
    Lwa,
    Ld,
    Lwz,
    Lws,
    Lhz,
    Lhs,
    Lbz,
    Lbs,
    Swa,
    Sd,
    Sw,
    Sh,
    Sb,

    // Sign/zero extend
    Extwz,
    Extws,
    Exthz,
    Exths,
    Extbz,
    Extbs,

    // ALU (reg, reg)
    Add,
    Addc,
    Sub,
    And,
    Or,
    Xor,
    Cmov,
    Ff1,
    Fl1,
    Sll,
    Srl,
    Sra,
    Ror,
    Mul,
    Mulu,
    Muld,
    Muldu,
    Div,
    Divu,

    // ALU (reg, imm)
    Addi,
    Addic,
    Andi,
    Ori,
    Xori,
    Muli,
    Slli,
    Srli,
    Srai,
    Rori,

    // Compare-set-flag (reg, reg)
    Sfeq,
    Sfne,
    Sfgtu,
    Sfgeu,
    Sfltu,
    Sfleu,
    Sfgts,
    Sfges,
    Sflts,
    Sfles,

    // Compare-set-flag (reg, imm)
    Sfeqi,
    Sfnei,
    Sfgtui,
    Sfgeui,
    Sfltui,
    Sfleui,
    Sfgtsi,
    Sfgesi,
    Sfltsi,
    Sflesi,

    // Multiply-accumulate
    Mac,
    Macu,
    Msb,
    Msbu,
    Maci,
    Macrc,

    // System interface
    Sys,
    Trap,
    Msync,
    Psync,
    Csync,
    Rfe,

    // Custom instruction slots (recognized, never implemented)
    Cust1,
    Cust2,
    Cust3,
    Cust4,
    Cust5,
    Cust6,
    Cust7,
    Cust8,

    // ORFPX32 (single precision)
    AddS,
    SubS,
    MulS,
    DivS,
    ItofS,
    FtoiS,
    RemS,
    MaddS,
    SfeqS,
    SfneS,
    SfgtS,
    SfgeS,
    SfltS,
    SfleS,
    Cust1S,

    // ORFPX64 (double precision, register pairs)
    AddD,
    SubD,
    MulD,
    DivD,
    ItofD,
    FtoiD,
    RemD,
    MaddD,
    SfeqD,
    SfneD,
    SfgtD,
    SfgeD,
    SfltD,
    SfleD,
    Cust1D,
}

/// Classifies a raw instruction word. Returns `None` for encodings that do
/// not correspond to any recognized instruction.
pub fn classify(word: u32) -> Option<Opcode> {
    match field(word, 31, 26) {
        0x38 => return classify_alu(word),
        0x06 => return classify_util(word),
        0x2e => return classify_shift_imm(word),
        0x31 => return classify_mac(word),
        0x32 => return classify_fpx(word),

        // Control
        0x00 => return Some(Opcode::J),
        0x01 => return Some(Opcode::Jal),
        0x03 => return Some(Opcode::Bnf),
        0x04 => return Some(Opcode::Bf),
        0x11 => return Some(Opcode::Jr),
        0x12 => return Some(Opcode::Jalr),

        // ALU immediate
        0x27 => return Some(Opcode::Addi),
        0x28 => return Some(Opcode::Addic),
        0x29 => return Some(Opcode::Andi),
        0x2a => return Some(Opcode::Ori),
        0x2b => return Some(Opcode::Xori),
        0x2c => return Some(Opcode::Muli),

        // Load & store
        0x1b => return Some(Opcode::Lwa),
        0x20 => return Some(Opcode::Ld),
        0x21 => return Some(Opcode::Lwz),
        0x22 => return Some(Opcode::Lws),
        0x23 => return Some(Opcode::Lbz),
        0x24 => return Some(Opcode::Lbs),
        0x25 => return Some(Opcode::Lhz),
        0x26 => return Some(Opcode::Lhs),
        0x33 => return Some(Opcode::Swa),
        0x34 => return Some(Opcode::Sd),
        0x35 => return Some(Opcode::Sw),
        0x36 => return Some(Opcode::Sb),
        0x37 => return Some(Opcode::Sh),

        // System interface
        0x09 => return Some(Opcode::Rfe),
        0x2d => return Some(Opcode::Mfspr),
        0x30 => return Some(Opcode::Mtspr),
        0x13 => return Some(Opcode::Maci),

        // Custom instruction slots
        0x1c => return Some(Opcode::Cust1),
        0x1d => return Some(Opcode::Cust2),
        0x1e => return Some(Opcode::Cust3),
        0x1f => return Some(Opcode::Cust4),
        0x3c => return Some(Opcode::Cust5),
        0x3d => return Some(Opcode::Cust6),
        0x3e => return Some(Opcode::Cust7),
        0x3f => return Some(Opcode::Cust8),
        _ => {}
    }

    // No operation (8-bit opcode)
    if field(word, 31, 24) == 0x15 {
        return Some(Opcode::Nop);
    }

    // Comparisons (11-bit opcode)
    match field(word, 31, 21) {
        0x5e0 => return Some(Opcode::Sfeqi),
        0x5e1 => return Some(Opcode::Sfnei),
        0x5e2 => return Some(Opcode::Sfgtui),
        0x5e3 => return Some(Opcode::Sfgeui),
        0x5e4 => return Some(Opcode::Sfltui),
        0x5e5 => return Some(Opcode::Sfleui),
        0x5ea => return Some(Opcode::Sfgtsi),
        0x5eb => return Some(Opcode::Sfgesi),
        0x5ec => return Some(Opcode::Sfltsi),
        0x5ed => return Some(Opcode::Sflesi),
        0x720 => return Some(Opcode::Sfeq),
        0x721 => return Some(Opcode::Sfne),
        0x722 => return Some(Opcode::Sfgtu),
        0x723 => return Some(Opcode::Sfgeu),
        0x724 => return Some(Opcode::Sfltu),
        0x725 => return Some(Opcode::Sfleu),
        0x72a => return Some(Opcode::Sfgts),
        0x72b => return Some(Opcode::Sfges),
        0x72c => return Some(Opcode::Sflts),
        0x72d => return Some(Opcode::Sfles),
        _ => {}
    }

    // System interface (16-bit opcode)
    match field(word, 31, 16) {
        0x2000 => return Some(Opcode::Sys),
        0x2100 => return Some(Opcode::Trap),
        _ => {}
    }

    // System interface (full-word opcode)
    match word {
        0x2200_0000 => Some(Opcode::Msync),
        0x2280_0000 => Some(Opcode::Psync),
        0x2300_0000 => Some(Opcode::Csync),
        _ => None,
    }
}

// The register-register ALU family dispatches on bits 9..8 and 3..0, with
// the shift/extend subfamily keyed on bits 9..6 instead.
fn classify_alu(word: u32) -> Option<Opcode> {
    let sub = field(word, 3, 0);
    match field(word, 9, 8) {
        0x0 => match sub {
            0x0 => return Some(Opcode::Add),
            0x1 => return Some(Opcode::Addc),
            0x2 => return Some(Opcode::Sub),
            0x3 => return Some(Opcode::And),
            0x4 => return Some(Opcode::Or),
            0x5 => return Some(Opcode::Xor),
            0xe => return Some(Opcode::Cmov),
            0xf => return Some(Opcode::Ff1),
            _ => {}
        },
        0x1 => match sub {
            0xf => return Some(Opcode::Fl1),
            _ => return None,
        },
        0x2 => return None,
        0x3 => {
            return match sub {
                0x6 => Some(Opcode::Mul),
                0x7 => Some(Opcode::Muld),
                0x9 => Some(Opcode::Div),
                0xa => Some(Opcode::Divu),
                0xb => Some(Opcode::Mulu),
                0xc => Some(Opcode::Muldu),
                _ => None,
            }
        }
        _ => unreachable!(),
    }

    match field(word, 9, 6) {
        0x0 => match sub {
            0x8 => Some(Opcode::Sll),
            0xc => Some(Opcode::Exths),
            0xd => Some(Opcode::Extws),
            _ => None,
        },
        0x1 => match sub {
            0x8 => Some(Opcode::Srl),
            0xc => Some(Opcode::Extbs),
            0xd => Some(Opcode::Extwz),
            _ => None,
        },
        0x2 => match sub {
            0x8 => Some(Opcode::Sra),
            0xc => Some(Opcode::Exthz),
            _ => None,
        },
        0x3 => match sub {
            0x8 => Some(Opcode::Ror),
            0xc => Some(Opcode::Extbz),
            _ => None,
        },
        _ => None,
    }
}

// l.movhi and l.macrc share primary opcode 0x06, split on bit 16.
fn classify_util(word: u32) -> Option<Opcode> {
    if field(word, 16, 0) == 0x10000 {
        return Some(Opcode::Macrc);
    }
    if field(word, 16, 16) == 0 {
        return Some(Opcode::Movhi);
    }
    None
}

// Shift/rotate with immediate, keyed on bits 7..6.
fn classify_shift_imm(word: u32) -> Option<Opcode> {
    match field(word, 7, 6) {
        0x0 => Some(Opcode::Slli),
        0x1 => Some(Opcode::Srli),
        0x2 => Some(Opcode::Srai),
        0x3 => Some(Opcode::Rori),
        _ => unreachable!(),
    }
}

// MAC unit family, keyed on bits 3..0.
fn classify_mac(word: u32) -> Option<Opcode> {
    match word & 0xf {
        0x1 => Some(Opcode::Mac),
        0x2 => Some(Opcode::Msb),
        0x3 => Some(Opcode::Macu),
        0x4 => Some(Opcode::Msbu),
        _ => None,
    }
}

// FPU family, keyed on the full low byte.
fn classify_fpx(word: u32) -> Option<Opcode> {
    match word & 0xff {
        0x00 => Some(Opcode::AddS),
        0x01 => Some(Opcode::SubS),
        0x02 => Some(Opcode::MulS),
        0x03 => Some(Opcode::DivS),
        0x04 => Some(Opcode::ItofS),
        0x05 => Some(Opcode::FtoiS),
        0x06 => Some(Opcode::RemS),
        0x07 => Some(Opcode::MaddS),
        0x08 => Some(Opcode::SfeqS),
        0x09 => Some(Opcode::SfneS),
        0x0a => Some(Opcode::SfgtS),
        0x0b => Some(Opcode::SfgeS),
        0x0c => Some(Opcode::SfltS),
        0x0d => Some(Opcode::SfleS),
        0x10 => Some(Opcode::AddD),
        0x11 => Some(Opcode::SubD),
        0x12 => Some(Opcode::MulD),
        0x13 => Some(Opcode::DivD),
        0x14 => Some(Opcode::ItofD),
        0x15 => Some(Opcode::FtoiD),
        0x16 => Some(Opcode::RemD),
        0x17 => Some(Opcode::MaddD),
        0x18 => Some(Opcode::SfeqD),
        0x19 => Some(Opcode::SfneD),
        0x1a => Some(Opcode::SfgtD),
        0x1b => Some(Opcode::SfgeD),
        0x1c => Some(Opcode::SfltD),
        0x1d => Some(Opcode::SfleD),
        other => match other >> 4 {
            0xd => Some(Opcode::Cust1S),
            0xe => Some(Opcode::Cust1D),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_opcodes() {
        // l.j 0
        assert_eq!(Some(Opcode::J), classify(0x0000_0000));
        // l.jal 0
        assert_eq!(Some(Opcode::Jal), classify(0x0400_0000));
        // l.addi r3, r0, 5
        assert_eq!(Some(Opcode::Addi), classify(0x9c60_0005));
        // l.lwz r3, 0(r4)
        assert_eq!(Some(Opcode::Lwz), classify(0x8464_0000));
        // l.sw 0(r3), r4
        assert_eq!(Some(Opcode::Sw), classify(0xd403_2000));
        // l.mfspr r3, r0, 17
        assert_eq!(Some(Opcode::Mfspr), classify(0xb460_0011));
        // l.rfe
        assert_eq!(Some(Opcode::Rfe), classify(0x2400_0000));
    }

    #[test]
    fn test_alu_family() {
        // l.add r5, r3, r4
        assert_eq!(Some(Opcode::Add), classify(0xe0a3_2000));
        // l.sub r5, r3, r4
        assert_eq!(Some(Opcode::Sub), classify(0xe0a3_2002));
        // l.sll r5, r3, r4
        assert_eq!(Some(Opcode::Sll), classify(0xe0a3_2008));
        // l.sra r5, r3, r4
        assert_eq!(Some(Opcode::Sra), classify(0xe0a3_2088));
        // l.extbs r5, r3
        assert_eq!(Some(Opcode::Extbs), classify(0xe0a3_004c));
        // l.extbz r5, r3
        assert_eq!(Some(Opcode::Extbz), classify(0xe0a3_00cc));
        // l.mul r5, r3, r4
        assert_eq!(Some(Opcode::Mul), classify(0xe0a3_2306));
        // l.div r5, r3, r4
        assert_eq!(Some(Opcode::Div), classify(0xe0a3_2309));
    }

    #[test]
    fn test_wide_opcodes() {
        // l.nop 0 / l.nop 1
        assert_eq!(Some(Opcode::Nop), classify(0x1500_0000));
        assert_eq!(Some(Opcode::Nop), classify(0x1500_0001));
        // l.sfeq r3, r4
        assert_eq!(Some(Opcode::Sfeq), classify(0xe403_2000));
        // l.sfeqi r3, 1
        assert_eq!(Some(Opcode::Sfeqi), classify(0xbc03_0001));
        // l.sys 1 / l.trap 0
        assert_eq!(Some(Opcode::Sys), classify(0x2000_0001));
        assert_eq!(Some(Opcode::Trap), classify(0x2100_0000));
        // sync family
        assert_eq!(Some(Opcode::Msync), classify(0x2200_0000));
        assert_eq!(Some(Opcode::Psync), classify(0x2280_0000));
        assert_eq!(Some(Opcode::Csync), classify(0x2300_0000));
    }

    #[test]
    fn test_movhi_macrc() {
        // l.movhi r3, 0xffff
        assert_eq!(Some(Opcode::Movhi), classify(0x1860_ffff));
        // l.macrc r3
        assert_eq!(Some(Opcode::Macrc), classify(0x1861_0000));
    }

    #[test]
    fn test_fpx_family() {
        // lf.add.s r5, r3, r4
        assert_eq!(Some(Opcode::AddS), classify(0xc8a3_2000));
        // lf.ftoi.s r5, r3
        assert_eq!(Some(Opcode::FtoiS), classify(0xc8a3_0005));
        // lf.add.d r6, r2, r4
        assert_eq!(Some(Opcode::AddD), classify(0xc8c2_2010));
        // lf.sfle.d
        assert_eq!(Some(Opcode::SfleD), classify(0xc802_201d));
    }

    #[test]
    fn test_invalid_patterns() {
        assert_eq!(None, classify(0x2280_0001));
        assert_eq!(None, classify(0xe0a3_23ff));
        assert_eq!(None, classify(0x1400_0000));
        assert_eq!(None, classify(0xc8a3_00ff));
    }
}
