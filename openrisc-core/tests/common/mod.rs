//! Shared helpers: a tiny instruction encoder and a core loaded with a
//! program at the reset vector.
#![allow(dead_code)]

use openrisc_core::memory::Memory;
use openrisc_core::{Config, Core, RESET_VECTOR};

pub const MEM_SIZE: usize = 0x10_0000;

/// Builds a core whose memory holds `program` starting at the reset
/// vector.
pub fn core_with(program: &[u32]) -> Core<Memory> {
    core_with_config(program, Config::default())
}

pub fn core_with_config(program: &[u32], config: Config) -> Core<Memory> {
    let mut memory = Memory::new(MEM_SIZE);
    let mut image = Vec::with_capacity(program.len() * 4);
    for word in program {
        image.extend_from_slice(&word.to_be_bytes());
    }
    memory.load(RESET_VECTOR, &image);
    Core::new(memory, config)
}

/// Stores one big-endian word directly into the core's memory.
pub fn poke_word(core: &mut Core<Memory>, addr: u32, value: u32) {
    core.port_mut()
        .bus_mut()
        .load(addr, &value.to_be_bytes());
}

pub fn poke_half(core: &mut Core<Memory>, addr: u32, value: u16) {
    core.port_mut()
        .bus_mut()
        .load(addr, &value.to_be_bytes());
}

pub fn peek_word(core: &Core<Memory>, addr: u32) -> u32 {
    let data = core.port().bus().data();
    let addr = addr as usize;
    u32::from_be_bytes(data[addr..addr + 4].try_into().unwrap())
}

// Encoders for the instructions the tests assemble. Operand layout is the
// standard D = 25..21, A = 20..16, B = 15..11.

fn rrr(primary: u32, d: u32, a: u32, b: u32, low: u32) -> u32 {
    (primary << 26) | (d << 21) | (a << 16) | (b << 11) | low
}

fn rri(primary: u32, d: u32, a: u32, imm: u32) -> u32 {
    (primary << 26) | (d << 21) | (a << 16) | (imm & 0xffff)
}

pub fn l_nop(code: u32) -> u32 {
    (0x15 << 24) | (code & 0xffff)
}

pub fn l_addi(d: u32, a: u32, imm: i32) -> u32 {
    rri(0x27, d, a, imm as u32)
}

pub fn l_andi(d: u32, a: u32, imm: u32) -> u32 {
    rri(0x29, d, a, imm)
}

pub fn l_ori(d: u32, a: u32, imm: u32) -> u32 {
    rri(0x2a, d, a, imm)
}

pub fn l_movhi(d: u32, imm: u32) -> u32 {
    (0x06 << 26) | (d << 21) | (imm & 0xffff)
}

pub fn l_add(d: u32, a: u32, b: u32) -> u32 {
    rrr(0x38, d, a, b, 0x0)
}

pub fn l_sub(d: u32, a: u32, b: u32) -> u32 {
    rrr(0x38, d, a, b, 0x2)
}

pub fn l_div(d: u32, a: u32, b: u32) -> u32 {
    rrr(0x38, d, a, b, 0x309)
}

pub fn l_extbs(d: u32, a: u32) -> u32 {
    rrr(0x38, d, a, 0, 0x4c)
}

pub fn l_extbz(d: u32, a: u32) -> u32 {
    rrr(0x38, d, a, 0, 0xcc)
}

pub fn l_sra(d: u32, a: u32, b: u32) -> u32 {
    rrr(0x38, d, a, b, 0x88)
}

pub fn l_lwz(d: u32, offset: i32, a: u32) -> u32 {
    rri(0x21, d, a, offset as u32)
}

pub fn l_lhz(d: u32, offset: i32, a: u32) -> u32 {
    rri(0x25, d, a, offset as u32)
}

pub fn l_lhs(d: u32, offset: i32, a: u32) -> u32 {
    rri(0x26, d, a, offset as u32)
}

pub fn l_lwa(d: u32, offset: i32, a: u32) -> u32 {
    rri(0x1b, d, a, offset as u32)
}

fn store(primary: u32, offset: i32, a: u32, b: u32) -> u32 {
    let imm = offset as u32;
    (primary << 26) | (((imm >> 11) & 0x1f) << 21) | (a << 16) | (b << 11) | (imm & 0x7ff)
}

pub fn l_sw(offset: i32, a: u32, b: u32) -> u32 {
    store(0x35, offset, a, b)
}

pub fn l_swa(offset: i32, a: u32, b: u32) -> u32 {
    store(0x33, offset, a, b)
}

pub fn l_sfeq(a: u32, b: u32) -> u32 {
    (0x720 << 21) | (a << 16) | (b << 11)
}

pub fn l_sfgts(a: u32, b: u32) -> u32 {
    (0x72a << 21) | (a << 16) | (b << 11)
}

pub fn l_bf(displacement_insns: i32) -> u32 {
    (0x04 << 26) | ((displacement_insns as u32) & 0x03ff_ffff)
}

pub fn l_bnf(displacement_insns: i32) -> u32 {
    (0x03 << 26) | ((displacement_insns as u32) & 0x03ff_ffff)
}

pub fn l_j(displacement_insns: i32) -> u32 {
    (displacement_insns as u32) & 0x03ff_ffff
}

pub fn l_jal(displacement_insns: i32) -> u32 {
    (0x01 << 26) | ((displacement_insns as u32) & 0x03ff_ffff)
}

pub fn l_jr(b: u32) -> u32 {
    (0x11 << 26) | (b << 11)
}

pub fn l_mfspr(d: u32, a: u32, spr: u32) -> u32 {
    rri(0x2d, d, a, spr)
}

pub fn l_mtspr(a: u32, b: u32, spr: u32) -> u32 {
    (0x30 << 26) | (((spr >> 11) & 0x1f) << 21) | (a << 16) | (b << 11) | (spr & 0x7ff)
}

pub fn l_rfe() -> u32 {
    0x09 << 26
}

pub fn l_sys(code: u32) -> u32 {
    (0x2000 << 16) | (code & 0xffff)
}
