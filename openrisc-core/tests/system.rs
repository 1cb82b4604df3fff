//! System-level behavior: MMU translation, timer and interrupt delivery,
//! privilege checks, doze, and the debugger access path.

mod common;

use common::*;
use openrisc_core::registers::Specifier;
use openrisc_core::tick::TM_IE;
use openrisc_core::{mmu, spr, Config, StepResult, RESET_VECTOR};

fn reg(n: u8) -> Specifier {
    Specifier::from_u5(n)
}

// Installs a DTLB way-0 entry for the page of `virt` via the SPR space.
fn install_dtlb(core: &mut Core, virt: u32, phys: u32, flags: u32) {
    let set = (virt >> mmu::PAGE_BITS) & 0x7f;
    core.write_spr(spr::DTLBW0MR + set, mmu::page_align(virt) | mmu::mr::V, true);
    core.write_spr(
        spr::DTLBW0MR + 0x80 + set,
        mmu::page_align(phys) | flags,
        true,
    );
}

type Core = openrisc_core::Core<openrisc_core::memory::Memory>;

#[test]
fn test_dmmu_translates_loads() {
    // Property 8: a mapped access lands at (ppn * PAGE_SIZE) | offset.
    let virt = 0x0040_2000u32;
    let phys = 0x0000_4000u32;
    let mut core = core_with(&[
        // Enable the data MMU.
        l_mfspr(10, 0, spr::SR),
        l_ori(10, 10, 1 << 5),
        l_mtspr(0, 10, spr::SR),
        // r4 = virt
        l_movhi(4, virt >> 16),
        l_ori(4, 4, virt & 0xffff),
        l_lwz(3, 0x84, 4),
        l_nop(1),
    ]);
    install_dtlb(&mut core, virt, phys, mmu::access::SRE);
    poke_word(&mut core, phys + 0x84, 0xdead_beef);

    assert_eq!(StepResult::Exit, core.run(1000));
    assert_eq!(0xdead_beef, core.gpr(reg(3)));
}

#[test]
fn test_dmmu_write_protection_faults() {
    let virt = 0x0040_2000u32;
    let mut core = core_with(&[
        l_mfspr(10, 0, spr::SR),
        l_ori(10, 10, 1 << 5),
        l_mtspr(0, 10, spr::SR),
        l_movhi(4, virt >> 16),
        l_ori(4, 4, virt & 0xffff),
        l_addi(5, 0, 1),
        l_sw(0, 4, 5),
        l_nop(0),
    ]);
    // Read-only mapping.
    install_dtlb(&mut core, virt, 0x4000, mmu::access::SRE);

    core.step(7);
    assert_eq!(0x300, core.npc());
    assert_eq!(virt, core.read_spr(spr::EEAR, true));
    // The MMUs are disabled on exception entry, the saved SR keeps them.
    assert!(!core.status().dme());
    assert_ne!(0, core.read_spr(spr::ESR, true) & (1 << 5));
}

#[test]
fn test_dmmu_miss_without_mapping() {
    let mut core = core_with(&[
        l_mfspr(10, 0, spr::SR),
        l_ori(10, 10, 1 << 5),
        l_mtspr(0, 10, spr::SR),
        l_movhi(4, 0x0040),
        l_lwz(3, 0, 4),
        l_nop(0),
    ]);
    core.step(5);
    assert_eq!(0x900, core.npc());
    assert_eq!(0x0040_0000, core.read_spr(spr::EEAR, true));
}

#[test]
fn test_itlb_miss_on_fetch() {
    let mut core = core_with(&[
        l_mfspr(10, 0, spr::SR),
        l_ori(10, 10, 1 << 6),
        l_mtspr(0, 10, spr::SR),
        l_nop(0),
    ]);
    core.step(4);
    // The fetch after the SR write misses (no ITLB entries, no page
    // directory) and takes the instruction-TLB-miss vector; exception
    // entry clears IME so the vector itself fetches untranslated.
    assert_eq!(0xa00, core.npc());
    assert!(!core.status().ime());
    assert_ne!(0, core.read_spr(spr::ESR, true) & (1 << 6));
}

#[test]
fn test_tick_timer_exception_delivery() {
    // E6: restart mode, limit 100, IE and TEE set. The handler observes
    // the latched interrupt-pending bit and the restarted count.
    let handler = 0x500;
    let mut core = core_with(&[
        // TTMR = restart | IE | limit 100
        l_movhi(4, (1 << 14) | (TM_IE >> 16)),
        l_ori(4, 4, 100),
        l_mtspr(0, 4, spr::TTMR),
        // SR |= TEE
        l_mfspr(10, 0, spr::SR),
        l_ori(10, 10, 1 << 1),
        l_mtspr(0, 10, spr::SR),
        // Spin.
        l_j(0),
        l_nop(0),
    ]);
    poke_word(&mut core, handler, l_mfspr(7, 0, spr::TTCR));
    poke_word(&mut core, handler + 4, l_mfspr(8, 0, spr::TTMR));
    poke_word(&mut core, handler + 8, l_nop(1));

    assert_eq!(StepResult::Exit, core.run(10_000));
    // The count restarted at the crossing and kept advancing below the
    // limit.
    assert!(core.gpr(reg(7)) < 100);
    // IP is latched until software clears it.
    assert_ne!(0, core.gpr(reg(8)) & (1 << 28));
    // The interrupted PC is inside the spin loop.
    let epcr = core.read_spr(spr::EPCR, true);
    assert!(epcr >= RESET_VECTOR && epcr < RESET_VECTOR + 8 * 4);
}

#[test]
fn test_external_interrupt_via_pic() {
    let handler = 0x800;
    let mut core = core_with(&[l_j(0), l_nop(0)]);
    poke_word(&mut core, handler, l_addi(3, 0, 9));
    poke_word(&mut core, handler + 4, l_nop(1));

    // Unmask line 4 and enable external exceptions.
    core.write_spr(spr::PICMR, 1 << 4, true);
    let sr = core.read_spr(spr::SR, true) | (1 << 2);
    core.write_spr(spr::SR, sr, true);

    // Nothing pending yet: the spin loop just burns the quantum.
    assert_eq!(StepResult::Ok, core.advance(100));

    core.interrupt(4, true);
    assert_eq!(StepResult::Exit, core.run(10_000));
    assert_eq!(9, core.exit_code());
}

#[test]
fn test_masked_interrupt_is_ignored() {
    let mut core = core_with(&[l_j(0), l_nop(0)]);
    let sr = core.read_spr(spr::SR, true) | (1 << 2);
    core.write_spr(spr::SR, sr, true);

    core.interrupt(4, true);
    // Line 4 is masked (only the NMI lines are forced on), so the loop
    // keeps spinning.
    assert_eq!(StepResult::Ok, core.advance(100));
}

#[test]
fn test_user_mode_spr_access_denied() {
    let mut core = core_with(&[l_nop(0)]);
    // Drop to user mode, keeping FO.
    core.write_spr(spr::SR, 1 << 15, true);
    assert!(!core.status().sm());
    // A non-debug read of a supervisor register returns 0.
    assert_eq!(0, core.read_spr(spr::VR, false));
    // The debug path is unrestricted.
    assert_ne!(0, core.read_spr(spr::VR, true));
}

#[test]
fn test_sumra_grants_user_reads() {
    let mut core = core_with(&[l_nop(0)]);
    core.write_spr(spr::SR, (1 << 15) | (1 << 16), true);
    assert!(!core.status().sm());
    assert_ne!(0, core.read_spr(spr::VR, false));
}

#[test]
fn test_npc_write_redirects_execution() {
    let mut core = core_with(&[l_nop(0)]);
    poke_word(&mut core, 0x4000, l_addi(3, 0, 77));
    poke_word(&mut core, 0x4004, l_nop(1));
    core.write_spr(spr::NPC, 0x4000, true);
    assert_eq!(StepResult::Exit, core.run(1000));
    assert_eq!(77, core.gpr(reg(3)));
}

#[test]
fn test_doze_skips_idle_cycles() {
    let mut core = core_with(&[
        // TTMR = restart | IE | limit 50
        l_movhi(4, (1 << 14) | (TM_IE >> 16)),
        l_ori(4, 4, 50),
        l_mtspr(0, 4, spr::TTMR),
        l_mfspr(10, 0, spr::SR),
        l_ori(10, 10, 1 << 1),
        l_mtspr(0, 10, spr::SR),
        // PMR = doze; execution stalls here until the tick fires.
        l_addi(5, 0, 1 << 4),
        l_mtspr(0, 5, spr::PMR),
        l_j(0),
        l_nop(0),
    ]);
    poke_word(&mut core, 0x500, l_nop(1));

    assert_eq!(StepResult::Exit, core.run(10_000));
    assert!(core.counters().sleep_cycles() > 0);
    // Doze was left on exception entry.
    assert_eq!(0, core.read_spr(spr::PMR, true) & (1 << 4));
}

#[test]
fn test_debug_access_honours_dmmu() {
    let virt = 0x0040_2000u32;
    let phys = 0x0000_6000u32;
    let mut core = core_with(&[l_nop(0)]);
    install_dtlb(&mut core, virt, phys, mmu::access::SRE);
    poke_word(&mut core, phys, 0x0102_0304);

    // Translation disabled: the address is physical.
    let mut buf = [0u8; 4];
    core.debug_read(phys, &mut buf).unwrap();
    assert_eq!([1, 2, 3, 4], buf);

    // With the DMMU on, the same bytes appear at the virtual address.
    let sr = core.read_spr(spr::SR, true) | (1 << 5);
    core.write_spr(spr::SR, sr, true);
    core.debug_read(virt, &mut buf).unwrap();
    assert_eq!([1, 2, 3, 4], buf);

    // Unmapped virtual addresses report a translation failure.
    assert!(core.debug_read(0x0080_0000, &mut buf).is_err());
}

#[test]
fn test_debug_write_round_trip() {
    let mut core = core_with(&[l_nop(0)]);
    let payload = [0xde, 0xad, 0xbe, 0xef, 0x55];
    core.debug_write(0x3000, &payload).unwrap();
    let mut buf = [0u8; 5];
    core.debug_read(0x3000, &mut buf).unwrap();
    assert_eq!(payload, buf);
}

#[test]
fn test_tlb_registers_visible_through_sprs() {
    let mut core = core_with(&[l_nop(0)]);
    install_dtlb(&mut core, 0x0040_2000, 0x4000, mmu::access::SRE);
    let set = (0x0040_2000u32 >> mmu::PAGE_BITS) & 0x7f;
    let match_reg = core.read_spr(spr::DTLBW0MR + set, true);
    assert_eq!(0x0040_2000 | mmu::mr::V, match_reg);
    let translate_reg = core.read_spr(spr::DTLBW0MR + 0x80 + set, true);
    assert_eq!(0x4000 | mmu::access::SRE, translate_reg);
}

#[test]
fn test_decode_cache_disabled_by_config() {
    let config = Config {
        decode_cache: openrisc_core::insn::DecodeCacheSize::Disabled,
        ..Config::default()
    };
    let mut core = core_with_config(
        &[l_addi(3, 0, 1), l_addi(4, 0, 2), l_nop(1)],
        config,
    );
    assert_eq!(StepResult::Exit, core.run(1000));
    // Every instruction recompiles.
    assert_eq!(core.counters().instructions() + 1, core.counters().compiles());
}
