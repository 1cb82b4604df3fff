//! Special-purpose register read/write dispatch.

use log::warn;

use crate::bus::Bus;
use crate::core::Core;
use crate::spr;

impl<B: Bus> Core<B> {
    /// Reads an SPR. Non-debug accesses are checked against the access
    /// matrix; an unprivileged access warns and reads as zero. SUMRA
    /// grants user-mode read access to the whole SPR space.
    pub fn read_spr(&mut self, reg: u32, debug: bool) -> u32 {
        let is_super = self.status.sm() || self.status.sumra();
        if !debug && !spr::check_access(reg, false, is_super) {
            self.warn_guest(format_args!("illegal attempt to read SPR {reg}"));
            return 0;
        }

        match reg {
            // System group
            spr::VR => return super::VERSION,
            spr::VR2 => return super::VERSION2,
            spr::AVR => return super::ARCH_VERSION,
            spr::UPR => return self.unit,
            spr::CPUCFGR => return self.cpucfg,
            spr::DCCFGR => return self.dccfg,
            spr::ICCFGR => return self.iccfg,
            spr::DMMUCFGR => return self.dmmu.configuration(),
            spr::IMMUCFGR => return self.immu.configuration(),
            spr::AECR => return self.aecr,
            spr::AESR => return self.aesr,
            spr::SR => return self.status.bits(),
            spr::NPC => return self.next_pc,
            spr::PPC => return self.prev_pc,
            spr::FPCSR => return self.fpcsr,
            spr::EPCR => return self.expc,
            spr::EEAR => return self.exea,
            spr::ESR => return self.exsr,
            spr::EVBAR => return self.evbar,
            spr::COREID => return self.config.core_id,
            spr::NUMCORES => return self.config.num_cores,

            // DMMU group
            spr::DMMUCR => return self.dmmu.control(),
            spr::DMMUPR => return self.dmmu.protection(),
            spr::DTLBEIR => {
                self.warn_guest(format_args!("attempt to read register DTLBEIR"));
                return 0;
            }

            // IMMU group
            spr::IMMUCR => return self.immu.control(),
            spr::IMMUPR => return self.immu.protection(),
            spr::ITLBEIR => {
                self.warn_guest(format_args!("attempt to read register ITLBEIR"));
                return 0;
            }

            // Cache groups (no caches are modelled)
            spr::DCBPR | spr::DCBFR | spr::ICBPR | spr::ICBIR => return 0,

            // MAC group
            spr::MACHI => return (self.mac >> 32) as u32,
            spr::MACLO => return self.mac as u32,

            // Power management group
            spr::PMR => return self.pmr,

            // PIC group
            spr::PICMR => return self.pic.mask(),
            spr::PICSR => return self.pic.status(),

            // Tick timer group
            spr::TTMR => return self.tick.ttmr(),
            spr::TTCR => return self.tick.ttcr(),
            _ => {}
        }

        // Shadow GPR file
        if (spr::GPR..spr::GPR + spr::SHADOW_REGS).contains(&reg) {
            return self.shadow[(reg - spr::GPR) as usize];
        }

        // MMU ATB and TLB register files
        if (spr::DATBMR..spr::DATBTR + 4).contains(&reg) {
            return self.dmmu.atb_register(reg - spr::DATBMR);
        }
        if (spr::DTLBW0MR..spr::DTLBW3TR + 128).contains(&reg) {
            return self.dmmu.tlb_register(reg - spr::DTLBW0MR);
        }
        if (spr::IATBMR..spr::IATBTR + 4).contains(&reg) {
            return self.immu.atb_register(reg - spr::IATBMR);
        }
        if (spr::ITLBW0MR..spr::ITLBW3TR + 128).contains(&reg) {
            return self.immu.tlb_register(reg - spr::ITLBW0MR);
        }

        self.warn_guest(format_args!(
            "ignoring SPR read (g{}:r{}) @ {:#010x}",
            spr::group(reg),
            spr::regno(reg),
            self.next_pc
        ));
        0
    }

    /// Writes an SPR. Every successful write breaks the running quantum so
    /// the next fetch observes the new state.
    pub fn write_spr(&mut self, reg: u32, value: u32, debug: bool) {
        self.break_requested = true;

        if !debug && !spr::check_access(reg, true, self.status.sm()) {
            self.warn_guest(format_args!("illegal attempt to write SPR {reg}"));
            return;
        }

        match reg {
            // System group; the configuration registers are read-only.
            spr::VR | spr::VR2 | spr::AVR | spr::UPR | spr::CPUCFGR | spr::DCCFGR
            | spr::ICCFGR | spr::DMMUCFGR | spr::IMMUCFGR | spr::COREID | spr::NUMCORES => {
                self.warn_guest(format_args!("attempt to write read-only SPR {reg}"));
                return;
            }
            spr::NPC => {
                self.next_pc = value;
                return;
            }
            spr::PPC => {
                self.prev_pc = value;
                return;
            }
            spr::FPCSR => {
                self.fpcsr = value;
                return;
            }
            spr::EPCR => {
                self.expc = value;
                return;
            }
            spr::EEAR => {
                self.exea = value;
                return;
            }
            spr::ESR => {
                self.exsr = value;
                return;
            }
            spr::EVBAR => {
                self.evbar = value;
                return;
            }
            spr::AECR => {
                self.aecr = value;
                return;
            }
            spr::AESR => {
                self.aesr = value;
                return;
            }
            spr::SR => {
                self.status.set_bits(value);
                // The fetch fast path must not survive an IMMU toggle.
                self.invalidate_fetch_page();
                return;
            }

            // DMMU group
            spr::DMMUCR => {
                self.dmmu.set_control(value);
                return;
            }
            spr::DMMUPR => {
                self.dmmu.set_protection(value);
                return;
            }
            spr::DTLBEIR => {
                self.dmmu.flush_tlb_entry(value);
                return;
            }

            // IMMU group
            spr::IMMUCR => {
                self.immu.set_control(value);
                self.invalidate_fetch_page();
                return;
            }
            spr::IMMUPR => {
                self.immu.set_protection(value);
                return;
            }
            spr::ITLBEIR => {
                self.immu.flush_tlb_entry(value);
                self.invalidate_fetch_page();
                return;
            }

            // Cache groups: only the instruction-block invalidate has an
            // observable effect, on the decode cache.
            spr::DCBPR | spr::DCBFR | spr::ICBPR => return,
            spr::ICBIR => {
                self.decode_cache.invalidate_block(value, 32);
                return;
            }

            // MAC group
            spr::MACHI => {
                self.mac = (self.mac & 0xffff_ffff) | ((value as u64) << 32);
                return;
            }
            spr::MACLO => {
                self.mac = (self.mac & !0xffff_ffff) | value as u64;
                return;
            }

            // Power management group; the quantum break lets the engine
            // doze at the next instruction boundary.
            spr::PMR => {
                self.pmr = value;
                return;
            }

            // PIC group
            spr::PICMR => {
                self.pic.set_mask(value);
                return;
            }
            spr::PICSR => {
                self.pic.write_status(value);
                return;
            }

            // Tick timer group
            spr::TTMR => {
                self.tick.set_ttmr(value);
                return;
            }
            spr::TTCR => {
                self.tick.set_ttcr(value);
                return;
            }
            _ => {}
        }

        // Shadow GPR file
        if (spr::GPR..spr::GPR + spr::SHADOW_REGS).contains(&reg) {
            self.shadow[(reg - spr::GPR) as usize] = value;
            return;
        }

        // MMU ATB and TLB register files
        if (spr::DATBMR..spr::DATBTR + 4).contains(&reg) {
            return self.dmmu.set_atb_register(reg - spr::DATBMR, value);
        }
        if (spr::DTLBW0MR..spr::DTLBW3TR + 128).contains(&reg) {
            return self.dmmu.set_tlb_register(reg - spr::DTLBW0MR, value);
        }
        if (spr::IATBMR..spr::IATBTR + 4).contains(&reg) {
            return self.immu.set_atb_register(reg - spr::IATBMR, value);
        }
        if (spr::ITLBW0MR..spr::ITLBW3TR + 128).contains(&reg) {
            self.immu.set_tlb_register(reg - spr::ITLBW0MR, value);
            self.invalidate_fetch_page();
            return;
        }

        self.warn_guest(format_args!(
            "ignoring SPR write g{}:r{} = {:#010x} @ {:#010x}",
            spr::group(reg),
            spr::regno(reg),
            value,
            self.next_pc
        ));
    }

    pub(crate) fn invalidate_fetch_page(&mut self) {
        self.virt_ipg = !0;
        self.phys_ipg = !0;
    }

    pub(crate) fn warn_guest(&self, args: std::fmt::Arguments<'_>) {
        if self.config.warnings {
            warn!("{args}");
        }
    }
}
