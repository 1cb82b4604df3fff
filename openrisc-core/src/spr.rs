//! Special-purpose register numbering and the access-rights matrix.
//!
//! SPRs are addressed by a 16-bit number: an 11-bit group field in the
//! upper bits and a register number within the group. Every access is
//! checked against the matrix in [`access`]; unprivileged accesses warn
//! and read as zero.

/// Width of the per-group register number field.
pub const GROUP_SHIFT: u32 = 11;

/// Number of shadow GPR words mapped into the system group.
pub const SHADOW_REGS: u32 = 512;

/// SPR group bases.
pub mod group {
    use super::GROUP_SHIFT;

    pub const SYS: u32 = 0 << GROUP_SHIFT;
    pub const DMMU: u32 = 1 << GROUP_SHIFT;
    pub const IMMU: u32 = 2 << GROUP_SHIFT;
    pub const DCACHE: u32 = 3 << GROUP_SHIFT;
    pub const ICACHE: u32 = 4 << GROUP_SHIFT;
    pub const MAC: u32 = 5 << GROUP_SHIFT;
    pub const DEBUG: u32 = 6 << GROUP_SHIFT;
    pub const PERF: u32 = 7 << GROUP_SHIFT;
    pub const POWER: u32 = 8 << GROUP_SHIFT;
    pub const PIC: u32 = 9 << GROUP_SHIFT;
    pub const TICK: u32 = 10 << GROUP_SHIFT;
    pub const FPU: u32 = 11 << GROUP_SHIFT;
}

// System control and status
pub const VR: u32 = group::SYS;
pub const UPR: u32 = group::SYS + 1;
pub const CPUCFGR: u32 = group::SYS + 2;
pub const DMMUCFGR: u32 = group::SYS + 3;
pub const IMMUCFGR: u32 = group::SYS + 4;
pub const DCCFGR: u32 = group::SYS + 5;
pub const ICCFGR: u32 = group::SYS + 6;
pub const DCFGR: u32 = group::SYS + 7;
pub const PCCFGR: u32 = group::SYS + 8;
pub const VR2: u32 = group::SYS + 9;
pub const AVR: u32 = group::SYS + 10;
pub const EVBAR: u32 = group::SYS + 11;
pub const AECR: u32 = group::SYS + 12;
pub const AESR: u32 = group::SYS + 13;
pub const NPC: u32 = group::SYS + 16;
pub const SR: u32 = group::SYS + 17;
pub const PPC: u32 = group::SYS + 18;
pub const FPCSR: u32 = group::SYS + 20;
pub const EPCR: u32 = group::SYS + 32;
pub const EEAR: u32 = group::SYS + 48;
pub const ESR: u32 = group::SYS + 64;
pub const COREID: u32 = group::SYS + 128;
pub const NUMCORES: u32 = group::SYS + 129;
pub const GPR: u32 = group::SYS + 1024;

// Data MMU
pub const DMMUCR: u32 = group::DMMU;
pub const DMMUPR: u32 = group::DMMU + 1;
pub const DTLBEIR: u32 = group::DMMU + 2;
pub const DATBMR: u32 = group::DMMU + 4;
pub const DATBTR: u32 = group::DMMU + 8;
pub const DTLBW0MR: u32 = group::DMMU + 512;
pub const DTLBW3TR: u32 = group::DMMU + 1408;

// Instruction MMU
pub const IMMUCR: u32 = group::IMMU;
pub const IMMUPR: u32 = group::IMMU + 1;
pub const ITLBEIR: u32 = group::IMMU + 2;
pub const IATBMR: u32 = group::IMMU + 4;
pub const IATBTR: u32 = group::IMMU + 8;
pub const ITLBW0MR: u32 = group::IMMU + 512;
pub const ITLBW3TR: u32 = group::IMMU + 1408;

// Data cache
pub const DCCR: u32 = group::DCACHE;
pub const DCBPR: u32 = group::DCACHE + 1;
pub const DCBFR: u32 = group::DCACHE + 2;
pub const DCBIR: u32 = group::DCACHE + 3;
pub const DCBWR: u32 = group::DCACHE + 4;
pub const DCBLR: u32 = group::DCACHE + 5;

// Instruction cache
pub const ICCR: u32 = group::ICACHE;
pub const ICBPR: u32 = group::ICACHE + 1;
pub const ICBIR: u32 = group::ICACHE + 2;
pub const ICBLR: u32 = group::ICACHE + 3;

// MAC unit
pub const MACLO: u32 = group::MAC + 1;
pub const MACHI: u32 = group::MAC + 2;

// Power management
pub const PMR: u32 = group::POWER;

// Programmable interrupt controller
pub const PICMR: u32 = group::PIC;
pub const PICSR: u32 = group::PIC + 2;

// Tick timer
pub const TTMR: u32 = group::TICK;
pub const TTCR: u32 = group::TICK + 1;

/// Group field of an SPR number.
pub fn group(spr: u32) -> u32 {
    spr >> GROUP_SHIFT
}

/// Register number within its group.
pub fn regno(spr: u32) -> u32 {
    spr & ((1 << GROUP_SHIFT) - 1)
}

/// Access-rights bits for one SPR.
pub mod access {
    /// Supervisor-mode read enable
    pub const SRE: u8 = 1 << 0;
    /// Supervisor-mode write enable
    pub const SWE: u8 = 1 << 1;
    /// User-mode read enable
    pub const URE: u8 = 1 << 2;
    /// User-mode write enable
    pub const UWE: u8 = 1 << 3;
}

/// The access-rights matrix. Registers the simulator does not model at
/// all grant full access; reads and writes to them warn and are dropped
/// by the dispatch layer instead.
pub fn access(spr: u32) -> u8 {
    use access::*;
    match spr {
        // System group
        VR | UPR | CPUCFGR | DMMUCFGR | IMMUCFGR | DCCFGR | ICCFGR | DCFGR | PCCFGR | VR2
        | AVR | COREID | NUMCORES => SRE,
        EVBAR | AECR | AESR | NPC | SR | PPC | FPCSR | EPCR | EEAR | ESR => SRE | SWE,

        // MMU groups
        DMMUCR | DMMUPR | IMMUCR | IMMUPR => SRE | SWE,
        DTLBEIR | ITLBEIR => SWE,

        // Cache groups
        DCCR | ICCR => SRE | SWE,
        DCBPR | DCBFR | DCBWR | DCBLR | ICBPR | ICBLR => SWE | UWE,
        DCBIR | ICBIR => SWE,

        // MAC, power management, PIC, tick timer
        MACLO | MACHI | PMR | PICMR | PICSR | TTMR | TTCR => SRE | SWE,

        _ => {
            if (GPR..GPR + SHADOW_REGS).contains(&spr)
                || (DATBMR..DATBTR + 4).contains(&spr)
                || (DTLBW0MR..DTLBW3TR + 128).contains(&spr)
                || (IATBMR..IATBTR + 4).contains(&spr)
                || (ITLBW0MR..ITLBW3TR + 128).contains(&spr)
            {
                SRE | SWE
            } else {
                SRE | SWE | URE | UWE
            }
        }
    }
}

/// Checks whether an SPR access is permitted for the given direction and
/// privilege.
pub fn check_access(spr: u32, is_write: bool, is_super: bool) -> bool {
    use access::*;
    let rights = access(spr);
    let needed = match (is_super, is_write) {
        (true, true) => SWE,
        (true, false) => SRE,
        (false, true) => UWE,
        (false, false) => URE,
    };
    rights & needed != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering() {
        assert_eq!(0x11, SR);
        assert_eq!(0x10, NPC);
        assert_eq!(0x12, PPC);
        assert_eq!(2 << 11, IMMUCR);
        assert_eq!((10 << 11) + 1, TTCR);
        assert_eq!(10, group(TTMR));
        assert_eq!(2, regno(PICSR));
    }

    #[test]
    fn test_access_matrix() {
        // Version register is supervisor read-only.
        assert!(check_access(VR, false, true));
        assert!(!check_access(VR, true, true));
        assert!(!check_access(VR, false, false));
        // SR is supervisor read/write, never user accessible.
        assert!(check_access(SR, true, true));
        assert!(!check_access(SR, true, false));
        // TLB invalidate registers are write-only.
        assert!(check_access(DTLBEIR, true, true));
        assert!(!check_access(DTLBEIR, false, true));
        // TLB register files are supervisor read/write.
        assert!(check_access(DTLBW0MR + 5, true, true));
        assert!(check_access(ITLBW0MR + 130, false, true));
        assert!(!check_access(ITLBW0MR, false, false));
    }
}
