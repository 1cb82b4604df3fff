//! ELF loading through the core's debug-write transaction path.

use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use log::debug;
use openrisc_core::memory::Memory;
use openrisc_core::Core;

use crate::CliError;

/// Parses `image` and copies every PT_LOAD segment into guest memory at
/// its physical address.
pub fn load(core: &mut Core<Memory>, image: &[u8]) -> Result<(), CliError> {
    let elf = Elf::parse(image)?;

    let segments = elf
        .program_headers
        .iter()
        .filter(|h| h.p_type == PT_LOAD && h.p_filesz > 0);

    for header in segments {
        debug!(
            "loading segment: file range [{:#010x}..{:#010x}] to physical [{:#010x}..{:#010x}] (virt {:#010x})",
            header.p_offset,
            header.p_offset + header.p_filesz,
            header.p_paddr,
            header.p_paddr + header.p_memsz,
            header.p_vaddr,
        );
        let data = &image[header.file_range()];
        core.debug_write(header.p_paddr as u32, data)?;
    }

    Ok(())
}
