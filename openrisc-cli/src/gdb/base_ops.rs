use gdbstub::target::ext::base::single_register_access::{
    SingleRegisterAccess, SingleRegisterAccessOps,
};
use gdbstub::target::ext::base::singlethread::{SingleThreadBase, SingleThreadResumeOps};
use gdbstub::target::{TargetError, TargetResult};

use crate::gdb::{GdbTarget, GdbTargetError, Or1kRegId, Or1kRegs};
use crate::sim::{Command, RegisterSnapshot};

impl GdbTarget {
    // Round-trips a register snapshot through the simulation thread.
    fn fetch_registers(&mut self) -> Result<RegisterSnapshot, TargetError<GdbTargetError>> {
        let (sender, receiver) = oneshot::channel();
        self.send_command(Command::ReadRegisters(sender))?;
        receiver
            .recv()
            .map_err(|_| TargetError::Fatal(GdbTargetError::NoAnswer))
    }
}

impl SingleThreadBase for GdbTarget {
    fn support_resume(&mut self) -> Option<SingleThreadResumeOps<'_, Self>> {
        Some(self)
    }

    fn read_registers(&mut self, regs: &mut Or1kRegs) -> TargetResult<(), Self> {
        let snapshot = self.fetch_registers()?;
        regs.gpr = snapshot.gpr;
        regs.ppc = snapshot.ppc;
        regs.npc = snapshot.npc;
        regs.sr = snapshot.sr;
        Ok(())
    }

    fn write_registers(&mut self, regs: &Or1kRegs) -> TargetResult<(), Self> {
        let snapshot = RegisterSnapshot {
            gpr: regs.gpr,
            ppc: regs.ppc,
            npc: regs.npc,
            sr: regs.sr,
        };
        self.send_command(Command::WriteRegisters(Box::new(snapshot)))
    }

    fn support_single_register_access(&mut self) -> Option<SingleRegisterAccessOps<'_, (), Self>> {
        Some(self)
    }

    fn read_addrs(&mut self, start_addr: u32, data: &mut [u8]) -> TargetResult<usize, Self> {
        let (sender, receiver) = oneshot::channel();
        self.send_command(Command::ReadMemory {
            addr: start_addr,
            len: data.len(),
            reply: sender,
        })?;
        let bytes = receiver
            .recv()
            .map_err(|_| TargetError::Fatal(GdbTargetError::NoAnswer))?
            .map_err(|_| TargetError::NonFatal)?;
        data[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn write_addrs(&mut self, start_addr: u32, data: &[u8]) -> TargetResult<(), Self> {
        let (sender, receiver) = oneshot::channel();
        self.send_command(Command::WriteMemory {
            addr: start_addr,
            data: data.to_owned(),
            reply: sender,
        })?;
        receiver
            .recv()
            .map_err(|_| TargetError::Fatal(GdbTargetError::NoAnswer))?
            .map_err(|_| TargetError::NonFatal)
    }
}

impl SingleRegisterAccess<()> for GdbTarget {
    fn read_register(
        &mut self,
        _tid: (),
        reg_id: Or1kRegId,
        buf: &mut [u8],
    ) -> TargetResult<usize, Self> {
        let snapshot = self.fetch_registers()?;
        let value = match reg_id {
            Or1kRegId::Gpr(n) => snapshot.gpr[n as usize],
            Or1kRegId::Ppc => snapshot.ppc,
            Or1kRegId::Npc => snapshot.npc,
            Or1kRegId::Sr => snapshot.sr,
        };
        buf[..4].copy_from_slice(&value.to_be_bytes());
        Ok(4)
    }

    fn write_register(
        &mut self,
        _tid: (),
        reg_id: Or1kRegId,
        val: &[u8],
    ) -> TargetResult<(), Self> {
        let bytes: [u8; 4] = val.try_into().map_err(|_| TargetError::NonFatal)?;
        let value = u32::from_be_bytes(bytes);
        let mut snapshot = self.fetch_registers()?;
        match reg_id {
            Or1kRegId::Gpr(n) => snapshot.gpr[n as usize] = value,
            Or1kRegId::Ppc => snapshot.ppc = value,
            Or1kRegId::Npc => snapshot.npc = value,
            Or1kRegId::Sr => snapshot.sr = value,
        }
        self.send_command(Command::WriteRegisters(Box::new(snapshot)))
    }
}
