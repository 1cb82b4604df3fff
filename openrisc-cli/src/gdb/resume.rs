use gdbstub::common::Signal;
use gdbstub::target::ext::base::singlethread::{
    SingleThreadResume, SingleThreadSingleStep, SingleThreadSingleStepOps,
};

use crate::gdb::{GdbTarget, GdbTargetError};
use crate::sim::Command;

impl SingleThreadResume for GdbTarget {
    fn resume(&mut self, _signal: Option<Signal>) -> Result<(), Self::Error> {
        self.send_command(Command::Continue)
            .map_err(|_| GdbTargetError::TargetGone)
    }

    fn support_single_step(&mut self) -> Option<SingleThreadSingleStepOps<'_, Self>> {
        Some(self)
    }
}

impl SingleThreadSingleStep for GdbTarget {
    fn step(&mut self, _signal: Option<Signal>) -> Result<(), Self::Error> {
        self.send_command(Command::Step)
            .map_err(|_| GdbTargetError::TargetGone)
    }
}
