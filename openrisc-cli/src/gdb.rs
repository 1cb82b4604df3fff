//! GDB remote-serial-protocol server built on `gdbstub`.
//!
//! `gdbstub_arch` ships no OpenRISC definition, so the architecture is
//! described here: 32 GPRs followed by PPC, NPC and SR, each 32 bits,
//! serialized big-endian as the protocol requires for OR1K targets.
//!
//! The server owns nothing but channel endpoints; every register, memory
//! and execution operation is forwarded to the simulation thread.

mod base_ops;
mod breakpoints;
mod resume;

use std::net::TcpStream;
use std::num::NonZeroUsize;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::time::Duration;

use gdbstub::arch::{Arch, RegId, Registers};
use gdbstub::common::Signal;
use gdbstub::conn::Connection;
use gdbstub::stub::run_blocking::{self, WaitForStopReasonError};
use gdbstub::stub::{DisconnectReason, GdbStub, SingleThreadStopReason};
use gdbstub::target::ext::base::BaseOps;
use gdbstub::target::ext::breakpoints::BreakpointsOps;
use gdbstub::target::{Target, TargetError};
use log::warn;

use crate::sim::{Command, Event};

/// Register file as seen by the remote protocol.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Or1kRegs {
    pub gpr: [u32; 32],
    pub ppc: u32,
    pub npc: u32,
    pub sr: u32,
}

impl Registers for Or1kRegs {
    type ProgramCounter = u32;

    fn pc(&self) -> Self::ProgramCounter {
        self.npc
    }

    fn gdb_serialize(&self, mut write_byte: impl FnMut(Option<u8>)) {
        let mut emit = |value: u32| {
            for byte in value.to_be_bytes() {
                write_byte(Some(byte));
            }
        };
        for value in self.gpr {
            emit(value);
        }
        emit(self.ppc);
        emit(self.npc);
        emit(self.sr);
    }

    fn gdb_deserialize(&mut self, bytes: &[u8]) -> Result<(), ()> {
        if bytes.len() != 35 * 4 {
            return Err(());
        }
        let mut words = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_be_bytes(chunk.try_into().unwrap()));
        for value in self.gpr.iter_mut() {
            *value = words.next().ok_or(())?;
        }
        self.ppc = words.next().ok_or(())?;
        self.npc = words.next().ok_or(())?;
        self.sr = words.next().ok_or(())?;
        Ok(())
    }
}

/// Protocol register numbering: 0..31 are the GPRs, then PPC, NPC, SR.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Or1kRegId {
    Gpr(u8),
    Ppc,
    Npc,
    Sr,
}

impl RegId for Or1kRegId {
    fn from_raw_id(id: usize) -> Option<(Self, Option<NonZeroUsize>)> {
        let size = NonZeroUsize::new(4);
        match id {
            0..=31 => Some((Self::Gpr(id as u8), size)),
            32 => Some((Self::Ppc, size)),
            33 => Some((Self::Npc, size)),
            34 => Some((Self::Sr, size)),
            _ => None,
        }
    }
}

pub enum Or1k {}

impl Arch for Or1k {
    type Usize = u32;
    type Registers = Or1kRegs;
    type BreakpointKind = usize;
    type RegId = Or1kRegId;

    fn target_description_xml() -> Option<&'static str> {
        Some(r#"<target version="1.0"><architecture>or1k</architecture></target>"#)
    }
}

#[derive(Debug)]
pub enum GdbTargetError {
    /// The simulation thread is gone.
    TargetGone,
    NoAnswer,
}

impl std::fmt::Display for GdbTargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetGone => write!(f, "simulation thread terminated"),
            Self::NoAnswer => write!(f, "simulation thread dropped the reply channel"),
        }
    }
}

pub struct GdbTarget {
    command_sender: Sender<Command>,
    event_receiver: Receiver<Event>,
}

impl GdbTarget {
    pub fn new(command_sender: Sender<Command>, event_receiver: Receiver<Event>) -> Self {
        Self {
            command_sender,
            event_receiver,
        }
    }

    pub fn send_command(&mut self, command: Command) -> Result<(), TargetError<GdbTargetError>> {
        self.command_sender
            .send(command)
            .map_err(|_| TargetError::Fatal(GdbTargetError::TargetGone))
    }
}

impl Target for GdbTarget {
    type Arch = Or1k;
    type Error = GdbTargetError;

    fn base_ops(&mut self) -> BaseOps<'_, Self::Arch, Self::Error> {
        BaseOps::SingleThread(self)
    }

    fn support_breakpoints(&mut self) -> Option<BreakpointsOps<'_, Self>> {
        Some(self)
    }
}

fn stop_reason(event: Event) -> SingleThreadStopReason<u32> {
    match event {
        Event::DoneStep => SingleThreadStopReason::DoneStep,
        Event::Break => SingleThreadStopReason::SwBreak(()),
        Event::Exited(code) => SingleThreadStopReason::Exited(code as u8),
    }
}

enum EventLoop {}

impl run_blocking::BlockingEventLoop for EventLoop {
    type Target = GdbTarget;
    type Connection = TcpStream;
    type StopReason = SingleThreadStopReason<u32>;

    // Waits for either a stop event from the simulation thread or data
    // from the debugger, polling both with a short read timeout.
    fn wait_for_stop_reason(
        target: &mut GdbTarget,
        conn: &mut TcpStream,
    ) -> Result<
        run_blocking::Event<Self::StopReason>,
        WaitForStopReasonError<
            <Self::Target as Target>::Error,
            <Self::Connection as Connection>::Error,
        >,
    > {
        let previous_timeout = conn.read_timeout().ok().flatten();
        let _ = conn.set_read_timeout(Some(Duration::from_millis(10)));

        let result = loop {
            match target.event_receiver.try_recv() {
                Ok(event) => {
                    break Ok(run_blocking::Event::TargetStopped(stop_reason(event)));
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    break Err(WaitForStopReasonError::Target(GdbTargetError::TargetGone));
                }
            }

            let mut byte = [0u8; 1];
            match std::io::Read::read(conn, &mut byte) {
                Ok(0) => {
                    break Err(WaitForStopReasonError::Connection(std::io::Error::from(
                        std::io::ErrorKind::UnexpectedEof,
                    )));
                }
                Ok(_) => break Ok(run_blocking::Event::IncomingData(byte[0])),
                Err(err)
                    if err.kind() == std::io::ErrorKind::WouldBlock
                        || err.kind() == std::io::ErrorKind::TimedOut => {}
                Err(err) => break Err(WaitForStopReasonError::Connection(err)),
            }
        };

        let _ = conn.set_read_timeout(previous_timeout);
        result
    }

    fn on_interrupt(
        target: &mut GdbTarget,
    ) -> Result<Option<Self::StopReason>, <Self::Target as Target>::Error> {
        target
            .command_sender
            .send(Command::Pause)
            .map_err(|_| GdbTargetError::TargetGone)?;
        Ok(Some(SingleThreadStopReason::Signal(Signal::SIGINT)))
    }
}

/// Runs the protocol state machine over `stream` until the debugger
/// disconnects or a fatal error occurs.
pub fn serve(stream: TcpStream, target: &mut GdbTarget) {
    match GdbStub::new(stream).run_blocking::<EventLoop>(target) {
        Ok(DisconnectReason::Disconnect) => warn!("debugger disconnected"),
        Ok(DisconnectReason::TargetExited(code)) => warn!("target exited with code {code}"),
        Ok(DisconnectReason::TargetTerminated(signal)) => {
            warn!("target terminated with signal {signal}")
        }
        Ok(DisconnectReason::Kill) => warn!("debugger sent a kill command"),
        Err(err) => warn!("gdb server error: {err}"),
    }
}
