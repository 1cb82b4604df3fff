//! The simulation thread.
//!
//! All mutation of core state happens here, between quantum slices. The
//! GDB server thread only sends [`Command`]s and receives [`Event`]s;
//! reply-carrying commands answer over `oneshot` channels.

use std::sync::mpsc::{Receiver, Sender, TryRecvError};

use log::debug;
use openrisc_core::memory::Memory;
use openrisc_core::registers::Specifier;
use openrisc_core::{spr, Core, StepResult};

/// Cycles per slice while free-running under debugger control; commands
/// are polled between slices.
const SLICE: u64 = 0x1000;

/// Snapshot of the registers the remote protocol exposes.
#[derive(Debug, Clone, Default)]
pub struct RegisterSnapshot {
    pub gpr: [u32; 32],
    pub ppc: u32,
    pub npc: u32,
    pub sr: u32,
}

pub enum Command {
    Continue,
    Step,
    Pause,
    /// Tear down the simulation thread.
    Exit,
    AddBreakpoint(u32),
    RemoveBreakpoint(u32),
    AddWatchpoint(u32, WatchKind),
    RemoveWatchpoint(u32, WatchKind),
    ReadRegisters(oneshot::Sender<RegisterSnapshot>),
    WriteRegisters(Box<RegisterSnapshot>),
    ReadMemory {
        addr: u32,
        len: usize,
        reply: oneshot::Sender<Result<Vec<u8>, ()>>,
    },
    WriteMemory {
        addr: u32,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<(), ()>>,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WatchKind {
    Read,
    Write,
}

/// Stop notifications towards the GDB server.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Event {
    DoneStep,
    Break,
    Exited(u32),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ExecutionMode {
    Paused,
    Step,
    Continue,
}

pub struct Simulation {
    core: Core<Memory>,
    commands: Receiver<Command>,
    events: Sender<Event>,
    mode: ExecutionMode,
    /// Optional instruction budget from the command line.
    remaining: Option<u64>,
}

impl Simulation {
    pub fn new(
        core: Core<Memory>,
        commands: Receiver<Command>,
        events: Sender<Event>,
        budget: Option<u64>,
    ) -> Self {
        Self {
            core,
            commands,
            events,
            mode: ExecutionMode::Paused,
            remaining: budget,
        }
    }

    /// Processes commands and runs the core until the guest exits or the
    /// debugger tears the session down. Returns the core (for statistics)
    /// and the exit code.
    pub fn run(mut self) -> (Core<Memory>, u32) {
        loop {
            match self.mode {
                ExecutionMode::Paused => {
                    let Ok(command) = self.commands.recv() else {
                        return (self.core, 0);
                    };
                    if self.handle(command) {
                        let exit_code = self.core.exit_code();
                        return (self.core, exit_code);
                    }
                }
                ExecutionMode::Step => {
                    let event = self.slice(1).unwrap_or(Event::DoneStep);
                    let _ = self.events.send(event);
                    if let Event::Exited(_) = event {
                        let exit_code = self.core.exit_code();
                        return (self.core, exit_code);
                    }
                    self.mode = ExecutionMode::Paused;
                }
                ExecutionMode::Continue => {
                    if let Some(event) = self.slice(SLICE) {
                        let _ = self.events.send(event);
                        if let Event::Exited(_) = event {
                            let exit_code = self.core.exit_code();
                            return (self.core, exit_code);
                        }
                        self.mode = ExecutionMode::Paused;
                        continue;
                    }
                    // Poll for commands between slices.
                    match self.commands.try_recv() {
                        Ok(command) => {
                            if self.handle(command) {
                                let exit_code = self.core.exit_code();
                                return (self.core, exit_code);
                            }
                        }
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => return (self.core, 0),
                    }
                }
            }
        }
    }

    // Runs one slice; returns the stop event, if any.
    fn slice(&mut self, cycles: u64) -> Option<Event> {
        let cycles = match self.remaining {
            Some(remaining) => cycles.min(remaining),
            None => cycles,
        };
        if cycles == 0 {
            return Some(Event::Exited(self.core.exit_code()));
        }
        let (result, consumed) = self.core.step(cycles);
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(consumed);
        }
        match result {
            StepResult::Ok => None,
            StepResult::Exit => Some(Event::Exited(self.core.exit_code())),
            StepResult::Breakpoint | StepResult::Watchpoint => Some(Event::Break),
        }
    }

    // Applies one command; returns `true` when the thread must stop.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Continue => self.mode = ExecutionMode::Continue,
            Command::Step => self.mode = ExecutionMode::Step,
            // The interrupt handler on the server side reports the stop;
            // no event must be queued here.
            Command::Pause => self.mode = ExecutionMode::Paused,
            Command::Exit => return true,
            Command::AddBreakpoint(addr) => {
                debug!("breakpoint added at {addr:#010x}");
                self.core.insert_breakpoint(addr);
            }
            Command::RemoveBreakpoint(addr) => self.core.remove_breakpoint(addr),
            Command::AddWatchpoint(addr, WatchKind::Read) => self.core.insert_watchpoint_read(addr),
            Command::AddWatchpoint(addr, WatchKind::Write) => {
                self.core.insert_watchpoint_write(addr)
            }
            Command::RemoveWatchpoint(addr, WatchKind::Read) => {
                self.core.remove_watchpoint_read(addr)
            }
            Command::RemoveWatchpoint(addr, WatchKind::Write) => {
                self.core.remove_watchpoint_write(addr)
            }
            Command::ReadRegisters(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::WriteRegisters(snapshot) => self.apply(&snapshot),
            Command::ReadMemory { addr, len, reply } => {
                let mut buf = vec![0; len];
                let result = self.core.debug_read(addr, &mut buf).map(|()| buf);
                let _ = reply.send(result.map_err(|_| ()));
            }
            Command::WriteMemory { addr, data, reply } => {
                let result = self.core.debug_write(addr, &data);
                let _ = reply.send(result.map_err(|_| ()));
            }
        }
        false
    }

    fn snapshot(&mut self) -> RegisterSnapshot {
        let mut snapshot = RegisterSnapshot {
            ppc: self.core.ppc(),
            npc: self.core.npc(),
            sr: self.core.read_spr(spr::SR, true),
            ..RegisterSnapshot::default()
        };
        for r in Specifier::iter_all() {
            snapshot.gpr[usize::from(r)] = self.core.gpr(r);
        }
        snapshot
    }

    fn apply(&mut self, snapshot: &RegisterSnapshot) {
        for r in Specifier::iter_all() {
            self.core.set_gpr(r, snapshot.gpr[usize::from(r)]);
        }
        self.core.set_ppc(snapshot.ppc);
        self.core.set_npc(snapshot.npc);
        self.core.write_spr(spr::SR, snapshot.sr, true);
    }
}
