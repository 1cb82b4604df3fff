mod elf;
mod gdb;
mod sim;

use std::fs::File;
use std::io::Read;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Instant;

use clap::Parser;
use log::{info, warn};
use openrisc_core::insn::DecodeCacheSize;
use openrisc_core::memory::Memory;
use openrisc_core::{Config, Core, StepResult};
use thiserror::Error;

use gdb::GdbTarget;
use sim::{Command, Simulation};

/// Cycles per quantum when free-running.
const QUANTUM: u64 = 0x4000;

#[derive(Parser, Debug)]
#[command(version, about = "OpenRISC 1000 instruction-set simulator", long_about = None)]
struct Args {
    /// ELF binary to load and simulate.
    #[arg(short, long)]
    elf: Option<PathBuf>,
    /// Raw binary image to load at address zero.
    #[arg(short, long)]
    bin: Option<PathBuf>,
    /// Write an instruction trace to this file.
    #[arg(short, long)]
    trace: Option<PathBuf>,
    /// Listen for a GDB connection on this port.
    #[arg(short = 'p', long = "gdb")]
    gdb: Option<u16>,
    /// Simulated memory size in bytes.
    #[arg(short, long, default_value_t = 0x0800_0000)]
    memsize: usize,
    /// Stop after this many instructions.
    #[arg(short, long)]
    insns: Option<u64>,
    /// Show warnings for illegal SPR accesses and unsupported encodings.
    #[arg(short, long)]
    warnings: bool,
    /// Disable the decode cache.
    #[arg(short = 'z', long)]
    no_decode_cache: bool,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt ELF image: {0}")]
    Elf(#[from] goblin::error::Error),
    #[error("cannot load image: {0}")]
    Load(#[from] openrisc_core::core::DebugAccessError),
    #[error("nothing to simulate: pass --elf, --bin or --gdb")]
    NothingToDo,
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Args::parse()) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<u32, CliError> {
    if args.elf.is_none() && args.bin.is_none() && args.gdb.is_none() {
        return Err(CliError::NothingToDo);
    }

    let config = Config {
        warnings: args.warnings,
        decode_cache: if args.no_decode_cache {
            DecodeCacheSize::Disabled
        } else {
            DecodeCacheSize::Entries8M
        },
        ..Config::default()
    };

    let mut core = Core::new(Memory::new(args.memsize), config);

    if let Some(path) = &args.elf {
        let image = read_file(path)?;
        elf::load(&mut core, &image)?;
    }
    if let Some(path) = &args.bin {
        let image = read_file(path)?;
        core.port_mut().bus_mut().load(0, &image);
    }
    if let Some(path) = &args.trace {
        core.set_trace(Box::new(File::create(path)?));
    }

    let exit_code = match args.gdb {
        // The core moves into the simulation thread, which prints the
        // statistics when it finishes.
        Some(port) => run_with_gdb(core, port, args.insns)?,
        None => {
            let started = Instant::now();
            let code = run_standalone(&mut core, args.insns);
            print_statistics(&core, started.elapsed().as_secs_f64());
            code
        }
    };

    Ok(exit_code)
}

fn read_file(path: &PathBuf) -> Result<Vec<u8>, std::io::Error> {
    let mut buf = Vec::new();
    File::open(path)?.read_to_end(&mut buf)?;
    Ok(buf)
}

fn run_standalone(core: &mut Core<Memory>, insns: Option<u64>) -> u32 {
    let result = match insns {
        Some(budget) => core.step(budget).0,
        None => core.run(QUANTUM),
    };
    match result {
        StepResult::Exit => core.exit_code(),
        StepResult::Ok => 0,
        StepResult::Breakpoint | StepResult::Watchpoint => {
            warn!("stopped at a debug point with no debugger attached");
            0
        }
    }
}

fn run_with_gdb(core: Core<Memory>, port: u16, insns: Option<u64>) -> Result<u32, CliError> {
    let (command_sender, command_receiver) = mpsc::channel();
    let (event_sender, event_receiver) = mpsc::channel();

    let started = Instant::now();
    let simulation = Simulation::new(core, command_receiver, event_sender, insns);
    let sim_thread = std::thread::spawn(move || {
        let (core, exit_code) = simulation.run();
        print_statistics(&core, started.elapsed().as_secs_f64());
        exit_code
    });

    let listener = TcpListener::bind(("localhost", port))?;
    info!("waiting for a GDB connection on port {port}");
    let (stream, peer) = listener.accept()?;
    info!("debugger connected from {peer}");

    let mut target = GdbTarget::new(command_sender.clone(), event_receiver);
    gdb::serve(stream, &mut target);

    // The server is done (detach, kill or error); release the core.
    let _ = command_sender.send(Command::Exit);
    let exit_code = sim_thread.join().unwrap_or(0);
    Ok(exit_code)
}

fn print_statistics(core: &Core<Memory>, wall_seconds: f64) {
    let counters = core.counters();
    let duration = counters.cycles() as f64 / core.config().clock_hz as f64;
    let mips = if wall_seconds > 0.0 {
        counters.instructions() as f64 / wall_seconds / 1e6
    } else {
        0.0
    };

    println!("simulation exit");
    println!("# cycles       : {}", counters.cycles());
    println!("# instructions : {}", counters.instructions());
    println!("# hit rate     : {:.6}", counters.decode_cache_hit_rate());
    println!("# sim duration : {duration:.4} seconds");
    println!("# sim speed    : {mips:.4} MIPS");
    println!("# time taken   : {wall_seconds:.4} seconds");
}
