//! The memory-transaction port.
//!
//! The core issues [`Request`]s through a [`Port`], which wraps the system
//! [`Bus`] (the backing memory or a full interconnect model). The port
//! owns everything a single transaction needs beyond the bus itself:
//! endian conversion between the requester's byte order and the system's,
//! and the per-port exclusive-access reservation implementing the
//! load-linked/store-conditional protocol.

use crate::Endianness;

/// Transfer direction of a request.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    Read,
    Write,
}

/// Which fetch path a request belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Path {
    Instruction,
    Data,
}

/// Outcome of a transaction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Response {
    Success,
    /// Exclusive access lost its reservation; only valid for exclusive
    /// requests.
    Failed,
    /// Bus error.
    Error,
}

/// One memory transaction.
///
/// The data travels separately as a byte buffer in the requester's byte
/// order (`endian`); `size` is its length in bytes (1, 2, 4, 8, or
/// arbitrary for debug block accesses).
#[derive(Debug, Clone)]
pub struct Request {
    pub addr: u32,
    pub size: u32,
    pub direction: Direction,
    pub path: Path,
    pub exclusive: bool,
    pub supervisor: bool,
    /// Debug accesses bypass alignment checks, exceptions, LRU updates and
    /// cycle accounting.
    pub debug: bool,
    pub endian: Endianness,
    // Cacheability flags copied from the matching translation entry.
    pub cache_coherent: bool,
    pub cache_inhibit: bool,
    pub cache_writeback: bool,
    pub weakly_ordered: bool,
    /// Cycle cost accumulated by the port and bus.
    pub cycles: u64,
}

impl Request {
    fn new(addr: u32, size: u32, direction: Direction, path: Path) -> Self {
        Self {
            addr,
            size,
            direction,
            path,
            exclusive: false,
            supervisor: false,
            debug: false,
            endian: Endianness::host(),
            cache_coherent: false,
            cache_inhibit: false,
            cache_writeback: false,
            weakly_ordered: false,
            cycles: 0,
        }
    }

    /// An instruction fetch of one word.
    pub fn fetch(addr: u32) -> Self {
        Self::new(addr, 4, Direction::Read, Path::Instruction)
    }

    pub fn data_read(addr: u32, size: u32) -> Self {
        Self::new(addr, size, Direction::Read, Path::Data)
    }

    pub fn data_write(addr: u32, size: u32) -> Self {
        Self::new(addr, size, Direction::Write, Path::Data)
    }

    pub fn debug_read(addr: u32, size: u32) -> Self {
        let mut req = Self::new(addr, size, Direction::Read, Path::Data);
        req.debug = true;
        req
    }

    pub fn debug_write(addr: u32, size: u32) -> Self {
        let mut req = Self::new(addr, size, Direction::Write, Path::Data);
        req.debug = true;
        req
    }

    pub fn is_read(&self) -> bool {
        self.direction == Direction::Read
    }

    pub fn is_write(&self) -> bool {
        self.direction == Direction::Write
    }

    pub fn is_instruction(&self) -> bool {
        self.path == Path::Instruction
    }

    pub fn is_aligned(&self) -> bool {
        crate::bits::is_aligned(self.addr, self.size)
    }
}

/// Anything the port can transact against: the backing memory model or a
/// larger interconnect. Buffers handed to `transact` are always in the
/// system byte order; the port has already converted.
pub trait Bus {
    fn transact(&mut self, req: &mut Request, data: &mut [u8]) -> Response;

    /// Called while the core dozes; an external simulator may advance
    /// virtual time and return the cycles it skipped. Returning 0 leaves
    /// the core to sleep through its own quantum.
    fn sleep(&mut self, cycles: u64) -> u64 {
        let _ = cycles;
        0
    }
}

/// The core's window onto the system bus.
#[derive(Debug)]
pub struct Port<B> {
    bus: B,
    endian: Endianness,
    reservation: Option<(u32, u32)>,
}

impl<B: Bus> Port<B> {
    /// Wraps `bus`, whose memory image is in `endian` byte order. For OR1K
    /// binaries this is [`Endianness::BE`].
    pub fn new(bus: B, endian: Endianness) -> Self {
        Self {
            bus,
            endian,
            reservation: None,
        }
    }

    pub fn system_endian(&self) -> Endianness {
        self.endian
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn sleep(&mut self, cycles: u64) -> u64 {
        self.bus.sleep(cycles)
    }

    /// Sends one request to the bus, converting the data between the
    /// requester's and the system's byte order, and implementing the
    /// exclusive-access protocol.
    pub fn transact(&mut self, req: &mut Request, data: &mut [u8]) -> Response {
        debug_assert_eq!(req.size as usize, data.len());
        if req.exclusive {
            return self.exclusive(req, data);
        }

        let convert = req.size > 1 && req.endian != self.endian;
        if convert {
            swap_words(data);
        }
        let response = self.bus.transact(req, data);
        if convert {
            swap_words(data);
        }
        response
    }

    // Load-linked captures (address, value); store-conditional performs a
    // compare-and-swap of the captured value.
    fn exclusive(&mut self, req: &mut Request, data: &mut [u8]) -> Response {
        debug_assert_eq!(4, req.size);
        let mut plain = req.clone();
        plain.exclusive = false;

        if req.is_read() {
            let response = self.transact(&mut plain, data);
            req.cycles = plain.cycles;
            if response == Response::Success {
                self.reservation = Some((req.addr, value_of(data, req.endian)));
            }
            return response;
        }

        let Some((addr, value)) = self.reservation else {
            return Response::Failed;
        };
        if req.addr != addr {
            return Response::Failed;
        }

        let mut current = [0u8; 4];
        let mut probe = Request::debug_read(req.addr, 4);
        probe.endian = req.endian;
        if self.transact(&mut probe, &mut current) != Response::Success {
            return Response::Error;
        }
        if value_of(&current, req.endian) != value {
            return Response::Failed;
        }

        let response = self.transact(&mut plain, data);
        req.cycles = plain.cycles;
        response
    }

    /// Clears the exclusive reservation, e.g. on core reset.
    pub fn clear_reservation(&mut self) {
        self.reservation = None;
    }

    /// Convenience word read in host byte order, used by the hardware
    /// table walker. The cycle cost is reported through `cycles`.
    pub fn read_word(&mut self, addr: u32, cycles: &mut u64) -> Option<u32> {
        let mut req = Request::data_read(addr, 4);
        let mut data = [0u8; 4];
        let response = self.transact(&mut req, &mut data);
        *cycles += req.cycles;
        (response == Response::Success).then(|| u32::from_ne_bytes(data))
    }
}

fn value_of(data: &[u8], endian: Endianness) -> u32 {
    let bytes: [u8; 4] = data.try_into().expect("exclusive access must be one word");
    match endian {
        Endianness::LE => u32::from_le_bytes(bytes),
        Endianness::BE => u32::from_be_bytes(bytes),
    }
}

// Byte order conversion: whole-buffer reversal for the scalar sizes, and
// per-word reversal for larger block transfers.
fn swap_words(data: &mut [u8]) {
    match data.len() {
        0 | 1 => {}
        2 | 4 | 8 => data.reverse(),
        _ => {
            for chunk in data.chunks_exact_mut(4) {
                chunk.reverse();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    fn port() -> Port<Memory> {
        Port::new(Memory::new(0x1000), Endianness::BE)
    }

    fn write_word(port: &mut Port<Memory>, addr: u32, value: u32) {
        let mut req = Request::data_write(addr, 4);
        let mut data = value.to_ne_bytes();
        assert_eq!(Response::Success, port.transact(&mut req, &mut data));
    }

    fn read_word(port: &mut Port<Memory>, addr: u32) -> u32 {
        let mut req = Request::data_read(addr, 4);
        let mut data = [0u8; 4];
        assert_eq!(Response::Success, port.transact(&mut req, &mut data));
        u32::from_ne_bytes(data)
    }

    #[test]
    fn test_endian_conversion_round_trip() {
        let mut port = port();
        write_word(&mut port, 0x10, 0x1234_5678);
        assert_eq!(0x1234_5678, read_word(&mut port, 0x10));
        // The memory image itself is big-endian.
        let mut req = Request::debug_read(0x10, 4);
        req.endian = Endianness::BE;
        let mut raw = [0u8; 4];
        port.transact(&mut req, &mut raw);
        assert_eq!([0x12, 0x34, 0x56, 0x78], raw);
    }

    #[test]
    fn test_exclusive_read_then_write_succeeds() {
        let mut port = port();
        write_word(&mut port, 0x20, 7);

        let mut read = Request::data_read(0x20, 4);
        read.exclusive = true;
        let mut data = [0u8; 4];
        assert_eq!(Response::Success, port.transact(&mut read, &mut data));
        assert_eq!(7, u32::from_ne_bytes(data));

        let mut write = Request::data_write(0x20, 4);
        write.exclusive = true;
        let mut data = 9u32.to_ne_bytes();
        assert_eq!(Response::Success, port.transact(&mut write, &mut data));
        assert_eq!(9, read_word(&mut port, 0x20));
    }

    #[test]
    fn test_exclusive_write_without_reservation_fails() {
        let mut port = port();
        write_word(&mut port, 0x20, 7);
        let mut write = Request::data_write(0x20, 4);
        write.exclusive = true;
        let mut data = 9u32.to_ne_bytes();
        assert_eq!(Response::Failed, port.transact(&mut write, &mut data));
        assert_eq!(7, read_word(&mut port, 0x20));
    }

    #[test]
    fn test_exclusive_write_after_external_modification_fails() {
        let mut port = port();
        write_word(&mut port, 0x20, 7);

        let mut read = Request::data_read(0x20, 4);
        read.exclusive = true;
        let mut data = [0u8; 4];
        port.transact(&mut read, &mut data);

        // Another agent writes the watched word.
        write_word(&mut port, 0x20, 8);

        let mut write = Request::data_write(0x20, 4);
        write.exclusive = true;
        let mut data = 9u32.to_ne_bytes();
        assert_eq!(Response::Failed, port.transact(&mut write, &mut data));
        assert_eq!(8, read_word(&mut port, 0x20));
    }

    #[test]
    fn test_exclusive_write_to_other_address_fails() {
        let mut port = port();
        let mut read = Request::data_read(0x20, 4);
        read.exclusive = true;
        let mut data = [0u8; 4];
        port.transact(&mut read, &mut data);

        let mut write = Request::data_write(0x24, 4);
        write.exclusive = true;
        let mut data = 9u32.to_ne_bytes();
        assert_eq!(Response::Failed, port.transact(&mut write, &mut data));
    }
}
