//! Flat RAM backing memory.
//!
//! A single contiguous byte array starting at physical address zero,
//! holding the memory image in system byte order. Sufficient for
//! bare-metal simulation; a full board model would put its own
//! interconnect behind the [`Bus`] trait instead.

use crate::bus::{Bus, Request, Response};

#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
    /// Cycle cost billed per non-debug access.
    latency: u64,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            latency: 1,
        }
    }

    pub fn with_latency(size: usize, latency: u64) -> Self {
        Self {
            data: vec![0; size],
            latency,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Copies a raw image into memory at `addr`, as the `-b` loader does.
    /// The image is truncated at the end of memory.
    pub fn load(&mut self, addr: u32, image: &[u8]) {
        let start = (addr as usize).min(self.data.len());
        let end = (start + image.len()).min(self.data.len());
        self.data[start..end].copy_from_slice(&image[..end - start]);
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, req: &Request) -> Option<std::ops::Range<usize>> {
        let start = req.addr as usize;
        let end = start.checked_add(req.size as usize)?;
        (end <= self.data.len()).then_some(start..end)
    }
}

impl Bus for Memory {
    fn transact(&mut self, req: &mut Request, data: &mut [u8]) -> Response {
        let Some(range) = self.range(req) else {
            return Response::Error;
        };
        if req.is_write() {
            self.data[range].copy_from_slice(data);
        } else {
            data.copy_from_slice(&self.data[range]);
        }
        if !req.debug {
            req.cycles += self.latency;
        }
        Response::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Direction;

    #[test]
    fn test_out_of_range_is_bus_error() {
        let mut memory = Memory::new(0x100);
        let mut req = Request::data_read(0xfe, 4);
        let mut data = [0u8; 4];
        assert_eq!(Response::Error, memory.transact(&mut req, &mut data));
    }

    #[test]
    fn test_read_back_written_bytes() {
        let mut memory = Memory::new(0x100);
        let mut req = Request::data_write(0x10, 4);
        let mut data = [1, 2, 3, 4];
        assert_eq!(Response::Success, memory.transact(&mut req, &mut data));

        let mut req = Request::data_read(0x10, 4);
        req.direction = Direction::Read;
        let mut out = [0u8; 4];
        assert_eq!(Response::Success, memory.transact(&mut req, &mut out));
        assert_eq!(data, out);
        assert_eq!(1, req.cycles);
    }

    #[test]
    fn test_debug_access_is_free() {
        let mut memory = Memory::new(0x100);
        let mut req = Request::debug_read(0x10, 4);
        let mut out = [0u8; 4];
        memory.transact(&mut req, &mut out);
        assert_eq!(0, req.cycles);
    }

    #[test]
    fn test_load_truncates_at_end() {
        let mut memory = Memory::new(8);
        memory.load(6, &[0xaa, 0xbb, 0xcc]);
        assert_eq!(&[0xaa, 0xbb], &memory.data()[6..8]);
    }
}
