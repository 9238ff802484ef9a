#![allow(dead_code)]

use picboot_lib::frame::{self, DLE, ETX, FrameDecoder, STX};
use picboot_lib::{AddressRange, DeviceProfile, Opcode, Transport};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Profile used across the integration tests.
pub fn profile() -> DeviceProfile {
    DeviceProfile {
        name: "TEST".to_string(),
        baud: 115_200,
        timeout: Duration::from_millis(100),
        write_block: 0x10,
        read_block: 1,
        erase_block: 0x40,
        max_pkt_size: 200,
        bytes_per_addr: 1,
        prog_ranges: vec![AddressRange::new(0x0000, 0x7FFF)],
        data_range: AddressRange::new(0xF0_0000, 0xF0_03FF),
    }
}

/// Byte the simulated device holds at byte offset `index` of program memory.
pub fn pattern(index: usize) -> u8 {
    (index % 251) as u8
}

type RequestHook = Box<dyn FnMut(usize, &[u8]) + Send>;

struct MockState {
    decoder: FrameDecoder,
    requests: Vec<Vec<u8>>,
    rx: VecDeque<u8>,
    read_block: usize,
    bytes_per_addr: usize,
    drop_responses: usize,
    corrupt_responses: usize,
    read_len_adjust: isize,
    fail_writes: bool,
    on_request: Option<RequestHook>,
}

/// Simulated bootloader.
///
/// Decodes every request written to it, records the payload and queues a response frame. Reads
/// time out once the queue is empty.
#[derive(Clone)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new(read_block: usize, bytes_per_addr: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                decoder: FrameDecoder::new(),
                requests: Vec::new(),
                rx: VecDeque::new(),
                read_block,
                bytes_per_addr,
                drop_responses: 0,
                corrupt_responses: 0,
                read_len_adjust: 0,
                fail_writes: false,
                on_request: None,
            })),
        }
    }

    pub fn for_profile(profile: &DeviceProfile) -> Self {
        Self::new(profile.read_block as usize, profile.bytes_per_addr as usize)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Stay silent for the next `n` requests.
    pub fn drop_responses(&self, n: usize) {
        self.lock().drop_responses = n;
    }

    /// Answer the next `n` requests with a bad checksum.
    pub fn corrupt_responses(&self, n: usize) {
        self.lock().corrupt_responses = n;
    }

    /// Return this many bytes more (or fewer) than requested on RD_PROG.
    pub fn adjust_read_len(&self, delta: isize) {
        self.lock().read_len_adjust = delta;
    }

    pub fn fail_writes(&self) {
        self.lock().fail_writes = true;
    }

    /// Called with the request index and payload for every decoded request.
    pub fn on_request(&self, hook: impl FnMut(usize, &[u8]) + Send + 'static) {
        self.lock().on_request = Some(Box::new(hook));
    }

    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.lock().requests.clone()
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }
}

impl MockState {
    fn respond(&mut self, request: &[u8]) {
        let index = self.requests.len();
        self.requests.push(request.to_vec());
        if let Some(hook) = self.on_request.as_mut() {
            hook(index, request);
        }

        if self.drop_responses > 0 {
            self.drop_responses -= 1;
            return;
        }

        let mut response = request[..5.min(request.len())].to_vec();
        if request.first() == Some(&u8::from(Opcode::ReadProg)) {
            let address =
                request[2] as usize | (request[3] as usize) << 8 | (request[4] as usize) << 16;
            let wanted = request[1] as usize * self.read_block * self.bytes_per_addr;
            let len = (wanted as isize + self.read_len_adjust).max(0) as usize;
            let start = address * self.bytes_per_addr;
            response.extend((start..start + len).map(pattern));
        }

        if self.corrupt_responses > 0 {
            self.corrupt_responses -= 1;
            let mut bytes = vec![STX, STX];
            for &b in &response {
                escape(&mut bytes, b);
            }
            escape(&mut bytes, frame::checksum(&response).wrapping_add(1));
            bytes.push(ETX);
            self.rx.extend(bytes);
        } else {
            self.rx.extend(frame::encode(&response));
        }
    }
}

fn escape(out: &mut Vec<u8>, byte: u8) {
    if matches!(byte, STX | ETX | DLE) {
        out.push(DLE);
    }
    out.push(byte);
}

impl Read for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock timeout"));
        }
        let n = buf.len().min(state.rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.rx.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MockDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        for &b in buf {
            if let Some(Ok(_)) = state.decoder.push(b) {
                let request = state.decoder.payload().to_vec();
                state.respond(&request);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockDevice {
    fn discard_input(&mut self) -> io::Result<()> {
        self.lock().rx.clear();
        Ok(())
    }
}
