mod common;

use common::{MockDevice, pattern, profile};
use picboot_lib::progress::{ProgressCallback, ProgressId, ProgressInfo, ProgressType};
use picboot_lib::{AddressRange, Bootloader, Error, ExecutionStatus, log_queue};
use std::sync::{Arc, Mutex};

fn attached(mock: &MockDevice) -> Bootloader {
    let mut bl = Bootloader::default();
    bl.attach(mock.transport());
    bl
}

fn addr_of(request: &[u8]) -> u32 {
    request[2] as u32 | (request[3] as u32) << 8 | (request[4] as u32) << 16
}

#[test]
fn test_erase_single_command() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let mut bl = attached(&mock);

    bl.erase_region(&p, AddressRange::new(0x000, 0x0FF)).unwrap();

    assert_eq!(mock.requests(), vec![vec![0x03, 0x04, 0x00, 0x00, 0x00]]);
    assert_eq!(bl.status(), ExecutionStatus::Idle);
}

#[test]
fn test_erase_splits_at_255_pages() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let mut bl = attached(&mock);

    // 600 pages of 0x40 units
    let range = AddressRange::new(0x1000, 0x1000 + 600 * 0x40 - 1);
    bl.erase_region(&p, range).unwrap();

    let requests = mock.requests();
    let lengths: Vec<u8> = requests.iter().map(|r| r[1]).collect();
    let addresses: Vec<u32> = requests.iter().map(|r| addr_of(r)).collect();
    assert_eq!(lengths, vec![255, 255, 90]);
    assert_eq!(
        addresses,
        vec![0x1000, 0x1000 + 255 * 0x40, 0x1000 + 510 * 0x40]
    );
}

#[test]
fn test_erase_partial_page_is_not_erased() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let mut bl = attached(&mock);

    bl.erase_region(&p, AddressRange::new(0, 0x3E)).unwrap();
    assert!(mock.requests().is_empty());
}

#[test]
fn test_read_chunks_and_copies_data() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let mut bl = attached(&mock);

    let data = bl.read_region(&p, AddressRange::new(0, 599)).unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 3);
    for (i, request) in requests.iter().enumerate() {
        assert_eq!(request[0], 0x01);
        assert_eq!(request[1], 200);
        assert_eq!(addr_of(request), i as u32 * 200);
    }
    assert_eq!(data.len(), 600);
    assert!(data.iter().enumerate().all(|(i, &b)| b == pattern(i)));
    assert_eq!(bl.status(), ExecutionStatus::Idle);
}

#[test]
fn test_read_two_bytes_per_address() {
    let mut p = profile();
    p.bytes_per_addr = 2;
    p.read_block = 4;
    p.max_pkt_size = 64;
    let mock = MockDevice::for_profile(&p);
    let mut bl = attached(&mock);

    // 40 units, 10 read blocks, 8 blocks per packet
    let data = bl.read_region(&p, AddressRange::new(0x100, 0x127)).unwrap();

    let lengths: Vec<u8> = mock.requests().iter().map(|r| r[1]).collect();
    assert_eq!(lengths, vec![8, 2]);
    assert_eq!(addr_of(&mock.requests()[1]), 0x100 + 8 * 4);
    assert_eq!(data.len(), 80);
    assert!(data.iter().enumerate().all(|(i, &b)| b == pattern(0x200 + i)));
}

#[test]
fn test_read_length_mismatch_keeps_port_open() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    mock.adjust_read_len(-1);
    let (sink, logs) = log_queue(64);
    let mut bl = Bootloader::new(sink);
    bl.attach(mock.transport());

    let result = bl.read_region(&p, AddressRange::new(0, 599));

    assert!(matches!(
        result,
        Err(Error::LengthMismatch {
            expected: 200,
            actual: 199
        })
    ));
    assert_eq!(mock.requests().len(), 1);
    assert_eq!(bl.status(), ExecutionStatus::Error);
    assert!(bl.is_open());
    assert!(logs.drain().iter().any(|l| l.starts_with("ERROR: Invalid length")));
}

#[test]
fn test_write_sends_data_in_blocks() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let mut bl = attached(&mock);

    // 0x100 units = 16 write blocks, 12 blocks per packet
    let data: Vec<u8> = (0..0x100).map(|i| i as u8).collect();
    bl.write_region(&p, AddressRange::new(0x200, 0x2FF), &data).unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(&requests[0][..5], &[0x02, 12, 0x00, 0x02, 0x00]);
    assert_eq!(&requests[0][5..], &data[..12 * 0x10]);
    assert_eq!(&requests[1][..5], &[0x02, 4, 0xC0, 0x02, 0x00]);
    assert_eq!(&requests[1][5..], &data[12 * 0x10..]);
}

#[test]
fn test_write_rejects_short_buffer() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let mut bl = attached(&mock);
    let handle = bl.handle();

    let result = bl.write_region(&p, AddressRange::new(0, 0xFF), &[0u8; 0x80]);

    assert!(matches!(result, Err(Error::Parameter(_))));
    assert!(mock.requests().is_empty());
    assert_eq!(bl.status(), ExecutionStatus::Idle);
    assert!(handle.take_error().is_some());
}

#[test]
fn test_inverted_range_rejected_before_io() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let (sink, logs) = log_queue(16);
    let mut bl = Bootloader::new(sink);
    bl.attach(mock.transport());

    let range = AddressRange::new(0x200, 0x100);
    assert!(matches!(bl.erase_region(&p, range), Err(Error::Parameter(_))));
    assert!(matches!(bl.read_region(&p, range), Err(Error::Parameter(_))));
    assert!(matches!(
        bl.write_region(&p, range, &[]),
        Err(Error::Parameter(_))
    ));

    assert!(mock.requests().is_empty());
    assert!(bl.is_open());
    let lines = logs.drain();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l.starts_with("ERROR: ")));
}

fn record_statuses(mock: &MockDevice, bl: &Bootloader) -> Arc<Mutex<Vec<ExecutionStatus>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handle = bl.handle();
    let sink = Arc::clone(&seen);
    mock.on_request(move |_, _| sink.lock().unwrap().push(handle.status()));
    seen
}

#[test]
fn test_status_busy_during_every_chunk() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let mut bl = attached(&mock);
    let seen = record_statuses(&mock, &bl);

    bl.erase_region(&p, AddressRange::new(0, 300 * 0x40 - 1)).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(bl.status(), ExecutionStatus::Idle);

    bl.read_region(&p, AddressRange::new(0, 599)).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 5);
    assert_eq!(bl.status(), ExecutionStatus::Idle);

    bl.write_region(&p, AddressRange::new(0, 24 * 0x10 - 1), &[0x5A; 24 * 0x10])
        .unwrap();
    assert_eq!(seen.lock().unwrap().len(), 7);
    assert_eq!(bl.status(), ExecutionStatus::Idle);

    assert!(seen.lock().unwrap().iter().all(|s| *s == ExecutionStatus::Busy));
}

#[test]
fn test_status_error_after_failed_chunk() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let mut bl = attached(&mock);
    let seen = record_statuses(&mock, &bl);
    mock.drop_responses(usize::MAX);

    assert!(bl.read_region(&p, AddressRange::new(0, 599)).is_err());
    assert!(seen.lock().unwrap().iter().all(|s| *s == ExecutionStatus::Busy));
    assert_eq!(bl.status(), ExecutionStatus::Error);
    assert_eq!(bl.status().code(), -1);
}

#[test]
fn test_cancel_during_operation_stops_at_next_chunk() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let mut bl = attached(&mock);
    let handle = bl.handle();
    let cancel = handle.clone();
    mock.on_request(move |index, _| {
        if index == 0 {
            cancel.request_cancel();
        }
    });

    let result = bl.read_region(&p, AddressRange::new(0, 599));

    assert!(matches!(result, Err(Error::Aborted)));
    assert_eq!(mock.requests().len(), 1);
    assert_eq!(bl.status(), ExecutionStatus::Error);
    assert!(!bl.is_open());
    assert!(!handle.is_cancel_requested());
}

#[test]
fn test_stale_cancel_is_cleared_at_entry() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let mut bl = attached(&mock);
    bl.handle().request_cancel();

    bl.erase_region(&p, AddressRange::new(0, 0xFF)).unwrap();
    assert_eq!(mock.requests().len(), 1);
}

#[test]
fn test_failed_chunk_ends_operation() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    mock.drop_responses(usize::MAX);
    let mut bl = attached(&mock);

    let result = bl.erase_region(&p, AddressRange::new(0, 600 * 0x40 - 1));

    assert!(matches!(result, Err(Error::Unresponsive)));
    // all attempts went to the first chunk
    assert!(mock.requests().iter().all(|r| addr_of(r) == 0));
    assert!(!bl.is_open());
}

#[test]
fn test_start_app_marks_and_resets() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let (sink, logs) = log_queue(16);
    let mut bl = Bootloader::new(sink);
    bl.attach(mock.transport());

    bl.start_app(&p).unwrap();

    assert_eq!(
        mock.requests(),
        vec![
            vec![0x05, 0x01, 0xFF, 0x03, 0xF0, 0x00],
            vec![0xFF, 0x00, 0x00, 0x00, 0x00],
        ]
    );
    assert_eq!(logs.drain(), vec!["Starting application code..."]);
}

#[test]
fn test_start_app_resets_even_when_marking_fails() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    mock.corrupt_responses(picboot_lib::DEFAULT_RETRIES);
    let mut bl = attached(&mock);

    let result = bl.start_app(&p);

    // marking failed and closed the port; reset was still attempted
    assert!(matches!(result, Err(Error::Unresponsive)));
    assert_eq!(mock.requests().len(), picboot_lib::DEFAULT_RETRIES);
    assert_eq!(bl.status(), ExecutionStatus::Error);
}

#[test]
fn test_start_app_on_closed_port() {
    let p = profile();
    let (sink, logs) = log_queue(16);
    let mut bl = Bootloader::new(sink);

    assert!(matches!(bl.start_app(&p), Err(Error::NotOpen)));
    assert_eq!(bl.status(), ExecutionStatus::Error);
    assert_eq!(logs.drain(), vec!["ERROR: Port is closed."]);
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl ProgressCallback for RecordingProgress {
    fn start(&self, info: ProgressInfo) -> ProgressId {
        let ProgressType::Bar { total } = info.progress_type;
        self.events.lock().unwrap().push(format!("start {}", total));
        ProgressId(1)
    }

    fn update_message(&self, _id: ProgressId, message: String) {
        self.events.lock().unwrap().push(format!("message {}", message));
    }

    fn increment(&self, _id: ProgressId, delta: u64) {
        self.events.lock().unwrap().push(format!("inc {}", delta));
    }

    fn finish(&self, _id: ProgressId, final_message: String) {
        self.events.lock().unwrap().push(format!("finish {}", final_message));
    }
}

#[test]
fn test_progress_counts_blocks() {
    let p = profile();
    let mock = MockDevice::for_profile(&p);
    let progress = Arc::new(RecordingProgress::default());
    let mut bl = Bootloader::default().with_progress(progress.clone());
    bl.attach(mock.transport());

    bl.read_region(&p, AddressRange::new(0, 449)).unwrap();

    assert_eq!(
        *progress.events.lock().unwrap(),
        vec!["start 450", "inc 200", "inc 200", "inc 50", "finish Read complete"]
    );
}
