//! Error reporting for malformed or out-of-place events.
//!
//! Every error here is fatal to the simulation; the tests check that the
//! right variant surfaces from `tick` and that the state dump still works.

use crate::common::builder::event::{EventBuilder, get_x, put_m, put_s};
use crate::common::harness::{MEM, TestDirectory};
use crate::common::mocks::link::SharedPort;
use dirsim_core::config::DirectoryConfig;
use dirsim_core::protocol::{Command, FlushState, MemEvent, State};
use dirsim_core::{DirectoryController, DirectoryError};

// ══════════════════════════════════════════════════════════
// 1. Protocol errors
// ══════════════════════════════════════════════════════════

#[test]
fn put_from_non_owner_is_rejected() {
    let mut t = TestDirectory::new();
    t.own(0x1000, "c0");

    t.from_cache(put_m("c1", 0x1000, 0));
    let err = t.try_exchange().unwrap_err();
    assert!(
        matches!(&err, DirectoryError::NotOwner { cmd: Command::PutM, addr: 0x1000, src } if src == "c1"),
        "unexpected error: {err}"
    );
}

#[test]
fn put_for_invalid_line_is_a_violation() {
    let mut t = TestDirectory::new();
    let put = put_s("c0", 0x5000);
    let id = put.id;
    t.from_cache(put);
    let err = t.try_exchange().unwrap_err();
    assert!(matches!(
        err,
        DirectoryError::ProtocolViolation {
            cmd: Command::PutS,
            state: State::I,
            addr: 0x5000,
            event,
        } if event == id
    ));
}

#[test]
fn unmatched_memory_response_is_reported() {
    let mut t = TestDirectory::new();
    t.from_memory(MemEvent::new(MEM, 0x1000, 0x1000, Command::GetSResp).with_dst("directory"));
    let err = t.try_exchange().unwrap_err();
    assert!(matches!(err, DirectoryError::UnmatchedResponse { cmd: Command::GetSResp, .. }));
}

#[test]
fn nack_without_payload_is_reported() {
    let mut t = TestDirectory::new();
    let nack = MemEvent::new("c0", 0x1000, 0x1000, Command::Nack).with_dst("directory");
    let id = nack.id;
    t.from_cache(nack);
    let err = t.try_exchange().unwrap_err();
    assert!(matches!(err, DirectoryError::EmptyNack(got) if got == id));
}

#[test]
fn short_writeback_payload_is_reported() {
    let mut t = TestDirectory::new();
    t.own(0x1000, "c0");
    let put = EventBuilder::new(Command::PutM, "c0", 0x1000)
        .payload(vec![1; 8])
        .dirty()
        .build();
    t.from_cache(put);
    let err = t.try_exchange().unwrap_err();
    assert!(matches!(
        err,
        DirectoryError::PayloadSize {
            expected: 64,
            actual: 8
        }
    ));
}

// ══════════════════════════════════════════════════════════
// 2. Flush barrier errors
// ══════════════════════════════════════════════════════════

#[test]
fn ack_flush_without_flush_in_progress_is_a_violation() {
    let mut t = TestDirectory::new();
    t.from_cache(EventBuilder::new(Command::AckFlush, "c0", 0).build());
    let err = t.try_exchange().unwrap_err();
    assert!(matches!(
        err,
        DirectoryError::FlushViolation {
            cmd: Command::AckFlush,
            state: FlushState::Ready
        }
    ));
}

#[test]
fn unblock_without_forwarded_flush_is_a_violation() {
    let mut t = TestDirectory::new();
    t.from_memory(EventBuilder::new(Command::UnblockFlush, MEM, 0).build());
    let err = t.try_exchange().unwrap_err();
    assert!(matches!(
        err,
        DirectoryError::FlushViolation {
            cmd: Command::UnblockFlush,
            ..
        }
    ));
}

// ══════════════════════════════════════════════════════════
// 3. Construction and diagnostics
// ══════════════════════════════════════════════════════════

#[test]
fn invalid_config_is_refused() {
    let config = DirectoryConfig {
        line_size: 48,
        ..DirectoryConfig::default()
    };
    let result = DirectoryController::new(config, Box::new(SharedPort::new(MEM, &[])), None);
    assert!(matches!(result, Err(DirectoryError::InvalidConfig(_))));
}

#[test]
fn status_dump_lists_lines_queues_and_outstanding_answers() {
    let mut t = TestDirectory::new();
    t.own(0x1000, "c0");
    t.from_cache(get_x("c1", 0x1000));
    let _ = t.exchange();

    let mut buf = Vec::new();
    t.dir.print_status(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("=== Directory directory"), "{text}");
    assert!(text.contains("0x1000 M_Inv"), "{text}");
    let line = text.lines().find(|l| l.contains("0x1000 M_Inv")).unwrap();
    assert!(line.ends_with("awaiting=1"), "{line}");
    assert!(text.contains("MSHR size=1/"), "{text}");
    assert!(text.contains("outstanding responses:\n  0x1000 c0"), "{text}");
    assert!(text.contains("mem link: "), "{text}");

    t.dir.emergency_shutdown();
}
