//! DirStats unit tests.
//!
//! Verifies counter classification of received and sent events and the
//! derived latency means.

use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::builder::event::{EventBuilder, get_s};
use dirsim_core::protocol::Command;
use dirsim_core::stats::DirStats;

#[test]
fn default_stats_all_zero() {
    let stats = DirStats::default();
    assert_eq!(stats.cycles, 0);
    assert_eq!(stats.get_s_received, 0);
    assert_eq!(stats.inv_sent, 0);
    assert_eq!(stats.memory_data_reads, 0);
    assert_eq!(stats.entry_evictions, 0);
    assert_eq!(stats.mean_get_latency(), 0.0);
    assert_eq!(stats.mean_put_latency(), 0.0);
}

#[rstest]
#[case(Command::Inv)]
#[case(Command::FetchInv)]
#[case(Command::FetchInvX)]
#[case(Command::ForceInv)]
fn every_shootdown_is_counted_together(#[case] cmd: Command) {
    let mut stats = DirStats::default();
    stats.record_received(&EventBuilder::new(cmd, "memory", 0x40).build());
    assert_eq!(stats.shootdowns_received, 1);
}

#[test]
fn received_requests_are_counted_by_command() {
    let mut stats = DirStats::default();
    stats.record_received(&get_s("c0", 0x40));
    stats.record_received(&get_s("c1", 0x40));
    stats.record_received(&EventBuilder::new(Command::PutM, "c0", 0x40).build());
    stats.record_received(&EventBuilder::new(Command::GetSResp, "memory", 0x40).build());
    assert_eq!(stats.get_s_received, 2);
    assert_eq!(stats.put_m_received, 1);
    assert_eq!(stats.get_x_received, 0);
}

#[test]
fn sent_responses_are_counted_by_command() {
    let mut stats = DirStats::default();
    stats.record_sent(&EventBuilder::new(Command::GetXResp, "directory", 0x40).build());
    stats.record_sent(&EventBuilder::new(Command::Inv, "directory", 0x40).build());
    stats.record_sent(&EventBuilder::new(Command::Inv, "directory", 0x80).build());
    stats.record_sent(&EventBuilder::new(Command::UnblockFlush, "directory", 0).build());
    assert_eq!(stats.get_x_resp_sent, 1);
    assert_eq!(stats.inv_sent, 2);
}

#[test]
fn latency_means_separate_requests_from_replacements() {
    let mut stats = DirStats::default();
    stats.record_latency(Command::GetS, 10);
    stats.record_latency(Command::GetX, 20);
    stats.record_latency(Command::PutM, 4);
    stats.record_latency(Command::Inv, 1000);
    assert_eq!(stats.get_completed, 2);
    assert_eq!(stats.put_completed, 1);
    assert!((stats.mean_get_latency() - 15.0).abs() < f64::EPSILON);
    assert!((stats.mean_put_latency() - 4.0).abs() < f64::EPSILON);
}

#[test]
fn printing_selected_sections_does_not_panic() {
    let mut stats = DirStats::default();
    stats.cycles = 100;
    stats.print_sections(&["summary".to_owned(), "memory".to_owned()]);
    stats.print();
}
