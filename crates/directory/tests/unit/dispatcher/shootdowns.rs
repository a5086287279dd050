//! Invalidations and fetches originated by memory.

use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::builder::event::{answer, answer_with_data, get_s, get_x, line, shootdown};
use crate::common::harness::{MEM, TestDirectory};
use dirsim_core::config::DirectoryConfig;
use dirsim_core::protocol::{Command, State};

// ══════════════════════════════════════════════════════════
// 1. Answered without involving caches
// ══════════════════════════════════════════════════════════

#[rstest]
#[case(Command::Inv, Command::AckInv)]
#[case(Command::ForceInv, Command::AckInv)]
#[case(Command::FetchInv, Command::FetchResp)]
#[case(Command::FetchInvX, Command::FetchXResp)]
fn shootdown_for_untracked_line_is_answered_at_once(#[case] cmd: Command, #[case] expected: Command) {
    let mut t = TestDirectory::new();
    let sd = shootdown(cmd, 0x8000);
    t.from_memory(sd.clone());
    let out = t.exchange();
    let resp = out.one_to_memory(expected);
    assert_eq!(resp.response_to, Some(sd.id));
    assert_eq!(resp.dst, MEM);
    assert!(resp.payload.is_empty());
    assert!(out.caches.is_empty());
    assert!(t.dir.entry(0x8000).is_none());
}

#[test]
fn shootdown_during_memory_fetch_is_answered_at_once() {
    let mut t = TestDirectory::new();
    t.from_cache(get_s("c0", 0x1000));
    let _ = t.exchange();
    assert_eq!(t.state(0x1000), State::IS);

    t.from_memory(shootdown(Command::FetchInv, 0x1000));
    let out = t.exchange();
    assert!(out.one_to_memory(Command::FetchResp).payload.is_empty());
    assert_eq!(t.state(0x1000), State::IS);
    assert_eq!(t.dir.mshr().events(0x1000).count(), 1);
}

#[test]
fn downgrade_of_shared_line_keeps_sharers() {
    let mut t = TestDirectory::msi();
    t.share(0x1000, &["c0", "c1"]);

    t.from_memory(shootdown(Command::FetchInvX, 0x1000));
    let out = t.exchange();
    let _ = out.one_to_memory(Command::FetchXResp);
    assert!(out.caches.is_empty());
    assert_eq!(t.sharers(0x1000), vec!["c0", "c1"]);
}

// ══════════════════════════════════════════════════════════
// 2. Shared lines
// ══════════════════════════════════════════════════════════

#[test]
fn invalidation_of_shared_line_collects_every_ack() {
    let mut t = TestDirectory::msi();
    t.share(0x1000, &["c0", "c1"]);

    let sd = shootdown(Command::Inv, 0x1000);
    t.from_memory(sd.clone());
    let out = t.exchange();
    let invs: Vec<_> = out.to_caches(Command::Inv).into_iter().cloned().collect();
    assert_eq!(invs.len(), 2);
    assert_eq!(t.state(0x1000), State::S_Inv);

    t.from_cache(answer(&invs[0], Command::AckInv));
    let out = t.exchange();
    assert!(out.is_empty());

    t.from_cache(answer(&invs[1], Command::AckInv));
    let out = t.exchange();
    let ack = out.one_to_memory(Command::AckInv);
    assert_eq!(ack.response_to, Some(sd.id));
    assert!(t.dir.entry(0x1000).is_none());
    assert!(t.dir.is_idle());
}

#[test]
fn force_invalidation_is_passed_on_to_sharers() {
    let mut t = TestDirectory::msi();
    t.share(0x1000, &["c0"]);

    t.from_memory(shootdown(Command::ForceInv, 0x1000));
    let out = t.exchange();
    let force = out.one_to_cache(Command::ForceInv);
    assert_eq!(force.dst, "c0");

    t.from_cache(answer(&force, Command::AckInv));
    let _ = t.exchange().one_to_memory(Command::AckInv);
}

#[test]
fn shootdown_while_sharer_reads_invalidates_then_fetches() {
    let mut t = TestDirectory::msi();
    t.share(0x1000, &["c0"]);
    t.from_cache(get_s("c1", 0x1000));
    let fetch = t.exchange().one_to_memory(Command::GetS);
    assert_eq!(t.state(0x1000), State::S_D);

    t.from_memory(shootdown(Command::Inv, 0x1000));
    let inv = t.exchange().one_to_cache(Command::Inv);
    assert_eq!(inv.dst, "c0");
    assert_eq!(t.state(0x1000), State::SD_Inv);

    t.from_cache(answer(&inv, Command::AckInv));
    let out = t.exchange();
    let _ = out.one_to_memory(Command::AckInv);
    assert_eq!(t.state(0x1000), State::IS);

    let out = t.memory_data(&fetch, 0x2);
    assert_eq!(out.one_to_cache(Command::GetSResp).dst, "c1");
    assert_eq!(t.sharers(0x1000), vec!["c1"]);
}

// ══════════════════════════════════════════════════════════
// 3. Owned lines
// ══════════════════════════════════════════════════════════

#[test]
fn fetch_inv_returns_owner_data_to_memory() {
    let mut t = TestDirectory::new();
    t.own(0x1000, "c0");

    t.from_memory(shootdown(Command::FetchInv, 0x1000));
    let fetch = t.exchange().one_to_cache(Command::FetchInv);
    assert_eq!(fetch.dst, "c0");
    assert_eq!(t.state(0x1000), State::M_Inv);

    t.from_cache(answer_with_data(&fetch, Command::FetchResp, line(0xD), true));
    let out = t.exchange();
    let resp = out.one_to_memory(Command::FetchResp);
    assert_eq!(resp.payload, line(0xD));
    assert!(resp.dirty);
    assert!(out.to_memory(Command::PutM).is_empty());
    assert!(t.dir.entry(0x1000).is_none());
}

#[test]
fn fetch_inv_x_leaves_owner_sharing() {
    let mut t = TestDirectory::new();
    t.own(0x1000, "c0");

    t.from_memory(shootdown(Command::FetchInvX, 0x1000));
    let fetch = t.exchange().one_to_cache(Command::FetchInvX);
    assert_eq!(t.state(0x1000), State::M_InvX);

    t.from_cache(answer_with_data(&fetch, Command::FetchXResp, line(0xE), true));
    let out = t.exchange();
    let resp = out.one_to_memory(Command::FetchXResp);
    assert_eq!(resp.payload, line(0xE));
    assert_eq!(t.state(0x1000), State::S);
    assert_eq!(t.sharers(0x1000), vec!["c0"]);
    assert_eq!(t.owner(0x1000), None);
}

#[test]
fn force_inv_writes_back_evicted_dirty_data() {
    let mut t = TestDirectory::new();
    t.own(0x1000, "c0");

    t.from_memory(shootdown(Command::ForceInv, 0x1000));
    let force = t.exchange().one_to_cache(Command::ForceInv);

    let mut ack = answer_with_data(&force, Command::AckInv, line(0xF), true);
    ack.evict = true;
    t.from_cache(ack);
    let out = t.exchange();
    assert_eq!(out.one_to_memory(Command::PutM).payload, line(0xF));
    assert!(out.one_to_memory(Command::AckInv).payload.is_empty());
    assert!(t.dir.entry(0x1000).is_none());
}

// ══════════════════════════════════════════════════════════
// 4. Ordering against requests
// ══════════════════════════════════════════════════════════

#[test]
fn shootdown_waits_behind_request_in_flight() {
    let mut t = TestDirectory::new();
    t.own(0x1000, "c0");
    t.from_cache(get_x("c1", 0x1000));
    let fetch = t.exchange().one_to_cache(Command::FetchInv);

    t.from_memory(shootdown(Command::Inv, 0x1000));
    let out = t.exchange();
    assert!(out.is_empty());
    assert_eq!(t.dir.mshr().events(0x1000).count(), 2);

    t.from_cache(answer_with_data(&fetch, Command::FetchResp, line(0x1), true));
    let out = t.exchange();
    assert_eq!(out.one_to_cache(Command::GetXResp).dst, "c1");
    let next = out.one_to_cache(Command::FetchInv);
    assert_eq!(next.dst, "c1");
    assert_eq!(t.state(0x1000), State::M_Inv);
}

#[test]
fn shootdown_jumps_ahead_of_waiting_requests() {
    let mut t = TestDirectory::new();
    t.own(0x1000, "c0");
    t.from_cache(get_x("c1", 0x1000));
    let _ = t.exchange().one_to_cache(Command::FetchInv);
    t.from_cache(get_x("c2", 0x1000));
    let _ = t.exchange();

    t.from_memory(shootdown(Command::Inv, 0x1000));
    let _ = t.exchange();
    let queued: Vec<_> = t.dir.mshr().events(0x1000).map(|e| e.cmd).collect();
    assert_eq!(queued, vec![Command::GetX, Command::Inv, Command::GetX]);
}

#[test]
fn shootdown_is_nacked_when_mshr_is_full() {
    let config = DirectoryConfig {
        mshr_num_entries: Some(1),
        ..DirectoryConfig::default()
    };
    let mut t = TestDirectory::with_config(config, &["c0", "c1"]);
    t.own(0x1000, "c0");
    t.from_cache(get_x("c1", 0x1000));
    let _ = t.exchange().one_to_cache(Command::FetchInv);

    t.from_memory(shootdown(Command::Inv, 0x1000));
    let out = t.exchange();
    let nack = out.one_to_memory(Command::Nack);
    assert_eq!(nack.nacked.as_ref().map(|e| e.cmd), Some(Command::Inv));
    assert_eq!(t.state(0x1000), State::M_Inv);
}
