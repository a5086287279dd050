//! End-to-end request flows.
//!
//! Each test plays the caches and memory by hand: inject an event, let the
//! directory settle, inspect what it sent, answer, and check the final line
//! state.

use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::builder::event::{
    EventBuilder, answer, answer_with_data, flush_all, get_s, get_x, line, put_e, put_m, put_s,
};
use crate::common::harness::{MEM, TestDirectory};
use dirsim_core::config::{CoherenceProtocol, DirectoryConfig};
use dirsim_core::protocol::{Command, FlushState, MemFlags, State};

// ══════════════════════════════════════════════════════════
// 1. Reads
// ══════════════════════════════════════════════════════════

#[test]
fn read_miss_with_spilled_entry_reloads_then_fetches() {
    let config = DirectoryConfig {
        protocol: CoherenceProtocol::Msi,
        load_new_entries: true,
        ..DirectoryConfig::default()
    };
    let mut t = TestDirectory::with_config(config, &["c0", "c1", "c2"]);

    t.from_cache(get_s("c0", 0x1000));
    let out = t.exchange();
    let reload = out.one_to_memory(Command::GetS);
    assert_eq!(reload.addr, 0, "entry reads use the spill address");
    assert_eq!(reload.size, 4);
    assert_eq!(reload.dst, MEM);
    assert_eq!(t.state(0x1000), State::I_d);
    assert!(out.caches.is_empty());

    let out = t.memory_data(&reload, 0);
    let fetch = out.one_to_memory(Command::GetS);
    assert_eq!(fetch.addr, 0x1000);
    assert_eq!(fetch.size, 64);
    assert_eq!(t.state(0x1000), State::IS);

    let out = t.memory_data(&fetch, 0x5A);
    let resp = out.one_to_cache(Command::GetSResp);
    assert_eq!(resp.dst, "c0");
    assert_eq!(resp.payload, line(0x5A));
    assert_eq!(t.state(0x1000), State::S);
    assert_eq!(t.sharers(0x1000), vec!["c0"]);
    assert_eq!(t.dir.stats().memory_entry_reads, 1);
    assert!(t.dir.is_idle());
}

#[test]
fn mesi_read_of_unshared_line_is_granted_exclusive() {
    let mut t = TestDirectory::new();
    t.from_cache(get_s("c0", 0x1000));
    let fetch = t.exchange().one_to_memory(Command::GetS);

    let out = t.memory_data(&fetch, 0x33);
    let resp = out.one_to_cache(Command::GetXResp);
    assert_eq!(resp.dst, "c0");
    assert!(!resp.dirty);
    assert_eq!(t.state(0x1000), State::M);
    assert_eq!(t.owner(0x1000).as_deref(), Some("c0"));
    assert!(t.sharers(0x1000).is_empty());
}

#[test]
fn read_of_owned_line_downgrades_owner_and_writes_back() {
    let mut t = TestDirectory::new();
    t.own(0x1000, "c0");

    t.from_cache(get_s("c1", 0x1000));
    let out = t.exchange();
    let fetch = out.one_to_cache(Command::FetchInvX);
    assert_eq!(fetch.dst, "c0");
    assert_eq!(t.state(0x1000), State::M_InvX);

    t.from_cache(answer_with_data(&fetch, Command::FetchXResp, line(0x5A), true));
    let out = t.exchange();
    let wb = out.one_to_memory(Command::PutM);
    assert_eq!(wb.payload, line(0x5A));
    let resp = out.one_to_cache(Command::GetSResp);
    assert_eq!(resp.dst, "c1");
    assert_eq!(resp.payload, line(0x5A));
    assert_eq!(t.state(0x1000), State::S);
    assert_eq!(t.sharers(0x1000), vec!["c0", "c1"]);
    assert_eq!(t.owner(0x1000), None);
}

#[test]
fn second_reader_fetches_from_memory_in_s_d() {
    let mut t = TestDirectory::msi();
    t.share(0x1000, &["c0"]);

    t.from_cache(get_s("c1", 0x1000));
    let out = t.exchange();
    let fetch = out.one_to_memory(Command::GetS);
    assert_eq!(t.state(0x1000), State::S_D);

    let out = t.memory_data(&fetch, 0x44);
    assert_eq!(out.one_to_cache(Command::GetSResp).dst, "c1");
    assert_eq!(t.sharers(0x1000), vec!["c0", "c1"]);
}

// ══════════════════════════════════════════════════════════
// 2. Upgrades and exclusive requests
// ══════════════════════════════════════════════════════════

#[test]
fn upgrade_invalidates_other_sharer() {
    let mut t = TestDirectory::msi();
    t.share(0x1000, &["c0", "c1"]);

    t.from_cache(get_x("c0", 0x1000));
    let out = t.exchange();
    let inv = out.one_to_cache(Command::Inv);
    assert_eq!(inv.dst, "c1");
    assert!(out.memory.is_empty());
    assert_eq!(t.state(0x1000), State::S_Inv);

    t.from_cache(answer(&inv, Command::AckInv));
    let out = t.exchange();
    let resp = out.one_to_cache(Command::GetXResp);
    assert_eq!(resp.dst, "c0");
    assert!(resp.payload.is_empty(), "an upgrading sharer already holds the data");
    assert_eq!(t.state(0x1000), State::M);
    assert_eq!(t.owner(0x1000).as_deref(), Some("c0"));
    assert!(t.sharers(0x1000).is_empty());
    assert!(t.dir.is_idle());
}

#[test]
fn sole_sharer_upgrade_is_granted_immediately() {
    let mut t = TestDirectory::msi();
    t.share(0x1000, &["c0"]);

    t.from_cache(get_x("c0", 0x1000));
    let out = t.exchange();
    assert_eq!(out.one_to_cache(Command::GetXResp).dst, "c0");
    assert!(out.to_caches(Command::Inv).is_empty());
    assert_eq!(t.state(0x1000), State::M);
}

#[rstest]
#[case(2)]
#[case(3)]
#[case(4)]
fn upgrade_sends_one_invalidation_per_other_sharer(#[case] sharers: usize) {
    let names = ["c0", "c1", "c2", "c3"];
    let mut t = TestDirectory::msi();
    t.share(0x2000, &names[..sharers]);

    t.from_cache(get_x("c0", 0x2000));
    let out = t.exchange();
    let invs = out.to_caches(Command::Inv);
    assert_eq!(invs.len(), sharers - 1);
    assert!(invs.iter().all(|inv| inv.dst != "c0"));
    assert_eq!(t.dir.mshr().acks_needed(0x2000), (sharers - 1) as u32);

    let acks: Vec<_> = invs.iter().map(|inv| answer(inv, Command::AckInv)).collect();
    for ack in acks {
        t.from_cache(ack);
    }
    let out = t.exchange();
    assert_eq!(out.one_to_cache(Command::GetXResp).dst, "c0");
    assert_eq!(t.state(0x2000), State::M);
}

#[test]
fn exclusive_request_from_non_sharer_fetches_data_while_invalidating() {
    let mut t = TestDirectory::msi();
    t.share(0x1000, &["c0"]);

    t.from_cache(get_x("c1", 0x1000));
    let out = t.exchange();
    let inv = out.one_to_cache(Command::Inv);
    let fetch = out.one_to_memory(Command::GetX);
    assert_eq!(t.state(0x1000), State::SM_Inv);

    // Data first: parked until the ack arrives.
    let out = t.memory_data(&fetch, 0x66);
    assert!(out.caches.is_empty());
    assert_eq!(t.state(0x1000), State::SM_Inv);

    t.from_cache(answer(&inv, Command::AckInv));
    let out = t.exchange();
    let resp = out.one_to_cache(Command::GetXResp);
    assert_eq!(resp.dst, "c1");
    assert_eq!(resp.payload, line(0x66));
    assert_eq!(t.owner(0x1000).as_deref(), Some("c1"));
}

#[test]
fn exclusive_request_for_owned_line_moves_ownership() {
    let mut t = TestDirectory::new();
    t.own(0x1000, "c0");

    t.from_cache(get_x("c1", 0x1000));
    let fetch = t.exchange().one_to_cache(Command::FetchInv);
    assert_eq!(fetch.dst, "c0");
    assert_eq!(t.state(0x1000), State::M_Inv);

    t.from_cache(answer_with_data(&fetch, Command::FetchResp, line(0x77), true));
    let out = t.exchange();
    let resp = out.one_to_cache(Command::GetXResp);
    assert_eq!(resp.dst, "c1");
    assert_eq!(resp.payload, line(0x77));
    assert!(resp.dirty);
    assert!(out.memory.is_empty(), "dirty data moves to the new owner");
    assert_eq!(t.owner(0x1000).as_deref(), Some("c1"));
}

// ══════════════════════════════════════════════════════════
// 3. MSHR pressure
// ══════════════════════════════════════════════════════════

#[test]
fn full_mshr_nacks_without_touching_state() {
    let config = DirectoryConfig {
        mshr_num_entries: Some(1),
        ..DirectoryConfig::default()
    };
    let mut t = TestDirectory::with_config(config, &["c0", "c1"]);

    t.from_cache(get_x("c0", 0x2000));
    let out = t.exchange();
    let _ = out.one_to_memory(Command::GetX);
    assert_eq!(t.state(0x2000), State::IM);

    t.from_cache(get_s("c1", 0x2000));
    let out = t.exchange();
    let nack = out.one_to_cache(Command::Nack);
    assert_eq!(nack.dst, "c1");
    assert_eq!(nack.nacked.as_ref().map(|e| e.cmd), Some(Command::GetS));
    assert!(out.memory.is_empty());
    assert_eq!(t.state(0x2000), State::IM);
    assert_eq!(t.dir.mshr().size(), 1);
    assert_eq!(t.dir.stats().nack_sent, 1);
}

#[test]
fn queued_requests_are_served_in_arrival_order() {
    let mut t = TestDirectory::msi();
    t.from_cache(get_s("c0", 0x3000));
    let fetch = t.exchange().one_to_memory(Command::GetS);

    t.from_cache(get_s("c1", 0x3000));
    t.from_cache(get_x("c2", 0x3000));
    let out = t.exchange();
    assert!(out.is_empty(), "later requests wait behind the head");
    assert_eq!(t.dir.mshr().events(0x3000).count(), 3);

    let out = t.memory_data(&fetch, 0x10);
    assert_eq!(out.one_to_cache(Command::GetSResp).dst, "c0");
    let second = out.one_to_memory(Command::GetS);

    let out = t.memory_data(&second, 0x10);
    assert_eq!(out.one_to_cache(Command::GetSResp).dst, "c1");
    let inv_count = out.to_caches(Command::Inv).len();
    assert_eq!(inv_count, 2, "the GetX from c2 invalidates both readers");
    assert_eq!(t.state(0x3000), State::SM_Inv);
}

// ══════════════════════════════════════════════════════════
// 4. Replacements
// ══════════════════════════════════════════════════════════

#[test]
fn dirty_eviction_writes_back_and_drops_entry() {
    let mut t = TestDirectory::new();
    t.own(0x3000, "c2");

    t.from_cache(put_m("c2", 0x3000, 0xAB));
    let out = t.exchange();
    let wb = out.one_to_memory(Command::PutM);
    assert_eq!(wb.payload, line(0xAB));
    assert!(wb.dirty);
    assert!(wb.flags.contains(MemFlags::NO_RESPONSE));
    assert_eq!(out.one_to_cache(Command::AckPut).dst, "c2");
    assert_eq!(t.state(0x3000), State::I);
    assert!(t.dir.entry(0x3000).is_none());
    assert!(t.dir.is_idle());
}

#[test]
fn clean_exclusive_eviction_sends_no_data() {
    let mut t = TestDirectory::new();
    t.own(0x3000, "c1");

    t.from_cache(put_e("c1", 0x3000));
    let out = t.exchange();
    assert!(out.memory.is_empty());
    assert_eq!(out.one_to_cache(Command::AckPut).dst, "c1");
    assert!(t.dir.entry(0x3000).is_none());
}

#[test]
fn last_sharer_eviction_returns_line_to_invalid() {
    let mut t = TestDirectory::msi();
    t.share(0x3000, &["c0", "c1"]);

    t.from_cache(put_s("c0", 0x3000));
    let out = t.exchange();
    assert_eq!(out.one_to_cache(Command::AckPut).dst, "c0");
    assert_eq!(t.state(0x3000), State::S);
    assert_eq!(t.sharers(0x3000), vec!["c1"]);

    t.from_cache(put_s("c1", 0x3000));
    let _ = t.exchange();
    assert!(t.dir.entry(0x3000).is_none());
    assert!(t.dir.store().is_empty());
}

#[test]
fn put_x_downgrades_owner_to_sharer() {
    let mut t = TestDirectory::new();
    t.own(0x3000, "c0");

    let putx = EventBuilder::new(Command::PutX, "c0", 0x3000)
        .payload(line(0x9))
        .dirty()
        .build();
    t.from_cache(putx);
    let out = t.exchange();
    assert_eq!(out.one_to_memory(Command::PutM).payload, line(0x9));
    assert_eq!(out.one_to_cache(Command::AckPut).dst, "c0");
    assert_eq!(t.state(0x3000), State::S);
    assert_eq!(t.sharers(0x3000), vec!["c0"]);
}

// ══════════════════════════════════════════════════════════
// 5. Whole-cache flush
// ══════════════════════════════════════════════════════════

#[test]
fn flush_all_completes_after_every_source_acks() {
    let mut t = TestDirectory::with_config(DirectoryConfig::default(), &["c0", "c1"]);

    t.from_cache(flush_all("c0"));
    let out = t.exchange();
    let forwards = out.to_caches(Command::ForwardFlush);
    assert_eq!(forwards.len(), 2);
    let mut targets: Vec<_> = forwards.iter().map(|f| f.dst.as_str()).collect();
    targets.sort_unstable();
    assert_eq!(targets, vec!["c0", "c1"]);
    assert_eq!(t.dir.flush_state(), FlushState::Forward);

    let acks: Vec<_> = forwards.iter().map(|f| answer(f, Command::AckFlush)).collect();
    t.from_cache(acks[0].clone());
    let out = t.exchange();
    assert!(out.is_empty(), "one source is still flushing");
    assert_eq!(t.dir.mshr().flush_count(), 1);

    t.from_cache(acks[1].clone());
    let out = t.exchange();
    assert_eq!(out.one_to_cache(Command::FlushAllResp).dst, "c0");
    assert_eq!(out.to_caches(Command::UnblockFlush).len(), 2);
    assert_eq!(t.dir.flush_state(), FlushState::Ready);
    assert!(t.dir.is_idle());
}

#[test]
fn second_flush_waits_for_the_first() {
    let mut t = TestDirectory::with_config(DirectoryConfig::default(), &["c0"]);

    t.from_cache(flush_all("c0"));
    let first = t.exchange().one_to_cache(Command::ForwardFlush);
    let queued = flush_all("c0");
    let queued_id = queued.id;
    t.from_cache(queued);
    let out = t.exchange();
    assert!(out.is_empty());
    assert!(t.dir.mshr().flush_contains(queued_id));

    t.from_cache(answer(&first, Command::AckFlush));
    let out = t.exchange();
    assert_eq!(out.one_to_cache(Command::FlushAllResp).dst, "c0");
    assert_eq!(out.one_to_cache(Command::UnblockFlush).dst, "c0");
    assert_eq!(out.one_to_cache(Command::ForwardFlush).dst, "c0");
    assert_eq!(t.dir.flush_state(), FlushState::Forward);
}

// ══════════════════════════════════════════════════════════
// 6. Non-cacheable accesses
// ══════════════════════════════════════════════════════════

#[test]
fn noncacheable_read_bypasses_the_directory_state() {
    let mut t = TestDirectory::new();
    let read = EventBuilder::new(Command::GetS, "c0", 0x4010)
        .noncacheable()
        .size(8)
        .build();
    t.from_cache(read);
    let out = t.exchange();
    let fwd = out.one_to_memory(Command::GetS);
    assert_eq!(fwd.addr, 0x4010);
    assert_eq!(fwd.size, 8);
    assert!(fwd.flags.contains(MemFlags::NONCACHEABLE));
    assert!(t.dir.entry(0x4000).is_none());

    t.from_memory(answer_with_data(&fwd, Command::GetSResp, vec![9; 8], false));
    let out = t.exchange();
    let resp = out.one_to_cache(Command::GetSResp);
    assert_eq!(resp.dst, "c0");
    assert_eq!(resp.payload, vec![9; 8]);
    assert!(t.dir.entry(0x4000).is_none());
    assert_eq!(t.dir.stats().noncacheable_forwarded, 1);
    assert!(t.dir.is_idle());
}
