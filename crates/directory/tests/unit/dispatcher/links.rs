//! Controllers wired to `mockall` links.

use std::sync::{Arc, Mutex};

use mockall::predicate::eq;

use crate::common::builder::event::get_s;
use crate::common::mocks::link::MockLink;
use dirsim_core::DirectoryController;
use dirsim_core::config::DirectoryConfig;
use dirsim_core::protocol::{Command, MemEvent};

fn quiet_link(sources: Vec<String>) -> MockLink {
    let mut link = MockLink::new();
    link.expect_sources().return_const(sources);
    link.expect_find_target_destination().return_const("memory".to_owned());
    link.expect_status().return_const(String::new());
    link
}

#[test]
fn idle_directory_clocks_links_and_sends_nothing() {
    let mut cpu = quiet_link(vec!["c0".to_owned(), "c1".to_owned()]);
    cpu.expect_clock().with(eq(1)).times(1).return_const(());
    cpu.expect_clock().with(eq(2)).times(1).return_const(());
    cpu.expect_recv().times(2).returning(|| None);
    cpu.expect_send().never();

    let mut dir = DirectoryController::new(DirectoryConfig::default(), Box::new(cpu), None).unwrap();
    assert_eq!(dir.sources(), ["c0", "c1"]);
    assert!(dir.tick().unwrap());
    assert!(dir.tick().unwrap());
    assert_eq!(dir.timestamp(), 2);
}

#[test]
fn memory_traffic_uses_cache_link_without_memory_link() {
    let mut cpu = quiet_link(Vec::new());
    cpu.expect_clock().return_const(());
    let mut pending = Some(get_s("c0", 0x1044));
    cpu.expect_recv().returning(move || pending.take());

    let sent: Arc<Mutex<Vec<MemEvent>>> = Arc::default();
    let record = Arc::clone(&sent);
    cpu.expect_send()
        .times(1)
        .returning(move |event| record.lock().unwrap().push(event));

    let mut dir = DirectoryController::new(DirectoryConfig::default(), Box::new(cpu), None).unwrap();
    for _ in 0..3 {
        let _ = dir.tick().unwrap();
    }

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].cmd, Command::GetS);
    assert_eq!(sent[0].dst, "memory");
    assert_eq!(sent[0].addr, 0x1040, "the line base is fetched");
}
