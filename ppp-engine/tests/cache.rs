//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

mod common;

use ppp_engine::cache::UnitCache;
use ppp_engine::session::TerminateCause;
use ppp_utils::pppdev::PppFd;

use crate::common::{
    LayerLog, StartMode, StubLayer, as_layer, config, new_session, shared,
};

// Sequential sessions adopt the pooled unit of their predecessor, skipping
// the unit allocation ioctl.
#[test]
fn test_sequential_unit_reuse() {
    let log = LayerLog::new();
    let lcp = StubLayer::new("lcp", StartMode::Started, &log);
    let shared = shared(config(2), vec![("lcp", as_layer(&lcp))]);

    let (mut first, _ibus_rx) = new_session(1, &shared);
    first.establish().unwrap();
    let unit_idx = first.info.unit_idx;
    first.terminate(TerminateCause::UserRequest, true);
    assert_eq!(shared.unit_cache.len(), 1);

    for id in 2..=3 {
        let (mut session, _ibus_rx) = new_session(id, &shared);
        session.establish().unwrap();
        assert_eq!(session.info.unit_idx, unit_idx);
        session.terminate(TerminateCause::UserRequest, true);
        assert_eq!(shared.unit_cache.len(), 1);
    }
}

// The pool never exceeds the configured bound; surplus units are closed.
#[test]
fn test_cache_bound() {
    let log = LayerLog::new();
    let lcp = StubLayer::new("lcp", StartMode::Started, &log);
    let shared = shared(config(2), vec![("lcp", as_layer(&lcp))]);

    // Three overlapping sessions allocate three distinct units.
    let mut sessions = Vec::new();
    for id in 1..=3 {
        let (mut session, ibus_rx) = new_session(id, &shared);
        session.establish().unwrap();
        sessions.push((session, ibus_rx));
    }
    let mut unit_idxs: Vec<_> = sessions
        .iter()
        .map(|(session, _)| session.info.unit_idx)
        .collect();
    unit_idxs.dedup();
    assert_eq!(unit_idxs.len(), 3);

    for (session, _) in sessions.iter_mut() {
        session.terminate(TerminateCause::UserRequest, true);
    }
    assert_eq!(shared.unit_cache.len(), 2);

    // A follow-up session adopts a pooled unit and returns it.
    let (mut session, _ibus_rx) = new_session(4, &shared);
    session.establish().unwrap();
    assert!(unit_idxs.contains(&session.info.unit_idx));
    session.terminate(TerminateCause::UserRequest, true);
    assert_eq!(shared.unit_cache.len(), 2);
}

// With the pool disabled, released units are closed instead of cached.
#[test]
fn test_cache_disabled() {
    let log = LayerLog::new();
    let lcp = StubLayer::new("lcp", StartMode::Started, &log);
    let shared = shared(config(0), vec![("lcp", as_layer(&lcp))]);

    let (mut first, _ibus_rx) = new_session(1, &shared);
    first.establish().unwrap();
    let unit_idx = first.info.unit_idx;
    first.terminate(TerminateCause::UserRequest, true);
    assert!(shared.unit_cache.is_empty());

    // The next session can't reuse anything.
    let (mut second, _ibus_rx) = new_session(2, &shared);
    second.establish().unwrap();
    assert_ne!(second.info.unit_idx, unit_idx);
}

#[test]
fn test_unit_cache_operations() {
    let cache = UnitCache::default();

    // A zero bound disables both directions.
    assert!(cache.try_take(0).is_none());
    assert!(!cache.try_put(PppFd::open_mux().unwrap(), 10, 0));
    assert!(cache.is_empty());

    assert!(cache.try_put(PppFd::open_mux().unwrap(), 11, 2));
    assert!(cache.try_put(PppFd::open_mux().unwrap(), 12, 2));
    assert!(!cache.try_put(PppFd::open_mux().unwrap(), 13, 2));
    assert_eq!(cache.len(), 2);

    // Taking hands back the most recently pooled unit first.
    let (_fd, unit_idx) = cache.try_take(2).unwrap();
    assert_eq!(unit_idx, 12);
    assert_eq!(cache.len(), 1);
}
