//! Integration tests for edge search
//!
//! These tests validate edge queries against a brute-force reference:
//! - Runs of every interesting length across word and block boundaries
//! - Granular searches that may stop at a summary window
//! - Display edges for a zoomed-out view
//! - Random signals compared index by index

mod common;

use common::builders::{CaptureBuilder, Signal};
use common::{brute_next_edge, brute_prev_edge};
use logicstore_rs::capture::encode::ReplayStream;
use logicstore_rs::store::{LEAF_BLOCK_SAMPLES, ROOT_NODE_SAMPLES};
use logicstore_rs::{EdgeKind, LogicSnapshot, ReplaySettings, StoreError, ToggleHint};
use proptest::prelude::*;

const L: u64 = LEAF_BLOCK_SAMPLES;

#[test]
fn test_adjacent_edges() {
    let snapshot = CaptureBuilder::new()
        .channel(0, Signal::edges_at(false, &[1, 2, 3, 63, 64, 65], 200))
        .build();
    for (from, expected) in [(0, 1), (1, 1), (2, 2), (3, 3), (4, 63), (64, 64), (65, 65)] {
        assert_eq!(
            snapshot.next_edge(0, from, 199, 0).unwrap(),
            Some(expected),
            "next edge from {}",
            from
        );
    }
    assert_eq!(snapshot.next_edge(0, 66, 199, 0).unwrap(), None);
    assert_eq!(snapshot.prev_edge(0, 199, 0).unwrap(), Some(65));
    assert_eq!(snapshot.prev_edge(0, 62, 0).unwrap(), Some(3));
    assert_eq!(snapshot.prev_edge(0, 1, 0).unwrap(), Some(1));
    assert_eq!(snapshot.prev_edge(0, 0, 0).unwrap(), None);
}

#[test]
fn test_runs_across_word_and_block_boundaries() {
    let runs = [1, 63, 64, 65, L - 1, L, L + 1, 3 * L];
    let start = L - 1_000;
    let len = start + 3 * L + 5_000;

    let mut builder = CaptureBuilder::new().chunk_bytes(1 << 16);
    for (id, run) in runs.iter().enumerate() {
        builder = builder.channel(id as u16, Signal::edges_at(false, &[start, start + run], len));
    }
    let snapshot = builder.build();
    let last = len - 1;

    for (id, run) in runs.iter().enumerate() {
        let id = id as u16;
        let end = start + run;
        assert_eq!(snapshot.next_edge(id, 0, last, 0).unwrap(), Some(start), "run {}", run);
        assert_eq!(snapshot.next_edge(id, start + 1, last, 0).unwrap(), Some(end), "run {}", run);
        assert_eq!(snapshot.next_edge(id, end + 1, last, 0).unwrap(), None, "run {}", run);
        assert_eq!(snapshot.next_edge(id, start + 1, end - 1, 0).unwrap(), None, "run {}", run);

        assert_eq!(snapshot.prev_edge(id, last, 0).unwrap(), Some(end), "run {}", run);
        assert_eq!(snapshot.prev_edge(id, end - 1, 0).unwrap(), Some(start), "run {}", run);
        assert_eq!(snapshot.prev_edge(id, start - 1, 0).unwrap(), None, "run {}", run);

        assert!(snapshot.sample_at(id, start).unwrap());
        assert!(snapshot.sample_at(id, end - 1).unwrap());
        assert!(!snapshot.sample_at(id, end).unwrap());
    }
}

#[test]
fn test_edges_on_compacted_block_boundaries() {
    let len = 3 * L + 100;
    let snapshot = CaptureBuilder::new()
        .channel(0, Signal::edges_at(false, &[L], len))
        .channel(1, Signal::edges_at(true, &[2 * L - 1, 2 * L + 1], len))
        .chunk_bytes(1 << 16)
        .build();

    // channel 0 is constant on both sides of the edge
    assert_eq!(snapshot.next_edge(0, 0, len - 1, 0).unwrap(), Some(L));
    assert_eq!(snapshot.next_edge(0, L + 1, len - 1, 0).unwrap(), None);
    assert_eq!(snapshot.prev_edge(0, len - 1, 0).unwrap(), Some(L));
    assert_eq!(snapshot.prev_edge(0, L - 1, 0).unwrap(), None);

    assert_eq!(snapshot.next_edge(1, 0, len - 1, 0).unwrap(), Some(2 * L - 1));
    assert_eq!(snapshot.next_edge(1, 2 * L, len - 1, 0).unwrap(), Some(2 * L + 1));
    assert_eq!(snapshot.prev_edge(1, 2 * L, 0).unwrap(), Some(2 * L - 1));
    assert_eq!(snapshot.prev_edge(1, len - 1, 0).unwrap(), Some(2 * L + 1));
}

#[test]
fn test_edges_across_root_node_boundary() {
    let len = ROOT_NODE_SAMPLES + L;
    let edges = [ROOT_NODE_SAMPLES - 1, ROOT_NODE_SAMPLES, ROOT_NODE_SAMPLES + 70];
    let snapshot = CaptureBuilder::new()
        .channel(0, Signal::edges_at(false, &edges, len))
        .channel(1, Signal::edges_at(false, &[ROOT_NODE_SAMPLES], len))
        .chunk_bytes(1 << 20)
        .build();
    let last = len - 1;

    assert_eq!(snapshot.next_edge(0, 0, last, 0).unwrap(), Some(edges[0]));
    assert_eq!(snapshot.next_edge(0, edges[0] + 1, last, 0).unwrap(), Some(edges[1]));
    assert_eq!(snapshot.next_edge(0, edges[1] + 1, last, 0).unwrap(), Some(edges[2]));
    assert_eq!(snapshot.prev_edge(0, last, 0).unwrap(), Some(edges[2]));
    assert_eq!(snapshot.prev_edge(0, edges[2] - 1, 0).unwrap(), Some(edges[1]));

    // an edge that exists only between two compacted root nodes
    assert_eq!(snapshot.next_edge(1, 1, last, 0).unwrap(), Some(ROOT_NODE_SAMPLES));
    assert_eq!(snapshot.prev_edge(1, last, 0).unwrap(), Some(ROOT_NODE_SAMPLES));
    assert_eq!(snapshot.prev_edge(1, ROOT_NODE_SAMPLES - 1, 0).unwrap(), None);
}

#[test]
fn test_granular_search_brackets_exact_edge() {
    let len = 2 * L;
    let edges = [5_000, 300_001, 1_500_000, L + 77];
    let snapshot = CaptureBuilder::new()
        .channel(0, Signal::edges_at(false, &edges, len))
        .chunk_bytes(1 << 16)
        .build();

    for granularity in [0u64, 1, 64, 100, 4_096, 50_000, 262_144, 1 << 20] {
        let mut from = 0;
        for &exact in &edges {
            let found = snapshot
                .next_edge(0, from, len - 1, granularity)
                .unwrap()
                .expect("edge expected");
            assert!(found >= from && found <= exact, "g={} found={} exact={}", granularity, found, exact);
            // either the window holding `from` also holds an earlier edge,
            // or the window found holds the exact edge
            assert!(
                found == from || exact - found < granularity.max(1),
                "g={} found={} exact={}",
                granularity,
                found,
                exact
            );
            from = exact + 1;
        }

        let back = snapshot.prev_edge(0, len - 1, granularity).unwrap().expect("edge expected");
        let exact = edges[3];
        assert!(back >= exact && back - exact < granularity.max(1), "g={} back={}", granularity, back);
    }
}

#[test]
fn test_replay_scenario_two_channels() {
    let settings = ReplaySettings::default();
    let snapshot = LogicSnapshot::new();
    snapshot.first_payload(&settings.capture).unwrap();
    for chunk in ReplayStream::new(&settings) {
        snapshot.append_payload(&chunk).unwrap();
    }
    snapshot.capture_ended().unwrap();

    assert_eq!(snapshot.written_samples(), 1_000_000);
    assert_eq!(snapshot.next_edge(0, 0, 999_999, 0).unwrap(), Some(500_000));
    assert_eq!(snapshot.prev_edge(0, 999_999, 0).unwrap(), Some(500_000));

    let view = snapshot.display_edges(1, 0, 999_999, 100, 8, 10_000).unwrap();
    assert_eq!(view.columns(), 100);
    assert_eq!(view.toggles.len(), 8);
    assert_eq!(view.toggles[0], ToggleHint { pixel: 0, sample: 3 });
    assert_eq!(view.toggles[1], ToggleHint { pixel: 1, sample: 10_002 });
    assert!(view.is_busy(7));

    let step = snapshot.display_edges(0, 0, 999_999, 100, 8, 10_000).unwrap();
    assert_eq!(step.columns(), 100);
    assert!(step.toggles.is_empty());
    assert!(step.levels[..50].iter().all(|level| !level));
    assert!(step.levels[50..].iter().all(|level| *level));
}

#[test]
fn test_display_edges_edge_cases() {
    let snapshot = CaptureBuilder::new()
        .channel(0, Signal::toggling(10, 1_000))
        .build();

    // fewer samples than pixels
    let view = snapshot.display_edges(0, 0, 999, 5_000, 4, 1).unwrap();
    assert_eq!(view.columns(), 1_000);
    for (i, level) in view.levels.iter().enumerate() {
        assert_eq!(*level, (i / 10) % 2 == 1);
    }
    assert!(view.toggles.is_empty());

    // zero width or an empty range
    assert_eq!(snapshot.display_edges(0, 0, 999, 0, 4, 1).unwrap().columns(), 0);
    assert_eq!(snapshot.display_edges(0, 2_000, 3_000, 10, 4, 1).unwrap().columns(), 0);

    // a column wider than the address space collapses the view to one column
    let wide = snapshot.display_edges(0, 5, 600, 10, 4, u64::MAX).unwrap();
    assert_eq!(wide.columns(), 1);
    assert_eq!(wide.levels, vec![false]);
    assert_eq!(wide.toggles, vec![ToggleHint { pixel: 0, sample: 10 }]);

    let empty = LogicSnapshot::new();
    empty
        .first_payload(&logicstore_rs::CaptureConfig::new(vec![0], 100, false))
        .unwrap();
    assert_eq!(empty.display_edges(0, 0, 99, 10, 4, 10).unwrap().columns(), 0);
    assert_eq!(empty.next_edge(0, 0, 99, 0).unwrap(), None);
}

#[test]
fn test_edge_lists_and_min_pulse() {
    let snapshot = CaptureBuilder::new()
        .channel(0, Signal::edges_at(false, &[10, 15, 100, 103, 500], 1_000))
        .build();

    let all = snapshot.edges(0, 0, 999, EdgeKind::Any).unwrap();
    assert_eq!(
        all.iter().map(|e| e.index).collect::<Vec<_>>(),
        vec![10, 15, 100, 103, 500]
    );
    let rising = snapshot.edges(0, 0, 999, EdgeKind::Rising).unwrap();
    assert_eq!(
        rising.iter().map(|e| e.index).collect::<Vec<_>>(),
        vec![10, 100, 500]
    );
    assert!(rising.iter().all(|e| e.kind() == EdgeKind::Rising));
    let falling = snapshot.edges(0, 11, 200, EdgeKind::Falling).unwrap();
    assert_eq!(falling.len(), 2);

    assert_eq!(snapshot.min_pulse(0, 0, 999).unwrap(), 3);
    assert_eq!(snapshot.min_pulse(0, 0, 99).unwrap(), 5);
}

#[test]
fn test_unknown_channel() {
    let snapshot = CaptureBuilder::new()
        .channel(0, Signal::constant(false, 64))
        .build();
    assert!(matches!(
        snapshot.next_edge(9, 0, 63, 0),
        Err(StoreError::UnknownChannel(9))
    ));
    assert!(matches!(
        snapshot.prev_edge(9, 63, 0),
        Err(StoreError::UnknownChannel(9))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_edges_match_brute_force(
        initial in any::<bool>(),
        edges in prop::collection::vec(1u64..5_000, 0..40),
        len in 1u64..5_000,
        from in 0u64..5_000,
        span in 0u64..5_000,
    ) {
        let signal = Signal::edges_at(initial, &edges, len);
        let snapshot = CaptureBuilder::new()
            .channel(0, signal.clone())
            .chunk_bytes(24)
            .build();
        let last = len - 1;
        let to = (from + span).min(last);
        let level = |i: u64| signal.level(i);

        prop_assert_eq!(
            snapshot.next_edge(0, from, from + span, 0).unwrap(),
            brute_next_edge(level, from, to)
        );
        prop_assert_eq!(
            snapshot.prev_edge(0, from, 0).unwrap(),
            brute_prev_edge(level, from.min(last))
        );
    }
}
