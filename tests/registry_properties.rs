//! Properties of the counting registry and node directory under arbitrary
//! operation sequences.

use proptest::prelude::*;

use session_coordinator::registry::{NodeDirectory, NodeKey, SessionCoordinator};
use session_coordinator::NodeOutcome;

#[derive(Debug, Clone)]
enum CounterOp {
    Increase,
    Decrease,
    Reset,
}

fn counter_op() -> impl Strategy<Value = CounterOp> {
    prop_oneof![
        3 => Just(CounterOp::Increase),
        3 => Just(CounterOp::Decrease),
        1 => Just(CounterOp::Reset),
    ]
}

fn node_url() -> impl Strategy<Value = String> {
    let port = prop::option::of(prop_oneof![4440u16..4443, Just(80u16), Just(443u16)]);
    (prop_oneof![Just("http"), Just("https")], "[a-c]", port).prop_map(|(scheme, host, port)| {
        match port {
            Some(port) => format!("{scheme}://{host}.test:{port}"),
            None => format!("{scheme}://{host}.test"),
        }
    })
}

proptest! {
    /// Property: the pending count is the running sum of +1/-1 floored at zero
    #[test]
    fn pending_count_is_floored_running_sum(ops in prop::collection::vec(counter_op(), 0..64)) {
        let coordinator = SessionCoordinator::new();
        let mut expected: u32 = 0;
        for op in &ops {
            match op {
                CounterOp::Increase => {
                    expected += 1;
                    prop_assert_eq!(coordinator.add_pending(), expected);
                }
                CounterOp::Decrease => {
                    expected = expected.saturating_sub(1);
                    prop_assert_eq!(coordinator.remove_pending(), expected);
                }
                CounterOp::Reset => {
                    expected = 0;
                    coordinator.reset_pending();
                }
            }
        }
        prop_assert_eq!(coordinator.pending_count(), expected);
    }

    /// Property: per-node counts are tracked independently and never go negative
    #[test]
    fn session_counts_are_independent_per_node(
        ops in prop::collection::vec((0usize..3, counter_op()), 0..64)
    ) {
        let keys = [
            NodeKey::new("a.test", 4444),
            NodeKey::new("b.test", 4444),
            NodeKey::new("a.test", 5555),
        ];
        let coordinator = SessionCoordinator::new();
        let mut expected = [0u32; 3];

        for (index, op) in &ops {
            let key = &keys[*index];
            match op {
                CounterOp::Increase => expected[*index] += 1,
                CounterOp::Decrease => expected[*index] = expected[*index].saturating_sub(1),
                CounterOp::Reset => expected[*index] = 0,
            }
            match op {
                CounterOp::Increase => { coordinator.add_session(key); }
                CounterOp::Decrease => { coordinator.remove_session(key); }
                CounterOp::Reset => coordinator.reset_sessions(key),
            }
        }

        for (index, key) in keys.iter().enumerate() {
            prop_assert_eq!(coordinator.session_count(key), expected[index]);
        }
    }

    /// Property: the directory never holds two equal identities
    #[test]
    fn node_directory_has_no_duplicates(urls in prop::collection::vec(node_url(), 0..32)) {
        let mut directory = NodeDirectory::new();
        for url in &urls {
            let before = directory.len();
            match directory.add(url) {
                NodeOutcome::Applied => prop_assert_eq!(directory.len(), before + 1),
                NodeOutcome::Unchanged => prop_assert_eq!(directory.len(), before),
                NodeOutcome::Invalid => prop_assert!(false, "{} should parse", url),
            }
        }

        let listed = directory.list();
        let mut deduped = listed.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(listed.len(), deduped.len());
    }

    /// Property: a written port is kept even when it is the scheme default,
    /// so the same host with and without it are two nodes
    #[test]
    fn written_default_port_is_a_distinct_node(
        host in "[a-z]{1,8}",
        (scheme, port) in prop_oneof![Just(("http", 80u16)), Just(("https", 443u16))],
    ) {
        let explicit = format!("{scheme}://{host}.test:{port}");
        let implicit = format!("{scheme}://{host}.test");

        let mut directory = NodeDirectory::new();
        prop_assert_eq!(directory.add(&explicit), NodeOutcome::Applied);
        prop_assert_eq!(directory.add(&implicit), NodeOutcome::Applied);
        prop_assert_eq!(
            directory.list(),
            vec![format!("{host}.test:{port}"), format!("{host}.test:-1")]
        );
    }

    /// Property: removing an absent node leaves the directory untouched
    #[test]
    fn removing_absent_node_is_a_no_op(
        urls in prop::collection::vec(node_url(), 0..16),
        port in 6000u16..7000,
    ) {
        let mut directory = NodeDirectory::new();
        for url in &urls {
            directory.add(url);
        }
        let before = directory.list();

        let absent = format!("http://absent.test:{port}");
        prop_assert_eq!(directory.remove(&absent), NodeOutcome::Unchanged);
        prop_assert_eq!(directory.list(), before);
    }
}
