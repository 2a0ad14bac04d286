//! Property tests over random write/rotate schedules.
//!
//! Checked invariants: the concatenation of all generation contents
//! equals the concatenation of all writes, every write lands whole in
//! exactly one generation, and generation numbers are dense and
//! monotone.

use std::time::Duration;

use proptest::prelude::*;

use crate::config::RotationOptions;
use crate::sink::RollingSink;

use super::sink_test::{contents, mem_factory};

#[derive(Debug, Clone)]
enum Op {
    Write(Vec<u8>),
    Rotate,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => proptest::collection::vec(any::<u8>(), 1..24).prop_map(Op::Write),
        1 => Just(Op::Rotate),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn writes_survive_any_rotation_schedule(plan in proptest::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        rt.block_on(async {
            let (factory, log) = mem_factory();
            let options = RotationOptions::default().with_max_size(32);
            let sink = RollingSink::open(factory, options).unwrap();

            let mut writes: Vec<Vec<u8>> = Vec::new();
            for op in &plan {
                match op {
                    Op::Write(bytes) => {
                        sink.write(bytes).await.unwrap();
                        writes.push(bytes.clone());
                    }
                    Op::Rotate => sink.rotate(),
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            sink.close().await.unwrap();

            let generations = contents(&log);

            // No byte loss across rotations.
            assert_eq!(generations.concat(), writes.concat());

            // Atomic placement: each generation is a concatenation of
            // whole writes, in submission order.
            let mut pending = writes.iter();
            for generation in &generations {
                let mut consumed = 0;
                while consumed < generation.len() {
                    let write = pending.next().expect("generation holds unknown bytes");
                    assert!(
                        consumed + write.len() <= generation.len(),
                        "write split across generations"
                    );
                    assert_eq!(
                        &generation[consumed..consumed + write.len()],
                        &write[..],
                        "write reordered or corrupted"
                    );
                    consumed += write.len();
                }
            }
            assert!(pending.next().is_none(), "bytes appeared from nowhere");

            // Dense monotone numbering: 1..k with no gaps.
            let numbers: Vec<u64> = log.lock().unwrap().iter().map(|g| g.number).collect();
            let expected: Vec<u64> = (1..=numbers.len() as u64).collect();
            assert_eq!(numbers, expected);
        });
    }
}
