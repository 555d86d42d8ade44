#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use std::sync::Arc;

use snowstorm_consensus::{Consensus, Parameters, Status, Tx, TxId, VoteBag};
use snowstorm_nullables::NullTx;

#[derive(Arbitrary, Debug)]
enum Op {
    Add {
        dependencies: Vec<u8>,
        conflicts: Vec<u8>,
    },
    Poll(Vec<(u8, u8)>),
}

// Drive the engine with arbitrary admissions and polls. Nothing may panic,
// and two transactions admitted as conflicting may never both be accepted.
fuzz_target!(|ops: Vec<Op>| {
    let params = Parameters {
        k: 5,
        alpha: 3,
        beta_virtuous: 1,
        beta_rogue: 2,
        ..Parameters::default()
    };
    let Ok(mut engine) = Consensus::<Arc<NullTx>>::new(params) else {
        return;
    };
    let mut txs: Vec<Arc<NullTx>> = Vec::new();
    let mut conflict_pairs = Vec::new();

    for op in ops.into_iter().take(256) {
        match op {
            Op::Add {
                dependencies,
                conflicts,
            } => {
                let i = txs.len();
                let mut builder = NullTx::builder(i as u64);
                if i > 0 {
                    for d in dependencies.iter().take(4) {
                        builder = builder.depends_on(&txs[*d as usize % i]);
                    }
                }
                let tx = builder.build();
                let conflict_ids: Vec<TxId> = if i > 0 {
                    conflicts
                        .iter()
                        .take(4)
                        .map(|c| {
                            let j = *c as usize % i;
                            conflict_pairs.push((j, i));
                            txs[j].id()
                        })
                        .collect()
                } else {
                    Vec::new()
                };
                let _ = engine.add(tx.clone(), &conflict_ids);
                txs.push(tx);
            }
            Op::Poll(votes) => {
                if txs.is_empty() {
                    continue;
                }
                let bag: VoteBag = votes
                    .iter()
                    .map(|(t, w)| (txs[*t as usize % txs.len()].id(), u64::from(*w % 8)))
                    .collect();
                let _ = engine.record_poll(&bag);
            }
        }
    }

    for (a, b) in conflict_pairs {
        assert!(
            !(txs[a].status() == Status::Accepted && txs[b].status() == Status::Accepted),
            "conflicting transactions both accepted"
        );
    }
});
