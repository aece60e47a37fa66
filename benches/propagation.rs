use std::sync::Arc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use claros::{
    ClarosResult, Condition, ConditionError, InMemoryValueStore, KnowledgeBase, ObjectId,
    Rule, RuleAction, RuleBasedSolver, Session, SolverClass, Value, ValueStore,
};

const RULES: SolverClass = SolverClass::new("bench_rules");

struct IsAnswered {
    object: ObjectId,
}

impl Condition for IsAnswered {
    fn eval(&self, session: &Session) -> Result<bool, ConditionError> {
        Ok(session.store().current_value(self.object).is_answered())
    }

    fn terminal_objects(&self) -> Vec<ObjectId> {
        vec![self.object]
    }
}

struct CopyValue {
    source: ObjectId,
    target: ObjectId,
}

impl RuleAction for CopyValue {
    fn backward_objects(&self) -> Vec<ObjectId> {
        vec![self.target]
    }

    fn do_it(&self, session: &Session) -> ClarosResult<()> {
        let value = session.store().current_value(self.source);
        session.write_value(self.target, value)
    }

    fn undo(&self, session: &Session) -> ClarosResult<()> {
        session.write_value(self.target, Value::Undefined)
    }
}

/// A linear chain of copy rules: object[0] -> object[1] -> ... -> object[n].
fn chain_session(len: usize) -> (Session, Vec<ObjectId>) {
    let objects: Vec<ObjectId> = (0..=len).map(|_| ObjectId::new()).collect();

    let mut kb = KnowledgeBase::new();
    for pair in objects.windows(2) {
        kb.insert_rule(
            Rule::new(
                Arc::new(IsAnswered { object: pair[0] }),
                Arc::new(CopyValue {
                    source: pair[0],
                    target: pair[1],
                }),
            )
            .with_solver_context(RULES),
        );
    }

    let store = Arc::new(InMemoryValueStore::new());
    let session = Session::builder()
        .store(store as Arc<dyn ValueStore>)
        .solver(Arc::new(RuleBasedSolver::new(RULES, 5.0, Arc::new(kb))))
        .build()
        .unwrap();
    (session, objects)
}

fn bench_report_without_solvers(c: &mut Criterion) {
    c.bench_function("propagation/report_no_solvers", |b| {
        b.iter_custom(|iters| {
            let store = Arc::new(InMemoryValueStore::new());
            let session = Session::builder()
                .store(store as Arc<dyn ValueStore>)
                .build()
                .unwrap();
            let q = ObjectId::new();

            let start = Instant::now();
            for i in 0..iters {
                session.write_value(q, Value::Int(i as i64)).unwrap();
            }
            start.elapsed()
        });
    });
}

fn bench_rule_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_cascade");
    group.throughput(Throughput::Elements(1));

    for len in [4usize, 16, 64] {
        group.bench_function(format!("chain_{len}"), |b| {
            b.iter_custom(|iters| {
                let (session, objects) = chain_session(len);
                let root = objects[0];

                let start = Instant::now();
                for i in 0..iters {
                    // Each write re-derives the whole chain via the rules'
                    // update path.
                    session.write_value(root, Value::Int(i as i64)).unwrap();
                }
                start.elapsed()
            });
        });
    }
    group.finish();
}

fn bench_coalesced_burst(c: &mut Criterion) {
    c.bench_function("propagation/coalesced_burst_64", |b| {
        b.iter_custom(|iters| {
            let (session, objects) = chain_session(4);
            let root = objects[0];

            let start = Instant::now();
            for i in 0..iters {
                // 64 writes inside one frame collapse into one delivery.
                session.open_frame(None);
                for j in 0..64i64 {
                    session
                        .write_value(root, Value::Int(i as i64 * 64 + j))
                        .unwrap();
                }
                session.commit_frame().unwrap();
            }
            start.elapsed()
        });
    });
}

criterion_group!(
    propagation,
    bench_report_without_solvers,
    bench_rule_cascade,
    bench_coalesced_burst
);
criterion_main!(propagation);
