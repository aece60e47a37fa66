use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use claros::{
    ClarosResult, Condition, ConditionError, InMemoryValueStore, KnowledgeBase, ObjectId,
    ProblemSolver, Rule, RuleAction, RuleBasedSolver, Session, SolverClass, Value, ValueStore,
};

/// Condition: the object's current value equals the expected one.
///
/// Non-answers surface as the matching evaluation failures, the way a
/// condition language implementation would report them.
struct ValueIs {
    object: ObjectId,
    expected: Value,
}

impl Condition for ValueIs {
    fn eval(&self, session: &Session) -> Result<bool, ConditionError> {
        match session.store().current_value(self.object) {
            Value::Undefined => Err(ConditionError::MissingAnswer {
                object: self.object,
            }),
            Value::Unknown => Err(ConditionError::UnknownAnswer {
                object: self.object,
            }),
            value => Ok(value == self.expected),
        }
    }

    fn terminal_objects(&self) -> Vec<ObjectId> {
        vec![self.object]
    }
}

/// Condition: the object has any actual answer.
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

/// Action: set a fixed value on firing, retract it on backtrack.
struct SetValue {
    target: ObjectId,
    value: Value,
}

impl RuleAction for SetValue {
    fn backward_objects(&self) -> Vec<ObjectId> {
        vec![self.target]
    }

    fn do_it(&self, session: &Session) -> ClarosResult<()> {
        session.write_value(self.target, self.value.clone())
    }

    fn undo(&self, session: &Session) -> ClarosResult<()> {
        session.write_value(self.target, Value::Undefined)
    }
}

/// Action: copy the source object's value to the target, counting calls.
struct CopyValue {
    source: ObjectId,
    target: ObjectId,
    do_calls: AtomicU32,
    undo_calls: AtomicU32,
    update_calls: AtomicU32,
}

impl CopyValue {
    fn new(source: ObjectId, target: ObjectId) -> Self {
        Self {
            source,
            target,
            do_calls: AtomicU32::new(0),
            undo_calls: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
        }
    }
}

impl RuleAction for CopyValue {
    fn backward_objects(&self) -> Vec<ObjectId> {
        vec![self.target]
    }

    fn do_it(&self, session: &Session) -> ClarosResult<()> {
        self.do_calls.fetch_add(1, Ordering::SeqCst);
        let value = session.store().current_value(self.source);
        session.write_value(self.target, value)
    }

    fn undo(&self, session: &Session) -> ClarosResult<()> {
        self.undo_calls.fetch_add(1, Ordering::SeqCst);
        session.write_value(self.target, Value::Undefined)
    }

    fn update(&self, session: &Session) -> ClarosResult<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let value = session.store().current_value(self.source);
        session.write_value(self.target, value)
    }
}

const RULES: SolverClass = SolverClass::new("rule_solver");

fn session_over(kb: Arc<KnowledgeBase>) -> (Session, Arc<InMemoryValueStore>) {
    let store = Arc::new(InMemoryValueStore::new());
    let session = Session::builder()
        .store(store.clone() as Arc<dyn ValueStore>)
        .solver(Arc::new(RuleBasedSolver::new(RULES, 5.0, kb)) as Arc<dyn ProblemSolver>)
        .build()
        .unwrap();
    (session, store)
}

#[test]
fn rule_chain_derives_to_fixpoint_in_one_call() {
    let q1 = ObjectId::new();
    let d1 = ObjectId::new();
    let d2 = ObjectId::new();

    let mut kb = KnowledgeBase::new();
    kb.insert_rule(
        Rule::new(
            Arc::new(ValueIs {
                object: q1,
                expected: Value::Bool(true),
            }),
            Arc::new(SetValue {
                target: d1,
                value: Value::Bool(true),
            }),
        )
        .with_solver_context(RULES),
    );
    kb.insert_rule(
        Rule::new(
            Arc::new(ValueIs {
                object: d1,
                expected: Value::Bool(true),
            }),
            Arc::new(SetValue {
                target: d2,
                value: Value::Choice("confirmed".into()),
            }),
        )
        .with_solver_context(RULES),
    );

    let (session, store) = session_over(Arc::new(kb));
    session.write_value(q1, Value::Bool(true)).unwrap();

    assert_eq!(store.current_value(d1), Value::Bool(true));
    assert_eq!(store.current_value(d2), Value::Choice("confirmed".into()));
    assert!(!session.in_propagation());
}

#[test]
fn retracting_the_input_unwinds_the_chain() {
    let q1 = ObjectId::new();
    let d1 = ObjectId::new();
    let d2 = ObjectId::new();

    let mut kb = KnowledgeBase::new();
    kb.insert_rule(
        Rule::new(
            Arc::new(ValueIs {
                object: q1,
                expected: Value::Bool(true),
            }),
            Arc::new(SetValue {
                target: d1,
                value: Value::Bool(true),
            }),
        )
        .with_solver_context(RULES),
    );
    kb.insert_rule(
        Rule::new(
            Arc::new(ValueIs {
                object: d1,
                expected: Value::Bool(true),
            }),
            Arc::new(SetValue {
                target: d2,
                value: Value::Bool(true),
            }),
        )
        .with_solver_context(RULES),
    );

    let (session, store) = session_over(Arc::new(kb));
    session.write_value(q1, Value::Bool(true)).unwrap();
    assert_eq!(store.current_value(d2), Value::Bool(true));

    // Flip the input: rule 1 undoes, which starves rule 2, which undoes too.
    session.write_value(q1, Value::Bool(false)).unwrap();
    assert_eq!(store.current_value(d1), Value::Undefined);
    assert_eq!(store.current_value(d2), Value::Undefined);
}

#[test]
fn refire_while_condition_holds_takes_the_update_path() {
    let q = ObjectId::new();
    let derived = ObjectId::new();
    let action = Arc::new(CopyValue::new(q, derived));

    let mut kb = KnowledgeBase::new();
    kb.insert_rule(
        Rule::new(Arc::new(IsAnswered { object: q }), action.clone())
            .with_solver_context(RULES),
    );

    let (session, store) = session_over(Arc::new(kb));

    session.write_value(q, Value::Int(1)).unwrap();
    assert_eq!(store.current_value(derived), Value::Int(1));
    assert_eq!(action.do_calls.load(Ordering::SeqCst), 1);

    // The condition stays satisfied while its terminal changes: update, not
    // a second do_it.
    session.write_value(q, Value::Int(2)).unwrap();
    assert_eq!(store.current_value(derived), Value::Int(2));
    assert_eq!(action.do_calls.load(Ordering::SeqCst), 1);
    assert!(action.update_calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(action.undo_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_input_blocks_firing_without_erroring_the_session() {
    let q = ObjectId::new();
    let derived = ObjectId::new();

    let mut kb = KnowledgeBase::new();
    kb.insert_rule(
        Rule::new(
            Arc::new(ValueIs {
                object: q,
                expected: Value::Bool(true),
            }),
            Arc::new(SetValue {
                target: derived,
                value: Value::Bool(true),
            }),
        )
        .with_solver_context(RULES),
    );

    let (session, store) = session_over(Arc::new(kb));
    session.write_value(q, Value::Unknown).unwrap();

    assert_eq!(store.current_value(derived), Value::Undefined);
}

#[test]
fn late_solver_reactivates_against_known_facts() {
    let q = ObjectId::new();
    let derived = ObjectId::new();

    let mut kb = KnowledgeBase::new();
    kb.insert_rule(
        Rule::new(
            Arc::new(ValueIs {
                object: q,
                expected: Value::Bool(true),
            }),
            Arc::new(SetValue {
                target: derived,
                value: Value::Bool(true),
            }),
        )
        .with_solver_context(RULES),
    );

    // The fact arrives before any rule solver exists.
    let store = Arc::new(InMemoryValueStore::new());
    let session = Session::builder()
        .store(store.clone() as Arc<dyn ValueStore>)
        .build()
        .unwrap();
    session.write_value(q, Value::Bool(true)).unwrap();
    assert_eq!(store.current_value(derived), Value::Undefined);

    // Add the solver and re-play the known fact at it alone.
    session
        .add_solver(Arc::new(RuleBasedSolver::new(RULES, 5.0, Arc::new(kb))))
        .unwrap();
    session.report(q, Value::Undefined, Some(RULES)).unwrap();

    assert_eq!(store.current_value(derived), Value::Bool(true));
}

#[test]
fn two_rule_solvers_cascade_across_classes() {
    const ABSTRACTION: SolverClass = SolverClass::new("abstraction");

    let raw = ObjectId::new();
    let symptom = ObjectId::new();
    let diagnosis = ObjectId::new();

    // The abstraction solver turns the raw reading into a symptom...
    let mut abstraction_kb = KnowledgeBase::new();
    abstraction_kb.insert_rule(
        Rule::new(
            Arc::new(ValueIs {
                object: raw,
                expected: Value::Int(40),
            }),
            Arc::new(SetValue {
                target: symptom,
                value: Value::Choice("high_fever".into()),
            }),
        )
        .with_solver_context(ABSTRACTION),
    );

    // ...and the rule solver turns the symptom into a diagnosis.
    let mut rules_kb = KnowledgeBase::new();
    rules_kb.insert_rule(
        Rule::new(
            Arc::new(ValueIs {
                object: symptom,
                expected: Value::Choice("high_fever".into()),
            }),
            Arc::new(SetValue {
                target: diagnosis,
                value: Value::Choice("influenza_suspected".into()),
            }),
        )
        .with_solver_context(RULES),
    );

    let store = Arc::new(InMemoryValueStore::new());
    let session = Session::builder()
        .store(store.clone() as Arc<dyn ValueStore>)
        .solver(Arc::new(RuleBasedSolver::new(
            ABSTRACTION,
            1.0,
            Arc::new(abstraction_kb),
        )))
        .solver(Arc::new(RuleBasedSolver::new(RULES, 5.0, Arc::new(rules_kb))))
        .build()
        .unwrap();

    session.write_value(raw, Value::Int(40)).unwrap();

    assert_eq!(store.current_value(symptom), Value::Choice("high_fever".into()));
    assert_eq!(
        store.current_value(diagnosis),
        Value::Choice("influenza_suspected".into())
    );
}
