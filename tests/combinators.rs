use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rampart::{
    allow, and, chain, deny, not, or, race, rule, CacheMode, Decision, Evaluator, FieldRequest,
    OrPrecedence, RequestScope, Rule, RuleInput,
};

async fn eval(rule: &Rule<()>) -> Decision {
    let scope = RequestScope::new(());
    Evaluator::new()
        .evaluate(rule, &FieldRequest::new("Query", "f"), &scope)
        .await
}

/// Leaf that settles after `delay_ms` of paused time and records its name.
fn timed(name: &'static str, delay_ms: u64, allows: bool, log: &Arc<Mutex<Vec<&'static str>>>) -> Rule<()> {
    let log = Arc::clone(log);
    rule(name)
        .cache(CacheMode::None)
        .check(move |_input: RuleInput<()>| {
            let log = Arc::clone(&log);
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                log.lock().push(name);
                if allows {
                    Decision::Allow
                } else {
                    Decision::deny_with(name)
                }
            }
        })
}

#[tokio::test]
async fn and_laws() {
    assert!(eval(&and([allow(), allow(), allow()])).await.is_allowed());
    assert!(eval(&and([allow(), deny(), allow()])).await.is_denied());
    assert!(eval(&and([deny(), deny()])).await.is_denied());
}

#[tokio::test]
async fn or_laws() {
    assert!(eval(&or([deny(), deny(), allow()])).await.is_allowed());
    assert!(eval(&or([allow(), deny()])).await.is_allowed());
    assert!(eval(&or([deny(), deny()])).await.is_denied());
}

#[tokio::test]
async fn not_laws() {
    assert!(eval(&not(deny())).await.is_allowed());
    assert!(eval(&not(allow())).await.is_denied());
    assert!(eval(&not(not(allow()))).await.is_allowed());
    assert!(eval(&!or([deny(), deny()])).await.is_allowed());
}

#[tokio::test(start_paused = true)]
async fn and_returns_first_refusal_to_settle() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let r = and([
        timed("slow", 50, false, &log),
        timed("fast", 10, false, &log),
        timed("ok", 5, true, &log),
    ]);
    assert_eq!(eval(&r).await, Decision::deny_with("fast"));
    // `slow` was dropped before it settled.
    assert_eq!(*log.lock(), vec!["ok", "fast"]);
}

#[tokio::test(start_paused = true)]
async fn or_precedence_uses_declared_order_not_completion_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let r = or([
        timed("general", 30, false, &log),
        timed("specific", 10, false, &log),
    ]);
    assert_eq!(eval(&r).await, Decision::deny_with("specific"));

    let scope = RequestScope::new(());
    let first = Evaluator::with_or_precedence(OrPrecedence::First)
        .evaluate(&r, &FieldRequest::new("Query", "f"), &scope)
        .await;
    assert_eq!(first, Decision::deny_with("general"));
}

#[tokio::test(start_paused = true)]
async fn or_allows_without_waiting_for_slow_refusals() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let r = or([timed("slow", 100, false, &log), timed("fast", 1, true, &log)]);
    assert!(eval(&r).await.is_allowed());
    assert_eq!(*log.lock(), vec!["fast"]);
}

#[tokio::test(start_paused = true)]
async fn chain_runs_children_in_declared_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let r = chain([
        timed("first", 30, true, &log),
        timed("second", 1, true, &log),
        timed("third", 10, false, &log),
        timed("never", 1, true, &log),
    ]);
    assert_eq!(eval(&r).await, Decision::deny_with("third"));
    assert_eq!(*log.lock(), vec!["first", "second", "third"]);
}

#[tokio::test(start_paused = true)]
async fn race_takes_first_allow() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let r = race([
        timed("refuses", 1, false, &log),
        timed("allows", 5, true, &log),
        timed("late", 50, true, &log),
    ]);
    assert!(eval(&r).await.is_allowed());
    assert_eq!(*log.lock(), vec!["refuses", "allows"]);
}

#[tokio::test(start_paused = true)]
async fn race_reports_first_settled_refusal() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let r = race([timed("late", 20, false, &log), timed("early", 2, false, &log)]);
    assert_eq!(eval(&r).await, Decision::deny_with("early"));
}

#[tokio::test]
async fn errors_propagate_through_composites() {
    let failing: Rule<()> =
        rule("failing").check_sync(|_| Err::<bool, _>(std::io::Error::other("boom")));
    assert!(eval(&and([allow(), failing.clone()])).await.is_error());
    assert!(eval(&chain([failing.clone(), allow()])).await.is_error());
    // An allow elsewhere still satisfies an or.
    assert!(eval(&or([failing.clone(), allow()])).await.is_allowed());
    assert!(eval(&or([deny(), failing.clone()])).await.is_error());
    assert!(eval(&not(failing)).await.is_error());
}
