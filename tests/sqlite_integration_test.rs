//! End-to-end integration tests against a real (in-process) SQLite
//! store, exercising full flows instead of individual `LogStore`
//! operations. Runs unconditionally in CI — no external service
//! needed.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use durable_flow::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

async fn fresh_engine() -> Engine {
    // Plain `connect` never runs recovery itself (see `Engine::connect`'s
    // doc comment), so these tests that drive flows directly don't need
    // `recover_on_startup` disabled; the dedicated recovery test below
    // registers flows and calls `recover_incomplete_flows` explicitly.
    Engine::connect(EngineConfig::new("sqlite::memory:")).await.expect("connect")
}

/// Five immediate `Say` steps, re-driven after a simulated crash. The
/// body call count is asserted directly via a shared counter rather
/// than by inspecting stdout.
#[derive(Default)]
struct HelloFlow {
    executions: Arc<AtomicI64>,
}

#[async_trait::async_trait]
impl Flow for HelloFlow {
    const TYPE: &'static str = "HelloFlow";
    type Input = i64;
    type Output = ();

    async fn body(&self, ctx: &FlowContext, start_crash_at: i64) -> Result<(), FlowError> {
        for i in 0..5i64 {
            let executions = self.executions.clone();
            ctx.step("Say", i, move |i: i64| {
                let executions = executions.clone();
                async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    if i == start_crash_at {
                        return Err("simulated crash".to_string());
                    }
                    Ok::<i64, String>(i)
                }
            })
            .await?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn hello_flow_replays_completed_steps_after_a_crash() {
    let engine = fresh_engine().await;
    let flow_id = Uuid::new_v4();

    let executions = Arc::new(AtomicI64::new(0));
    let crashing = HelloFlow { executions: executions.clone() };
    let handle = engine.get_flow(flow_id, crashing);

    // Crash deterministically right after step i=2 completes: step
    // body for i=3 returns an error, so nothing past i=2 is logged
    // Complete.
    let err = handle.execute(3).await.unwrap_err();
    assert!(matches!(err, FlowError::Dispatch(DispatchError::UserStepFailure(_))));
    assert_eq!(executions.load(Ordering::SeqCst), 4); // i=0,1,2 succeeded, i=3 failed

    for step in 1..=3i64 {
        let row = engine.store().get_invocation(flow_id, step).await.unwrap().unwrap();
        assert_eq!(row.status, InvocationStatus::Complete, "step {step} should have completed");
    }
    let row4 = engine.store().get_invocation(flow_id, 4).await.unwrap().unwrap();
    assert_eq!(row4.status, InvocationStatus::Pending);
    assert_eq!(row4.attempts, 1);

    // Re-drive with a flow that never crashes: steps 1-3 replay (no
    // body call), steps 4-5 execute for the first time.
    let executions2 = Arc::new(AtomicI64::new(0));
    let fresh = HelloFlow { executions: executions2.clone() };
    let handle2 = engine.get_flow(flow_id, fresh);
    handle2.execute(-1).await.unwrap();

    // Only the un-replayed steps (i=3 retried, i=4) ran their body.
    assert_eq!(executions2.load(Ordering::SeqCst), 2);

    for step in 0..=5i64 {
        let row = engine.store().get_invocation(flow_id, step).await.unwrap().unwrap();
        assert_eq!(row.status, InvocationStatus::Complete, "step {step} should be complete after the re-drive");
    }
}

/// A delayed step followed by an await-step, confirmed via signal +
/// resume.
#[derive(Default)]
struct SignupFlow;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignupInput {
    email: String,
}

#[async_trait::async_trait]
impl Flow for SignupFlow {
    const TYPE: &'static str = "SignupFlow";
    type Input = SignupInput;
    type Output = i64;

    async fn body(&self, ctx: &FlowContext, input: SignupInput) -> Result<i64, FlowError> {
        let user_id: i64 = ctx
            .step("CreateUserRecord", input.email.clone(), |_email| async move { Ok::<i64, std::convert::Infallible>(1234) })
            .await?;

        ctx.step_delayed("SendWelcomeEmail", Duration::from_millis(20), user_id, |_user_id| async move {
            Ok::<(), std::convert::Infallible>(())
        })
        .await?;

        let confirmed: bool = ctx.await_signal("ConfirmEmailAddress", false).await?;
        assert!(confirmed, "resume should have substituted the signalled payload");

        ctx.step("FinalizeSignup", user_id, |user_id| async move { Ok::<i64, std::convert::Infallible>(user_id) }).await
    }
}

#[tokio::test]
async fn signup_flow_pauses_then_resumes_on_signal() {
    let engine = fresh_engine().await;
    let flow_id = Uuid::new_v4();

    let handle = engine.get_flow_default::<SignupFlow>(flow_id);
    handle.run(SignupInput { email: "a@example.com".into() }).await.unwrap();

    let entry = engine.store().get_invocation(flow_id, 0).await.unwrap().unwrap();
    assert_eq!(entry.status, InvocationStatus::Pending, "flow paused, entry row not complete yet");

    let confirm_row = engine.store().get_invocation(flow_id, 3).await.unwrap().unwrap();
    assert_eq!(confirm_row.status, InvocationStatus::WaitingForSignal);

    let user_id = handle.resume(serde_json::json!(true)).await.unwrap();
    assert_eq!(user_id, 1234);

    let entry = engine.store().get_invocation(flow_id, 0).await.unwrap().unwrap();
    assert_eq!(entry.status, InvocationStatus::Complete);
}

/// A step with `delay = 0` behaves identically to one with no delay
/// at all.
#[tokio::test]
async fn zero_delay_step_does_not_sleep() {
    let engine = fresh_engine().await;

    #[derive(Default)]
    struct Retry;
    #[async_trait::async_trait]
    impl Flow for Retry {
        const TYPE: &'static str = "Retry";
        type Input = ();
        type Output = i64;
        async fn body(&self, ctx: &FlowContext, _input: ()) -> Result<i64, FlowError> {
            ctx.step_delayed("Wait", Duration::from_millis(0), (), |_| async move { Ok::<i64, std::convert::Infallible>(7) }).await
        }
    }

    let handle = engine.get_flow_default::<Retry>(Uuid::new_v4());
    let started = std::time::Instant::now();
    let out = handle.execute(()).await.unwrap();
    assert_eq!(out, 7);
    assert!(started.elapsed() < Duration::from_millis(50), "zero delay must not sleep");
}

#[tokio::test]
async fn structural_drift_is_detected_and_row_is_untouched() {
    let engine = fresh_engine().await;
    let flow_id = Uuid::new_v4();

    engine
        .store()
        .log_invocation_start(flow_id, 1, "A", "X", None, InvocationStatus::Complete, None)
        .await
        .unwrap();
    engine.store().log_invocation_completion(flow_id, 1, Some(serde_json::json!(1))).await.unwrap();

    #[derive(Default)]
    struct Drifted;
    #[async_trait::async_trait]
    impl Flow for Drifted {
        const TYPE: &'static str = "A";
        type Input = ();
        type Output = ();
        async fn body(&self, ctx: &FlowContext, _input: ()) -> Result<(), FlowError> {
            ctx.step("Y", (), |_: ()| async move { Ok::<(), std::convert::Infallible>(()) }).await
        }
    }

    let handle = engine.get_flow_default::<Drifted>(flow_id);
    let err = handle.execute(()).await.unwrap_err();
    assert!(matches!(err, FlowError::Dispatch(DispatchError::StructuralDrift { .. })));

    let row = engine.store().get_invocation(flow_id, 1).await.unwrap().unwrap();
    assert_eq!(row.method_name, "X", "drift must not overwrite the logged row");
}

#[tokio::test]
async fn recovery_schedules_incomplete_flows_ordered_by_age_and_ignores_complete() {
    let engine = fresh_engine().await;
    engine.register_flow(HelloFlow::default);

    let f1 = Uuid::new_v4();
    let f2 = Uuid::new_v4();
    let f3 = Uuid::new_v4();

    engine
        .store()
        .log_invocation_start(f1, 0, HelloFlow::TYPE, durable_flow::dispatcher::ENTRY_METHOD, None, InvocationStatus::Pending, Some(serde_json::json!(-1)))
        .await
        .unwrap();
    engine
        .store()
        .log_invocation_start(f2, 0, HelloFlow::TYPE, durable_flow::dispatcher::ENTRY_METHOD, None, InvocationStatus::Pending, Some(serde_json::json!(-1)))
        .await
        .unwrap();
    engine
        .store()
        .log_invocation_start(f3, 0, HelloFlow::TYPE, durable_flow::dispatcher::ENTRY_METHOD, None, InvocationStatus::Complete, Some(serde_json::json!(-1)))
        .await
        .unwrap();

    let incomplete = engine.store().get_incomplete_flows().await.unwrap();
    let ids: Vec<Uuid> = incomplete.iter().map(|i| i.flow_id).collect();
    assert_eq!(ids, vec![f1, f2]);

    engine.recover_incomplete_flows().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for id in [f1, f2] {
        let row = engine.store().get_invocation(id, 0).await.unwrap().unwrap();
        assert_eq!(row.status, InvocationStatus::Complete, "flow {id} should have been recovered");
    }
}
