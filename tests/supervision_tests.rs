mod common;

use anyhow::Result;
use common::{
    await_events, await_running, counter_protocol, event_log, supervisor_protocol,
};
use stagecraft::testkit::CollectedDeadLetters;
use stagecraft::{
    SpawnOptions, Stage, SupervisionDirective, SupervisionScope, SupervisionStrategy,
};
use std::time::Duration;

async fn stage_with_supervisor(
    directive: SupervisionDirective,
    strategy: SupervisionStrategy,
    events: common::EventLog,
) -> Result<Stage> {
    let stage = Stage::new();
    let supervisor = stage.actor_for(supervisor_protocol(directive, strategy, events), vec![])?;
    await_running(&stage, &supervisor).await;
    stage.register_common_supervisor("test-supervisor", &supervisor);
    Ok(stage)
}

#[tokio::test]
async fn test_restart_replaces_instance_and_state() -> Result<()> {
    let events = event_log();
    let stage = stage_with_supervisor(
        SupervisionDirective::Restart,
        SupervisionStrategy::default(),
        event_log(),
    )
    .await?;
    let counter = stage.actor_for_with(
        counter_protocol(events.clone()),
        vec![],
        SpawnOptions::default().supervisor("test-supervisor"),
    )?;

    for _ in 0..3 {
        counter.tell("increment", ());
    }
    assert_eq!(counter.call::<_, i64>("value", ()).await?, 3);

    let fault = counter
        .call::<_, ()>("fail", ())
        .await
        .expect_err("failure rejects the caller's answer");
    assert!(fault.to_string().contains("counter asked to fail"));

    await_events(&events, "restart hooks", |log| {
        log.iter().any(|e| e == "after_restart")
    })
    .await;
    let log = events.get();
    let before = log.iter().position(|e| e == "before_restart").unwrap();
    let after = log.iter().position(|e| e == "after_restart").unwrap();
    assert!(before < after);

    // Fresh instance: constructor state, same address and mailbox.
    assert_eq!(counter.call::<_, i64>("value", ()).await?, 0);
    counter.tell("increment", ());
    assert_eq!(counter.call::<_, i64>("value", ()).await?, 1);
    assert_eq!(
        stage.actor_of(counter.address()).expect("still registered"),
        counter
    );

    stage.close().await;
    Ok(())
}

#[tokio::test]
async fn test_resume_preserves_state() -> Result<()> {
    let events = event_log();
    let stage = stage_with_supervisor(
        SupervisionDirective::Resume,
        SupervisionStrategy::default(),
        event_log(),
    )
    .await?;
    let counter = stage.actor_for_with(
        counter_protocol(events.clone()),
        vec![],
        SpawnOptions::default().supervisor("test-supervisor"),
    )?;

    for _ in 0..3 {
        counter.tell("increment", ());
    }
    assert_eq!(counter.call::<_, i64>("value", ()).await?, 3);

    counter
        .call::<_, ()>("fail", ())
        .await
        .expect_err("failure rejects the caller's answer");

    await_events(&events, "resume hook", |log| {
        log.iter().any(|e| e == "before_resume")
    })
    .await;
    assert!(!events.get().iter().any(|e| e == "before_restart"));
    assert_eq!(counter.call::<_, i64>("value", ()).await?, 3);

    stage.close().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_directive_stops_the_actor() -> Result<()> {
    let events = event_log();
    let stage = stage_with_supervisor(
        SupervisionDirective::Stop,
        SupervisionStrategy::default(),
        event_log(),
    )
    .await?;
    let letters = CollectedDeadLetters::new();
    stage.dead_letters().register_listener(letters.clone());

    let counter = stage.actor_for_with(
        counter_protocol(events.clone()),
        vec![],
        SpawnOptions::default().supervisor("test-supervisor"),
    )?;
    counter
        .call::<_, ()>("fail", ())
        .await
        .expect_err("failure rejects the caller's answer");

    let stopped =
        stagecraft::testkit::await_state(Duration::from_secs(2), || counter.is_stopped()).await;
    assert!(stopped);

    counter.tell("poke", ());
    assert!(letters.await_count(1, Duration::from_secs(1)).await);
    let matching = letters.containing("poke");
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].reason(), "actor stopped");

    stage.close().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_scope_all_takes_siblings_down() -> Result<()> {
    let events = event_log();
    let strategy = SupervisionStrategy::new(5, Duration::from_secs(5), SupervisionScope::All);
    let stage =
        stage_with_supervisor(SupervisionDirective::Stop, strategy, event_log()).await?;

    let first = stage.actor_for_with(
        counter_protocol(events.clone()),
        vec![],
        SpawnOptions::default().supervisor("test-supervisor"),
    )?;
    let second = stage.actor_for_with(
        counter_protocol(events.clone()),
        vec![],
        SpawnOptions::default().supervisor("test-supervisor"),
    )?;
    await_running(&stage, &first).await;
    await_running(&stage, &second).await;

    first
        .call::<_, ()>("fail", ())
        .await
        .expect_err("failure rejects the caller's answer");

    let both_stopped = stagecraft::testkit::await_state(Duration::from_secs(2), || {
        first.is_stopped() && second.is_stopped()
    })
    .await;
    assert!(both_stopped, "scope All stops the failing actor and its sibling");

    stage.close().await;
    Ok(())
}

#[tokio::test]
async fn test_exhausted_restart_window_escalates() -> Result<()> {
    let events = event_log();
    let supervisor_events = event_log();
    // Intensity zero: the very first restart request overruns the window.
    let strategy = SupervisionStrategy::new(0, Duration::from_secs(5), SupervisionScope::One);
    let stage = stage_with_supervisor(
        SupervisionDirective::Restart,
        strategy,
        supervisor_events.clone(),
    )
    .await?;

    let counter = stage.actor_for_with(
        counter_protocol(events.clone()),
        vec![],
        SpawnOptions::default().supervisor("test-supervisor"),
    )?;
    counter
        .call::<_, ()>("fail", ())
        .await
        .expect_err("failure rejects the caller's answer");

    // Escalation fails the supervisor itself; the public root restarts it.
    await_events(&supervisor_events, "supervisor restart", |log| {
        log.iter().any(|e| e == "supervisor:after_restart")
    })
    .await;

    stage.close().await;
    Ok(())
}

#[tokio::test]
async fn test_default_supervision_restarts_under_public_root() -> Result<()> {
    let events = event_log();
    let stage = Stage::new();
    // No named supervisor: the public root's restart-forever policy applies.
    let counter = stage.actor_for(counter_protocol(events.clone()), vec![])?;

    counter.tell("increment", ());
    counter
        .call::<_, ()>("fail", ())
        .await
        .expect_err("failure rejects the caller's answer");

    await_events(&events, "public root restart", |log| {
        log.iter().any(|e| e == "after_restart")
    })
    .await;
    assert_eq!(counter.call::<_, i64>("value", ()).await?, 0);

    stage.close().await;
    Ok(())
}

#[tokio::test]
async fn test_supervisor_sees_execution_context_of_failing_message() -> Result<()> {
    // The counter's fail handler tags its execution context with the
    // command name; the supervisor's inform reads it off the Supervised
    // handle before applying its directive.
    let events = event_log();
    let supervisor_events = event_log();
    let stage = stage_with_supervisor(
        SupervisionDirective::Restart,
        SupervisionStrategy::default(),
        supervisor_events.clone(),
    )
    .await?;
    let counter = stage.actor_for_with(
        counter_protocol(events.clone()),
        vec![],
        SpawnOptions::default().supervisor("test-supervisor"),
    )?;

    let fault = counter
        .call::<_, ()>("fail", ())
        .await
        .expect_err("failure rejects the caller's answer");
    assert!(fault.to_string().contains("counter asked to fail"));

    await_events(&supervisor_events, "context observed by supervisor", |log| {
        log.iter().any(|e| e == "supervisor:saw:fail")
    })
    .await;
    await_events(&events, "restart after tagged failure", |log| {
        log.iter().any(|e| e == "after_restart")
    })
    .await;

    stage.close().await;
    Ok(())
}
