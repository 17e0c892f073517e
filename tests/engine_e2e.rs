//! End-to-end scenarios driving the engine through full epochs: program
//! loading, wish/claim handshakes between programs, dynamic-state lifetimes,
//! failure isolation and the nested-registration depth bound.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use factlog::{
    DiagnosticKind, Engine, EngineConfig, FactLogResult, Phase, Point, ProgramId, ProgramScope,
    Value,
};

/// A platform-side outline handler: turns outline wishes into highlight
/// claims, the way a projector-facing handler would.
fn outline_handler(scope: &mut ProgramScope<'_>) -> FactLogResult<()> {
    scope.when(
        "{someone} wishes {paper} has outline with color {color}",
        &[],
        |inner, bindings| {
            inner.claim(
                "{} is highlighted with color {}",
                &[bindings["paper"].clone(), bindings["color"].clone()],
            )?;
            Ok(())
        },
    )?;
    Ok(())
}

#[test]
fn wish_claim_handshake_across_programs() {
    let mut engine = Engine::default();
    engine
        .add_program(ProgramId::system(), outline_handler)
        .unwrap();
    engine
        .add_program(ProgramId::new("7"), |scope| {
            scope.wish(
                "{} has outline with color {}",
                &[Value::from("7"), Value::from("red")],
            )?;
            Ok(())
        })
        .unwrap();
    engine.startup().unwrap();

    let report = engine.tick().unwrap();

    let highlight: Vec<_> = report.claims_named("@ is highlighted with color @").collect();
    assert_eq!(highlight.len(), 1);
    assert_eq!(highlight[0].args[0], Value::from("7"));
    assert_eq!(highlight[0].args[1], Value::from("red"));

    // The wish itself stays visible alongside the derived claim.
    assert_eq!(
        report.wishes_named("@ wishes @ has outline with color @").count(),
        1
    );
}

#[test]
fn several_programs_wishing_the_same_thing_all_bind() {
    let wishers = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&wishers);

    let mut engine = Engine::default();
    engine
        .add_program(ProgramId::system(), move |scope| {
            let sink = Arc::clone(&sink);
            scope.when(
                "{someone} wishes {paper} has outline with color {color}",
                &[],
                move |_, bindings| {
                    sink.lock().unwrap().push(bindings["someone"].clone());
                    Ok(())
                },
            )?;
            Ok(())
        })
        .unwrap();
    for id in ["3", "4"] {
        engine
            .add_program(ProgramId::new(id), |scope| {
                let me = Value::from(scope.subject());
                scope.wish("{} has outline with color {}", &[me, Value::from("blue")])?;
                Ok(())
            })
            .unwrap();
    }
    engine.startup().unwrap();

    let report = engine.tick().unwrap();
    // Wishes never collapse; the handler sees each wisher in insertion order.
    assert_eq!(
        report.wishes_named("@ wishes @ has outline with color @").count(),
        2
    );
    assert_eq!(
        *wishers.lock().unwrap(),
        vec![Value::from("3"), Value::from("4")]
    );
}

#[test]
fn dynamic_state_is_cleared_every_epoch() {
    let mut engine = Engine::default();
    engine
        .add_program(ProgramId::new("7"), |scope| {
            scope.when("{p} has width {w}", &[], |inner, bindings| {
                inner.claim("{} saw {}", &[bindings["p"].clone(), bindings["w"].clone()])?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
    engine.startup().unwrap();

    engine
        .inject_claim(
            ProgramId::system(),
            "{} has width {}",
            &[Value::from("7"), Value::from(10.0)],
        )
        .unwrap();
    let report = engine.tick().unwrap();
    assert_eq!(report.claims_named("@ saw @").count(), 1);

    // Supersede the input; the old derived claim must not survive into the
    // new epoch - it is re-derived from the new value instead.
    engine
        .inject_claim(
            ProgramId::system(),
            "{} has width {}",
            &[Value::from("7"), Value::from(20.0)],
        )
        .unwrap();
    let report = engine.tick().unwrap();
    let seen: Vec<_> = report.claims_named("@ saw @").collect();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].args[1], Value::from(20.0));
}

#[test]
fn corner_points_claim_fires_when_once_with_bindings() {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    let pts = Value::from(vec![
        Value::from(Point::new(0.0, 0.0)),
        Value::from(Point::new(1.0, 0.0)),
        Value::from(Point::new(1.0, 1.0)),
        Value::from(Point::new(0.0, 1.0)),
    ]);

    let mut engine = Engine::default();
    engine
        .add_program(ProgramId::new("a"), move |scope| {
            let sink = Arc::clone(&sink);
            scope.when("{p} has corner points {pts}", &[], move |_, bindings| {
                sink.lock()
                    .unwrap()
                    .push((bindings["p"].clone(), bindings["pts"].clone()));
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
    engine.startup().unwrap();
    engine
        .inject_claim(
            ProgramId::new("cam"),
            "{} has corner points {}",
            &[Value::from("a"), pts.clone()],
        )
        .unwrap();
    engine.tick().unwrap();

    assert_eq!(*fired.lock().unwrap(), vec![(Value::from("a"), pts)]);
}

#[test]
fn injected_claims_supersede_per_subject_and_name() {
    let mut engine = Engine::default();
    engine.startup().unwrap();

    engine
        .inject_claim(
            ProgramId::new("cam"),
            "{} has corner points {}",
            &[Value::from("7"), Value::from(vec![Value::from(1.0)])],
        )
        .unwrap();
    engine
        .inject_claim(
            ProgramId::new("cam"),
            "{} has corner points {}",
            &[Value::from("7"), Value::from(vec![Value::from(2.0)])],
        )
        .unwrap();

    let report = engine.tick().unwrap();
    let corners: Vec<_> = report.claims_named("@ has corner points @").collect();
    assert_eq!(corners.len(), 1);
    assert_eq!(corners[0].args[1], Value::from(vec![Value::from(2.0)]));
}

#[test]
fn with_all_fires_once_even_with_no_matches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);

    let mut engine = Engine::default();
    engine
        .add_program(ProgramId::new("counter"), move |scope| {
            let seen = Arc::clone(&seen);
            scope.with_all("{p} is present", &[], move |_, sets| {
                assert!(sets.is_empty());
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
    engine.startup().unwrap();
    engine.tick().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_callback_does_not_stop_the_epoch() {
    let mut engine = Engine::default();
    let stream = engine.subscribe_diagnostics();
    engine
        .add_program(ProgramId::new("bad"), |scope| {
            scope.when("{p} is lit", &[], |_, _| panic!("callback exploded"))?;
            Ok(())
        })
        .unwrap();
    engine
        .add_program(ProgramId::new("good"), |scope| {
            scope.when("{p} is lit", &[], |inner, bindings| {
                inner.claim("{} was handled", &[bindings["p"].clone()])?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
    engine.startup().unwrap();
    engine
        .inject_claim(ProgramId::system(), "{} is lit", &[Value::from("x")])
        .unwrap();

    let report = engine.tick().unwrap();
    assert_eq!(report.claims_named("@ was handled").count(), 1);

    let events = stream.drain();
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        DiagnosticKind::CallbackFailure { subject, message, .. }
            if subject.as_str() == "bad" && message.contains("exploded")
    )));
}

#[test]
fn nested_dynamic_registrations_drain_in_one_tick() {
    let mut engine = Engine::default();
    engine
        .add_program(ProgramId::new("7"), |scope| {
            scope.claim("{} is step {}", &[Value::from("7"), Value::from(1.0)])?;
            scope.when("{p} is step {}", &[Value::from(1.0)], |inner, bindings| {
                inner.claim("{} is step {}", &[bindings["p"].clone(), Value::from(2.0)])?;
                inner.when("{p} is step {}", &[Value::from(2.0)], |inner2, bindings2| {
                    inner2.claim(
                        "{} reached the end via {}",
                        &[bindings2["p"].clone(), Value::from("nested whens")],
                    )?;
                    Ok(())
                })?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
    engine.startup().unwrap();

    // One tick resolves the whole chain: the step-2 claim and the nested
    // reaction both land within the same epoch.
    let report = engine.tick().unwrap();
    assert_eq!(report.claims_named("@ reached the end via @").count(), 1);
}

fn register_chain(scope: &mut ProgramScope<'_>) -> FactLogResult<()> {
    scope.when("the chain is lit", &[], |inner, _| register_chain(inner))?;
    Ok(())
}

#[test]
fn unbounded_registration_chain_hits_the_depth_guard() {
    let mut engine = Engine::new(EngineConfig {
        max_dynamic_depth: 3,
        ..EngineConfig::default()
    });
    let stream = engine.subscribe_diagnostics();
    engine
        .add_program(ProgramId::new("loop"), |scope| {
            scope.claim("the chain is lit", &[])?;
            register_chain(scope)?;
            Ok(())
        })
        .unwrap();
    engine.startup().unwrap();

    // The tick completes despite the runaway chain.
    engine.tick().unwrap();

    let events = stream.drain();
    assert!(events.iter().any(|e| matches!(
        e.kind,
        DiagnosticKind::DepthLimitReached { depth: 3, .. }
    )));

    // And the next tick starts clean: dynamic reactions from the cut-off
    // chain are gone, so the same guard fires again rather than compounding.
    engine.tick().unwrap();
    let events = stream.drain();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e.kind, DiagnosticKind::DepthLimitReached { .. }))
            .count(),
        1
    );
}

#[test]
fn program_added_after_startup_joins_at_the_next_tick() {
    let mut engine = Engine::default();
    engine.startup().unwrap();
    engine.tick().unwrap();

    engine
        .add_program(ProgramId::new("late"), |scope| {
            scope.claim("{} arrived late", &[Value::from("late")])?;
            Ok(())
        })
        .unwrap();

    let report = engine.tick().unwrap();
    assert_eq!(report.claims_named("@ arrived late").count(), 1);

    // Its declaration ran once; the claim is static and persists.
    let report = engine.tick().unwrap();
    assert_eq!(report.claims_named("@ arrived late").count(), 1);
}

#[test]
fn removed_program_leaves_no_trace_after_the_boundary() {
    let mut engine = Engine::default();
    engine
        .add_program(ProgramId::new("7"), |scope| {
            scope.claim("{} is present", &[Value::from("7")])?;
            scope.when("{p} is present", &[], |inner, bindings| {
                inner.claim("{} echoed", &[bindings["p"].clone()])?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
    engine.startup().unwrap();

    let report = engine.tick().unwrap();
    assert_eq!(report.claims_named("@ is present").count(), 1);
    assert_eq!(report.claims_named("@ echoed").count(), 1);

    engine.remove_program(ProgramId::new("7"));
    let report = engine.tick().unwrap();
    assert_eq!(report.claims_named("@ is present").count(), 0);
    assert_eq!(report.claims_named("@ echoed").count(), 0);
}

#[test]
fn query_joins_over_current_state() {
    let mut engine = Engine::default();
    engine.startup().unwrap();
    engine
        .inject_claim(
            ProgramId::system(),
            "{} has width {}",
            &[Value::from("7"), Value::from(100.0)],
        )
        .unwrap();
    engine
        .inject_claim(
            ProgramId::system(),
            "{} has height {}",
            &[Value::from("7"), Value::from(50.0)],
        )
        .unwrap();

    let result = engine
        .query("{p} has width {w}, {p} has height {h}", &[])
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0]["w"], Value::from(100.0));
    assert_eq!(result[0]["h"], Value::from(50.0));
}

#[test]
fn engine_is_idle_between_ticks() {
    let mut engine = Engine::default();
    assert_eq!(engine.phase(), Phase::Idle);
    assert_eq!(engine.epoch(), 0);

    engine.startup().unwrap();
    assert_eq!(engine.phase(), Phase::Idle);

    let report = engine.tick().unwrap();
    assert_eq!(engine.phase(), Phase::Idle);
    assert_eq!(report.epoch, 1);
    assert_eq!(engine.epoch(), 1);
}

#[test]
fn library_loading_handshake() {
    let mut engine = Engine::default();
    engine
        .add_program(ProgramId::system(), |scope| {
            scope.when(
                "{someone} wishes {paper} loads js library from {url}",
                &[],
                |inner, bindings| {
                    inner.claim(
                        "{} loaded js library from {}",
                        &[bindings["paper"].clone(), bindings["url"].clone()],
                    )?;
                    Ok(())
                },
            )?;
            Ok(())
        })
        .unwrap();
    engine
        .add_program(ProgramId::new("12"), |scope| {
            scope.wish(
                "{} loads js library from {}",
                &[Value::from("12"), Value::from("lib/geometry.js")],
            )?;
            Ok(())
        })
        .unwrap();
    engine.startup().unwrap();

    let report = engine.tick().unwrap();
    let loaded: Vec<_> = report.claims_named("@ loaded js library from @").collect();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].args[1], Value::from("lib/geometry.js"));
}
