//! End-to-end decision-loop scenarios driven by scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use skipper_core::agent::{BusEvent, EventBus, LoopServices, TaskOptions, TaskRegistry};
use skipper_core::browser::{BrowserError, SessionProvider};
use skipper_core::error::codes;
use skipper_core::model::{NodeStatus, Severity, TaskStatus};
use skipper_core::testing::{ScriptedLm, ScriptedProvider, ScriptedSession, ScriptedStep};

fn node_json(id: &str, parent: Option<&str>, tool: &str, args: Value) -> Value {
    let mut node = json!({
        "node_id": id,
        "priority": 1,
        "action": {
            "tool_name": tool,
            "arguments": args,
            "max_attempts": 1,
            "execution_timeout_seconds": 20,
            "confidence_score": 0.9,
            "on_failure": "RE_EVALUATE"
        }
    });
    if let Some(parent) = parent {
        node["parent_id"] = json!(parent);
    }
    node
}

fn plan(nodes: Vec<Value>) -> Value {
    json!({ "execution_plan": nodes })
}

struct Harness {
    registry: TaskRegistry,
    bus: Arc<EventBus>,
    session: Arc<ScriptedSession>,
    provider: Arc<ScriptedProvider>,
    _artifacts: tempfile::TempDir,
}

fn harness(lm_responses: Vec<Value>, steps: Vec<ScriptedStep>) -> Harness {
    let artifacts = tempfile::TempDir::new().unwrap();
    let session = Arc::new(ScriptedSession::new(steps));
    let provider = Arc::new(ScriptedProvider::new(session.clone()));
    let bus = Arc::new(EventBus::new());
    let lm = Arc::new(ScriptedLm::new(lm_responses.into_iter().map(Ok).collect()));

    let services = LoopServices::new(lm, provider.clone(), bus.clone()).with_artifact_dirs(
        artifacts.path().join("screenshots"),
        artifacts.path().join("notes"),
    );
    Harness {
        registry: TaskRegistry::new(Arc::new(services)),
        bus,
        session,
        provider,
        _artifacts: artifacts,
    }
}

/// Poll (under paused time) until the task reaches a terminal status.
async fn await_terminal(registry: &TaskRegistry, task_id: &str) -> skipper_core::TaskExecution {
    for _ in 0..10_000 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let execution = registry.get(task_id).expect("task exists");
        if execution.status.is_terminal() {
            return execution;
        }
    }
    panic!("task never reached a terminal status");
}

fn drain(sub: &skipper_core::agent::Subscription) -> Vec<BusEvent> {
    let mut events = Vec::new();
    while let Some(event) = sub.try_recv() {
        events.push(event);
    }
    events
}

fn node_updates<'a>(events: &'a [BusEvent], id: &str, status: NodeStatus) -> Vec<&'a BusEvent> {
    events
        .iter()
        .filter(|e| match e {
            BusEvent::NodeUpdate { node } => node.node_id == id && node.status == status,
            _ => false,
        })
        .collect()
}

fn task_updates(events: &[BusEvent], status: TaskStatus) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, BusEvent::TaskUpdate { task } if task.status == status))
        .count()
}

// ── S1: happy-path extraction ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn happy_path_navigate_and_screenshot() {
    let h = harness(
        vec![plan(vec![
            node_json("n1", None, "navigate_to", json!({"url": "https://example.com"})),
            node_json("n2", Some("n1"), "take_screenshot", json!({"task_topic": "example"})),
        ])],
        vec![
            ScriptedStep::Ok,
            ScriptedStep::OkBytes(vec![0x89, b'P', b'N', b'G']),
        ],
    );

    let created = h
        .registry
        .create("navigate to https://example.com and take a screenshot", TaskOptions::default())
        .unwrap();
    assert_eq!(created.status, TaskStatus::Idle);
    let sub = h.bus.subscribe(&created.task_id);

    let done = await_terminal(&h.registry, &created.task_id).await;
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.nodes["n1"].status, NodeStatus::Success);
    assert_eq!(done.nodes["n2"].status, NodeStatus::Success);
    assert_eq!(
        done.nodes["n1"].resolved_output.as_deref(),
        Some("https://example.com")
    );
    let screenshot = done.nodes["n2"].resolved_output.clone().unwrap();
    assert!(screenshot.ends_with(".png"), "got {screenshot}");
    assert_eq!(
        h.registry.latest_screenshot(&created.task_id).unwrap(),
        std::path::PathBuf::from(&screenshot)
    );

    let events = drain(&sub);
    assert!(task_updates(&events, TaskStatus::Running) >= 1);
    assert_eq!(task_updates(&events, TaskStatus::Completed), 1);
    assert_eq!(node_updates(&events, "n1", NodeStatus::Running).len(), 1);
    assert_eq!(node_updates(&events, "n2", NodeStatus::Running).len(), 1);
    assert_eq!(node_updates(&events, "n1", NodeStatus::Success).len(), 1);
    assert_eq!(node_updates(&events, "n2", NodeStatus::Success).len(), 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, BusEvent::BrowserUrl { url } if url == "https://example.com")));

    // The browser session is released exactly once, in finalization.
    assert_eq!(h.provider.released(), 1);
}

// ── S2: planner schema violation ───────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn planner_violation_fails_the_task_after_one_retry() {
    let bad = json!({
        "execution_plan": [{
            "node_id": "n1",
            "priority": 1,
            "action": {
                "tool_name": "unknown_tool",
                "arguments": {},
                "max_attempts": 1,
                "execution_timeout_seconds": 10,
                "confidence_score": 1.2
            }
        }]
    });
    let h = harness(vec![bad.clone(), bad], vec![]);

    let created = h.registry.create("impossible goal", TaskOptions::default()).unwrap();
    let done = await_terminal(&h.registry, &created.task_id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.nodes.is_empty());
    let errors: Vec<_> = h
        .registry
        .logs(&created.task_id)
        .into_iter()
        .filter(|l| l.severity == Severity::Error)
        .collect();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|l| l.message.contains("validation")));
}

// ── S4: correction injection ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stale_dom_failure_is_recovered_by_a_correction_subplan() {
    let initial = plan(vec![node_json(
        "n1",
        None,
        "extract_data",
        json!({"selector": ".result", "attribute": "text"}),
    )]);
    let correction = plan(vec![
        node_json("c1", None, "wait", json!({"seconds": 2})),
        node_json("c2", None, "extract_data", json!({"selector": ".result", "attribute": "text"})),
    ]);

    let h = harness(
        vec![initial, correction],
        vec![
            ScriptedStep::Err(BrowserError::StaleDom("detached".into())),
            ScriptedStep::OkItems(vec!["first".into(), "second".into()]),
        ],
    );

    let created = h.registry.create("extract the results", TaskOptions::default()).unwrap();
    let done = await_terminal(&h.registry, &created.task_id).await;

    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.nodes["n1"].status, NodeStatus::Failed);
    assert_eq!(done.nodes["c1"].status, NodeStatus::Success);
    assert_eq!(done.nodes["c2"].status, NodeStatus::Success);
    assert_eq!(done.nodes["c1"].parent_id.as_deref(), Some("n1"));
    assert_eq!(done.nodes["c2"].parent_id.as_deref(), Some("n1"));
    assert_eq!(
        done.nodes["c2"].resolved_output.as_deref(),
        Some("first\nsecond")
    );
}

// ── S5: cancellation mid-flight ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancellation_stops_scheduling_after_the_running_attempt() {
    let mut wait_node = node_json("n3", Some("n2"), "wait", json!({"seconds": 60}));
    wait_node["action"]["execution_timeout_seconds"] = json!(120);
    let nodes = vec![
        node_json("n1", None, "navigate_to", json!({"url": "https://a.test"})),
        node_json("n2", Some("n1"), "navigate_to", json!({"url": "https://b.test"})),
        wait_node,
        node_json("n4", Some("n3"), "navigate_to", json!({"url": "https://c.test"})),
        node_json("n5", Some("n4"), "navigate_to", json!({"url": "https://d.test"})),
    ];
    let h = harness(
        vec![plan(nodes)],
        vec![ScriptedStep::Ok, ScriptedStep::Ok, ScriptedStep::Ok, ScriptedStep::Ok],
    );

    let created = h
        .registry
        .create("five step crawl", TaskOptions {
            max_execution_time_seconds: Some(120),
            ..Default::default()
        })
        .unwrap();
    let sub = h.bus.subscribe(&created.task_id);

    // Wait until n2 has succeeded, then request cancellation while n3's
    // wait is still in flight.
    for _ in 0..10_000 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let execution = h.registry.get(&created.task_id).unwrap();
        if execution
            .nodes
            .get("n2")
            .map(|n| n.status == NodeStatus::Success)
            .unwrap_or(false)
        {
            break;
        }
    }
    assert!(h.registry.stop(&created.task_id));

    let done = await_terminal(&h.registry, &created.task_id).await;
    assert_eq!(done.status, TaskStatus::Cancelled);

    // The in-flight attempt completed; nothing after it started.
    assert_eq!(done.nodes["n3"].status, NodeStatus::Success);
    assert_eq!(done.nodes["n4"].status, NodeStatus::Pending);
    assert_eq!(done.nodes["n5"].status, NodeStatus::Pending);
    assert!(done.nodes.values().all(|n| n.status != NodeStatus::Running));

    let events = drain(&sub);
    assert_eq!(task_updates(&events, TaskStatus::Cancelled), 1);
    assert!(node_updates(&events, "n4", NodeStatus::Running).is_empty());
    assert!(node_updates(&events, "n5", NodeStatus::Running).is_empty());
}

#[tokio::test(start_paused = true)]
async fn stopping_a_finished_task_is_a_no_op() {
    let h = harness(
        vec![plan(vec![node_json(
            "n1",
            None,
            "navigate_to",
            json!({"url": "https://a.test"}),
        )])],
        vec![ScriptedStep::Ok],
    );
    let created = h.registry.create("one step", TaskOptions::default()).unwrap();
    await_terminal(&h.registry, &created.task_id).await;
    assert!(!h.registry.stop(&created.task_id));
    assert_eq!(
        h.registry.get(&created.task_id).unwrap().status,
        TaskStatus::Completed
    );
}

// ── S6: wall-clock bound ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn hanging_tools_hit_the_wall_clock_budget() {
    let mut hang1 = node_json("n1", None, "navigate_to", json!({"url": "https://a.test"}));
    hang1["action"]["execution_timeout_seconds"] = json!(10);
    hang1["action"]["max_attempts"] = json!(5);
    let hang2 = node_json("n2", Some("n1"), "take_screenshot", json!({"task_topic": "x"}));

    let h = harness(
        vec![plan(vec![hang1, hang2])],
        vec![
            ScriptedStep::Hang,
            ScriptedStep::Hang,
            ScriptedStep::Hang,
            ScriptedStep::Hang,
            ScriptedStep::Hang,
        ],
    );

    let created = h
        .registry
        .create("hang forever", TaskOptions {
            max_execution_time_seconds: Some(5),
            ..Default::default()
        })
        .unwrap();
    let sub = h.bus.subscribe(&created.task_id);

    let done = await_terminal(&h.registry, &created.task_id).await;
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.nodes["n1"].status, NodeStatus::Failed);
    assert_eq!(done.nodes["n2"].status, NodeStatus::Failed);
    for node in done.nodes.values() {
        let reason = node.failure_reason.clone().unwrap();
        assert!(reason.contains(codes::E_WALL_CLOCK), "reason: {reason}");
    }

    let events = drain(&sub);
    assert_eq!(task_updates(&events, TaskStatus::Failed), 1);
    assert_eq!(node_updates(&events, "n1", NodeStatus::Failed).len(), 1);
    assert_eq!(node_updates(&events, "n2", NodeStatus::Failed).len(), 1);
}

// ── Failure policies at loop level ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn retry_only_failure_terminates_the_task() {
    let mut node = node_json("n1", None, "click_element", json!({"xpath": "//a"}));
    node["action"]["on_failure"] = json!("RETRY_ONLY");
    node["action"]["max_attempts"] = json!(2);
    let follow = node_json("n2", Some("n1"), "take_screenshot", json!({"task_topic": "x"}));

    let h = harness(
        vec![plan(vec![node, follow])],
        vec![
            ScriptedStep::Err(BrowserError::Net("down".into())),
            ScriptedStep::Err(BrowserError::Net("down".into())),
        ],
    );
    let created = h.registry.create("click it", TaskOptions::default()).unwrap();
    let done = await_terminal(&h.registry, &created.task_id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.nodes["n1"].status, NodeStatus::Failed);
    // RETRY_ONLY goes straight to finalization, leaving the child behind.
    assert_eq!(done.nodes["n2"].status, NodeStatus::Pending);
    assert_eq!(h.session.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn abort_failure_prunes_the_branch_and_fails_the_task() {
    let mut broken = node_json("n2", Some("n1"), "click_element", json!({"xpath": "//a"}));
    broken["action"]["on_failure"] = json!("ABORT");
    let h = harness(
        vec![plan(vec![
            node_json("n1", None, "navigate_to", json!({"url": "https://a.test"})),
            broken,
            node_json("n3", Some("n2"), "take_screenshot", json!({"task_topic": "x"})),
        ])],
        vec![
            ScriptedStep::Ok,
            ScriptedStep::Err(BrowserError::BadArg("bad xpath".into())),
        ],
    );
    let created = h.registry.create("navigate then click", TaskOptions::default()).unwrap();
    let done = await_terminal(&h.registry, &created.task_id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.nodes["n1"].status, NodeStatus::Success);
    assert_eq!(done.nodes["n2"].status, NodeStatus::Failed);
    assert_eq!(done.nodes["n3"].status, NodeStatus::Pruned);
}

#[tokio::test(start_paused = true)]
async fn correction_budget_exhaustion_aborts_instead_of_looping() {
    // The same failure signature twice trips the repeated-failure guard,
    // so only one correction round is spent.
    let failing = |id: &str, parent: Option<&str>| {
        let mut n = node_json(id, parent, "click_element", json!({"xpath": "//a"}));
        n["action"]["on_failure"] = json!("RE_EVALUATE");
        n
    };
    let h = harness(
        vec![
            plan(vec![
                node_json("n1", None, "navigate_to", json!({"url": "https://a.test"})),
                failing("n2", Some("n1")),
            ]),
            plan(vec![failing("c1", None)]),
        ],
        vec![
            ScriptedStep::Ok,
            ScriptedStep::Err(BrowserError::StaleDom("gone".into())),
            ScriptedStep::Err(BrowserError::StaleDom("gone".into())),
        ],
    );
    let created = h.registry.create("flaky click", TaskOptions::default()).unwrap();
    let done = await_terminal(&h.registry, &created.task_id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.nodes["n2"].status, NodeStatus::Failed);
    assert_eq!(done.nodes["c1"].status, NodeStatus::Failed);
    // Exactly two LM interactions: initial plan + one correction.
    let logs = h.registry.logs(&created.task_id);
    assert!(logs
        .iter()
        .any(|l| l.severity == Severity::Error && l.message.contains("keeps failing")));
}

// ── Registry surface ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn list_returns_most_recent_first() {
    let h = harness(
        vec![
            plan(vec![node_json("n1", None, "wait", json!({"seconds": 1}))]),
            plan(vec![node_json("n1", None, "wait", json!({"seconds": 1}))]),
        ],
        vec![],
    );
    let first = h.registry.create("first task", TaskOptions::default()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = h.registry.create("second task", TaskOptions::default()).unwrap();

    let listed = h.registry.list();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].task_id, second.task_id);
    assert_eq!(listed[1].task_id, first.task_id);
}

#[tokio::test(start_paused = true)]
async fn browser_acquisition_failure_fails_the_task() {
    let session = Arc::new(ScriptedSession::new(vec![]));
    let provider = Arc::new(ScriptedProvider::new(session));
    let bus = Arc::new(EventBus::new());
    let lm = Arc::new(ScriptedLm::new(vec![]));
    let registry = TaskRegistry::new(Arc::new(LoopServices::new(lm, provider.clone(), bus)));

    // First task consumes the only scripted session...
    let _ = provider.acquire("warmup", true).await.unwrap();
    let created = registry.create("no browser left", TaskOptions::default()).unwrap();
    let done = await_terminal(&registry, &created.task_id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(registry
        .logs(&created.task_id)
        .iter()
        .any(|l| l.severity == Severity::Error && l.message.contains("browser session unavailable")));
}
