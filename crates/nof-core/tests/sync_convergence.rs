//! Cross-tier convergence over in-process exchanges: CTRL -> DASH -> RASH.

use nof_core::models::{hosts, jobs, tasks, tasktemplates};
use nof_core::{ActionKind, ActionRegistry, ActivityLog, Database, Direction, Staging};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

struct Tier {
    _dir: TempDir,
    log: ActivityLog,
}

fn tier(name: &str, staging: Staging) -> Tier {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join(format!("{name}.db"))).unwrap();
    nof_core::schema::setup_all_tables(&db).unwrap();
    let log = ActivityLog::new(db, name, ActionRegistry::with_model_handlers(), staging).unwrap();
    Tier { _dir: dir, log }
}

fn topology() -> (Tier, Tier, Tier) {
    let ctrl = tier(
        "CTRL",
        Staging {
            northbound: true,
            southbound: false,
        },
    );
    let dash = tier("DASH", Staging::BOTH);
    let rash = tier(
        "RASH",
        Staging {
            northbound: false,
            southbound: true,
        },
    );
    (ctrl, dash, rash)
}

/// One push-pull round initiated by `south` against `north`.
fn exchange(south: &ActivityLog, north: &ActivityLog) {
    let outbound = south.drain_northbound().unwrap();
    north.sync(outbound, Direction::Southbound).unwrap();
    let inbound = north.drain_southbound().unwrap();
    south.sync(inbound, Direction::Northbound).unwrap();
}

fn cycle(ctrl: &Tier, dash: &Tier, rash: &Tier) {
    exchange(&ctrl.log, &dash.log);
    exchange(&dash.log, &rash.log);
}

fn count_uuid(log: &ActivityLog, uuid: Uuid) -> usize {
    log.all().unwrap().iter().filter(|a| a.uuid == uuid).count()
}

#[test]
fn activity_from_remote_dashboard_reaches_controller_once() {
    let (ctrl, dash, rash) = topology();
    let (uuid, _) = rash
        .log
        .call_action(ActionKind::HostAdd, json!({"name": "h1", "ip": "127.0.0.1"}))
        .unwrap();

    cycle(&ctrl, &dash, &rash);
    cycle(&ctrl, &dash, &rash);

    for t in [&ctrl, &dash, &rash] {
        assert_eq!(count_uuid(&t.log, uuid), 1, "{}", t.log.source_name());
    }

    cycle(&ctrl, &dash, &rash);
    for t in [&ctrl, &dash, &rash] {
        assert_eq!(count_uuid(&t.log, uuid), 1);
        assert_eq!(t.log.pending(Direction::Northbound).unwrap(), 0);
        assert_eq!(t.log.pending(Direction::Southbound).unwrap(), 0);
    }

    let activity = ctrl.log.get(uuid).unwrap().unwrap();
    assert_eq!(activity.source_name, "RASH");
}

#[test]
fn controller_results_flow_north() {
    let (ctrl, dash, rash) = topology();
    let job = Uuid::new_v4();
    ctrl.log
        .call_action(
            ActionKind::ResultAdd,
            json!({"job_uuid": job, "result": "hi\n", "timestamp": 1}),
        )
        .unwrap();

    cycle(&ctrl, &dash, &rash);

    for t in [&dash, &rash] {
        let results = t
            .log
            .database()
            .with_connection(|c| nof_core::models::results::for_job(c, job))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result, "hi\n");
    }
}

#[test]
fn synced_activity_is_not_staged_back() {
    let (_ctrl, dash, rash) = topology();
    rash.log
        .call_action(ActionKind::HostAdd, json!({"name": "h1", "ip": "10.0.0.1"}))
        .unwrap();

    exchange(&dash.log, &rash.log);

    assert_eq!(dash.log.pending(Direction::Northbound).unwrap(), 0);
    assert_eq!(dash.log.pending(Direction::Southbound).unwrap(), 1);
}

#[test]
fn concurrent_changes_on_both_sides_converge() {
    let (ctrl, dash, rash) = topology();
    let (a, _) = rash
        .log
        .call_action(ActionKind::HostAdd, json!({"name": "a", "ip": "10.0.0.1"}))
        .unwrap();
    let (b, _) = dash
        .log
        .call_action(ActionKind::HostAdd, json!({"name": "b", "ip": "10.0.0.2"}))
        .unwrap();

    cycle(&ctrl, &dash, &rash);
    cycle(&ctrl, &dash, &rash);

    for t in [&ctrl, &dash, &rash] {
        assert_eq!(count_uuid(&t.log, a), 1);
        assert_eq!(count_uuid(&t.log, b), 1);
        assert_eq!(t.log.database().with_connection(hosts::count).unwrap(), 2);
    }
}

#[test]
fn cascade_deletes_replay_everywhere() {
    let (ctrl, dash, rash) = topology();
    let (_, host) = rash
        .log
        .call_action(ActionKind::HostAdd, json!({"name": "h1", "ip": "127.0.0.1"}))
        .unwrap();
    let (_, template) = rash
        .log
        .call_action(
            ActionKind::TasktemplateAdd,
            json!({"type": "shell", "cmd": "echo hi", "interval": 5}),
        )
        .unwrap();
    rash.log
        .call_action(
            ActionKind::TaskAdd,
            json!({"host_uuid": host["uuid"], "tasktemplate_uuid": template["uuid"]}),
        )
        .unwrap();

    cycle(&ctrl, &dash, &rash);
    cycle(&ctrl, &dash, &rash);
    assert_eq!(ctrl.log.database().with_connection(jobs::all).unwrap().len(), 1);

    rash.log
        .call_action(ActionKind::TasktemplateDelete, json!({"uuid": template["uuid"]}))
        .unwrap();
    cycle(&ctrl, &dash, &rash);
    cycle(&ctrl, &dash, &rash);

    for t in [&ctrl, &dash, &rash] {
        let db = t.log.database();
        assert_eq!(db.with_connection(tasks::count).unwrap(), 0);
        assert_eq!(db.with_connection(tasktemplates::count).unwrap(), 0);
        assert_eq!(db.with_connection(hosts::count).unwrap(), 1);
        assert!(db.with_connection(jobs::all).unwrap().is_empty());
    }
}

#[test]
fn failed_exchange_keeps_batch_for_next_cycle() {
    let (ctrl, dash, _rash) = topology();
    let (uuid, _) = ctrl
        .log
        .call_action(
            ActionKind::ResultAdd,
            json!({"job_uuid": Uuid::new_v4(), "result": "x"}),
        )
        .unwrap();

    // Peer unreachable: the drained batch goes back.
    let batch = ctrl.log.drain_northbound().unwrap();
    ctrl.log.requeue(Direction::Northbound, &batch).unwrap();
    assert_eq!(ctrl.log.pending(Direction::Northbound).unwrap(), 1);

    exchange(&ctrl.log, &dash.log);
    assert_eq!(count_uuid(&dash.log, uuid), 1);
}

#[test]
fn entity_uuid_clash_does_not_wedge_the_link() {
    let (_ctrl, dash, rash) = topology();
    let shared = Uuid::new_v4();
    dash.log
        .call_action(
            ActionKind::HostAdd,
            json!({"uuid": shared, "name": "dash-side", "ip": "10.0.0.1"}),
        )
        .unwrap();
    rash.log
        .call_action(
            ActionKind::HostAdd,
            json!({"uuid": shared, "name": "rash-side", "ip": "10.0.0.2"}),
        )
        .unwrap();

    // A second local add under the same uuid is refused, not a storage error.
    let err = rash
        .log
        .call_action(
            ActionKind::HostAdd,
            json!({"uuid": shared, "name": "again", "ip": "10.0.0.3"}),
        )
        .unwrap_err();
    assert!(matches!(err, nof_core::NofError::EntityExists { uuid, .. } if uuid == shared));

    let (later_south, _) = rash
        .log
        .call_action(ActionKind::HostAdd, json!({"name": "later", "ip": "10.0.0.4"}))
        .unwrap();
    let (later_north, _) = dash
        .log
        .call_action(ActionKind::HostAdd, json!({"name": "north", "ip": "10.0.0.5"}))
        .unwrap();

    // Each round trip succeeds; the clashing activity is rejected on arrival.
    let outbound = dash.log.drain_northbound().unwrap();
    let at_rash = rash.log.sync(outbound, Direction::Southbound).unwrap();
    assert_eq!((at_rash.applied, at_rash.rejected), (1, 1));
    let inbound = rash.log.drain_southbound().unwrap();
    let at_dash = dash.log.sync(inbound, Direction::Northbound).unwrap();
    assert_eq!((at_dash.applied, at_dash.rejected), (1, 1));

    for _ in 0..2 {
        exchange(&dash.log, &rash.log);
    }

    assert_eq!(count_uuid(&dash.log, later_south), 1);
    assert_eq!(count_uuid(&rash.log, later_north), 1);
    for t in [&dash, &rash] {
        assert_eq!(t.log.pending(Direction::Northbound).unwrap(), 0);
        assert_eq!(t.log.database().with_connection(hosts::count).unwrap(), 3);
    }
}
