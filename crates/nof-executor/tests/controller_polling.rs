use std::time::Duration;

use mockito::Matcher;
use nof_executor::{ControllerClient, Scheduler};
use serde_json::json;
use uuid::Uuid;

async fn wait_until_matched(mock: &mockito::Mock) -> bool {
    for _ in 0..50 {
        if mock.matched_async().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn poll_starts_worker_that_reports_output() {
    let mut server = mockito::Server::new_async().await;
    let job = Uuid::new_v4();
    let _jobs = server
        .mock("GET", "/jobs.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([{"uuid": job, "type": "shell", "opts": {"cmd": "echo hi", "interval": 60}}])
                .to_string(),
        )
        .create_async()
        .await;
    let report = server
        .mock("POST", "/report")
        .match_body(Matcher::PartialJson(json!({"uuid": job, "result": "hi\n"})))
        .with_status(200)
        .with_body(r#"{"status":"ok"}"#)
        .create_async()
        .await;

    let scheduler = Scheduler::new(ControllerClient::new(&server.url()).unwrap());
    let outcome = scheduler.poll_once().await.unwrap();
    assert_eq!(outcome.started, vec![job]);

    assert!(wait_until_matched(&report).await, "no report reached the controller");
    scheduler.stop_all().await;
}

#[tokio::test]
async fn formatted_output_is_reported() {
    let mut server = mockito::Server::new_async().await;
    let job = Uuid::new_v4();
    let _jobs = server
        .mock("GET", "/jobs.json")
        .with_status(200)
        .with_body(
            json!([{
                "uuid": job,
                "type": "oneshot",
                "opts": {
                    "cmd": "echo 'Hello, World!'",
                    "pattern": "(?<greeting>Hello)",
                    "template": "{greeting}",
                },
            }])
            .to_string(),
        )
        .create_async()
        .await;
    let report = server
        .mock("POST", "/report")
        .match_body(Matcher::PartialJson(json!({"uuid": job, "result": "Hello"})))
        .with_status(200)
        .create_async()
        .await;

    let scheduler = Scheduler::new(ControllerClient::new(&server.url()).unwrap());
    assert_eq!(scheduler.poll_once().await.unwrap().fired, vec![job]);
    assert!(wait_until_matched(&report).await);
    scheduler.stop_all().await;
}

#[tokio::test]
async fn failed_poll_leaves_workers_running() {
    let mut server = mockito::Server::new_async().await;
    let job = Uuid::new_v4();
    let jobs = server
        .mock("GET", "/jobs.json")
        .with_status(200)
        .with_body(
            json!([{"uuid": job, "type": "shell", "opts": {"cmd": "sleep 30", "interval": 60}}])
                .to_string(),
        )
        .create_async()
        .await;

    let scheduler = Scheduler::new(ControllerClient::new(&server.url()).unwrap());
    scheduler.poll_once().await.unwrap();
    let instance = scheduler.worker_instance(job).unwrap();

    jobs.remove_async().await;
    let _down = server
        .mock("GET", "/jobs.json")
        .with_status(500)
        .create_async()
        .await;

    assert!(scheduler.poll_once().await.is_err());
    assert_eq!(scheduler.worker_instance(job), Some(instance));
    scheduler.stop_all().await;
}

#[tokio::test]
async fn empty_job_list_stops_workers() {
    let mut server = mockito::Server::new_async().await;
    let job = Uuid::new_v4();
    let jobs = server
        .mock("GET", "/jobs.json")
        .with_status(200)
        .with_body(
            json!([{"uuid": job, "type": "shell", "opts": {"cmd": "sleep 30", "interval": 60}}])
                .to_string(),
        )
        .create_async()
        .await;

    let scheduler = Scheduler::new(ControllerClient::new(&server.url()).unwrap());
    scheduler.poll_once().await.unwrap();
    assert_eq!(scheduler.running(), vec![job]);

    jobs.remove_async().await;
    let _empty = server
        .mock("GET", "/jobs.json")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let outcome = scheduler.poll_once().await.unwrap();
    assert_eq!(outcome.stopped, vec![job]);
    assert!(scheduler.running().is_empty());
}
