mod common;

use std::sync::Arc;

use auto_mark_submit::infrastructure::{Key, PageEvent};
use auto_mark_submit::orchestrator::HostBridge;
use auto_mark_submit::services::ProfileResolver;
use auto_mark_submit::workflow::LoopController;
use common::{add_keypad, fast_config, noisy_png, FakeElement, FakePage, ScriptedScoring};
use serde_json::{json, Value};

fn bridge(page: &Arc<FakePage>) -> HostBridge {
    let scoring = Arc::new(ScriptedScoring::new());
    let controller =
        LoopController::new(page.clone(), scoring, ProfileResolver::builtin(), &fast_config());
    HostBridge::new(controller, "default")
}

async fn send(bridge: &HostBridge, line: &str) -> Value {
    serde_json::to_value(bridge.handle_line(line).await).unwrap()
}

#[tokio::test]
async fn test_check_ready_keeps_request_id() {
    let page = Arc::new(FakePage::new("https://mark.example.com/"));
    let bridge = bridge(&page);

    let reply = send(&bridge, r#"{"id": 4, "type": "check_ready"}"#).await;
    assert_eq!(reply, json!({"id": 4, "type": "ready", "ready": false}));

    page.add(FakeElement::canvas("sheet", noisy_png(21, 64, 64)));
    let reply = send(&bridge, r#"{"type": "check_ready"}"#).await;
    assert_eq!(reply, json!({"type": "ready", "ready": true}));
}

#[tokio::test]
async fn test_malformed_line_reports_error() {
    let page = Arc::new(FakePage::new("https://mark.example.com/"));
    let reply = send(&bridge(&page), r#"{"type": "reboot"}"#).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["message"].as_str().unwrap().contains("无法解析请求"));
}

#[tokio::test]
async fn test_scan_once_returns_report() {
    let page = Arc::new(FakePage::new(
        "https://mark.example.com/#/mark?questionId=7&examId=2",
    ));
    page.add(FakeElement::canvas("sheet", noisy_png(22, 64, 48)));
    page.set_text("学生: 李明 | 第 7 题");

    let reply = send(&bridge(&page), r#"{"id": 1, "type": "scan_once"}"#).await;
    assert_eq!(reply["type"], "scan");
    let report = &reply["report"];
    assert!(report["image"].as_str().unwrap().starts_with("data:image/png;base64,"));
    assert_eq!(report["width"], 64);
    assert_eq!(report["height"], 48);
    assert_eq!(report["sourceCount"], 1);
    assert!(report["fingerprint"].is_string());
    assert_eq!(report["context"]["questionId"], "7");
    assert_eq!(report["context"]["examId"], "2");
    assert_eq!(report["context"]["studentName"], "李明");
}

#[tokio::test]
async fn test_scan_once_on_finished_queue() {
    let page = Arc::new(FakePage::new("https://www.zhixue.com/marking"));
    page.set_text("没有待阅的试卷");

    let reply = send(&bridge(&page), r#"{"type": "scan_once"}"#).await;
    assert_eq!(reply, json!({"type": "error", "message": "已无待阅试卷"}));
}

#[tokio::test]
async fn test_fill_score_then_confirm() {
    let page = Arc::new(FakePage::new("https://mark.example.com/"));
    page.add(FakeElement::input("score"));
    let bridge = bridge(&page);

    let reply = send(&bridge, r#"{"type": "fill_score", "score": 4.5, "submit": false}"#).await;
    assert_eq!(reply, json!({"type": "score_filled", "strategy": "text_input"}));
    assert_eq!(page.value_of("score").as_deref(), Some("4.5"));

    let reply = send(&bridge, r#"{"type": "confirm_submit"}"#).await;
    assert_eq!(reply, json!({"type": "submit_confirmed"}));
    assert_eq!(
        page.events_on("score"),
        vec![PageEvent::Focus, PageEvent::Key(Key::Enter)]
    );
}

#[tokio::test]
async fn test_fill_score_with_keypad() {
    let page = Arc::new(FakePage::new("https://mark.example.com/"));
    add_keypad(&page, 10);

    let reply = send(&bridge(&page), r#"{"type": "fill_score", "score": 3}"#).await;
    assert_eq!(reply, json!({"type": "score_filled", "strategy": "keypad"}));
    assert_eq!(page.events_on("k3"), vec![PageEvent::Press]);
}

#[tokio::test]
async fn test_loop_start_status_stop() {
    let page = Arc::new(FakePage::new("https://mark.example.com/"));
    let bridge = bridge(&page);

    let reply = send(&bridge, r#"{"type": "status"}"#).await;
    assert_eq!(reply["state"]["running"], false);
    assert_eq!(reply["state"]["phase"], "idle");

    let reply = send(&bridge, r#"{"type": "start_loop", "strategyId": " "}"#).await;
    assert_eq!(reply, json!({"type": "loop_started", "started": true}));
    assert_eq!(
        bridge.controller().status().strategy_id.as_deref(),
        Some("default")
    );

    let reply = send(&bridge, r#"{"type": "start_loop"}"#).await;
    assert_eq!(reply["started"], false);

    let reply = send(&bridge, r#"{"type": "stop_loop"}"#).await;
    assert_eq!(reply["type"], "loop_stopped");
    assert_eq!(reply["state"]["running"], false);
    assert_eq!(reply["state"]["phase"], "stopped");
    bridge.controller().join().await;
}

#[tokio::test]
async fn test_page_context_request() {
    let page = Arc::new(FakePage::new("https://pj.7net.cc/mark?qid=15"));
    let reply = send(&bridge(&page), r#"{"type": "get_page_context"}"#).await;
    assert_eq!(reply["type"], "page_context");
    assert_eq!(reply["context"]["questionId"], "15");
    assert_eq!(reply["context"]["platform"], "qitian");
}
