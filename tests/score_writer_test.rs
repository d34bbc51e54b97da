mod common;

use std::sync::Arc;

use auto_mark_submit::error::WriteError;
use auto_mark_submit::infrastructure::{ElementKind, Geometry, Key, PageEvent};
use auto_mark_submit::models::PlatformProfile;
use auto_mark_submit::services::{ScoreWriter, SubmissionMode, SubmitOptions, WriteStrategy};
use common::{add_keypad, fast_config, Effect, FakeElement, FakePage};

fn writer(page: &Arc<FakePage>) -> ScoreWriter {
    ScoreWriter::new(page.clone(), fast_config().thresholds)
}

fn options(mode: SubmissionMode) -> SubmitOptions {
    SubmitOptions { mode, submit: true }
}

#[tokio::test]
async fn test_keypad_press_confirmed_by_selected_class() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    add_keypad(&page, 10);

    let strategy = writer(&page)
        .write(7.0, &PlatformProfile::generic(), SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(strategy, WriteStrategy::Keypad);
    assert_eq!(page.events_on("k7"), vec![PageEvent::Press]);
    assert!(page.events_on("k6").is_empty());
}

#[tokio::test]
async fn test_keypad_rounds_fractional_score() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    add_keypad(&page, 10);

    writer(&page)
        .write(6.6, &PlatformProfile::generic(), SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(page.events_on("k7"), vec![PageEvent::Press]);
}

#[tokio::test]
async fn test_missing_keypad_value_falls_back_to_input() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    add_keypad(&page, 5);
    page.add(FakeElement::input("score"));
    page.add(FakeElement::button("submit", "提交"));

    let strategy = writer(&page)
        .write(8.0, &PlatformProfile::generic(), options(SubmissionMode::Both))
        .await
        .unwrap();

    assert_eq!(strategy, WriteStrategy::TextInput);
    assert_eq!(page.value_of("score").as_deref(), Some("8"));
    assert_eq!(
        page.events_on("score"),
        vec![PageEvent::Focus, PageEvent::Key(Key::Enter)]
    );
    assert_eq!(page.events_on("submit"), vec![PageEvent::Press]);
}

#[tokio::test]
async fn test_unconfirmed_keypad_clicks_submit() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    for value in 0..=10 {
        page.add(FakeElement::button(&format!("k{}", value), &value.to_string()).matching(".score-btn"));
    }
    page.add(FakeElement::button("submit", "提交").matching(".submit-btn"));

    let strategy = writer(&page)
        .write(4.0, &PlatformProfile::generic(), SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(strategy, WriteStrategy::Keypad);
    assert_eq!(page.events_on("k4"), vec![PageEvent::Press]);
    assert_eq!(page.events_on("submit"), vec![PageEvent::Press]);
}

#[tokio::test]
async fn test_inactive_class_is_not_a_confirmation() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    for value in 0..=10 {
        let mut button =
            FakeElement::button(&format!("k{}", value), &value.to_string()).matching(".score-btn");
        button.info.class_name = "score-btn inactive".to_string();
        page.add(button);
    }

    let err = writer(&page)
        .write(7.0, &PlatformProfile::generic(), SubmitOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err, WriteError::NoScoreTarget);
    assert_eq!(page.events_on("k7"), vec![PageEvent::Press]);
}

#[tokio::test]
async fn test_button_selected_before_press_is_not_a_confirmation() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    for value in 0..=10 {
        let mut button =
            FakeElement::button(&format!("k{}", value), &value.to_string()).matching(".score-btn");
        if value == 4 {
            button.info.class_name = "score-btn selected".to_string();
        }
        page.add(button);
    }
    page.add(FakeElement::button("submit", "提交").matching(".submit-btn"));

    let strategy = writer(&page)
        .write(4.0, &PlatformProfile::generic(), SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(strategy, WriteStrategy::Keypad);
    assert_eq!(page.events_on("submit"), vec![PageEvent::Press]);
}

#[tokio::test]
async fn test_unconfirmed_keypad_without_submit_flag_stops_after_press() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    for value in 0..=10 {
        page.add(FakeElement::button(&format!("k{}", value), &value.to_string()).matching(".score-btn"));
    }
    page.add(FakeElement::button("submit", "提交").matching(".submit-btn"));

    let strategy = writer(&page)
        .fill_score(4.0, &PlatformProfile::generic(), false)
        .await
        .unwrap();

    assert_eq!(strategy, WriteStrategy::Keypad);
    assert!(page.events_on("submit").is_empty());
}

#[tokio::test]
async fn test_value_mismatch_reported() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    page.add(FakeElement::input("score"));
    page.refuse_set_value();

    let err = writer(&page)
        .write(6.0, &PlatformProfile::generic(), options(SubmissionMode::Click))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        WriteError::ValueMismatch {
            expected: "6".to_string(),
            actual: Some(String::new()),
        }
    );
}

#[tokio::test]
async fn test_no_target_at_all() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    page.add(FakeElement::button("back", "返回"));

    let err = writer(&page)
        .write(6.0, &PlatformProfile::generic(), SubmitOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, WriteError::NoScoreTarget);
}

#[tokio::test]
async fn test_click_mode_uses_labelled_button() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    page.add(FakeElement::input("score"));
    page.add(FakeElement::button("cancel", "取消"));
    page.add(FakeElement::button("ok", "确定"));

    writer(&page)
        .write(9.0, &PlatformProfile::generic(), options(SubmissionMode::Click))
        .await
        .unwrap();

    assert_eq!(page.events_on("ok"), vec![PageEvent::Press]);
    assert!(page.events_on("cancel").is_empty());
    assert_eq!(page.events_on("score"), vec![PageEvent::Focus]);
}

#[tokio::test]
async fn test_keystroke_mode_with_fractional_score() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task/1"));
    page.add(
        FakeElement::input("score")
            .on_enter(Effect::Navigate("https://mark.example.com/task/2".to_string())),
    );

    let strategy = writer(&page)
        .write(3.46, &PlatformProfile::generic(), options(SubmissionMode::Keystroke))
        .await
        .unwrap();

    assert_eq!(strategy, WriteStrategy::TextInput);
    assert_eq!(page.value_of("score").as_deref(), Some("3.5"));
    assert_eq!(page.href(), "https://mark.example.com/task/2");
}

#[tokio::test]
async fn test_keystroke_without_progress_or_button_fails() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task/1"));
    page.add(FakeElement::input("score"));

    let err = writer(&page)
        .write(5.0, &PlatformProfile::generic(), options(SubmissionMode::Keystroke))
        .await
        .unwrap_err();
    assert_eq!(err, WriteError::NoSubmitControl);
}

#[tokio::test]
async fn test_auto_submit_switch_turned_on() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    let mut switch = FakeElement::new("auto", ElementKind::Other, "div")
        .matching("[role='switch']")
        .on_press(Effect::SetToggled(true));
    switch.info.context_text = "自动提交".to_string();
    switch.info.class_name = "el-switch".to_string();
    page.add(switch);

    let writer = writer(&page);
    assert!(writer.ensure_auto_submit(&PlatformProfile::generic()).await.unwrap());
    assert_eq!(page.events_on("auto"), vec![PageEvent::Click]);
    assert_eq!(page.info_of("auto").unwrap().toggled, Some(true));
}

#[tokio::test]
async fn test_unchecked_switch_class_is_turned_on() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    let mut switch = FakeElement::new("auto", ElementKind::Other, "div")
        .matching("[role='switch']")
        .on_press(Effect::AddClass("is-checked".to_string()));
    switch.info.context_text = "自动提交".to_string();
    switch.info.class_name = "el-switch is-unchecked".to_string();
    page.add(switch);

    let writer = writer(&page);
    assert!(writer.ensure_auto_submit(&PlatformProfile::generic()).await.unwrap());
    assert_eq!(page.events_on("auto"), vec![PageEvent::Click]);
}

#[tokio::test]
async fn test_stateless_auto_submit_icon_clicked_once_per_session() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    let mut icon = FakeElement::new("auto", ElementKind::Other, "i").matching(".auto-submit i");
    icon.info.context_text = "自动提交".to_string();
    icon.info.class_name = "iconfont".to_string();
    page.add(icon);
    page.add(FakeElement::input("score"));
    page.add(FakeElement::button("submit", "提交"));

    let writer = writer(&page);
    let profile = PlatformProfile::generic();
    writer.write(5.0, &profile, options(SubmissionMode::Click)).await.unwrap();
    writer.write(6.0, &profile, options(SubmissionMode::Click)).await.unwrap();

    assert_eq!(page.events_on("auto"), vec![PageEvent::Click]);
    assert_eq!(page.events_on("submit").len(), 2);
}

#[tokio::test]
async fn test_focused_input_used_when_selectors_miss() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    let mut wide = FakeElement::input("wide").at(Geometry::new(40.0, 300.0, 480.0, 30.0));
    wide.info.input_type = Some("number".to_string());
    page.add(wide);
    page.add(FakeElement::button("submit", "保存"));

    let writer = writer(&page);
    let profile = PlatformProfile::generic();
    assert_eq!(writer.find_score_input(&profile).await.unwrap(), None);

    page.focus("wide");
    let found = writer.find_score_input(&profile).await.unwrap().unwrap();
    assert_eq!(found.token, "wide");

    writer.write(2.0, &profile, options(SubmissionMode::Click)).await.unwrap();
    assert_eq!(page.value_of("wide").as_deref(), Some("2"));
}

#[tokio::test]
async fn test_confirm_submit_presses_enter_without_button() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    page.add(FakeElement::input("score"));
    page.focus("score");

    writer(&page).confirm_submit(&PlatformProfile::generic()).await.unwrap();
    assert_eq!(page.events_on("score"), vec![PageEvent::Key(Key::Enter)]);
}

#[tokio::test]
async fn test_confirm_submit_prefers_button() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    page.add(FakeElement::input("score"));
    page.add(FakeElement::button("submit", "提交"));
    page.focus("score");

    writer(&page).confirm_submit(&PlatformProfile::generic()).await.unwrap();
    assert_eq!(page.events_on("submit"), vec![PageEvent::Press]);
    assert!(page.events_on("score").is_empty());
}

#[tokio::test]
async fn test_fill_without_submit_leaves_page_alone() {
    let page = Arc::new(FakePage::new("https://mark.example.com/task"));
    page.add(FakeElement::input("score"));
    page.add(FakeElement::button("submit", "提交"));

    let strategy = writer(&page)
        .fill_score(5.0, &PlatformProfile::generic(), false)
        .await
        .unwrap();

    assert_eq!(strategy, WriteStrategy::TextInput);
    assert_eq!(page.value_of("score").as_deref(), Some("5"));
    assert_eq!(page.events_on("score"), vec![PageEvent::Focus]);
    assert!(page.events_on("submit").is_empty());
}
