use super::*;
use crate::domain::AgendaId;
use serde_json::json;

#[test]
fn parses_present_action_from_mobile_payload() {
    let raw = RawAction::new(
        "bible-present",
        json!({ "indices": [3], "version": "kjv", "bookIndex": 42, "chapterIndex": 0 }),
    );
    let action = MobileAction::parse(&raw).expect("present");
    let MobileAction::Present(request) = action else {
        panic!("expected present action");
    };
    assert_eq!(request.indices, vec![3]);
    assert_eq!(request.coords(), NavigationCoords::new("kjv", 42, 0));
}

#[test]
fn agenda_payloads_accept_underscore_ids() {
    let add = RawAction::new(
        "add-agenda",
        json!({ "_id": 1700000000000i64, "time": 300, "agenda": "Sermon", "anchor": "Pastor" }),
    );
    let MobileAction::AddAgenda(item) = MobileAction::parse(&add).expect("add") else {
        panic!("expected add-agenda");
    };
    assert_eq!(item.id, Some(AgendaId(1_700_000_000_000)));
    assert_eq!(item.time, 300);

    let edit = RawAction::new("edit-agenda", json!({ "_id": 7, "time": 360 }));
    let MobileAction::EditAgenda(edit) = MobileAction::parse(&edit).expect("edit") else {
        panic!("expected edit-agenda");
    };
    assert_eq!(edit.id, AgendaId(7));
    assert_eq!(edit.time, Some(360));
    assert_eq!(edit.agenda, None);

    let delete = RawAction::new("delete-agenda", json!({ "id": 7 }));
    assert_eq!(
        MobileAction::parse(&delete).expect("delete"),
        MobileAction::DeleteAgenda(AgendaRef { id: AgendaId(7) })
    );
}

#[test]
fn payloadless_actions_ignore_missing_payload() {
    let raw: RawAction = serde_json::from_value(json!({ "type": "stop-timer" })).expect("raw");
    assert_eq!(MobileAction::parse(&raw).expect("stop"), MobileAction::StopTimer);

    let raw: RawAction = serde_json::from_value(json!({ "type": "bible-get-books" })).expect("raw");
    assert_eq!(MobileAction::parse(&raw).expect("books"), MobileAction::GetBooks);
}

#[test]
fn unknown_action_type_is_distinguished_from_malformed_payload() {
    let unknown = RawAction::new("launch-confetti", Value::Null);
    assert_eq!(
        MobileAction::parse(&unknown),
        Err(ActionError::UnknownType("launch-confetti".into()))
    );

    let missing = RawAction::new("set-timer", Value::Null);
    assert!(matches!(
        MobileAction::parse(&missing),
        Err(ActionError::MalformedPayload { kind, .. }) if kind == "set-timer"
    ));

    let wrong_shape = RawAction::new("set-paused", json!({ "paused": "yes" }));
    assert!(matches!(
        MobileAction::parse(&wrong_shape),
        Err(ActionError::MalformedPayload { .. })
    ));
}

#[test]
fn chapter_query_rejects_zero_chapter() {
    let raw = RawAction::new(
        "bible-get-chapter",
        json!({ "version": "kjv", "bookId": 0, "chapter": 0 }),
    );
    assert!(matches!(
        MobileAction::parse(&raw),
        Err(ActionError::MalformedPayload { .. })
    ));

    let raw = RawAction::new(
        "bible-get-chapter",
        json!({ "version": "kjv", "bookId": 0, "chapter": 1 }),
    );
    assert!(matches!(
        MobileAction::parse(&raw),
        Ok(MobileAction::GetChapter(ChapterQuery { chapter: 1, .. }))
    ));
}

#[test]
fn intents_use_kebab_case_type_and_camel_case_fields() {
    let intent = Intent::SetTimer {
        seconds: 300,
        agenda_id: Some(AgendaId(9)),
    };
    let value = serde_json::to_value(&intent).expect("json");
    assert_eq!(
        value,
        json!({ "type": "set-timer", "payload": { "seconds": 300, "agendaId": 9 } })
    );

    let parsed: Intent = serde_json::from_value(json!({ "type": "clear-content" })).expect("intent");
    assert_eq!(parsed, Intent::ClearContent);
}

#[test]
fn content_serializes_with_type_and_data() {
    let content = PresentationContent::Bible {
        title: "John 1:4".into(),
        body: "In him was life".into(),
    };
    let value = serde_json::to_value(&content).expect("json");
    assert_eq!(
        value,
        json!({ "type": "bible", "data": { "title": "John 1:4", "body": "In him was life" } })
    );
    assert_eq!(
        serde_json::to_value(PresentationContent::None).expect("json"),
        json!({ "type": "none" })
    );
}

#[test]
fn controller_projection_splits_into_four_frames_sharing_a_revision() {
    let projection = Projection {
        revision: 12,
        mode: DisplayMode::Controller,
        timer: None,
        content: PresentationContent::None,
        style: PresentationStyle::default(),
        agenda: Some(Vec::new()),
    };
    let frames = projection.frames();
    assert_eq!(frames.len(), 4);
    assert!(frames.iter().all(|frame| frame.revision == 12));
    assert_eq!(frames[0].message, DisplayMessage::Timer(None));

    let general = Projection {
        mode: DisplayMode::General,
        agenda: None,
        ..projection
    };
    assert_eq!(general.frames().len(), 3);
}

#[test]
fn server_frames_use_event_and_data_envelope() {
    let frame = ServerFrame::MobileData(MobileData::BibleChapter(vec!["In the beginning".into()]));
    assert_eq!(
        serde_json::to_value(&frame).expect("json"),
        json!({
            "event": "mobile-data",
            "data": { "type": "bible-chapter", "payload": ["In the beginning"] }
        })
    );

    let client: ClientFrame = serde_json::from_value(json!({
        "event": "mobile-action",
        "data": { "type": "set-timer", "payload": { "time": 60 } }
    }))
    .expect("client frame");
    assert_eq!(
        client,
        ClientFrame::MobileAction(RawAction::new("set-timer", json!({ "time": 60 })))
    );
}

#[test]
fn controller_frames_carry_navigation_and_present() {
    let select: ClientFrame = serde_json::from_value(json!({
        "event": "select-verses",
        "data": { "mode": "extend", "index": 6 }
    }))
    .expect("select frame");
    assert_eq!(select, ClientFrame::SelectVerses(VerseSelection::Extend { index: 6 }));

    let present: ClientFrame = serde_json::from_value(json!({
        "event": "present",
        "data": { "indices": [2, 3], "version": "KJV", "bookIndex": 18, "chapterIndex": 22 }
    }))
    .expect("present frame");
    let ClientFrame::Present(request) = present else {
        panic!("expected present frame");
    };
    assert_eq!(request.coords(), NavigationCoords::new("KJV", 18, 22));
    assert_eq!(request.indices, vec![2, 3]);
}
