use parley_api::frames::{ClientFrame, ErrorCode, ServerFrame};
use parley_api::types::{
    MessageDto, MessageId, RoomId, SendMessageRequest, UserId, ValidationLimits,
};
use parley_api::validation::{validate_message_request, validate_room_name, ValidationError};
use serde_json::json;
use uuid::Uuid;

#[test]
fn client_frame_wire_shapes() {
    let room = RoomId(Uuid::nil());
    let frame: ClientFrame =
        serde_json::from_value(json!({"type": "SUBSCRIBE", "roomId": room})).expect("subscribe");
    assert_eq!(frame, ClientFrame::Subscribe { room_id: room });

    let frame: ClientFrame =
        serde_json::from_value(json!({"type": "UNSUBSCRIBE", "roomId": room}))
            .expect("unsubscribe");
    assert_eq!(frame, ClientFrame::Unsubscribe { room_id: room });

    let frame: ClientFrame =
        serde_json::from_value(json!({"type": "HEARTBEAT"})).expect("heartbeat");
    assert_eq!(frame, ClientFrame::Heartbeat);
}

#[test]
fn unrecognized_type_becomes_unknown() {
    let frame: ClientFrame =
        serde_json::from_value(json!({"type": "DANCE"})).expect("unknown tag still parses");
    assert_eq!(frame, ClientFrame::Unknown);
}

#[test]
fn server_frame_wire_shapes_stable() {
    let room = RoomId(Uuid::nil());
    let value = serde_json::to_value(ServerFrame::Subscribed { room_id: room }).unwrap();
    assert_eq!(value, json!({"type": "subscribed", "roomId": Uuid::nil()}));

    let value = serde_json::to_value(ServerFrame::Presence {
        room_id: room,
        user_id: UserId::new("alice"),
        online: true,
    })
    .unwrap();
    assert_eq!(
        value,
        json!({"type": "presence", "roomId": Uuid::nil(), "userId": "alice", "online": true})
    );

    let value = serde_json::to_value(ServerFrame::Pong { server_time: 42 }).unwrap();
    assert_eq!(value, json!({"type": "pong", "serverTime": 42}));

    let value = serde_json::to_value(ServerFrame::Error {
        code: ErrorCode::UnknownType,
        message: "unrecognized frame type".to_string(),
    })
    .unwrap();
    assert_eq!(
        value,
        json!({"type": "error", "code": "UNKNOWN_TYPE", "message": "unrecognized frame type"})
    );
}

#[test]
fn message_frame_flattens_dto_fields() {
    let dto = MessageDto {
        id: MessageId(Uuid::nil()),
        room_id: RoomId(Uuid::nil()),
        sender_id: UserId::new("alice"),
        content: "hi".to_string(),
        quoted_message_id: None,
        mentioned_user_ids: vec![UserId::new("bob")],
        created_at_ms: 7,
        seq: 1,
    };
    let value = serde_json::to_value(ServerFrame::Message { message: dto }).unwrap();
    assert_eq!(value["type"], "message");
    assert_eq!(value["content"], "hi");
    assert_eq!(value["seq"], 1);
    assert_eq!(value["mentionedUserIds"][0], "bob");
}

#[test]
fn message_request_validation_limits() {
    let limits = ValidationLimits::default();
    let base = SendMessageRequest {
        room_id: RoomId::random(),
        sender_id: UserId::new("alice"),
        content: "hello".to_string(),
        quoted_message_id: None,
        mentioned_user_ids: Vec::new(),
    };
    assert!(validate_message_request(&base, &limits).is_ok());

    let mut empty = base.clone();
    empty.content = "   ".to_string();
    assert_eq!(
        validate_message_request(&empty, &limits),
        Err(ValidationError::Empty("content"))
    );

    let mut long = base.clone();
    long.content = "x".repeat(limits.max_content_bytes + 1);
    assert_eq!(
        validate_message_request(&long, &limits),
        Err(ValidationError::TooLong("content"))
    );

    let mut mentions = base;
    mentions.mentioned_user_ids = (0..=limits.max_mentions)
        .map(|i| UserId::new(format!("u{i}")))
        .collect();
    assert_eq!(
        validate_message_request(&mentions, &limits),
        Err(ValidationError::TooMany("mentions"))
    );
}

#[test]
fn room_name_validation() {
    let limits = ValidationLimits::default();
    assert!(validate_room_name("general", &limits).is_ok());
    assert_eq!(
        validate_room_name("", &limits),
        Err(ValidationError::Empty("room_name"))
    );
    assert_eq!(
        validate_room_name(&"n".repeat(200), &limits),
        Err(ValidationError::TooLong("room_name"))
    );
}
