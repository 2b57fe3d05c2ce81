mod support;

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use rentline_client::{RealtimeChat, RealtimeProduct, RealtimeRental};
use rentline_shared::{
    ChatMessage, ClientEvent, EntityId, EventKind, MessageType, Product, QuantityUpdate,
    ReadReceipt, Rental, ServerEvent, TypingUpdate,
};
use serde_json::json;
use support::{client, settle, valid_token, MockConnector};

fn message(id: &str, conversation: &str) -> ServerEvent {
    let message: ChatMessage = serde_json::from_value(json!({
        "_id": id,
        "conversationId": conversation,
        "senderId": 5,
        "content": format!("message {id}"),
        "type": "text",
    }))
    .unwrap();
    ServerEvent::NewMessage(message)
}

fn typing(user: i64, is_typing: bool) -> ServerEvent {
    ServerEvent::UserTyping(TypingUpdate {
        conversation_id: "42".into(),
        user_id: user.into(),
        is_typing,
    })
}

fn rental(id: i64, status: &str) -> Rental {
    serde_json::from_value(json!({ "id": id, "rental_status": status })).unwrap()
}

#[tokio::test]
async fn chat_appends_only_its_own_conversation() {
    let mock = MockConnector::new();
    let client = client(&mock);
    let chat = RealtimeChat::mount(&client, "42");
    client.connect(&valid_token()).await.unwrap();

    mock.push(message("m1", "42"));
    mock.push(message("m2", "7"));
    settle().await;

    let messages = chat.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "m1");
    assert_eq!(messages[0].conversation_id, "42");
    assert!(chat.state().joined);
}

#[tokio::test]
async fn typing_set_ignores_repeats() {
    let mock = MockConnector::new();
    let client = client(&mock);
    let chat = RealtimeChat::mount(&client, "42");
    let mut updates = chat.subscribe();
    client.connect(&valid_token()).await.unwrap();
    updates.borrow_and_update();

    mock.push(typing(5, true));
    settle().await;
    assert!(updates.has_changed().unwrap());
    updates.borrow_and_update();

    mock.push(typing(5, true));
    settle().await;
    assert!(!updates.has_changed().unwrap());
    assert_eq!(chat.typing_users().into_iter().collect::<Vec<_>>(), vec![EntityId::from(5i64)]);

    mock.push(typing(5, false));
    settle().await;
    assert!(chat.typing_users().is_empty());
}

#[tokio::test]
async fn read_receipts_pass_through_unchanged() {
    let mock = MockConnector::new();
    let client = client(&mock);
    let seen: Arc<Mutex<Vec<ReadReceipt>>> = Arc::default();
    let _chat = {
        let seen = seen.clone();
        RealtimeChat::mount_with_receipts(&client, "42", move |receipt: &ReadReceipt| {
            seen.lock().unwrap().push(receipt.clone())
        })
    };
    client.connect(&valid_token()).await.unwrap();

    let receipt: ReadReceipt = serde_json::from_value(json!({
        "conversationId": "42",
        "messageId": "m1",
        "userId": 8,
        "readAt": "2026-03-01T10:00:00Z",
    }))
    .unwrap();
    mock.push(ServerEvent::MessageReadReceipt(receipt.clone()));
    mock.push(ServerEvent::MessageReadReceipt(ReadReceipt {
        conversation_id: "7".into(),
        ..receipt.clone()
    }));
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec![receipt]);
}

#[tokio::test]
async fn chat_emits_scoped_to_its_conversation() {
    let mock = MockConnector::new();
    let client = client(&mock);
    let chat = RealtimeChat::mount(&client, "42");
    client.connect(&valid_token()).await.unwrap();

    let envelope = chat.send_message("is the drill free friday?", MessageType::Text, None);
    chat.start_typing();
    chat.stop_typing();
    chat.mark_read("m1");

    assert_eq!(envelope.conversation_id, "42");
    assert!(chat.messages().is_empty());
    let sent = mock.sent();
    assert_eq!(sent[0], ClientEvent::JoinConversation("42".into()));
    assert_eq!(sent[1], ClientEvent::UserOnline);
    assert_eq!(sent[2], ClientEvent::SendMessage(envelope));
    assert_eq!(sent[3], ClientEvent::TypingStart("42".into()));
    assert_eq!(sent[4], ClientEvent::TypingStop("42".into()));
    assert!(matches!(&sent[5], ClientEvent::MessageRead(marker) if marker.message_id == "m1"));
}

#[tokio::test]
async fn unmount_removes_only_its_own_listeners() {
    let mock = MockConnector::new();
    let client = client(&mock);
    client.connect(&valid_token()).await.unwrap();

    let first = RealtimeChat::mount(&client, "42");
    let second = RealtimeChat::mount(&client, "42");
    assert_eq!(client.listener_count(EventKind::NewMessage), 2);

    drop(first);
    assert_eq!(client.listener_count(EventKind::NewMessage), 1);
    assert_eq!(client.listener_count(EventKind::UserTyping), 1);
    assert_eq!(client.listener_count(EventKind::MessageReadReceipt), 1);

    mock.push(message("m1", "42"));
    settle().await;
    assert_eq!(second.messages().len(), 1);

    // Joining twice is harmless; each view leaves what it joined.
    let sent = mock.sent();
    let joins = sent
        .iter()
        .filter(|e| **e == ClientEvent::JoinConversation("42".into()))
        .count();
    let leaves = sent
        .iter()
        .filter(|e| **e == ClientEvent::LeaveConversation("42".into()))
        .count();
    assert_eq!((joins, leaves), (2, 1));
}

#[tokio::test]
async fn unmount_before_connect_cancels_buffered_registration() {
    let mock = MockConnector::new();
    let client = client(&mock);
    let chat = RealtimeChat::mount(&client, "42");
    drop(chat);

    client.connect(&valid_token()).await.unwrap();
    assert_eq!(client.listener_count(EventKind::NewMessage), 0);
    assert_eq!(
        mock.sent(),
        vec![
            ClientEvent::JoinConversation("42".into()),
            ClientEvent::LeaveConversation("42".into()),
            ClientEvent::UserOnline,
        ]
    );
}

#[tokio::test]
async fn rental_snapshot_follows_matching_updates() {
    let mock = MockConnector::new();
    let client = client(&mock);
    let created = Arc::new(Mutex::new(Vec::new()));
    let hook = {
        let created = created.clone();
        RealtimeRental::mount_with_created(&client, "100", move |r: &Rental| {
            created.lock().unwrap().push(r.clone())
        })
    };
    client.connect(&valid_token()).await.unwrap();

    mock.push(ServerEvent::RentalUpdated(rental(100, "active")));
    settle().await;
    assert_eq!(hook.snapshot(), Some(rental(100, "active")));

    mock.push(ServerEvent::RentalUpdated(rental(999, "cancelled")));
    mock.push(ServerEvent::RentalCreated(rental(101, "pending")));
    settle().await;
    assert_eq!(hook.snapshot(), Some(rental(100, "active")));
    assert_eq!(*created.lock().unwrap(), vec![rental(101, "pending")]);

    drop(hook);
    assert_eq!(client.listener_count(EventKind::RentalUpdated), 0);
    assert_eq!(client.listener_count(EventKind::RentalCreated), 0);
    assert_eq!(
        mock.sent().last(),
        Some(&ClientEvent::LeaveRental("100".into()))
    );
}

#[tokio::test]
async fn late_seed_does_not_clobber_newer_push() {
    let mock = MockConnector::new();
    let client = client(&mock);
    let hook = RealtimeRental::mount(&client, "100");
    client.connect(&valid_token()).await.unwrap();

    let at = |minute| Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0).unwrap();
    let pushed = Rental {
        updated_at: Some(at(30)),
        ..rental(100, "active")
    };
    mock.push(ServerEvent::RentalUpdated(pushed.clone()));
    settle().await;

    let fetched = Rental {
        updated_at: Some(at(5)),
        ..rental(100, "pending")
    };
    assert!(!hook.seed(fetched));
    assert_eq!(hook.snapshot(), Some(pushed));

    let fresher = Rental {
        updated_at: Some(at(45)),
        ..rental(100, "returned")
    };
    assert!(hook.seed(fresher.clone()));
    assert_eq!(hook.snapshot(), Some(fresher));
}

#[tokio::test]
async fn product_hook_tracks_stock_and_deletion() {
    let mock = MockConnector::new();
    let client = client(&mock);
    let hook = RealtimeProduct::mount(&client, "p1");
    client.connect(&valid_token()).await.unwrap();

    assert!(hook.seed(Product {
        id: "p1".into(),
        name: Some("Cordless drill".to_string()),
        quantity: Some(3),
        ..Product::default()
    }));

    mock.push(ServerEvent::QuantityUpdated(QuantityUpdate {
        product_id: "p1".into(),
        quantity: 1,
    }));
    mock.push(ServerEvent::QuantityUpdated(QuantityUpdate {
        product_id: "p2".into(),
        quantity: 0,
    }));
    settle().await;
    let snapshot = hook.snapshot().unwrap();
    assert_eq!(snapshot.quantity, Some(1));
    assert_eq!(snapshot.name.as_deref(), Some("Cordless drill"));

    mock.push_frame(rentline_shared::EventFrame::new(
        "product_deleted",
        Some(json!("p1")),
    ));
    settle().await;
    assert!(hook.state().deleted);

    drop(hook);
    assert_eq!(client.listener_count(EventKind::ProductUpdated), 0);
    assert_eq!(client.listener_count(EventKind::QuantityUpdated), 0);
    assert_eq!(client.listener_count(EventKind::ProductDeleted), 0);
}

#[tokio::test]
async fn product_update_older_than_seed_is_ignored() {
    let mock = MockConnector::new();
    let client = client(&mock);
    let hook = RealtimeProduct::mount(&client, "p1");
    client.connect(&valid_token()).await.unwrap();

    let at = |minute| Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0).unwrap();
    let fetched = Product {
        id: "p1".into(),
        name: Some("Cordless drill".to_string()),
        quantity: Some(3),
        updated_at: Some(at(30)),
        ..Product::default()
    };
    assert!(hook.seed(fetched.clone()));

    mock.push(ServerEvent::ProductUpdated(Product {
        name: Some("Drill (old listing)".to_string()),
        quantity: Some(8),
        updated_at: Some(at(10)),
        ..fetched.clone()
    }));
    settle().await;
    assert_eq!(hook.snapshot(), Some(fetched));
}

#[tokio::test]
async fn dropped_connection_clears_joined_until_rejoin() {
    let mock = MockConnector::new();
    let client = client(&mock);
    let chat = RealtimeChat::mount(&client, "42");
    let product = RealtimeProduct::mount(&client, "p1");
    client.connect(&valid_token()).await.unwrap();
    assert!(chat.state().joined);

    mock.drop_connection();
    settle().await;
    assert!(!chat.state().joined);
    assert!(!product.state().joined);

    chat.rejoin();
    assert!(chat.state().joined);
    client.connect(&valid_token()).await.unwrap();
    let sent = mock.sent();
    let joins = sent
        .iter()
        .filter(|e| **e == ClientEvent::JoinConversation("42".into()))
        .count();
    assert_eq!(joins, 2);
    assert!(!product.state().joined);
}

#[tokio::test]
async fn failed_handshake_keeps_queued_join() {
    let mock = MockConnector::new();
    let client = client(&mock);
    let rental = RealtimeRental::mount(&client, "100");

    mock.fail_next(rentline_client::TransportError::Closed);
    assert!(client.connect(&valid_token()).await.is_err());
    settle().await;
    assert!(rental.state().joined);

    client.connect(&valid_token()).await.unwrap();
    assert_eq!(mock.sent()[0], ClientEvent::JoinRental("100".into()));
}
