use super::{test_core, text_message, user};
use crate::time::now_ms;
use std::collections::HashMap;

#[tokio::test]
async fn get_or_init_seeds_now_not_epoch() {
    let core = test_core("cursor-seed");
    let alice = user("alice");
    let bob = user("bob");
    let room = core
        .create_room("general".to_string(), alice.clone())
        .await
        .expect("create");
    // Pre-join history exists before bob's first cursor read.
    core.send_message(text_message(room.id, &alice, "before"))
        .await
        .expect("send");
    core.join_room(&room.id, bob.clone()).await.expect("join");

    let before = now_ms();
    let seeded = core.get_or_init_cursor(&bob, &room.id).await.expect("init");
    assert!(seeded >= before, "cursor must seed to now, not epoch");

    // A second read returns the stored value instead of reseeding.
    let again = core.get_or_init_cursor(&bob, &room.id).await.expect("again");
    assert_eq!(again, seeded);

    // With the seeded cursor, pre-join history is not unread.
    let unread = core
        .count_unread_for_user(&room.id, Some(seeded), &bob)
        .await
        .expect("count");
    assert_eq!(unread, 0);
}

#[tokio::test]
async fn update_last_seen_is_monotonic_in_either_order() {
    let core = test_core("cursor-mono");
    let alice = user("alice");
    let room = core
        .create_room("general".to_string(), alice.clone())
        .await
        .expect("create");

    core.update_last_seen(&alice, &room.id, 100).await.expect("t1");
    core.update_last_seen(&alice, &room.id, 200).await.expect("t2");
    assert_eq!(core.read_cursor(&alice, &room.id).await.expect("read"), Some(200));

    let bob = user("bob");
    core.join_room(&room.id, bob.clone()).await.expect("join");
    core.update_last_seen(&bob, &room.id, 200).await.expect("t2 first");
    let stored = core.update_last_seen(&bob, &room.id, 100).await.expect("t1 late");
    assert_eq!(stored, 200, "cursor can never move backward");
    assert_eq!(core.read_cursor(&bob, &room.id).await.expect("read"), Some(200));
}

#[tokio::test]
async fn null_cursor_counts_everything_except_own_messages() {
    let core = test_core("cursor-null");
    let alice = user("alice");
    let bob = user("bob");
    let room = core
        .create_room("general".to_string(), alice.clone())
        .await
        .expect("create");
    core.join_room(&room.id, bob.clone()).await.expect("join");

    core.send_message(text_message(room.id, &alice, "one"))
        .await
        .expect("m1");
    core.send_message(text_message(room.id, &alice, "two"))
        .await
        .expect("m2");
    core.send_message(text_message(room.id, &bob, "mine"))
        .await
        .expect("m3");

    assert_eq!(
        core.count_unread_for_user(&room.id, None, &bob)
            .await
            .expect("bob"),
        2
    );
    assert_eq!(
        core.count_unread_for_user(&room.id, None, &alice)
            .await
            .expect("alice"),
        1
    );
}

#[tokio::test]
async fn mark_read_clears_unread() {
    let core = test_core("cursor-clear");
    let alice = user("alice");
    let bob = user("bob");
    let room = core
        .create_room("general".to_string(), alice.clone())
        .await
        .expect("create");
    core.join_room(&room.id, bob.clone()).await.expect("join");
    core.send_message(text_message(room.id, &alice, "hi"))
        .await
        .expect("send");

    let watermark = core.mark_read(&bob, &room.id).await.expect("mark");
    let unread = core
        .count_unread_for_user(&room.id, Some(watermark), &bob)
        .await
        .expect("count");
    assert_eq!(unread, 0);
}

#[tokio::test]
async fn batched_counts_match_single_room_when_all_cursors_null() {
    let core = test_core("cursor-batch-null");
    let alice = user("alice");
    let bob = user("bob");
    let mut room_ids = Vec::new();
    for name in ["a", "b", "c"] {
        let room = core
            .create_room(name.to_string(), alice.clone())
            .await
            .expect("create");
        core.join_room(&room.id, bob.clone()).await.expect("join");
        room_ids.push(room.id);
    }
    core.send_message(text_message(room_ids[0], &alice, "r0"))
        .await
        .expect("send");
    core.send_message(text_message(room_ids[1], &alice, "r1a"))
        .await
        .expect("send");
    core.send_message(text_message(room_ids[1], &bob, "r1b"))
        .await
        .expect("send");

    let last_seen: HashMap<_, _> = room_ids.iter().map(|r| (*r, None)).collect();
    let batched = core
        .count_unread_by_rooms_for_user(&room_ids, &last_seen, &bob)
        .await
        .expect("batched");
    for dto in &batched {
        let single = core
            .count_unread_for_user(&dto.room_id, None, &bob)
            .await
            .expect("single");
        assert_eq!(dto.unread, single, "strategy A must equal single-room");
    }
    assert_eq!(batched.iter().map(|d| d.unread).sum::<u64>(), 2);
}

#[tokio::test]
async fn batched_counts_match_single_room_with_mixed_cursors() {
    let core = test_core("cursor-batch-mixed");
    let alice = user("alice");
    let bob = user("bob");
    let mut room_ids = Vec::new();
    for name in ["a", "b", "c"] {
        let room = core
            .create_room(name.to_string(), alice.clone())
            .await
            .expect("create");
        core.join_room(&room.id, bob.clone()).await.expect("join");
        room_ids.push(room.id);
    }

    let m0 = core
        .send_message(text_message(room_ids[0], &alice, "r0-old"))
        .await
        .expect("send");
    core.send_message(text_message(room_ids[0], &alice, "r0-new"))
        .await
        .expect("send");
    core.send_message(text_message(room_ids[1], &alice, "r1"))
        .await
        .expect("send");
    core.send_message(text_message(room_ids[2], &bob, "r2-own"))
        .await
        .expect("send");

    // Room a: cursor at m0 (one newer unread, unless clamped timestamps
    // collapse them). Room b: null cursor. Room c: cursor far ahead.
    let mut last_seen: HashMap<_, _> = HashMap::new();
    last_seen.insert(room_ids[0], Some(m0.created_at_ms));
    last_seen.insert(room_ids[1], None);
    last_seen.insert(room_ids[2], Some(now_ms() + 1_000));

    let batched = core
        .count_unread_by_rooms_for_user(&room_ids, &last_seen, &bob)
        .await
        .expect("batched");
    assert_eq!(batched.len(), room_ids.len());
    for dto in &batched {
        let single = core
            .count_unread_for_user(&dto.room_id, last_seen[&dto.room_id], &bob)
            .await
            .expect("single");
        assert_eq!(
            dto.unread, single,
            "min-cursor strategy must equal single-room for every room"
        );
    }
}
