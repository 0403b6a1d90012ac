use super::*;
use crate::config::ChannelsConfig;
use crate::enrichment::NameLookup;
use crate::subscription::events;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

type Requests = Arc<Mutex<Vec<(EntityId, u64)>>>;

/// Records lookups instead of performing them
struct RecordingLookup(Requests);

impl NameLookup for RecordingLookup {
    fn request(&self, entity_id: &EntityId, epoch: u64) {
        self.0.lock().unwrap().push((entity_id.clone(), epoch));
    }
}

fn make_hub() -> (Hub, Requests) {
    let registry = Arc::new(ChannelRegistry::from_config(&ChannelsConfig::default()).unwrap());
    let requests: Requests = Arc::new(Mutex::new(Vec::new()));
    let hub = Hub::new(registry, Box::new(RecordingLookup(Arc::clone(&requests))));
    (hub, requests)
}

fn connect(hub: &mut Hub, channel: &str) -> (ConnectionId, UnboundedReceiver<ServerMessage>) {
    let connection = Uuid::new_v4();
    let (outbox, rx) = mpsc::unbounded_channel();
    hub.handle(HubCommand::Connect {
        channel: channel.to_string(),
        connection,
        outbox,
    });
    (connection, rx)
}

fn send(hub: &mut Hub, connection: ConnectionId, event: &str, data: Value) {
    hub.handle(HubCommand::Message {
        connection,
        frame: ClientFrame::new(event, data),
    });
}

fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn names(messages: &[ServerMessage]) -> Vec<&str> {
    messages.iter().map(|m| m.event.as_str()).collect()
}

/// Connected location dashboard that has already consumed its welcome
fn dashboard(hub: &mut Hub) -> (ConnectionId, UnboundedReceiver<ServerMessage>) {
    let (connection, mut rx) = connect(hub, "location");
    drain(&mut rx);
    (connection, rx)
}

#[test]
fn test_location_connect_receives_current_state() {
    let (mut hub, _) = make_hub();

    let (_, mut rx) = connect(&mut hub, "location");
    let messages = drain(&mut rx);

    assert_eq!(
        names(&messages),
        vec![events::CUSTOMER_LIST, events::GLOBAL_PARAMS, events::CUSTOMER_NAMES]
    );
    assert_eq!(messages[0].data, json!({}));
    assert_eq!(
        messages[1].data,
        json!({"overall_distance": 0.0, "retailers_visited": 0})
    );
    assert_eq!(messages[2].data, json!("{}"));
    assert_eq!(hub.connection_count(), 1);
}

#[test]
fn test_relay_channels_send_banner() {
    let (mut hub, _) = make_hub();

    let (_, mut rx) = connect(&mut hub, "workbench");
    let messages = drain(&mut rx);
    assert_eq!(messages, vec![ServerMessage::new(
        events::HELLO,
        json!("Connected to namespace :- Workbench")
    )]);

    let (_, mut rx) = connect(&mut hub, "supervised");
    assert_eq!(
        drain(&mut rx)[0].data,
        json!("Connected to namespace :- EDA")
    );
}

#[test]
fn test_connect_to_unknown_channel_ignored() {
    let (mut hub, _) = make_hub();

    let (_, mut rx) = connect(&mut hub, "nowhere");

    assert!(drain(&mut rx).is_empty());
    assert_eq!(hub.connection_count(), 0);
}

#[test]
fn test_batch_fans_out_to_rooms_then_channel() {
    let (mut hub, _) = make_hub();
    let (watcher, mut watcher_rx) = dashboard(&mut hub);
    let (other, mut other_rx) = dashboard(&mut hub);
    let (device, mut device_rx) = dashboard(&mut hub);
    send(&mut hub, watcher, "room", json!("c1"));
    send(&mut hub, other, "room", json!("c2"));
    drain(&mut watcher_rx);
    drain(&mut other_rx);

    send(
        &mut hub,
        device,
        "data",
        json!([["c1", 10, 100, "pos", "x"], ["c1", 11, 101, "pos", "null"]]),
    );

    let watcher_msgs = drain(&mut watcher_rx);
    assert_eq!(
        names(&watcher_msgs),
        vec![events::LATEST_DATA, events::LATEST_DATA, events::CUSTOMER_LIST]
    );
    assert_eq!(watcher_msgs[0].data, json!(["c1", 10, 100, "pos", "x"]));
    assert_eq!(watcher_msgs[1].data, json!(["c1", 11, 100, "pos", null]));
    assert_eq!(
        watcher_msgs[2].data,
        json!({"c1": ["c1", 11, 100, "pos", null]})
    );

    // Unrelated rooms only see the batched list
    assert_eq!(names(&drain(&mut other_rx)), vec![events::CUSTOMER_LIST]);
    assert_eq!(names(&drain(&mut device_rx)), vec![events::CUSTOMER_LIST]);
    assert_eq!(hub.engine().store().history(&EntityId::from("c1")).len(), 2);

    // The corrected point is rewritten in the trail a late joiner receives
    let (viewer, mut viewer_rx) = dashboard(&mut hub);
    send(&mut hub, viewer, "room", json!("c1"));
    assert_eq!(
        drain(&mut viewer_rx)[0].data,
        json!([["c1", 11, 100, "pos", null], ["c1", 11, 100, "pos", null]])
    );
}

#[test]
fn test_empty_or_unusable_batch_still_sends_customer_list() {
    let (mut hub, _) = make_hub();
    let (device, mut rx) = dashboard(&mut hub);
    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"]]));
    drain(&mut rx);

    send(&mut hub, device, "data", json!([]));
    let messages = drain(&mut rx);
    assert_eq!(messages, vec![ServerMessage::new(
        events::CUSTOMER_LIST,
        json!({"c1": ["c1", 1, 1, "x"]})
    )]);

    send(&mut hub, device, "data", json!([["c1"], "junk"]));
    assert_eq!(names(&drain(&mut rx)), vec![events::CUSTOMER_LIST]);
}

#[test]
fn test_numeric_id_echoed_as_sent() {
    let (mut hub, _) = make_hub();
    let (watcher, mut rx) = dashboard(&mut hub);
    send(&mut hub, watcher, "room", json!("42"));
    drain(&mut rx);

    send(&mut hub, watcher, "data", json!([[42, 1, 1, "x"]]));

    let messages = drain(&mut rx);
    assert_eq!(messages[0], ServerMessage::new(events::LATEST_DATA, json!([42, 1, 1, "x"])));
    assert_eq!(messages[1].data, json!({"42": [42, 1, 1, "x"]}));
}

#[test]
fn test_orphan_correction_broadcasts_nothing() {
    let (mut hub, requests) = make_hub();
    let (device, mut rx) = dashboard(&mut hub);
    send(&mut hub, device, "room", json!("ghost"));
    drain(&mut rx);

    send(&mut hub, device, "data", json!([["ghost", 11, 101, "null"]]));

    assert!(drain(&mut rx).is_empty());
    assert!(hub.engine().store().history(&EntityId::from("ghost")).is_empty());
    assert!(requests.lock().unwrap().is_empty());
}

#[test]
fn test_join_room_sends_history_and_visits() {
    let (mut hub, _) = make_hub();
    let (device, mut device_rx) = dashboard(&mut hub);
    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"], ["c1", 2, 2, "y"]]));
    drain(&mut device_rx);

    let (viewer, mut rx) = dashboard(&mut hub);
    send(&mut hub, viewer, "room", json!("c1"));
    let messages = drain(&mut rx);
    assert_eq!(names(&messages), vec![events::CUSTOMER_DATA]);
    assert_eq!(messages[0].data, json!([["c1", 1, 1, "x"], ["c1", 2, 2, "y"]]));

    send(&mut hub, device, "retailers_visited", json!([["c1", "r1"], ["c1", "r2"]]));
    drain(&mut rx);
    send(&mut hub, viewer, "leave_room", json!("c1"));
    send(&mut hub, viewer, "room", json!("c1"));
    let messages = drain(&mut rx);
    assert_eq!(
        names(&messages),
        vec![events::CUSTOMER_DATA, events::RETAILERS_VISIT_CUSTOMER]
    );
    assert_eq!(messages[1].data, json!(["r1", "r2"]));
}

#[test]
fn test_join_unknown_room_sends_empty_history() {
    let (mut hub, _) = make_hub();
    let (viewer, mut rx) = dashboard(&mut hub);

    send(&mut hub, viewer, "room", json!("nobody"));

    assert_eq!(
        drain(&mut rx),
        vec![ServerMessage::new(events::CUSTOMER_DATA, json!([]))]
    );
}

#[test]
fn test_leave_room_stops_latest_data() {
    let (mut hub, _) = make_hub();
    let (viewer, mut rx) = dashboard(&mut hub);
    send(&mut hub, viewer, "room", json!("c1"));
    send(&mut hub, viewer, "leave_room", json!("c1"));
    send(&mut hub, viewer, "leave_room", json!("c1"));
    drain(&mut rx);

    send(&mut hub, viewer, "data", json!([["c1", 1, 1, "x"]]));

    assert_eq!(names(&drain(&mut rx)), vec![events::CUSTOMER_LIST]);
}

#[test]
fn test_new_entity_looked_up_once_per_day() {
    let (mut hub, requests) = make_hub();
    let (device, _rx) = dashboard(&mut hub);

    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"], ["c1", 2, 2, "x"]]));
    send(&mut hub, device, "data", json!([["c1", 3, 3, "x"], ["c2", 1, 1, "x"]]));

    assert_eq!(
        *requests.lock().unwrap(),
        vec![(EntityId::from("c1"), 0), (EntityId::from("c2"), 0)]
    );
}

#[test]
fn test_resolved_name_broadcast_once() {
    let (mut hub, _) = make_hub();
    let (device, mut rx) = dashboard(&mut hub);
    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"]]));
    drain(&mut rx);

    hub.handle(HubCommand::NameResolved {
        entity_id: EntityId::from("c1"),
        name: "Alice".to_string(),
        epoch: 0,
    });

    assert_eq!(
        drain(&mut rx),
        vec![ServerMessage::new(
            events::CUSTOMER_NAMES,
            json!(r#"{"c1":"Alice"}"#)
        )]
    );
}

#[test]
fn test_name_from_before_reset_discarded() {
    let (mut hub, requests) = make_hub();
    let (device, mut rx) = dashboard(&mut hub);
    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"]]));
    send(&mut hub, device, "reset_server_data", json!(null));
    drain(&mut rx);

    hub.handle(HubCommand::NameResolved {
        entity_id: EntityId::from("c1"),
        name: "Alice".to_string(),
        epoch: requests.lock().unwrap()[0].1,
    });

    assert!(drain(&mut rx).is_empty());
    assert!(hub.engine().directory().is_empty());
}

#[test]
fn test_movement_broadcasts_global_params() {
    let (mut hub, _) = make_hub();
    let (device, mut device_rx) = dashboard(&mut hub);
    let (_, mut viewer_rx) = dashboard(&mut hub);

    send(&mut hub, device, "movement_km", json!(["c1", 1.5]));
    send(&mut hub, device, "movement_km", json!(["c1", 2.0]));

    let messages = drain(&mut viewer_rx);
    assert_eq!(names(&messages), vec![events::GLOBAL_PARAMS, events::GLOBAL_PARAMS]);
    assert_eq!(messages[1].data["overall_distance"], json!(3.5));
    assert_eq!(drain(&mut device_rx).len(), 2);
    assert_eq!(
        hub.engine().aggregates().distance(&EntityId::from("c1")),
        Some(3.5)
    );
}

#[test]
fn test_duplicate_visits_counted_once() {
    let (mut hub, _) = make_hub();
    let (device, mut rx) = dashboard(&mut hub);

    send(
        &mut hub,
        device,
        "retailers_visited",
        json!([["c1", "a"], ["c1", "a"], ["c1", "b"]]),
    );
    let messages = drain(&mut rx);
    assert_eq!(names(&messages), vec![events::GLOBAL_PARAMS]);
    assert_eq!(messages[0].data["retailers_visited"], json!(2));

    // Nothing new, nothing broadcast
    send(&mut hub, device, "retailers_visited", json!([["c1", "b"]]));
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_client_reset_wipes_and_rebroadcasts() {
    let (mut hub, _) = make_hub();
    let (device, mut device_rx) = dashboard(&mut hub);
    let (_, mut viewer_rx) = dashboard(&mut hub);
    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"]]));
    send(&mut hub, device, "movement_km", json!(["c1", 4.0]));
    send(&mut hub, device, "retailers_visited", json!([["c1", "r1"]]));
    drain(&mut device_rx);
    drain(&mut viewer_rx);

    send(&mut hub, device, "reset_server_data", json!({}));

    let messages = drain(&mut viewer_rx);
    assert_eq!(
        names(&messages),
        vec![events::CUSTOMER_LIST, events::GLOBAL_PARAMS, events::CUSTOMER_NAMES]
    );
    assert_eq!(messages[0].data, json!({}));
    assert_eq!(messages[1].data, json!({"overall_distance": 0.0, "retailers_visited": 0}));
    assert_eq!(hub.engine().store().entity_count(), 0);
    assert_eq!(hub.engine().aggregates().visited(&EntityId::from("c1")), None);
}

#[test]
fn test_scheduled_reset_matches_client_reset() {
    let (mut hub, requests) = make_hub();
    let (device, mut rx) = dashboard(&mut hub);
    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"]]));
    send(&mut hub, device, "movement_km", json!(["c1", 4.0]));
    drain(&mut rx);

    hub.handle(HubCommand::ScheduledReset);

    assert_eq!(drain(&mut rx).len(), 3);
    assert_eq!(hub.engine().store().entity_count(), 0);
    assert_eq!(hub.engine().aggregates().snapshot().overall_distance, 0.0);

    // The next day's first sample is new again
    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"]]));
    assert_eq!(requests.lock().unwrap().len(), 2);
    assert_eq!(requests.lock().unwrap()[1], (EntityId::from("c1"), 1));
}

#[test]
fn test_workbench_data_reaches_room_only() {
    let (mut hub, _) = make_hub();
    let (member, mut member_rx) = connect(&mut hub, "workbench");
    let (outsider, mut outsider_rx) = connect(&mut hub, "workbench");
    let (location_viewer, mut location_rx) = dashboard(&mut hub);
    send(&mut hub, member, "room", json!("c1"));
    send(&mut hub, location_viewer, "room", json!("c1"));
    drain(&mut member_rx);
    drain(&mut outsider_rx);
    drain(&mut location_rx);

    send(&mut hub, outsider, "data", json!({"room": "c1", "msg": {"step": 3}}));

    assert_eq!(
        drain(&mut member_rx),
        vec![ServerMessage::new(events::LATEST_DATA, json!({"step": 3}))]
    );
    assert!(drain(&mut outsider_rx).is_empty());
    // Same room name on the location channel is a different room
    assert!(drain(&mut location_rx).is_empty());
}

#[test]
fn test_stage_data_broadcast_within_channel() {
    let (mut hub, _) = make_hub();
    let (sender, mut sender_rx) = connect(&mut hub, "eda");
    let (_, mut peer_rx) = connect(&mut hub, "eda");
    let (_, mut other_stage_rx) = connect(&mut hub, "supervised");
    drain(&mut sender_rx);
    drain(&mut peer_rx);
    drain(&mut other_stage_rx);

    send(&mut hub, sender, "data", json!({"rows": [1, 2]}));

    let expected = vec![ServerMessage::new(events::DATA, json!({"rows": [1, 2]}))];
    assert_eq!(drain(&mut sender_rx), expected);
    assert_eq!(drain(&mut peer_rx), expected);
    assert!(drain(&mut other_stage_rx).is_empty());
}

#[test]
fn test_ack_reports_handling() {
    let (mut hub, _) = make_hub();
    let (sender, mut rx) = connect(&mut hub, "eda");
    drain(&mut rx);

    hub.handle(HubCommand::Message {
        connection: sender,
        frame: ClientFrame::new("data", json!(1)).with_ack(7),
    });
    hub.handle(HubCommand::Message {
        connection: sender,
        frame: ClientFrame::new("bogus", json!(1)).with_ack(8),
    });

    assert_eq!(
        drain(&mut rx),
        vec![
            ServerMessage::new(events::DATA, json!(1)),
            ServerMessage::ack(7, true),
            ServerMessage::ack(8, false),
        ]
    );
}

#[test]
fn test_malformed_messages_dropped_without_side_effects() {
    let (mut hub, _) = make_hub();
    let (device, mut rx) = dashboard(&mut hub);

    send(&mut hub, device, "movement_km", json!("c1"));
    send(&mut hub, device, "data", json!("not a batch"));
    send(&mut hub, device, "room", json!(null));

    assert!(drain(&mut rx).is_empty());
    assert_eq!(hub.engine().aggregates().snapshot(), GlobalAggregates::default());

    // Still usable afterwards
    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"], "junk"]));
    assert_eq!(names(&drain(&mut rx)), vec![events::CUSTOMER_LIST]);
}

#[test]
fn test_disconnect_removes_connection_everywhere() {
    let (mut hub, _) = make_hub();
    let (viewer, viewer_rx) = dashboard(&mut hub);
    let (device, _device_rx) = dashboard(&mut hub);
    send(&mut hub, viewer, "room", json!("c1"));

    hub.handle(HubCommand::Disconnect { connection: viewer });
    drop(viewer_rx);
    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"]]));
    send(&mut hub, viewer, "room", json!("c1"));

    assert_eq!(hub.connection_count(), 1);
    assert_eq!(hub.engine().store().history(&EntityId::from("c1")).len(), 1);
}

#[test]
fn test_closed_outbox_is_ignored() {
    let (mut hub, _) = make_hub();
    let (device, rx) = dashboard(&mut hub);
    drop(rx);

    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"]]));

    assert_eq!(hub.engine().store().entity_count(), 1);
}

#[test]
fn test_queries_answered() {
    let (mut hub, _) = make_hub();
    let (device, _rx) = dashboard(&mut hub);
    send(&mut hub, device, "data", json!([["c1", 1, 1, "x"]]));
    send(&mut hub, device, "movement_km", json!(["c1", 2.5]));

    let (reply, mut answer) = oneshot::channel();
    hub.handle(HubCommand::Query(StateQuery::Global(reply)));
    assert_eq!(answer.try_recv().unwrap().overall_distance, 2.5);

    let (reply, mut answer) = oneshot::channel();
    hub.handle(HubCommand::Query(StateQuery::CustomerList(reply)));
    assert_eq!(answer.try_recv().unwrap(), json!({"c1": ["c1", 1, 1, "x"]}));

    let (reply, mut answer) = oneshot::channel();
    hub.handle(HubCommand::Query(StateQuery::Customer {
        entity_id: EntityId::from("c1"),
        reply,
    }));
    let view = answer.try_recv().unwrap().unwrap();
    assert_eq!(view.distance, 2.5);
    assert_eq!(view.history.len(), 1);
}

#[tokio::test]
async fn test_run_processes_commands_in_order() {
    let (hub, _) = make_hub();
    let (handle, rx) = HubHandle::channel();
    let task = tokio::spawn(hub.run(rx));

    let connection = Uuid::new_v4();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel();
    handle.send(HubCommand::Connect {
        channel: "location".to_string(),
        connection,
        outbox,
    });
    handle.send(HubCommand::Message {
        connection,
        frame: ClientFrame::new("movement_km", json!(["c1", 1.0])),
    });

    let global = handle.query(StateQuery::Global).await.unwrap();
    assert_eq!(global.overall_distance, 1.0);

    // Welcome snapshot, then the movement broadcast
    for _ in 0..3 {
        outbox_rx.recv().await.unwrap();
    }
    assert_eq!(outbox_rx.recv().await.unwrap().event, events::GLOBAL_PARAMS);

    drop(handle);
    task.await.unwrap();
}
