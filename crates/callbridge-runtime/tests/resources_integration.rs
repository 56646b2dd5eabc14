//! Handle-table resources routed through the scripted host.

use std::sync::{Arc, Mutex};

use callbridge_core::{
    HandleError, HandleId, HostAction, ResourceEvent, ResourceEventCode, ResourceKind,
    ResourceOpen, ResponseRecord, ResultRecord, SharedArena, TrustedEventKind,
};
use callbridge_runtime::{BridgeContext, RequestState, ResourceError, ScriptedHost};

type Calls = Arc<Mutex<Vec<(i32, i32, i32)>>>;

fn setup() -> (BridgeContext, Arc<ScriptedHost>, SharedArena) {
    let host = Arc::new(ScriptedHost::new());
    let arena = SharedArena::new(64 * 1024);
    let ctx = BridgeContext::builder(host.clone()).arena(arena.clone()).build();
    (ctx, host, arena)
}

fn recording_callback(ctx: &BridgeContext) -> (callbridge_core::CallbackIndex, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let index = ctx.register_resource_callback(move |handle, code, user_data| {
        sink.lock().unwrap().push((handle, code, user_data));
    });
    (index, calls)
}

#[test]
fn test_request_completion_reaches_callback_and_response() {
    // Arrange
    let (ctx, host, arena) = setup();
    let (callback, calls) = recording_callback(&ctx);
    let id = ctx.open_request("GET", "https://example.test/scores");
    ctx.send_request(id, b"", callback, 77).unwrap();
    let events = host.events_for(ResourceKind::Request, id).unwrap();

    // Act
    events.emit(ResourceEvent::RequestCompleted {
        status: 200,
        body: b"{\"top\":42}".to_vec(),
    });
    let out = arena.alloc(ResponseRecord::SIZE as u32).unwrap();
    let rec = ctx.request_response(id, out).unwrap();

    // Assert
    assert_eq!(
        *calls.lock().unwrap(),
        vec![(id.0 as i32, ResourceEventCode::Completed.code(), 77)]
    );
    assert_eq!(rec.status, 200);
    assert_eq!(arena.read(rec.body, rec.body_len).unwrap(), b"{\"top\":42}".to_vec());
    assert_eq!(ResponseRecord::read_from(&arena, out).unwrap(), rec);
    assert!(matches!(
        host.opened()[0].1,
        ResourceOpen::Request { ref method, .. } if method == "GET"
    ));
}

#[test]
fn test_double_abort_then_late_completion_is_dropped() {
    // Arrange
    let (ctx, host, arena) = setup();
    let (callback, calls) = recording_callback(&ctx);
    let id = ctx.open_request("POST", "/save");
    ctx.send_request(id, b"state", callback, 0).unwrap();
    let events = host.events_for(ResourceKind::Request, id).unwrap();
    let out = arena.alloc(ResponseRecord::SIZE as u32).unwrap();
    arena.write(out, &[0xAB; ResponseRecord::SIZE]).unwrap();

    // Act
    ctx.abort_request(id).unwrap();
    ctx.abort_request(id).unwrap();
    events.emit(ResourceEvent::RequestCompleted {
        status: 200,
        body: b"ok".to_vec(),
    });

    // Assert
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(ctx.request_state(id).unwrap(), RequestState::Aborted);
    assert!(matches!(ctx.request_response(id, out), Err(ResourceError::NotComplete(_))));
    assert_eq!(
        arena.read(out, ResponseRecord::SIZE as u32).unwrap(),
        vec![0xAB; ResponseRecord::SIZE]
    );
    let aborts = host
        .actions()
        .into_iter()
        .filter(|a| matches!(a, HostAction::AbortRequest { .. }))
        .count();
    assert_eq!(aborts, 1);
}

#[test]
fn test_closed_request_handle_is_stale() {
    let (ctx, _host, _arena) = setup();
    let id = ctx.open_request("GET", "/a");
    ctx.close_request(id).unwrap();

    let result = ctx.abort_request(id);

    assert!(matches!(
        result,
        Err(ResourceError::Handle(HandleError::Stale { .. }))
    ));
    assert!(ctx.request_state(HandleId(u32::MAX)).is_err());
}

#[test]
fn test_request_cannot_be_sent_twice() {
    let (ctx, _host, _arena) = setup();
    let id = ctx.open_request("GET", "/twice");
    ctx.send_request(id, b"", callbridge_core::CallbackIndex::NULL, 0).unwrap();

    let again = ctx.send_request(id, b"", callbridge_core::CallbackIndex::NULL, 0);

    assert!(matches!(again, Err(ResourceError::InvalidState { .. })));
}

#[test]
fn test_handle_ids_are_not_reused() {
    let (ctx, _host, _arena) = setup();
    let first = ctx.open_request("GET", "/1");
    ctx.close_request(first).unwrap();

    let second = ctx.open_request("GET", "/2");

    assert_ne!(first, second);
    assert!(second.is_valid());
}

#[test]
fn test_video_events_update_info_and_notify() {
    // Arrange
    let (ctx, host, arena) = setup();
    let (callback, calls) = recording_callback(&ctx);
    let src = arena.alloc_bytes(b"\x1aE\xdf\xa3webm").unwrap();
    let id = ctx.open_video(src, 8, callback, 5);
    let events = host.events_for(ResourceKind::Video, id).unwrap();

    // Act
    events.emit(ResourceEvent::VideoReady {
        width: 640,
        height: 360,
        duration_secs: 12.5,
    });
    events.emit(ResourceEvent::VideoTimeUpdate { time_secs: 3.0 });

    // Assert
    let info = ctx.video_info(id).unwrap();
    assert!(info.ready);
    assert_eq!((info.width, info.height), (640, 360));
    assert_eq!(info.current_time_secs, 3.0);
    let codes: Vec<i32> = calls.lock().unwrap().iter().map(|c| c.1).collect();
    assert_eq!(
        codes,
        vec![ResourceEventCode::Ready.code(), ResourceEventCode::TimeUpdate.code()]
    );
}

#[test]
fn test_video_play_waits_for_gesture_when_refused() {
    // Arrange
    let (ctx, host, arena) = setup();
    let src = arena.alloc_bytes(b"webm").unwrap();
    let id = ctx.open_video(src, 4, callbridge_core::CallbackIndex::NULL, 0);
    host.refuse_without_activation(true);

    // Act
    ctx.play_video(id).unwrap();
    let before = ctx.video_info(id).unwrap().playing;
    host.refuse_without_activation(false);
    ctx.on_trusted_event(TrustedEventKind::Click);

    // Assert
    assert!(!before);
    assert!(ctx.video_info(id).unwrap().playing);
    assert!(host
        .actions()
        .contains(&HostAction::PlayVideo { handle: id.0 }));
}

#[test]
fn test_destroyed_video_ignores_events() {
    let (ctx, host, arena) = setup();
    let (callback, calls) = recording_callback(&ctx);
    let src = arena.alloc_bytes(b"webm").unwrap();
    let id = ctx.open_video(src, 4, callback, 0);
    let events = host.events_for(ResourceKind::Video, id).unwrap();

    ctx.destroy_video(id).unwrap();
    events.emit(ResourceEvent::VideoTimeUpdate { time_secs: 1.0 });

    assert!(calls.lock().unwrap().is_empty());
    assert!(ctx.video_info(id).is_err());
    assert!(host
        .actions()
        .contains(&HostAction::ReleaseVideo { handle: id.0 }));
}

#[test]
fn test_notification_click_and_close_are_routed() {
    // Arrange
    let (ctx, host, _arena) = setup();
    let (callback, calls) = recording_callback(&ctx);
    let id = ctx.show_notification("Match found", "Tap to join", callback, 9);
    let events = host.events_for(ResourceKind::Notification, id).unwrap();

    // Act
    events.emit(ResourceEvent::NotificationClicked);
    events.emit(ResourceEvent::NotificationClosed);
    ctx.close_notification(id).unwrap();

    // Assert
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            (id.0 as i32, ResourceEventCode::Clicked.code(), 9),
            (id.0 as i32, ResourceEventCode::Closed.code(), 9),
        ]
    );
    assert!(ctx.close_notification(id).is_err());
}

#[test]
fn test_camera_resolution_change_reports_resized() {
    // Arrange
    let (ctx, host, _arena) = setup();
    let (callback, calls) = recording_callback(&ctx);
    let id = ctx.open_camera(640, 480, callback, 5);
    let events = host.events_for(ResourceKind::Video, id).unwrap();
    events.emit(ResourceEvent::VideoReady {
        width: 640,
        height: 480,
        duration_secs: 0.0,
    });

    // Act
    ctx.set_camera_resolution(id, 1280, 720).unwrap();
    let live = events.emit(ResourceEvent::CameraResized {
        width: 1280,
        height: 720,
    });

    // Assert
    assert!(live);
    assert!(matches!(
        host.opened()[0].1,
        ResourceOpen::Camera { width: 640, height: 480 }
    ));
    assert!(host.actions().contains(&HostAction::SetCameraResolution {
        handle: id.0,
        width: 1280,
        height: 720,
    }));
    let info = ctx.video_info(id).unwrap();
    assert!(info.camera);
    assert_eq!((info.width, info.height), (1280, 720));
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            (id.0 as i32, ResourceEventCode::Ready.code(), 5),
            (id.0 as i32, ResourceEventCode::Resized.code(), 5),
        ]
    );
}

#[test]
fn test_refused_camera_reports_handle_zero() {
    // Arrange
    let (ctx, host, _arena) = setup();
    let (callback, calls) = recording_callback(&ctx);
    let id = ctx.open_camera(0, 0, callback, 3);
    let events = host.events_for(ResourceKind::Video, id).unwrap();

    // Act
    let live = events.emit(ResourceEvent::VideoFailed {
        reason: "NotAllowedError".to_string(),
    });

    // Assert
    assert!(id.is_valid());
    assert!(!live);
    assert_eq!(
        *calls.lock().unwrap(),
        vec![(HandleId::INVALID.0 as i32, ResourceEventCode::Failed.code(), 3)]
    );
    assert!(ctx.video_info(id).is_err());
}

#[test]
fn test_two_contexts_on_one_host_get_distinct_handles() {
    // Arrange
    let host = Arc::new(ScriptedHost::new());
    let first = BridgeContext::builder(host.clone()).arena(SharedArena::new(4096)).build();
    let second = BridgeContext::builder(host.clone()).arena(SharedArena::new(4096)).build();
    let (callback, calls) = recording_callback(&second);

    // Act
    let a = first.open_request("GET", "/first");
    let b = second.open_request("GET", "/second");
    second.send_request(b, b"", callback, 1).unwrap();
    host.events_for(ResourceKind::Request, b)
        .unwrap()
        .emit(ResourceEvent::RequestFailed {
            reason: "offline".to_string(),
        });

    // Assert
    assert_ne!(a, b);
    assert_eq!(first.request_state(a).unwrap(), RequestState::Opened);
    assert_eq!(second.request_state(b).unwrap(), RequestState::Failed);
    assert_eq!(calls.lock().unwrap().len(), 1);
}
