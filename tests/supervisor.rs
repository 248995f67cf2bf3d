mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use ipcam_live::cache::FragmentSubscription;
use ipcam_live::error::SupervisorError;
use ipcam_live::supervisor::LogSink;
use ipcam_live::{
    CacheEvent, FragmentCache, FrameRelay, HlsEndpoint, HlsError, RestartPolicy, Supervisor,
    TranscodeParams,
};

use common::{fake_transcoder, fragment, init_segment, init_tracing, jpeg, FakeTranscoder};

fn setup() -> (Supervisor<FakeTranscoder>, common::FakeControl) {
    init_tracing();
    let (transcoder, control) = fake_transcoder();
    let supervisor = Supervisor::new(
        transcoder,
        Arc::new(FragmentCache::new()),
        Arc::new(FrameRelay::new()),
    );
    (supervisor, control)
}

fn args() -> Vec<String> {
    TranscodeParams::new("rtsp://camera/stream").build().unwrap()
}

fn quick_policy() -> RestartPolicy {
    RestartPolicy::default().spawn_after_exit(Duration::from_millis(10))
}

async fn next_event(sub: &mut FragmentSubscription) -> CacheEvent {
    tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("no cache event in time")
        .expect("cache closed")
}

async fn next_sequence(sub: &mut FragmentSubscription) -> u64 {
    match next_event(sub).await {
        CacheEvent::Fragment(f) => f.sequence,
        other => panic!("expected fragment, got {:?}", other),
    }
}

#[tokio::test]
async fn test_respawn_resets_cache_and_sequence() {
    let (supervisor, mut control) = setup();
    let cache = Arc::clone(supervisor.cache());

    supervisor.start(args(), quick_policy()).await.unwrap();
    assert!(supervisor.is_running());

    let mut sub = cache.subscribe().await;
    let mut run = control.next_run().await;
    assert_eq!(run.args, args());

    run.write_media(&init_segment()).await;
    for tag in 1..=3u8 {
        run.write_media(&fragment(tag)).await;
    }
    assert!(matches!(next_event(&mut sub).await, CacheEvent::Initialized(_)));
    for expected in 1..=3 {
        assert_eq!(next_sequence(&mut sub).await, expected);
    }
    let first_epoch = cache.epoch().await;

    run.exit(1);
    let mut second = control.next_run().await;

    // the reset is visible before anything from the new run
    match next_event(&mut sub).await {
        CacheEvent::Reset { epoch } => assert!(epoch > first_epoch),
        other => panic!("expected reset, got {:?}", other),
    }
    assert!(cache.current_initialization().await.is_none());
    assert!(cache.current_playlist().await.is_none());
    assert!(cache.fragment_by_id(1).await.is_none());

    second.write_media(&init_segment()).await;
    second.write_media(&fragment(42)).await;
    assert!(matches!(next_event(&mut sub).await, CacheEvent::Initialized(_)));
    assert_eq!(next_sequence(&mut sub).await, 1);

    assert_eq!(
        cache.fragment_by_id(1).await.unwrap().data,
        Bytes::from(fragment(42))
    );
    assert!(cache.fragment_by_id(3).await.is_none());

    let info = supervisor.info().await.unwrap();
    assert_eq!(info.restarts, 1);
    assert!(info.running);
    assert_eq!(info.epoch, cache.epoch().await);

    supervisor.stop().await;
}

#[tokio::test]
async fn test_output_written_before_exit_is_published() {
    let (supervisor, mut control) = setup();
    let cache = Arc::clone(supervisor.cache());

    supervisor.start(args(), quick_policy()).await.unwrap();
    let mut sub = cache.subscribe().await;
    let mut run = control.next_run().await;

    run.write_media(&init_segment()).await;
    run.write_media(&fragment(1)).await;
    run.exit(0);

    assert!(matches!(next_event(&mut sub).await, CacheEvent::Initialized(_)));
    assert_eq!(next_sequence(&mut sub).await, 1);
    assert!(matches!(next_event(&mut sub).await, CacheEvent::Reset { .. }));

    let _second = control.next_run().await;
    supervisor.stop().await;
}

#[tokio::test]
async fn test_start_rejected_while_running() {
    let (supervisor, mut control) = setup();

    supervisor.start(args(), quick_policy()).await.unwrap();
    let _run = control.next_run().await;

    let err = supervisor.start(args(), quick_policy()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning));

    supervisor.stop().await;
}

#[tokio::test]
async fn test_stop_kills_and_resets() {
    let (supervisor, mut control) = setup();
    let cache = Arc::clone(supervisor.cache());
    let relay = Arc::clone(supervisor.relay());

    supervisor.start(args(), quick_policy()).await.unwrap();
    let mut sub = cache.subscribe().await;
    let (_, mut frames) = relay.subscribe().await;
    let mut run = control.next_run().await;

    run.write_media(&init_segment()).await;
    run.write_media(&fragment(1)).await;
    run.write_frames(&jpeg(1)).await;
    assert!(matches!(next_event(&mut sub).await, CacheEvent::Initialized(_)));
    assert_eq!(next_sequence(&mut sub).await, 1);
    assert_eq!(&frames.recv().await.unwrap()[..], &jpeg(1)[..]);

    supervisor.stop().await;

    assert!(run.was_killed());
    assert!(!supervisor.is_running());
    assert!(supervisor.info().await.is_none());
    assert!(cache.current_initialization().await.is_none());
    assert!(cache.latest_fragment().await.is_none());
    assert!(relay.current_frame().await.is_none());
    assert!(matches!(next_event(&mut sub).await, CacheEvent::Reset { .. }));

    // idempotent
    supervisor.stop().await;

    // a fresh start works after stop
    supervisor.start(args(), quick_policy()).await.unwrap();
    let _again = control.next_run().await;
    assert!(supervisor.is_running());
    supervisor.stop().await;
}

#[tokio::test]
async fn test_spawn_failure_on_start() {
    let (supervisor, control) = setup();
    control.fail_spawns(true);

    let err = supervisor.start(args(), quick_policy()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Spawn(_)));
    assert!(!supervisor.is_running());
    assert!(supervisor.info().await.is_none());

    // stop with nothing running is a no-op
    supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stalled_process_is_killed_and_respawned() {
    let (supervisor, mut control) = setup();
    let policy = RestartPolicy::default()
        .kill_after_stall(Duration::from_secs(5))
        .spawn_after_exit(Duration::from_secs(1));

    supervisor.start(args(), policy).await.unwrap();
    let mut first = control.next_run().await;

    // output keeps the process alive
    tokio::time::sleep(Duration::from_secs(4)).await;
    first.write_media(&init_segment()).await;
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(!first.was_killed());

    let _second = control.next_run().await;
    assert!(first.was_killed());

    let info = supervisor.info().await.unwrap();
    assert_eq!(info.restarts, 1);
    assert!(info.running);

    supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_respawn_limit_leaves_session_stopped() {
    let (supervisor, mut control) = setup();
    let cache = Arc::clone(supervisor.cache());
    let watch = supervisor.watch();
    let policy = RestartPolicy::default()
        .spawn_after_exit(Duration::from_secs(1))
        .respawn_limit(2);

    supervisor.start(args(), policy).await.unwrap();
    for _ in 0..3 {
        // dropping the run ends the process
        drop(control.next_run().await);
    }

    tokio::time::timeout(Duration::from_secs(30), watch.stopped())
        .await
        .unwrap();
    assert!(!supervisor.is_running());
    assert_eq!(control.spawns.load(std::sync::atomic::Ordering::SeqCst), 3);

    let info = supervisor.info().await.unwrap();
    assert_eq!(info.restarts, 2);
    assert!(!info.running);
    assert!(cache.current_initialization().await.is_none());

    // starting again is allowed once the old session gave up
    supervisor.start(args(), RestartPolicy::default()).await.unwrap();
    let _run = control.next_run().await;
    assert!(supervisor.is_running());
    supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_respawns_count_towards_limit() {
    let (supervisor, mut control) = setup();
    let watch = supervisor.watch();
    let policy = RestartPolicy::default()
        .spawn_after_exit(Duration::from_secs(1))
        .respawn_limit(3);

    supervisor.start(args(), policy).await.unwrap();
    let first = control.next_run().await;
    control.fail_spawns(true);
    drop(first);

    tokio::time::timeout(Duration::from_secs(30), watch.stopped())
        .await
        .unwrap();
    assert_eq!(control.spawns.load(std::sync::atomic::Ordering::SeqCst), 4);
    assert_eq!(supervisor.info().await.unwrap().restarts, 3);
}

#[tokio::test]
async fn test_log_lines_reach_sink() {
    init_tracing();
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink: LogSink = {
        let lines = Arc::clone(&lines);
        Arc::new(move |line: &str| lines.lock().unwrap().push(line.to_string()))
    };

    let (transcoder, mut control) = fake_transcoder();
    let supervisor = Supervisor::new(
        transcoder,
        Arc::new(FragmentCache::new()),
        Arc::new(FrameRelay::new()),
    )
    .with_log_sink(sink);

    supervisor.start(args(), quick_policy()).await.unwrap();
    let mut run = control.next_run().await;

    use tokio::io::AsyncWriteExt;
    run.log
        .write_all(b"Input #0, rtsp, from 'rtsp://camera/stream':\nStream mapping:\n")
        .await
        .unwrap();

    for _ in 0..500 {
        if lines.lock().unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        *lines.lock().unwrap(),
        vec![
            "Input #0, rtsp, from 'rtsp://camera/stream':".to_string(),
            "Stream mapping:".to_string()
        ]
    );

    supervisor.stop().await;
}

#[tokio::test]
async fn test_hls_through_supervisor() {
    let (supervisor, mut control) = setup();
    let hls = HlsEndpoint::new(Arc::clone(supervisor.cache()), supervisor.watch());

    assert_eq!(hls.get("test.m3u8").await, Err(HlsError::Unavailable));

    supervisor.start(args(), quick_policy()).await.unwrap();
    let mut run = control.next_run().await;

    let waiter = {
        let hls = hls.clone();
        tokio::spawn(async move { hls.get("test.m3u8").await })
    };

    run.write_media(&init_segment()).await;
    run.write_media(&fragment(1)).await;

    let playlist = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(playlist.body.to_vec()).unwrap();
    assert!(text.contains("#EXT-X-MAP:URI=\"init-test.mp4\""));
    assert!(text.contains("test1.m4s"));

    assert_eq!(
        hls.get("test1.m4s").await.unwrap().body,
        Bytes::from(fragment(1))
    );
    assert_eq!(hls.get("test7.m4s").await, Err(HlsError::NotFound));

    // a request waiting on the next session's data resolves when stopped
    supervisor.stop().await;
    assert_eq!(hls.get("init-test.mp4").await, Err(HlsError::Unavailable));
}
