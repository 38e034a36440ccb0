//! End-to-end daemon tests
//!
//! Each test starts a mock platform on a local port and runs the daemon
//! against it with a scripted process list.
//!
//! Run with: cargo test -p integration-tests --test daemon_tests

use std::time::Duration;

use integration_tests::*;
use rpc_core::Snowflake;
use rpc_gateway::protocol::OpCode;

fn published(frame: &ReceivedFrame) -> Option<Vec<Snowflake>> {
    frame
        .frame
        .as_presence_update()
        .map(|presence| presence.activities.iter().map(|a| a.application_id).collect())
}

// ============================================================================
// Detection -> presence
// ============================================================================

#[tokio::test]
async fn test_detected_game_is_published_and_cleared() {
    let platform = MockPlatform::start(GatewayBehavior::default(), detectable_games())
        .await
        .unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    let config = test_config(&platform, data_dir.path(), &[]).unwrap();
    let processes = ProcessTable::running(&["/usr/bin/htop", GAME_COMMAND]);

    let daemon = RunningDaemon::spawn(config, processes.source()).unwrap();

    let started = platform
        .wait_for_frames(Duration::from_secs(5), |frames| {
            frames
                .iter()
                .filter_map(published)
                .any(|ids| ids == vec![Snowflake::new(GAME_ID)])
        })
        .await;
    assert!(started, "activity for the running game was never published");
    // No cache yet, so the list was downloaded once
    assert_eq!(platform.catalog_requests(), 1);

    processes.set(&["/usr/bin/htop"]);
    let cleared = platform
        .wait_for_frames(Duration::from_secs(5), |frames| {
            frames.iter().filter_map(published).last() == Some(Vec::new())
        })
        .await;
    assert!(cleared, "activity was not cleared after the game exited");

    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn test_blacklisted_game_is_never_published() {
    let platform = MockPlatform::start(GatewayBehavior::default(), detectable_games())
        .await
        .unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    let blacklist = GAME_ID.to_string();
    let config = test_config(&platform, data_dir.path(), &[("RPC_GAMES_BLACKLIST", &blacklist)]).unwrap();

    let daemon = RunningDaemon::spawn(config, ProcessTable::running(&[GAME_COMMAND]).source()).unwrap();

    let identified = platform
        .wait_for_frames(Duration::from_secs(5), |frames| {
            frames.iter().any(|f| f.frame.op == OpCode::Identify)
        })
        .await;
    assert!(identified);
    // Several detection ticks
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    assert!(platform.frames_with_op(OpCode::PresenceUpdate).is_empty());
    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn test_activity_session_follows_game() {
    let platform = MockPlatform::start(GatewayBehavior::default(), detectable_games())
        .await
        .unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    let config = test_config(&platform, data_dir.path(), &[]).unwrap();
    let processes = ProcessTable::running(&[GAME_COMMAND]);

    let daemon = RunningDaemon::spawn(config, processes.source()).unwrap();

    let opened = wait_for(Duration::from_secs(5), || !platform.activity_reports().is_empty()).await;
    assert!(opened, "game start was never reported");

    processes.set(&[]);
    let closed = wait_for(Duration::from_secs(5), || platform.activity_reports().len() >= 2).await;
    assert!(closed, "game stop was never reported");
    daemon.stop().await.unwrap();

    let reports = platform.activity_reports();
    let (start, stop) = (&reports[0], &reports[1]);
    assert_eq!(start["application_id"], GAME_ID.to_string());
    assert_eq!(start["closed"], false);
    assert!(start["token"].is_null());
    assert!(start["exePath"].as_str().unwrap().ends_with("game.exe"));

    assert_eq!(stop["application_id"], GAME_ID.to_string());
    assert_eq!(stop["closed"], true);
    // Rolling token from the first reply
    assert_eq!(stop["token"], "tok-1");
}

// ============================================================================
// Games list refresh
// ============================================================================

#[tokio::test]
async fn test_stale_cache_is_refreshed() {
    let platform = MockPlatform::start(GatewayBehavior::default(), detectable_games())
        .await
        .unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    write_cache(data_dir.path(), chrono::Duration::days(10)).unwrap();
    let config = test_config(&platform, data_dir.path(), &[("RPC_GAME_LIST_DOWNLOAD_DELAY", "7")]).unwrap();

    let daemon = RunningDaemon::spawn(config, ProcessTable::default().source()).unwrap();

    let refreshed = wait_for(Duration::from_secs(5), || platform.catalog_requests() == 1).await;
    assert!(refreshed, "a 10 day old cache was not refreshed");

    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn test_fresh_cache_is_used_without_download() {
    let platform = MockPlatform::start(GatewayBehavior::default(), detectable_games())
        .await
        .unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    write_cache(data_dir.path(), chrono::Duration::days(3)).unwrap();
    let config = test_config(&platform, data_dir.path(), &[("RPC_GAME_LIST_DOWNLOAD_DELAY", "7")]).unwrap();

    let daemon = RunningDaemon::spawn(config, ProcessTable::running(&[GAME_COMMAND]).source()).unwrap();

    // The cached list alone is enough to detect the game
    let started = platform
        .wait_for_frames(Duration::from_secs(5), |frames| {
            frames
                .iter()
                .filter_map(published)
                .any(|ids| ids == vec![Snowflake::new(GAME_ID)])
        })
        .await;
    assert!(started);
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(platform.catalog_requests(), 0);
    daemon.stop().await.unwrap();
}

// ============================================================================
// Session recovery
// ============================================================================

#[tokio::test]
async fn test_missed_heartbeat_ack_reconnects_and_resumes() {
    let behavior = GatewayBehavior::default().with_heartbeat_interval(300).without_acks();
    let platform = MockPlatform::start(behavior, detectable_games()).await.unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    let config = test_config(&platform, data_dir.path(), &[("RPC_GAME_DETECTION", "false")]).unwrap();

    let daemon = RunningDaemon::spawn(config, ProcessTable::default().source()).unwrap();

    // Heartbeat, missed ack, backoff (ceiling 1s), new handshake
    let reconnected = platform
        .wait_for_frames(Duration::from_secs(5), |frames| {
            frames.iter().any(|f| f.connection == 1)
        })
        .await;
    assert!(reconnected, "no new handshake after a missed heartbeat ack");

    assert_eq!(platform.first_op_on(0), Some(OpCode::Identify));
    assert_eq!(platform.first_op_on(1), Some(OpCode::Resume));
    let resume = platform.frames_with_op(OpCode::Resume)[0].frame.as_resume().unwrap();
    assert_eq!(resume.session_id, "session-0");
    assert_eq!(resume.token, TEST_TOKEN);
    assert!(platform
        .frames()
        .iter()
        .any(|f| f.connection == 0 && f.frame.op == OpCode::Heartbeat));

    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_session_forces_fresh_identify() {
    let behavior = GatewayBehavior::default().invalidating_first_session();
    let platform = MockPlatform::start(behavior, detectable_games()).await.unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    let config = test_config(&platform, data_dir.path(), &[("RPC_GAME_DETECTION", "false")]).unwrap();

    let daemon = RunningDaemon::spawn(config, ProcessTable::default().source()).unwrap();

    let reidentified = platform
        .wait_for_frames(Duration::from_secs(5), |frames| {
            frames
                .iter()
                .any(|f| f.connection == 1 && f.frame.op == OpCode::Identify)
        })
        .await;
    assert!(reidentified, "no Identify after the session was invalidated");

    assert!(platform.frames_with_op(OpCode::Resume).is_empty());
    assert_eq!(platform.connections(), 2);

    daemon.stop().await.unwrap();
}
