mod common;

use common::{process_alive, wait_for, Fixture, Harness, STATIONS};
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rapid_station_changes_leave_one_decoder() {
    let fixture = Fixture::new(&STATIONS);
    let harness = Harness::new(&fixture.config);
    let d = &harness.dispatcher;

    for n in 1..=10 {
        assert!(d.execute(&format!("station {}", n)).await.ok);
    }

    let status = d.decoder_status().await;
    assert_eq!(status.spawned, 10);
    let live = status.pid.expect("a decoder is running") as i32;

    // The newest decoder records itself once the shell is up.
    let pids_path = fixture.pids_path();
    assert!(
        wait_for(Duration::from_secs(5), || {
            let recorded = std::fs::read_to_string(&pids_path).unwrap_or_default();
            async move { recorded.lines().any(|l| l.trim() == live.to_string()) }
        })
        .await
    );

    let recorded = fixture.recorded_pids();
    assert!(!recorded.is_empty());
    for pid in recorded {
        if pid == live {
            assert!(process_alive(pid), "current decoder {pid} should run");
        } else {
            assert!(!process_alive(pid), "replaced decoder {pid} still alive");
        }
    }

    harness.close().await;
    assert!(!process_alive(live));
}

#[tokio::test]
async fn decoder_ignoring_sigterm_is_killed() {
    let mut fixture = Fixture::new(&STATIONS);
    let script = format!(
        "trap '' TERM; echo $$ >> '{}'; while :; do sleep 1; done",
        fixture.pids_path().display()
    );
    fixture.set_decoder_script(&script);
    fixture.config.decoder.stop_timeout_ms = 300;
    let harness = Harness::new(&fixture.config);
    let d = &harness.dispatcher;

    assert!(d.execute("play").await.ok);
    let pids_path = fixture.pids_path();
    assert!(
        wait_for(Duration::from_secs(5), || {
            let exists = pids_path.exists();
            async move { exists }
        })
        .await
    );
    let pid = fixture.recorded_pids()[0];

    let started = Instant::now();
    assert_eq!(d.execute("stop").await.message, "playback stopped");
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300), "stopped after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "stopped after {elapsed:?}");
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn generation_advances_on_every_switch_and_stop() {
    let fixture = Fixture::new(&STATIONS);
    let harness = Harness::new(&fixture.config);
    let d = &harness.dispatcher;

    let initial = d.decoder_status().await.generation;
    d.execute("play").await;
    let playing = d.decoder_status().await.generation;
    assert!(playing > initial);

    d.execute("next").await;
    let switched = d.decoder_status().await.generation;
    assert!(switched > playing);

    d.execute("stop").await;
    let stopped = d.decoder_status().await;
    assert!(stopped.generation > switched);
    assert_eq!(stopped.pid, None);
    assert!(!stopped.running);
}
