//! Contract tests for the failover controller
//!
//! These verify the lease-writing discipline end to end against an
//! in-memory provider: monotone primary renewals, the double condition
//! guarding DR promotion, and the one-shot admin operations.

mod common;

use common::*;
use failover_core::config::Role;
use failover_core::controller::{DrTickOutcome, DrWatch, FailoverController};
use failover_core::lease::{Lease, unix_now};

fn controller(
    role: Role,
    fail_threshold: u32,
    provider: &MockDnsProvider,
    probe: ScriptedProbe,
) -> FailoverController {
    FailoverController::new(
        controller_config(role, fail_threshold),
        Box::new(provider.clone()),
        Box::new(probe),
    )
    .expect("controller construction succeeds")
}

#[tokio::test]
async fn primary_heartbeat_renews_with_monotone_expiry() {
    let provider = MockDnsProvider::new();
    let controller = controller(
        Role::Primary,
        3,
        &provider,
        ScriptedProbe::always(true),
    );

    let before = unix_now();
    for _ in 0..3 {
        controller.primary_tick().await.expect("tick succeeds");
    }
    let after = unix_now();

    let writes = provider.writes();
    assert_eq!(writes.len(), 3);
    for write in &writes {
        assert_eq!(write.ip, primary_ip());
        assert_eq!(write.owner, Role::Primary);
        // Lease TTL is 60 in the test config.
        assert!(write.expires_at >= before + 60);
        assert!(write.expires_at <= after + 60);
    }
    for pair in writes.windows(2) {
        assert!(
            pair[1].expires_at >= pair[0].expires_at,
            "expiries must be non-decreasing"
        );
    }
}

#[tokio::test]
async fn record_pair_is_coherent_after_every_write() {
    let provider = MockDnsProvider::new();
    let controller = controller(Role::Primary, 3, &provider, ScriptedProbe::always(true));

    controller.primary_tick().await.unwrap();

    let records = provider.records();
    assert_eq!(records.a, Some(primary_ip()));
    let lease = Lease::parse(records.txt.as_deref().unwrap());
    assert_eq!(lease.owner, Some(Role::Primary));
    assert_eq!(lease.expires_at, provider.writes()[0].expires_at);
}

#[tokio::test]
async fn primary_tick_surfaces_provider_failure_without_state() {
    let provider = MockDnsProvider::new();
    let controller = controller(Role::Primary, 3, &provider, ScriptedProbe::always(true));

    provider.set_fail_writes(true);
    assert!(controller.primary_tick().await.is_err());

    // The next tick succeeds on its own; there is no state to reconcile.
    provider.set_fail_writes(false);
    controller.primary_tick().await.unwrap();
    assert_eq!(provider.writes().len(), 1);
}

#[tokio::test]
async fn dr_does_not_promote_while_lease_is_valid() {
    let provider = MockDnsProvider::new();
    // Primary wrote recently; its lease is still half an hour out.
    provider.seed(
        primary_ip(),
        &Lease::encode(Role::Primary, unix_now() + 1800),
    );

    let controller = controller(Role::Dr, 3, &provider, ScriptedProbe::always(false));
    let mut watch = DrWatch::default();

    assert_eq!(
        controller.dr_tick(&mut watch).await.unwrap(),
        DrTickOutcome::Observing { fails: 1 }
    );
    assert_eq!(
        controller.dr_tick(&mut watch).await.unwrap(),
        DrTickOutcome::Observing { fails: 2 }
    );

    // Threshold reached, but the lease is valid: wait, do not write.
    let outcome = controller.dr_tick(&mut watch).await.unwrap();
    assert!(matches!(outcome, DrTickOutcome::Waiting { remaining } if remaining > 0));
    assert!(
        provider.writes().is_empty(),
        "DR must not write while the primary lease is valid"
    );
}

#[tokio::test]
async fn dr_promotes_once_threshold_and_expiry_both_hold() {
    let provider = MockDnsProvider::new();
    // The primary stopped renewing a while ago.
    provider.seed(primary_ip(), &Lease::encode(Role::Primary, unix_now() - 1));

    let controller = controller(Role::Dr, 3, &provider, ScriptedProbe::always(false));
    let mut watch = DrWatch::default();

    // Below the threshold nothing is even read.
    for expected in 1..3u32 {
        assert_eq!(
            controller.dr_tick(&mut watch).await.unwrap(),
            DrTickOutcome::Observing { fails: expected }
        );
        assert!(provider.writes().is_empty());
    }

    assert_eq!(
        controller.dr_tick(&mut watch).await.unwrap(),
        DrTickOutcome::Promoted
    );

    let writes = provider.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].ip, dr_ip());
    assert_eq!(writes[0].owner, Role::Dr);

    // Once active, further failing ticks renew rather than re-promote.
    assert_eq!(
        controller.dr_tick(&mut watch).await.unwrap(),
        DrTickOutcome::Renewed
    );
    assert_eq!(provider.writes().len(), 2);
    assert_eq!(provider.writes()[1].owner, Role::Dr);
}

#[tokio::test]
async fn healthy_probe_resets_the_failure_counter() {
    let provider = MockDnsProvider::new();
    provider.seed(primary_ip(), &Lease::encode(Role::Primary, unix_now() - 1));

    // Two failures, one recovery, then failures again: the streak restarts.
    let probe = ScriptedProbe::new([false, false, true, false, false], false);
    let controller = controller(Role::Dr, 3, &provider, probe);
    let mut watch = DrWatch::default();

    controller.dr_tick(&mut watch).await.unwrap();
    controller.dr_tick(&mut watch).await.unwrap();
    assert_eq!(
        controller.dr_tick(&mut watch).await.unwrap(),
        DrTickOutcome::Healthy
    );
    assert_eq!(watch.consecutive_failures, 0);

    assert_eq!(
        controller.dr_tick(&mut watch).await.unwrap(),
        DrTickOutcome::Observing { fails: 1 }
    );
    assert_eq!(
        controller.dr_tick(&mut watch).await.unwrap(),
        DrTickOutcome::Observing { fails: 2 }
    );
    assert!(provider.writes().is_empty());
}

#[tokio::test]
async fn dr_tick_survives_provider_read_failure() {
    let provider = MockDnsProvider::new();
    provider.set_fail_reads(true);

    let controller = controller(Role::Dr, 1, &provider, ScriptedProbe::always(false));
    let mut watch = DrWatch::default();

    assert!(controller.dr_tick(&mut watch).await.is_err());
    assert!(provider.writes().is_empty());

    // The loop retries next tick; once reads recover the decision is made.
    provider.set_fail_reads(false);
    provider.seed(primary_ip(), &Lease::encode(Role::Primary, unix_now() - 1));
    assert_eq!(
        controller.dr_tick(&mut watch).await.unwrap(),
        DrTickOutcome::Promoted
    );
}

#[tokio::test]
async fn admin_operations_write_the_expected_owner() {
    let provider = MockDnsProvider::new();
    let controller = controller(Role::Primary, 3, &provider, ScriptedProbe::always(true));

    controller.init().await.unwrap();
    controller.promote().await.unwrap();
    controller.failback().await.unwrap();

    let writes = provider.writes();
    assert_eq!(writes.len(), 3);
    assert_eq!((writes[0].ip, writes[0].owner), (primary_ip(), Role::Primary));
    assert_eq!((writes[1].ip, writes[1].owner), (dr_ip(), Role::Dr));
    assert_eq!((writes[2].ip, writes[2].owner), (primary_ip(), Role::Primary));
}

#[tokio::test]
async fn status_reports_the_decoded_lease() {
    let provider = MockDnsProvider::new();
    let expires_at = unix_now() + 55;
    provider.seed(primary_ip(), &Lease::encode(Role::Primary, expires_at));

    let controller = controller(Role::Primary, 3, &provider, ScriptedProbe::always(true));
    let status = controller.status().await.unwrap();

    assert_eq!(status.record, "ingest.example.com");
    assert_eq!(status.a, Some(primary_ip()));
    assert_eq!(status.owner, Some(Role::Primary));
    assert_eq!(status.expires_at, Some(expires_at));
    let remaining = status.time_remaining.unwrap();
    assert!((0..=55).contains(&remaining));
}

#[tokio::test]
async fn status_of_absent_records_is_all_none() {
    let provider = MockDnsProvider::new();
    let controller = controller(Role::Primary, 3, &provider, ScriptedProbe::always(true));

    let status = controller.status().await.unwrap();
    assert_eq!(status.a, None);
    assert_eq!(status.owner, None);
    assert_eq!(status.expires_at, None);
    assert_eq!(status.time_remaining, None);
}

#[tokio::test]
async fn run_loop_stops_on_shutdown_after_finishing_the_tick() {
    let provider = MockDnsProvider::new();
    let controller = controller(Role::Primary, 3, &provider, ScriptedProbe::always(true));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { controller.run(shutdown_rx).await });

    // The first interval tick fires immediately.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    shutdown_tx.send(true).unwrap();

    handle.await.unwrap().unwrap();
    assert!(!provider.writes().is_empty());
}
