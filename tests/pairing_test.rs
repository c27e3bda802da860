//! Integration tests for the pairing flow against the simulated adapter.

use bluetooth_helper::bluetooth::{AdapterCall, SimulatedAdapter};
use bluetooth_helper::{
    BluetoothHelper, BondState, Config, EventBus, EventKind, HelperError, LocalEventBus,
    PairEventKind, RawEvent,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const TARGET: &str = "AA:BB:CC:DD:EE:FF";
const OTHER: &str = "00:11:22:33:44:55";
const LIMIT: Duration = Duration::from_secs(5);

struct Fixture {
    helper: BluetoothHelper,
    adapter: Arc<SimulatedAdapter>,
    bus: Arc<LocalEventBus>,
}

fn fixture(configure: impl FnOnce(&mut Config)) -> Fixture {
    let bus = Arc::new(LocalEventBus::new().unwrap());
    let shared: Arc<dyn EventBus> = bus.clone();
    let adapter = Arc::new(SimulatedAdapter::new(shared.clone()));
    adapter.set_name(TARGET, "Headset");

    let mut config = Config::default();
    configure(&mut config);
    Fixture {
        helper: BluetoothHelper::new(adapter.clone(), shared, config),
        adapter,
        bus,
    }
}

fn acl(address: &str) -> RawEvent {
    RawEvent::for_device(EventKind::AclConnected, address)
}

fn bond(address: &str, state: BondState) -> RawEvent {
    RawEvent::bond_state_changed(address, state)
}

/// Run the request to its end and return event kinds, or the terminal error.
async fn run(fixture: &Fixture) -> (Vec<PairEventKind>, Option<HelperError>) {
    let events: Vec<_> = timeout(LIMIT, fixture.helper.pair_request(TARGET).events().collect())
        .await
        .expect("pairing did not finish");

    let mut kinds = Vec::new();
    let mut error = None;
    for event in events {
        match event {
            Ok(event) => kinds.push(event.kind()),
            Err(e) => error = Some(e),
        }
    }
    (kinds, error)
}

#[tokio::test]
async fn test_pairing_powers_on_adapter_and_bonds() {
    let f = fixture(|_| {});
    f.adapter.script_bond(vec![
        acl(TARGET),
        bond(TARGET, BondState::Bonding),
        bond(TARGET, BondState::Bonded),
    ]);

    let device = timeout(LIMIT, f.helper.pair_request(TARGET).perform())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(device.id, TARGET);
    assert_eq!(device.name.as_deref(), Some("Headset"));
    assert_eq!(
        f.adapter.calls(),
        vec![AdapterCall::TurnOn, AdapterCall::StartBond(TARGET.to_string())]
    );

    f.bus.owner().barrier().await;
    assert_eq!(f.bus.active_registrations(), 0);
    assert_eq!(f.bus.total_registrations(), f.bus.total_unregistrations());
}

#[tokio::test]
async fn test_pairing_emits_progress_in_order() {
    let f = fixture(|_| {});
    f.adapter.script_bond(vec![
        acl(TARGET),
        bond(TARGET, BondState::Bonding),
        bond(TARGET, BondState::Bonded),
    ]);

    let (kinds, error) = run(&f).await;
    assert_eq!(
        kinds,
        vec![
            PairEventKind::Started,
            PairEventKind::OnProgress,
            PairEventKind::Succeeded
        ]
    );
    assert!(error.is_none());
}

#[tokio::test]
async fn test_adapter_already_on_is_power_cycled() {
    let f = fixture(|_| {});
    f.adapter.set_on(true);
    f.adapter.script_bond(vec![bond(TARGET, BondState::Bonded)]);

    let (kinds, _) = run(&f).await;
    assert_eq!(kinds.last(), Some(&PairEventKind::Succeeded));
    assert_eq!(
        f.adapter.calls(),
        vec![
            AdapterCall::TurnOff,
            AdapterCall::TurnOn,
            AdapterCall::StartBond(TARGET.to_string())
        ]
    );
}

#[tokio::test]
async fn test_power_cycle_can_be_disabled() {
    let f = fixture(|config| config.adapter.power_cycle = false);
    f.adapter.set_on(true);
    f.adapter.script_bond(vec![bond(TARGET, BondState::Bonded)]);

    run(&f).await;
    assert_eq!(
        f.adapter.calls(),
        vec![AdapterCall::StartBond(TARGET.to_string())]
    );
}

#[tokio::test]
async fn test_already_bonded_device_succeeds_without_bonding() {
    let f = fixture(|_| {});
    f.adapter.set_bonded(TARGET);

    let (kinds, error) = run(&f).await;
    assert_eq!(kinds, vec![PairEventKind::Succeeded]);
    assert!(error.is_none());
    assert_eq!(f.adapter.calls(), vec![AdapterCall::TurnOn]);

    f.bus.owner().barrier().await;
    assert_eq!(f.bus.active_registrations(), 0);
}

#[tokio::test]
async fn test_events_for_other_devices_are_ignored() {
    let f = fixture(|_| {});
    f.adapter.script_bond(vec![
        acl(OTHER),
        bond(OTHER, BondState::Bonded),
        RawEvent::for_device(EventKind::AclDisconnected, OTHER),
        acl(TARGET),
        bond(TARGET, BondState::Bonded),
    ]);

    let (kinds, error) = run(&f).await;
    assert_eq!(
        kinds,
        vec![
            PairEventKind::Started,
            PairEventKind::OnProgress,
            PairEventKind::Succeeded
        ]
    );
    assert!(error.is_none());
}

#[tokio::test]
async fn test_not_done_after_progress_fails() {
    let f = fixture(|_| {});
    f.adapter
        .script_bond(vec![acl(TARGET), bond(TARGET, BondState::None)]);

    let (kinds, error) = run(&f).await;
    assert_eq!(kinds, vec![PairEventKind::Started, PairEventKind::OnProgress]);
    assert!(matches!(error, Some(HelperError::PairingFailed { .. })));
}

#[tokio::test]
async fn test_early_not_done_is_forwarded_by_default() {
    let f = fixture(|_| {});
    f.adapter.script_bond(vec![
        bond(TARGET, BondState::None),
        acl(TARGET),
        bond(TARGET, BondState::Bonded),
    ]);

    let (kinds, error) = run(&f).await;
    assert_eq!(
        kinds,
        vec![
            PairEventKind::Started,
            PairEventKind::NotDone,
            PairEventKind::OnProgress,
            PairEventKind::Succeeded
        ]
    );
    assert!(error.is_none());
}

#[tokio::test]
async fn test_early_not_done_fails_when_strict() {
    let f = fixture(|config| config.pairing.strict_not_done = true);
    f.adapter.script_bond(vec![bond(TARGET, BondState::None)]);

    let (kinds, error) = run(&f).await;
    assert_eq!(kinds, vec![PairEventKind::Started]);
    assert!(matches!(error, Some(HelperError::PairingFailed { .. })));
}

#[tokio::test]
async fn test_bond_start_failure_is_terminal() {
    let f = fixture(|_| {});
    f.adapter.fail_bond("controller busy");

    let err = timeout(LIMIT, f.helper.pair_request(TARGET).perform())
        .await
        .unwrap()
        .unwrap_err();
    match err {
        HelperError::PairingFailed { address, reason } => {
            assert_eq!(address, TARGET);
            assert!(reason.contains("controller busy"));
        }
        other => panic!("unexpected error: {other}"),
    }

    f.bus.owner().barrier().await;
    assert_eq!(f.bus.total_registrations(), f.bus.total_unregistrations());
}

#[tokio::test]
async fn test_disconnect_during_bonding_fails() {
    let f = fixture(|_| {});
    f.adapter.script_bond(vec![
        acl(TARGET),
        RawEvent::for_device(EventKind::AclDisconnected, TARGET),
        bond(TARGET, BondState::Bonded),
    ]);

    let (kinds, error) = run(&f).await;
    assert_eq!(kinds, vec![PairEventKind::Started, PairEventKind::OnProgress]);
    assert!(matches!(error, Some(HelperError::PairingFailed { .. })));

    f.bus.owner().barrier().await;
    assert_eq!(f.bus.active_registrations(), 0);
}

#[tokio::test]
async fn test_silent_device_times_out() {
    let f = fixture(|config| config.pairing.timeout_secs = 1);

    let (kinds, error) = run(&f).await;
    assert_eq!(kinds, vec![PairEventKind::Started]);
    assert_eq!(
        error,
        Some(HelperError::PairingTimeout {
            address: TARGET.to_string()
        })
    );
    assert!(f
        .adapter
        .calls()
        .contains(&AdapterCall::CancelPairingPrompt));
}

#[tokio::test]
async fn test_dropping_request_releases_listener() {
    let f = fixture(|_| {});
    let mut events = f.helper.pair_request(TARGET).events();

    let first = timeout(LIMIT, events.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(first.kind(), PairEventKind::Started);
    f.bus.owner().barrier().await;
    assert_eq!(f.bus.active_registrations(), 1);

    drop(events);
    f.bus.owner().barrier().await;
    assert_eq!(f.bus.active_registrations(), 0);
}

#[tokio::test]
async fn test_unpolled_scan_does_not_stall_pairing() {
    let f = fixture(|config| config.pairing.timeout_secs = 1);
    f.adapter.push_scan_batch(vec![
        RawEvent::device_found("00:00:00:00:00:01", Some("MP"), Some(-56)),
        RawEvent::device_found("00:00:00:00:00:02", Some("MP2"), Some(-60)),
        RawEvent::device_found("00:00:00:00:00:03", Some("MP3"), Some(-70)),
    ]);
    f.adapter.script_bond(vec![bond(TARGET, BondState::Bonded)]);

    let search = f.helper.search_request().build();
    let mut found = search.perform();
    let first = timeout(LIMIT, found.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(first.id, "00:00:00:00:00:01");

    // The scan stream stays alive but is not polled again.
    let device = timeout(LIMIT, f.helper.pair_request(TARGET).perform())
        .await
        .expect("pairing stalled behind the idle scan")
        .unwrap();
    assert_eq!(device.id, TARGET);

    drop(found);
    f.bus.owner().barrier().await;
    assert_eq!(f.bus.active_registrations(), 0);
}

#[tokio::test]
async fn test_target_progress_pushes_out_timeout() {
    let f = fixture(|config| config.pairing.timeout_secs = 3);
    let mut events = f.helper.pair_request(TARGET).events();

    let started = timeout(LIMIT, events.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(started.kind(), PairEventKind::Started);

    let adapter = f.adapter.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        adapter.emit(acl(TARGET));
    });

    let progress = timeout(LIMIT, events.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(progress.kind(), PairEventKind::OnProgress);

    // Without the reset the countdown would end 3s after Started.
    assert!(timeout(Duration::from_millis(2000), events.next())
        .await
        .is_err());

    let last = timeout(Duration::from_secs(3), events.next())
        .await
        .expect("timeout never fired")
        .unwrap();
    assert_eq!(
        last,
        Err(HelperError::PairingTimeout {
            address: TARGET.to_string()
        })
    );
}

#[tokio::test]
async fn test_progress_of_other_device_keeps_countdown() {
    let f = fixture(|config| config.pairing.timeout_secs = 3);
    let mut events = f.helper.pair_request(TARGET).events();

    let started = timeout(LIMIT, events.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(started.kind(), PairEventKind::Started);

    let adapter = f.adapter.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        adapter.emit(acl(OTHER));
        adapter.emit(RawEvent::for_device(EventKind::PairingRequestShown, OTHER));
    });

    // Fires 3s after Started, well before a reset at 1.5s would allow.
    let next = timeout(Duration::from_millis(3500), events.next())
        .await
        .expect("countdown was extended by another device")
        .unwrap();
    assert_eq!(
        next,
        Err(HelperError::PairingTimeout {
            address: TARGET.to_string()
        })
    );
}
