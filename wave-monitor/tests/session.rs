use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;
use wave_core::protocol::{Command, CommandError, PacketCode};
use wave_core::{AlertId, DevicePhase, LinkStatus, MonitorUpdate, TelemetryEvent};
use wave_monitor::{
    Acknowledgement, ConnectionError, MockConnector, MockFailure, MonitorState, SendError,
    TrackerConfig, connect,
};

const RECEPTION: &[&str] = &[
    "=== RÉCEPTEUR WAVE PRÊT ===",
    "",
    "DEBUG: Signal détecté !",
    "DEBUG: Début de message - Longueur attendue: 12",
    "DEBUG: Paquet 1 reçu: 0x457661",
    "  Buffer actuel: 'Eva' (3/12 chars)",
    "DEBUG: Paquet 2 reçu: 0x1637561",
    "  Buffer actuel: 'Evacua' (6/12 chars)",
    "DEBUG: Paquet 3 reçu: 0x2746520",
    "  Buffer actuel: 'Evacuate ' (9/12 chars)",
    "DEBUG: Paquet 4 reçu: 0x36E6F77",
    "  Buffer actuel: 'Evacuate now' (12/12 chars)",
    "✅ MESSAGE PERSONNALISÉ REÇU: 'Evacuate now' (12 caractères)",
    "🚨 ALERTE NUCLÉAIRE ACTIVÉE !",
    "DEBUG: Buffer réinitialisé",
];

/// Collect updates until the link reports it is down.
async fn until_disconnected(rx: &mut broadcast::Receiver<MonitorUpdate>) -> Vec<MonitorUpdate> {
    let mut seen = Vec::new();
    let collect = async {
        loop {
            match rx.recv().await {
                Ok(update @ MonitorUpdate::Link(LinkStatus::Disconnected { .. })) => {
                    seen.push(update);
                    break;
                }
                Ok(update) => seen.push(update),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    timeout(Duration::from_secs(5), collect)
        .await
        .expect("link never reported disconnection");
    seen
}

#[tokio::test]
async fn transcript_produces_one_alert() -> Result<(), ConnectionError> {
    let state = MonitorState::default();
    let mut rx = state.subscribe();

    let session = connect(&MockConnector::new(RECEPTION.iter().copied()), state.clone()).await?;
    let updates = until_disconnected(&mut rx).await;

    assert!(matches!(
        updates.first(),
        Some(MonitorUpdate::Link(LinkStatus::Connected { .. }))
    ));

    let events: Vec<_> = updates
        .iter()
        .filter_map(|u| match u {
            MonitorUpdate::Event(event) => Some(event),
            _ => None,
        })
        .collect();
    // blank line filtered, everything else classified
    assert_eq!(events.len(), RECEPTION.len() - 1);
    assert!(matches!(events[0], TelemetryEvent::Unrecognized { .. }));

    let recorded: Vec<_> = updates
        .iter()
        .filter_map(|u| match u {
            MonitorUpdate::AlertRecorded(entry) => Some(entry),
            _ => None,
        })
        .collect();
    assert_eq!(recorded.len(), 1);
    assert_eq!(&*recorded[0].text, "Evacuate now");

    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.journal_len, 1);
    assert_eq!(snapshot.counters.messages_received, 1);
    assert_eq!(snapshot.counters.unrecognized, 0);
    assert!(!snapshot.reassembling);

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn out_of_sequence_scenario() -> Result<(), ConnectionError> {
    let state = MonitorState::default();
    let mut rx = state.subscribe();

    let connector = MockConnector::new([
        "DEBUG: Début de message - Longueur attendue: 12",
        "DEBUG: Paquet 1 reçu: 0x457661",
        "DEBUG: Signal hors séquence: 0x1A2B3C4D",
        "✅ MESSAGE PERSONNALISÉ REÇU: ''",
    ]);
    let session = connect(&connector, state.clone()).await?;
    let updates = until_disconnected(&mut rx).await;

    assert!(updates.contains(&MonitorUpdate::Event(TelemetryEvent::OutOfSequence {
        code: PacketCode(0x1A2B_3C4D)
    })));
    assert!(updates.contains(&MonitorUpdate::Event(TelemetryEvent::MessageEmptyError)));

    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.counters.unrecognized, 2);
    assert_eq!(snapshot.journal_len, 0);

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn commands_are_written_in_order() -> Result<(), SendError> {
    let connector = MockConnector::new(Vec::<String>::new()).hold_open(true);
    let written = connector.written();
    let session = connect(&connector, MonitorState::default())
        .await
        .expect("mock link opens");
    let handle = session.handle();

    handle.send(&Command::SetMessage {
        text: "Evacuate now".into(),
    })?;
    handle.send(&Command::Sound { enabled: false })?;
    handle.send(&Command::Ping)?;

    let expected = "MSG:Evacuate now\nsoundoff\nPING\n";
    timeout(Duration::from_secs(5), async {
        while written.to_string_lossy() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("commands never reached the device");

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn invalid_command_writes_nothing() {
    let connector = MockConnector::new(Vec::<String>::new()).hold_open(true);
    let written = connector.written();
    let session = connect(&connector, MonitorState::default())
        .await
        .expect("mock link opens");
    let handle = session.handle();

    let too_long = "x".repeat(51);
    let result = handle.send(&Command::SetMessage { text: too_long });
    assert!(matches!(
        result,
        Err(SendError::Invalid(CommandError::MessageTooLong { length: 51, max: 50 }))
    ));

    let result = handle.send(&Command::SetMessage { text: "  ".into() });
    assert!(matches!(
        result,
        Err(SendError::Invalid(CommandError::EmptyMessage))
    ));

    session.close().await;
    assert!(written.contents().is_empty());
}

#[tokio::test]
async fn acknowledging_sends_stop_alert_once() -> Result<(), SendError> {
    let connector = MockConnector::new(["✅ MESSAGE PERSONNALISÉ REÇU: 'Evacuate now'"]).hold_open(true);
    let written = connector.written();
    let state = MonitorState::default();
    let mut rx = state.subscribe();
    let session = connect(&connector, state.clone())
        .await
        .expect("mock link opens");
    let handle = session.handle();

    timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(MonitorUpdate::AlertRecorded(_)) = rx.recv().await {
                break;
            }
        }
    })
    .await
    .expect("alert never recorded");

    assert_eq!(
        handle.acknowledge_alert(AlertId(1)).await?,
        Acknowledgement::Acknowledged
    );
    assert_eq!(
        handle.acknowledge_alert(AlertId(1)).await?,
        Acknowledgement::AlreadyAcknowledged
    );
    assert_eq!(
        handle.acknowledge_alert(AlertId(99)).await?,
        Acknowledgement::NotFound
    );

    timeout(Duration::from_secs(5), async {
        while written.to_string_lossy() != "stopalert\n" {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stopalert never written");

    assert_eq!(state.snapshot().await.unacknowledged, 0);

    session.close().await;
    assert_eq!(written.to_string_lossy(), "stopalert\n");
    Ok(())
}

#[tokio::test]
async fn close_is_idempotent() {
    let connector = MockConnector::new(Vec::<String>::new()).hold_open(true);
    let session = connect(&connector, MonitorState::default())
        .await
        .expect("mock link opens");
    let handle = session.handle();

    handle.close();
    handle.close();
    assert!(handle.is_closed());

    timeout(Duration::from_secs(5), session.closed())
        .await
        .expect("session tasks did not stop");

    handle.close();
    assert!(matches!(
        handle.send(&Command::Ping),
        Err(SendError::SessionClosed)
    ));
}

#[tokio::test]
async fn connect_failures_are_classified() {
    let state = MonitorState::default();

    let busy = MockConnector::new(Vec::<String>::new())
        .with_port("/dev/ttyUSB0")
        .failing(MockFailure::Busy);
    let err = connect(&busy, state.clone()).await.err();
    assert_eq!(
        err,
        Some(ConnectionError::PortBusy {
            port: "/dev/ttyUSB0".into()
        })
    );

    let missing = busy.failing(MockFailure::NotFound);
    let err = connect(&missing, state).await.err();
    assert!(matches!(err, Some(ConnectionError::PortNotFound { .. })));
    assert!(err.and_then(|e| e.remediation()).is_some());
}

#[tokio::test]
async fn dispatcher_returns_phase_to_idle() -> Result<(), ConnectionError> {
    let idle_timeout = Duration::from_millis(300);
    let state = MonitorState::new(TrackerConfig {
        idle_timeout,
        ..TrackerConfig::default()
    });
    let mut rx = state.subscribe();

    let connector = MockConnector::new(["UID scanné : 04 A3 2B 1C"]).hold_open(true);
    let started = tokio::time::Instant::now();
    let session = connect(&connector, state.clone()).await?;

    let phases = timeout(Duration::from_secs(5), async {
        let mut phases = Vec::new();
        loop {
            if let Ok(MonitorUpdate::Phase(change)) = rx.recv().await {
                phases.push((change.phase, tokio::time::Instant::now()));
                if change.phase == DevicePhase::Idle {
                    break phases;
                }
            }
        }
    })
    .await
    .expect("phase never went back to idle");

    // nobody calls expire here, the session's own timer does
    let [(DevicePhase::Detecting, _), (DevicePhase::Idle, idle)] = phases[..] else {
        panic!("unexpected phases: {phases:?}");
    };
    assert!(idle - started >= idle_timeout);
    assert_eq!(state.snapshot().await.phase, DevicePhase::Idle);

    session.close().await;
    Ok(())
}
