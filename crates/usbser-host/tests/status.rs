//! Serial status caching and change-driven notification.

mod common;

use common::{bring_up, device, Recorder};
use std::sync::Arc;
use usbser_core::types::{LineStatus, ModemStatus, SerialStatus};
use usbser_driver_mock::{new_journal, MockAdapter};
use usbser_host::{HostConfig, RegistryBuilder, SerialHost};

fn status(line: LineStatus, modem: ModemStatus) -> SerialStatus {
    SerialStatus { line, modem }
}

#[tokio::test]
async fn first_report_after_connect_always_notifies() {
    let journal = new_journal();
    let adapter = Arc::new(MockAdapter::new("mock").with_journal(journal.clone()));
    let recorder = Recorder::new(journal);
    let registry = RegistryBuilder::new().register(adapter.clone());
    let host = SerialHost::new(HostConfig::default(), registry, Some(recorder.clone())).unwrap();
    let handle = bring_up(&host, device(0x02)).await;

    // Even the all-clear report differs from the primed cache.
    let port = adapter.port(0).unwrap();
    port.push_status(SerialStatus::empty()).await;

    assert_eq!(recorder.statuses.lock().unwrap().len(), 1);
    assert_eq!(host.status(handle).await.unwrap(), SerialStatus::empty());
}

#[tokio::test]
async fn unchanged_report_is_suppressed() {
    let journal = new_journal();
    let adapter = Arc::new(MockAdapter::new("mock").with_journal(journal.clone()));
    let recorder = Recorder::new(journal);
    let registry = RegistryBuilder::new().register(adapter.clone());
    let host = SerialHost::new(HostConfig::default(), registry, Some(recorder.clone())).unwrap();
    let _handle = bring_up(&host, device(0x02)).await;

    let port = adapter.port(0).unwrap();
    let quiet = status(LineStatus::empty(), ModemStatus::empty());

    port.push_status(quiet).await;
    port.push_status(quiet).await;
    port.push_status(quiet).await;
    assert_eq!(recorder.statuses.lock().unwrap().len(), 1);

    // A real change notifies exactly once, with the new value.
    let carrier = status(LineStatus::empty(), ModemStatus::CARRIER);
    port.push_status(carrier).await;
    port.push_status(carrier).await;

    let seen = recorder.statuses.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1], carrier);
}

#[tokio::test]
async fn status_snapshot_tracks_latest_report() {
    let adapter = Arc::new(MockAdapter::new("mock"));
    let registry = RegistryBuilder::new().register(adapter.clone());
    let host = SerialHost::new(HostConfig::default(), registry, None).unwrap();
    let handle = bring_up(&host, device(0x02)).await;

    let port = adapter.port(0).unwrap();
    let breaking = status(LineStatus::BREAK | LineStatus::FRAMING_ERR, ModemStatus::CTS);
    port.push_status(breaking).await;

    let snapshot = host.status(handle).await.unwrap();
    assert_eq!(snapshot, breaking);
    assert!(snapshot.line.contains(LineStatus::BREAK));
}

#[tokio::test]
async fn status_readable_without_notification_set() {
    // No events registered at all: updates still maintain the cache.
    let adapter = Arc::new(MockAdapter::new("mock"));
    let registry = RegistryBuilder::new().register(adapter.clone());
    let host = SerialHost::new(HostConfig::default(), registry, None).unwrap();
    let handle = bring_up(&host, device(0x02)).await;

    let port = adapter.port(0).unwrap();
    port.push_status(SerialStatus::empty()).await;
    assert_eq!(host.status(handle).await.unwrap(), SerialStatus::empty());
}
