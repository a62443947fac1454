//! Family-lock semantics: same-family operations serialize, different
//! families proceed in parallel, and lock waits honor the request
//! timeout.

mod common;

use common::{bring_up, device};
use std::sync::Arc;
use std::time::{Duration, Instant};
use usbser_core::SerialError;
use usbser_driver_mock::{ClaimPolicy, MockAdapter};
use usbser_host::{HostConfig, RegistryBuilder, SerialHost};

#[tokio::test]
async fn different_families_do_not_contend() {
    let delay = Duration::from_millis(100);
    let alpha = Arc::new(
        MockAdapter::new("alpha")
            .with_claim(ClaimPolicy::ClassCode(0xA0))
            .with_op_delay(delay),
    );
    let beta = Arc::new(
        MockAdapter::new("beta")
            .with_claim(ClaimPolicy::ClassCode(0xB0))
            .with_op_delay(delay),
    );

    let registry = RegistryBuilder::new()
        .register(alpha.clone())
        .register(beta.clone());
    let host = Arc::new(SerialHost::new(HostConfig::default(), registry, None).unwrap());

    let a = bring_up(&host, device(0xA0)).await;
    let b = bring_up(&host, device(0xB0)).await;

    let start = Instant::now();
    let (ra, rb) = tokio::join!(host.baud_rate(a), host.baud_rate(b));
    ra.unwrap();
    rb.unwrap();

    // Two 100ms operations overlapping, not queueing.
    assert!(
        start.elapsed() < Duration::from_millis(180),
        "cross-family operations must run in parallel, took {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn same_family_operations_serialize() {
    let delay = Duration::from_millis(100);
    let adapter = Arc::new(MockAdapter::new("mock").with_op_delay(delay));
    let registry = RegistryBuilder::new().register(adapter.clone());
    let host = Arc::new(SerialHost::new(HostConfig::default(), registry, None).unwrap());

    // Two functions bound to the same family.
    let a = bring_up(&host, device(0x02)).await;
    let b = bring_up(&host, device(0x02)).await;

    let start = Instant::now();
    let (ra, rb) = tokio::join!(host.baud_rate(a), host.baud_rate(b));
    ra.unwrap();
    rb.unwrap();

    assert!(
        start.elapsed() >= Duration::from_millis(195),
        "same-family operations must serialize, took {:?}",
        start.elapsed()
    );
    assert_eq!(adapter.max_concurrent_ops(), 1);
}

#[tokio::test]
async fn stress_keeps_family_mutually_exclusive() {
    let adapter = Arc::new(MockAdapter::new("mock").with_op_delay(Duration::from_millis(2)));
    let registry = RegistryBuilder::new().register(adapter.clone());
    let host = Arc::new(SerialHost::new(HostConfig::default(), registry, None).unwrap());

    let mut handles = Vec::new();
    for _ in 0..4 {
        handles.push(bring_up(&host, device(0x02)).await);
    }

    let mut tasks = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        let host = Arc::clone(&host);
        tasks.push(tokio::spawn(async move {
            for round in 0..8u32 {
                host.set_baud_rate(handle, 9_600 + round * 100 + i as u32)
                    .await
                    .unwrap();
                let _ = host.data_format(handle).await.unwrap();
            }
        }));
    }
    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }

    assert_eq!(
        adapter.max_concurrent_ops(),
        1,
        "family lock must never admit two operations at once"
    );
}

#[tokio::test]
async fn family_lock_wait_honors_request_timeout() {
    let adapter = Arc::new(MockAdapter::new("mock").with_op_delay(Duration::from_millis(300)));
    let registry = RegistryBuilder::new().register(adapter.clone());
    let host = Arc::new(SerialHost::new(HostConfig::default(), registry, None).unwrap());
    let handle = bring_up(&host, device(0x02)).await;

    // Tighten the wait budget after start; it applies to every operation
    // from here on.
    host.set_request_timeout(Duration::from_millis(100));

    let slow = {
        let host = Arc::clone(&host);
        tokio::spawn(async move { host.baud_rate(handle).await })
    };
    // Let the slow operation take the family lock first.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = host.baud_rate(handle).await.unwrap_err();
    assert!(matches!(err, SerialError::Timeout));

    slow.await.unwrap().unwrap();
}

#[tokio::test]
async fn concurrent_transmits_and_parameter_ops_coexist() {
    let adapter = Arc::new(MockAdapter::new("mock"));
    let registry = RegistryBuilder::new().register(adapter.clone());
    let host = Arc::new(SerialHost::new(HostConfig::default(), registry, None).unwrap());
    let handle = bring_up(&host, device(0x02)).await;

    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let host = Arc::clone(&host);
        tasks.push(tokio::spawn(async move {
            let ticket = host
                .tx_async(handle, bytes::Bytes::copy_from_slice(&[i]))
                .await?;
            let completion = ticket.wait().await?;
            assert!(completion.outcome.is_complete());
            host.status(handle).await.map(|_| ())
        }));
    }
    for task in futures::future::join_all(tasks).await {
        task.unwrap().unwrap();
    }

    assert_eq!(adapter.count("submit_tx"), 8);
}
