use scopelab::core::{ChannelRegistry, SharedRegistry};
use scopelab::engine::{AcquisitionRuntime, ProcessorPipeline, RuntimeStatus};
use scopelab::hal::{AcquisitionSource, ScopeSimulationConfig, SimulatedScope};
use serde_json::json;

fn runtime(max_acquisitions: Option<u64>, interval_ms: u64) -> (SharedRegistry, AcquisitionRuntime) {
    let registry = ChannelRegistry::default().into_shared();
    let pipeline = ProcessorPipeline::from_json(registry.clone(), json!({})).unwrap();
    let scope = SimulatedScope::with_config(
        registry.clone(),
        ScopeSimulationConfig {
            max_acquisitions,
            interval_ms,
            ..Default::default()
        },
    );
    (registry, AcquisitionRuntime::new(Box::new(scope), pipeline))
}

#[tokio::test]
async fn test_runs_until_source_is_exhausted() {
    let (_registry, mut runtime) = runtime(Some(3), 0);
    runtime.start().await.unwrap();
    assert_eq!(runtime.status(), RuntimeStatus::Running);

    let published = runtime.join().await.unwrap();
    assert_eq!(published, 3);
    assert_eq!(runtime.status(), RuntimeStatus::Stopped);

    let current = runtime.published().get().unwrap();
    assert_eq!(current.update_timestamp(), 3);

    let pipeline = runtime.pipeline();
    let pipeline = pipeline.lock().await;
    assert_eq!(pipeline.state().acquisitions_processed(), 3);
    assert!(pipeline.ets_status().unwrap().effective());
    drop(pipeline);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_endless_source() {
    let (_registry, mut runtime) = runtime(None, 5);
    runtime.start().await.unwrap();
    assert!(runtime.start().await.is_err());

    tokio::time::sleep(tokio::time::Duration::from_millis(30)).await;
    runtime.shutdown().await.unwrap();
    assert_eq!(runtime.status(), RuntimeStatus::Stopped);

    let seen = runtime.published().get().map(|c| c.update_timestamp()).unwrap_or(0);
    tokio::time::sleep(tokio::time::Duration::from_millis(30)).await;
    let later = runtime.published().get().map(|c| c.update_timestamp()).unwrap_or(0);
    assert_eq!(seen, later);
}

#[tokio::test]
async fn test_restart_after_join() {
    let (_registry, mut runtime) = runtime(Some(2), 0);
    runtime.start().await.unwrap();
    assert_eq!(runtime.join().await.unwrap(), 2);

    // The source stays exhausted, so the second run publishes nothing
    runtime.start().await.unwrap();
    assert_eq!(runtime.join().await.unwrap(), 0);
    assert_eq!(runtime.join().await.unwrap(), 0);
}

#[test]
fn test_source_rejects_reconfigure_after_open() {
    let registry = ChannelRegistry::default().into_shared();
    let mut scope = SimulatedScope::new(registry);
    tokio_test::block_on(async {
        scope.open().await.unwrap();
        assert!(scope.configure(json!({ "interval_ms": 1 })).await.is_err());
    });
}
