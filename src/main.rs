use log::info;
use scopelab::config::ProcessingConfig;
use scopelab::core::channel::read_registry;
use scopelab::core::{ChannelDataSource, ChannelRegistry};
use scopelab::engine::{AcquisitionRuntime, ProcessorPipeline};
use scopelab::hal::{ScopeSimulationConfig, SimulatedScope};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ProcessingConfig::load(&path).await?,
        None => ProcessingConfig::from_json(serde_json::json!({
            "fft": { "channels": ["A"] },
            "math": { "a": "A", "b": "B", "operation": "add" },
            "decoders": [{ "id": "i2c" }]
        }))?,
    };

    let registry = ChannelRegistry::default().into_shared();
    let pipeline = ProcessorPipeline::from_config(registry.clone(), &config)?;
    let ets = pipeline.ets_status();
    let metrics = pipeline.metrics().clone();

    let scope = SimulatedScope::with_config(
        registry.clone(),
        ScopeSimulationConfig {
            max_acquisitions: Some(8),
            interval_ms: 20,
            ..Default::default()
        },
    );
    let mut runtime = AcquisitionRuntime::new(Box::new(scope), pipeline);
    runtime.start().await?;
    let published = runtime.join().await?;
    info!("Published {} collections", published);

    if let Some(ets) = ets {
        info!(
            "ETS candidate={} effective={} boost={} rate={:.3e} S/s",
            ets.candidate(),
            ets.effective(),
            ets.boost(),
            ets.equivalent_sampling_rate()
        );
    }

    if let Some(collection) = runtime.published().get() {
        info!("Trigger adjustment {:.3e} s", collection.trigger_adjustment());
        let registry = read_registry(&registry);
        for (id, channel) in registry.iter() {
            if let Some(data) = collection.get_best_data(id) {
                info!("{:<8} {:?} {} elements", channel.name, data.element_type(), data.len());
            }
            if let Some(ets) = collection.get_data(ChannelDataSource::EtsVoltages, id) {
                info!("{:<8} ETS {} samples", channel.name, ets.len());
            }
            if let Some(events) = collection
                .get_best_data(id)
                .and_then(|d| d.array.as_events().map(|e| e.to_vec()))
            {
                for event in events {
                    info!("{:<8} [{}..{}] {}", channel.name, event.start, event.end, event.label);
                }
            }
        }
    }

    for (key, snapshot) in metrics.snapshot() {
        info!(
            "{:<16} passes={} failures={} avg={}us",
            key, snapshot.passes, snapshot.failures, snapshot.avg_latency_us
        );
    }

    runtime.shutdown().await?;
    Ok(())
}
