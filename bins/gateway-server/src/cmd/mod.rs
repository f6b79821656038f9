pub mod serve;
pub mod topics;

use std::sync::Arc;

use browse_engine::BrowsingService;
use cluster_kafka::KafkaCluster;
use cluster_memory::MemoryCluster;

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Wire the configured cluster backend into a browsing service.
pub fn build_service(config: &ServerConfig) -> Result<Arc<BrowsingService>, ServerError> {
    let config_json = config.cluster.config_json()?;
    let settings = config.browse.clone();

    let service = match config.cluster.backend.as_str() {
        "memory" => {
            let cluster = Arc::new(MemoryCluster::from_config_json(&config_json)?);
            BrowsingService::new(cluster.clone(), cluster.clone(), cluster, settings)
        }
        "kafka" => {
            let cluster = Arc::new(KafkaCluster::from_config_json(&config_json)?);
            BrowsingService::new(cluster.clone(), cluster.clone(), cluster, settings)
        }
        other => return Err(ServerError::UnknownBackend(other.to_string())),
    };
    tracing::info!(backend = %config.cluster.backend, "cluster backend ready");
    Ok(Arc::new(service))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_serves_configured_topics() {
        let config = ServerConfig::parse(
            r#"
[cluster]
backend = "memory"

[[cluster.config.topics]]
name = "orders"
partitions = 2
replication_factor = 1
"#,
        )
        .unwrap();
        let service = build_service(&config).unwrap();
        let topics = service.get_topics().await.unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].name, "orders");
        assert_eq!(service.get_partitions("orders").await.unwrap(), vec![0, 1]);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let config = ServerConfig::parse("[cluster]\nbackend = \"pulsar\"").unwrap();
        assert!(matches!(
            build_service(&config),
            Err(ServerError::UnknownBackend(name)) if name == "pulsar"
        ));
    }
}
