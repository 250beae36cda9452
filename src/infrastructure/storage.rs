use crate::config::{PipelineConfig, StorageBackend};
use crate::services::object_store::{MemoryObjectStore, ObjectStore, S3ObjectStore};
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn setup_object_store(config: &PipelineConfig) -> Arc<dyn ObjectStore> {
    match config.storage_backend {
        StorageBackend::Memory => {
            warn!(
                "🧪 In-memory object store (Bucket: {}); artifacts are lost on restart",
                config.s3_bucket
            );
            Arc::new(MemoryObjectStore::new(
                config.s3_bucket.clone(),
                config.max_presign_expiry(),
            ))
        }
        StorageBackend::S3 => {
            info!(
                "☁️  S3 Storage: {} (Bucket: {})",
                config.s3_endpoint.as_deref().unwrap_or("aws"),
                config.s3_bucket
            );

            // Credentials come from the default provider chain.
            let mut loader = aws_config::from_env().region(Region::new(config.s3_region.clone()));
            if let Some(endpoint) = &config.s3_endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            let aws_config = loader.load().await;

            let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.s3_endpoint.is_some())
                .build();

            let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

            match s3_client.head_bucket().bucket(&config.s3_bucket).send().await {
                Ok(_) => info!("✅ Bucket '{}' is ready", config.s3_bucket),
                Err(e) => warn!(
                    "⚠️  Bucket '{}' is not reachable yet: {}",
                    config.s3_bucket,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ),
            }

            Arc::new(S3ObjectStore::new(
                s3_client,
                config.s3_bucket.clone(),
                config.chunk_size,
                config.max_presign_expiry(),
            ))
        }
    }
}
