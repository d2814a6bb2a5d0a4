//! Shared helpers for the Redis-backed stores.
use std::sync::Arc;

use redis::{aio::ConnectionManager, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info, warn};

use crate::models::RepositoryError;

pub trait RedisRepository {
    fn serialize_entity<T: Serialize>(
        &self,
        entity: &T,
        entity_id: &str,
        entity_type: &str,
    ) -> Result<String, RepositoryError> {
        serde_json::to_string(entity).map_err(|e| {
            error!(entity_type = %entity_type, id = %entity_id, error = %e, "serialization failed");
            RepositoryError::InvalidData(format!(
                "Failed to serialize {entity_type} {entity_id}: {e}"
            ))
        })
    }

    fn deserialize_entity<T: DeserializeOwned>(
        &self,
        json: &str,
        entity_id: &str,
        entity_type: &str,
    ) -> Result<T, RepositoryError> {
        serde_json::from_str(json).map_err(|e| {
            error!(entity_type = %entity_type, entity_id = %entity_id, error = %e, "deserialization failed");
            RepositoryError::InvalidData(format!(
                "Failed to deserialize {} {}: {} (JSON length: {})",
                entity_type,
                entity_id,
                e,
                json.len()
            ))
        })
    }

    fn map_redis_error(&self, error: RedisError, context: &str) -> RepositoryError {
        map_redis_error(error, context)
    }
}

pub fn map_redis_error(error: RedisError, context: &str) -> RepositoryError {
    warn!(context = %context, error = %error, "redis operation failed");

    match error.kind() {
        redis::ErrorKind::IoError => RepositoryError::ConnectionError(format!(
            "Redis connection error in operation '{context}': {error}"
        )),
        redis::ErrorKind::AuthenticationFailed => {
            RepositoryError::PermissionDenied("Redis authentication failed".to_string())
        }
        redis::ErrorKind::TypeError => RepositoryError::InvalidData(format!(
            "Redis data type error in operation '{context}': {error}"
        )),
        redis::ErrorKind::ExecAbortError => RepositoryError::TransactionFailure(format!(
            "Redis transaction aborted in operation '{context}': {error}"
        )),
        _ => RepositoryError::Other(format!("Redis operation '{context}' failed: {error}")),
    }
}

/// Opens a managed, auto-reconnecting connection to Redis.
pub async fn initialize_redis_connection(
    redis_url: &str,
) -> Result<Arc<ConnectionManager>, RepositoryError> {
    let client = redis::Client::open(redis_url)
        .map_err(|e| map_redis_error(e, "open_client"))?;
    let manager = ConnectionManager::new(client)
        .await
        .map_err(|e| map_redis_error(e, "connect"))?;
    info!("redis connection established");
    Ok(Arc::new(manager))
}

pub fn validate_key_prefix(key_prefix: &str) -> Result<(), RepositoryError> {
    if key_prefix.is_empty() {
        return Err(RepositoryError::InvalidData(
            "Redis key prefix cannot be empty".to_string(),
        ));
    }
    Ok(())
}
