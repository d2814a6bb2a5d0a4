//! Redis-backed channel account store.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use super::ChannelAccountStore;
use crate::{
    models::{ChannelAccount, RepositoryError},
    repositories::redis_base::{validate_key_prefix, RedisRepository},
};

const CHANNEL_ACCOUNT_PREFIX: &str = "channel_account";
const CHANNEL_ACCOUNT_LIST_KEY: &str = "channel_account_list";

#[derive(Clone)]
pub struct RedisChannelAccountStore {
    pub client: Arc<ConnectionManager>,
    pub key_prefix: String,
}

impl RedisRepository for RedisChannelAccountStore {}

impl fmt::Debug for RedisChannelAccountStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisChannelAccountStore")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisChannelAccountStore {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        key_prefix: String,
    ) -> Result<Self, RepositoryError> {
        validate_key_prefix(&key_prefix)?;
        Ok(Self {
            client: connection_manager,
            key_prefix,
        })
    }

    fn account_key(&self, public_key: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, CHANNEL_ACCOUNT_PREFIX, public_key)
    }

    fn account_list_key(&self) -> String {
        format!("{}:{}", self.key_prefix, CHANNEL_ACCOUNT_LIST_KEY)
    }

    pub(crate) async fn store_all(&self, accounts: &[ChannelAccount]) -> Result<(), RepositoryError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for account in accounts {
            let json = self.serialize_entity(account, &account.public_key, "channel account")?;
            pipe.set(self.account_key(&account.public_key), json).ignore();
        }

        let mut conn = self.client.as_ref().clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| self.map_redis_error(e, "store_channel_accounts"))
    }

    async fn update<F>(&self, public_key: &str, apply: F) -> Result<ChannelAccount, RepositoryError>
    where
        F: FnOnce(&mut ChannelAccount) -> Result<(), RepositoryError> + Send,
    {
        let mut account = self.get(public_key).await?;
        apply(&mut account)?;
        self.store_all(std::slice::from_ref(&account)).await?;
        Ok(account)
    }
}

#[async_trait]
impl ChannelAccountStore for RedisChannelAccountStore {
    async fn insert(&self, account: ChannelAccount) -> Result<ChannelAccount, RepositoryError> {
        let json = self.serialize_entity(&account, &account.public_key, "channel account")?;
        let mut conn = self.client.as_ref().clone();

        let created: bool = conn
            .set_nx(self.account_key(&account.public_key), json)
            .await
            .map_err(|e| self.map_redis_error(e, "insert_channel_account"))?;
        if !created {
            return Err(RepositoryError::ConstraintViolation(format!(
                "channel account {} already exists",
                account.public_key
            )));
        }

        let _: () = conn
            .sadd(self.account_list_key(), &account.public_key)
            .await
            .map_err(|e| self.map_redis_error(e, "index_channel_account"))?;
        Ok(account)
    }

    async fn get(&self, public_key: &str) -> Result<ChannelAccount, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let json: Option<String> = conn
            .get(self.account_key(public_key))
            .await
            .map_err(|e| self.map_redis_error(e, "get_channel_account"))?;

        match json {
            Some(json) => self.deserialize_entity(&json, public_key, "channel account"),
            None => Err(RepositoryError::NotFound(format!(
                "channel account {public_key} not found"
            ))),
        }
    }

    async fn get_all(&self) -> Result<Vec<ChannelAccount>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let keys: Vec<String> = conn
            .smembers(self.account_list_key())
            .await
            .map_err(|e| self.map_redis_error(e, "list_channel_accounts"))?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let redis_keys: Vec<String> = keys.iter().map(|key| self.account_key(key)).collect();
        let values: Vec<Option<String>> = conn
            .mget(&redis_keys)
            .await
            .map_err(|e| self.map_redis_error(e, "mget_channel_accounts"))?;

        let mut accounts = Vec::with_capacity(values.len());
        for (key, json) in keys.iter().zip(values) {
            if let Some(json) = json {
                accounts.push(self.deserialize_entity::<ChannelAccount>(
                    &json,
                    key,
                    "channel account",
                )?);
            }
        }
        accounts.sort_by_key(|account| account.created_at);
        Ok(accounts)
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        conn.scard(self.account_list_key())
            .await
            .map_err(|e| self.map_redis_error(e, "count_channel_accounts"))
    }

    async fn delete(&self, public_key: &str) -> Result<(), RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let (deleted, _): (u64, u64) = redis::pipe()
            .atomic()
            .del(self.account_key(public_key))
            .srem(self.account_list_key(), public_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.map_redis_error(e, "delete_channel_account"))?;

        if deleted == 0 {
            return Err(RepositoryError::NotFound(format!(
                "channel account {public_key} not found"
            )));
        }
        Ok(())
    }

    async fn lock(
        &self,
        public_key: &str,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
    ) -> Result<ChannelAccount, RepositoryError> {
        self.update(public_key, |account| {
            account.apply_lock(current_ledger_number, lock_to_ledger_number)
        })
        .await
    }

    async fn unlock(&self, public_key: &str) -> Result<ChannelAccount, RepositoryError> {
        self.update(public_key, |account| {
            account.apply_unlock();
            Ok(())
        })
        .await
    }
}
