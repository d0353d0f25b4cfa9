use super::kv_store::{KVStoreHandle, SetOutcome};
use crate::common::{
    codec::{decode_request, Request},
    resp3::RESP3Value,
};
use anyhow::Result;
use std::time::Duration;

/// Validate a request frame and execute it. Validation failures become error
/// replies; only a store that is no longer running yields `Err`.
pub async fn process(kv_store: &KVStoreHandle, frame: RESP3Value) -> Result<RESP3Value> {
    match decode_request(frame) {
        Ok(request) => {
            log::debug!("{}", request);
            execute(kv_store, request).await
        }
        Err(err) => {
            log::debug!("Rejected request: {}", err);
            Ok(RESP3Value::SimpleError(err.to_string()))
        }
    }
}

pub async fn execute(kv_store: &KVStoreHandle, request: Request) -> Result<RESP3Value> {
    let response = match request {
        Request::Ping(None) => RESP3Value::SimpleString("PONG".to_string()),
        Request::Ping(Some(message)) => RESP3Value::BulkString(message.to_vec()),
        Request::Set {
            key,
            value,
            options,
        } => match kv_store.set(key, value, options).await? {
            SetOutcome::Stored => RESP3Value::ok(),
            SetOutcome::NotSet => RESP3Value::Null,
        },
        Request::Get(key) => kv_store
            .get(key)
            .await?
            .map_or(RESP3Value::Null, |value| RESP3Value::BulkString(value.to_vec())),
        Request::Del(keys) => RESP3Value::Integer(kv_store.del(keys).await? as i64),
        Request::Sleep(seconds) => {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            RESP3Value::ok()
        }
        Request::DbSize => RESP3Value::Integer(kv_store.dbsize().await? as i64),
    };

    Ok(response)
}
