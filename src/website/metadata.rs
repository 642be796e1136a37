//! Website metadata: HTTP headers and last update time

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, instrument};

use super::DATASTORE_BATCH_SIZE;
use crate::cache::Headers;
use crate::error::{Error, Result};
use crate::store::keys::{self, HTTP_HEADER_PREFIX, LAST_UPDATE_KEY};
use crate::store::RemoteStore;

/// HTTP headers for `path`: website-wide headers overridden by file headers
#[instrument(skip(store))]
pub async fn http_headers(store: &dyn RemoteStore, address: &str, path: &str) -> Result<Headers> {
    let global_prefix = keys::global_metadata_key(HTTP_HEADER_PREFIX.as_bytes());
    let file_prefix = keys::file_metadata_key(path, HTTP_HEADER_PREFIX.as_bytes());

    let all_keys = store.datastore_keys(address).await?;
    let (file_keys, global_keys): (Vec<Vec<u8>>, Vec<Vec<u8>>) = all_keys
        .into_iter()
        .filter(|key| key.starts_with(&global_prefix) || key.starts_with(&file_prefix))
        .partition(|key| key.starts_with(&file_prefix));

    let mut headers = Headers::new();
    // Global first so file headers overwrite them
    for (header_keys, prefix) in [(global_keys, &global_prefix), (file_keys, &file_prefix)] {
        for batch in header_keys.chunks(DATASTORE_BATCH_SIZE) {
            let values = store.datastore_entries(address, batch).await?;
            if values.len() != batch.len() {
                return Err(Error::Corrupt(format!(
                    "expected {} header entries, got {}",
                    batch.len(),
                    values.len()
                )));
            }
            for (key, value) in batch.iter().zip(values) {
                let Some(value) = value else { continue };
                let name = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
                headers.insert(name, String::from_utf8_lossy(&value).into_owned());
            }
        }
    }

    debug!(headers = headers.len(), "Read HTTP headers");
    Ok(headers)
}

/// Time of the website's last deploy
#[instrument(skip(store))]
pub async fn last_update_timestamp(store: &dyn RemoteStore, address: &str) -> Result<DateTime<Utc>> {
    let value = store
        .datastore_entry(address, &keys::global_metadata_key(LAST_UPDATE_KEY.as_bytes()))
        .await?
        .ok_or_else(|| Error::NotFound(format!("last update timestamp of {}", address)))?;

    let text = std::str::from_utf8(&value)
        .map_err(|_| Error::Corrupt("last update timestamp is not utf-8".into()))?;
    let seconds: u64 = text
        .trim()
        .parse()
        .map_err(|_| Error::Corrupt(format!("invalid last update timestamp '{}'", text)))?;

    i64::try_from(seconds)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| Error::Corrupt(format!("last update timestamp {} out of range", seconds)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_file_headers_override_global() {
        let store = InMemoryStore::new();
        store.upload("AS1", "index.html", b"<html>", 100);
        store.set_global_header("AS1", "Cache-Control", "max-age=60");
        store.set_global_header("AS1", "X-Site", "demo");
        store.set_file_header("AS1", "index.html", "Cache-Control", "no-cache");
        store.set_file_header("AS1", "other.html", "X-Other", "ignored");
        store.set_global_metadata("AS1", "title", "not a header");

        let headers = http_headers(&store, "AS1", "index.html").await.unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["Cache-Control"], "no-cache");
        assert_eq!(headers["X-Site"], "demo");
    }

    #[tokio::test]
    async fn test_no_headers() {
        let store = InMemoryStore::new();
        store.upload("AS1", "a.txt", b"x", 10);
        let headers = http_headers(&store, "AS1", "a.txt").await.unwrap();
        assert!(headers.is_empty());
    }

    #[tokio::test]
    async fn test_short_header_batch_is_corrupt() {
        let store = InMemoryStore::new();
        store.set_global_header("AS1", "Cache-Control", "max-age=60");
        store.set_global_header("AS1", "X-Site", "demo");
        store.set_short_batches(true);

        let err = http_headers(&store, "AS1", "index.html").await.unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_last_update_timestamp() {
        let store = InMemoryStore::new();
        store.set_last_update("AS1", 1_700_000_000);
        let ts = last_update_timestamp(&store, "AS1").await.unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_last_update_missing_or_malformed() {
        let store = InMemoryStore::new();
        let err = last_update_timestamp(&store, "AS1").await.unwrap_err();
        assert!(err.is_not_found());

        store.set_global_metadata("AS1", LAST_UPDATE_KEY, "yesterday");
        let err = last_update_timestamp(&store, "AS1").await.unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }
}
