use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{de::DeserializeOwned, Serialize};

use crate::db::{
    helpers::{parse_datetime, to_sql_error},
    Database,
};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

fn row_to_item(row: &Row) -> Result<StoredItem, rusqlite::Error> {
    let updated_at: String = row.get("updated_at")?;
    Ok(StoredItem {
        key: row.get("key")?,
        value: row.get("value")?,
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(to_sql_error)?,
    })
}

impl Database {
    pub async fn get_item(&self, key: &str) -> Result<Option<StoredItem>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value, updated_at
                 FROM local_storage
                 WHERE key = ?1",
            )?;

            let item = stmt.query_row(params![key], row_to_item).optional()?;
            Ok(item)
        })
        .await
    }

    pub async fn set_item(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        let updated_at = Utc::now().to_rfc3339();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO local_storage (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, updated_at],
            )
            .with_context(|| format!("failed to store item '{key}'"))?;
            Ok(())
        })
        .await
    }

    pub async fn remove_item(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM local_storage WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    /// Decodes the JSON stored under `key`; `Ok(None)` when the key is absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_item(key).await? {
            Some(item) => serde_json::from_str(&item.value)
                .map(Some)
                .with_context(|| format!("stored value for '{key}' is not valid JSON")),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_string(value)
            .with_context(|| format!("failed to encode value for '{key}'"))?;
        self.set_item(key, encoded).await
    }
}
