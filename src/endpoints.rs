//! Typed calls on top of [`Client`].

use reqwest::StatusCode;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::error::Result;
use crate::http::ApiResponse;
use crate::types::{QueryObject, UpsertObject};

const UPSERTS_PATH: &str = "upserts";
const QUERY_PATH: &str = "query";

impl Client {
    /// Push a collection of items. True when the API accepted them (201).
    pub async fn upsert(&self, object: &UpsertObject) -> Result<bool> {
        self.upsert_with_cancel(object, &CancellationToken::new())
            .await
    }

    pub async fn upsert_with_cancel(
        &self,
        object: &UpsertObject,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let body = serde_json::to_vec(object)?;
        let resp = self
            .request_with_cancel(reqwest::Method::POST, UPSERTS_PATH, Some(body), cancel)
            .await?;
        Ok(has_status(&resp, StatusCode::CREATED))
    }

    /// Run a query. `None` when the API rejected it or answered with
    /// anything but 201.
    pub async fn query(&self, object: &QueryObject) -> Result<Option<Value>> {
        self.query_with_cancel(object, &CancellationToken::new())
            .await
    }

    pub async fn query_with_cancel(
        &self,
        object: &QueryObject,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>> {
        let body = serde_json::to_vec(object)?;
        let resp = self
            .request_with_cancel(reqwest::Method::POST, QUERY_PATH, Some(body), cancel)
            .await?;
        match resp {
            Some(r) if r.status == StatusCode::CREATED => Ok(Some(
                r.json::<Value>()
                    .ok()
                    .filter(|v| !v.is_null())
                    .unwrap_or_else(|| Value::Object(Default::default())),
            )),
            _ => Ok(None),
        }
    }

    pub async fn list_upserts(&self) -> Result<Vec<Value>> {
        self.list_upserts_with_cancel(&CancellationToken::new())
            .await
    }

    pub async fn list_upserts_with_cancel(&self, cancel: &CancellationToken) -> Result<Vec<Value>> {
        let resp = self
            .request_with_cancel(reqwest::Method::GET, UPSERTS_PATH, None, cancel)
            .await?;
        match resp {
            Some(r) if r.status == StatusCode::OK => Ok(data_field(&r)
                .and_then(|d| d.as_array().cloned())
                .unwrap_or_default()),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn fetch_upsert(&self, id: &str) -> Result<Option<Value>> {
        self.fetch_upsert_with_cancel(id, &CancellationToken::new())
            .await
    }

    pub async fn fetch_upsert_with_cancel(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>> {
        let path = format!("{}/{}", UPSERTS_PATH, urlencoding::encode(id));
        let resp = self
            .request_with_cancel(reqwest::Method::GET, &path, None, cancel)
            .await?;
        match resp {
            Some(r) if r.status == StatusCode::OK => Ok(data_field(&r).filter(|d| !d.is_null())),
            _ => Ok(None),
        }
    }
}

fn has_status(resp: &Option<ApiResponse>, status: StatusCode) -> bool {
    resp.as_ref().is_some_and(|r| r.status == status)
}

fn data_field(resp: &ApiResponse) -> Option<Value> {
    resp.json::<Value>().ok()?.get_mut("data").map(Value::take)
}
