//! HTTP dispatcher for the remote event store.
//!
//! Sends one operation batch per run to the store's reconciliation endpoint
//! and returns its per-operation acknowledgments. Authentication is a
//! pre-shared bearer key supplied through the run environment.

use gridcal_core::dispatch::{DispatchAck, DispatchBatch, Dispatcher};
use gridcal_core::error::{GridCalError, GridCalResult};
use log::debug;

pub struct HttpDispatcher {
    client: reqwest::Client,
    url: String,
    key: String,
}

impl HttpDispatcher {
    pub fn new(api_url: &str, key: String) -> Self {
        HttpDispatcher {
            client: reqwest::Client::new(),
            url: format!("{}/schedule/operations", api_url.trim_end_matches('/')),
            key,
        }
    }
}

impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, batch: &DispatchBatch) -> GridCalResult<Vec<DispatchAck>> {
        debug!(
            "POST {} ({} operations, token {})",
            self.url,
            batch.operations.len(),
            batch.token
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.key)
            .json(batch)
            .send()
            .await
            .map_err(|e| GridCalError::Dispatch(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GridCalError::Dispatch(format!(
                "remote store returned {status}: {body}"
            )));
        }

        response
            .json::<Vec<DispatchAck>>()
            .await
            .map_err(|e| GridCalError::Dispatch(format!("invalid acknowledgment payload: {e}")))
    }
}
