use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::client::FetchClient;
use crate::error::AppError;
use crate::http::{HttpResponse, RequestOptions};
use crate::traits::Transport;

/// [`FetchClient`] with a cap on requests in flight.
///
/// Each request holds one permit from start to finish: throttle waits,
/// retries and backoff included. Batch helpers return outcomes in input order
/// and never let one failure cancel the rest.
pub struct ConcurrentFetchClient<T> {
    inner: FetchClient<T>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl<T> Clone for ConcurrentFetchClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            semaphore: Arc::clone(&self.semaphore),
            max_concurrent: self.max_concurrent,
        }
    }
}

impl<T: Transport> ConcurrentFetchClient<T> {
    pub fn new(inner: FetchClient<T>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            inner,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn inner(&self) -> &FetchClient<T> {
        &self.inner
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Permits currently held by running requests.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.semaphore.available_permits())
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, AppError> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| AppError::ClientClosed)
    }

    pub async fn get(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse, AppError> {
        let _permit = self.permit().await?;
        self.inner.get(url, options).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        options: &RequestOptions,
    ) -> Result<HttpResponse, AppError> {
        let _permit = self.permit().await?;
        self.inner.post(url, body, options).await
    }

    pub async fn graphql(
        &self,
        url: &str,
        query: &str,
        variables: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, AppError> {
        let _permit = self.permit().await?;
        self.inner.graphql(url, query, variables).await
    }

    /// GETs every URL concurrently under the shared limit.
    pub async fn gather_get(
        &self,
        urls: &[String],
        options: &RequestOptions,
    ) -> Vec<Result<HttpResponse, AppError>> {
        tracing::debug!(
            count = urls.len(),
            max_concurrent = self.max_concurrent,
            "Gathering GET batch"
        );
        join_all(urls.iter().map(|url| self.get(url, options))).await
    }

    /// POSTs prepared GraphQL payloads (`{query, variables}`) concurrently.
    pub async fn graphql_batch(
        &self,
        url: &str,
        payloads: &[serde_json::Value],
    ) -> Vec<Result<HttpResponse, AppError>> {
        let options = RequestOptions::default();
        join_all(
            payloads
                .iter()
                .map(|payload| self.post(url, payload, &options)),
        )
        .await
    }

    pub async fn warm_session(&self, base_url: &str) -> bool {
        self.inner.warm_session(base_url).await
    }

    pub async fn rotate_session(&self) {
        self.inner.rotate_session().await;
    }

    /// Closes the pool, then the session. Waiting and later requests fail
    /// with `ClientClosed`.
    pub async fn close(&self) {
        self.semaphore.close();
        self.inner.close().await;
    }
}
