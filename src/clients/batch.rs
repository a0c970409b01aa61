//! Bounded concurrent execution of independent requests.
//!
//! Sync workflows often issue many independent calls (one stock update per
//! item, one detail lookup per order). [`BatchRunner`] fans them out over at
//! most `max_concurrency` tasks; the client's rate limiter still applies to
//! every call.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clients::errors::ClientError;
use crate::clients::http_request::Request;
use crate::clients::http_response::Response;
use crate::clients::marketplace::MarketplaceClient;

/// Default number of requests in flight at once.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Runs requests concurrently against one client.
///
/// # Example
///
/// ```rust,ignore
/// use marketplace_api::clients::BatchRunner;
///
/// let runner = BatchRunner::new(client.clone(), 8);
/// let results = runner.run(&cancel, requests).await;
/// for result in results {
///     match result {
///         Ok(response) => println!("{}", response.body),
///         Err(e) => eprintln!("{e}"),
///     }
/// }
/// ```
#[derive(Clone)]
pub struct BatchRunner {
    client: Arc<dyn MarketplaceClient>,
    max_concurrency: usize,
}

impl BatchRunner {
    /// Creates a runner. A `max_concurrency` of zero is treated as one.
    #[must_use]
    pub fn new(client: Arc<dyn MarketplaceClient>, max_concurrency: usize) -> Self {
        Self {
            client,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Returns the concurrency bound.
    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Executes every request and returns one result per request, in input
    /// order.
    ///
    /// Requests not yet started when `cancel` fires report
    /// [`ClientError::Cancelled`]; requests in flight observe the same token.
    ///
    /// # Panics
    ///
    /// Propagates a panic raised inside a client's `execute`.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        requests: Vec<Request>,
    ) -> Vec<Result<Response, ClientError>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles: Vec<Option<JoinHandle<Result<Response, ClientError>>>> =
            Vec::with_capacity(requests.len());

        for request in requests {
            let acquired = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = acquired else {
                handles.push(None);
                continue;
            };

            let client = Arc::clone(&self.client);
            let cancel = cancel.clone();
            handles.push(Some(tokio::spawn(async move {
                let _permit = permit;
                client.execute(&cancel, &request).await
            })));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = match handle {
                None => Err(ClientError::Cancelled),
                Some(handle) => match handle.await {
                    Ok(result) => result,
                    Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
                    Err(_) => Err(ClientError::Cancelled),
                },
            };
            results.push(result);
        }

        tracing::debug!(
            platform = self.client.platform(),
            requests = results.len(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "batch finished"
        );
        results
    }
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("platform", &self.client.platform())
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}
