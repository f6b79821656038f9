//! Browsing core of the gateway: where to start reading, how to cut one
//! display page out of many partitions, and the facade tying both to the
//! admin side of the cluster.

pub mod facade;
pub mod fetcher;
mod merge;
pub mod resolver;
pub mod settings;

use std::future::Future;
use std::time::Duration;

use broker_api::GatewayError;

pub use facade::BrowsingService;
pub use fetcher::PageFetcher;
pub use resolver::OffsetResolver;
pub use settings::BrowseSettings;

/// Run one broker call under a deadline. Elapsed → `BrokerUnavailable`.
pub(crate) async fn bounded<T, F>(what: &str, limit: Duration, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::timed_out(what, limit)),
    }
}
