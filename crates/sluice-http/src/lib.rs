//! HTTP fetching for Sluice.
//!
//! A blocking reqwest transport wrapped in a bounded retry policy, and the
//! pipeline step that persists the fetched body.

mod fetch;
mod retry;
mod transport;

pub use fetch::{FETCH_STEP, FetchStep, RAW_ARTIFACT, register};
pub use retry::{FetchError, Fetcher, RetryPolicy};
pub use transport::{HttpTransport, Transport, TransportError, TransportErrorKind};
