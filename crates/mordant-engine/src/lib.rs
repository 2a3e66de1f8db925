//! Mordant Provisioning Engine
//!
//! Turns a set of asset requirements (usually the output of
//! `mordant_scanner::Scanner::scan`) into local file paths.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Provisioner                          │
//! │  - provision(requirements, concurrency, cancel)             │
//! │  - bounded pool, one pipeline per requirement               │
//! └─────────────────────────────────────────────────────────────┘
//!        │ validate         │ lookup / ticket        │ open
//!        ▼                  ▼                        ▼
//! ┌──────────────┐  ┌────────────────────┐  ┌─────────────────┐
//! │   Registry   │  │     CacheStore     │  │     Fetcher     │
//! │ trust check  │  │ single-flight,     │  │ byte stream +   │
//! │              │  │ atomic commit      │  │ advertised size │
//! └──────────────┘  └────────────────────┘  └─────────────────┘
//!                               │
//!                               ▼
//!                 assemble → ResolvedSet | FailureReport
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use mordant_engine::{Provisioner, RemoteLayout, TracingNotifier};
//! use tokio_util::sync::CancellationToken;
//!
//! let provisioner = Provisioner::new(registry, cache, fetcher, RemoteLayout::default())
//!   .with_notifier(TracingNotifier);
//!
//! let resolved = provisioner
//!   .provision(requirements.as_slice(), 4, CancellationToken::new())
//!   .await?;
//! ```

mod clock;
mod error;
mod events;
mod layout;
mod outcome;
mod provisioner;
mod retry;

pub use clock::{Clock, TokioClock};
pub use error::{AssetFailure, FailureReport, ProvisionError};
pub use events::{ChannelNotifier, NoopNotifier, ProvisionEvent, ProvisionNotifier, TracingNotifier};
pub use layout::RemoteLayout;
pub use outcome::{RequirementOutcome, ResolvedSet, assemble};
pub use provisioner::{Provisioner, ProvisionerConfig};
pub use retry::{RetryPolicy, RetryStep};
