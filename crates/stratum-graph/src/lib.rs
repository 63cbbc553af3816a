//! # stratum-graph
//!
//! Microsoft Graph access for the Stratum portal.
//!
//! - [`client`] - bearer-authorized Graph HTTP client and the [`GraphApi`] seam
//! - [`facade`] - concurrent fetch of profile, organization and secure score
//! - [`profile`] - the aggregated document returned to the dashboard
//! - [`models`] - Graph wire types
//!
//! # Example
//!
//! ```ignore
//! let client = GraphClient::new(&config)?;
//! let facade = AggregationFacade::new(Arc::new(client), config.optional_timeout);
//! let profile = facade.fetch(&access_token).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod facade;
pub mod models;
pub mod profile;

pub use client::{GraphApi, GraphClient};
pub use config::GraphConfig;
pub use error::{Criticality, GraphCall, GraphError};
pub use facade::AggregationFacade;
pub use profile::{AggregatedProfile, Identity, OrganizationSummary, SecurityScore};

/// Result type for Graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
