//! Service layer: API client, traversal, normalization, catalog load

pub mod catalog;
pub mod normalizer;
pub mod resonite_client;
pub mod traversal;

pub use catalog::CatalogWriter;
pub use normalizer::Normalizer;
pub use resonite_client::{RecordSource, ResoniteClient};
pub use traversal::TraversalEngine;
