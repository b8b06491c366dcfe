//! The rookery GraphQL engine.
//!
//! Resolves graph-shaped queries over the relational [`rookery_storage`]
//! collaborator. Relation fields never fetch on their own: they submit keys
//! to per-edge batch loaders owned by a request-scoped cache, so sibling
//! resolutions of one edge coalesce into a single bulk fetch and resolved
//! keys are served from memory for the rest of the request.

mod edges;
mod executor;
mod loaders;
mod parse;
mod request;
mod resolvers;
mod response;
mod schema;
mod validation;

pub use edges::RelationEdge;
pub use request::{Request, Variables};
pub use response::{Location, PathSegment, Response, ServerError};
pub use schema::Schema;
pub use validation::OperationLimits;
