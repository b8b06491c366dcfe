//! The relational storage collaborator behind the rookery engine.
//!
//! [`Store`] is the seam a persistence backend implements: bulk reads keyed
//! by id sets or foreign-key value sets, the subscription association table,
//! and the write operations the mutation layer needs. [`MemoryStore`] is the
//! in-process implementation used by the server and the test suites.

mod entities;
mod error;
mod memory;
mod seed;
mod store;

pub use entities::{
    InvalidMemberTypeId, MemberType, MemberTypeId, NewPost, NewProfile, NewUser, Post, PostPatch, Profile,
    ProfilePatch, Subscription, User, UserPatch,
};
pub use error::StorageError;
pub use memory::MemoryStore;
pub use seed::SeedData;
pub use store::Store;
