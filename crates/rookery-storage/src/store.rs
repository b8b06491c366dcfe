use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    MemberType, MemberTypeId, NewPost, NewProfile, NewUser, Post, PostPatch, Profile, ProfilePatch, StorageError,
    Subscription, User, UserPatch,
};

/// The persistence seam consumed by the engine's resolvers and loaders.
///
/// Every bulk read accepts an empty key set and returns an empty list; ids
/// without a matching row are simply absent from the result. Results come
/// back in the backend's row order, not the key order.
#[async_trait]
pub trait Store: Send + Sync {
    async fn users(&self) -> Result<Vec<User>, StorageError>;
    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, StorageError>;

    async fn posts(&self) -> Result<Vec<Post>, StorageError>;
    async fn posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Post>, StorageError>;
    /// One-to-many lookup: all posts whose `authorId` is in `author_ids`.
    async fn posts_by_author_ids(&self, author_ids: &[Uuid]) -> Result<Vec<Post>, StorageError>;

    async fn profiles(&self) -> Result<Vec<Profile>, StorageError>;
    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>, StorageError>;
    async fn profiles_by_user_ids(&self, user_ids: &[Uuid]) -> Result<Vec<Profile>, StorageError>;

    async fn member_types(&self) -> Result<Vec<MemberType>, StorageError>;
    async fn member_types_by_ids(&self, ids: &[MemberTypeId]) -> Result<Vec<MemberType>, StorageError>;

    /// The full subscriber/author association table.
    async fn subscriptions(&self) -> Result<Vec<Subscription>, StorageError>;

    async fn create_user(&self, input: NewUser) -> Result<User, StorageError>;
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<User, StorageError>;
    /// Deletes the user together with their posts, profile and
    /// subscription edges in both directions.
    async fn delete_user(&self, id: Uuid) -> Result<(), StorageError>;

    async fn create_post(&self, input: NewPost) -> Result<Post, StorageError>;
    async fn update_post(&self, id: Uuid, patch: PostPatch) -> Result<Post, StorageError>;
    async fn delete_post(&self, id: Uuid) -> Result<(), StorageError>;

    async fn create_profile(&self, input: NewProfile) -> Result<Profile, StorageError>;
    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> Result<Profile, StorageError>;
    async fn delete_profile(&self, id: Uuid) -> Result<(), StorageError>;

    async fn subscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> Result<(), StorageError>;
    async fn unsubscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> Result<(), StorageError>;
}
