use std::{
    collections::HashSet,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    MemberType, MemberTypeId, NewPost, NewProfile, NewUser, Post, PostPatch, Profile, ProfilePatch, SeedData, Store,
    StorageError, Subscription, User, UserPatch,
};

/// In-process [`Store`] backed by insertion-ordered tables.
///
/// Reads clone rows out under a short-lived lock; the lock is never held
/// across an await point.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    users: IndexMap<Uuid, User>,
    posts: IndexMap<Uuid, Post>,
    profiles: IndexMap<Uuid, Profile>,
    member_types: IndexMap<MemberTypeId, MemberType>,
    subscriptions: Vec<Subscription>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SeedData) -> Self {
        let mut tables = Tables::default();
        for member_type in seed.member_types {
            tables.member_types.insert(member_type.id, member_type);
        }
        for user in seed.users {
            tables.users.insert(user.id, user);
        }
        for post in seed.posts {
            tables.posts.insert(post.id, post);
        }
        for profile in seed.profiles {
            tables.profiles.insert(profile.id, profile);
        }
        tables.subscriptions = seed.subscriptions;
        Self {
            tables: RwLock::new(tables),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().expect("store lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().expect("store lock poisoned")
    }
}

impl Tables {
    fn require_user(&self, id: Uuid) -> Result<&User, StorageError> {
        self.users.get(&id).ok_or_else(|| StorageError::not_found("user", id))
    }

    fn require_member_type(&self, id: MemberTypeId) -> Result<&MemberType, StorageError> {
        self.member_types
            .get(&id)
            .ok_or_else(|| StorageError::not_found("member type", id))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn users(&self) -> Result<Vec<User>, StorageError> {
        Ok(self.read().users.values().cloned().collect())
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, StorageError> {
        let tables = self.read();
        Ok(ids.iter().filter_map(|id| tables.users.get(id).cloned()).collect())
    }

    async fn posts(&self) -> Result<Vec<Post>, StorageError> {
        Ok(self.read().posts.values().cloned().collect())
    }

    async fn posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Post>, StorageError> {
        let tables = self.read();
        Ok(ids.iter().filter_map(|id| tables.posts.get(id).cloned()).collect())
    }

    async fn posts_by_author_ids(&self, author_ids: &[Uuid]) -> Result<Vec<Post>, StorageError> {
        let wanted: HashSet<Uuid> = author_ids.iter().copied().collect();
        Ok(self
            .read()
            .posts
            .values()
            .filter(|post| wanted.contains(&post.author_id))
            .cloned()
            .collect())
    }

    async fn profiles(&self) -> Result<Vec<Profile>, StorageError> {
        Ok(self.read().profiles.values().cloned().collect())
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>, StorageError> {
        let tables = self.read();
        Ok(ids.iter().filter_map(|id| tables.profiles.get(id).cloned()).collect())
    }

    async fn profiles_by_user_ids(&self, user_ids: &[Uuid]) -> Result<Vec<Profile>, StorageError> {
        let wanted: HashSet<Uuid> = user_ids.iter().copied().collect();
        Ok(self
            .read()
            .profiles
            .values()
            .filter(|profile| wanted.contains(&profile.user_id))
            .cloned()
            .collect())
    }

    async fn member_types(&self) -> Result<Vec<MemberType>, StorageError> {
        Ok(self.read().member_types.values().cloned().collect())
    }

    async fn member_types_by_ids(&self, ids: &[MemberTypeId]) -> Result<Vec<MemberType>, StorageError> {
        let tables = self.read();
        Ok(ids.iter().filter_map(|id| tables.member_types.get(id).cloned()).collect())
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>, StorageError> {
        Ok(self.read().subscriptions.clone())
    }

    async fn create_user(&self, input: NewUser) -> Result<User, StorageError> {
        let user = User {
            id: Uuid::new_v4(),
            name: input.name,
            balance: input.balance,
        };
        tracing::debug!(id = %user.id, "creating user");
        self.write().users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<User, StorageError> {
        let mut tables = self.write();
        let user = tables.users.get_mut(&id).ok_or_else(|| StorageError::not_found("user", id))?;
        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(balance) = patch.balance {
            user.balance = balance;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StorageError> {
        let mut tables = self.write();
        tables.users.shift_remove(&id).ok_or_else(|| StorageError::not_found("user", id))?;
        tracing::debug!(%id, "deleting user and dependent rows");
        tables.posts.retain(|_, post| post.author_id != id);
        tables.profiles.retain(|_, profile| profile.user_id != id);
        tables
            .subscriptions
            .retain(|edge| edge.subscriber_id != id && edge.author_id != id);
        Ok(())
    }

    async fn create_post(&self, input: NewPost) -> Result<Post, StorageError> {
        let mut tables = self.write();
        tables.require_user(input.author_id)?;
        let post = Post {
            id: Uuid::new_v4(),
            title: input.title,
            content: input.content,
            author_id: input.author_id,
        };
        tracing::debug!(id = %post.id, author = %post.author_id, "creating post");
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: Uuid, patch: PostPatch) -> Result<Post, StorageError> {
        let mut tables = self.write();
        if let Some(author_id) = patch.author_id {
            tables.require_user(author_id)?;
        }
        let post = tables.posts.get_mut(&id).ok_or_else(|| StorageError::not_found("post", id))?;
        if let Some(title) = patch.title {
            post.title = title;
        }
        if let Some(content) = patch.content {
            post.content = content;
        }
        if let Some(author_id) = patch.author_id {
            post.author_id = author_id;
        }
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), StorageError> {
        self.write()
            .posts
            .shift_remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("post", id))
    }

    async fn create_profile(&self, input: NewProfile) -> Result<Profile, StorageError> {
        let mut tables = self.write();
        tables.require_user(input.user_id)?;
        if let Some(member_type_id) = input.member_type_id {
            tables.require_member_type(member_type_id)?;
        }
        if tables.profiles.values().any(|profile| profile.user_id == input.user_id) {
            return Err(StorageError::Conflict(format!(
                "user {} already has a profile",
                input.user_id
            )));
        }
        let profile = Profile {
            id: Uuid::new_v4(),
            is_male: input.is_male,
            year_of_birth: input.year_of_birth,
            user_id: input.user_id,
            member_type_id: input.member_type_id,
        };
        tracing::debug!(id = %profile.id, user = %profile.user_id, "creating profile");
        tables.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> Result<Profile, StorageError> {
        let mut tables = self.write();
        if let Some(member_type_id) = patch.member_type_id {
            tables.require_member_type(member_type_id)?;
        }
        let profile = tables
            .profiles
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("profile", id))?;
        if let Some(is_male) = patch.is_male {
            profile.is_male = is_male;
        }
        if let Some(year_of_birth) = patch.year_of_birth {
            profile.year_of_birth = year_of_birth;
        }
        if let Some(member_type_id) = patch.member_type_id {
            profile.member_type_id = Some(member_type_id);
        }
        Ok(profile.clone())
    }

    async fn delete_profile(&self, id: Uuid) -> Result<(), StorageError> {
        self.write()
            .profiles
            .shift_remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("profile", id))
    }

    async fn subscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> Result<(), StorageError> {
        let mut tables = self.write();
        tables.require_user(subscriber_id)?;
        tables.require_user(author_id)?;
        if subscriber_id == author_id {
            return Err(StorageError::Conflict("a user cannot subscribe to themselves".into()));
        }
        let edge = Subscription {
            subscriber_id,
            author_id,
        };
        if tables.subscriptions.contains(&edge) {
            return Err(StorageError::Conflict(format!(
                "user {subscriber_id} is already subscribed to {author_id}"
            )));
        }
        tables.subscriptions.push(edge);
        Ok(())
    }

    async fn unsubscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> Result<(), StorageError> {
        let mut tables = self.write();
        let before = tables.subscriptions.len();
        tables
            .subscriptions
            .retain(|edge| !(edge.subscriber_id == subscriber_id && edge.author_id == author_id));
        if tables.subscriptions.len() == before {
            return Err(StorageError::not_found(
                "subscription",
                format!("{subscriber_id} -> {author_id}"),
            ));
        }
        Ok(())
    }
}
