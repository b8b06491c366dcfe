//! Shared fixtures: a [`Store`] wrapper that counts every bulk read, so
//! tests can assert how many storage round-trips a query actually caused.
#![allow(dead_code)] // each test binary uses its own subset of the helpers

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use rookery_storage::{
    MemberType, MemberTypeId, MemoryStore, NewPost, NewProfile, NewUser, Post, PostPatch, Profile, ProfilePatch,
    SeedData, StorageError, Store, Subscription, User, UserPatch,
};
use uuid::Uuid;

#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    users: AtomicUsize,
    users_by_ids: AtomicUsize,
    posts: AtomicUsize,
    posts_by_ids: AtomicUsize,
    posts_by_author_calls: Mutex<Vec<Vec<Uuid>>>,
    profiles: AtomicUsize,
    profiles_by_ids: AtomicUsize,
    profiles_by_user_ids: AtomicUsize,
    member_types: AtomicUsize,
    member_types_by_ids: AtomicUsize,
    subscriptions: AtomicUsize,
    fail_posts_by_author_ids: AtomicBool,
}

impl CountingStore {
    pub fn with_member_types() -> Self {
        let member_types = [MemberTypeId::Basic, MemberTypeId::Business]
            .into_iter()
            .map(|id| MemberType {
                id,
                discount: 2.5,
                posts_limit_per_month: 20,
            })
            .collect();
        Self {
            inner: MemoryStore::from_seed(SeedData {
                member_types,
                ..SeedData::default()
            }),
            ..Self::default()
        }
    }

    /// Key sets of every `posts_by_author_ids` call, in call order.
    pub fn posts_by_author_calls(&self) -> Vec<Vec<Uuid>> {
        self.posts_by_author_calls.lock().unwrap().clone()
    }

    pub fn users_by_ids_calls(&self) -> usize {
        self.users_by_ids.load(Ordering::SeqCst)
    }

    pub fn profiles_by_user_ids_calls(&self) -> usize {
        self.profiles_by_user_ids.load(Ordering::SeqCst)
    }

    pub fn member_types_by_ids_calls(&self) -> usize {
        self.member_types_by_ids.load(Ordering::SeqCst)
    }

    pub fn subscriptions_calls(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn total_reads(&self) -> usize {
        [
            &self.users,
            &self.users_by_ids,
            &self.posts,
            &self.posts_by_ids,
            &self.profiles,
            &self.profiles_by_ids,
            &self.profiles_by_user_ids,
            &self.member_types,
            &self.member_types_by_ids,
            &self.subscriptions,
        ]
        .into_iter()
        .map(|counter| counter.load(Ordering::SeqCst))
        .sum::<usize>()
            + self.posts_by_author_calls.lock().unwrap().len()
    }

    pub fn fail_posts_by_author_ids(&self) {
        self.fail_posts_by_author_ids.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn users(&self) -> Result<Vec<User>, StorageError> {
        self.users.fetch_add(1, Ordering::SeqCst);
        self.inner.users().await
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, StorageError> {
        self.users_by_ids.fetch_add(1, Ordering::SeqCst);
        self.inner.users_by_ids(ids).await
    }

    async fn posts(&self) -> Result<Vec<Post>, StorageError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        self.inner.posts().await
    }

    async fn posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Post>, StorageError> {
        self.posts_by_ids.fetch_add(1, Ordering::SeqCst);
        self.inner.posts_by_ids(ids).await
    }

    async fn posts_by_author_ids(&self, author_ids: &[Uuid]) -> Result<Vec<Post>, StorageError> {
        self.posts_by_author_calls.lock().unwrap().push(author_ids.to_vec());
        if self.fail_posts_by_author_ids.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected failure".into()));
        }
        self.inner.posts_by_author_ids(author_ids).await
    }

    async fn profiles(&self) -> Result<Vec<Profile>, StorageError> {
        self.profiles.fetch_add(1, Ordering::SeqCst);
        self.inner.profiles().await
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>, StorageError> {
        self.profiles_by_ids.fetch_add(1, Ordering::SeqCst);
        self.inner.profiles_by_ids(ids).await
    }

    async fn profiles_by_user_ids(&self, user_ids: &[Uuid]) -> Result<Vec<Profile>, StorageError> {
        self.profiles_by_user_ids.fetch_add(1, Ordering::SeqCst);
        self.inner.profiles_by_user_ids(user_ids).await
    }

    async fn member_types(&self) -> Result<Vec<MemberType>, StorageError> {
        self.member_types.fetch_add(1, Ordering::SeqCst);
        self.inner.member_types().await
    }

    async fn member_types_by_ids(&self, ids: &[MemberTypeId]) -> Result<Vec<MemberType>, StorageError> {
        self.member_types_by_ids.fetch_add(1, Ordering::SeqCst);
        self.inner.member_types_by_ids(ids).await
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>, StorageError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.inner.subscriptions().await
    }

    async fn create_user(&self, input: NewUser) -> Result<User, StorageError> {
        self.inner.create_user(input).await
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<User, StorageError> {
        self.inner.update_user(id, patch).await
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StorageError> {
        self.inner.delete_user(id).await
    }

    async fn create_post(&self, input: NewPost) -> Result<Post, StorageError> {
        self.inner.create_post(input).await
    }

    async fn update_post(&self, id: Uuid, patch: PostPatch) -> Result<Post, StorageError> {
        self.inner.update_post(id, patch).await
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), StorageError> {
        self.inner.delete_post(id).await
    }

    async fn create_profile(&self, input: NewProfile) -> Result<Profile, StorageError> {
        self.inner.create_profile(input).await
    }

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> Result<Profile, StorageError> {
        self.inner.update_profile(id, patch).await
    }

    async fn delete_profile(&self, id: Uuid) -> Result<(), StorageError> {
        self.inner.delete_profile(id).await
    }

    async fn subscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> Result<(), StorageError> {
        self.inner.subscribe(subscriber_id, author_id).await
    }

    async fn unsubscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> Result<(), StorageError> {
        self.inner.unsubscribe(subscriber_id, author_id).await
    }
}

/// Creates a user with the given name, panicking on failure.
pub async fn user(store: &CountingStore, name: &str) -> User {
    store
        .create_user(NewUser {
            name: name.into(),
            balance: 0.0,
        })
        .await
        .unwrap()
}

/// Creates a post for `author`, panicking on failure.
pub async fn post(store: &CountingStore, author: &User, title: &str) -> Post {
    store
        .create_post(NewPost {
            title: title.into(),
            content: format!("{title} content"),
            author_id: author.id,
        })
        .await
        .unwrap()
}
