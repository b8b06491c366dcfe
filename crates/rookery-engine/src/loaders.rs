//! Per-edge batch loaders and the request-scoped cache that owns them.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use dataloader::{DataLoader, Loader};
use rookery_storage::{MemberType, MemberTypeId, Post, Profile, StorageError, Store, Subscription, User};
use tokio::sync::OnceCell;
use uuid::Uuid;

/// The loaders created during one request, keyed by relation edge.
///
/// Constructed fresh for every top-level execution and dropped when the
/// resolution settles, together with every cached value — nothing leaks
/// across requests. Loaders are created lazily the first time their edge is
/// resolved.
pub(crate) struct Loaders {
    store: Arc<dyn Store>,
    subscription_edges: Arc<OnceCell<Arc<Vec<Subscription>>>>,
    profile_of_user: OnceLock<DataLoader<ProfileByUserIdLoader, Uuid>>,
    posts_of_user: OnceLock<DataLoader<PostsByAuthorIdLoader, Uuid>>,
    author_of_post: OnceLock<DataLoader<UserByIdLoader, Uuid>>,
    member_type_of_profile: OnceLock<DataLoader<MemberTypeByIdLoader, MemberTypeId>>,
    subscribed_to_of_user: OnceLock<DataLoader<SubscribedToLoader, Uuid>>,
    subscribers_of_user: OnceLock<DataLoader<SubscribersLoader, Uuid>>,
}

const MAX_BATCH_SIZE: usize = 100;
const BATCH_DELAY: Duration = Duration::from_millis(2);

fn batching<T, K>(loader: T) -> DataLoader<T, K>
where
    T: Loader<K>,
    K: Send + Sync + std::hash::Hash + Eq + Clone + 'static,
{
    DataLoader::new(loader).max_batch_size(MAX_BATCH_SIZE).delay(BATCH_DELAY)
}

impl Loaders {
    pub(crate) fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            subscription_edges: Arc::new(OnceCell::new()),
            profile_of_user: OnceLock::new(),
            posts_of_user: OnceLock::new(),
            author_of_post: OnceLock::new(),
            member_type_of_profile: OnceLock::new(),
            subscribed_to_of_user: OnceLock::new(),
            subscribers_of_user: OnceLock::new(),
        }
    }

    pub(crate) fn profile_of_user(&self) -> &DataLoader<ProfileByUserIdLoader, Uuid> {
        self.profile_of_user.get_or_init(|| {
            batching(ProfileByUserIdLoader {
                store: Arc::clone(&self.store),
            })
        })
    }

    pub(crate) fn posts_of_user(&self) -> &DataLoader<PostsByAuthorIdLoader, Uuid> {
        self.posts_of_user.get_or_init(|| {
            batching(PostsByAuthorIdLoader {
                store: Arc::clone(&self.store),
            })
        })
    }

    pub(crate) fn author_of_post(&self) -> &DataLoader<UserByIdLoader, Uuid> {
        self.author_of_post.get_or_init(|| {
            batching(UserByIdLoader {
                store: Arc::clone(&self.store),
            })
        })
    }

    pub(crate) fn member_type_of_profile(&self) -> &DataLoader<MemberTypeByIdLoader, MemberTypeId> {
        self.member_type_of_profile.get_or_init(|| {
            batching(MemberTypeByIdLoader {
                store: Arc::clone(&self.store),
            })
        })
    }

    pub(crate) fn subscribed_to_of_user(&self) -> &DataLoader<SubscribedToLoader, Uuid> {
        self.subscribed_to_of_user.get_or_init(|| {
            batching(SubscribedToLoader {
                store: Arc::clone(&self.store),
                edges: Arc::clone(&self.subscription_edges),
            })
        })
    }

    pub(crate) fn subscribers_of_user(&self) -> &DataLoader<SubscribersLoader, Uuid> {
        self.subscribers_of_user.get_or_init(|| {
            batching(SubscribersLoader {
                store: Arc::clone(&self.store),
                edges: Arc::clone(&self.subscription_edges),
            })
        })
    }
}

pub(crate) struct ProfileByUserIdLoader {
    store: Arc<dyn Store>,
}

#[async_trait]
impl Loader<Uuid> for ProfileByUserIdLoader {
    type Value = Profile;
    type Error = StorageError;

    async fn load(&self, keys: &[Uuid]) -> Result<HashMap<Uuid, Profile>, StorageError> {
        let rows = self.store.profiles_by_user_ids(keys).await?;
        Ok(rows.into_iter().map(|profile| (profile.user_id, profile)).collect())
    }
}

pub(crate) struct PostsByAuthorIdLoader {
    store: Arc<dyn Store>,
}

#[async_trait]
impl Loader<Uuid> for PostsByAuthorIdLoader {
    type Value = Vec<Post>;
    type Error = StorageError;

    async fn load(&self, keys: &[Uuid]) -> Result<HashMap<Uuid, Vec<Post>>, StorageError> {
        let rows = self.store.posts_by_author_ids(keys).await?;
        let mut grouped: HashMap<Uuid, Vec<Post>> = HashMap::new();
        for post in rows {
            grouped.entry(post.author_id).or_default().push(post);
        }
        Ok(grouped)
    }
}

pub(crate) struct UserByIdLoader {
    store: Arc<dyn Store>,
}

#[async_trait]
impl Loader<Uuid> for UserByIdLoader {
    type Value = User;
    type Error = StorageError;

    async fn load(&self, keys: &[Uuid]) -> Result<HashMap<Uuid, User>, StorageError> {
        let rows = self.store.users_by_ids(keys).await?;
        Ok(rows.into_iter().map(|user| (user.id, user)).collect())
    }
}

pub(crate) struct MemberTypeByIdLoader {
    store: Arc<dyn Store>,
}

#[async_trait]
impl Loader<MemberTypeId> for MemberTypeByIdLoader {
    type Value = MemberType;
    type Error = StorageError;

    async fn load(&self, keys: &[MemberTypeId]) -> Result<HashMap<MemberTypeId, MemberType>, StorageError> {
        let rows = self.store.member_types_by_ids(keys).await?;
        Ok(rows.into_iter().map(|member_type| (member_type.id, member_type)).collect())
    }
}

/// The association table is prefetched once per request, on first access
/// from either direction, and both subscription loaders serve their batches
/// as in-memory joins over it plus one bulk user fetch per direction.
async fn subscription_edges(
    store: &dyn Store,
    cell: &OnceCell<Arc<Vec<Subscription>>>,
) -> Result<Arc<Vec<Subscription>>, StorageError> {
    let edges = cell
        .get_or_try_init(|| async { Ok::<_, StorageError>(Arc::new(store.subscriptions().await?)) })
        .await?;
    Ok(Arc::clone(edges))
}

/// Authors followed by each submitted subscriber id.
pub(crate) struct SubscribedToLoader {
    store: Arc<dyn Store>,
    edges: Arc<OnceCell<Arc<Vec<Subscription>>>>,
}

#[async_trait]
impl Loader<Uuid> for SubscribedToLoader {
    type Value = Vec<User>;
    type Error = StorageError;

    async fn load(&self, keys: &[Uuid]) -> Result<HashMap<Uuid, Vec<User>>, StorageError> {
        let edges = subscription_edges(self.store.as_ref(), &self.edges).await?;
        join_subscriptions(self.store.as_ref(), &edges, keys, |edge| (edge.subscriber_id, edge.author_id)).await
    }
}

/// Subscribers of each submitted author id.
pub(crate) struct SubscribersLoader {
    store: Arc<dyn Store>,
    edges: Arc<OnceCell<Arc<Vec<Subscription>>>>,
}

#[async_trait]
impl Loader<Uuid> for SubscribersLoader {
    type Value = Vec<User>;
    type Error = StorageError;

    async fn load(&self, keys: &[Uuid]) -> Result<HashMap<Uuid, Vec<User>>, StorageError> {
        let edges = subscription_edges(self.store.as_ref(), &self.edges).await?;
        join_subscriptions(self.store.as_ref(), &edges, keys, |edge| (edge.author_id, edge.subscriber_id)).await
    }
}

/// Groups the association pairs by `key_of`'s first component and resolves
/// the second component to full user records with a single bulk fetch.
async fn join_subscriptions(
    store: &dyn Store,
    edges: &[Subscription],
    keys: &[Uuid],
    key_of: impl Fn(&Subscription) -> (Uuid, Uuid),
) -> Result<HashMap<Uuid, Vec<User>>, StorageError> {
    let wanted_keys: HashSet<Uuid> = keys.iter().copied().collect();
    let mut related_per_key: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut related_ids = Vec::new();
    let mut seen = HashSet::new();
    for edge in edges {
        let (key, related) = key_of(edge);
        if wanted_keys.contains(&key) {
            related_per_key.entry(key).or_default().push(related);
            if seen.insert(related) {
                related_ids.push(related);
            }
        }
    }

    let users: HashMap<Uuid, User> = store
        .users_by_ids(&related_ids)
        .await?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    Ok(related_per_key
        .into_iter()
        .map(|(key, ids)| {
            let related = ids.into_iter().filter_map(|id| users.get(&id).cloned()).collect();
            (key, related)
        })
        .collect())
}
