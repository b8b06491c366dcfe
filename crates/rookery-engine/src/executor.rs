//! Selection-set resolution.
//!
//! Sibling fields of a selection set become one wave of futures joined
//! concurrently. A resolver that needs related data submits its key to the
//! edge's batch loader and suspends; because the whole wave is polled before
//! the task yields to I/O, every sibling's submission lands in the loader
//! before the batch fetch dispatches.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_graphql_parser::{
    types::{Field, FragmentDefinition, Selection, SelectionSet},
    Positioned,
};
use async_graphql_value::Name;
use futures_util::future::{join_all, BoxFuture, FutureExt};
use rookery_storage::{MemberType, Post, Profile, StorageError, Store, User};
use serde_json::Value as JsonValue;

use crate::{
    edges::RelationEdge,
    loaders::Loaders,
    request::Variables,
    response::{PathSegment, ServerError},
};

/// Everything a resolver needs during one request: the storage handle, the
/// request-scoped loader cache, the parsed fragments and variables, and the
/// sink for field-level errors. Built per execution and dropped when the
/// top-level resolution settles; no loader or cached value survives it.
pub(crate) struct ResolverEnv<'doc> {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) loaders: Loaders,
    fragments: &'doc HashMap<Name, Positioned<FragmentDefinition>>,
    pub(crate) variables: &'doc Variables,
    errors: Mutex<Vec<ServerError>>,
}

impl<'doc> ResolverEnv<'doc> {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        fragments: &'doc HashMap<Name, Positioned<FragmentDefinition>>,
        variables: &'doc Variables,
    ) -> Self {
        Self {
            loaders: Loaders::new(Arc::clone(&store)),
            store,
            fragments,
            variables,
            errors: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add_error(&self, error: ServerError) {
        self.errors.lock().expect("error sink poisoned").push(error);
    }

    pub(crate) fn take_errors(&self) -> Vec<ServerError> {
        std::mem::take(&mut *self.errors.lock().expect("error sink poisoned"))
    }
}

/// A parent entity mid-resolution.
#[derive(Clone)]
pub(crate) enum Node {
    User(User),
    Post(Post),
    Profile(Profile),
    MemberType(MemberType),
}

impl Node {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Node::User(_) => "User",
            Node::Post(_) => "Post",
            Node::Profile(_) => "Profile",
            Node::MemberType(_) => "MemberType",
        }
    }
}

/// Flattens a selection set for a concrete type, expanding fragment spreads
/// and inline fragments in place. Fragments with a non-matching type
/// condition are skipped; unknown fragments were already rejected by
/// validation.
pub(crate) fn collect_fields<'doc>(
    env: &ResolverEnv<'doc>,
    selection_set: &'doc Positioned<SelectionSet>,
    type_name: &str,
    fields: &mut Vec<&'doc Positioned<Field>>,
) {
    for item in &selection_set.node.items {
        match &item.node {
            Selection::Field(field) => fields.push(field),
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = env.fragments.get(spread.node.fragment_name.node.as_str()) {
                    if fragment.node.type_condition.node.on.node.as_str() == type_name {
                        collect_fields(env, &fragment.node.selection_set, type_name, fields);
                    }
                }
            }
            Selection::InlineFragment(inline) => {
                let matches = inline
                    .node
                    .type_condition
                    .as_ref()
                    .map(|condition| condition.node.on.node.as_str() == type_name)
                    .unwrap_or(true);
                if matches {
                    collect_fields(env, &inline.node.selection_set, type_name, fields);
                }
            }
        }
    }
}

pub(crate) fn response_key(field: &Positioned<Field>) -> &str {
    field
        .node
        .alias
        .as_ref()
        .map(|alias| alias.node.as_str())
        .unwrap_or_else(|| field.node.name.node.as_str())
}

/// Resolves an entity against a selection set, executing all fields as one
/// concurrent wave. Duplicate response keys keep the first-resolved entry.
pub(crate) fn resolve_object<'a>(
    env: &'a ResolverEnv<'a>,
    path: Vec<PathSegment>,
    selection_set: &'a Positioned<SelectionSet>,
    node: Node,
) -> BoxFuture<'a, JsonValue> {
    async move {
        let mut fields = Vec::new();
        collect_fields(env, selection_set, node.type_name(), &mut fields);

        let node = &node;
        let path = &path;
        let wave = fields.into_iter().map(|field| async move {
            let key = response_key(field).to_string();
            let mut field_path = path.clone();
            field_path.push(PathSegment::Field(key.clone()));
            let value = resolve_field(env, field_path, field, node).await;
            (key, value)
        });
        let resolved = join_all(wave).await;

        let mut object = serde_json::Map::with_capacity(resolved.len());
        for (key, value) in resolved {
            object.entry(key).or_insert(value);
        }
        JsonValue::Object(object)
    }
    .boxed()
}

/// Resolves each list item concurrently, threading the item index into the
/// error path.
pub(crate) async fn resolve_list<'a>(
    env: &'a ResolverEnv<'a>,
    path: &[PathSegment],
    selection_set: &'a Positioned<SelectionSet>,
    nodes: Vec<Node>,
) -> JsonValue {
    let items = nodes.into_iter().enumerate().map(|(index, node)| {
        let mut item_path = path.to_vec();
        item_path.push(PathSegment::Index(index));
        resolve_object(env, item_path, selection_set, node)
    });
    JsonValue::Array(join_all(items).await)
}

/// Resolves one field of an entity. A failure becomes JSON null plus an
/// entry in the error sink; it never aborts the surrounding wave.
async fn resolve_field(
    env: &ResolverEnv<'_>,
    path: Vec<PathSegment>,
    field: &Positioned<Field>,
    node: &Node,
) -> JsonValue {
    match resolve_field_inner(env, &path, field, node).await {
        Ok(value) => value,
        Err(error) => {
            env.add_error(error.at_path(path));
            JsonValue::Null
        }
    }
}

async fn resolve_field_inner(
    env: &ResolverEnv<'_>,
    path: &[PathSegment],
    field: &Positioned<Field>,
    node: &Node,
) -> Result<JsonValue, ServerError> {
    let name = field.node.name.node.as_str();

    if name == "__typename" {
        return Ok(JsonValue::String(node.type_name().to_string()));
    }

    if let Some(value) = scalar_field(node, name) {
        forbid_subselection(field, node.type_name())?;
        return Ok(value);
    }

    match RelationEdge::of(node.type_name(), name) {
        Some(edge) => {
            require_subselection(field, node.type_name())?;
            resolve_relation(env, path, field, edge, node).await
        }
        None => Err(ServerError::new(
            format!("Could not find a field named {} on {}", name, node.type_name()),
            Some(field.pos),
        )),
    }
}

/// The static edge dispatch: every relation goes through the loader
/// registered for its site in the request-scoped cache.
async fn resolve_relation(
    env: &ResolverEnv<'_>,
    path: &[PathSegment],
    field: &Positioned<Field>,
    edge: RelationEdge,
    node: &Node,
) -> Result<JsonValue, ServerError> {
    let selection_set = &field.node.selection_set;

    match (edge, node) {
        (RelationEdge::ProfileOfUser, Node::User(user)) => {
            let profile = env
                .loaders
                .profile_of_user()
                .load_one(user.id)
                .await
                .map_err(|error| load_error(edge, &error, field))?;
            Ok(match profile {
                Some(profile) => resolve_object(env, path.to_vec(), selection_set, Node::Profile(profile)).await,
                None => JsonValue::Null,
            })
        }
        (RelationEdge::PostsOfUser, Node::User(user)) => {
            let posts = env
                .loaders
                .posts_of_user()
                .load_one(user.id)
                .await
                .map_err(|error| load_error(edge, &error, field))?
                .unwrap_or_default();
            Ok(resolve_list(env, path, selection_set, posts.into_iter().map(Node::Post).collect()).await)
        }
        (RelationEdge::AuthorOfPost, Node::Post(post)) => {
            let author = env
                .loaders
                .author_of_post()
                .load_one(post.author_id)
                .await
                .map_err(|error| load_error(edge, &error, field))?;
            Ok(match author {
                Some(author) => resolve_object(env, path.to_vec(), selection_set, Node::User(author)).await,
                None => JsonValue::Null,
            })
        }
        (RelationEdge::MemberTypeOfProfile, Node::Profile(profile)) => {
            // An unset foreign key resolves to null without registering a key.
            let Some(member_type_id) = profile.member_type_id else {
                return Ok(JsonValue::Null);
            };
            let member_type = env
                .loaders
                .member_type_of_profile()
                .load_one(member_type_id)
                .await
                .map_err(|error| load_error(edge, &error, field))?;
            Ok(match member_type {
                Some(member_type) => {
                    resolve_object(env, path.to_vec(), selection_set, Node::MemberType(member_type)).await
                }
                None => JsonValue::Null,
            })
        }
        (RelationEdge::SubscribedToOfUser, Node::User(user)) => {
            let authors = env
                .loaders
                .subscribed_to_of_user()
                .load_one(user.id)
                .await
                .map_err(|error| load_error(edge, &error, field))?
                .unwrap_or_default();
            Ok(resolve_list(env, path, selection_set, authors.into_iter().map(Node::User).collect()).await)
        }
        (RelationEdge::SubscribersOfUser, Node::User(user)) => {
            let subscribers = env
                .loaders
                .subscribers_of_user()
                .load_one(user.id)
                .await
                .map_err(|error| load_error(edge, &error, field))?
                .unwrap_or_default();
            Ok(resolve_list(env, path, selection_set, subscribers.into_iter().map(Node::User).collect()).await)
        }
        _ => Err(ServerError::new(
            format!("Field {} cannot be resolved against {}", name_of(field), node.type_name()),
            Some(field.pos),
        )),
    }
}

fn name_of(field: &Positioned<Field>) -> &str {
    field.node.name.node.as_str()
}

fn load_error(edge: RelationEdge, error: &dataloader::LoadError<StorageError>, field: &Positioned<Field>) -> ServerError {
    tracing::warn!(edge = edge.label(), error = %error, "batched relation fetch failed");
    ServerError::new(error.to_string(), Some(field.pos))
}

fn scalar_field(node: &Node, name: &str) -> Option<JsonValue> {
    let value = match (node, name) {
        (Node::User(user), "id") => JsonValue::String(user.id.to_string()),
        (Node::User(user), "name") => JsonValue::String(user.name.clone()),
        (Node::User(user), "balance") => json_f64(user.balance),
        (Node::Post(post), "id") => JsonValue::String(post.id.to_string()),
        (Node::Post(post), "title") => JsonValue::String(post.title.clone()),
        (Node::Post(post), "content") => JsonValue::String(post.content.clone()),
        (Node::Post(post), "authorId") => JsonValue::String(post.author_id.to_string()),
        (Node::Profile(profile), "id") => JsonValue::String(profile.id.to_string()),
        (Node::Profile(profile), "isMale") => JsonValue::Bool(profile.is_male),
        (Node::Profile(profile), "yearOfBirth") => JsonValue::from(profile.year_of_birth),
        (Node::Profile(profile), "userId") => JsonValue::String(profile.user_id.to_string()),
        (Node::Profile(profile), "memberTypeId") => profile
            .member_type_id
            .map(|id| JsonValue::String(id.as_str().to_string()))
            .unwrap_or(JsonValue::Null),
        (Node::MemberType(member_type), "id") => JsonValue::String(member_type.id.as_str().to_string()),
        (Node::MemberType(member_type), "discount") => json_f64(member_type.discount),
        (Node::MemberType(member_type), "postsLimitPerMonth") => JsonValue::from(member_type.posts_limit_per_month),
        _ => return None,
    };
    Some(value)
}

fn json_f64(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value).map(JsonValue::Number).unwrap_or(JsonValue::Null)
}

pub(crate) fn require_subselection(field: &Positioned<Field>, parent_type: &str) -> Result<(), ServerError> {
    if field.node.selection_set.node.items.is_empty() {
        return Err(ServerError::new(
            format!(
                "Field {} of {} must have a selection of subfields",
                name_of(field),
                parent_type
            ),
            Some(field.pos),
        ));
    }
    Ok(())
}

pub(crate) fn forbid_subselection(field: &Positioned<Field>, parent_type: &str) -> Result<(), ServerError> {
    if !field.node.selection_set.node.items.is_empty() {
        return Err(ServerError::new(
            format!(
                "Field {} of {} cannot have a selection of subfields",
                name_of(field),
                parent_type
            ),
            Some(field.pos),
        ));
    }
    Ok(())
}
