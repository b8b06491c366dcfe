//! Root operation resolvers.
//!
//! Query root fields resolve as one concurrent wave, which is what lets the
//! nested relation resolvers coalesce their loader submissions. Mutation
//! root fields resolve serially, in document order.

use async_graphql_parser::{
    types::{Field, SelectionSet},
    Positioned,
};
use async_graphql_value::ConstValue;
use futures_util::future::join_all;
use rookery_storage::{MemberTypeId, NewPost, NewProfile, NewUser, PostPatch, ProfilePatch, StorageError, UserPatch};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    executor::{collect_fields, require_subselection, resolve_list, resolve_object, response_key, Node, ResolverEnv},
    response::{PathSegment, ServerError},
};

pub(crate) async fn resolve_query(env: &ResolverEnv<'_>, selection_set: &Positioned<SelectionSet>) -> JsonValue {
    let mut fields = Vec::new();
    collect_fields(env, selection_set, "Query", &mut fields);

    let wave = fields.into_iter().map(|field| async move {
        let key = response_key(field).to_string();
        let path = vec![PathSegment::Field(key.clone())];
        let value = match resolve_query_field(env, path.clone(), field).await {
            Ok(value) => value,
            Err(error) => {
                env.add_error(error.at_path(path));
                JsonValue::Null
            }
        };
        (key, value)
    });
    let resolved = join_all(wave).await;

    assemble(resolved)
}

pub(crate) async fn resolve_mutation(env: &ResolverEnv<'_>, selection_set: &Positioned<SelectionSet>) -> JsonValue {
    let mut fields = Vec::new();
    collect_fields(env, selection_set, "Mutation", &mut fields);

    let mut resolved = Vec::with_capacity(fields.len());
    for field in fields {
        let key = response_key(field).to_string();
        let path = vec![PathSegment::Field(key.clone())];
        let value = match resolve_mutation_field(env, path.clone(), field).await {
            Ok(value) => value,
            Err(error) => {
                env.add_error(error.at_path(path));
                JsonValue::Null
            }
        };
        resolved.push((key, value));
    }

    assemble(resolved)
}

fn assemble(resolved: Vec<(String, JsonValue)>) -> JsonValue {
    let mut object = serde_json::Map::with_capacity(resolved.len());
    for (key, value) in resolved {
        object.entry(key).or_insert(value);
    }
    JsonValue::Object(object)
}

async fn resolve_query_field(
    env: &ResolverEnv<'_>,
    path: Vec<PathSegment>,
    field: &Positioned<Field>,
) -> Result<JsonValue, ServerError> {
    let name = field.node.name.node.as_str();
    let selection_set = &field.node.selection_set;

    match name {
        "__typename" => Ok(JsonValue::String("Query".to_string())),
        "users" => {
            require_subselection(field, "Query")?;
            let users = env.store.users().await.map_err(|error| storage_error(&error, field))?;
            Ok(resolve_list(env, &path, selection_set, users.into_iter().map(Node::User).collect()).await)
        }
        "user" => {
            require_subselection(field, "Query")?;
            let id = uuid_argument(env, field, "id")?;
            let user = env
                .store
                .users_by_ids(&[id])
                .await
                .map_err(|error| storage_error(&error, field))?
                .into_iter()
                .next();
            resolve_optional(env, path, selection_set, user.map(Node::User)).await
        }
        "posts" => {
            require_subselection(field, "Query")?;
            let posts = env.store.posts().await.map_err(|error| storage_error(&error, field))?;
            Ok(resolve_list(env, &path, selection_set, posts.into_iter().map(Node::Post).collect()).await)
        }
        "post" => {
            require_subselection(field, "Query")?;
            let id = uuid_argument(env, field, "id")?;
            let post = env
                .store
                .posts_by_ids(&[id])
                .await
                .map_err(|error| storage_error(&error, field))?
                .into_iter()
                .next();
            resolve_optional(env, path, selection_set, post.map(Node::Post)).await
        }
        "profiles" => {
            require_subselection(field, "Query")?;
            let profiles = env.store.profiles().await.map_err(|error| storage_error(&error, field))?;
            Ok(resolve_list(env, &path, selection_set, profiles.into_iter().map(Node::Profile).collect()).await)
        }
        "profile" => {
            require_subselection(field, "Query")?;
            let id = uuid_argument(env, field, "id")?;
            let profile = env
                .store
                .profiles_by_ids(&[id])
                .await
                .map_err(|error| storage_error(&error, field))?
                .into_iter()
                .next();
            resolve_optional(env, path, selection_set, profile.map(Node::Profile)).await
        }
        "memberTypes" => {
            require_subselection(field, "Query")?;
            let member_types = env.store.member_types().await.map_err(|error| storage_error(&error, field))?;
            Ok(resolve_list(
                env,
                &path,
                selection_set,
                member_types.into_iter().map(Node::MemberType).collect(),
            )
            .await)
        }
        "memberType" => {
            require_subselection(field, "Query")?;
            let id = member_type_id_argument(env, field, "id")?;
            let member_type = env
                .store
                .member_types_by_ids(&[id])
                .await
                .map_err(|error| storage_error(&error, field))?
                .into_iter()
                .next();
            resolve_optional(env, path, selection_set, member_type.map(Node::MemberType)).await
        }
        _ => Err(ServerError::new(
            format!("Could not find a field named {name} on Query"),
            Some(field.pos),
        )),
    }
}

async fn resolve_mutation_field(
    env: &ResolverEnv<'_>,
    path: Vec<PathSegment>,
    field: &Positioned<Field>,
) -> Result<JsonValue, ServerError> {
    let name = field.node.name.node.as_str();
    let selection_set = &field.node.selection_set;

    match name {
        "__typename" => Ok(JsonValue::String("Mutation".to_string())),
        "createUser" => {
            require_subselection(field, "Mutation")?;
            let input: NewUser = input_argument(env, field, "dto")?;
            let user = env.store.create_user(input).await.map_err(|error| storage_error(&error, field))?;
            Ok(resolve_object(env, path, selection_set, Node::User(user)).await)
        }
        "changeUser" => {
            require_subselection(field, "Mutation")?;
            let id = uuid_argument(env, field, "id")?;
            let patch: UserPatch = input_argument(env, field, "dto")?;
            let user = env
                .store
                .update_user(id, patch)
                .await
                .map_err(|error| storage_error(&error, field))?;
            Ok(resolve_object(env, path, selection_set, Node::User(user)).await)
        }
        "deleteUser" => {
            let id = uuid_argument(env, field, "id")?;
            env.store.delete_user(id).await.map_err(|error| storage_error(&error, field))?;
            Ok(JsonValue::Null)
        }
        "createPost" => {
            require_subselection(field, "Mutation")?;
            let input: NewPost = input_argument(env, field, "dto")?;
            let post = env.store.create_post(input).await.map_err(|error| storage_error(&error, field))?;
            Ok(resolve_object(env, path, selection_set, Node::Post(post)).await)
        }
        "changePost" => {
            require_subselection(field, "Mutation")?;
            let id = uuid_argument(env, field, "id")?;
            let patch: PostPatch = input_argument(env, field, "dto")?;
            let post = env
                .store
                .update_post(id, patch)
                .await
                .map_err(|error| storage_error(&error, field))?;
            Ok(resolve_object(env, path, selection_set, Node::Post(post)).await)
        }
        "deletePost" => {
            let id = uuid_argument(env, field, "id")?;
            env.store.delete_post(id).await.map_err(|error| storage_error(&error, field))?;
            Ok(JsonValue::Null)
        }
        "createProfile" => {
            require_subselection(field, "Mutation")?;
            let input: NewProfile = input_argument(env, field, "dto")?;
            let profile = env
                .store
                .create_profile(input)
                .await
                .map_err(|error| storage_error(&error, field))?;
            Ok(resolve_object(env, path, selection_set, Node::Profile(profile)).await)
        }
        "changeProfile" => {
            require_subselection(field, "Mutation")?;
            let id = uuid_argument(env, field, "id")?;
            let patch: ProfilePatch = input_argument(env, field, "dto")?;
            let profile = env
                .store
                .update_profile(id, patch)
                .await
                .map_err(|error| storage_error(&error, field))?;
            Ok(resolve_object(env, path, selection_set, Node::Profile(profile)).await)
        }
        "deleteProfile" => {
            let id = uuid_argument(env, field, "id")?;
            env.store
                .delete_profile(id)
                .await
                .map_err(|error| storage_error(&error, field))?;
            Ok(JsonValue::Null)
        }
        "subscribeTo" => {
            require_subselection(field, "Mutation")?;
            let subscriber_id = uuid_argument(env, field, "userId")?;
            let author_id = uuid_argument(env, field, "authorId")?;
            env.store
                .subscribe(subscriber_id, author_id)
                .await
                .map_err(|error| storage_error(&error, field))?;
            let subscriber = env
                .store
                .users_by_ids(&[subscriber_id])
                .await
                .map_err(|error| storage_error(&error, field))?
                .into_iter()
                .next();
            resolve_optional(env, path, selection_set, subscriber.map(Node::User)).await
        }
        "unsubscribeFrom" => {
            let subscriber_id = uuid_argument(env, field, "userId")?;
            let author_id = uuid_argument(env, field, "authorId")?;
            env.store
                .unsubscribe(subscriber_id, author_id)
                .await
                .map_err(|error| storage_error(&error, field))?;
            Ok(JsonValue::Null)
        }
        _ => Err(ServerError::new(
            format!("Could not find a field named {name} on Mutation"),
            Some(field.pos),
        )),
    }
}

/// A lookup that finds nothing is a valid outcome, not an error.
async fn resolve_optional<'a>(
    env: &'a ResolverEnv<'a>,
    path: Vec<PathSegment>,
    selection_set: &'a Positioned<SelectionSet>,
    node: Option<Node>,
) -> Result<JsonValue, ServerError> {
    Ok(match node {
        Some(node) => resolve_object(env, path, selection_set, node).await,
        None => JsonValue::Null,
    })
}

fn storage_error(error: &StorageError, field: &Positioned<Field>) -> ServerError {
    ServerError::new(error.to_string(), Some(field.pos))
}

fn argument<'doc>(
    field: &'doc Positioned<Field>,
    name: &str,
) -> Option<&'doc Positioned<async_graphql_value::Value>> {
    field
        .node
        .arguments
        .iter()
        .find(|(argument_name, _)| argument_name.node.as_str() == name)
        .map(|(_, value)| value)
}

/// Resolves an argument to a concrete value, binding variables from the
/// request.
fn const_argument(env: &ResolverEnv<'_>, field: &Positioned<Field>, name: &str) -> Result<ConstValue, ServerError> {
    let Some(value) = argument(field, name) else {
        return Err(ServerError::new(
            format!("Argument '{name}' is required on field '{}'", field.node.name.node),
            Some(field.pos),
        ));
    };
    let pos = value.pos;
    value.node.clone().into_const_with(|variable| {
        env.variables
            .get(variable.as_str())
            .cloned()
            .ok_or_else(|| ServerError::new(format!("Variable '${variable}' is not defined"), Some(pos)))
    })
}

fn uuid_argument(env: &ResolverEnv<'_>, field: &Positioned<Field>, name: &str) -> Result<Uuid, ServerError> {
    let pos = argument(field, name).map(|value| value.pos);
    match const_argument(env, field, name)? {
        ConstValue::String(raw) => Uuid::parse_str(&raw)
            .map_err(|_| ServerError::new(format!("Invalid value for argument '{name}': expected a UUID"), pos)),
        _ => Err(ServerError::new(
            format!("Invalid value for argument '{name}': expected a UUID"),
            pos,
        )),
    }
}

fn member_type_id_argument(
    env: &ResolverEnv<'_>,
    field: &Positioned<Field>,
    name: &str,
) -> Result<MemberTypeId, ServerError> {
    let pos = argument(field, name).map(|value| value.pos);
    let raw = match const_argument(env, field, name)? {
        ConstValue::Enum(value) => value.to_string(),
        ConstValue::String(value) => value,
        _ => {
            return Err(ServerError::new(
                format!("Invalid value for argument '{name}': expected a MemberTypeId"),
                pos,
            ))
        }
    };
    raw.parse()
        .map_err(|error: rookery_storage::InvalidMemberTypeId| ServerError::new(error.to_string(), pos))
}

/// Deserializes an input-object argument into its typed payload. Unknown
/// fields are rejected with a descriptive message, so an input targeting a
/// field not defined on the record fails that field alone.
fn input_argument<T: serde::de::DeserializeOwned>(
    env: &ResolverEnv<'_>,
    field: &Positioned<Field>,
    name: &str,
) -> Result<T, ServerError> {
    let pos = argument(field, name).map(|value| value.pos);
    let value = const_argument(env, field, name)?;
    let json = value
        .into_json()
        .map_err(|error| ServerError::new(format!("Invalid input for argument '{name}': {error}"), pos))?;
    serde_json::from_value(json)
        .map_err(|error| ServerError::new(format!("Invalid input for argument '{name}': {error}"), pos))
}
