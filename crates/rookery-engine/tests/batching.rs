//! Properties of the batched loading layer: one bulk fetch per edge per
//! request, request-scoped caching, shared association prefetch, failure
//! fan-out, and cross-request isolation.

mod common;

use std::sync::Arc;

use common::{post, user, CountingStore};
use rookery_engine::{PathSegment, Request, Schema};
use rookery_storage::{NewProfile, Store};
use serde_json::json;

#[tokio::test]
async fn one_posts_fetch_regardless_of_parent_count() {
    let store = Arc::new(CountingStore::default());
    let ada = user(&store, "ada").await;
    let brian = user(&store, "brian").await;
    let cleo = user(&store, "cleo").await;
    post(&store, &ada, "a1").await;
    post(&store, &ada, "a2").await;
    post(&store, &cleo, "c1").await;

    let schema = Schema::new(store.clone());
    let response = schema.execute(Request::new("{ users { id posts { id } } }")).await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let calls = store.posts_by_author_calls();
    assert_eq!(calls.len(), 1, "expected exactly one bulk fetch for the posts edge");
    assert_eq!(calls[0].len(), 3, "expected all three author ids in the one batch");

    let data = response.data.unwrap();
    let users = data["users"].as_array().unwrap();
    assert_eq!(users[0]["id"], json!(ada.id.to_string()));
    assert_eq!(users[1]["id"], json!(brian.id.to_string()));
    assert_eq!(users[2]["id"], json!(cleo.id.to_string()));
    let post_counts: Vec<usize> = users
        .iter()
        .map(|user| user["posts"].as_array().unwrap().len())
        .collect();
    assert_eq!(post_counts, vec![2, 0, 1]);
}

#[tokio::test]
async fn aliased_duplicate_selection_does_not_double_the_fetch() {
    let store = Arc::new(CountingStore::default());
    let ada = user(&store, "ada").await;
    post(&store, &ada, "a1").await;

    let schema = Schema::new(store.clone());
    let response = schema
        .execute(Request::new(
            "{ a: users { id posts { id } } b: users { id posts { id } } }",
        ))
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(store.posts_by_author_calls().len(), 1);

    let data = response.data.unwrap();
    assert_eq!(data["a"], data["b"]);
}

#[tokio::test]
async fn each_nesting_level_batches_once() {
    let store = Arc::new(CountingStore::with_member_types());
    for name in ["ada", "brian", "cleo"] {
        let owner = user(&store, name).await;
        store
            .create_profile(NewProfile {
                is_male: false,
                year_of_birth: 1990,
                user_id: owner.id,
                member_type_id: Some(rookery_storage::MemberTypeId::Basic),
            })
            .await
            .unwrap();
    }

    let schema = Schema::new(store.clone());
    let response = schema
        .execute(Request::new("{ users { profile { memberType { id discount } } } }"))
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(store.profiles_by_user_ids_calls(), 1);
    assert_eq!(store.member_types_by_ids_calls(), 1);
}

#[tokio::test]
async fn subscription_directions_share_one_association_prefetch() {
    let store = Arc::new(CountingStore::default());
    let a = user(&store, "a").await;
    let b = user(&store, "b").await;
    let c = user(&store, "c").await;
    store.subscribe(a.id, b.id).await.unwrap();
    store.subscribe(c.id, b.id).await.unwrap();
    store.subscribe(b.id, a.id).await.unwrap();

    let schema = Schema::new(store.clone());
    let response = schema
        .execute(Request::new(
            "{ users { id userSubscribedTo { id } subscribedToUser { id } } }",
        ))
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    // Both directions joined from a single association fetch, plus one
    // bulk user fetch per direction.
    assert_eq!(store.subscriptions_calls(), 1);
    assert_eq!(store.users_by_ids_calls(), 2);

    let data = response.data.unwrap();
    let users = data["users"].as_array().unwrap();
    let ids = |value: &serde_json::Value| -> Vec<String> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|user| user["id"].as_str().unwrap().to_string())
            .collect()
    };
    // a follows b; b follows a and is followed by a and c; c follows b.
    assert_eq!(ids(&users[0]["userSubscribedTo"]), vec![b.id.to_string()]);
    assert_eq!(ids(&users[1]["subscribedToUser"]), vec![a.id.to_string(), c.id.to_string()]);
    assert_eq!(ids(&users[2]["userSubscribedTo"]), vec![b.id.to_string()]);
    assert!(ids(&users[2]["subscribedToUser"]).is_empty());
}

#[tokio::test]
async fn batch_failure_fans_out_without_hurting_sibling_sites() {
    let store = Arc::new(CountingStore::with_member_types());
    let ada = user(&store, "ada").await;
    let brian = user(&store, "brian").await;
    store
        .create_profile(NewProfile {
            is_male: true,
            year_of_birth: 1990,
            user_id: ada.id,
            member_type_id: Some(rookery_storage::MemberTypeId::Basic),
        })
        .await
        .unwrap();
    store.fail_posts_by_author_ids();

    let schema = Schema::new(store.clone());
    let response = schema
        .execute(Request::new("{ users { id posts { id } profile { id } } }"))
        .await;

    // Every caller of the failed batch gets the error; one per parent.
    assert_eq!(response.errors.len(), 2);
    for error in &response.errors {
        assert!(error.message.contains("storage backend unavailable"), "{error:?}");
        assert_eq!(error.path[0], PathSegment::Field("users".into()));
        assert_eq!(error.path[2], PathSegment::Field("posts".into()));
    }

    // The sibling profile site still produced data.
    let data = response.data.unwrap();
    let users = data["users"].as_array().unwrap();
    assert_eq!(users[0]["id"], json!(ada.id.to_string()));
    assert!(users[0]["posts"].is_null());
    assert!(users[0]["profile"]["id"].as_str().is_some());
    assert_eq!(users[1]["id"], json!(brian.id.to_string()));
    assert!(users[1]["profile"].is_null());
}

#[tokio::test]
async fn requests_share_no_loaders_or_cached_values() {
    let store = Arc::new(CountingStore::default());
    let ada = user(&store, "ada").await;
    post(&store, &ada, "a1").await;

    let schema = Schema::new(store.clone());
    let query = "{ users { id posts { id } } }";

    let first = schema.execute(Request::new(query)).await;
    assert!(first.errors.is_empty());
    assert_eq!(store.posts_by_author_calls().len(), 1);

    // A write between requests is visible to the next request: nothing was
    // cached beyond the first request's lifetime.
    post(&store, &ada, "a2").await;

    let second = schema.execute(Request::new(query)).await;
    assert!(second.errors.is_empty());
    assert_eq!(store.posts_by_author_calls().len(), 2);

    let posts = |response: &rookery_engine::Response| {
        response.data.as_ref().unwrap()["users"][0]["posts"]
            .as_array()
            .unwrap()
            .len()
    };
    assert_eq!(posts(&first), 1);
    assert_eq!(posts(&second), 2);
}

#[tokio::test]
async fn concurrent_requests_batch_independently() {
    let store = Arc::new(CountingStore::default());
    let ada = user(&store, "ada").await;
    post(&store, &ada, "a1").await;

    let schema = Schema::new(store.clone());
    let query = "{ users { id posts { id } } }";

    let (first, second) = tokio::join!(schema.execute(Request::new(query)), schema.execute(Request::new(query)));

    assert!(first.errors.is_empty());
    assert!(second.errors.is_empty());
    // One bulk fetch each: concurrent requests never share a loader.
    assert_eq!(store.posts_by_author_calls().len(), 2);
}
