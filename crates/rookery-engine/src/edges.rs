/// A relation traversal site: one of the finite set of edges the schema can
/// follow from a parent entity.
///
/// The edge value is the batch-site identity. Every resolution of the same
/// relation anywhere in a request shares the loader registered under its
/// edge, while different relations never collide — "author of post A" and
/// "author of post B" coalesce, "posts of user" and "subscribers of user"
/// stay apart. Identity is static query-shape data; it never depends on the
/// key being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationEdge {
    /// `User.profile`, one-to-one via `Profile.userId`.
    ProfileOfUser,
    /// `User.posts`, one-to-many via `Post.authorId`.
    PostsOfUser,
    /// `Post.author`, many-to-one via `Post.authorId`.
    AuthorOfPost,
    /// `Profile.memberType`, many-to-one primary-key lookup.
    MemberTypeOfProfile,
    /// `User.userSubscribedTo`: the authors this user follows.
    SubscribedToOfUser,
    /// `User.subscribedToUser`: the subscribers this user has.
    SubscribersOfUser,
}

impl RelationEdge {
    /// The edge behind `field` on the parent type, if that field is a
    /// relation at all.
    pub fn of(parent_type: &str, field: &str) -> Option<Self> {
        match (parent_type, field) {
            ("User", "profile") => Some(RelationEdge::ProfileOfUser),
            ("User", "posts") => Some(RelationEdge::PostsOfUser),
            ("User", "userSubscribedTo") => Some(RelationEdge::SubscribedToOfUser),
            ("User", "subscribedToUser") => Some(RelationEdge::SubscribersOfUser),
            ("Post", "author") => Some(RelationEdge::AuthorOfPost),
            ("Profile", "memberType") => Some(RelationEdge::MemberTypeOfProfile),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RelationEdge::ProfileOfUser => "user.profile",
            RelationEdge::PostsOfUser => "user.posts",
            RelationEdge::AuthorOfPost => "post.author",
            RelationEdge::MemberTypeOfProfile => "profile.memberType",
            RelationEdge::SubscribedToOfUser => "user.userSubscribedTo",
            RelationEdge::SubscribersOfUser => "user.subscribedToUser",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_relation_same_site() {
        assert_eq!(RelationEdge::of("User", "posts"), RelationEdge::of("User", "posts"));
    }

    #[test]
    fn different_relations_never_merge() {
        let posts = RelationEdge::of("User", "posts").unwrap();
        let subscribers = RelationEdge::of("User", "subscribedToUser").unwrap();
        assert_ne!(posts, subscribers);
        // Same target kind, different edge: still distinct sites.
        let author = RelationEdge::of("Post", "author").unwrap();
        assert_ne!(author, RelationEdge::of("User", "userSubscribedTo").unwrap());
    }

    #[test]
    fn scalars_are_not_edges() {
        assert_eq!(RelationEdge::of("User", "name"), None);
        assert_eq!(RelationEdge::of("Post", "authorId"), None);
    }
}
