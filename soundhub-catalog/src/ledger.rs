use std::collections::HashSet;

use log::info;

use crate::{
    CatalogContext, CatalogError, CatalogResult, DatabaseError, FollowData, NewFollow,
    PrimaryKey, UserData,
};

/// A user in a follow listing, as seen by the viewer
#[derive(Debug, Clone)]
pub struct Subscription {
    pub user: UserData,
    /// Whether the viewer follows this user too
    pub is_subscribed: bool,
}

/// Keeps track of who follows whom. A user follows another at most once, and never themselves.
pub struct SubscriptionLedger {
    context: CatalogContext,
}

impl SubscriptionLedger {
    pub fn new(context: &CatalogContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn follow(
        &self,
        follower: &UserData,
        followee_id: PrimaryKey,
    ) -> CatalogResult<FollowData> {
        if follower.id == followee_id {
            return Err(CatalogError::Invalid("You cannot follow yourself".to_string()));
        }

        let db = &self.context.database;
        let followee = db.user_by_id(followee_id).await?;

        let follow = db
            .create_follow(NewFollow {
                follower_id: follower.id,
                followee_id: followee.id,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict { .. } => {
                    CatalogError::Invalid(format!("You already follow {}", followee.username))
                }
                e => e.into(),
            })?;

        info!("{} now follows {}", follower.username, followee.username);
        Ok(follow)
    }

    /// Removes the requester's follow of someone
    pub async fn unfollow(
        &self,
        follower: &UserData,
        followee_id: PrimaryKey,
    ) -> CatalogResult<()> {
        self.context
            .database
            .delete_follow(follower.id, followee_id)
            .await?;

        info!("{} unfollowed {}", follower.username, followee_id);
        Ok(())
    }

    pub async fn is_following(
        &self,
        follower_id: PrimaryKey,
        followee_id: PrimaryKey,
    ) -> CatalogResult<bool> {
        match self
            .context
            .database
            .follow_by_pair(follower_id, followee_id)
            .await
        {
            Ok(_) => Ok(true),
            Err(DatabaseError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// The users `user_id` follows, oldest follow first
    pub async fn list_subscriptions(
        &self,
        user_id: PrimaryKey,
        viewer: Option<&UserData>,
    ) -> CatalogResult<Vec<Subscription>> {
        let db = &self.context.database;
        let user = db.user_by_id(user_id).await?;
        let users = db.list_following(user.id).await?;

        self.annotate(users, viewer).await
    }

    /// The users following `user_id`, oldest follow first
    pub async fn list_followers(
        &self,
        user_id: PrimaryKey,
        viewer: Option<&UserData>,
    ) -> CatalogResult<Vec<Subscription>> {
        let db = &self.context.database;
        let user = db.user_by_id(user_id).await?;
        let users = db.list_followers(user.id).await?;

        self.annotate(users, viewer).await
    }

    async fn annotate(
        &self,
        users: Vec<UserData>,
        viewer: Option<&UserData>,
    ) -> CatalogResult<Vec<Subscription>> {
        let followed_by_viewer: HashSet<_> = match viewer {
            Some(viewer) => self
                .context
                .database
                .list_following(viewer.id)
                .await?
                .into_iter()
                .map(|u| u.id)
                .collect(),
            None => HashSet::new(),
        };

        Ok(users
            .into_iter()
            .map(|user| Subscription {
                is_subscribed: followed_by_viewer.contains(&user.id),
                user,
            })
            .collect())
    }
}

#[cfg(test)]
mod test {
    use crate::fixtures::{catalog, user};

    use super::*;

    #[tokio::test]
    async fn following_twice_is_rejected() {
        let fixture = catalog();
        let alice = user(&fixture, "alice").await;
        let bob = user(&fixture, "bob").await;
        let ledger = &fixture.catalog.ledger;

        ledger.follow(&alice, bob.id).await.unwrap();

        assert!(matches!(
            ledger.follow(&alice, bob.id).await,
            Err(CatalogError::Invalid(_))
        ));
        assert!(ledger.is_following(alice.id, bob.id).await.unwrap());
        assert!(!ledger.is_following(bob.id, alice.id).await.unwrap());
    }

    #[tokio::test]
    async fn following_yourself_is_rejected() {
        let fixture = catalog();
        let alice = user(&fixture, "alice").await;

        assert!(matches!(
            fixture.catalog.ledger.follow(&alice, alice.id).await,
            Err(CatalogError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn following_unknown_users_is_not_found() {
        let fixture = catalog();
        let alice = user(&fixture, "alice").await;

        assert!(matches!(
            fixture.catalog.ledger.follow(&alice, 999).await,
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unfollowing_removes_the_edge() {
        let fixture = catalog();
        let alice = user(&fixture, "alice").await;
        let bob = user(&fixture, "bob").await;
        let ledger = &fixture.catalog.ledger;

        assert!(matches!(
            ledger.unfollow(&alice, bob.id).await,
            Err(CatalogError::NotFound { .. })
        ));

        ledger.follow(&alice, bob.id).await.unwrap();
        ledger.unfollow(&alice, bob.id).await.unwrap();

        assert!(!ledger.is_following(alice.id, bob.id).await.unwrap());
        assert!(matches!(
            ledger.unfollow(&alice, bob.id).await,
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn listings_are_annotated_for_the_viewer() {
        let fixture = catalog();
        let alice = user(&fixture, "alice").await;
        let bob = user(&fixture, "bob").await;
        let carol = user(&fixture, "carol").await;
        let dave = user(&fixture, "dave").await;
        let ledger = &fixture.catalog.ledger;

        ledger.follow(&alice, carol.id).await.unwrap();
        ledger.follow(&alice, bob.id).await.unwrap();
        ledger.follow(&dave, bob.id).await.unwrap();

        let seen_by_dave: Vec<_> = ledger
            .list_subscriptions(alice.id, Some(&dave))
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.user.username, s.is_subscribed))
            .collect();

        assert_eq!(
            seen_by_dave,
            vec![("carol".to_string(), false), ("bob".to_string(), true)]
        );

        let anonymous = ledger.list_subscriptions(alice.id, None).await.unwrap();
        assert!(anonymous.iter().all(|s| !s.is_subscribed));

        let followers: Vec<_> = ledger
            .list_followers(bob.id, Some(&alice))
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.user.username)
            .collect();
        assert_eq!(followers, vec!["alice", "dave"]);
    }

    #[tokio::test]
    async fn deleted_users_leave_no_edges() {
        let fixture = catalog();
        let alice = user(&fixture, "alice").await;
        let bob = user(&fixture, "bob").await;
        let ledger = &fixture.catalog.ledger;

        ledger.follow(&alice, bob.id).await.unwrap();
        fixture.catalog.users.delete_account(&bob).await.unwrap();

        assert!(ledger
            .list_subscriptions(alice.id, None)
            .await
            .unwrap()
            .is_empty());
    }
}
