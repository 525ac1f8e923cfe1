use log::info;
use soundhub_core::{AssetKind, UploadedFile};

use crate::{
    CatalogContext, CatalogError, CatalogResult, PageRequest, PrimaryKey, SubscriptionLedger,
    TrackFilter, UpdatedUser, UserData,
};

/// A user's profile as seen by someone
#[derive(Debug, Clone)]
pub struct Profile {
    pub user: UserData,
    /// Whether the viewer follows this user
    pub is_subscribed: bool,
}

/// Changes to a profile. Fields left as [None] are kept.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub country: Option<String>,
    pub city: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<UploadedFile>,
}

pub struct Users {
    context: CatalogContext,
}

impl Users {
    pub fn new(context: &CatalogContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Returns a user's public profile
    pub async fn profile(
        &self,
        user_id: PrimaryKey,
        viewer: Option<&UserData>,
    ) -> CatalogResult<Profile> {
        let user = self.context.database.user_by_id(user_id).await?;

        let is_subscribed = match viewer {
            Some(viewer) => {
                SubscriptionLedger::new(&self.context)
                    .is_following(viewer.id, user.id)
                    .await?
            }
            None => false,
        };

        Ok(Profile {
            user,
            is_subscribed,
        })
    }

    /// Edits the requester's own profile, replacing the avatar if one is given
    pub async fn update_profile(
        &self,
        requester: &UserData,
        changes: ProfileChanges,
    ) -> CatalogResult<UserData> {
        let files = &self.context.files;

        if let Some(avatar) = &changes.avatar {
            files.validate(AssetKind::Avatar, avatar)?;
        }

        let new_avatar = match &changes.avatar {
            Some(avatar) => Some(
                files
                    .store(AssetKind::Avatar, &requester.username, None, avatar)
                    .await?,
            ),
            None => None,
        };

        let result = self
            .context
            .database
            .update_user(UpdatedUser {
                id: requester.id,
                country: changes.country,
                city: changes.city,
                bio: changes.bio,
                avatar: new_avatar.clone(),
            })
            .await;

        let old_avatar = requester.avatar.as_deref();

        match result {
            Ok(user) => {
                files
                    .reclaim_replaced(old_avatar, new_avatar.as_deref())
                    .await;
                Ok(user)
            }
            Err(e) => {
                files.discard(new_avatar.as_deref(), old_avatar).await;
                Err(e.into())
            }
        }
    }

    /// Deletes an account along with everything it owns, including stored files
    pub async fn delete_account(&self, requester: &UserData) -> CatalogResult<()> {
        let db = &self.context.database;

        let user = db.user_by_id(requester.id).await?;
        let mut paths: Vec<String> = user.avatar.into_iter().collect();

        for album in db.list_albums(user.id, true).await? {
            paths.extend(album.cover);
        }

        for playlist in db.list_playlists(user.id, true).await? {
            paths.extend(playlist.cover);
        }

        let filter = TrackFilter {
            user_id: Some(user.id),
            ..Default::default()
        };

        for track in db.list_tracks(&filter, PageRequest::all()).await?.items {
            paths.push(track.file);
            paths.extend(track.cover);
        }

        db.delete_user(user.id).await?;
        info!("Deleted account {}", user.username);

        for path in paths {
            self.context.files.reclaim(&path).await;
        }

        Ok(())
    }

    /// Resolves a user by id, used when only an id is at hand
    pub async fn get(&self, user_id: PrimaryKey) -> CatalogResult<UserData> {
        self.context
            .database
            .user_by_id(user_id)
            .await
            .map_err(CatalogError::from)
    }
}
