use log::info;
use soundhub_core::{AssetKind, UploadedFile};

use crate::{
    ensure_owner, is_visible, AlbumData, CatalogContext, CatalogError, CatalogResult, NewAlbum,
    PrimaryKey, UpdatedAlbum, UserData,
};

#[derive(Debug)]
pub struct AlbumForm {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub cover: Option<UploadedFile>,
}

/// Changes to an album. Fields left as [None] are kept.
#[derive(Debug, Default)]
pub struct AlbumChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub private: Option<bool>,
    pub cover: Option<UploadedFile>,
}

pub struct Albums {
    context: CatalogContext,
}

impl Albums {
    pub fn new(context: &CatalogContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Every album of the requester, private ones included
    pub async fn list_own(&self, requester: &UserData) -> CatalogResult<Vec<AlbumData>> {
        Ok(self.context.database.list_albums(requester.id, true).await?)
    }

    /// The public albums of an author
    pub async fn list_public(&self, user_id: PrimaryKey) -> CatalogResult<Vec<AlbumData>> {
        let db = &self.context.database;
        let _ = db.user_by_id(user_id).await?;

        Ok(db.list_albums(user_id, false).await?)
    }

    pub async fn get(
        &self,
        album_id: PrimaryKey,
        requester: Option<&UserData>,
    ) -> CatalogResult<AlbumData> {
        let album = self.context.database.album_by_id(album_id).await?;

        match is_visible(album.user_id, album.private, requester) {
            true => Ok(album),
            false => Err(CatalogError::not_found("album", "id")),
        }
    }

    pub async fn create(&self, requester: &UserData, form: AlbumForm) -> CatalogResult<AlbumData> {
        let files = &self.context.files;

        if let Some(cover) = &form.cover {
            files.validate(AssetKind::AlbumCover, cover)?;
        }

        let cover = match &form.cover {
            Some(cover) => Some(
                files
                    .store(
                        AssetKind::AlbumCover,
                        &requester.username,
                        Some(form.name.as_str()),
                        cover,
                    )
                    .await?,
            ),
            None => None,
        };

        let result = self
            .context
            .database
            .create_album(NewAlbum {
                user_id: requester.id,
                name: form.name,
                description: form.description,
                private: form.private,
                cover: cover.clone(),
            })
            .await;

        match result {
            Ok(album) => {
                info!("Album {} created by {}", album.id, requester.username);
                Ok(album)
            }
            Err(e) => {
                files.discard(cover.as_deref(), None).await;
                Err(e.into())
            }
        }
    }

    pub async fn update(
        &self,
        requester: &UserData,
        album_id: PrimaryKey,
        changes: AlbumChanges,
    ) -> CatalogResult<AlbumData> {
        let files = &self.context.files;
        let album = self.get(album_id, Some(requester)).await?;
        ensure_owner(album.user_id, requester, "Only the owner can change this album")?;

        if let Some(cover) = &changes.cover {
            files.validate(AssetKind::AlbumCover, cover)?;
        }

        let name = changes.name.as_deref().unwrap_or(&album.name);
        let new_cover = match &changes.cover {
            Some(cover) => Some(
                files
                    .store(AssetKind::AlbumCover, &requester.username, Some(name), cover)
                    .await?,
            ),
            None => None,
        };

        let result = self
            .context
            .database
            .update_album(UpdatedAlbum {
                id: album.id,
                name: changes.name,
                description: changes.description,
                private: changes.private,
                cover: new_cover.clone(),
            })
            .await;

        match result {
            Ok(updated) => {
                files
                    .reclaim_replaced(album.cover.as_deref(), new_cover.as_deref())
                    .await;
                Ok(updated)
            }
            Err(e) => {
                files
                    .discard(new_cover.as_deref(), album.cover.as_deref())
                    .await;
                Err(e.into())
            }
        }
    }

    pub async fn delete(&self, requester: &UserData, album_id: PrimaryKey) -> CatalogResult<()> {
        let album = self.get(album_id, Some(requester)).await?;
        ensure_owner(album.user_id, requester, "Only the owner can delete this album")?;

        self.context.database.delete_album(album.id).await?;

        if let Some(cover) = &album.cover {
            self.context.files.reclaim(cover).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use soundhub_core::Storage;

    use crate::fixtures::{catalog, jpeg, png, user};

    use super::*;

    fn form(name: &str, private: bool, cover: Option<UploadedFile>) -> AlbumForm {
        AlbumForm {
            name: name.to_string(),
            description: "Recorded at home".to_string(),
            private,
            cover,
        }
    }

    #[tokio::test]
    async fn replacing_a_cover_reclaims_the_old_one() {
        let fixture = catalog();
        let bob = user(&fixture, "bob").await;
        let albums = &fixture.catalog.albums;

        let album = albums
            .create(&bob, form("Summer", false, Some(png("x.png"))))
            .await
            .unwrap();
        assert_eq!(album.cover.as_deref(), Some("album/bob/Summer.png"));

        let updated = albums
            .update(
                &bob,
                album.id,
                AlbumChanges {
                    cover: Some(jpeg("y.jpg")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.cover.as_deref(), Some("album/bob/Summer.jpg"));
        assert!(!fixture.storage.exists("album/bob/Summer.png").await.unwrap());
        assert!(fixture.storage.exists("album/bob/Summer.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn same_path_replacement_keeps_the_new_bytes() {
        let fixture = catalog();
        let bob = user(&fixture, "bob").await;
        let albums = &fixture.catalog.albums;

        let album = albums
            .create(&bob, form("Summer", false, Some(png("x.png"))))
            .await
            .unwrap();

        let replacement = UploadedFile::new("z.png", b"\x89PNG\r\n\x1a\nnew bytes".to_vec());
        albums
            .update(
                &bob,
                album.id,
                AlbumChanges {
                    cover: Some(replacement.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            fixture.storage.get("album/bob/Summer.png"),
            Some(replacement.content)
        );
    }

    #[tokio::test]
    async fn only_the_owner_changes_an_album() {
        let fixture = catalog();
        let bob = user(&fixture, "bob").await;
        let eve = user(&fixture, "eve").await;
        let albums = &fixture.catalog.albums;

        let album = albums.create(&bob, form("Summer", false, None)).await.unwrap();

        let result = albums
            .update(
                &eve,
                album.id,
                AlbumChanges {
                    name: Some("Mine now".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(CatalogError::Forbidden(_))));

        assert!(matches!(
            albums.delete(&eve, album.id).await,
            Err(CatalogError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn private_albums_are_hidden_from_others() {
        let fixture = catalog();
        let bob = user(&fixture, "bob").await;
        let eve = user(&fixture, "eve").await;
        let albums = &fixture.catalog.albums;

        let hidden = albums.create(&bob, form("Drafts", true, None)).await.unwrap();
        albums.create(&bob, form("Live", false, None)).await.unwrap();

        assert!(albums.get(hidden.id, Some(&bob)).await.is_ok());
        assert!(matches!(
            albums.get(hidden.id, Some(&eve)).await,
            Err(CatalogError::NotFound { .. })
        ));

        let public: Vec<_> = albums
            .list_public(bob.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(public, vec!["Live"]);
        assert_eq!(albums.list_own(&bob).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleting_an_album_reclaims_its_cover() {
        let fixture = catalog();
        let bob = user(&fixture, "bob").await;
        let albums = &fixture.catalog.albums;

        let album = albums
            .create(&bob, form("Summer", false, Some(png("x.png"))))
            .await
            .unwrap();

        albums.delete(&bob, album.id).await.unwrap();
        assert!(fixture.storage.paths().is_empty());
    }
}
