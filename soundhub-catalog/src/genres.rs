use log::info;

use crate::{CatalogContext, CatalogError, CatalogResult, GenreData, PrimaryKey, UserData};

/// Genres are reference data, only superusers may change them
pub struct Genres {
    context: CatalogContext,
}

impl Genres {
    pub fn new(context: &CatalogContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn list(&self) -> CatalogResult<Vec<GenreData>> {
        Ok(self.context.database.list_genres().await?)
    }

    pub async fn create(&self, requester: &UserData, name: &str) -> CatalogResult<GenreData> {
        ensure_superuser(requester)?;

        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::Invalid("Genre name cannot be empty".to_string()));
        }

        let genre = self.context.database.create_genre(name).await?;
        info!("Genre {} created by {}", genre.name, requester.username);

        Ok(genre)
    }

    pub async fn delete(&self, requester: &UserData, genre_id: PrimaryKey) -> CatalogResult<()> {
        ensure_superuser(requester)?;
        Ok(self.context.database.delete_genre(genre_id).await?)
    }
}

fn ensure_superuser(requester: &UserData) -> CatalogResult<()> {
    match requester.superuser {
        true => Ok(()),
        false => Err(CatalogError::Forbidden("Only superusers can manage genres")),
    }
}

#[cfg(test)]
mod test {
    use crate::fixtures::{catalog, user};
    use crate::DatabaseError;

    use super::*;

    #[tokio::test]
    async fn only_superusers_manage_genres() {
        let fixture = catalog();
        let alice = user(&fixture, "alice").await;
        let root = UserData {
            superuser: true,
            ..alice.clone()
        };

        let genres = &fixture.catalog.genres;

        assert!(matches!(
            genres.create(&alice, "Jazz").await,
            Err(CatalogError::Forbidden(_))
        ));

        let jazz = genres.create(&root, " Jazz ").await.unwrap();
        assert_eq!(jazz.name, "Jazz");

        assert!(matches!(
            genres.create(&root, "Jazz").await,
            Err(CatalogError::Db(DatabaseError::Conflict { .. }))
        ));

        assert!(matches!(
            genres.delete(&alice, jazz.id).await,
            Err(CatalogError::Forbidden(_))
        ));

        genres.delete(&root, jazz.id).await.unwrap();
        assert!(genres.list().await.unwrap().is_empty());
    }
}
