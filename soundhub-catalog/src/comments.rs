use crate::{
    ensure_owner, tracks::ensure_track_visible, CatalogContext, CatalogError, CatalogResult,
    CommentData, NewComment, PrimaryKey, UserData,
};

pub struct Comments {
    context: CatalogContext,
}

impl Comments {
    pub const MAX_LENGTH: usize = 1024;

    pub fn new(context: &CatalogContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Comments on a track the requester can see, oldest first
    pub async fn list_for_track(
        &self,
        track_id: PrimaryKey,
        requester: Option<&UserData>,
    ) -> CatalogResult<Vec<CommentData>> {
        let db = &self.context.database;
        let track = db.track_by_id(track_id).await?;
        ensure_track_visible(&self.context, &track, requester).await?;

        Ok(db.list_comments_by_track(track.id).await?)
    }

    /// Comments written by the requester
    pub async fn list_own(&self, requester: &UserData) -> CatalogResult<Vec<CommentData>> {
        Ok(self
            .context
            .database
            .list_comments_by_user(requester.id)
            .await?)
    }

    pub async fn create(
        &self,
        requester: &UserData,
        track_id: PrimaryKey,
        text: String,
    ) -> CatalogResult<CommentData> {
        check_text(&text)?;

        let db = &self.context.database;
        let track = db.track_by_id(track_id).await?;
        ensure_track_visible(&self.context, &track, Some(requester)).await?;

        Ok(db
            .create_comment(NewComment {
                user_id: requester.id,
                track_id: track.id,
                text,
            })
            .await?)
    }

    pub async fn update(
        &self,
        requester: &UserData,
        comment_id: PrimaryKey,
        text: String,
    ) -> CatalogResult<CommentData> {
        check_text(&text)?;

        let db = &self.context.database;
        let comment = db.comment_by_id(comment_id).await?;
        ensure_owner(comment.user_id, requester, "Only the author can edit this comment")?;

        Ok(db.update_comment(comment.id, text).await?)
    }

    pub async fn delete(&self, requester: &UserData, comment_id: PrimaryKey) -> CatalogResult<()> {
        let db = &self.context.database;
        let comment = db.comment_by_id(comment_id).await?;
        ensure_owner(comment.user_id, requester, "Only the author can delete this comment")?;

        Ok(db.delete_comment(comment.id).await?)
    }
}

fn check_text(text: &str) -> CatalogResult<()> {
    let length = text.chars().count();

    if text.trim().is_empty() {
        return Err(CatalogError::Invalid("Comment cannot be empty".to_string()));
    }

    if length > Comments::MAX_LENGTH {
        return Err(CatalogError::Invalid(format!(
            "Comment cannot be longer than {} characters",
            Comments::MAX_LENGTH
        )));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use crate::fixtures::{catalog, mp3, user};
    use crate::TrackForm;

    use super::*;

    async fn setup() -> (crate::fixtures::Fixture, UserData, UserData, PrimaryKey) {
        let fixture = catalog();
        let bob = user(&fixture, "bob").await;
        let eve = user(&fixture, "eve").await;

        let track = fixture
            .catalog
            .tracks
            .create(
                &bob,
                TrackForm {
                    name: "Intro".to_string(),
                    album_id: None,
                    genre_ids: vec![],
                    private: false,
                    file: mp3("intro.mp3"),
                    cover: None,
                },
            )
            .await
            .unwrap();

        (fixture, bob, eve, track.id)
    }

    #[tokio::test]
    async fn comments_are_listed_oldest_first() {
        let (fixture, bob, eve, track_id) = setup().await;
        let comments = &fixture.catalog.comments;

        comments.create(&eve, track_id, "first!".to_string()).await.unwrap();
        comments.create(&bob, track_id, "thanks".to_string()).await.unwrap();

        let texts: Vec<_> = comments
            .list_for_track(track_id, None)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["first!", "thanks"]);

        assert_eq!(comments.list_own(&eve).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn comment_length_is_bounded() {
        let (fixture, _, eve, track_id) = setup().await;
        let comments = &fixture.catalog.comments;

        assert!(comments
            .create(&eve, track_id, "x".repeat(Comments::MAX_LENGTH))
            .await
            .is_ok());

        assert!(matches!(
            comments
                .create(&eve, track_id, "x".repeat(Comments::MAX_LENGTH + 1))
                .await,
            Err(CatalogError::Invalid(_))
        ));

        assert!(matches!(
            comments.create(&eve, track_id, "   ".to_string()).await,
            Err(CatalogError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn only_the_author_edits_a_comment() {
        let (fixture, bob, eve, track_id) = setup().await;
        let comments = &fixture.catalog.comments;

        let comment = comments
            .create(&eve, track_id, "nice".to_string())
            .await
            .unwrap();

        assert!(matches!(
            comments.update(&bob, comment.id, "mean".to_string()).await,
            Err(CatalogError::Forbidden(_))
        ));

        let edited = comments
            .update(&eve, comment.id, "very nice".to_string())
            .await
            .unwrap();
        assert_eq!(edited.text, "very nice");
        assert_eq!(edited.created_at, comment.created_at);

        comments.delete(&eve, comment.id).await.unwrap();
        assert!(comments.list_for_track(track_id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_track_removes_its_comments() {
        let (fixture, bob, eve, track_id) = setup().await;
        let comments = &fixture.catalog.comments;

        comments.create(&eve, track_id, "nice".to_string()).await.unwrap();
        fixture.catalog.tracks.delete(&bob, track_id).await.unwrap();

        assert!(comments.list_own(&eve).await.unwrap().is_empty());
    }
}
