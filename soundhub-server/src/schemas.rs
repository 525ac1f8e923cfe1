use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use soundhub_catalog::{
    AlbumChanges, AlbumForm, PageRequest, PlaylistChanges, PlaylistForm, PrimaryKey,
    ProfileChanges, TrackChanges, TrackFilter, TrackForm,
};
use soundhub_core::UploadedFile;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::errors::{ServerError, ServerResult};

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterSchema {
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginSchema {
    #[validate(length(max = 254))]
    pub email: String,
    #[validate(length(max = 128))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleLoginSchema {
    #[validate(email, length(max = 254))]
    pub email: String,
    /// The ID token handed out by Google Sign-In
    #[validate(length(min = 1))]
    pub token: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenreSchema {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentSchema {
    #[validate(length(min = 1, max = 1024))]
    pub text: String,
}

/// Pagination and filters of a track listing
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TrackQuery {
    /// 1-based page number
    pub page: Option<u32>,
    /// Defaults to 20, at most 100
    pub page_size: Option<u32>,
    pub name: Option<String>,
    /// Username of the author
    pub username: Option<String>,
    /// Name of the album
    pub album: Option<String>,
    /// Name of a genre
    pub genre: Option<String>,
}

impl TrackQuery {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(Self::DEFAULT_PAGE_SIZE)
            .clamp(1, Self::MAX_PAGE_SIZE)
    }

    pub fn page_request(&self) -> PageRequest {
        PageRequest::page(self.page(), self.page_size())
    }

    pub fn filter(&self) -> TrackFilter {
        TrackFilter {
            name: self.name.clone(),
            username: self.username.clone(),
            album: self.album.clone(),
            genre: self.genre.clone(),
            ..Default::default()
        }
    }
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;

        extracted_json.0.validate().map_err(invalid)?;

        Ok(Self(extracted_json.0))
    }
}

fn invalid(errors: validator::ValidationErrors) -> ServerError {
    ServerError::BadRequest(format!("Request body is invalid: {}", errors))
}

/// The text fields and files of a multipart body, by field name
pub struct MultipartFields {
    texts: HashMap<String, Vec<String>>,
    files: HashMap<String, UploadedFile>,
}

#[async_trait]
impl<S> FromRequest<S> for MultipartFields
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;

        let mut texts: HashMap<String, Vec<String>> = HashMap::new();
        let mut files = HashMap::new();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content = field.bytes().await?;

                    // Browsers send an empty part when no file was picked
                    if filename.is_empty() && content.is_empty() {
                        continue;
                    }

                    files.insert(name, UploadedFile::new(filename, content));
                }
                None => {
                    let value = field.text().await?;
                    texts.entry(name).or_default().push(value);
                }
            }
        }

        Ok(Self { texts, files })
    }
}

impl MultipartFields {
    pub fn text(&mut self, name: &str) -> Option<String> {
        self.texts.remove(name).and_then(|v| v.into_iter().last())
    }

    pub fn file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    pub fn flag(&mut self, name: &str) -> ServerResult<Option<bool>> {
        let Some(value) = self.text(name) else {
            return Ok(None);
        };

        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(Some(true)),
            "false" | "0" | "off" | "no" => Ok(Some(false)),
            _ => Err(ServerError::BadRequest(format!(
                "{} must be true or false",
                name
            ))),
        }
    }

    /// An optional reference. An empty value clears it.
    pub fn reference(&mut self, name: &str) -> ServerResult<Option<Option<PrimaryKey>>> {
        match self.text(name) {
            None => Ok(None),
            Some(value) if value.trim().is_empty() => Ok(Some(None)),
            Some(value) => parse_id(name, &value).map(|id| Some(Some(id))),
        }
    }

    /// A list of ids, given as repeated fields, comma separated values, or both
    pub fn ids(&mut self, name: &str) -> ServerResult<Option<Vec<PrimaryKey>>> {
        let Some(values) = self.texts.remove(name) else {
            return Ok(None);
        };

        values
            .iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| parse_id(name, v))
            .collect::<ServerResult<Vec<_>>>()
            .map(Some)
    }
}

fn parse_id(name: &str, value: &str) -> ServerResult<PrimaryKey> {
    value
        .trim()
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("{} must contain ids", name)))
}

fn required(name: &'static str, value: Option<String>) -> ServerResult<String> {
    value.ok_or_else(|| ServerError::BadRequest(format!("{} is required", name)))
}

#[derive(Debug, ToSchema, Validate)]
pub struct ProfileUpload {
    #[validate(length(max = 64))]
    pub country: Option<String>,
    #[validate(length(max = 64))]
    pub city: Option<String>,
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub avatar: Option<UploadedFile>,
}

impl ProfileUpload {
    pub fn parse(mut fields: MultipartFields) -> ServerResult<Self> {
        let upload = Self {
            country: fields.text("country"),
            city: fields.text("city"),
            bio: fields.text("bio"),
            avatar: fields.file("avatar"),
        };

        upload.validate().map_err(invalid)?;
        Ok(upload)
    }

    pub fn into_changes(self) -> ProfileChanges {
        ProfileChanges {
            country: self.country,
            city: self.city,
            bio: self.bio,
            avatar: self.avatar,
        }
    }
}

#[derive(Debug, ToSchema, Validate)]
pub struct AlbumUpload {
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub private: Option<bool>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub cover: Option<UploadedFile>,
}

impl AlbumUpload {
    pub fn parse(mut fields: MultipartFields) -> ServerResult<Self> {
        let upload = Self {
            name: fields.text("name"),
            description: fields.text("description"),
            private: fields.flag("private")?,
            cover: fields.file("cover"),
        };

        upload.validate().map_err(invalid)?;
        Ok(upload)
    }

    pub fn into_form(self) -> ServerResult<AlbumForm> {
        Ok(AlbumForm {
            name: required("name", self.name)?,
            description: self.description.unwrap_or_default(),
            private: self.private.unwrap_or_default(),
            cover: self.cover,
        })
    }

    pub fn into_changes(self) -> AlbumChanges {
        AlbumChanges {
            name: self.name,
            description: self.description,
            private: self.private,
            cover: self.cover,
        }
    }
}

#[derive(Debug, ToSchema, Validate)]
pub struct TrackUpload {
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,
    /// Empty to take the track out of its album
    #[schema(value_type = Option<i32>)]
    pub album_id: Option<Option<PrimaryKey>>,
    /// Comma separated, or the field repeated
    pub genre_ids: Option<Vec<PrimaryKey>>,
    pub private: Option<bool>,
    /// The audio, an mp3 file
    #[schema(value_type = Option<String>, format = Binary)]
    pub file: Option<UploadedFile>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub cover: Option<UploadedFile>,
}

impl TrackUpload {
    pub fn parse(mut fields: MultipartFields) -> ServerResult<Self> {
        let upload = Self {
            name: fields.text("name"),
            album_id: fields.reference("album_id")?,
            genre_ids: fields.ids("genre_ids")?,
            private: fields.flag("private")?,
            file: fields.file("file"),
            cover: fields.file("cover"),
        };

        upload.validate().map_err(invalid)?;
        Ok(upload)
    }

    pub fn into_form(self) -> ServerResult<TrackForm> {
        let file = self
            .file
            .ok_or_else(|| ServerError::BadRequest("file is required".to_string()))?;

        Ok(TrackForm {
            name: required("name", self.name)?,
            album_id: self.album_id.flatten(),
            genre_ids: self.genre_ids.unwrap_or_default(),
            private: self.private.unwrap_or_default(),
            file,
            cover: self.cover,
        })
    }

    pub fn into_changes(self) -> TrackChanges {
        TrackChanges {
            name: self.name,
            album_id: self.album_id,
            genre_ids: self.genre_ids,
            private: self.private,
            file: self.file,
            cover: self.cover,
        }
    }
}

#[derive(Debug, ToSchema, Validate)]
pub struct PlaylistUpload {
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,
    pub private: Option<bool>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub cover: Option<UploadedFile>,
    /// In playlist order, comma separated or the field repeated
    pub track_ids: Option<Vec<PrimaryKey>>,
}

impl PlaylistUpload {
    pub fn parse(mut fields: MultipartFields) -> ServerResult<Self> {
        let upload = Self {
            name: fields.text("name"),
            private: fields.flag("private")?,
            cover: fields.file("cover"),
            track_ids: fields.ids("track_ids")?,
        };

        upload.validate().map_err(invalid)?;
        Ok(upload)
    }

    pub fn into_form(self) -> ServerResult<PlaylistForm> {
        Ok(PlaylistForm {
            name: required("name", self.name)?,
            private: self.private.unwrap_or_default(),
            cover: self.cover,
            track_ids: self.track_ids.unwrap_or_default(),
        })
    }

    pub fn into_changes(self) -> PlaylistChanges {
        PlaylistChanges {
            name: self.name,
            private: self.private,
            cover: self.cover,
            track_ids: self.track_ids,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fields(texts: &[(&str, &str)]) -> MultipartFields {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in texts {
            map.entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }

        MultipartFields {
            texts: map,
            files: HashMap::new(),
        }
    }

    #[test]
    fn page_size_is_clamped() {
        let query = TrackQuery {
            page: Some(0),
            page_size: Some(1000),
            ..Default::default()
        };

        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(), TrackQuery::MAX_PAGE_SIZE);
        assert_eq!(TrackQuery::default().page_size(), 20);
    }

    #[test]
    fn ids_accept_lists_and_repeats() {
        let mut fields = fields(&[("track_ids", "3, 1"), ("track_ids", "2")]);

        assert_eq!(fields.ids("track_ids").unwrap(), Some(vec![3, 1, 2]));
        assert_eq!(fields.ids("track_ids").unwrap(), None);
    }

    #[test]
    fn empty_references_clear() {
        let mut fields = fields(&[("album_id", ""), ("other", "7")]);

        assert_eq!(fields.reference("album_id").unwrap(), Some(None));
        assert_eq!(fields.reference("other").unwrap(), Some(Some(7)));
        assert_eq!(fields.reference("missing").unwrap(), None);
    }

    #[test]
    fn tracks_need_audio_and_a_name() {
        let upload = TrackUpload::parse(fields(&[("name", "Intro")])).unwrap();
        assert!(matches!(upload.into_form(), Err(ServerError::BadRequest(_))));

        let too_long = "x".repeat(257);
        let result = AlbumUpload::parse(fields(&[("name", too_long.as_str())]));
        assert!(matches!(result, Err(ServerError::BadRequest(_))));
    }

    #[test]
    fn flags_must_be_booleans() {
        let mut fields = fields(&[("private", "maybe"), ("public", "on")]);

        assert!(fields.flag("private").is_err());
        assert_eq!(fields.flag("public").unwrap(), Some(true));
    }
}
