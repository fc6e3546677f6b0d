use caldate_payloads::{
    ErrorBody, Photo, ProfileView, Success, UpdateProfile,
    posts::{NewPost, PostView},
    uploads::FILE_FIELD,
};
use reqwest::{
    Method, RequestBuilder, Response,
    multipart::{Form, Part},
};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{UploadFile, compress::CompressError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{message} ({status})")]
    Server { status: u16, message: String },

    #[error(transparent)]
    Compress(#[from] CompressError),

    #[error("An upload is already in progress")]
    Busy,

    #[error("Gallery is full")]
    GalleryFull,
}

#[derive(Deserialize)]
struct AvatarResponse {
    url: String,
}

#[derive(Deserialize)]
struct PhotoResponse {
    photo: Photo,
}

#[derive(Deserialize)]
struct PhotosResponse {
    photos: Vec<Photo>,
}

/// Signed-in access to the API; the token is a session JWT.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.base_url));

        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or_else(|_| {
                if text.is_empty() {
                    status.to_string()
                } else {
                    text
                }
            });
        debug!("Server answered {status}: {message}");

        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }

    fn file_form(file: UploadFile) -> Result<Form, ClientError> {
        let part = Part::bytes(file.bytes)
            .file_name(file.name)
            .mime_str(&file.content_type)?;

        Ok(Form::new().part(FILE_FIELD, part))
    }

    pub async fn profile(&self) -> Result<ProfileView, ClientError> {
        Self::read(self.request(Method::GET, "/api/profile").send().await?).await
    }

    pub async fn update_profile(&self, update: &UpdateProfile) -> Result<(), ClientError> {
        let response = self
            .request(Method::PATCH, "/api/profile")
            .json(update)
            .send()
            .await?;
        Self::read::<Success>(response).await.map(|_| ())
    }

    pub async fn public_profile(&self, handle: &str) -> Result<ProfileView, ClientError> {
        Self::read(
            self.request(Method::GET, &format!("/api/users/{handle}"))
                .send()
                .await?,
        )
        .await
    }

    pub async fn upload_avatar(&self, file: UploadFile) -> Result<String, ClientError> {
        let response = self
            .request(Method::POST, "/api/photos/avatar")
            .multipart(Self::file_form(file)?)
            .send()
            .await?;
        Self::read::<AvatarResponse>(response).await.map(|r| r.url)
    }

    pub async fn remove_avatar(&self) -> Result<(), ClientError> {
        let response = self
            .request(Method::DELETE, "/api/photos/avatar")
            .send()
            .await?;
        Self::read::<Success>(response).await.map(|_| ())
    }

    /// Newest first; [`ProfileView::photos`] has gallery order.
    pub async fn gallery(&self) -> Result<Vec<Photo>, ClientError> {
        let response = self
            .request(Method::GET, "/api/photos/gallery")
            .send()
            .await?;
        Self::read::<PhotosResponse>(response).await.map(|r| r.photos)
    }

    pub async fn upload_photo(&self, file: UploadFile) -> Result<Photo, ClientError> {
        let response = self
            .request(Method::POST, "/api/photos/gallery")
            .multipart(Self::file_form(file)?)
            .send()
            .await?;
        Self::read::<PhotoResponse>(response).await.map(|r| r.photo)
    }

    pub async fn remove_photo(&self, id: Uuid) -> Result<(), ClientError> {
        let response = self
            .request(Method::DELETE, "/api/photos/gallery")
            .query(&[("id", id.to_string())])
            .send()
            .await?;
        Self::read::<Success>(response).await.map(|_| ())
    }

    pub async fn posts(&self) -> Result<Vec<PostView>, ClientError> {
        Self::read(self.request(Method::GET, "/api/posts").send().await?).await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<PostView, ClientError> {
        let response = self
            .request(Method::POST, "/api/posts")
            .json(post)
            .send()
            .await?;
        Self::read(response).await
    }
}
