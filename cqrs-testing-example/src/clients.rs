use cqrs_host::{HttpClient, HttpError, TypedHttpClient};

/// Name of the untyped client used for posts.
pub const POSTS_CLIENT: &str = "posts";

/// Comments API, relative to `Comments:BaseUrl`.
#[derive(Debug, Clone)]
pub struct CommentsClient {
    client: HttpClient,
}

impl TypedHttpClient for CommentsClient {
    fn from_client(client: HttpClient) -> Self {
        Self { client }
    }
}

impl CommentsClient {
    pub async fn get_comments(&self) -> Result<String, HttpError> {
        self.client.get_string("comments").await
    }

    pub async fn get_comment(&self, comment_id: &str) -> Result<String, HttpError> {
        self.client
            .get_string(&format!("comments/{comment_id}"))
            .await
    }
}

/// Reads a single integer from `Values:BaseUrl`.
#[derive(Debug, Clone)]
pub struct ValueClient {
    client: HttpClient,
}

impl TypedHttpClient for ValueClient {
    fn from_client(client: HttpClient) -> Self {
        Self { client }
    }
}

impl ValueClient {
    pub async fn get_value(&self) -> Result<i64, HttpError> {
        self.client.get_json("value").await
    }
}
