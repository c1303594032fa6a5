use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::{parse_id, CurrentUser};
use crate::app::App;
use crate::error::Result;
use crate::models::{NewPost, Post};

pub async fn create_post(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
    Json(input): Json<NewPost>,
) -> Result<(StatusCode, Json<Post>)> {
    let post = app.posts.create_post(user_id, input).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
    Path(post_id): Path<String>,
) -> Result<Json<Post>> {
    let post = app.posts.get_post(user_id, parse_id(&post_id)?).await?;
    Ok(Json(post))
}
