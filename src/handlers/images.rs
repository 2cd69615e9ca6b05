use axum::{
    extract::{Multipart, Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::dto::{ApiResponse, DeleteResponse};
use crate::error::{AppError, AppResult};
use crate::models::image::Image;
use crate::services::storage::validate_image_upload;
use crate::AppState;

/// POST /api/diaries/:id/images, multipart upload of one image file.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(diary_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<Image>>> {
    ensure_diary_owned(&state, diary_id, auth_user.id).await?;

    let mut upload: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        // The file travels in the first field carrying a filename.
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;

        validate_image_upload(content_type.as_deref(), bytes.len())?;

        // content_type is Some past validation
        let content_type = content_type.unwrap_or_default();
        upload = Some((filename, content_type, bytes.to_vec()));
        break;
    }

    let (filename, content_type, bytes) =
        upload.ok_or_else(|| AppError::Validation("No image file in request".into()))?;
    let file_size = bytes.len() as i32;

    let object_key = state.storage.object_key(&filename);
    let file_url = state.storage.upload(&object_key, &content_type, bytes).await?;

    let image = sqlx::query_as::<_, Image>(
        r#"
        INSERT INTO images (id, diary_id, file_path, mime_type, file_size, exif_removed)
        VALUES ($1, $2, $3, $4, $5, true)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(diary_id)
    .bind(&file_url)
    .bind(&content_type)
    .bind(file_size)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::with_message(image, "Image uploaded")))
}

pub async fn list_images(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(diary_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<Image>>>> {
    ensure_diary_owned(&state, diary_id, auth_user.id).await?;

    let images = sqlx::query_as::<_, Image>(
        "SELECT * FROM images WHERE diary_id = $1 ORDER BY created_at ASC",
    )
    .bind(diary_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::ok(images)))
}

/// Delete an attachment: removes stored blobs first, then the row.
pub async fn delete_image(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((diary_id, image_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<DeleteResponse>>> {
    ensure_diary_owned(&state, diary_id, auth_user.id).await?;

    let image = sqlx::query_as::<_, Image>(
        "SELECT * FROM images WHERE id = $1 AND diary_id = $2",
    )
    .bind(image_id)
    .bind(diary_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Image not found".into()))?;

    for url in [Some(image.file_path.as_str()), image.thumbnail_path.as_deref()]
        .into_iter()
        .flatten()
    {
        match state.storage.object_key_from_url(url) {
            Some(key) => state.storage.delete(&key).await?,
            None => {
                tracing::warn!(image_id = %image_id, url = %url, "Stored URL outside bucket, blob not deleted");
            }
        }
    }

    sqlx::query("DELETE FROM images WHERE id = $1")
        .bind(image_id)
        .execute(&state.db)
        .await?;

    Ok(Json(ApiResponse::ok(DeleteResponse {
        deleted: true,
        id: image_id,
    })))
}

async fn ensure_diary_owned(state: &AppState, diary_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let owned = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM diaries WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
    )
    .bind(diary_id)
    .bind(user_id)
    .fetch_one(&state.db)
    .await?;

    if owned == 0 {
        return Err(AppError::NotFound("Diary not found".into()));
    }
    Ok(())
}
