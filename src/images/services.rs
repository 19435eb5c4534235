use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::meal_plans::repo;
use crate::state::AppState;
use crate::storage::StorageClient;

pub struct UploadItem<'a> {
    pub body: Bytes,
    pub content_type: &'a str,
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Photo references are either absolute URLs supplied by the client or keys in our bucket.
pub(crate) fn is_external(reference: &str) -> bool {
    reference.starts_with("https://") || reference.starts_with("http://")
}

pub(crate) fn meal_photo_key(patient_id: Uuid, meal_id: Uuid, photo_id: Uuid, ext: &str) -> String {
    format!("meals/{}/{}-{}.{}", patient_id, meal_id, photo_id, ext)
}

/// Stores the photo, links it to the planned meal and drops the object it replaced.
/// Returns the new object key.
pub async fn upload_meal_photo(
    st: &AppState,
    patient_id: Uuid,
    meal_id: Uuid,
    img: UploadItem<'_>,
) -> anyhow::Result<String> {
    let ext = ext_from_mime(img.content_type)
        .with_context(|| format!("unsupported content type {}", img.content_type))?;
    let key = meal_photo_key(patient_id, meal_id, Uuid::new_v4(), ext);

    st.storage
        .put_object(&key, img.body, img.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    let replaced = discard_on_error(
        st.storage.as_ref(),
        &key,
        repo::set_photo(&st.db, meal_id, &key).await,
    )
    .await?;
    info!(%meal_id, %key, "meal photo stored");

    if let Some(old) = replaced.filter(|r| owns_key(patient_id, r)) {
        // A failed delete leaves an orphan object; the upload still succeeds.
        if let Err(e) = st.storage.delete_object(&old).await {
            warn!(error = %e, key = %old, "failed to delete replaced meal photo");
        }
    }

    Ok(key)
}

/// True for bucket keys under the patient's own meal photo prefix.
pub(crate) fn owns_key(patient_id: Uuid, reference: &str) -> bool {
    !is_external(reference) && reference.starts_with(&format!("meals/{}/", patient_id))
}

/// Removes a freshly stored object when linking it to its row failed.
async fn discard_on_error<T>(
    storage: &dyn StorageClient,
    key: &str,
    linked: anyhow::Result<T>,
) -> anyhow::Result<T> {
    if linked.is_err() {
        if let Err(e) = storage.delete_object(key).await {
            warn!(error = %e, %key, "failed to delete unlinked meal photo");
        }
    }
    linked
}

/// URL a client can fetch the photo from.
pub async fn resolve_photo_url(st: &AppState, reference: &str) -> anyhow::Result<String> {
    if is_external(reference) {
        return Ok(reference.to_string());
    }
    st.storage
        .presign_get(reference, st.config.storage.url_ttl_secs)
        .await
        .with_context(|| format!("presign url for key {}", reference))
}

#[cfg(test)]
mod image_tests {
    use super::*;
    use crate::state::AppState;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn photo_key_layout() {
        let p = Uuid::nil();
        let key = meal_photo_key(p, p, p, "png");
        assert!(key.starts_with("meals/00000000-0000-0000-0000-000000000000/"));
        assert!(key.ends_with(".png"));
    }

    #[tokio::test]
    async fn external_urls_pass_through_and_keys_are_presigned() {
        let state = AppState::fake();

        let ext = resolve_photo_url(&state, "https://cdn.example/plate.jpg")
            .await
            .unwrap();
        assert_eq!(ext, "https://cdn.example/plate.jpg");

        let signed = resolve_photo_url(&state, "meals/a/b.jpg").await.unwrap();
        assert_eq!(signed, "https://fake.local/meals/a/b.jpg");
    }

    #[derive(Default)]
    struct RecordingStorage {
        deleted: std::sync::Mutex<Vec<String>>,
    }

    #[axum::async_trait]
    impl StorageClient for RecordingStorage {
        async fn put_object(&self, _k: &str, _b: Bytes, _ct: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_object(&self, k: &str) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push(k.to_string());
            Ok(())
        }
        async fn presign_get(&self, k: &str, _s: u64) -> anyhow::Result<String> {
            Ok(k.to_string())
        }
    }

    #[tokio::test]
    async fn unlinked_upload_is_deleted() {
        let storage = RecordingStorage::default();
        let err = discard_on_error::<()>(&storage, "meals/p/m-1.jpg", Err(anyhow::anyhow!("db down")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "db down");
        assert_eq!(*storage.deleted.lock().unwrap(), vec!["meals/p/m-1.jpg".to_string()]);

        let kept = discard_on_error(&storage, "meals/p/m-2.jpg", Ok(7)).await.unwrap();
        assert_eq!(kept, 7);
        assert_eq!(storage.deleted.lock().unwrap().len(), 1);
    }

    #[test]
    fn only_own_keys_are_replaced() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(owns_key(me, &format!("meals/{me}/x-1.jpg")));
        assert!(!owns_key(me, &format!("meals/{other}/x-1.jpg")));
        assert!(!owns_key(me, "https://cdn.example/plate.jpg"));
    }

    #[tokio::test]
    async fn unsupported_mime_is_rejected_before_storage() {
        let state = AppState::fake();
        let err = upload_meal_photo(
            &state,
            Uuid::new_v4(),
            Uuid::new_v4(),
            UploadItem {
                body: Bytes::from_static(b"%PDF"),
                content_type: "application/pdf",
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("unsupported content type"));
    }
}
