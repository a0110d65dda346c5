use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::info;

use super::{
    avatar_extension, validate_comment, validate_reaction, validate_username, ActionError,
    Actions, ValidationError, MAX_AVATAR_BYTES, MAX_BIO_LEN,
};
use crate::api::{insert_one, ApiError, Query, Table};
use crate::auth::AuthService;
use crate::models::{Profile, ProfileComment, Reaction};
use crate::sync::log_cache_write;

const AVATAR_BUCKET: &str = "avatars";

impl Actions {
    pub async fn add_profile_comment(
        &self,
        profile_id: &str,
        content: &str,
    ) -> Result<ProfileComment, ActionError> {
        let content = validate_comment(content)?;
        let me = self.viewer()?;
        let row = json!({ "profile_id": profile_id, "author_id": me, "content": content });
        self.checked(
            "comment on profile",
            insert_one::<_, ProfileComment>(self.ctx.backend(), Table::ProfileComment, &row)
                .await,
        )
    }

    pub async fn react(&self, profile_id: &str, kind: &str) -> Result<Reaction, ActionError> {
        let kind = validate_reaction(kind)?;
        let me = self.viewer()?;
        let row = json!({ "profile_id": profile_id, "author_id": me, "kind": kind });
        match insert_one::<_, Reaction>(self.ctx.backend(), Table::Reaction, &row).await {
            Ok(reaction) => Ok(reaction),
            Err(ApiError::Conflict(_)) => Err(ValidationError::AlreadyReacted.into()),
            Err(e) => Err(self.report("react", e)),
        }
    }

    /// Change the viewer's username and/or bio. `None` leaves a field as is.
    pub async fn update_profile(
        &self,
        username: Option<&str>,
        bio: Option<&str>,
    ) -> Result<Profile, ActionError> {
        if username.is_none() && bio.is_none() {
            return Err(ValidationError::NothingToUpdate.into());
        }
        let mut patch = Map::new();
        if let Some(username) = username {
            patch.insert("username".into(), validate_username(username)?.into());
        }
        if let Some(bio) = bio {
            let bio = bio.trim();
            if bio.chars().count() > MAX_BIO_LEN {
                return Err(ValidationError::BioTooLong { max: MAX_BIO_LEN }.into());
            }
            let value = if bio.is_empty() {
                Value::Null
            } else {
                bio.into()
            };
            patch.insert("bio".into(), value);
        }
        self.patch_own_profile("update profile", Value::Object(patch))
            .await
    }

    /// Upload a new avatar image and point the viewer's profile at it.
    pub async fn upload_avatar(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<Profile, ActionError> {
        if bytes.len() > MAX_AVATAR_BYTES {
            return Err(ValidationError::ImageTooLarge {
                max_bytes: MAX_AVATAR_BYTES,
            }
            .into());
        }
        let extension = avatar_extension(content_type)?;
        let me = self.viewer()?;
        let backend = self.ctx.backend();

        let path = format!("{}/avatar-{}.{}", me, Utc::now().timestamp(), extension);
        self.checked(
            "upload avatar",
            backend
                .upload_object(AVATAR_BUCKET, &path, bytes, content_type)
                .await,
        )?;

        let url = backend.public_url(AVATAR_BUCKET, &path);
        self.patch_own_profile("upload avatar", json!({ "avatar_url": url }))
            .await
    }

    /// Sign out remotely and locally, then wipe the cache.
    pub async fn sign_out(&self, auth: &mut AuthService) -> Result<(), ActionError> {
        auth.sign_out(&self.ctx.cache).await?;
        Ok(())
    }

    /// Permanently delete the viewer's account, then sign out.
    pub async fn delete_account(&self, auth: &mut AuthService) -> Result<(), ActionError> {
        self.viewer()?;
        self.checked(
            "delete account",
            self.ctx.backend().rpc("delete_user", json!({})).await,
        )?;
        info!("Account deleted");
        self.sign_out(auth).await
    }

    async fn patch_own_profile(&self, action: &str, patch: Value) -> Result<Profile, ActionError> {
        let me = self.viewer()?;
        let rows = self.checked(
            action,
            self.ctx
                .backend()
                .update(Table::Profile, &Query::new().eq("id", &me), patch)
                .await,
        )?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("profile {}", me)))?;
        let mut profile: Profile = serde_json::from_value(row)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected profiles row: {}", e)))?;

        let cache = &self.ctx.cache;
        if profile.credits.is_none() {
            profile.credits = cache.load_user_profile().and_then(|p| p.credits);
        }
        log_cache_write("user profile", cache.save_user_profile(&profile));
        log_cache_write(
            "profile list",
            cache.upsert_user_profiles(std::slice::from_ref(&profile)),
        );
        info!(user_id = %me, "Profile updated");
        Ok(profile)
    }
}
