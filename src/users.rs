//! User profiles and roles.

use tracing::info;

use crate::error::{Error, Result};
use crate::models::{NewProfile, Profile};
use crate::store::BackOfficeStore;

pub use crate::models::UserRole;

pub async fn list_profiles(store: &dyn BackOfficeStore) -> Result<Vec<Profile>> {
    store.list_profiles().await
}

/// Create the profile row for an account that already exists in the auth
/// provider; `id` is that account's id.
pub async fn create_profile(store: &dyn BackOfficeStore, profile: NewProfile) -> Result<Profile> {
    let id = profile.id.trim().to_string();
    let full_name = profile.full_name.trim().to_string();
    let email = profile.email.trim().to_lowercase();

    if id.is_empty() {
        return Err(Error::validation("profile id is required"));
    }
    if full_name.is_empty() {
        return Err(Error::validation("full name is required"));
    }
    if !email.contains('@') {
        return Err(Error::validation(format!("invalid e-mail address: {email}")));
    }
    let branch_id = profile
        .branch_id
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty());

    let stored = store
        .insert_profile(&NewProfile {
            id,
            full_name,
            email,
            role: profile.role,
            branch_id,
        })
        .await?;
    info!(profile_id = %stored.id, role = stored.role.as_str(), "profile created");
    Ok(stored)
}

pub async fn delete_profile(store: &dyn BackOfficeStore, id: &str) -> Result<()> {
    if !store.delete_profile(id).await? {
        return Err(Error::not_found("profile", id));
    }
    info!(profile_id = id, "profile deleted");
    Ok(())
}
