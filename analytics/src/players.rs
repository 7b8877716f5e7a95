//! Player registry.

use std::sync::Arc;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::keys;
use crate::store::KeyValueStore;
use crate::types::Player;

pub struct PlayerRegistry<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> PlayerRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Register (or re-register) a player and index their email.
    pub async fn register(&self, player: &Player) -> AnalyticsResult<()> {
        if player.user_id.trim().is_empty() || player.email.trim().is_empty() {
            return Err(AnalyticsError::MalformedPlayer {
                user_id: player.user_id.clone(),
            });
        }
        let store = self.store.as_ref();
        store.set(&keys::player(&player.user_id), &player.email).await?;
        store
            .set(&keys::email_user(&player.email), &player.user_id)
            .await?;
        store.set_add(keys::PLAYERS, &player.user_id).await?;
        store.filter_add(keys::EMAIL_FILTER, &player.email).await?;
        tracing::debug!(user_id = %player.user_id, "Player registered");
        Ok(())
    }

    pub async fn get(&self, user_id: &str) -> AnalyticsResult<Option<Player>> {
        let email = self.store.get(&keys::player(user_id)).await?;
        Ok(email.map(|email| Player {
            user_id: user_id.to_string(),
            email,
        }))
    }

    pub async fn find_by_email(&self, email: &str) -> AnalyticsResult<Option<Player>> {
        let user_id = self.store.get(&keys::email_user(email)).await?;
        Ok(user_id.map(|user_id| Player {
            user_id,
            email: email.to_string(),
        }))
    }

    /// Approximate membership: `false` means the email was never registered,
    /// `true` means it probably was.
    pub async fn email_may_exist(&self, email: &str) -> AnalyticsResult<bool> {
        Ok(self
            .store
            .filter_contains(keys::EMAIL_FILTER, email)
            .await?)
    }

    pub async fn exists(&self, user_id: &str) -> AnalyticsResult<bool> {
        Ok(self.store.exists(&keys::player(user_id)).await?)
    }

    pub async fn count(&self) -> AnalyticsResult<usize> {
        Ok(self.store.set_members(keys::PLAYERS).await?.len())
    }
}
