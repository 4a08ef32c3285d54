use anyhow::Result;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue, DatabaseConnection, EntityTrait, TransactionTrait};

use crate::entities::{cached_credentials, cached_snapshots, prelude::*};
use codebid_types::SnapshotPayload;

const CREDENTIAL_SLOT: i32 = 1;

/// The credential of the last login, as it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCredential {
    pub token: String,
    pub role: String,
    pub fingerprint: String,
    pub stored_at: String,
}

/// Last credential and last applied snapshot per credential, so a restarted
/// client can render something before the network answers.
#[derive(Clone)]
pub struct SessionCacheRepository {
    db: DatabaseConnection,
}

impl SessionCacheRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn model_to_credential(model: cached_credentials::Model) -> CachedCredential {
        CachedCredential {
            token: model.token,
            role: model.role,
            fingerprint: model.fingerprint,
            stored_at: model.stored_at.to_rfc3339(),
        }
    }

    /// Replaces the cached credential.
    pub async fn save_credential(&self, token: &str, role: &str, fingerprint: &str) -> Result<()> {
        let model = cached_credentials::ActiveModel {
            slot: ActiveValue::Set(CREDENTIAL_SLOT),
            token: ActiveValue::Set(token.to_string()),
            role: ActiveValue::Set(role.to_string()),
            fingerprint: ActiveValue::Set(fingerprint.to_string()),
            stored_at: ActiveValue::Set(chrono::Utc::now().into()),
        };

        CachedCredentials::insert(model)
            .on_conflict(
                OnConflict::column(cached_credentials::Column::Slot)
                    .update_columns([
                        cached_credentials::Column::Token,
                        cached_credentials::Column::Role,
                        cached_credentials::Column::Fingerprint,
                        cached_credentials::Column::StoredAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        tracing::debug!(credential = %fingerprint, role, "Cached credential");
        Ok(())
    }

    pub async fn load_credential(&self) -> Result<Option<CachedCredential>> {
        let model = CachedCredentials::find_by_id(CREDENTIAL_SLOT)
            .one(&self.db)
            .await?;
        Ok(model.map(Self::model_to_credential))
    }

    pub async fn save_snapshot(&self, fingerprint: &str, snapshot: &SnapshotPayload) -> Result<()> {
        let round_number = snapshot
            .round
            .as_ref()
            .map(|round| i64::try_from(round.round_number))
            .transpose()?;

        let model = cached_snapshots::ActiveModel {
            fingerprint: ActiveValue::Set(fingerprint.to_string()),
            round_number: ActiveValue::Set(round_number),
            payload: ActiveValue::Set(serde_json::to_string(snapshot)?),
            fetched_at: ActiveValue::Set(chrono::Utc::now().into()),
        };

        CachedSnapshots::insert(model)
            .on_conflict(
                OnConflict::column(cached_snapshots::Column::Fingerprint)
                    .update_columns([
                        cached_snapshots::Column::RoundNumber,
                        cached_snapshots::Column::Payload,
                        cached_snapshots::Column::FetchedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn load_snapshot(&self, fingerprint: &str) -> Result<Option<SnapshotPayload>> {
        let Some(model) = CachedSnapshots::find_by_id(fingerprint.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let payload = serde_json::from_str(&model.payload)
            .map_err(|e| anyhow::anyhow!("Cached snapshot for {} is corrupt: {}", fingerprint, e))?;
        Ok(Some(payload))
    }

    /// Forgets the credential and every cached snapshot.
    pub async fn clear(&self) -> Result<()> {
        let txn = self.db.begin().await?;
        CachedCredentials::delete_many().exec(&txn).await?;
        CachedSnapshots::delete_many().exec(&txn).await?;
        txn.commit().await?;
        tracing::debug!("Cleared session cache");
        Ok(())
    }
}
