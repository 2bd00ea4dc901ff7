use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::info;

use super::models::{EmailVerificationToken, Parent, ParentChanges};
use super::schema::{email_verification_tokens as evt, parents as parent_table};
use super::{StorageError, Store, format_ts, new_id, parents, parse_ts};

/// A freshly issued token. `plaintext` is handed to the caller once and is
/// not stored.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: EmailVerificationToken,
    pub plaintext: String,
}

fn hash_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl Store {
    /// Issues a token for the parent's current email address. Tokens issued
    /// earlier and still unused stop working.
    pub async fn issue_email_verification(
        &self,
        parent_id: &str,
        ttl: Duration,
    ) -> Result<IssuedToken, StorageError> {
        if ttl <= Duration::zero() {
            return Err(StorageError::invalid("token lifetime must be positive"));
        }
        let parent_id = parent_id.to_string();
        self.with_tx(move |conn| {
            let parent = parents::require(conn, &parent_id)?;
            let now = Utc::now();
            let now_s = format_ts(now);
            let invalidated = diesel::update(
                evt::table
                    .filter(evt::parent_id.eq(&parent_id))
                    .filter(evt::used_at.is_null())
                    .filter(evt::invalidated_at.is_null()),
            )
            .set(evt::invalidated_at.eq(Some(now_s.clone())))
            .execute(conn)?;

            let plaintext = generate_token();
            let row = EmailVerificationToken {
                token_id: new_id(),
                parent_id: parent.parent_id,
                email: parent.email,
                token_hash: hash_token(&plaintext),
                expires_at: format_ts(now + ttl),
                used_at: None,
                invalidated_at: None,
                created_at: now_s,
            };
            diesel::insert_into(evt::table).values(&row).execute(conn)?;
            info!(
                token_id = %row.token_id,
                parent_id = %row.parent_id,
                invalidated,
                "email verification token issued"
            );
            Ok(IssuedToken {
                token: row,
                plaintext,
            })
        })
        .await
    }

    /// Consumes a token and marks the parent's email verified.
    ///
    /// Checks run in a fixed order: already used, invalidated (explicitly or
    /// because the parent's email changed since issuance), expired.
    pub async fn consume_email_verification(&self, plaintext: &str) -> Result<Parent, StorageError> {
        let hash = hash_token(plaintext.trim());
        self.with_tx(move |conn| {
            let token = evt::table
                .filter(evt::token_hash.eq(&hash))
                .select(EmailVerificationToken::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| StorageError::not_found("email verification token", "<redacted>"))?;
            let parent = parents::require(conn, &token.parent_id)?;

            if token.used_at.is_some() {
                return Err(StorageError::AlreadyUsed);
            }
            if token.invalidated_at.is_some() || parent.email != token.email {
                return Err(StorageError::Invalidated);
            }
            let now = Utc::now();
            if now > parse_ts(&token.expires_at)? {
                return Err(StorageError::Expired);
            }

            let now_s = format_ts(now);
            diesel::update(evt::table.find(&token.token_id))
                .set(evt::used_at.eq(Some(now_s.clone())))
                .execute(conn)?;
            let changes = ParentChanges {
                email_verified: Some(true),
                email_verified_at: Some(Some(now_s.clone())),
                updated_at: now_s,
                ..Default::default()
            };
            let parent = diesel::update(parent_table::table.find(&parent.parent_id))
                .set(&changes)
                .returning(Parent::as_returning())
                .get_result(conn)?;
            info!(parent_id = %parent.parent_id, token_id = %token.token_id, "email verified");
            Ok(parent)
        })
        .await
    }

    /// Deletes tokens that can no longer be consumed: used, invalidated, or
    /// expired as of `now`.
    pub async fn purge_stale_tokens(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let cutoff = format_ts(now);
        self.with_conn(move |conn| {
            let removed = diesel::delete(
                evt::table.filter(
                    evt::used_at
                        .is_not_null()
                        .or(evt::invalidated_at.is_not_null())
                        .or(evt::expires_at.lt(&cutoff)),
                ),
            )
            .execute(conn)?;
            if removed > 0 {
                info!(removed, "stale email verification tokens purged");
            }
            Ok(removed)
        })
        .await
    }

    pub async fn list_email_tokens(
        &self,
        parent_id: &str,
    ) -> Result<Vec<EmailVerificationToken>, StorageError> {
        let parent_id = parent_id.to_string();
        self.with_conn(move |conn| {
            Ok(evt::table
                .filter(evt::parent_id.eq(&parent_id))
                .order(evt::created_at.desc())
                .select(EmailVerificationToken::as_select())
                .load(conn)?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_url_safe_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = hash_token("abc");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_token("abc"));
        assert_ne!(h, hash_token("abd"));
    }
}
