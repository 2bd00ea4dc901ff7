use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;
use taskify_shared::auth::Actor;
use taskify_shared::domain::AccountStatus;
use taskify_shared::jwt::{self, JwtClaims};
use tracing::{error, warn};

use super::{AppError, AppState};

#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub claims: JwtClaims,
    pub actor: Actor,
}

pub async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || Err(AppError::unauthorized());
    let header_val = match req.headers().get(header::AUTHORIZATION) {
        Some(v) => v,
        None => return unauthorized(),
    };
    let header_str = header_val.to_str().map_err(|_| AppError::unauthorized())?;
    let prefix = "Bearer ";
    if !header_str.starts_with(prefix) {
        return unauthorized();
    }
    let token = &header_str[prefix.len()..];

    let claims = match jwt::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            let sub = jwt::decode_unverified(token).map(|c| c.sub).ok();
            warn!(error = %e, sub = ?sub, "auth: jwt decode failed");
            return unauthorized();
        }
    };

    let actor = claims.actor().map_err(|e| {
        warn!(error = %e, sub = %claims.sub, "auth: inconsistent claims");
        AppError::unauthorized()
    })?;

    ensure_actor_exists(&state, &actor).await?;

    req.extensions_mut().insert(AuthCtx { claims, actor });
    Ok(next.run(req).await)
}

/// The token may outlive the account it was minted for; check it still maps
/// to a family member. Parents whose account is locked or suspended are
/// refused outright, so they cannot act on (or reactivate) their account.
async fn ensure_actor_exists(state: &AppState, actor: &Actor) -> Result<(), AppError> {
    let known = match actor {
        Actor::Parent(parent) => {
            let Some(row) = state.store.get_parent(&parent.0).await.map_err(|e| {
                error!(parent_id = %parent, error = %e, "auth: parent lookup failed");
                AppError::internal(e)
            })?
            else {
                warn!(actor = ?actor, "auth: token subject not found");
                return Err(AppError::unauthorized());
            };
            match row.account_status() {
                Ok(AccountStatus::Active) => true,
                Ok(status) => {
                    warn!(parent_id = %parent, %status, "auth: parent account not active");
                    return Err(AppError::Forbidden(format!("parent account is {status}")));
                }
                Err(e) => {
                    error!(parent_id = %parent, error = %e, "auth: unreadable account status");
                    return Err(AppError::internal(e));
                }
            }
        }
        Actor::Child { child, family } => state
            .store
            .get_child(&child.0)
            .await
            .map_err(|e| {
                error!(child_id = %child, error = %e, "auth: child lookup failed");
                AppError::internal(e)
            })?
            .is_some_and(|c| c.parent_id == family.0),
    };
    if !known {
        warn!(actor = ?actor, "auth: token subject not found");
        return Err(AppError::unauthorized());
    }
    Ok(())
}
