use super::{AppError, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::OriginalUri,
    http::{Method, Request},
    middleware::Next,
};
use percent_encoding::percent_decode_str;
use taskify_shared::auth::Actor;

/// Route-level access rules. Whether a record belongs to the caller's family
/// is checked by the handlers once it is loaded.
pub async fn enforce_acl(req: Request<axum::body::Body>, next: Next) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };

    let segs = segmented(&path);
    let prefix = ["api", "v1"];
    if !segs.as_slice().starts_with(&prefix) {
        tracing::warn!(?segs, "ACL: path outside API scope");
        return Err(AppError::forbidden());
    }
    let rest = &segs[prefix.len()..];

    let decision = match &auth.actor {
        Actor::Parent(_) => allow_parent(&method, rest, &auth.actor),
        Actor::Child { .. } => allow_child(&method, rest, &auth.actor),
    };

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            sub = %auth.claims.sub,
            role = ?auth.claims.role,
            family = %auth.claims.family,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

fn allow_parent(method: &Method, rest: &[&str], actor: &Actor) -> Result<(), AppError> {
    let read = *method == Method::GET;
    let write = *method == Method::POST;
    let edit = *method == Method::PATCH || *method == Method::DELETE;
    match rest {
        ["parents", parent] if read || edit => ensure_parent(actor, parent),
        ["parents", parent, "status" | "email-verification"] if write => {
            ensure_parent(actor, parent)
        }
        ["parents", parent, "children" | "categories" | "tasks" | "rewards"] if read || write => {
            ensure_parent(actor, parent)
        }
        ["children", _] if read || edit => Ok(()),
        ["children", _, "points" | "tasks" | "redemptions" | "rewards"] if read => Ok(()),
        ["categories", _] if read || edit => Ok(()),
        ["tasks", _] if read || edit => Ok(()),
        ["tasks", _, "occurrences" | "comments"] if read || write => Ok(()),
        ["tasks", _, "complete" | "verify" | "reject" | "reopen"] if write => Ok(()),
        ["comments", _] if edit => Ok(()),
        ["rewards", _] if read || edit => Ok(()),
        ["rewards", _, "redemptions"] if read || write => Ok(()),
        ["rewards", _, "eligibility", _] if read => Ok(()),
        ["redemptions", _] if read => Ok(()),
        ["redemptions", _, "approve" | "reject" | "fulfill"] if write => Ok(()),
        ["notifications"] if read || write => Ok(()),
        ["notifications", "count"] if read => Ok(()),
        ["notifications", _, "read"] if write => Ok(()),
        ["notifications", _] if *method == Method::DELETE => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_child(method: &Method, rest: &[&str], actor: &Actor) -> Result<(), AppError> {
    let read = *method == Method::GET;
    let write = *method == Method::POST;
    let edit = *method == Method::PATCH || *method == Method::DELETE;
    match rest {
        ["children", child] if read => ensure_child(actor, child),
        ["children", child, "points" | "tasks" | "redemptions" | "rewards"] if read => {
            ensure_child(actor, child)
        }
        ["tasks", _] if read => Ok(()),
        ["tasks", _, "occurrences"] if read => Ok(()),
        ["tasks", _, "comments"] if read || write => Ok(()),
        ["tasks", _, "start" | "complete" | "reopen"] if write => Ok(()),
        ["comments", _] if edit => Ok(()),
        ["rewards", _] if read => Ok(()),
        ["rewards", _, "redemptions"] if write => Ok(()),
        ["rewards", _, "eligibility", child] if read => ensure_child(actor, child),
        ["redemptions", _] if read => Ok(()),
        ["notifications"] if read => Ok(()),
        ["notifications", "count"] if read => Ok(()),
        ["notifications", _, "read"] if write => Ok(()),
        ["notifications", _] if *method == Method::DELETE => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

fn ensure_parent(actor: &Actor, seg: &str) -> Result<(), AppError> {
    if actor.is_parent(&decode(seg)) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

fn ensure_child(actor: &Actor, seg: &str) -> Result<(), AppError> {
    if actor.is_child(&decode(seg)) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}
