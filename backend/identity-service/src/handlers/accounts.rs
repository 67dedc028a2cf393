/// Account administration handlers
use actix_middleware::{bearer_token, DelegatedVerifier, Principal, RolePolicy};
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use event_schema::Role;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{CreateAccountRequest, UpdateAccountRequest};
use crate::services::AccountService;

async fn require_admin(verifier: &DelegatedVerifier, req: &HttpRequest) -> ActixResult<Principal> {
    let token = bearer_token(req.headers())?;
    Ok(verifier.authorize(&token, &RolePolicy::only(Role::Admin)).await?)
}

/// Create an account
///
/// Anyone may register a worker. Other roles need an admin token, except
/// for the very first account.
///
/// POST /v1/accounts
pub async fn create_account(
    accounts: web::Data<Arc<AccountService>>,
    verifier: web::Data<Arc<DelegatedVerifier>>,
    req: HttpRequest,
    body: web::Json<CreateAccountRequest>,
) -> ActixResult<HttpResponse> {
    let body = body.into_inner();

    if body.role != Role::Worker {
        if let Err(denied) = require_admin(&verifier, &req).await {
            if !accounts.is_bootstrap().await? {
                return Err(denied);
            }
            return match accounts.create_first(body).await? {
                Some(created) => Ok(HttpResponse::Created().json(created)),
                None => Err(denied),
            };
        }
    }

    let created = accounts.create(body).await?;
    Ok(HttpResponse::Created().json(created))
}

/// List accounts
///
/// GET /v1/accounts
pub async fn list_accounts(
    accounts: web::Data<Arc<AccountService>>,
    verifier: web::Data<Arc<DelegatedVerifier>>,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    require_admin(&verifier, &req).await?;

    let list = accounts.list().await?;
    Ok(HttpResponse::Ok().json(list))
}

/// Change email and role
///
/// PUT /v1/accounts/{pid}
pub async fn update_account(
    accounts: web::Data<Arc<AccountService>>,
    _admin: Principal,
    path: web::Path<Uuid>,
    body: web::Json<UpdateAccountRequest>,
) -> ActixResult<HttpResponse> {
    accounts.update(path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Delete an account
///
/// DELETE /v1/accounts/{pid}
pub async fn delete_account(
    accounts: web::Data<Arc<AccountService>>,
    admin: Principal,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    accounts.delete(admin.pid, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
