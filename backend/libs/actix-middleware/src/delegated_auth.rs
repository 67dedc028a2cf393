use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    Error, HttpMessage,
};
use futures::future::{ready, Ready};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use crate::policy::RolePolicy;
use crate::verifier::{AuthError, DelegatedVerifier, Principal};

/// Authorizes every request through the [`DelegatedVerifier`] and stores the
/// resulting [`Principal`] in request extensions.
#[derive(Clone)]
pub struct DelegatedAuth {
    verifier: Arc<DelegatedVerifier>,
    policy: RolePolicy,
}

impl DelegatedAuth {
    pub fn new(verifier: Arc<DelegatedVerifier>, policy: RolePolicy) -> Self {
        Self { verifier, policy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for DelegatedAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = DelegatedAuthService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(DelegatedAuthService {
            service: Rc::new(service),
            verifier: self.verifier.clone(),
            policy: Rc::new(self.policy.clone()),
        }))
    }
}

pub struct DelegatedAuthService<S> {
    service: Rc<S>,
    verifier: Arc<DelegatedVerifier>,
    policy: Rc<RolePolicy>,
}

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(AuthError::MissingToken)
}

impl<S, B> Service<ServiceRequest> for DelegatedAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let verifier = self.verifier.clone();
        let policy = self.policy.clone();

        Box::pin(async move {
            let token = bearer_token(req.headers())?;
            let principal = verifier.authorize(&token, &policy).await?;

            req.extensions_mut().insert(principal);

            service.call(req).await
        })
    }
}

impl actix_web::FromRequest for Principal {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<Principal>() {
            Some(principal) => ready(Ok(*principal)),
            None => ready(Err(AuthError::MissingToken.into())),
        }
    }
}
