#[cfg(test)]
use crate::features::auth::model::AuthenticatedUser;

#[cfg(test)]
use axum::{extract::Request, middleware::Next, response::Response, Router};

#[cfg(test)]
pub fn create_user(sub: &str, roles: &[&str]) -> AuthenticatedUser {
    AuthenticatedUser {
        sub: sub.to_string(),
        login: Some(format!("user-{sub}")),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    }
}

#[cfg(test)]
pub fn create_administrator() -> AuthenticatedUser {
    create_user("1", &["administrator"])
}

/// Attach a fixed user to every request, standing in for the JWT middleware.
#[cfg(test)]
pub fn with_user(router: Router, user: AuthenticatedUser) -> Router {
    router.layer(axum::middleware::from_fn(
        move |mut request: Request, next: Next| {
            let user = user.clone();
            async move {
                request.extensions_mut().insert(user);
                let response: Response = next.run(request).await;
                response
            }
        },
    ))
}

#[cfg(test)]
pub fn with_administrator_auth(router: Router) -> Router {
    with_user(router, create_administrator())
}
