use crate::server::SharedState;
use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

const USER_PAGE: &str = include_str!("../../templates/user.html");
const DEV_PAGE: &str = include_str!("../../templates/dev.html");
const DEV_LOGIN_PAGE: &str = include_str!("../../templates/dev_login.html");

#[derive(Deserialize, Debug)]
pub struct DevParams {
    pub password: Option<String>,
}

pub async fn index() -> Redirect {
    Redirect::to("/user")
}

pub async fn user_page() -> Html<&'static str> {
    Html(USER_PAGE)
}

/// Shared-secret gate, not an authentication mechanism.
pub async fn dev_page(
    State(state): State<SharedState>,
    Query(params): Query<DevParams>,
) -> Response {
    if params.password.as_deref() == Some(state.dev_password.as_str()) {
        Html(DEV_PAGE).into_response()
    } else {
        Redirect::to("/dev-login").into_response()
    }
}

pub async fn dev_login() -> Html<&'static str> {
    Html(DEV_LOGIN_PAGE)
}
