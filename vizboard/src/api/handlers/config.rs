//! HTTP handler for the public site configuration.

use axum::extract::State;

use crate::{
    AppState,
    api::models::{config::SiteConfigResponse, response::ResponseData},
};

#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    summary = "Get site config",
    description = "Settings the UI needs before anyone logs in: site name, whether registration is open and the password rules",
    responses(
        (status = 200, description = "Site configuration", body = ResponseData<SiteConfigResponse>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_config(State(state): State<AppState>) -> ResponseData<SiteConfigResponse> {
    ResponseData::success(SiteConfigResponse::from(&state.config))
}
