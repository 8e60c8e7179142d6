//! Public site configuration shown to the UI before login.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SiteConfigResponse {
    pub site_name: String,
    pub docs_url: Option<String>,
    pub registration_enabled: bool,
    pub activation_required: bool,
    pub password_min_length: usize,
    pub password_max_length: usize,
}

impl From<&Config> for SiteConfigResponse {
    fn from(config: &Config) -> Self {
        let native = &config.auth.native;
        Self {
            site_name: config.metadata.site_name.clone(),
            docs_url: config.metadata.docs_url.clone(),
            registration_enabled: native.allow_registration,
            activation_required: native.require_activation,
            password_min_length: native.password.min_length,
            password_max_length: native.password.max_length,
        }
    }
}
