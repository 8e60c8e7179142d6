//! OpenAPI documentation for the `/api/v1` surface.
//!
//! [`ApiDoc`] is served as JSON at `/api/v1/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, provider};

/// Session token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token returned in the `Authorization` response header of `POST /users/login` \
                            and `GET /users/active`. Send it back as:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```\n\n\
                            The `Bearer ` prefix is optional.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vizboard API",
        description = "Users, organizations, dashboards and SQL data sources. Every response is wrapped in \
                       `{ success, error_code, message, data }`."
    ),
    servers(
        (url = "/api/v1", description = "Vizboard API")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::config::get_config,
        api::handlers::users::register,
        api::handlers::users::search_users,
        api::handlers::users::get_profile,
        api::handlers::users::update_user,
        api::handlers::users::activate,
        api::handlers::users::send_activation_mail,
        api::handlers::users::change_password,
        api::handlers::users::forget_password,
        api::handlers::users::reset_password,
        api::handlers::users::login,
        api::handlers::users::logout,
        api::handlers::organizations::list_organizations,
        api::handlers::organizations::create_organization,
        api::handlers::organizations::get_organization,
        api::handlers::organizations::list_members,
        api::handlers::organizations::add_member,
        api::handlers::organizations::remove_member,
        api::handlers::folders::list_folders,
        api::handlers::folders::create_folder,
        api::handlers::folders::update_folder,
        api::handlers::folders::delete_folder,
        api::handlers::dashboards::list_dashboards,
        api::handlers::dashboards::list_archived_dashboards,
        api::handlers::dashboards::create_dashboard,
        api::handlers::dashboards::get_dashboard,
        api::handlers::dashboards::update_dashboard,
        api::handlers::dashboards::delete_dashboard,
        api::handlers::dashboards::restore_dashboard,
        api::handlers::dashboards::publish_dashboard,
        api::handlers::dashboards::unpublish_dashboard,
        api::handlers::sources::list_sources,
        api::handlers::sources::create_source,
        api::handlers::sources::get_source,
        api::handlers::sources::update_source,
        api::handlers::sources::delete_source,
        api::handlers::data_provider::list_providers,
        api::handlers::data_provider::test_connection,
        api::handlers::data_provider::list_databases,
        api::handlers::data_provider::list_tables,
        api::handlers::data_provider::list_columns,
        api::handlers::data_provider::execute,
    ),
    components(
        schemas(
            api::models::config::SiteConfigResponse,
            api::models::users::RegisterRequest,
            api::models::users::LoginRequest,
            api::models::users::UserBaseInfo,
            api::models::users::UserProfile,
            api::models::users::UserUpdateRequest,
            api::models::users::ChangePasswordRequest,
            api::models::users::ResetPasswordRequest,
            api::models::users::FindType,
            api::models::organizations::OrganizationCreate,
            api::models::organizations::OrganizationResponse,
            api::models::organizations::AddMemberRequest,
            api::models::organizations::OrgMemberResponse,
            api::models::folders::FolderCreate,
            api::models::folders::FolderUpdate,
            api::models::folders::FolderResponse,
            api::models::dashboards::DashboardCreate,
            api::models::dashboards::DashboardBaseInfo,
            api::models::dashboards::DashboardDetail,
            api::models::dashboards::DashboardUpdate,
            api::models::dashboards::WidgetCreate,
            api::models::dashboards::WidgetUpdate,
            api::models::dashboards::WidgetResponse,
            api::models::dashboards::RestoreRequest,
            api::models::sources::SourceCreate,
            api::models::sources::SourceUpdate,
            api::models::sources::SourceConfigView,
            api::models::sources::SourceResponse,
            api::models::data_provider::ExecuteRequest,
            provider::SourceConfig,
            provider::ProviderInfo,
            provider::Dialect,
            provider::Column,
            provider::DataType,
            provider::PageInfo,
            provider::Dataframe,
        )
    ),
    tags(
        (name = "config", description = "Public site settings"),
        (name = "users", description = "Accounts, sessions and passwords"),
        (name = "organizations", description = "Organizations and their members"),
        (name = "folders", description = "The folder tree of an organization"),
        (name = "dashboards", description = "Dashboards and their widgets"),
        (name = "sources", description = "Data source connection settings"),
        (name = "data-provider", description = "Metadata browsing and query execution against sources"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_area() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().unwrap();

        for path in [
            "/users/login",
            "/orgs/{id}/members/{user_id}",
            "/viz/dashboards/{id}/restore",
            "/sources/{id}",
            "/data-provider/{source_id}/{database}/{table}/columns",
            "/config",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert!(json.contains("BearerAuth"));
    }
}
