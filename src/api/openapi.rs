//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{chats, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "BiblioDesk API",
        version = "0.3.0",
        description = "Library Support Chat REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Chats
        chats::list_my_chats,
        chats::create_chat,
        chats::list_messages,
        // Librarian
        chats::list_assigned_chats,
        chats::list_unassigned_chats,
        chats::assign_chat,
        chats::close_chat,
    ),
    components(
        schemas(
            // Chats
            crate::models::chat::Chat,
            crate::models::chat::CreateChat,
            crate::models::message::Message,
            crate::models::enums::ChatStatus,
            crate::models::enums::Role,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "chats", description = "Patron-facing support chats"),
        (name = "librarian", description = "Librarian queue and assignment")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
