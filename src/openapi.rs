use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    domain::{Provider, Source},
    handler::{
        self,
        auth::{AuthResponse, CredentialsBody, LoginRequest, RegisterRequest},
        health::Health,
        me::AccountResponse,
        ErrorResponse,
    },
};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handler::health::health,
        handler::auth::register,
        handler::auth::login,
        handler::me::me,
        handler::me::delete_me
    ),
    components(schemas(
        Health,
        ErrorResponse,
        Provider,
        Source,
        RegisterRequest,
        LoginRequest,
        CredentialsBody,
        AuthResponse,
        AccountResponse
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check"),
        (name = "auth", description = "Registration and login"),
        (name = "accounts", description = "The authenticated account")
    )
)]
pub struct ApiDoc;
