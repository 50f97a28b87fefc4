#![forbid(unsafe_code)]

use lazy_static::lazy_static;
use poem::endpoint::StaticFilesEndpoint;
use poem::{get, Route};
use poem_openapi::OpenApiService;

// Intake utilities.
use crate::api::applications_create::ApplicationsApi;
use crate::api::healthz::healthz;
use crate::api::version::VersionApi;
use crate::utils::config::{init_runtime_context, RuntimeCtx};

// Modules
pub mod api;
pub mod utils;

// ***************************************************************************
//                                Constants
// ***************************************************************************
pub const SERVER_NAME : &str = "IntakeServer"; // for poem logging

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
// Lazily initialize the parameters variable so that is has a 'static lifetime.
// We also initialize the application store and make sure the data directories
// exist.  We exit if we can't read our parameters or access the store.
lazy_static! {
    pub static ref RUNTIME_CTX: RuntimeCtx = init_runtime_context();
}

// ---------------------------------------------------------------------------
// build_app:
// ---------------------------------------------------------------------------
/** Assemble the complete route table: the JSON API under /api, the root
 * liveness probe, the generated OpenAPI artifacts, and the static file
 * fallback for everything else.
 */
pub fn build_app() -> Route {
    // Assign the base URL advertised in the generated spec.
    let api_url = format!("{}:{}{}",
        RUNTIME_CTX.parms.config.http_addr,
        RUNTIME_CTX.parms.config.http_port,
        "/api");

    // Create a tuple with all the API endpoint structs.
    let endpoints = (ApplicationsApi, VersionApi);
    let api_service =
        OpenApiService::new(endpoints, RUNTIME_CTX.parms.config.title.clone(),
                            env!("CARGO_PKG_VERSION")).server(api_url);

    // Allow the generated openapi specs to be retrieved from the server.
    let spec = api_service.spec_endpoint();
    let spec_yaml = api_service.spec_endpoint_yaml();
    let ui = api_service.swagger_ui();

    // Anything the explicit routes don't claim falls through to the
    // static directory.
    Route::new()
        .at("/healthz", get(healthz))
        .nest("/api", api_service)
        .nest("/docs", ui)
        .at("/spec", spec)
        .at("/spec_yaml", spec_yaml)
        .nest("/", StaticFilesEndpoint::new(RUNTIME_CTX.intake_dirs.static_dir.clone())
            .index_file("index.html"))
}
