#![forbid(unsafe_code)]

use anyhow::Result;
use log::info;
use poem::listener::TcpListener;

use intake_server::utils::config::init_log;
use intake_server::utils::errors::Errors;
use intake_server::{build_app, RUNTIME_CTX, SERVER_NAME};

// ---------------------------------------------------------------------------
// main:
// ---------------------------------------------------------------------------
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    // --------------- Initialize Intake --------------
    // Announce ourselves.
    println!("Starting intake_server!");

    // Initialize the server.
    server_init();

    // A provisioning-only invocation stops before the listener binds.
    if RUNTIME_CTX.intake_args.create_dirs_only {
        info!("Data directories created under {}; exiting.", RUNTIME_CTX.intake_dirs.root_dir);
        return Ok(());
    }

    // --------------- Main Loop Set Up ---------------
    // Create the routes and run the server.
    let app = build_app();
    let addr = format!("{}{}", "0.0.0.0:", RUNTIME_CTX.parms.config.http_port);

    // ------------------ Main Loop -------------------
    poem::Server::new(TcpListener::bind(addr))
        .name(SERVER_NAME)
        .run(app)
        .await
}

// ***************************************************************************
//                             Private Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// server_init:
// ---------------------------------------------------------------------------
/** Initialize all subsystems and data structures other than those needed
 * to configure the main loop processor.
 */
fn server_init() {
    // Configure our log.
    init_log();

    // Force the reading of input parameters and initialization of the runtime
    // context.  The runtime context also opens the application store, which
    // makes the append handle available to all modules.
    info!("{}", Errors::InputParms(format!("{:#?}", *RUNTIME_CTX)));

    // Log build info.
    print_version_info();
}

// ---------------------------------------------------------------------------
// print_version_info:
// ---------------------------------------------------------------------------
fn print_version_info() {
    // Log build info.
    info!("{}.", format!("\n*** Running INTAKE={}, BRANCH={}, COMMIT={}, DIRTY={}, RUSTC={}",
                        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"),
                        env!("GIT_BRANCH"),
                        env!("GIT_COMMIT_SHORT"),
                        env!("GIT_DIRTY"),
                        env!("RUSTC_VERSION")),
    );
}
