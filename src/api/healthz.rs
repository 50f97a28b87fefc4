#![forbid(unsafe_code)]

use poem::{handler, web::Json};
use serde::Serialize;

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
#[derive(Serialize)]
pub struct RespHealthz
{
    ok: bool,
}

// ***************************************************************************
//                                 Endpoint
// ***************************************************************************
// ---------------------------------------------------------------------------
// healthz:
// ---------------------------------------------------------------------------
/** Fixed liveness payload for external orchestration.  No side effects and
 * no dependence on prior state.
 */
#[handler]
pub async fn healthz() -> Json<RespHealthz> {
    Json(RespHealthz { ok: true })
}
