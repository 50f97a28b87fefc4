#![forbid(unsafe_code)]

use poem::Request;
use poem_openapi::{ ApiRequest, ApiResponse, OpenApi, Object, payload::{Form, Json} };
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use log::{debug, error, info};

use crate::utils::intake_utils::{self, timestamp_utc, timestamp_utc_to_str, RequestDebug,
                                 REFERER, USER_AGENT};
use crate::utils::store::ApplicationRecord;
use crate::RUNTIME_CTX;

// Fixed response bodies.
const MSG_MISSING_FIELDS: &str = "Missing required fields";
const MSG_INTERNAL_ERROR: &str = "Internal Server Error";

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
pub struct ApplicationsApi;

// ---------------------------------------------------------------------------
// ReqCreateApplication:
// ---------------------------------------------------------------------------
/// Submission body fields.  The transport does not guarantee field types, so
/// every field is accepted as raw JSON and reduced to a trimmed string before
/// validation.  Scalars coerce; null, arrays and objects count as absent.
#[derive(Debug, Deserialize, Object)]
pub struct ReqCreateApplication
{
    name: Option<Value>,
    email: Option<Value>,
    phone: Option<Value>,
    plan: Option<Value>,
}

// Submissions arrive as JSON or as an urlencoded form post.
#[derive(ApiRequest)]
pub enum ReqCreateApplicationPayload {
    SubmitJson(Json<ReqCreateApplication>),
    SubmitForm(Form<ReqCreateApplication>),
}

#[derive(Object)]
pub struct RespCreateApplication
{
    ok: bool,
}

#[derive(Object)]
pub struct RespApplicationError
{
    error: String,
}

#[derive(ApiResponse)]
pub enum CreateApplicationResponse {
    /// Exactly one line was appended to the store.
    #[oai(status = 201)]
    Created(Json<RespCreateApplication>),

    /// A required field was missing, non-scalar, or empty after trimming.
    /// The store is unchanged.
    #[oai(status = 400)]
    BadRequest(Json<RespApplicationError>),

    /// Serialization or the file append failed; nothing was stored.
    #[oai(status = 500)]
    InternalServerError(Json<RespApplicationError>),
}

// Implement the debug record trait for logging.
impl RequestDebug for ReqCreateApplication {
    type Req = ReqCreateApplication;
    fn get_request_info(&self) -> String {
        let mut s = String::with_capacity(255);
        s.push_str("  Request body:");
        s.push_str("\n    name: ");
        s.push_str(&raw_field(&self.name));
        s.push_str("\n    email: ");
        s.push_str(&raw_field(&self.email));
        s.push_str("\n    phone: ");
        s.push_str(&raw_field(&self.phone));
        s.push_str("\n    plan: ");
        s.push_str(&raw_field(&self.plan));
        s.push('\n');
        s
    }
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl ApplicationsApi {
    #[oai(path = "/applications", method = "post")]
    async fn create_application(&self, http_req: &Request, req: ReqCreateApplicationPayload)
    -> CreateApplicationResponse {
        let body = match &req {
            ReqCreateApplicationPayload::SubmitJson(Json(body)) => body,
            ReqCreateApplicationPayload::SubmitForm(Form(body)) => body,
        };

        // -------------------- Validate Required Fields --------------
        // A client mistake, not a server error, so nothing is logged above
        // debug level and the store is untouched.
        let name  = coerce_field(&body.name);
        let email = coerce_field(&body.email);
        let phone = coerce_field(&body.phone);
        let (name, email, phone) = match (name, email, phone) {
            (Some(name), Some(email), Some(phone)) => (name, email, phone),
            _ => {
                debug!("Rejecting application submission with missing required fields.");
                return CreateApplicationResponse::BadRequest(
                    Json(RespApplicationError::new(MSG_MISSING_FIELDS)));
            },
        };

        // -------------------- Process Request ----------------------
        match RespCreateApplication::process(http_req, body, name, email, phone) {
            Ok(resp) => CreateApplicationResponse::Created(Json(resp)),
            Err(e) => {
                let msg = "ERROR: ".to_owned() + e.to_string().as_str();
                error!("{}", msg);
                CreateApplicationResponse::InternalServerError(
                    Json(RespApplicationError::new(MSG_INTERNAL_ERROR)))
            },
        }
    }
}

// ***************************************************************************
//                          Request/Response Methods
// ***************************************************************************
impl RespCreateApplication {
    /// Create a new response.
    fn new() -> Self {
        Self { ok: true }
    }

    /// Process the request.  Validation happened before this point; any
    /// error raised here is a server-side failure.
    fn process(http_req: &Request, body: &ReqCreateApplication,
               name: String, email: String, phone: String) -> Result<RespCreateApplication> {
        // Conditional logging depending on log level.
        intake_utils::debug_request(http_req, body);

        // Build the record from the validated fields and request metadata.
        // Header-derived values are untrusted and stored verbatim.
        let record = ApplicationRecord {
            name,
            email,
            phone,
            plan: coerce_field(&body.plan),
            user_agent: intake_utils::get_header(http_req, USER_AGENT),
            referrer: intake_utils::get_header(http_req, REFERER),
            ip: intake_utils::client_ip(http_req),
            created_at: timestamp_utc_to_str(timestamp_utc()),
        };

        // Exactly one line lands in the store per successful call.
        RUNTIME_CTX.store.append(&record)?;
        info!("Stored application for '{}'.", record.email);
        Ok(Self::new())
    }
}

impl RespApplicationError {
    /// Create a new error response.
    fn new(msg: &str) -> Self {
        Self { error: msg.to_string() }
    }
}

// ***************************************************************************
//                             Private Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// coerce_field:
// ---------------------------------------------------------------------------
/** Reduce an untrusted body field to a trimmed, non-empty string.  String,
 * number and boolean scalars coerce to their string renderings; null, arrays,
 * objects and absent keys all count as missing, as does a value that trims
 * to the empty string.
 */
fn coerce_field(value: &Option<Value>) -> Option<String> {
    let value = value.as_ref()?;
    let coerced = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let trimmed = coerced.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ---------------------------------------------------------------------------
// raw_field:
// ---------------------------------------------------------------------------
// Render a body field for debug logging.
fn raw_field(value: &Option<Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "None".to_string(),
    }
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::coerce_field;
    use serde_json::{json, Value};

    fn field(v: Value) -> Option<Value> {
        Some(v)
    }

    #[test]
    fn coerce_trims_strings() {
        assert_eq!(coerce_field(&field(json!("  Jane  "))), Some("Jane".to_string()));
        assert_eq!(coerce_field(&field(json!("Jane Doe"))), Some("Jane Doe".to_string()));
    }

    #[test]
    fn coerce_accepts_scalars() {
        assert_eq!(coerce_field(&field(json!(5551234))), Some("5551234".to_string()));
        assert_eq!(coerce_field(&field(json!(true))), Some("true".to_string()));
    }

    #[test]
    fn coerce_rejects_missing_empty_and_composite() {
        assert_eq!(coerce_field(&None), None);
        assert_eq!(coerce_field(&field(json!(""))), None);
        assert_eq!(coerce_field(&field(json!("   "))), None);
        assert_eq!(coerce_field(&field(json!(null))), None);
        assert_eq!(coerce_field(&field(json!(["a"]))), None);
        assert_eq!(coerce_field(&field(json!({"a": 1}))), None);
    }
}
