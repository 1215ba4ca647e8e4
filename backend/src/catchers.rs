use rocket::{Request, catch, serde::json::Json};
use shared::{Error, ErrorCategory};

fn body(code: ErrorCategory, message: &str) -> Json<Error> {
    Json(Error::new(code, message))
}

#[catch(400)]
pub fn bad_request(_req: &Request) -> Json<Error> {
    body(ErrorCategory::Validation, "Invalid request parameters.")
}

#[catch(401)]
pub fn unauthorized(_req: &Request) -> Json<Error> {
    body(ErrorCategory::Authorization, "Your identity could not be verified.")
}

#[catch(403)]
pub fn forbidden(_req: &Request) -> Json<Error> {
    body(ErrorCategory::State, "Voting is closed.")
}

#[catch(404)]
pub fn not_found(_req: &Request) -> Json<Error> {
    body(ErrorCategory::State, "The requested resource was not found.")
}

#[catch(409)]
pub fn conflict(_req: &Request) -> Json<Error> {
    body(ErrorCategory::Conflict, "You already voted.")
}

#[catch(422)]
pub fn unprocessable(_req: &Request) -> Json<Error> {
    body(ErrorCategory::Validation, "Malformed request body.")
}

#[catch(429)]
pub fn too_many_requests(_req: &Request) -> Json<Error> {
    body(ErrorCategory::Transient, "Rate limit exceeded. Please wait before trying again.")
}

#[catch(500)]
pub fn internal_error(_req: &Request) -> Json<Error> {
    body(ErrorCategory::Internal, "An internal server error occurred.")
}

#[catch(503)]
pub fn unavailable(_req: &Request) -> Json<Error> {
    body(ErrorCategory::Transient, "Temporarily unavailable. Please retry.")
}
