use std::convert::Infallible;
use hyper::StatusCode;
use serde::Serialize;
use tracing::error;
use warp::Reply;
use crate::errors::GatewayError;
use crate::middleware::add_retry_after;


#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_reply(code: StatusCode, message: &str) -> warp::reply::Response {
    let body = warp::reply::json(&ErrorBody { error: message.to_string() });
    warp::reply::with_status(body, code).into_response()
}

pub async fn handle_rejection(err: warp::Rejection) -> Result<warp::reply::Response, Infallible> {
    if err.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "not found"));
    }

    let response = match err.find::<GatewayError>() {
        Some(GatewayError::RateLimitExceeded { retry_after }) => {
            let mut response = error_reply(StatusCode::TOO_MANY_REQUESTS, "rate limit");
            add_retry_after(response.headers_mut(), *retry_after);
            response
        }
        Some(GatewayError::Timeout) => error_reply(StatusCode::GATEWAY_TIMEOUT, "gateway timeout"),
        Some(GatewayError::InvalidUri(_)) => error_reply(StatusCode::BAD_REQUEST, "bad request"),
        Some(GatewayError::Upstream(_)) => error_reply(StatusCode::BAD_GATEWAY, "bad gateway"),
        None => {
            error!(rejection = ?err, "unhandled rejection");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    };

    Ok(response)
}
