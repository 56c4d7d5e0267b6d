use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, HeaderMap, Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, error, info};
use warp::{http::Uri, Filter, Rejection, Reply};

use crate::config::STRIP_PATH_PREFIX;
use crate::errors::GatewayError;
use crate::handlers::handle_rejection;
use crate::middleware::{add_rate_limit_headers, mark_cache};
use crate::models::{AppState, CachedResponse};
use crate::services::{
    cache_key,
    cache_response,
    check_rate_limit,
    client_ip,
    get_cached_response,
    limiter_key,
};

pub type HttpClient = Client<HttpConnector>;

pub fn routes(
    state: AppState,
    client: HttpClient,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health_check = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "OK");

    let state_filter = warp::any().map(move || state.clone());
    let client_filter = warp::any().map(move || client.clone());

    let proxy = warp::any()
        .and(warp::method())
        .and(warp::header::headers_cloned())
        .and(warp::path::full())
        .and(warp::query::raw().or_else(|_| async { Ok::<(String,), Infallible>((String::new(),)) }))
        .and(warp::body::bytes())
        .and(warp::addr::remote())
        .and(state_filter)
        .and(client_filter)
        .and_then(forward);

    health_check.or(proxy).recover(handle_rejection)
}

#[allow(clippy::too_many_arguments)]
async fn forward(
    method: Method,
    headers: HeaderMap,
    full_path: warp::path::FullPath,
    query: String,
    body: Bytes,
    remote: Option<SocketAddr>,
    state: AppState,
    client: HttpClient,
) -> Result<Response<Body>, Rejection> {
    let start_time = Instant::now();
    let path = full_path.as_str();

    let policy = state
        .config
        .policy_for(path)
        .ok_or_else(warp::reject::not_found)?;

    let client_id = client_ip(&headers, remote, state.config.trust_forwarded);
    let decision = check_rate_limit(&state, &limiter_key(policy, path, &client_id), policy)
        .map_err(warp::reject::custom)?;

    let cache_ttl = policy.cache_ttl.filter(|_| method == Method::GET);
    let key = cache_key(policy, &method, path, &query);

    if cache_ttl.is_some() {
        if let Some(mut response) = get_cached_response(&state, &key) {
            mark_cache(response.headers_mut(), true);
            add_rate_limit_headers(response.headers_mut(), &decision);
            debug!(%method, path, "served from cache");
            return Ok(response);
        }
    }

    let forward_path = path.strip_prefix(STRIP_PATH_PREFIX).unwrap_or(path);
    let mut uri_str = format!("{}{}", state.config.backend_base, forward_path);
    if !query.is_empty() {
        uri_str.push('?');
        uri_str.push_str(&query);
    }

    let uri: Uri = uri_str.parse().map_err(|e: hyper::http::uri::InvalidUri| {
        error!(uri = %uri_str, error = %e, "failed to parse upstream URI");
        warp::reject::custom(GatewayError::InvalidUri(e.to_string()))
    })?;

    let mut req_builder = Request::builder()
        .method(method.clone())
        .uri(uri);

    for (name, value) in headers.iter() {
        if *name != hyper::header::HOST {
            req_builder = req_builder.header(name, value);
        }
    }

    let req = req_builder.body(Body::from(body)).map_err(|e| {
        error!(error = %e, "failed to build upstream request");
        warp::reject::custom(GatewayError::Upstream(e.to_string()))
    })?;

    // One deadline covers both the response head and the full body.
    let exchange = async move {
        let response = client.request(req).await?;
        let (parts, body) = response.into_parts();
        let body_bytes = hyper::body::to_bytes(body).await?;
        Ok::<_, hyper::Error>((parts, body_bytes))
    };

    let (parts, body_bytes) = match timeout(state.config.request_timeout, exchange).await {
        Ok(result) => result.map_err(|e| {
            error!(error = %e, "failed to forward request");
            warp::reject::custom(GatewayError::Upstream(e.to_string()))
        })?,
        Err(_) => {
            error!(%method, path, timeout_ms = state.config.request_timeout.as_millis() as u64, "upstream timed out");
            return Err(warp::reject::custom(GatewayError::Timeout));
        }
    };

    if let Some(ttl) = cache_ttl {
        let cached = CachedResponse {
            status: parts.status,
            headers: parts.headers.clone(),
            body: body_bytes.clone(),
        };
        cache_response(&state, &key, cached, ttl);
    }

    let mut response = Response::new(Body::from(body_bytes));
    *response.status_mut() = parts.status;
    *response.headers_mut() = parts.headers;

    if cache_ttl.is_some() {
        mark_cache(response.headers_mut(), false);
    }
    add_rate_limit_headers(response.headers_mut(), &decision);

    info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "proxied request"
    );

    Ok(response)
}
