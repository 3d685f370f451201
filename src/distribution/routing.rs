// ABOUTME: Request routing across production and staging distributions.
// ABOUTME: Resolves the serving distribution and answers from the object store.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{HeaderMap, Request, Response, StatusCode};

use super::DistributionError;
use super::edge::{DistributionRecord, EdgeOps};
use crate::objects::ObjectStore;
use crate::types::DistributionId;

/// Response header naming the distribution that served a request.
pub const SERVED_BY_HEADER: &str = "x-edge-distribution";

const INDEX: &str = "/index.html";

/// Distribution that serves a request with `headers` sent to `production`.
///
/// Traffic goes to staging only while an enabled policy is attached and its
/// predicate matches exactly.
pub async fn route(
    edge: &dyn EdgeOps,
    production: &DistributionId,
    headers: &HeaderMap,
) -> Result<DistributionRecord, DistributionError> {
    let primary = edge.get_distribution(production).await?;
    let Some(policy_id) = &primary.config.continuous_deployment_policy else {
        return Ok(primary);
    };

    let policy = match edge.get_policy(policy_id).await {
        Ok(policy) => policy,
        Err(e) if e.is_not_found() => return Ok(primary),
        Err(e) => return Err(e),
    };
    if !policy.config.enabled || !policy.config.predicate.matches(headers) {
        return Ok(primary);
    }

    match edge
        .get_distribution(&policy.config.staging_distribution)
        .await
    {
        Ok(staging) => Ok(staging),
        Err(e) if e.is_not_found() => Ok(primary),
        Err(e) => Err(e),
    }
}

/// Answer `request` the way the edge would.
///
/// `/` serves the index; unknown paths fall back to the index with status 200
/// so client-side routes resolve. A missing index is a 404.
pub async fn serve<B>(
    edge: &dyn EdgeOps,
    objects: &dyn ObjectStore,
    production: &DistributionId,
    request: &Request<B>,
) -> Result<Response<Full<Bytes>>, DistributionError> {
    let distribution = route(edge, production, request.headers()).await?;
    let origin = distribution.config.origin_path.trim_end_matches('/');

    let path = match request.uri().path() {
        "" | "/" => INDEX,
        path => path,
    };

    let (status, path, body) = match fetch(objects, origin, path).await? {
        Some(body) => (StatusCode::OK, path, body),
        None => match fetch(objects, origin, INDEX).await? {
            Some(body) => (StatusCode::OK, INDEX, body),
            None => (StatusCode::NOT_FOUND, path, Bytes::from_static(b"Not Found")),
        },
    };

    let content_type = if status == StatusCode::OK {
        content_type(path)
    } else {
        "text/plain"
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(distribution.id.as_str()) {
        response.headers_mut().insert(SERVED_BY_HEADER, value);
    }
    Ok(response)
}

async fn fetch(
    objects: &dyn ObjectStore,
    origin: &str,
    path: &str,
) -> Result<Option<Bytes>, DistributionError> {
    match objects.get(&format!("{origin}{path}")).await {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(crate::objects::ObjectStoreError::InvalidPath(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn content_type(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
