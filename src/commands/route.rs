// ABOUTME: Route command implementation.
// ABOUTME: Answers a request against the local edge state to show who serves it.

use super::workspace::Workspace;
use edgeswap::config::Config;
use edgeswap::distribution::{SERVED_BY_HEADER, route as resolve, serve};
use edgeswap::error::{Error, Result};
use edgeswap::output::Output;
use edgeswap::types::Version;
use http_body_util::BodyExt;
use hyper::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use hyper::{HeaderMap, Request};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteReport {
    path: String,
    status: u16,
    distribution: String,
    served_version: Option<Version>,
    content_type: Option<String>,
    bytes: usize,
}

pub async fn route(
    config: &Config,
    path: &str,
    headers: &[String],
    show_body: bool,
    output: Output,
) -> Result<()> {
    let ws = Workspace::open(config)?;
    let production = ws.production().await?;
    let headers = parse_headers(headers)?;

    let mut builder = Request::builder().uri(path);
    for (name, value) in &headers {
        builder = builder.header(name, value);
    }
    let request = builder
        .body(())
        .map_err(|e| Error::InvalidArgument(format!("bad request path '{path}': {e}")))?;

    let distribution = resolve(ws.edge.as_ref(), &production, request.headers()).await?;
    let response = serve(ws.edge.as_ref(), ws.objects.as_ref(), &production, &request).await?;

    let status = response.status();
    let served_by = header_text(response.headers(), SERVED_BY_HEADER);
    let content_type = header_text(response.headers(), CONTENT_TYPE.as_str());
    let body = match response.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    };

    let report = RouteReport {
        path: request.uri().path().to_string(),
        status: status.as_u16(),
        distribution: served_by.unwrap_or_else(|| distribution.id.to_string()),
        served_version: distribution.served_version(),
        content_type,
        bytes: body.len(),
    };

    output.progress(&format!(
        "{} {} via {} ({})",
        report.status,
        report.path,
        report.distribution,
        report
            .served_version
            .as_ref()
            .map_or_else(|| "no version".to_string(), ToString::to_string)
    ));
    if show_body {
        output.progress(&String::from_utf8_lossy(&body));
    }
    output.record("route", &report);
    Ok(())
}

/// Parse `name: value` pairs as given to `-H`.
fn parse_headers(raw: &[String]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let (name, value) = entry.split_once(':').ok_or_else(|| {
            Error::InvalidArgument(format!("header '{entry}' is not 'name: value'"))
        })?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| Error::InvalidArgument(format!("invalid header name '{name}'")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| Error::InvalidArgument(format!("invalid header value in '{entry}'")))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_split_on_first_colon() {
        let headers = parse_headers(&["aws-cf-cd-staging: true".to_string()]).unwrap();
        assert_eq!(headers.get("aws-cf-cd-staging").unwrap(), "true");
    }

    #[test]
    fn header_without_colon_is_rejected() {
        assert!(matches!(
            parse_headers(&["nonsense".to_string()]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
