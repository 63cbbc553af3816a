use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tags every request with an `x-request-id`, keeping one sent by the client.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    let req_id_value = req.headers().get(&header_name).cloned().or_else(|| {
        HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()
    });

    let Some(req_id_value) = req_id_value else {
        return next.run(req).await;
    };

    // Picked up by the trace span
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}
