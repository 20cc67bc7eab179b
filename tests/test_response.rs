use switchyard::http::response::{Response, ResponseBuilder, StatusCode};
use switchyard::http::writer::serialize_response;

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::NotImplemented.as_u16(), 501);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::BadRequest.reason_phrase(), "Bad Request");
    assert_eq!(StatusCode::NotImplemented.reason_phrase(), "Not Implemented");
}

#[test]
fn test_response_builder_basic() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .body(b"Hello, World!".to_vec())
        .build();

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.body, b"Hello, World!".to_vec());
    assert_eq!(response.header("Content-Length"), Some("13"));
}

#[test]
fn test_response_builder_keeps_explicit_content_length() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Length", "99")
        .body(b"abc".to_vec())
        .build();

    let lengths: Vec<_> = response
        .headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .collect();
    assert_eq!(lengths.len(), 1);
    assert_eq!(response.header("content-length"), Some("99"));
}

#[test]
fn test_response_builder_replaces_header_in_place() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", "text/html")
        .header("X-Custom", "1")
        .header("content-type", "text/plain")
        .build();

    assert_eq!(response.headers[0], ("Content-Type".to_string(), "text/plain".to_string()));
    assert_eq!(response.headers[1].0, "X-Custom");
}

#[test]
fn test_text_responses() {
    let bad = Response::bad_request();
    assert_eq!(bad.status, StatusCode::BadRequest);
    assert_eq!(bad.body, b"400 Bad Request\n".to_vec());
    assert_eq!(bad.header("content-type"), Some("text/plain; charset=utf-8"));

    let refused = Response::not_implemented();
    assert_eq!(refused.status, StatusCode::NotImplemented);
    assert_eq!(refused.header("Content-Length"), Some("20"));
}

#[test]
fn test_serialize_response() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Server", "switchyard")
        .body(b"ok".to_vec())
        .build();

    let bytes = serialize_response(&response);

    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        "HTTP/1.1 200 OK\r\nServer: switchyard\r\nContent-Length: 2\r\n\r\nok"
    );
}
