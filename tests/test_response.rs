use hearth::http::response::{ResponseBuf, StatusCode, WRITE_BUFFER_SIZE};

#[test]
fn test_status_codes_and_reason_phrases() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);

    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
}

#[test]
fn test_every_error_status_has_a_body() {
    assert!(StatusCode::Ok.error_body().is_none());
    for status in [
        StatusCode::BadRequest,
        StatusCode::Forbidden,
        StatusCode::NotFound,
        StatusCode::InternalServerError,
    ] {
        let body = status.error_body().unwrap();
        assert!(body.ends_with('\n'), "{status:?} body missing newline");
    }
}

#[test]
fn test_compose_success_head() {
    let mut buf = ResponseBuf::new();
    assert!(buf.add_status_line(StatusCode::Ok));
    assert!(buf.add_headers(1024, true));

    let text = std::str::from_utf8(buf.as_bytes()).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Length: 1024\r\n"));
    assert!(text.contains("Content-Type: text/html\r\n"));
    assert!(text.contains("Connection: keep-alive\r\n"));
    assert!(text.ends_with("\r\n\r\n"));
}

#[test]
fn test_compose_full_error_response() {
    let status = StatusCode::NotFound;
    let body = status.error_body().unwrap();
    let mut buf = ResponseBuf::new();
    assert!(buf.add_status_line(status));
    assert!(buf.add_headers(body.len(), false));
    assert!(buf.add_content(body));

    let text = std::str::from_utf8(buf.as_bytes()).unwrap();
    assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(text.contains("Connection: close\r\n"));
    assert!(text.ends_with(body));

    // The head and the body are split exactly by the blank line.
    let header_end = text.find("\r\n\r\n").unwrap() + 4;
    assert_eq!(&text[header_end..], body);
}

#[test]
fn test_clear_allows_recomposition() {
    let mut buf = ResponseBuf::new();
    assert!(buf.add_status_line(StatusCode::Ok));
    buf.clear();
    assert!(buf.is_empty());
    assert!(buf.add_status_line(StatusCode::InternalServerError));
    let text = std::str::from_utf8(buf.as_bytes()).unwrap();
    assert!(text.starts_with("HTTP/1.1 500 Internal Error\r\n"));
}

#[test]
fn test_append_past_capacity_is_refused() {
    let mut buf = ResponseBuf::new();
    let huge = "h".repeat(WRITE_BUFFER_SIZE * 2);
    assert!(!buf.add_content(&huge));
    assert!(buf.is_empty());
}
