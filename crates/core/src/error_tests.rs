// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

use super::*;
use yare::parameterized;

#[parameterized(
    invalid_request = { ErrorKind::InvalidRequest, 400 },
    unsupported = { ErrorKind::Unsupported, 400 },
    unauthenticated = { ErrorKind::Unauthenticated, 401 },
    forbidden = { ErrorKind::Forbidden, 403 },
    not_found = { ErrorKind::NotFound, 404 },
    conflict = { ErrorKind::Conflict, 409 },
    storage_io = { ErrorKind::StorageIo, 500 },
    internal = { ErrorKind::Internal, 500 },
    upstream = { ErrorKind::Upstream, 502 },
)]
fn status_codes(kind: ErrorKind, code: u16) {
    assert_eq!(kind.status_code(), code);
}

#[test]
fn error_response_wire_shape() {
    let body = ErrorResponse::new(ErrorKind::Forbidden, "forbidden");
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json, serde_json::json!({"msg": "forbidden", "status_code": 403}));
}
