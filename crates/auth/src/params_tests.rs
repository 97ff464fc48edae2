// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn first_repeated_value_wins() {
    let values = FormValues::from_parts(Some("code=a&code=b&state=s"), None);
    assert_eq!(values.get("code"), Some("a"));
    assert_eq!(values.get("state"), Some("s"));
    assert_eq!(values.get("missing"), None);
}

#[test]
fn body_takes_precedence_over_query() {
    let values = FormValues::from_parts(Some("callback=query&error=e"), Some(b"callback=body"));
    assert_eq!(values.get("callback"), Some("body"));
    assert_eq!(values.get("error"), Some("e"));
}

#[test]
fn values_are_percent_decoded() {
    let values =
        FormValues::from_parts(Some("callback=http%3A%2F%2F127.0.0.1%3A4000%2Fcb%3Fa%3D1"), None);
    assert_eq!(values.get("callback"), Some("http://127.0.0.1:4000/cb?a=1"));
}

#[yare::parameterized(
    empty = { "token=" },
    absent = { "other=x" },
    nothing = { "" },
)]
fn non_empty_skips_blank_values(query: &str) {
    assert_eq!(FormValues::from_parts(Some(query), None).non_empty("token"), None);
}
