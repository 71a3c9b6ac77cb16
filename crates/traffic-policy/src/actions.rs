//! Constructors for the actions the controller generates itself.

use crate::Action;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const FORWARD_INTERNAL: &str = "forward-internal";
pub const CUSTOM_RESPONSE: &str = "custom-response";
pub const ADD_HEADERS: &str = "add-headers";
pub const REMOVE_HEADERS: &str = "remove-headers";
pub const REDIRECT: &str = "redirect";
pub const URL_REWRITE: &str = "url-rewrite";
pub const TERMINATE_TLS: &str = "terminate-tls";

fn action(type_: &str, config: Value) -> Action {
    Action {
        type_: type_.to_owned(),
        config: Some(config),
    }
}

pub fn forward_internal(url: &str) -> Action {
    action(FORWARD_INTERNAL, json!({ "url": url }))
}

pub fn custom_response(status_code: u16, content: &str) -> Action {
    action(
        CUSTOM_RESPONSE,
        json!({ "status_code": status_code, "content": content }),
    )
}

pub fn add_headers(headers: &BTreeMap<String, String>) -> Action {
    let headers: Map<String, Value> = headers
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    action(ADD_HEADERS, json!({ "headers": headers }))
}

pub fn remove_headers(headers: &[String]) -> Action {
    action(REMOVE_HEADERS, json!({ "headers": headers }))
}

/// `from` is a regular expression over the request URL; `to` may reference
/// its capture groups.
pub fn redirect(from: Option<&str>, to: &str, status_code: u16) -> Action {
    let mut config = json!({ "to": to, "status_code": status_code });
    if let (Some(from), Value::Object(map)) = (from, &mut config) {
        map.insert("from".to_owned(), Value::String(from.to_owned()));
    }
    action(REDIRECT, config)
}

pub fn url_rewrite(from: &str, to: &str) -> Action {
    action(URL_REWRITE, json!({ "from": from, "to": to }))
}

pub fn terminate_tls(certificate_pem: &str, private_key_pem: &str) -> Action {
    action(
        TERMINATE_TLS,
        json!({
            "server_certificate": certificate_pem,
            "server_private_key": private_key_pem,
        }),
    )
}
