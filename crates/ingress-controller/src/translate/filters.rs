//! Gateway API route filters expressed as traffic policy fragments.

use super::backend::{traffic_policy, TRAFFIC_POLICY_KIND};
use crate::crd::gateway::{
    HTTPHeaderFilter, HTTPPathModifier, HTTPRequestRedirectFilter, HTTPRouteFilter,
    HTTPURLRewriteFilter,
};
use crate::crd::ngrok::GROUP as NGROK_GROUP;
use crate::ir::{IrHttpMatch, PathType};
use crate::store::Snapshot;
use crate::synth::expressions::regex_escape;
use std::collections::BTreeMap;
use traffic_policy::{actions, Phase, Rule, TrafficPolicy};

const REPLACE_FULL_PATH: &str = "ReplaceFullPath";
const REPLACE_PREFIX_MATCH: &str = "ReplacePrefixMatch";

#[derive(Debug, Clone, PartialEq)]
pub enum RouteFilter {
    RequestHeaderModifier(HTTPHeaderFilter),
    ResponseHeaderModifier(HTTPHeaderFilter),
    RequestRedirect(HTTPRequestRedirectFilter),
    UrlRewrite(HTTPURLRewriteFilter),
    ExtensionRef { namespace: String, name: String },
    Unsupported(String),
}

impl RouteFilter {
    pub fn from_http_route(route_namespace: &str, filter: &HTTPRouteFilter) -> Self {
        let unsupported = || RouteFilter::Unsupported(filter.type_.clone());
        match filter.type_.as_str() {
            "RequestHeaderModifier" => filter
                .request_header_modifier
                .clone()
                .map_or_else(unsupported, RouteFilter::RequestHeaderModifier),
            "ResponseHeaderModifier" => filter
                .response_header_modifier
                .clone()
                .map_or_else(unsupported, RouteFilter::ResponseHeaderModifier),
            "RequestRedirect" => filter
                .request_redirect
                .clone()
                .map_or_else(unsupported, RouteFilter::RequestRedirect),
            "URLRewrite" => filter
                .url_rewrite
                .clone()
                .map_or_else(unsupported, RouteFilter::UrlRewrite),
            "ExtensionRef" => match &filter.extension_ref {
                Some(ext) if ext.group == NGROK_GROUP && ext.kind == TRAFFIC_POLICY_KIND => {
                    RouteFilter::ExtensionRef {
                        namespace: route_namespace.to_owned(),
                        name: ext.name.clone(),
                    }
                }
                Some(ext) => RouteFilter::Unsupported(format!("ExtensionRef {}/{}", ext.group, ext.kind)),
                None => unsupported(),
            },
            _ => unsupported(),
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, RouteFilter::RequestRedirect(_))
    }

    /// Policy implementing this filter for requests selected by `matcher`.
    /// The caller gates the rules with the match expressions.
    pub fn to_policy(&self, snapshot: &Snapshot, matcher: &IrHttpMatch) -> Result<TrafficPolicy, String> {
        let mut policy = TrafficPolicy::default();
        match self {
            RouteFilter::RequestHeaderModifier(modifier) => {
                header_rules(&mut policy, Phase::OnHttpRequest, modifier)
            }
            RouteFilter::ResponseHeaderModifier(modifier) => {
                header_rules(&mut policy, Phase::OnHttpResponse, modifier)
            }
            RouteFilter::RequestRedirect(redirect) => {
                policy.push(Phase::OnHttpRequest, redirect_rule(redirect, matcher)?)
            }
            RouteFilter::UrlRewrite(rewrite) => {
                for rule in rewrite_rules(rewrite, matcher)? {
                    policy.push(Phase::OnHttpRequest, rule);
                }
            }
            RouteFilter::ExtensionRef { namespace, name } => {
                policy = traffic_policy(snapshot, namespace, name)?;
            }
            RouteFilter::Unsupported(kind) => return Err(format!("unsupported filter {kind}")),
        }
        Ok(policy)
    }
}

fn header_rules(policy: &mut TrafficPolicy, phase: Phase, modifier: &HTTPHeaderFilter) {
    // `set` replaces, so those names are removed before being added again.
    let mut remove: Vec<String> = modifier.remove.clone();
    remove.extend(modifier.set.iter().map(|h| h.name.clone()));
    if !remove.is_empty() {
        policy.push(
            phase,
            Rule::default().with_action(actions::remove_headers(&remove)),
        );
    }

    let add: BTreeMap<String, String> = modifier
        .set
        .iter()
        .chain(modifier.add.iter())
        .map(|h| (h.name.clone(), h.value.clone()))
        .collect();
    if !add.is_empty() {
        policy.push(phase, Rule::default().with_action(actions::add_headers(&add)));
    }
}

/// Regex over the request URL path capturing whatever follows the matched
/// prefix in `${1}`.
fn prefix_capture(matcher: &IrHttpMatch) -> Result<String, String> {
    match matcher.path_type {
        PathType::Prefix => Ok(format!(
            "^{}(.*)$",
            regex_escape(matcher.path.trim_end_matches('/'))
        )),
        _ => Err(format!(
            "{REPLACE_PREFIX_MATCH} requires a prefix path match, got {:?}",
            matcher.path_type
        )),
    }
}

fn replaced_path(modifier: &HTTPPathModifier, matcher: &IrHttpMatch) -> Result<(Option<String>, String), String> {
    match modifier.type_.as_str() {
        REPLACE_FULL_PATH => Ok((
            None,
            modifier.replace_full_path.clone().unwrap_or_else(|| "/".into()),
        )),
        REPLACE_PREFIX_MATCH => {
            let replacement = modifier.replace_prefix_match.clone().unwrap_or_default();
            Ok((
                Some(prefix_capture(matcher)?),
                format!("{}${{1}}", replacement.trim_end_matches('/')),
            ))
        }
        other => Err(format!("unsupported path modifier {other}")),
    }
}

fn redirect_rule(redirect: &HTTPRequestRedirectFilter, matcher: &IrHttpMatch) -> Result<Rule, String> {
    let scheme = redirect
        .scheme
        .clone()
        .unwrap_or_else(|| "${req.url.scheme}".into());
    let host = redirect
        .hostname
        .clone()
        .unwrap_or_else(|| "${req.url.hostname}".into());
    let port = redirect.port.map(|p| format!(":{p}")).unwrap_or_default();

    let (from, path) = match &redirect.path {
        Some(modifier) => replaced_path(modifier, matcher)?,
        None => (None, "${req.url.path}".into()),
    };
    let to = format!("{scheme}://{host}{port}{path}");
    let from = from.map(|regex| format!("^[^:]+://[^/]+{}", regex.trim_start_matches('^')));

    Ok(Rule::default().with_action(actions::redirect(
        from.as_deref(),
        &to,
        redirect.status_code.unwrap_or(302),
    )))
}

fn rewrite_rules(rewrite: &HTTPURLRewriteFilter, matcher: &IrHttpMatch) -> Result<Vec<Rule>, String> {
    let mut rules = Vec::new();
    if let Some(modifier) = &rewrite.path {
        let (from, to) = match replaced_path(modifier, matcher)? {
            (Some(from), to) => (format!("^([^:]+://[^/]+){}", from.trim_start_matches('^')), format!("$1{to}")),
            (None, to) => ("^([^:]+://[^/]+)[^?]*".to_owned(), format!("$1{to}")),
        };
        // Capture groups shift by one behind the scheme and host group.
        let to = to.replace("${1}", "${2}");
        rules.push(Rule::default().with_action(actions::url_rewrite(&from, &to)));
    }
    if let Some(hostname) = &rewrite.hostname {
        rules.push(Rule::default().with_action(actions::url_rewrite(
            "^([^:]+://)[^/:]+",
            &format!("$1{hostname}"),
        )));
    }
    Ok(rules)
}
