//! CEL expressions selecting the requests an [`IrHttpMatch`] describes.

use crate::ir::{IrHttpMatch, PathType, StringMatch, ValueMatch};

/// Single quoted CEL string literal.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if matches!(c, '\\' | '\'') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Escapes RE2 metacharacters so `value` matches literally.
pub fn regex_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn value_test(value: &StringMatch) -> String {
    match value {
        StringMatch::Exact(exact) => format!("v == {}", quote(exact)),
        StringMatch::Regex(regex) => format!("v.matches({})", quote(regex)),
    }
}

fn header_expression(header: &ValueMatch) -> String {
    format!(
        "getReqHeader({}).exists(v, {})",
        quote(&header.name.to_ascii_lowercase()),
        value_test(&header.value)
    )
}

fn query_expression(param: &ValueMatch) -> String {
    format!(
        "req.url.query_params[{}].exists(v, {})",
        quote(&param.name),
        value_test(&param.value)
    )
}

/// Expressions that must all hold for a request to match. The path test
/// always comes first.
pub fn match_expressions(matcher: &IrHttpMatch) -> Vec<String> {
    let path = quote(&matcher.path);
    let mut expressions = vec![match matcher.path_type {
        PathType::Exact => format!("req.url.path == {path}"),
        PathType::Prefix => format!("req.url.path.startsWith({path})"),
        PathType::Regex => format!("req.url.path.matches({path})"),
    }];
    expressions.extend(matcher.headers.iter().map(header_expression));
    expressions.extend(matcher.query_params.iter().map(query_expression));
    if let Some(method) = &matcher.method {
        expressions.push(format!("req.method == {}", quote(method)));
    }
    expressions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_and_escapes() {
        assert_eq!(quote("/api"), "'/api'");
        assert_eq!(quote(r"it's \d"), r"'it\'s \\d'");
        assert_eq!(regex_escape("/v1.0/(x)"), r"/v1\.0/\(x\)");
    }

    #[test]
    fn path_expressions() {
        assert_eq!(
            match_expressions(&IrHttpMatch::exact("/healthz")),
            vec!["req.url.path == '/healthz'"]
        );
        assert_eq!(
            match_expressions(&IrHttpMatch::prefix("/api")),
            vec!["req.url.path.startsWith('/api')"]
        );
        assert_eq!(
            match_expressions(&IrHttpMatch::regex(r"^/v\d+/")),
            vec![r"req.url.path.matches('^/v\\d+/')"]
        );
    }

    #[test]
    fn constraints_follow_the_path() {
        let matcher = IrHttpMatch::prefix("/api")
            .with_header(ValueMatch::exact("X-Canary", "1"))
            .with_header(ValueMatch {
                name: "user-agent".into(),
                value: StringMatch::Regex("^curl".into()),
            })
            .with_query_param(ValueMatch::exact("debug", "true"))
            .with_method("POST");

        assert_eq!(
            match_expressions(&matcher),
            vec![
                "req.url.path.startsWith('/api')",
                "getReqHeader('x-canary').exists(v, v == '1')",
                "getReqHeader('user-agent').exists(v, v.matches('^curl'))",
                "req.url.query_params['debug'].exists(v, v == 'true')",
                "req.method == 'POST'",
            ]
        );
    }
}
