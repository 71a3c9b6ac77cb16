/// A listener must name a concrete hostname or a `*.` wildcard below one.
pub fn is_routable_listener_hostname(hostname: Option<&str>) -> bool {
    match hostname.map(str::trim) {
        None | Some("") | Some("*") => false,
        Some(_) => true,
    }
}

/// `*.example.com` matches any host with at least one extra label.
fn matches(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .strip_suffix(suffix)
            .and_then(|rest| rest.strip_suffix('.'))
            .is_some_and(|rest| !rest.is_empty()),
        None => pattern == host,
    }
}

/// The more specific of `listener` and `route` when one matches the other.
pub fn intersect(listener: &str, route: &str) -> Option<String> {
    let listener = listener.to_ascii_lowercase();
    let route = route.to_ascii_lowercase();

    if listener == route || matches(&listener, &route) {
        Some(route)
    } else if matches(&route, &listener) {
        Some(listener)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_needs_an_extra_label() {
        assert_eq!(
            intersect("*.example.com", "foo.example.com").as_deref(),
            Some("foo.example.com")
        );
        assert_eq!(
            intersect("*.example.com", "a.b.example.com").as_deref(),
            Some("a.b.example.com")
        );
        assert_eq!(intersect("*.example.com", "example.com"), None);
        assert_eq!(intersect("*.example.com", "badexample.com"), None);
    }

    #[test]
    fn picks_the_more_specific_side() {
        assert_eq!(
            intersect("foo.example.com", "*.example.com").as_deref(),
            Some("foo.example.com")
        );
        assert_eq!(
            intersect("*.example.com", "*.api.example.com").as_deref(),
            Some("*.api.example.com")
        );
        assert_eq!(
            intersect("A.Example.com", "a.example.com").as_deref(),
            Some("a.example.com")
        );
        assert_eq!(intersect("a.example.com", "b.example.com"), None);
    }

    #[test]
    fn catch_all_listeners_are_not_routable() {
        assert!(!is_routable_listener_hostname(None));
        assert!(!is_routable_listener_hostname(Some("")));
        assert!(!is_routable_listener_hostname(Some("*")));
        assert!(is_routable_listener_hostname(Some("*.example.com")));
    }
}
