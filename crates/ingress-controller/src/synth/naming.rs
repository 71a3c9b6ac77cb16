use crate::ir::{IrService, ListenerProtocol, VirtualHostKey};
use sha2::{Digest, Sha256};

const MAX_NAME_LEN: usize = 63;
const HASH_LEN: usize = 8;

fn short_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"/");
        }
        hasher.update(part.as_bytes());
    }
    let hash = hasher.finalize();
    format!(
        "{:08x}",
        hash[0..4].iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
    )
}

fn clip(name: &str, len: usize) -> &str {
    let cut = (0..=len.min(name.len()))
        .rev()
        .find(|&i| name.is_char_boundary(i))
        .unwrap_or(0);
    name[..cut].trim_end_matches(['-', '.'])
}

fn truncate(name: String) -> String {
    clip(&name, MAX_NAME_LEN).to_owned()
}

/// Keeps `name` when it is short enough and maps back to one source only.
/// Otherwise it is clipped and suffixed with a hash of `source`.
fn disambiguate(name: String, source: &str, lossless: bool) -> String {
    if lossless && name.len() <= MAX_NAME_LEN {
        return name;
    }
    let hash = short_hash(&[source]);
    format!("{}-{hash}", clip(&name, MAX_NAME_LEN - HASH_LEN - 1))
}

/// Stable name for the internal endpoint of one upstream. The hash prefix
/// keeps services with the same name but different identity apart.
pub fn upstream_name(service: &IrService) -> String {
    let port = service.port.to_string();
    truncate(format!(
        "{}-{}-{}-{}",
        short_hash(&[&service.uid, &service.namespace, &port]),
        service.name,
        service.namespace,
        service.port
    ))
}

pub fn internal_url(name: &str) -> String {
    format!("https://{name}.internal")
}

pub fn upstream_url(service: &IrService, cluster_domain: &str) -> String {
    format!(
        "{}://{}.{}.{}:{}",
        service.scheme, service.name, service.namespace, cluster_domain, service.port
    )
}

/// In-cluster address a legacy tunnel forwards to.
pub fn forwards_to(service: &IrService, cluster_domain: &str) -> String {
    format!(
        "{}.{}.{}:{}",
        service.name, service.namespace, cluster_domain, service.port
    )
}

fn hostname_slug(hostname: &str) -> String {
    hostname.replace('*', "wildcard")
}

/// Domain resource name for a hostname. Hostnames whose slug could also come
/// from another hostname carry a hash suffix.
pub fn domain_name(hostname: &str) -> String {
    let lossless = !hostname.contains(['*', '-']);
    disambiguate(
        hostname_slug(hostname).replace('.', "-"),
        hostname,
        lossless,
    )
}

/// Resource name for the public endpoint of a virtual host.
pub fn endpoint_name(key: &VirtualHostKey) -> String {
    let mut name = hostname_slug(&key.hostname);
    if key.protocol() == ListenerProtocol::Http {
        name.push_str("-http");
    }
    if let Some(port) = key.explicit_port() {
        name.push_str(&format!("-{port}"));
    }
    disambiguate(name, &endpoint_url(key), !key.hostname.contains('*'))
}

pub fn endpoint_url(key: &VirtualHostKey) -> String {
    match key.explicit_port() {
        Some(port) => format!("{}://{}:{port}", key.protocol().scheme(), key.hostname),
        None => format!("{}://{}", key.protocol().scheme(), key.hostname),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrListener, UpstreamProtocol};

    fn service(uid: &str, name: &str, port: i32) -> IrService {
        IrService {
            uid: uid.into(),
            namespace: "default".into(),
            name: name.into(),
            port,
            scheme: "http".into(),
            protocol: UpstreamProtocol::Http1,
        }
    }

    #[test]
    fn upstream_names_are_stable_and_bounded() {
        let a = upstream_name(&service("uid-1", "web", 80));
        assert_eq!(a, upstream_name(&service("uid-1", "web", 80)));
        assert_ne!(a, upstream_name(&service("uid-2", "web", 80)));
        assert!(a.ends_with("-web-default-80"));
        assert_eq!(a.len(), 8 + "-web-default-80".len());

        let long = upstream_name(&service("uid-1", &"x".repeat(70), 80));
        assert!(long.len() <= MAX_NAME_LEN);
        assert!(!long.ends_with('-'));
    }

    #[test]
    fn urls() {
        let svc = service("uid-1", "web", 8080);
        assert_eq!(
            upstream_url(&svc, "svc.cluster.local"),
            "http://web.default.svc.cluster.local:8080"
        );
        assert_eq!(forwards_to(&svc, "cluster.test"), "web.default.cluster.test:8080");
        assert_eq!(internal_url("abc"), "https://abc.internal");
    }

    #[test]
    fn endpoint_names_and_urls_follow_the_listener() {
        let ingress = VirtualHostKey::hostname("*.example.com");
        assert!(endpoint_name(&ingress).starts_with("wildcard.example.com-"));
        assert_eq!(endpoint_url(&ingress), "https://*.example.com");
        assert_eq!(domain_name("a.example.com"), "a-example-com");

        let http = VirtualHostKey {
            hostname: "a.example.com".into(),
            listener: Some(IrListener {
                port: 8080,
                protocol: ListenerProtocol::Http,
            }),
        };
        assert_eq!(endpoint_name(&http), "a.example.com-http-8080");
        assert_eq!(endpoint_url(&http), "http://a.example.com:8080");

        let https = VirtualHostKey {
            hostname: "a.example.com".into(),
            listener: Some(IrListener {
                port: 443,
                protocol: ListenerProtocol::Https,
            }),
        };
        assert_eq!(endpoint_name(&https), "a.example.com");
        assert_eq!(endpoint_url(&https), "https://a.example.com");
    }

    #[test]
    fn wildcards_do_not_take_a_literal_hosts_name() {
        let wildcard = VirtualHostKey::hostname("*.example.com");
        let literal = VirtualHostKey::hostname("wildcard.example.com");
        assert_eq!(endpoint_name(&literal), "wildcard.example.com");
        assert_ne!(endpoint_name(&wildcard), endpoint_name(&literal));
        assert_eq!(endpoint_name(&wildcard).len(), "wildcard.example.com".len() + 1 + HASH_LEN);

        assert_eq!(domain_name("wildcard.example.com"), "wildcard-example-com");
        assert_ne!(domain_name("*.example.com"), domain_name("wildcard.example.com"));
    }

    #[test]
    fn dashes_and_dots_do_not_collide_in_domain_names() {
        assert_ne!(domain_name("a-b.com"), domain_name("a.b-com"));
        assert!(domain_name("a-b.com").starts_with("a-b-com-"));
        assert_eq!(domain_name("a-b.com"), domain_name("a-b.com"));
    }

    #[test]
    fn long_hostnames_are_bounded_and_distinct() {
        let label = "x".repeat(60);
        let first = format!("{label}.a.example.com");
        let second = format!("{label}.b.example.com");

        let (a, b) = (domain_name(&first), domain_name(&second));
        assert!(a.len() <= MAX_NAME_LEN && b.len() <= MAX_NAME_LEN);
        assert_ne!(a, b);

        let (a, b) = (
            endpoint_name(&VirtualHostKey::hostname(first.as_str())),
            endpoint_name(&VirtualHostKey::hostname(second.as_str())),
        );
        assert!(a.len() <= MAX_NAME_LEN && b.len() <= MAX_NAME_LEN);
        assert!(a.starts_with(&label[..40]));
        assert_ne!(a, b);
    }
}
