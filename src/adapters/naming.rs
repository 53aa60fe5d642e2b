//! Deterministic naming and check rendering helpers

use blake2::digest::consts::U10;
use blake2::{Blake2b, Digest};
use data_encoding::BASE32HEX_NOPAD;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::warn;

use crate::{Error, Result};

/// Health path used when the template doesn't configure an endpoint
pub const DEFAULT_HEALTH_PATH: &str = "/_healthz";

/// Length of the host hash appended to generated names
pub const HOST_HASH_LEN: usize = 16;

// Kubernetes object names are DNS subdomains.
const MAX_NAME_LEN: usize = 253;

const MAX_LABEL_VALUE_LEN: usize = 63;

// 10 bytes encode to exactly 16 base32 characters.
type Blake2b80 = Blake2b<U10>;

/// Shortened, lowercase base32hex encoded BLAKE2b hash of `data`
pub fn short_hash(data: &str) -> String {
    let digest = Blake2b80::digest(data.as_bytes());
    let mut encoded = BASE32HEX_NOPAD.encode(&digest).to_lowercase();
    encoded.truncate(HOST_HASH_LEN);
    encoded
}

/// Name of the IngressMonitor generated for an Ingress rule host
///
/// The same `(ingress, host)` pair always yields the same name.
pub fn ingress_monitor_name(ingress_name: &str, host: &str) -> String {
    let hash = short_hash(host);
    let max_prefix = MAX_NAME_LEN - HOST_HASH_LEN - 1;

    let mut prefix = ingress_name.to_lowercase();
    if prefix.len() > max_prefix {
        prefix.truncate(max_prefix);
        let trimmed = prefix.trim_end_matches(['-', '.']).len();
        prefix.truncate(trimmed);
    }

    format!("{}-{}", prefix, hash)
}

/// Values available to a check name template
#[derive(Debug, Clone, Copy)]
pub struct NameFields<'a> {
    pub ingress_name: &'a str,
    pub ingress_namespace: &'a str,
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    IngressName,
    IngressNamespace,
}

fn parse_template(template: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }

        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or_else(|| {
            Error::TemplateError(format!("unclosed placeholder in {:?}", template))
        })?;

        let field = after_open[..end].trim();
        let segment = match field {
            ".IngressName" => Segment::IngressName,
            ".IngressNamespace" => Segment::IngressNamespace,
            other => {
                return Err(Error::TemplateError(format!(
                    "unknown placeholder {:?} in {:?}, expected .IngressName or .IngressNamespace",
                    other, template
                )))
            }
        };
        segments.push(segment);

        rest = &after_open[end + 2..];
    }

    if rest.contains("}}") {
        return Err(Error::TemplateError(format!(
            "unexpected '}}}}' in {:?}",
            template
        )));
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }

    Ok(segments)
}

/// Check that a name template only uses known placeholders
pub fn validate_name_template(template: &str) -> Result<()> {
    parse_template(template).map(|_| ())
}

/// Render a check name template
pub fn render_name(template: &str, fields: NameFields<'_>) -> Result<String> {
    let rendered = parse_template(template)?
        .into_iter()
        .map(|segment| match segment {
            Segment::Text(text) => text,
            Segment::IngressName => fields.ingress_name,
            Segment::IngressNamespace => fields.ingress_namespace,
        })
        .collect();
    Ok(rendered)
}

/// Whether the Ingress terminates TLS for `host`
pub fn is_tls_host(ingress: &Ingress, host: &str) -> bool {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.tls.as_ref())
        .map(|tls| {
            tls.iter()
                .filter_map(|entry| entry.hosts.as_ref())
                .any(|hosts| hosts.iter().any(|h| h == host))
        })
        .unwrap_or(false)
}

/// URL to check for `host` on the given Ingress
pub fn monitor_url(ingress: &Ingress, host: &str, endpoint: Option<&str>) -> String {
    let scheme = if is_tls_host(ingress, host) {
        "https://"
    } else {
        "http://"
    };
    let path = endpoint.unwrap_or(DEFAULT_HEALTH_PATH);
    format!("{}{}{}", scheme, host, path)
}

/// Whether `value` can be stored as a Kubernetes label value
pub fn is_valid_label_value(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    let bytes = value.as_bytes();
    value.len() <= MAX_LABEL_VALUE_LEN
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Distinct, non-empty rule hosts of an Ingress, in rule order
///
/// Hosts that can't be used as a label value (wildcards, more than 63
/// characters) are skipped.
pub fn rule_hosts(ingress: &Ingress) -> Vec<String> {
    let mut hosts: Vec<String> = Vec::new();
    let rules = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_ref());

    for host in rules
        .into_iter()
        .flatten()
        .filter_map(|rule| rule.host.as_deref())
    {
        if host.is_empty() || hosts.iter().any(|h| h == host) {
            continue;
        }
        if !is_valid_label_value(host) {
            warn!(
                namespace = %ingress.namespace().unwrap_or_default(),
                ingress = %ingress.name_any(),
                host,
                "Skipping host that is not a valid label value"
            );
            continue;
        }
        hosts.push(host.to_string());
    }

    hosts
}
