//! Integration tests for generated names, name templates and check URLs

mod common;

use std::collections::HashSet;

use ingress_monitor_operator::adapters::naming::{
    ingress_monitor_name, is_valid_label_value, monitor_url, render_name, rule_hosts, short_hash,
    validate_name_template, NameFields, DEFAULT_HEALTH_PATH, HOST_HASH_LEN,
};
use ingress_monitor_operator::Error;

fn fields() -> NameFields<'static> {
    NameFields {
        ingress_name: "go-ingress",
        ingress_namespace: "testing",
    }
}

// ============================================================================
// Host Hash Tests
// ============================================================================

#[test]
fn short_hash_is_lowercase_base32hex_of_fixed_length() {
    let hash = short_hash("api.example.com");

    assert_eq!(hash.len(), HOST_HASH_LEN);
    assert!(hash
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='v').contains(&c)));
}

#[test]
fn short_hash_matches_known_value() {
    assert_eq!(short_hash("api.example.com"), "oer7954354ngni99");
    assert_eq!(short_hash("www.example.com"), "mj4u3nf04o212ip2");
}

#[test]
fn ingress_monitor_name_is_stable() {
    let first = ingress_monitor_name("go-ingress", "api.example.com");
    let second = ingress_monitor_name("go-ingress", "api.example.com");

    assert_eq!(first, second);
    assert_eq!(first, "go-ingress-oer7954354ngni99");
}

#[test]
fn ingress_monitor_name_differs_per_host() {
    let names: HashSet<String> = (0..1000)
        .map(|i| ingress_monitor_name("go-ingress", &format!("host-{}.example.com", i)))
        .collect();

    assert_eq!(names.len(), 1000);
}

#[test]
fn ingress_monitor_name_is_bounded() {
    let long_name = "a".repeat(300);
    let name = ingress_monitor_name(&long_name, "api.example.com");

    assert!(name.len() <= 253);
    assert!(name.ends_with(&short_hash("api.example.com")));
}

#[test]
fn ingress_monitor_name_is_lowercase() {
    let name = ingress_monitor_name("Go-Ingress", "API.example.com");
    assert_eq!(name, name.to_lowercase());
}

// ============================================================================
// Name Template Tests
// ============================================================================

#[test]
fn render_name_substitutes_fields() {
    let name = render_name("test-{{.IngressName}}-{{.IngressNamespace}}", fields()).unwrap();
    assert_eq!(name, "test-go-ingress-testing");
}

#[test]
fn render_name_allows_spaces_in_placeholders() {
    let name = render_name("{{ .IngressNamespace }}/{{ .IngressName }}", fields()).unwrap();
    assert_eq!(name, "testing/go-ingress");
}

#[test]
fn render_name_without_placeholders_is_unchanged() {
    assert_eq!(render_name("static name", fields()).unwrap(), "static name");
}

#[test]
fn render_name_rejects_unknown_placeholder() {
    let result = render_name("{{.Host}}", fields());
    assert!(matches!(result, Err(Error::TemplateError(_))));
}

#[test]
fn render_name_rejects_unclosed_placeholder() {
    let result = render_name("test-{{.IngressName", fields());
    assert!(matches!(result, Err(Error::TemplateError(_))));
}

#[test]
fn validate_name_template_rejects_stray_braces() {
    assert!(validate_name_template("test-}}").is_err());
    assert!(validate_name_template("test-{{.IngressName}}").is_ok());
}

// ============================================================================
// URL Tests
// ============================================================================

#[test]
fn monitor_url_uses_https_for_tls_hosts() {
    let ingress = common::go_ingress();
    assert_eq!(
        monitor_url(&ingress, "api.example.com", Some("/test-healthz")),
        "https://api.example.com/test-healthz"
    );
}

#[test]
fn monitor_url_uses_http_and_default_path() {
    let ingress = common::ingress("plain", &[], &["www.example.com"], &[]);
    assert_eq!(
        monitor_url(&ingress, "www.example.com", None),
        format!("http://www.example.com{}", DEFAULT_HEALTH_PATH)
    );
}

#[test]
fn rule_hosts_skips_empty_and_duplicate_hosts() {
    let ingress = common::ingress(
        "multi",
        &[],
        &["a.example.com", "", "b.example.com", "a.example.com"],
        &[],
    );

    assert_eq!(rule_hosts(&ingress), vec!["a.example.com", "b.example.com"]);
}

#[test]
fn rule_hosts_skips_hosts_unusable_as_label_values() {
    let long_host = format!("{}.example.com", "a".repeat(60));
    let ingress = common::ingress(
        "wild",
        &[],
        &["*.example.com", long_host.as_str(), "api.example.com"],
        &[],
    );

    assert_eq!(rule_hosts(&ingress), vec!["api.example.com"]);
}

#[test]
fn label_value_validation() {
    assert!(is_valid_label_value("api.example.com"));
    assert!(is_valid_label_value(""));
    assert!(!is_valid_label_value("*.example.com"));
    assert!(!is_valid_label_value("example.com."));
    assert!(!is_valid_label_value(&"a".repeat(64)));
}
