//! CORS HTTP filter and per-route CORS policies

use envoy_types::pb::envoy::extensions::filters::http::cors::v3::{
    Cors as CorsFilter, CorsPolicy as FilterCorsPolicy,
};
use envoy_types::pb::envoy::r#type::matcher::v3::string_matcher::MatchPattern;
use envoy_types::pb::envoy::r#type::matcher::v3::{RegexMatcher, StringMatcher};
use envoy_types::pb::google::protobuf::{Any as EnvoyAny, BoolValue};

use crate::domain::route::{
    ATTR_CORS_ALLOW_CREDENTIALS, ATTR_CORS_ALLOW_HEADERS, ATTR_CORS_ALLOW_METHODS,
    ATTR_CORS_EXPOSE_HEADERS, ATTR_CORS_MAX_AGE,
};
use crate::domain::Attributes;
use crate::xds::filters::any_from_message;

pub const CORS_FILTER_NAME: &str = "envoy.filters.http.cors";
pub const CORS_FILTER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.cors.v3.Cors";
pub const CORS_POLICY_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.cors.v3.CorsPolicy";

/// Origins are not restricted per route; any origin matches.
const ALLOW_ANY_ORIGIN: &str = ".";

/// Listener-level CORS filter. Policies live on the routes.
pub fn cors_filter() -> EnvoyAny {
    any_from_message(CORS_FILTER_TYPE_URL, &CorsFilter::default())
}

/// CORS settings read from a route's attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorsSettings {
    pub allow_methods: String,
    pub allow_headers: String,
    pub expose_headers: String,
    pub max_age: String,
    pub allow_credentials: bool,
}

impl CorsSettings {
    /// `None` unless at least one CORS attribute is present.
    pub fn from_attributes(attributes: &Attributes) -> Option<Self> {
        let present = [
            ATTR_CORS_ALLOW_CREDENTIALS,
            ATTR_CORS_ALLOW_METHODS,
            ATTR_CORS_ALLOW_HEADERS,
            ATTR_CORS_EXPOSE_HEADERS,
            ATTR_CORS_MAX_AGE,
        ]
        .iter()
        .any(|name| attributes.contains(name));

        if !present {
            return None;
        }

        Some(Self {
            allow_methods: attributes.get_string(ATTR_CORS_ALLOW_METHODS, ""),
            allow_headers: attributes.get_string(ATTR_CORS_ALLOW_HEADERS, ""),
            expose_headers: attributes.get_string(ATTR_CORS_EXPOSE_HEADERS, ""),
            max_age: attributes.get_string(ATTR_CORS_MAX_AGE, ""),
            allow_credentials: attributes.get_flag(ATTR_CORS_ALLOW_CREDENTIALS),
        })
    }

    pub fn to_proto(&self) -> FilterCorsPolicy {
        FilterCorsPolicy {
            allow_origin_string_match: vec![StringMatcher {
                match_pattern: Some(MatchPattern::SafeRegex(RegexMatcher {
                    regex: ALLOW_ANY_ORIGIN.to_string(),
                    ..Default::default()
                })),
                ..Default::default()
            }],
            allow_methods: self.allow_methods.clone(),
            allow_headers: self.allow_headers.clone(),
            expose_headers: self.expose_headers.clone(),
            max_age: self.max_age.clone(),
            allow_credentials: self.allow_credentials.then_some(BoolValue { value: true }),
            ..Default::default()
        }
    }

    /// Per-route typed config for the CORS filter.
    pub fn to_any(&self) -> EnvoyAny {
        any_from_message(CORS_POLICY_TYPE_URL, &self.to_proto())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cors_attributes_means_no_policy() {
        let attributes = Attributes::from_iter([("Cluster", "people")]);
        assert_eq!(CorsSettings::from_attributes(&attributes), None);
    }

    #[test]
    fn single_attribute_enables_policy_with_any_origin() {
        let attributes = Attributes::from_iter([(ATTR_CORS_ALLOW_METHODS, "GET")]);
        let policy = CorsSettings::from_attributes(&attributes).unwrap().to_proto();

        assert_eq!(policy.allow_methods, "GET");
        assert!(policy.allow_credentials.is_none());
        assert_eq!(
            policy.allow_origin_string_match[0].match_pattern,
            Some(MatchPattern::SafeRegex(RegexMatcher { regex: ".".into(), ..Default::default() }))
        );
    }

    #[test]
    fn credentials_only_on_explicit_true() {
        let enabled = Attributes::from_iter([(ATTR_CORS_ALLOW_CREDENTIALS, "true")]);
        let policy = CorsSettings::from_attributes(&enabled).unwrap().to_proto();
        assert_eq!(policy.allow_credentials, Some(BoolValue { value: true }));

        let other = Attributes::from_iter([(ATTR_CORS_ALLOW_CREDENTIALS, "yes")]);
        let policy = CorsSettings::from_attributes(&other).unwrap().to_proto();
        assert!(policy.allow_credentials.is_none());
    }

    #[test]
    fn max_age_and_headers_are_copied() {
        let attributes = Attributes::from_iter([
            (ATTR_CORS_MAX_AGE, "3600"),
            (ATTR_CORS_ALLOW_HEADERS, "supercors"),
            (ATTR_CORS_EXPOSE_HEADERS, "accept"),
        ]);
        let policy = CorsSettings::from_attributes(&attributes).unwrap().to_proto();
        assert_eq!(policy.max_age, "3600");
        assert_eq!(policy.allow_headers, "supercors");
        assert_eq!(policy.expose_headers, "accept");
    }
}
