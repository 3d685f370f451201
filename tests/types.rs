// ABOUTME: Integration tests for type-safe identifiers and validated types.
// ABOUTME: Tests service names, versions, ids, and header predicates.

use edgeswap::types::*;

mod service_name_tests {
    use super::*;

    #[test]
    fn valid_dns_name() {
        let name = ServiceName::new("my-service").unwrap();
        assert_eq!(name.as_str(), "my-service");
    }

    #[test]
    fn empty_returns_error() {
        assert_eq!(ServiceName::new(""), Err(ServiceNameError::Empty));
    }

    #[test]
    fn too_long_returns_error() {
        let long_name = "a".repeat(64);
        assert_eq!(ServiceName::new(&long_name), Err(ServiceNameError::TooLong));
    }

    #[test]
    fn hyphen_edges_return_error() {
        assert!(ServiceName::new("-service").is_err());
        assert!(ServiceName::new("service-").is_err());
    }

    #[test]
    fn uppercase_returns_error() {
        assert_eq!(
            ServiceName::new("MyService"),
            Err(ServiceNameError::NotLowercase)
        );
    }

    #[test]
    fn key_paths_are_namespaced() {
        let name = ServiceName::new("shop").unwrap();
        assert_eq!(name.key_path("version/frontend"), "/shop/version/frontend");
    }

    #[test]
    fn deserializing_validates() {
        assert!(serde_json::from_str::<ServiceName>("\"Shop\"").is_err());
        let name: ServiceName = serde_json::from_str("\"shop\"").unwrap();
        assert_eq!(name.as_str(), "shop");
    }
}

mod version_tests {
    use super::*;

    #[test]
    fn accepts_release_like_versions() {
        for raw in ["v1", "2024.06.01", "1.2.3-rc.1", "build_42", "1.0.0+sha.abc"] {
            assert!(Version::new(raw).is_ok(), "{raw} should be valid");
        }
    }

    #[test]
    fn rejects_path_separators() {
        assert_eq!(Version::new("v1/evil"), Err(VersionError::InvalidChar('/')));
        assert!(matches!(Version::new(".."), Err(VersionError::Reserved(_))));
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert_eq!(Version::new("  "), Err(VersionError::Empty));
        assert_eq!(Version::new(&"a".repeat(129)), Err(VersionError::TooLong));
    }

    #[test]
    fn origin_path_round_trip() {
        let version = Version::new("v2").unwrap();
        assert_eq!(version.origin_path(), "/v2");
        assert_eq!(version.object_prefix(), "/v2/");
        assert_eq!(Version::from_origin_path("/v2").unwrap(), version);
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn ids_store_value() {
        let id = DistributionId::new("EPROD000001");
        assert_eq!(id.as_str(), "EPROD000001");
        assert_eq!(id.to_string(), "EPROD000001");
    }

    #[test]
    fn ids_serialize_as_strings() {
        let id = PolicyId::new("CDP000003");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"CDP000003\"");
        let back: PolicyId = serde_json::from_str("\"CDP000003\"").unwrap();
        assert_eq!(back, id);
    }
}

mod header_predicate_tests {
    use super::*;
    use hyper::HeaderMap;
    use hyper::header::HeaderValue;

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn matches_exact_value_only() {
        let predicate = HeaderPredicate::new("aws-cf-cd-staging", "true").unwrap();
        assert!(predicate.matches(&headers("aws-cf-cd-staging", "true")));
        assert!(!predicate.matches(&headers("aws-cf-cd-staging", "TRUE")));
        assert!(!predicate.matches(&headers("aws-cf-cd-staging", "true ")));
        assert!(!predicate.matches(&HeaderMap::new()));
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        assert!(matches!(
            HeaderPredicate::new("bad header", "true"),
            Err(HeaderPredicateError::InvalidName(_))
        ));
    }

    #[test]
    fn displays_as_header_line() {
        let predicate = HeaderPredicate::new("x-preview", "blue").unwrap();
        assert_eq!(predicate.to_string(), "x-preview: blue");
    }
}
