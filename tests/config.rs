// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, env var interpolation, discovery, and init scaffolding.

use edgeswap::config::*;
use edgeswap::error::Error;
use edgeswap::types::HeaderPredicate;
use std::collections::HashMap;
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let yaml = r#"
service: shop
repository: acme/shop
recipients: ops@example.com
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.service.as_str(), "shop");
        assert_eq!(config.repository, "acme/shop");
        assert_eq!(config.branch, "main");
        assert_eq!(config.recipients.len(), 1);
        assert_eq!(config.approval.console_url, DEFAULT_CONSOLE_URL);
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
service: shop
repository: acme/shop
branch: release
recipients:
  - ops@example.com
  - qa@example.com
stages_dir: ci/stages
state_dir: /var/lib/edgeswap

continuous_deployment:
  single_header:
    header: x-preview
    value: blue
  staging_cleanup: false

agent:
  timeout: 10m

approval:
  console_url: https://console.example.com/d/
  timeout: 2h

deploy:
  max_attempts: 5
  retry_delay: 30s

lock:
  stale_after: 15m

env:
  API_URL: https://api.example.com
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.branch, "release");
        assert_eq!(config.recipients.len(), 2);
        assert_eq!(
            config.continuous_deployment.single_header,
            HeaderPredicate::new("x-preview", "blue").unwrap()
        );
        assert!(!config.continuous_deployment.staging_cleanup);
        assert_eq!(config.agent.timeout, Duration::from_secs(600));
        assert_eq!(config.approval.timeout, Some(Duration::from_secs(7200)));
        assert_eq!(config.deploy.max_attempts, 5);
        assert_eq!(config.deploy.retry_delay, Duration::from_secs(30));
        assert_eq!(config.lock.stale_after, Duration::from_secs(900));
        assert_eq!(
            config.env.get("API_URL"),
            Some(&EnvValue::Literal("https://api.example.com".to_string()))
        );
    }

    #[test]
    fn boolean_header_value_is_accepted() {
        let yaml = r#"
service: shop
repository: acme/shop
recipients: [ops@example.com]
continuous_deployment:
  single_header:
    header: aws-cf-cd-staging
    value: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(
            config.continuous_deployment.single_header,
            HeaderPredicate::default()
        );
    }
}

mod validation {
    use super::*;

    #[test]
    fn invalid_service_name_fails() {
        let yaml = "service: Shop\nrepository: acme/shop\nrecipients: [ops@example.com]\n";
        assert!(matches!(Config::from_yaml(yaml), Err(Error::Yaml(_))));
    }

    #[test]
    fn empty_recipients_fail() {
        let yaml = "service: shop\nrepository: acme/shop\nrecipients: []\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("at least one recipient"));
    }

    #[test]
    fn blank_recipient_fails() {
        let yaml = "service: shop\nrepository: acme/shop\nrecipients: ['  ']\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn missing_repository_fails() {
        let yaml = "service: shop\nrecipients: [ops@example.com]\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn blank_repository_fails() {
        let yaml = "service: shop\nrepository: ' '\nrecipients: [ops@example.com]\n";
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn step_vars_cannot_shadow_builtin_names() {
        let yaml = r#"
service: shop
repository: acme/shop
recipients: [ops@example.com]
env:
  EDGESWAP_COMMIT: forged
  NODE_ENV: production
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(err.to_string().contains("EDGESWAP_COMMIT"));
        assert!(!err.to_string().contains("NODE_ENV"));
    }

    #[test]
    fn empty_header_value_fails() {
        let yaml = r#"
service: shop
repository: acme/shop
recipients: [ops@example.com]
continuous_deployment:
  single_header:
    header: x-preview
    value: ""
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}

mod env_values {
    use super::*;

    #[test]
    fn literal_and_env_references_resolve() {
        let env_map = HashMap::from([
            ("KEY".to_string(), EnvValue::Literal("literal".to_string())),
            (
                "FROM_ENV".to_string(),
                EnvValue::FromEnv {
                    var: "EDGESWAP_TEST_VAR".to_string(),
                    default: None,
                },
            ),
            (
                "WITH_DEFAULT".to_string(),
                EnvValue::FromEnv {
                    var: "EDGESWAP_TEST_UNSET".to_string(),
                    default: Some("default_value".to_string()),
                },
            ),
        ]);

        temp_env::with_vars(
            [
                ("EDGESWAP_TEST_VAR", Some("from_environment")),
                ("EDGESWAP_TEST_UNSET", None),
            ],
            || {
                let resolved = resolve_stage_env(&env_map).unwrap();
                assert_eq!(resolved.get("KEY"), Some(&"literal".to_string()));
                assert_eq!(
                    resolved.get("FROM_ENV"),
                    Some(&"from_environment".to_string())
                );
                assert_eq!(
                    resolved.get("WITH_DEFAULT"),
                    Some(&"default_value".to_string())
                );
            },
        );
    }

    #[test]
    fn missing_env_var_is_an_error() {
        let value = EnvValue::FromEnv {
            var: "EDGESWAP_TEST_MISSING".to_string(),
            default: None,
        };
        temp_env::with_var_unset("EDGESWAP_TEST_MISSING", || {
            assert!(matches!(value.resolve(), Err(Error::MissingEnvVar(v)) if v == "EDGESWAP_TEST_MISSING"));
        });
    }

    #[test]
    fn yaml_env_reference_parses() {
        let yaml = r#"
service: shop
repository: acme/shop
recipients: [ops@example.com]
env:
  TOKEN:
    env: SHOP_TOKEN
    default: dev
"#;
        let config = Config::from_yaml(yaml).unwrap();
        temp_env::with_var_unset("SHOP_TOKEN", || {
            let settings = config.pipeline_settings().unwrap();
            assert_eq!(settings.env.get("TOKEN").map(String::as_str), Some("dev"));
            assert_eq!(settings.deploy_attempts, 3);
        });
    }
}

mod discovery {
    use super::*;

    const YAML: &str = "service: shop\nrepository: acme/shop\nrecipients: [ops@example.com]\n";

    #[test]
    fn finds_primary_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), YAML).unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.state_dir(), dir.path().join(".edgeswap/state"));
    }

    #[test]
    fn finds_dot_directory_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".edgeswap")).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME_DIR), YAML).unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.service.as_str(), "shop");
        assert_eq!(config.root, dir.path());
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::discover(dir.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }
}

mod scaffolding {
    use super::*;

    #[test]
    fn template_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("storefront"), Some("acme/storefront"), false).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.service.as_str(), "storefront");
        assert_eq!(config.repository, "acme/storefront");
        assert!(config.continuous_deployment.staging_cleanup);
        assert_eq!(
            config.continuous_deployment.single_header,
            HeaderPredicate::default()
        );
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), None, None, false).unwrap();
        assert!(matches!(
            init_config(dir.path(), None, None, false),
            Err(Error::AlreadyExists(_))
        ));
        init_config(dir.path(), Some("other"), None, true).unwrap();
    }

    #[test]
    fn invalid_service_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            init_config(dir.path(), Some("Bad Name"), None, false),
            Err(Error::InvalidConfig(_))
        ));
    }
}
