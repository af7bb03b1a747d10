//! Tests for provider types and configuration.

use super::*;

mod transport_kind_tests {
    use super::*;

    /// Verify that every canonical name round-trips through parsing.
    #[test]
    fn test_canonical_names_parse() {
        for kind in TransportKind::ALL {
            assert_eq!(kind.as_str().parse::<TransportKind>().unwrap(), kind);
        }
    }

    /// Verify that parsing ignores case and accepts technology names.
    #[test]
    fn test_aliases_and_case() {
        assert_eq!("inmemory".parse::<TransportKind>().unwrap(), TransportKind::InMemory);
        assert_eq!("RabbitMq".parse::<TransportKind>().unwrap(), TransportKind::BrokerA);
        assert_eq!("ACTIVEMQ".parse::<TransportKind>().unwrap(), TransportKind::BrokerB);
        assert_eq!("AmazonSqs".parse::<TransportKind>().unwrap(), TransportKind::CloudQueue);
        assert_eq!(
            "AzureServiceBus".parse::<TransportKind>().unwrap(),
            TransportKind::CloudBus
        );
        assert_eq!(" grpc ".parse::<TransportKind>().unwrap(), TransportKind::Grpc);
    }

    /// Verify that unknown transport names are rejected.
    #[test]
    fn test_unknown_kind_rejected() {
        let error = "Kafka".parse::<TransportKind>().unwrap_err();
        assert_eq!(error, UnknownTransportKind("Kafka".to_string()));
    }
}

mod provider_config_tests {
    use super::*;

    /// Verify that an unsupported type is reported with the provider key.
    #[test]
    fn test_unsupported_transport() {
        let mut config = ProviderConfig::new(TransportKind::InMemory).with_key("Events");
        config.transport_type = "Kafka".to_string();

        match config.validate() {
            Err(ConfigurationError::UnsupportedTransport { key, kind }) => {
                assert_eq!(key, "Events");
                assert_eq!(kind, "Kafka");
            }
            other => panic!("expected UnsupportedTransport, got {:?}", other),
        }
    }

    /// Verify that broker transports require a connection string.
    #[test]
    fn test_broker_requires_connection_string() {
        let config = ProviderConfig::new(TransportKind::BrokerA).with_key("Orders");
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "connection_string"
        ));

        let config = config.with_connection_string("amqp://localhost:5672");
        assert!(config.validate().is_ok());
    }

    /// Verify that an in-memory provider validates without connection details.
    #[test]
    fn test_in_memory_validates() {
        let config = ProviderConfig::new(TransportKind::InMemory).with_key("InMemory1");
        assert!(config.validate().is_ok());
    }

    /// Verify that a missing key is rejected.
    #[test]
    fn test_empty_key_rejected() {
        let config = ProviderConfig::new(TransportKind::InMemory);
        assert!(matches!(config.validate(), Err(ConfigurationError::EmptyKey)));
    }

    /// Verify that blank server entries are rejected.
    #[test]
    fn test_blank_server_rejected() {
        let config = ProviderConfig::new(TransportKind::InMemory)
            .with_key("a")
            .with_servers(vec!["node1:5672".to_string(), " ".to_string()]);
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "servers"
        ));
    }

    /// Verify that retry and redelivery intervals become policies.
    #[test]
    fn test_policies_from_intervals() {
        let config = ProviderConfig::new(TransportKind::InMemory)
            .with_retries(vec![Duration::from_millis(10)])
            .with_redeliveries(vec![Duration::from_secs(1), Duration::from_secs(5)]);

        assert_eq!(config.retry_policy().max_attempts(), 1);
        assert_eq!(config.redelivery_policy().max_attempts(), 2);
    }

    /// Verify that secrets never appear in debug output.
    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = ProviderConfig::new(TransportKind::BrokerA)
            .with_key("Orders")
            .with_credentials("guest", "super-secret-password");
        config.ssl_certificate_passphrase = "cert-passphrase".to_string();

        let output = format!("{:?}", config);
        assert!(!output.contains("super-secret-password"));
        assert!(!output.contains("cert-passphrase"));
        assert!(output.contains("<REDACTED>"));
        assert!(output.contains("guest"));
    }

    /// Verify that both spellings of the field names deserialize.
    #[test]
    fn test_deserialize_pascal_and_snake_case() {
        let pascal: ProviderConfig = serde_json::from_str(
            r#"{"Type": "RabbitMq", "ConnectionString": "amqp://h", "UseSsl": true, "Retries": [1, "00:00:02"]}"#,
        )
        .unwrap();
        assert_eq!(pascal.transport_type, "RabbitMq");
        assert_eq!(pascal.connection_string, "amqp://h");
        assert!(pascal.use_ssl);
        assert_eq!(
            pascal.retries,
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );

        let snake: ProviderConfig = serde_yaml::from_str(
            "type: InMemory\nredeliveries: [\"250ms\", \"1m\"]\nservers: [a, b]\n",
        )
        .unwrap();
        assert_eq!(snake.transport_type, "InMemory");
        assert_eq!(
            snake.redeliveries,
            vec![Duration::from_millis(250), Duration::from_secs(60)]
        );
        assert_eq!(snake.servers, vec!["a".to_string(), "b".to_string()]);
        assert!(snake.key.is_empty());
    }
}

mod duration_tests {
    use super::*;

    /// Verify plain and fractional seconds.
    #[test]
    fn test_seconds() {
        assert_eq!(parse_duration("5").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("0.5").unwrap(), Duration::from_millis(500));
    }

    /// Verify suffixed values.
    #[test]
    fn test_suffixes() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    /// Verify time span values, with and without days.
    #[test]
    fn test_spans() {
        assert_eq!(parse_duration("00:00:05").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("00:01:30").unwrap(), Duration::from_secs(90));
        assert_eq!(
            parse_duration("1.02:00:00").unwrap(),
            Duration::from_secs(86_400 + 7_200)
        );
        assert_eq!(
            parse_duration("00:00:00.250").unwrap(),
            Duration::from_millis(250)
        );
    }

    /// Verify that malformed and negative values are rejected.
    #[test]
    fn test_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("00:61:00").is_err());
        assert!(parse_duration("1:2").is_err());
    }

    /// Verify that values too large for a duration are errors rather than panics.
    #[test]
    fn test_out_of_range_values() {
        assert!(parse_duration("1e20").is_err());
        assert!(parse_duration("1e20s").is_err());
        assert!(parse_duration("99999999999999999.00:00:00").is_err());
        assert!(parse_duration("18446744073709551615:00:00").is_err());
    }
}
