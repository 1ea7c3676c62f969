use fairq::config::Config;
use fairq::error::Error;

#[test]
fn empty_toml_uses_defaults() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.admission_cap, 5);
    assert_eq!(config.batch_size, 10_000);
    assert_eq!(config.field_delimiter, ';');
    assert_eq!(config.journal_capacity, 4096);
    assert!(config.otel_endpoint.is_none());
}

#[test]
fn toml_overrides_defaults() {
    let config = Config::from_toml_str(
        r#"
        admission_cap = 3
        field_delimiter = ","
        otel_endpoint = "http://localhost:4317"
        "#,
    )
    .unwrap();

    assert_eq!(config.admission_cap, 3);
    assert_eq!(config.field_delimiter, ',');
    assert_eq!(config.batch_size, 10_000);
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
}

#[test]
fn zero_admission_cap_is_rejected() {
    let result = Config::from_toml_str("admission_cap = 0");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn zero_journal_capacity_is_rejected() {
    let result = Config::from_toml_str("journal_capacity = 0");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn unknown_keys_are_rejected() {
    let result = Config::from_toml_str("admision_cap = 4");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn missing_config_file_is_a_config_error() {
    let result = Config::load(std::path::Path::new("/nonexistent/fairq.toml"));
    assert!(matches!(result, Err(Error::Config(_))));
}

// The only test in this binary that touches the environment.
#[test]
fn config_from_env() {
    unsafe {
        std::env::set_var("FAIRQ_ADMISSION_CAP", "7");
        std::env::set_var("FAIRQ_FIELD_DELIMITER", "|");
        std::env::remove_var("FAIRQ_BATCH_SIZE");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.admission_cap, 7);
    assert_eq!(config.field_delimiter, '|');
    assert_eq!(config.batch_size, 10_000);

    unsafe {
        std::env::set_var("FAIRQ_ADMISSION_CAP", "many");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    unsafe {
        std::env::set_var("FAIRQ_ADMISSION_CAP", "0");
    }
    assert!(Config::from_env().is_err());

    // Clean up
    unsafe {
        std::env::remove_var("FAIRQ_ADMISSION_CAP");
        std::env::remove_var("FAIRQ_FIELD_DELIMITER");
    }
}
