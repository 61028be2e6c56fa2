//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// Relative state and history paths are resolved against the directory
    /// holding the config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self::from_yaml(&content)?.resolve_paths(base))
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::MaskingRule;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
database:
  source_url: postgres://reader:pw@prod-db/shop
  target_url: postgres://writer:pw@qa-db/shop
  ssl_mode: disable
migration:
  batch_size: 500
  retry:
    max_attempts: 5
    delay_ms: 10
masking:
  salt: class-salt
tables:
  - name: customers
    columns:
      email: hash_email
      phone: preserve_format
      name: faker_name
      card: redact-last4
    filter: "WHERE active = true LIMIT 100"
    load:
      target: customers_qa
      key: [id]
      on_conflict: overwrite
      columns: [id, email, phone, name, card]
      batch_tag_column: etl_batch_id
  - name: orders
    load:
      target: orders_qa
      key: [id]
      on_conflict: ignore
      columns:
        - id
        - { source: customer_id, target: client_id }
"#;

    #[test]
    fn test_from_yaml_full_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.migration.batch_size, 500);
        assert_eq!(config.migration.retry.max_attempts, 5);
        assert_eq!(config.masking.salt, "class-salt");
        assert_eq!(config.masking.email_domain, "example.com");
        assert_eq!(config.tables.len(), 2);

        let customers = config.table("customers").unwrap();
        assert_eq!(customers.columns["email"], MaskingRule::HashEmail);
        assert_eq!(customers.columns["name"], MaskingRule::SyntheticName);
        assert_eq!(customers.columns["card"], MaskingRule::RedactLast4);
        let filter = customers.filter.as_ref().unwrap();
        assert_eq!(filter.condition.as_deref(), Some("active = true"));
        assert_eq!(filter.limit, Some(100));
        assert_eq!(customers.incremental_column, "id");

        let orders = config.table("orders").unwrap();
        let load = orders.load.as_ref().unwrap();
        assert_eq!(load.on_conflict, ConflictPolicy::Ignore);
        assert_eq!(load.columns[1].target(), "client_id");
    }

    #[test]
    fn test_defaults_applied() {
        let yaml = r#"
database:
  source_url: postgres://a/b
  target_url: postgres://c/d
tables:
  - name: customers
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.database.ssl_mode, "require");
        assert_eq!(config.migration.batch_size, 1000);
        assert_eq!(config.migration.retry.max_attempts, 3);
        assert_eq!(config.migration.retry.delay_ms, 1000);
        assert_eq!(config.migration.audit_table, "audit_logs");
        assert!(!config.migration.strict);
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        let dir = file.path().parent().unwrap();
        assert_eq!(config.migration.state_file, dir.join("state.json"));
        assert_eq!(
            config.migration.history_file,
            dir.join("execution_history.json")
        );
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/config.yaml").unwrap_err();
        assert!(matches!(err, crate::MigrateError::Io(_)));
    }

    #[test]
    fn test_shipped_example_config_is_valid() {
        let yaml = include_str!("../../../pg-mask-migrate-cli/config.example.yaml");
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.tables.len(), 2);
        let orders = config.table("orders").unwrap().load.as_ref().unwrap();
        assert_eq!(orders.columns[2].source(), "total");
        assert_eq!(orders.columns[2].target(), "total_amount");
        let filter = config.tables[0].filter.as_ref().unwrap();
        assert_eq!(filter.condition.as_deref(), Some("active = true"));
        assert_eq!(filter.limit, Some(500));
    }

    fn with_filter(filter: &str) -> String {
        format!(
            "database:\n  source_url: postgres://a/b\n  target_url: postgres://c/d\n\
             tables:\n  - name: customers\n    filter: \"{}\"\n",
            filter
        )
    }

    #[test]
    fn test_filter_with_order_by_is_rejected() {
        let err = Config::from_yaml(&with_filter("ORDER BY id LIMIT 5")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("ORDER"));

        let err = Config::from_yaml(&with_filter("WHERE a = 1 ORDER BY x")).unwrap_err();
        assert!(err.to_string().contains("ORDER"));
        assert!(Config::from_yaml(&with_filter("WHERE a = 1 OFFSET 20")).is_err());
        assert!(Config::from_yaml(&with_filter("WHERE a = 1 GROUP BY a")).is_err());
    }

    #[test]
    fn test_filter_keywords_in_literals_are_accepted() {
        let config = Config::from_yaml(&with_filter("WHERE note = 'group by' LIMIT 5")).unwrap();
        let filter = config.tables[0].filter.as_ref().unwrap();
        assert_eq!(filter.condition.as_deref(), Some("note = 'group by'"));
        assert_eq!(filter.limit, Some(5));
    }

    #[test]
    fn test_invalid_yaml_is_yaml_error() {
        let err = Config::from_yaml("database: [").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
