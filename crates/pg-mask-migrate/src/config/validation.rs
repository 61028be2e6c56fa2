//! Configuration validation.

use std::collections::HashSet;

use super::{Config, TableSpec};
use crate::core::identifier::{validate_condition, validate_identifier};
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.database.source_url.trim().is_empty() {
        return Err(MigrateError::Config("database.source_url is required".into()));
    }
    if config.database.target_url.trim().is_empty() {
        return Err(MigrateError::Config("database.target_url is required".into()));
    }
    SslMode::parse(&config.database.ssl_mode)?;

    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if config.migration.retry.max_attempts == 0 {
        return Err(MigrateError::Config(
            "migration.retry.max_attempts must be at least 1".into(),
        ));
    }
    validate_identifier(&config.migration.audit_table)?;

    if config.tables.is_empty() {
        return Err(MigrateError::Config(
            "at least one table must be configured".into(),
        ));
    }

    let mut seen = HashSet::new();
    for table in &config.tables {
        if !seen.insert(table.name.as_str()) {
            return Err(MigrateError::Config(format!(
                "table '{}' is configured more than once",
                table.name
            )));
        }
        validate_table(table, config.migration.strict)?;
    }

    Ok(())
}

fn validate_table(table: &TableSpec, strict: bool) -> Result<()> {
    validate_identifier(&table.name)?;
    validate_identifier(&table.incremental_column)?;

    for (column, rule) in &table.columns {
        validate_identifier(column)?;
        if strict && !rule.is_known() {
            return Err(MigrateError::Config(format!(
                "table '{}': unknown masking rule '{}' on column '{}'",
                table.name, rule, column
            )));
        }
    }

    if let Some(condition) = table.filter.as_ref().and_then(|f| f.condition.as_deref()) {
        validate_condition(condition)?;
    }

    let Some(load) = &table.load else {
        if strict {
            return Err(MigrateError::Config(format!(
                "table '{}' has no load descriptor",
                table.name
            )));
        }
        return Ok(());
    };

    validate_identifier(&load.target)?;
    if load.columns.is_empty() {
        return Err(MigrateError::Config(format!(
            "table '{}': load.columns must not be empty",
            table.name
        )));
    }
    if load.key.is_empty() {
        return Err(MigrateError::Config(format!(
            "table '{}': load.key must name at least one column",
            table.name
        )));
    }

    let mut targets = HashSet::new();
    for mapping in &load.columns {
        validate_identifier(mapping.source())?;
        validate_identifier(mapping.target())?;
        if !targets.insert(mapping.target()) {
            return Err(MigrateError::Config(format!(
                "table '{}': target column '{}' is mapped twice",
                table.name,
                mapping.target()
            )));
        }
    }

    if let Some(tag) = &load.batch_tag_column {
        validate_identifier(tag)?;
        if targets.contains(tag.as_str()) {
            return Err(MigrateError::Config(format!(
                "table '{}': batch_tag_column '{}' is also a mapped column",
                table.name, tag
            )));
        }
    }

    for key in &load.key {
        if !targets.contains(key.as_str()) {
            return Err(MigrateError::Config(format!(
                "table '{}': key column '{}' is not among load.columns",
                table.name, key
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ColumnMapping, ConflictPolicy, DatabaseConfig, LoadDescriptor, MaskingConfig,
        MigrationConfig, RowFilter,
    };
    use crate::masking::MaskingRule;
    use std::collections::BTreeMap;

    fn valid_table() -> TableSpec {
        let mut columns = BTreeMap::new();
        columns.insert("email".to_string(), MaskingRule::HashEmail);
        TableSpec {
            name: "customers".to_string(),
            columns,
            filter: None,
            incremental_column: "id".to_string(),
            load: Some(LoadDescriptor {
                target: "customers_qa".to_string(),
                key: vec!["id".to_string()],
                on_conflict: ConflictPolicy::Overwrite,
                columns: vec![
                    ColumnMapping::Same("id".to_string()),
                    ColumnMapping::Same("email".to_string()),
                ],
                batch_tag_column: Some("etl_batch_id".to_string()),
            }),
        }
    }

    fn valid_config() -> Config {
        Config {
            database: DatabaseConfig {
                source_url: "postgres://src/db".to_string(),
                target_url: "postgres://tgt/db".to_string(),
                ssl_mode: "disable".to_string(),
            },
            migration: MigrationConfig::default(),
            masking: MaskingConfig::default(),
            tables: vec![valid_table()],
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_urls() {
        let mut config = valid_config();
        config.database.source_url = String::new();
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.database.target_url = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.database.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size_and_attempts() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.migration.retry.max_attempts = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_table() {
        let mut config = valid_config();
        config.tables.push(valid_table());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_key_must_be_mapped() {
        let mut config = valid_config();
        config.tables[0].load.as_mut().unwrap().key = vec!["customer_id".to_string()];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("customer_id"));
    }

    #[test]
    fn test_batch_tag_may_not_shadow_column() {
        let mut config = valid_config();
        config.tables[0].load.as_mut().unwrap().batch_tag_column = Some("email".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_filter_condition_checked() {
        let mut config = valid_config();
        config.tables[0].filter = Some(RowFilter {
            condition: Some("1=1; DROP TABLE customers".to_string()),
            limit: None,
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_rule_only_rejected_when_strict() {
        let mut config = valid_config();
        config.tables[0]
            .columns
            .insert("ssn".to_string(), MaskingRule::Unknown("scramble".to_string()));
        assert!(validate(&config).is_ok());

        config.migration.strict = true;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("scramble"));
    }

    #[test]
    fn test_missing_load_only_rejected_when_strict() {
        let mut config = valid_config();
        config.tables[0].load = None;
        assert!(validate(&config).is_ok());

        config.migration.strict = true;
        assert!(validate(&config).is_err());
    }
}
