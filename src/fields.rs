//! Field type definitions for migrations

use serde::{Deserialize, Serialize};

/// Represents database column types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    // Integer types
    SmallInteger,
    Integer,
    BigInteger,

    // String types
    Char(u32),
    VarChar(u32),
    Text,

    // Numeric types
    Decimal { precision: u32, scale: u32 },
    Float,
    Double,

    // Boolean type
    Boolean,

    // Date/time types
    Date,
    Time,
    DateTime,
    /// Timestamp with time zone (PostgreSQL TIMESTAMPTZ)
    TimestampTz,

    // Binary type
    Binary,

    // JSON types
    Json,
    /// Binary JSON (PostgreSQL JSONB)
    JsonBinary,

    // Other types
    Uuid,

    /// Raw SQL type, used where no structured variant exists
    Custom(String),
}

impl FieldType {
    /// Convert FieldType to SQL for a specific dialect
    ///
    /// Returns database-specific type names where dialects diverge; falls
    /// back to [`FieldType::to_sql_string`] for types that are spelled the
    /// same everywhere.
    pub fn to_sql_for_dialect(&self, dialect: &super::operations::SqlDialect) -> String {
        use super::operations::SqlDialect;

        match self {
            FieldType::DateTime => match dialect {
                SqlDialect::Postgres => "TIMESTAMP".to_string(),
                SqlDialect::Mysql | SqlDialect::Sqlite => "DATETIME".to_string(),
            },
            FieldType::TimestampTz => match dialect {
                SqlDialect::Postgres => "TIMESTAMPTZ".to_string(),
                // No timezone-aware timestamp outside PostgreSQL
                SqlDialect::Mysql | SqlDialect::Sqlite => "DATETIME".to_string(),
            },
            FieldType::Boolean => match dialect {
                SqlDialect::Postgres | SqlDialect::Sqlite => "BOOLEAN".to_string(),
                SqlDialect::Mysql => "TINYINT(1)".to_string(),
            },
            FieldType::Uuid => match dialect {
                SqlDialect::Postgres => "UUID".to_string(),
                SqlDialect::Mysql => "CHAR(36)".to_string(),
                SqlDialect::Sqlite => "TEXT".to_string(),
            },
            FieldType::JsonBinary => match dialect {
                SqlDialect::Postgres => "JSONB".to_string(),
                SqlDialect::Mysql | SqlDialect::Sqlite => "JSON".to_string(),
            },
            FieldType::Binary => match dialect {
                SqlDialect::Postgres => "BYTEA".to_string(),
                SqlDialect::Mysql | SqlDialect::Sqlite => "BLOB".to_string(),
            },
            FieldType::Double => match dialect {
                SqlDialect::Postgres => "DOUBLE PRECISION".to_string(),
                SqlDialect::Mysql => "DOUBLE".to_string(),
                SqlDialect::Sqlite => "REAL".to_string(),
            },
            _ => self.to_sql_string(),
        }
    }

    /// Convert FieldType to a generic SQL type name
    pub fn to_sql_string(&self) -> String {
        match self {
            FieldType::SmallInteger => "SMALLINT".to_string(),
            FieldType::Integer => "INTEGER".to_string(),
            FieldType::BigInteger => "BIGINT".to_string(),
            FieldType::Char(max_length) => format!("CHAR({})", max_length),
            FieldType::VarChar(max_length) => format!("VARCHAR({})", max_length),
            FieldType::Text => "TEXT".to_string(),
            FieldType::Decimal { precision, scale } => {
                format!("DECIMAL({}, {})", precision, scale)
            }
            FieldType::Float => "FLOAT".to_string(),
            FieldType::Double => "DOUBLE PRECISION".to_string(),
            FieldType::Boolean => "BOOLEAN".to_string(),
            FieldType::Date => "DATE".to_string(),
            FieldType::Time => "TIME".to_string(),
            FieldType::DateTime => "TIMESTAMP".to_string(),
            FieldType::TimestampTz => "TIMESTAMPTZ".to_string(),
            FieldType::Binary => "BLOB".to_string(),
            FieldType::Json => "JSON".to_string(),
            FieldType::JsonBinary => "JSONB".to_string(),
            FieldType::Uuid => "UUID".to_string(),
            FieldType::Custom(sql) => sql.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::operations::SqlDialect;
    use super::*;

    #[test]
    fn test_varchar_carries_length() {
        assert_eq!(FieldType::VarChar(255).to_sql_string(), "VARCHAR(255)");
        assert_eq!(FieldType::Char(8).to_sql_string(), "CHAR(8)");
    }

    #[test]
    fn test_decimal_precision_and_scale() {
        let ty = FieldType::Decimal {
            precision: 10,
            scale: 2,
        };
        assert_eq!(ty.to_sql_string(), "DECIMAL(10, 2)");
    }

    #[test]
    fn test_boolean_is_tinyint_on_mysql() {
        assert_eq!(
            FieldType::Boolean.to_sql_for_dialect(&SqlDialect::Mysql),
            "TINYINT(1)"
        );
        assert_eq!(
            FieldType::Boolean.to_sql_for_dialect(&SqlDialect::Postgres),
            "BOOLEAN"
        );
    }

    #[test]
    fn test_uuid_fallbacks() {
        assert_eq!(
            FieldType::Uuid.to_sql_for_dialect(&SqlDialect::Postgres),
            "UUID"
        );
        assert_eq!(
            FieldType::Uuid.to_sql_for_dialect(&SqlDialect::Mysql),
            "CHAR(36)"
        );
        assert_eq!(
            FieldType::Uuid.to_sql_for_dialect(&SqlDialect::Sqlite),
            "TEXT"
        );
    }

    #[test]
    fn test_custom_passthrough() {
        let ty = FieldType::Custom("INTEGER PRIMARY KEY".to_string());
        assert_eq!(ty.to_sql_string(), "INTEGER PRIMARY KEY");
    }
}
