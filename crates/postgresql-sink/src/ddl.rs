//! PostgreSQL DDL generation from LogicalType.

use sync_core::{LogicalType, ToDdl};

/// PostgreSQL DDL generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgreSQLDdl;

impl ToDdl for PostgreSQLDdl {
    fn to_ddl(&self, logical_type: LogicalType) -> String {
        match logical_type {
            LogicalType::Integer => "BIGINT".to_string(),
            LogicalType::Numeric => "NUMERIC".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::DateTime => "TIMESTAMPTZ".to_string(),
            LogicalType::Boolean => "BOOLEAN".to_string(),
            // Relations are stored as their textual reference, e.g. `code:ABC`
            LogicalType::String | LogicalType::Relation | LogicalType::Unknown => {
                "TEXT".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping() {
        let ddl = PostgreSQLDdl;
        assert_eq!(ddl.to_ddl(LogicalType::Integer), "BIGINT");
        assert_eq!(ddl.to_ddl(LogicalType::Numeric), "NUMERIC");
        assert_eq!(ddl.to_ddl(LogicalType::Date), "DATE");
        assert_eq!(ddl.to_ddl(LogicalType::DateTime), "TIMESTAMPTZ");
        assert_eq!(ddl.to_ddl(LogicalType::Boolean), "BOOLEAN");
        assert_eq!(ddl.to_ddl(LogicalType::String), "TEXT");
        assert_eq!(ddl.to_ddl(LogicalType::Relation), "TEXT");
        assert_eq!(ddl.to_ddl(LogicalType::Unknown), "TEXT");
    }
}
