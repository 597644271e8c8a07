//! # CSV to Table Ingestion
//!
//! Loads an uploaded CSV into its own table in the tabular store and registers the
//! table under the uploading role. Column types are sniffed from the data.

use super::IngestError;
use crate::{constants::TABLES_METADATA, locks::TableLocks, registry::register_table};
use tracing::{info, warn};
use turso::{Connection, Database, Value as TursoValue};

/// Rows rendered per text block when a CSV is turned into document text.
const ROWS_PER_TEXT_BLOCK: usize = 20;

/// A parsed CSV: unique column names and raw string records.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvData {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

/// Derives a table name from an uploaded filename.
///
/// The stem is lower-cased and every run of non-alphanumeric characters becomes `_`.
/// Names starting with a digit get a `t_` prefix.
pub fn derive_table_name(filename: &str) -> Result<String, IngestError> {
    let stem = std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let mut name = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    let name = name.trim_matches('_');

    if name.is_empty() {
        return Err(IngestError::InvalidTableName(filename.to_string()));
    }
    let name = if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("t_{name}")
    } else {
        name.to_string()
    };
    if name == TABLES_METADATA || name.starts_with("sqlite_") {
        return Err(IngestError::InvalidTableName(filename.to_string()));
    }
    Ok(name)
}

/// Parses CSV bytes, making header names unique and non-empty.
pub fn parse_csv(data: &[u8]) -> Result<CsvData, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data);

    let mut headers: Vec<String> = Vec::new();
    for (i, raw) in reader.headers()?.iter().enumerate() {
        let base = match raw.trim() {
            "" => format!("column_{}", i + 1),
            h => h.to_string(),
        };
        let mut candidate = base.clone();
        let mut n = 2;
        while headers.iter().any(|h| h.eq_ignore_ascii_case(&candidate)) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        headers.push(candidate);
    }
    if headers.is_empty() {
        return Err(IngestError::NoData);
    }

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();
        row.resize(headers.len(), String::new());
        records.push(row);
    }
    if records.is_empty() {
        return Err(IngestError::NoData);
    }

    Ok(CsvData { headers, records })
}

/// Chooses INTEGER, REAL or TEXT per column from all non-empty values.
fn sniff_column_types(data: &CsvData) -> Vec<&'static str> {
    (0..data.headers.len())
        .map(|i| {
            let mut values = data
                .records
                .iter()
                .map(|r| r[i].as_str())
                .filter(|v| !v.is_empty())
                .peekable();
            if values.peek().is_none() {
                return "TEXT";
            }
            let values: Vec<&str> = values.collect();
            if values.iter().all(|v| v.parse::<i64>().is_ok()) {
                "INTEGER"
            } else if values.iter().all(|v| v.parse::<f64>().is_ok()) {
                "REAL"
            } else {
                "TEXT"
            }
        })
        .collect()
}

fn typed_value(field: &str, column_type: &str) -> TursoValue {
    if field.is_empty() {
        return TursoValue::Null;
    }
    match column_type {
        "INTEGER" => field
            .parse::<i64>()
            .map(TursoValue::Integer)
            .unwrap_or_else(|_| TursoValue::Text(field.to_string())),
        "REAL" => field
            .parse::<f64>()
            .map(TursoValue::Real)
            .unwrap_or_else(|_| TursoValue::Text(field.to_string())),
        _ => TursoValue::Text(field.to_string()),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

async fn load_table(
    conn: &Connection,
    table_name: &str,
    role: &str,
    data: &CsvData,
) -> Result<usize, IngestError> {
    let column_types = sniff_column_types(data);
    let quoted_table = quote_identifier(table_name);

    conn.execute(&format!("DROP TABLE IF EXISTS {quoted_table}"), ())
        .await?;

    let columns_def = data
        .headers
        .iter()
        .zip(&column_types)
        .map(|(h, t)| format!("{} {t}", quote_identifier(h)))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(&format!("CREATE TABLE {quoted_table} ({columns_def})"), ())
        .await?;

    let columns = data
        .headers
        .iter()
        .map(|h| quote_identifier(h))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; data.headers.len()].join(", ");
    let insert_sql = format!("INSERT INTO {quoted_table} ({columns}) VALUES ({placeholders})");
    let mut stmt = conn.prepare(&insert_sql).await?;

    let mut insert_count = 0;
    for record in &data.records {
        let params: Vec<TursoValue> = record
            .iter()
            .zip(&column_types)
            .map(|(field, column_type)| typed_value(field, column_type))
            .collect();
        if stmt.execute(params).await? > 0 {
            insert_count += 1;
        }
    }

    register_table(conn, table_name, role).await?;
    Ok(insert_count)
}

/// Replaces `table_name` with the CSV contents and registers it under `role`.
///
/// Holds the table's write lock for the whole replacement. Either the new table and
/// registration are both committed, or neither is.
pub async fn replace_table(
    tabular_db: &Database,
    locks: &TableLocks,
    table_name: &str,
    role: &str,
    data: &CsvData,
) -> Result<usize, IngestError> {
    let _guard = locks.write(table_name).await;
    let conn = tabular_db.connect()?;

    conn.execute("BEGIN TRANSACTION", ()).await?;
    match load_table(&conn, table_name, role, data).await {
        Ok(count) => {
            conn.execute("COMMIT", ()).await?;
            info!(table = %table_name, role = %role, rows = count, "Replaced table from CSV.");
            Ok(count)
        }
        Err(e) => {
            warn!(table = %table_name, error = %e, "CSV load failed. Rolling back transaction.");
            conn.execute("ROLLBACK", ()).await?;
            Err(e)
        }
    }
}

/// Renders CSV rows as text for embedding. Each block repeats the header line.
pub fn csv_to_text(data: &CsvData) -> String {
    let header = data.headers.join(" | ");
    data.records
        .chunks(ROWS_PER_TEXT_BLOCK)
        .map(|rows| {
            let body = rows
                .iter()
                .map(|r| r.join(" | "))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{header}\n{body}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_table_name() {
        assert_eq!(derive_table_name("Finance-Salaries.csv").unwrap(), "finance_salaries");
        assert_eq!(derive_table_name("q3  report (v2).CSV").unwrap(), "q3_report_v2");
        assert_eq!(derive_table_name("2024 budget.csv").unwrap(), "t_2024_budget");
        assert!(derive_table_name("---.csv").is_err());
        assert!(derive_table_name("tables_metadata.csv").is_err());
        assert!(derive_table_name("sqlite_master.csv").is_err());
    }

    #[test]
    fn test_parse_csv_makes_headers_unique() {
        let data = parse_csv(b"name,Name,,age\nAlice,A,x,30\nBob,B\n").unwrap();
        assert_eq!(data.headers, vec!["name", "Name_2", "column_3", "age"]);
        assert_eq!(data.records[1], vec!["Bob", "B", "", ""]);
    }

    #[test]
    fn test_parse_csv_without_rows_is_rejected() {
        assert!(matches!(parse_csv(b"a,b\n"), Err(IngestError::NoData)));
    }

    #[test]
    fn test_sniff_column_types() {
        let data = parse_csv(b"id,score,name\n1,1.5,a\n2,,b\n3,2,c\n").unwrap();
        assert_eq!(sniff_column_types(&data), vec!["INTEGER", "REAL", "TEXT"]);
    }

    #[tokio::test]
    async fn test_replace_table_swaps_contents_and_owner() {
        // 1. Arrange
        let db = turso::Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        conn.execute(crate::providers::db::sqlite::sql::TABULAR_TABLE_CREATION_SQL[0], ())
            .await
            .unwrap();
        let locks = TableLocks::new();

        // 2. Act
        let first = parse_csv(b"id,amount\n1,10\n2,20\n").unwrap();
        replace_table(&db, &locks, "ledger", "finance", &first).await.unwrap();
        let second = parse_csv(b"id,amount\n9,90\n").unwrap();
        let inserted = replace_table(&db, &locks, "ledger", "general", &second)
            .await
            .unwrap();

        // 3. Assert
        assert_eq!(inserted, 1);
        let mut rows = conn.query("SELECT COUNT(*) FROM ledger", ()).await.unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);

        let registrations = crate::registry::list_registrations(&db).await.unwrap();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].role, "general");
    }
}
