//! Storage size statistics.

use lexlib_types::ColumnKind;

use crate::error::DbError;
use crate::executor::Executor;
use crate::template::Query;
use crate::value::{arg, Value};

/// Table whose size is reported separately as [`SizeStats::image`].
const IMAGE_TABLE: &str = "images";

/// One row: whole database size, then image table size. CockroachDB exposes
/// neither, so it reports zeros.
const SIZE_TEMPLATE: &str = r#"
{{if sqlite}}
select page_count * page_size, 0 from pragma_page_count(), pragma_page_size()
{{else if postgres}}
select pg_database_size(current_database()), pg_total_relation_size({{arg "table"}})
{{else if or mysql mariadb}}
select
  (select coalesce(sum(data_length + index_length), 0)
   from information_schema.tables
   where table_schema = database()),
  (select coalesce(sum(data_length + index_length), 0)
   from information_schema.tables
   where table_schema = database() and table_name = {{arg "table"}})
{{else if sqlserver}}
select
  (select cast(sum(size) as bigint) * 8 * 1024 from sys.database_files),
  (select coalesce(sum(a.total_pages), 0) * 8 * 1024
   from sys.tables t
   inner join sys.indexes i on t.object_id = i.object_id
   inner join sys.partitions p on i.object_id = p.object_id and i.index_id = p.index_id
   inner join sys.allocation_units a on p.partition_id = a.container_id
   where t.name = {{arg "table"}})
{{else}}
select 0, 0
{{end}}
"#;

/// Sizes of the stored data, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeStats {
    /// Everything except images.
    pub data: u64,
    /// Search index. Always zero: search shares the data tables.
    pub search: u64,
    /// Image table, where the dialect can measure it separately.
    pub image: u64,
    /// Sum of the above.
    pub total: u64,
}

fn size_query() -> Result<Query, DbError> {
    Ok(Query::compile(SIZE_TEMPLATE)?)
}

fn bytes(value: &Value) -> u64 {
    value
        .as_int()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

/// Reports how much storage the database uses.
///
/// # Errors
///
/// Returns `DbError` if the size query fails.
pub fn size<E: Executor + ?Sized>(executor: &E) -> Result<SizeStats, DbError> {
    let row = size_query()?
        .bind(executor)
        .query_row(&[arg("table", IMAGE_TABLE)], &[ColumnKind::Int, ColumnKind::Int])?;

    let (database, image) = match row.as_deref() {
        Some([database, image]) => (bytes(database), bytes(image)),
        _ => (0, 0),
    };
    let data = database.saturating_sub(image);
    let search = 0;

    Ok(SizeStats {
        data,
        search,
        image,
        total: data + image + search,
    })
}
