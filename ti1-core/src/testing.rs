use crate::{project, Arg, CellValue, OrderedRecord, QueryBuilder, QueryExecutor, Result, RowSet, Ti1Error};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A statement seen by a [`ScriptedExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub sql: String,
    pub args: Vec<Arg>,
}

/// In-memory executor that replays queued responses in order and records every
/// statement it receives. Running past the end of the script is a query error.
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<Result<RowSet>>>,
    recorded: Mutex<Vec<RecordedQuery>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, rows: RowSet) -> Self {
        self.responses.lock().unwrap().push_back(Ok(rows));
        self
    }

    pub fn fail(self, err: Ti1Error) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn recorded(&self) -> Vec<RecordedQuery> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn run(&self, sql: &str, args: &[Arg]) -> Result<RowSet> {
        self.recorded.lock().unwrap().push(RecordedQuery {
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Ti1Error::Query("no scripted response left".to_string())))
    }
}

// ---- Executor Certification Tests ----
//
// Run against a backend after `seed_fixture`. The fixture mirrors the two tables
// the service reads.

pub const FIXTURE_STATEMENTS: &[&str] = &[
    "CREATE TABLE estimatedvehiclejourney (
        id BIGSERIAL PRIMARY KEY,
        vehicleref TEXT,
        datasource TEXT,
        lineref TEXT,
        recordedattime TIMESTAMPTZ,
        extra JSONB
    )",
    "CREATE TABLE calls (
        id BIGSERIAL PRIMARY KEY,
        estimatedvehiclejourney BIGINT NOT NULL,
        \"order\" INTEGER NOT NULL,
        stoppointref TEXT,
        cancellation BOOLEAN,
        delayseconds DOUBLE PRECISION,
        extra TEXT
    )",
    "INSERT INTO estimatedvehiclejourney (vehicleref, datasource, lineref, recordedattime, extra) VALUES
        ('bus-1', 'ATB', '3', '2024-05-01T10:00:00Z', '{\"delay\": 30}'),
        ('bus-2', 'ATB', '3', '2024-05-01T10:05:00Z', NULL),
        ('tram-1', 'SKY', '1', '2024-05-01T10:10:00Z', '[1, 2]')",
    "INSERT INTO calls (estimatedvehiclejourney, \"order\", stoppointref, cancellation, delayseconds, extra) VALUES
        (1, 2, 'NSR:Quay:2', false, 12.5, '{\"platform\": \"A\"}'),
        (1, 1, 'NSR:Quay:1', false, NULL, NULL),
        (2, 1, 'NSR:Quay:1', true, 0, '{not json')",
    "CREATE TYPE vehiclemode AS ENUM ('bus', 'tram', 'ferry')",
    "CREATE TABLE column_kinds (
        id BIGSERIAL PRIMARY KEY,
        operatingday DATE,
        departs TIME,
        departs_local TIMETZ,
        recorded TIMESTAMP,
        journeyref UUID,
        fare NUMERIC(10, 2),
        payload BYTEA,
        stops TEXT[],
        legs INTEGER[],
        weights DOUBLE PRECISION[],
        headway INTERVAL,
        source_ip INET,
        network CIDR,
        mode vehiclemode,
        catalog OID,
        stop_point POINT
    )",
    "INSERT INTO column_kinds (operatingday, departs, departs_local, recorded, journeyref, fare, payload,
        stops, legs, weights, headway, source_ip, network, mode, catalog, stop_point) VALUES
        ('2024-05-01', '10:15:30', '10:15:30+02', '2024-05-01 10:00:00',
         'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11', 12.50, '\\x7b2261223a317d',
         ARRAY['NSR:Quay:1', NULL, 'NSR:Quay:2'], ARRAY[1, 2], ARRAY[1.5, 2],
         '1 day 02:30:00', '10.0.0.1', '10.0.0.0/8', 'tram', 42, '(1,2)')",
    "INSERT INTO column_kinds DEFAULT VALUES",
];

pub async fn seed_fixture(executor: &dyn QueryExecutor) {
    for statement in FIXTURE_STATEMENTS {
        executor.run(statement, &[]).await.unwrap();
    }
}

async fn fetch(executor: &dyn QueryExecutor, qb: QueryBuilder) -> Vec<OrderedRecord> {
    let (sql, args) = qb.into_parts();
    project(executor.run(&sql, &args).await.unwrap()).unwrap()
}

fn ids(records: &[OrderedRecord]) -> Vec<CellValue> {
    records.iter().map(|r| r.get("id").cloned().unwrap()).collect()
}

fn num(n: i64) -> CellValue {
    CellValue::Number(n.into())
}

pub async fn test_text_args_bind_against_integer_columns(executor: &dyn QueryExecutor) {
    let mut qb = QueryBuilder::new("SELECT * FROM calls WHERE 1=1");
    qb.add_flexible("id", "1, 3").order_by("id ASC").add_limit(10);
    let records = fetch(executor, qb).await;
    assert_eq!(ids(&records), vec![num(1), num(3)]);
}

pub async fn test_quoted_reserved_column(executor: &dyn QueryExecutor) {
    let mut qb = QueryBuilder::new("SELECT * FROM calls WHERE 1=1");
    qb.add_flexible_quoted("order", "1").order_by("id ASC").add_limit(10);
    let records = fetch(executor, qb).await;
    assert_eq!(ids(&records), vec![num(2), num(3)]);
}

pub async fn test_cursor_ordering_and_limit(executor: &dyn QueryExecutor) {
    let mut qb = QueryBuilder::new("SELECT * FROM estimatedvehiclejourney WHERE 1=1");
    qb.add_comparison("id", "<", "3").order_by("id DESC").add_limit(1);
    let records = fetch(executor, qb).await;
    assert_eq!(ids(&records), vec![num(2)]);
}

pub async fn test_integer_args_bind(executor: &dyn QueryExecutor) {
    let mut qb = QueryBuilder::new("SELECT * FROM calls WHERE 1=1");
    qb.add_equality("estimatedvehiclejourney", 1_i64)
        .order_by("\"order\" ASC")
        .add_limit(200);
    let records = fetch(executor, qb).await;
    assert_eq!(ids(&records), vec![num(2), num(1)]);
}

pub async fn test_cells_project_by_kind(executor: &dyn QueryExecutor) {
    let mut qb = QueryBuilder::new("SELECT * FROM calls WHERE 1=1");
    qb.order_by("id ASC").add_limit(10);
    let records = fetch(executor, qb).await;
    assert_eq!(records.len(), 3);

    let first = &records[0];
    assert_eq!(first.get("order"), Some(&num(2)));
    assert_eq!(first.get("stoppointref"), Some(&CellValue::Text("NSR:Quay:2".into())));
    assert_eq!(first.get("cancellation"), Some(&CellValue::Bool(false)));
    assert_eq!(
        first.get("delayseconds"),
        Some(&CellValue::Number(serde_json::Number::from_f64(12.5).unwrap()))
    );
    assert_eq!(first.get("extra"), Some(&CellValue::Json(json!({"platform": "A"}))));

    assert_eq!(records[1].get("extra"), Some(&CellValue::Null));
    assert_eq!(records[1].get("delayseconds"), Some(&CellValue::Null));
    assert_eq!(records[2].get("extra"), Some(&CellValue::Text("{not json".into())));
    assert_eq!(
        records[0].to_ordered_json().unwrap(),
        r#"{"id":1,"cancellation":false,"delayseconds":12.5,"estimatedvehiclejourney":1,"extra":{"platform":"A"},"order":2,"stoppointref":"NSR:Quay:2"}"#
    );
}

pub async fn test_json_and_timestamp_columns(executor: &dyn QueryExecutor) {
    let mut qb = QueryBuilder::new("SELECT * FROM estimatedvehiclejourney WHERE 1=1");
    qb.order_by("id ASC").add_limit(10);
    let records = fetch(executor, qb).await;
    assert_eq!(records[0].get("extra"), Some(&CellValue::Json(json!({"delay": 30}))));
    assert_eq!(records[1].get("extra"), Some(&CellValue::Null));
    assert_eq!(records[2].get("extra"), Some(&CellValue::Json(json!([1, 2]))));
    assert_eq!(
        records[0].get("recordedattime"),
        Some(&CellValue::Text("2024-05-01T10:00:00Z".into()))
    );
}

pub async fn test_column_kinds_project_as_text_or_json(executor: &dyn QueryExecutor) {
    let mut qb = QueryBuilder::new("SELECT * FROM column_kinds WHERE 1=1");
    qb.order_by("id ASC").add_limit(10);
    let records = fetch(executor, qb).await;
    assert_eq!(records.len(), 2);

    let text = |s: &str| Some(CellValue::Text(s.to_string()));
    let row = &records[0];
    assert_eq!(row.get("operatingday").cloned(), text("2024-05-01"));
    assert_eq!(row.get("departs").cloned(), text("10:15:30"));
    assert_eq!(row.get("departs_local").cloned(), text("10:15:30+02"));
    assert_eq!(row.get("recorded").cloned(), text("2024-05-01T10:00:00Z"));
    assert_eq!(row.get("journeyref").cloned(), text("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"));
    assert_eq!(row.get("fare").cloned(), text("12.50"));
    assert_eq!(row.get("headway").cloned(), text("1 day 02:30:00"));
    assert_eq!(row.get("source_ip").cloned(), text("10.0.0.1"));
    assert_eq!(row.get("network").cloned(), text("10.0.0.0/8"));
    assert_eq!(row.get("mode").cloned(), text("tram"));
    assert_eq!(row.get("catalog"), Some(&num(42)));
    assert_eq!(row.get("payload"), Some(&CellValue::Json(json!({"a": 1}))));
    assert_eq!(
        row.get("stops"),
        Some(&CellValue::Json(json!(["NSR:Quay:1", null, "NSR:Quay:2"])))
    );
    assert_eq!(row.get("legs"), Some(&CellValue::Json(json!([1, 2]))));
    assert_eq!(row.get("weights"), Some(&CellValue::Json(json!([1.5, 2]))));
    // No text form is defined for geometric types.
    assert_eq!(row.get("stop_point"), Some(&CellValue::Null));

    let empty = &records[1];
    for key in empty.ordered_keys().into_iter().filter(|k| *k != "id") {
        assert_eq!(empty.get(key), Some(&CellValue::Null), "{key}");
    }
}

pub async fn test_empty_result_keeps_columns(executor: &dyn QueryExecutor) {
    let mut qb = QueryBuilder::new("SELECT * FROM estimatedvehiclejourney WHERE 1=1");
    qb.add_equality("id", -1_i64);
    let (sql, args) = qb.into_parts();
    let set = executor.run(&sql, &args).await.unwrap();
    assert!(set.rows.is_empty());
    assert_eq!(set.columns.first().map(String::as_str), Some("id"));
}

pub async fn test_unparseable_integer_is_query_error(executor: &dyn QueryExecutor) {
    let mut qb = QueryBuilder::new("SELECT * FROM calls WHERE 1=1");
    qb.add_equality("id", "abc");
    let (sql, args) = qb.into_parts();
    let err = executor.run(&sql, &args).await.unwrap_err();
    assert!(matches!(err, Ti1Error::Query(_)), "unexpected error: {err}");
}

pub async fn test_missing_table_is_query_error(executor: &dyn QueryExecutor) {
    let err = executor
        .run("SELECT * FROM no_such_table WHERE 1=1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Ti1Error::Query(_)), "unexpected error: {err}");
}
