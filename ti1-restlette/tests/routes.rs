use serde_json::Value;
use std::sync::Arc;
use ti1_core::testing::{RecordedQuery, ScriptedExecutor};
use ti1_core::{Arg, RawCell, RowSet, Ti1Error};
use ti1_restlette::build_restlette_router;

async fn serve(executor: Arc<ScriptedExecutor>) -> String {
    let app = build_restlette_router(executor);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", addr.port())
}

async fn get(base: &str, path: &str) -> (u16, String) {
    let resp = reqwest::get(format!("{base}{path}")).await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.text().await.unwrap())
}

fn journey_row(id: i64, vehicle: &str) -> Vec<RawCell> {
    vec![
        RawCell::Text(vehicle.to_string()),
        RawCell::Int(id),
        RawCell::Text("ATB".to_string()),
    ]
}

fn journeys(rows: &[(i64, &str)]) -> RowSet {
    let mut set = RowSet::new(["vehicleref", "id", "datasource"]);
    for (id, vehicle) in rows {
        set.push_row(journey_row(*id, vehicle));
    }
    set
}

#[tokio::test]
async fn status_reports_ok() {
    let base = serve(Arc::new(ScriptedExecutor::new())).await;
    let (status, body) = get(&base, "/status").await;
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"status":"ok"}"#);
}

#[tokio::test]
async fn unknown_path_is_json_404() {
    let base = serve(Arc::new(ScriptedExecutor::new())).await;
    let (status, body) = get(&base, "/nowhere").await;
    assert_eq!(status, 404);
    assert_eq!(body, r#"{"error":"Not Found","code":404}"#);
}

#[tokio::test]
async fn home_page_is_html() {
    let base = serve(Arc::new(ScriptedExecutor::new())).await;
    let resp = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    let body = resp.text().await.unwrap();
    assert!(body.contains("/journey/calls"));
}

#[tokio::test]
async fn calls_list_binds_filters_and_clamps_limit() {
    let rows = RowSet::new(["stoppointref", "id", "order"]).with_row(vec![
        RawCell::Text("NSR:Quay:1".to_string()),
        RawCell::Int(1),
        RawCell::Int(2),
    ]);
    let executor = Arc::new(ScriptedExecutor::new().respond(rows));
    let base = serve(executor.clone()).await;

    let (status, body) = get(&base, "/calls?id=1,2,3&limit=5000").await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        r#"{"data":[{"id":1,"order":2,"stoppointref":"NSR:Quay:1"}],"count":1,"params":{"id":"1,2,3","limit":"5000"}}"#
    );

    assert_eq!(
        executor.recorded(),
        vec![RecordedQuery {
            sql: "SELECT * FROM calls WHERE 1=1 AND id IN ($1,$2,$3) ORDER BY id ASC LIMIT $4"
                .to_string(),
            args: vec![Arg::from("1"), Arg::from("2"), Arg::from("3"), Arg::Int(1000)],
        }]
    );
}

#[tokio::test]
async fn calls_list_empty_result() {
    let executor = Arc::new(ScriptedExecutor::new().respond(RowSet::new(["id"])));
    let base = serve(executor.clone()).await;

    let (status, body) = get(&base, "/calls").await;
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"data":[],"count":0,"params":{}}"#);
    assert_eq!(executor.recorded()[0].args, vec![Arg::Int(10)]);
}

#[tokio::test]
async fn journey_list_applies_cursor_and_renamed_filters() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond(journeys(&[(9, "bus-1"), (8, "bus-2")]))
            .respond(journeys(&[])),
    );
    let base = serve(executor.clone()).await;

    let (status, body) = get(&base, "/journey?vehicle_ref=bus-1,bus-2&after=10").await;
    assert_eq!(status, 200);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["count"], 2);
    assert_eq!(json["data"][0]["id"], 9);
    assert_eq!(json["data"][1]["vehicleref"], "bus-2");
    assert_eq!(json["params"]["after"], "10");

    // The alias route runs the same listing.
    let (status, _) = get(&base, "/journey/get?limit=abc").await;
    assert_eq!(status, 200);

    let recorded = executor.recorded();
    assert_eq!(
        recorded[0].sql,
        "SELECT * FROM public.estimatedvehiclejourney WHERE 1=1 AND vehicleref IN ($1,$2) \
         AND id < $3 ORDER BY id DESC LIMIT $4"
    );
    assert_eq!(
        recorded[0].args,
        vec![Arg::from("bus-1"), Arg::from("bus-2"), Arg::from("10"), Arg::Int(50)]
    );
    assert_eq!(recorded[1].args, vec![Arg::Int(50)]);
}

#[tokio::test]
async fn list_query_failure_is_500() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .fail(Ti1Error::Query("relation \"calls\" does not exist".to_string()))
            .fail(Ti1Error::Scan("bad column".to_string())),
    );
    let base = serve(executor).await;

    let (status, body) = get(&base, "/calls").await;
    assert_eq!(status, 500);
    assert_eq!(body, r#"{"error":"Database query failed","code":500}"#);

    let (status, body) = get(&base, "/journey").await;
    assert_eq!(status, 500);
    assert_eq!(body, r#"{"error":"Failed to scan rows","code":500}"#);
}

#[tokio::test]
async fn ragged_rows_are_scan_failures() {
    let ragged = RowSet::new(["id", "vehicleref"]).with_row(vec![RawCell::Int(1)]);
    let base = serve(Arc::new(ScriptedExecutor::new().respond(ragged))).await;

    let (status, body) = get(&base, "/journey").await;
    assert_eq!(status, 500);
    assert_eq!(body, r#"{"error":"Failed to scan rows","code":500}"#);
}

#[tokio::test]
async fn journey_calls_requires_id() {
    let executor = Arc::new(ScriptedExecutor::new());
    let base = serve(executor.clone()).await;

    let (status, body) = get(&base, "/journey/calls").await;
    assert_eq!(status, 400);
    assert_eq!(body, r#"{"error":"Missing required parameter: id","code":400}"#);
    assert!(executor.recorded().is_empty());
}

#[tokio::test]
async fn journey_calls_non_integer_id_is_404() {
    let executor = Arc::new(ScriptedExecutor::new());
    let base = serve(executor.clone()).await;

    let (status, body) = get(&base, "/journey/calls?id=abc").await;
    assert_eq!(status, 404);
    assert_eq!(
        body,
        r#"{"error":"Invalid id parameter: must be an integer","code":404}"#
    );
    assert!(executor.recorded().is_empty());
}

#[tokio::test]
async fn journey_calls_unknown_journey_is_404() {
    let executor = Arc::new(ScriptedExecutor::new().respond(journeys(&[])));
    let base = serve(executor.clone()).await;

    let (status, body) = get(&base, "/journey/calls?id=404").await;
    assert_eq!(status, 404);
    assert_eq!(body, r#"{"error":"Journey not found","code":404}"#);

    let recorded = executor.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(
        recorded[0].sql,
        "SELECT * FROM estimatedvehiclejourney WHERE 1=1 AND id = $1"
    );
    assert_eq!(recorded[0].args, vec![Arg::Int(404)]);
}

#[tokio::test]
async fn journey_calls_returns_journey_and_ordered_calls() {
    let calls = RowSet::new(["order", "id", "estimatedvehiclejourney"])
        .with_row(vec![RawCell::Int(1), RawCell::Int(11), RawCell::Int(7)])
        .with_row(vec![RawCell::Int(2), RawCell::Int(12), RawCell::Int(7)]);
    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond(journeys(&[(7, "bus-7")]))
            .respond(calls),
    );
    let base = serve(executor.clone()).await;

    let (status, body) = get(&base, "/journey/calls?id=7").await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        r#"{"journey":{"id":7,"datasource":"ATB","vehicleref":"bus-7"},"calls":[{"id":11,"estimatedvehiclejourney":7,"order":1},{"id":12,"estimatedvehiclejourney":7,"order":2}],"count":2,"params":{"id":"7"}}"#
    );

    let recorded = executor.recorded();
    assert_eq!(recorded.len(), 2);
    assert_eq!(
        recorded[1].sql,
        "SELECT * FROM calls WHERE 1=1 AND estimatedvehiclejourney = $1 \
         ORDER BY \"order\" ASC LIMIT $2"
    );
    assert_eq!(recorded[1].args, vec![Arg::Int(7), Arg::Int(200)]);
}

#[tokio::test]
async fn journey_calls_failures_name_the_failing_step() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .fail(Ti1Error::Connection("pool timed out".to_string()))
            .respond(journeys(&[(7, "bus-7")]))
            .fail(Ti1Error::Query("canceled".to_string()))
            .respond(journeys(&[(7, "bus-7")]))
            .fail(Ti1Error::Scan("bad cell".to_string()))
            .fail(Ti1Error::Scan("bad journey cell".to_string())),
    );
    let base = serve(executor).await;

    let (status, body) = get(&base, "/journey/calls?id=7").await;
    assert_eq!(status, 500);
    assert_eq!(body, r#"{"error":"Database query failed","code":500}"#);

    let (_, body) = get(&base, "/journey/calls?id=7").await;
    assert_eq!(body, r#"{"error":"Failed to query calls","code":500}"#);

    let (_, body) = get(&base, "/journey/calls?id=7&limit=5").await;
    assert_eq!(body, r#"{"error":"Failed to scan calls","code":500}"#);

    let (status, body) = get(&base, "/journey/calls?id=7").await;
    assert_eq!(status, 500);
    assert_eq!(body, r#"{"error":"Failed to scan journey","code":500}"#);
}

#[tokio::test]
async fn journey_calls_ragged_journey_row_is_scan_failure() {
    let ragged = RowSet::new(["id", "vehicleref"]).with_row(vec![RawCell::Int(7)]);
    let executor = Arc::new(ScriptedExecutor::new().respond(ragged));
    let base = serve(executor.clone()).await;

    let (status, body) = get(&base, "/journey/calls?id=7").await;
    assert_eq!(status, 500);
    assert_eq!(body, r#"{"error":"Failed to scan journey","code":500}"#);
    assert_eq!(executor.recorded().len(), 1);
}

#[tokio::test]
async fn wrong_method_on_known_path_is_json_405() {
    let executor = Arc::new(ScriptedExecutor::new());
    let base = serve(executor.clone()).await;
    let client = reqwest::Client::new();

    for path in ["/calls", "/journey", "/journey/get", "/journey/calls", "/status", "/"] {
        let resp = client.post(format!("{base}{path}")).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 405, "{path}");
        assert_eq!(
            resp.text().await.unwrap(),
            r#"{"error":"Method Not Allowed","code":405}"#,
            "{path}"
        );
    }
    assert!(executor.recorded().is_empty());
}
