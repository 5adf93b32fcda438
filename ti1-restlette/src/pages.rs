use axum::response::Html;

const HOME_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Ti1</title>
</head>
<body>
    <div class="container">
        <h1>Ti1</h1>
        <p>Transit journey and call data.</p>
        <ul>
            <li><a href="/journey">/journey</a> journeys, newest first</li>
            <li><a href="/calls">/calls</a> calls</li>
            <li>/journey/calls?id=N one journey with its calls</li>
            <li><a href="/status">/status</a></li>
        </ul>
    </div>
</body>
</html>"#;

pub(crate) async fn home() -> Html<&'static str> {
    Html(HOME_PAGE)
}
