/// A value bound to a `$N` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Text(String),
    Int(i64),
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Text(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

/// Append-only builder for a parameterized PostgreSQL statement.
///
/// The base query must end in a `WHERE` clause (usually `WHERE 1=1`) so that
/// every condition can be appended with a leading `AND`. Values are always bound;
/// field names, operators and the ORDER BY clause are interpolated verbatim, which
/// is why they only accept `&'static str`: they must come from code, never from a
/// request.
///
/// Placeholders are numbered from the bound-argument list itself, so the text and
/// `args()` cannot drift apart.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    sql: String,
    args: Vec<Arg>,
}

impl QueryBuilder {
    pub fn new(base_query: impl Into<String>) -> Self {
        Self {
            sql: base_query.into(),
            args: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Index of the placeholder the next bound value will get.
    pub fn next_param(&self) -> usize {
        self.args.len() + 1
    }

    pub fn into_parts(self) -> (String, Vec<Arg>) {
        (self.sql, self.args)
    }

    fn bind(&mut self, value: Arg) -> usize {
        let idx = self.next_param();
        self.args.push(value);
        idx
    }

    /// ` AND field = $N`
    pub fn add_equality(&mut self, field: &'static str, value: impl Into<Arg>) -> &mut Self {
        self.add_comparison(field, "=", value)
    }

    /// ` AND field <op> $N`
    pub fn add_comparison(
        &mut self,
        field: &'static str,
        operator: &'static str,
        value: impl Into<Arg>,
    ) -> &mut Self {
        self.push_comparison(field, operator, value.into());
        self
    }

    /// ` AND field IN ($N,$N+1,...)`, each value trimmed. An empty slice adds nothing.
    pub fn add_membership<S: AsRef<str>>(&mut self, field: &'static str, values: &[S]) -> &mut Self {
        self.push_membership(field, values);
        self
    }

    /// Equality for a single value, membership for a comma-separated list.
    /// An empty value means "no filter on this field" and adds nothing.
    pub fn add_flexible(&mut self, field: &'static str, raw: &str) -> &mut Self {
        self.push_flexible(field, raw);
        self
    }

    /// Same as [`add_flexible`](Self::add_flexible) but double-quotes the column,
    /// for names that collide with reserved words (`"order"`).
    ///
    /// Like the unquoted form, the single-value branch binds `raw` untrimmed while
    /// the list branch trims every token.
    pub fn add_flexible_quoted(&mut self, field: &'static str, raw: &str) -> &mut Self {
        let quoted = format!("\"{field}\"");
        self.push_flexible(&quoted, raw);
        self
    }

    /// Appends a literal ` ORDER BY <clause>`, e.g. `order_by("id DESC")`.
    pub fn order_by(&mut self, clause: &'static str) -> &mut Self {
        self.sql.push_str(" ORDER BY ");
        self.sql.push_str(clause);
        self
    }

    /// ` LIMIT $N`. Call last, after `order_by`.
    pub fn add_limit(&mut self, limit: i64) -> &mut Self {
        let idx = self.bind(Arg::Int(limit));
        self.sql.push_str(&format!(" LIMIT ${idx}"));
        self
    }

    fn push_comparison(&mut self, column: &str, operator: &str, value: Arg) {
        let idx = self.bind(value);
        self.sql
            .push_str(&format!(" AND {column} {operator} ${idx}"));
    }

    fn push_membership<S: AsRef<str>>(&mut self, column: &str, values: &[S]) {
        if values.is_empty() {
            return;
        }
        let placeholders: Vec<String> = values
            .iter()
            .map(|v| format!("${}", self.bind(Arg::Text(v.as_ref().trim().to_string()))))
            .collect();
        self.sql
            .push_str(&format!(" AND {column} IN ({})", placeholders.join(",")));
    }

    fn push_flexible(&mut self, column: &str, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let tokens: Vec<&str> = raw.split(',').collect();
        if tokens.len() == 1 {
            self.push_comparison(column, "=", Arg::Text(raw.to_string()));
        } else {
            self.push_membership(column, &tokens);
        }
    }
}

/// Resolve a raw `limit` parameter.
///
/// Empty, unparseable or `< 1` gives `default`; anything above `max` is clamped.
pub fn resolve_limit(raw: &str, default: i64, max: i64) -> i64 {
    match raw.parse::<i64>() {
        Ok(n) if n > max => max,
        Ok(n) if n < 1 => default,
        Ok(n) => n,
        Err(_) => default,
    }
}

/// Default and maximum page size for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub default: i64,
    pub max: i64,
}

impl LimitPolicy {
    pub const fn new(default: i64, max: i64) -> Self {
        Self { default, max }
    }

    pub fn resolve(&self, raw: &str) -> i64 {
        resolve_limit(raw, self.default, self.max)
    }
}
