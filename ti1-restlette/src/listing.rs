use crate::QueryParams;
use ti1_core::{LimitPolicy, QueryBuilder};

/// One recognized query parameter and the column it filters.
///
/// Column names are compiled in; request data only ever reaches the bound values.
#[derive(Debug, Clone, Copy)]
pub enum Filter {
    /// `?param=a` or `?param=a,b,c`.
    Flexible {
        param: &'static str,
        column: &'static str,
    },
    /// Like `Flexible`, for reserved-word columns that need quoting.
    FlexibleQuoted {
        param: &'static str,
        column: &'static str,
    },
    /// Single value, always equality.
    Exact {
        param: &'static str,
        column: &'static str,
    },
    /// Keyset cursor: rows whose `column` is strictly below the value.
    Before {
        param: &'static str,
        column: &'static str,
    },
}

impl Filter {
    fn apply(&self, qb: &mut QueryBuilder, params: &QueryParams) {
        match *self {
            Filter::Flexible { param, column } => {
                qb.add_flexible(column, params.get(param));
            }
            Filter::FlexibleQuoted { param, column } => {
                qb.add_flexible_quoted(column, params.get(param));
            }
            Filter::Exact { param, column } => {
                let value = params.get(param);
                if !value.is_empty() {
                    qb.add_equality(column, value);
                }
            }
            Filter::Before { param, column } => {
                let value = params.get(param);
                if !value.is_empty() {
                    qb.add_comparison(column, "<", value);
                }
            }
        }
    }
}

/// A filterable, ordered, limited listing over one table.
#[derive(Debug, Clone, Copy)]
pub struct Listing {
    pub base_query: &'static str,
    pub filters: &'static [Filter],
    pub order_by: &'static str,
    pub limit: LimitPolicy,
}

impl Listing {
    pub fn build(&self, params: &QueryParams) -> QueryBuilder {
        let mut qb = QueryBuilder::new(self.base_query);
        for filter in self.filters {
            filter.apply(&mut qb, params);
        }
        qb.order_by(self.order_by)
            .add_limit(self.limit.resolve(params.get("limit")));
        qb
    }
}

pub const CALLS: Listing = Listing {
    base_query: "SELECT * FROM calls WHERE 1=1",
    filters: &[
        Filter::Flexible {
            param: "id",
            column: "id",
        },
        Filter::Flexible {
            param: "estimatedvehiclejourney",
            column: "estimatedvehiclejourney",
        },
        Filter::FlexibleQuoted {
            param: "order",
            column: "order",
        },
        Filter::Flexible {
            param: "stoppointref",
            column: "stoppointref",
        },
    ],
    order_by: "id ASC",
    limit: LimitPolicy::new(10, 1000),
};

pub const JOURNEYS: Listing = Listing {
    base_query: "SELECT * FROM public.estimatedvehiclejourney WHERE 1=1",
    filters: &[
        Filter::Exact {
            param: "id",
            column: "id",
        },
        Filter::Flexible {
            param: "vehicle_ref",
            column: "vehicleref",
        },
        Filter::Flexible {
            param: "data_source",
            column: "datasource",
        },
        Filter::Flexible {
            param: "line_ref",
            column: "lineref",
        },
        Filter::Before {
            param: "after",
            column: "id",
        },
    ],
    order_by: "id DESC",
    limit: LimitPolicy::new(50, 1000),
};

/// Parent lookup for the journey+calls endpoint.
pub(crate) const JOURNEY_BY_ID: &str = "SELECT * FROM estimatedvehiclejourney WHERE 1=1";
/// Dependent rows for the journey+calls endpoint.
pub(crate) const CALLS_FOR_JOURNEY: &str = "SELECT * FROM calls WHERE 1=1";
pub(crate) const CALLS_FOR_JOURNEY_ORDER: &str = "\"order\" ASC";
pub(crate) const CALLS_FOR_JOURNEY_LIMIT: LimitPolicy = LimitPolicy::new(200, 1000);

#[cfg(test)]
mod tests {
    use super::*;
    use ti1_core::Arg;

    fn build(listing: &Listing, query: &str) -> (String, Vec<Arg>) {
        listing.build(&QueryParams::parse(Some(query))).into_parts()
    }

    #[test]
    fn test_calls_defaults() {
        let (sql, args) = build(&CALLS, "");
        assert_eq!(sql, "SELECT * FROM calls WHERE 1=1 ORDER BY id ASC LIMIT $1");
        assert_eq!(args, vec![Arg::Int(10)]);
    }

    #[test]
    fn test_calls_id_list_with_clamped_limit() {
        let (sql, args) = build(&CALLS, "id=1,2,3&limit=5000");
        assert_eq!(
            sql,
            "SELECT * FROM calls WHERE 1=1 AND id IN ($1,$2,$3) ORDER BY id ASC LIMIT $4"
        );
        assert_eq!(
            args,
            vec![Arg::from("1"), Arg::from("2"), Arg::from("3"), Arg::Int(1000)]
        );
    }

    #[test]
    fn test_calls_all_filters_in_order() {
        let (sql, args) = build(
            &CALLS,
            "stoppointref=NSR:Quay:1&order=2&estimatedvehiclejourney=7&id=9&limit=3",
        );
        assert_eq!(
            sql,
            "SELECT * FROM calls WHERE 1=1 AND id = $1 AND estimatedvehiclejourney = $2 \
             AND \"order\" = $3 AND stoppointref = $4 ORDER BY id ASC LIMIT $5"
        );
        assert_eq!(
            args,
            vec![
                Arg::from("9"),
                Arg::from("7"),
                Arg::from("2"),
                Arg::from("NSR:Quay:1"),
                Arg::Int(3)
            ]
        );
    }

    #[test]
    fn test_calls_ignores_unknown_params() {
        let (sql, _) = build(&CALLS, "vehicle_ref=bus-1&drop=table");
        assert_eq!(sql, "SELECT * FROM calls WHERE 1=1 ORDER BY id ASC LIMIT $1");
    }

    #[test]
    fn test_journeys_id_is_exact_only() {
        let (sql, args) = build(&JOURNEYS, "id=1,2");
        assert_eq!(
            sql,
            "SELECT * FROM public.estimatedvehiclejourney WHERE 1=1 AND id = $1 ORDER BY id DESC LIMIT $2"
        );
        assert_eq!(args, vec![Arg::from("1,2"), Arg::Int(50)]);
    }

    #[test]
    fn test_journeys_renamed_params_and_cursor() {
        let (sql, args) = build(
            &JOURNEYS,
            "vehicle_ref=bus-1,bus-2&data_source=ATB&line_ref=3&after=100&limit=0",
        );
        assert_eq!(
            sql,
            "SELECT * FROM public.estimatedvehiclejourney WHERE 1=1 AND vehicleref IN ($1,$2) \
             AND datasource = $3 AND lineref = $4 AND id < $5 ORDER BY id DESC LIMIT $6"
        );
        assert_eq!(
            args,
            vec![
                Arg::from("bus-1"),
                Arg::from("bus-2"),
                Arg::from("ATB"),
                Arg::from("3"),
                Arg::from("100"),
                Arg::Int(50)
            ]
        );
    }
}
