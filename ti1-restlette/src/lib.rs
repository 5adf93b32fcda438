mod listing;
mod pages;
mod params;
mod response;
mod routes;

pub use listing::{Filter, Listing, CALLS, JOURNEYS};
pub use params::QueryParams;
pub use response::{ApiError, JourneyCallsResponse, ListResponse};
pub use routes::build_restlette_router;
