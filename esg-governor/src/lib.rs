pub mod credits;
pub mod rate_limit;

pub use credits::{
    analysis_cost, CreditGovernor, CACHE_HIT_COST, FULL_COST, QUICK_COST, URL_FETCH_SURCHARGE,
};
pub use rate_limit::{Decision, Endpoint, SlidingWindowLimiter};
