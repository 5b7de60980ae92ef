mod support;

mod dedup;
mod rate_limit;
mod retry_behavior;
