//! HTTP fetching
//!
//! [`build_http_client`] constructs one worker's client; [`RequestContext`]
//! and [`FetchOutcome`] describe multiplexed requests and their results;
//! [`run_fetch_worker`] is the worker loop that ties acquisition, gating,
//! dispatch and completion handling together.

mod client;
mod request;
mod worker;

pub use client::{build_http_client, user_agent_string, CONNECT_TIMEOUT, MAX_REDIRECTS, REQUEST_TIMEOUT};
pub use request::{
    classify_transport, execute_page_request, execute_robots_request, FetchCompletion,
    FetchOutcome, RequestContext, RequestTag, TransportKind,
};
pub use worker::{run_fetch_worker, FetchContext};
