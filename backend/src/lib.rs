pub mod config;
pub mod verifier;
pub mod store;
pub mod queries;
pub mod ledger;
pub mod tally;
pub mod fanout;
pub mod service;
pub mod routes;
pub mod cors;
pub mod error;
pub mod utils;
pub mod rate_limiter;
pub mod catchers;
pub use shared::{models::*, error::*, client_info::*};

use rocket::{catchers, routes, Build, Rocket};

use crate::{
    catchers::{bad_request, conflict, forbidden, internal_error, not_found, too_many_requests, unauthorized, unavailable, unprocessable},
    config::Config,
    cors::CORS,
    routes::{all_options, get_round, get_tally, get_vote, list_rounds, submit_vote, tally_stream, AppState},
    service::VoteService,
};

/// Mounts the API under `/api`.
pub fn build_rocket(config: &Config, service: VoteService) -> Rocket<Build> {
    rocket::build()
        .attach(CORS::new(config.allowed_origins.clone()))
        .manage(AppState::from_config(config, service))
        .mount(
            "/api",
            routes![
                list_rounds,
                get_round,
                get_tally,
                tally_stream,
                submit_vote,
                get_vote,
                all_options
            ],
        )
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                conflict,
                unprocessable,
                too_many_requests,
                internal_error,
                unavailable
            ],
        )
}

#[cfg(test)]
mod tests;
