use futures::StreamExt;
use rocket::response::stream::{Event, EventStream};
use rocket::tokio::select;
use rocket::{State, Shutdown, get, post, http::Status, serde::json::Json};
use shared::models::*;
use shared::{ClientInfo, RejectReason};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::{
    config::Config,
    error::{ApiError, status_for_result},
    rate_limiter::RateLimiter,
    service::VoteService,
    utils::{parse_identity, parse_round},
};

pub struct AppState {
    pub service: VoteService,
    pub submit_limiter: RateLimiter,
}

impl AppState {
    pub fn new(service: VoteService) -> Self {
        Self { service, submit_limiter: RateLimiter::default() }
    }

    pub fn from_config(config: &Config, service: VoteService) -> Self {
        Self {
            service,
            submit_limiter: RateLimiter::new(config.submit_rate_limit, config.submit_rate_window_minutes),
        }
    }
}

#[get("/rounds")]
pub fn list_rounds(state: &State<AppState>) -> Json<Vec<RoundView>> {
    let now = OffsetDateTime::now_utc();
    Json(state.service.rounds().map(|round| round.view_at(now)).collect())
}

#[get("/rounds/<id>")]
pub fn get_round(state: &State<AppState>, id: &str) -> Result<Json<RoundView>, ApiError> {
    let round_id = parse_round(id)?;
    let round = state.service.round(&round_id).ok_or(ApiError::NotFound)?;
    Ok(Json(round.view_at(OffsetDateTime::now_utc())))
}

#[get("/rounds/<id>/tally")]
pub fn get_tally(state: &State<AppState>, id: &str) -> Result<Json<TallySnapshot>, ApiError> {
    let round_id = parse_round(id)?;
    state.service.snapshot(&round_id).map(Json).ok_or(ApiError::NotFound)
}

#[get("/rounds/<id>/tally/stream")]
pub fn tally_stream(
    state: &State<AppState>,
    id: &str,
    mut shutdown: Shutdown,
) -> Result<EventStream![], ApiError> {
    let round_id = parse_round(id)?;
    let mut updates = state.service.subscribe(&round_id).ok_or(ApiError::NotFound)?;

    Ok(EventStream! {
        loop {
            let snapshot = select! {
                next = updates.next() => match next {
                    Some(snapshot) => snapshot,
                    None => break,
                },
                _ = &mut shutdown => break,
            };
            yield Event::json(&snapshot).event("tally");
        }
    })
}

#[rocket::options("/<_..>")]
pub async fn all_options() -> Status {
    Status::Ok
}

#[instrument(skip(state, request, client), fields(round_id = %id))]
#[post("/rounds/<id>/votes", format = "json", data = "<request>")]
pub async fn submit_vote(
    state: &State<AppState>,
    id: &str,
    request: Json<SubmitVoteRequest>,
    client: ClientInfo,
) -> (Status, Json<VoteResult>) {
    let Ok(round_id) = parse_round(id) else {
        let result = VoteResult::rejected(RejectReason::NoSuchRound, None);
        return (status_for_result(&result), Json(result));
    };

    if state.submit_limiter.check(&client.rate_key("submit_vote")).is_err() {
        let result = VoteResult::rejected(RejectReason::RateLimited, state.service.snapshot(&round_id));
        return (status_for_result(&result), Json(result));
    }

    let result = state.service.submit(&round_id, request.into_inner()).await;
    debug!("Submission in round {} finished: {:?} {:?}", round_id, result.status, result.reason);
    (status_for_result(&result), Json(result))
}

#[get("/rounds/<id>/votes/<fid>")]
pub async fn get_vote(state: &State<AppState>, id: &str, fid: u64) -> Result<Json<Vote>, ApiError> {
    let round_id = parse_round(id)?;
    let identity = parse_identity(fid)?;
    state.service
        .find_vote(&round_id, identity)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}
