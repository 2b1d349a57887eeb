use crate::cors;
use crate::metrics_defs::REQUEST_DURATION;
use crate::normalizer::{self, NormalizedResponse, SurveyAnswers};
use crate::orchestrator::{Campaign, InviteRequest, Orchestrator};
use axum::extract::{MatchedPath, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use survey_client::types::{Link, Participant};
use survey_client::{SurveyPlatform, UpstreamError};

#[derive(Clone)]
pub struct AppState {
    platform: Arc<dyn SurveyPlatform>,
    orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(platform: Arc<dyn SurveyPlatform>, orchestrator: Orchestrator) -> Self {
        AppState {
            platform,
            orchestrator,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bulk-responses", post(bulk_responses))
        .route("/response", post(response))
        .route("/redirect", post(redirect))
        .route("/survey-schema", post(survey_schema))
        .route("/delete-session", post(delete_session))
        .route("/email", post(email))
        .route("/contact/{contact_id}/responseIds", get(contact_response_ids))
        .route("/dist/{dist_id}/responseIds", get(distribution_response_ids))
        .route_layer(middleware::from_fn(track_duration))
        .layer(middleware::from_fn(cors::permissive))
        .with_state(state)
}

/// Upstream failures as seen by API callers.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// A read-only lookup failed.
    #[error(transparent)]
    Lookup(UpstreamError),
    /// A step of the invite workflow failed.
    #[error(transparent)]
    Workflow(UpstreamError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Lookup(_) => StatusCode::BAD_REQUEST,
            ApiError::Workflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(e: UpstreamError) -> Self {
        ApiError::Lookup(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Lookup(e) => tracing::warn!(error = %e, "upstream lookup failed"),
            ApiError::Workflow(e) => tracing::error!(error = %e, "invite workflow failed"),
        }
        (status, Json(json!({ "detail": [self.to_string()] }))).into_response()
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SurveyRequest {
    survey_id: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ResponseRequest {
    survey_id: String,
    response_id: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SessionRequest {
    survey_id: String,
    session_id: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EmailRequest {
    email: String,
    directory_id: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EmailPresence {
    email_present: bool,
}

/// Body of `/redirect`. A participant is either invited from scratch or, when only
/// an intake response is known, pointed at the invite already sent to them.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RedirectRequest {
    Invite(InviteBody),
    Existing(ExistingInviteBody),
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InviteBody {
    target_survey_id: String,
    email: String,
    first_name: String,
    last_name: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(rename = "RulesConsentID")]
    rules_consent_id: String,
    #[serde(rename = "SurveyswapID")]
    survey_swap_id: String,
    #[serde(rename = "SurveyswapGroup")]
    survey_swap_group: String,
    #[serde(rename = "utm_campaign")]
    utm_campaign: String,
    #[serde(rename = "utm_medium")]
    utm_medium: String,
    #[serde(rename = "utm_source")]
    utm_source: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ExistingInviteBody {
    survey_id: String,
    response_id: String,
    target_survey_id: String,
}

impl From<InviteBody> for InviteRequest {
    fn from(body: InviteBody) -> Self {
        InviteRequest {
            target_survey_id: body.target_survey_id,
            participant: Participant {
                email: body.email,
                first_name: body.first_name,
                last_name: body.last_name,
                response_id: None,
                language: body.language,
            },
            campaign: Campaign {
                rules_consent_id: body.rules_consent_id,
                survey_swap_id: body.survey_swap_id,
                survey_swap_group: body.survey_swap_group,
                utm_campaign: body.utm_campaign,
                utm_medium: body.utm_medium,
                utm_source: body.utm_source,
            },
        }
    }
}

async fn track_duration(req: Request, next: Next) -> Response {
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_default();
    let start = Instant::now();

    let response = next.run(req).await;

    shared::histogram!(
        REQUEST_DURATION,
        "endpoint" => endpoint,
        "status" => response.status().as_u16().to_string()
    )
    .record(start.elapsed().as_secs_f64());
    response
}

async fn bulk_responses(
    State(state): State<AppState>,
    Json(req): Json<SurveyRequest>,
) -> Result<Json<Vec<NormalizedResponse>>, ApiError> {
    let results = state.platform.result_export(&req.survey_id).await?;
    Ok(Json(normalizer::normalize_all(&results)))
}

async fn response(
    State(state): State<AppState>,
    Json(req): Json<ResponseRequest>,
) -> Result<Json<SurveyAnswers>, ApiError> {
    let result = state
        .platform
        .get_response(&req.survey_id, &req.response_id)
        .await?;
    Ok(Json(normalizer::survey_answers(result)))
}

async fn redirect(
    State(state): State<AppState>,
    Json(req): Json<RedirectRequest>,
) -> Result<Json<Link>, ApiError> {
    let link = match req {
        RedirectRequest::Invite(body) => state.orchestrator.invite(body.into()).await,
        RedirectRequest::Existing(body) => {
            state
                .orchestrator
                .resolve_existing_link(&body.survey_id, &body.response_id, &body.target_survey_id)
                .await
        }
    };
    link.map(Json).map_err(ApiError::Workflow)
}

async fn survey_schema(
    State(state): State<AppState>,
    Json(req): Json<SurveyRequest>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.platform.get_survey_schema(&req.survey_id).await?))
}

async fn delete_session(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<Value>, ApiError> {
    let reply = state
        .platform
        .delete_session(&req.survey_id, &req.session_id)
        .await?;
    Ok(Json(reply))
}

async fn email(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<EmailPresence>, ApiError> {
    let contacts = state
        .platform
        .search_contacts(Some(&req.directory_id), &req.email)
        .await?;
    Ok(Json(EmailPresence {
        email_present: !contacts.is_empty(),
    }))
}

async fn contact_response_ids(
    State(state): State<AppState>,
    Path(contact_id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(
        state.orchestrator.response_ids_for_contact(&contact_id).await?,
    ))
}

async fn distribution_response_ids(
    State(state): State<AppState>,
    Path(dist_id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(
        state
            .orchestrator
            .response_ids_for_distribution(&dist_id)
            .await?,
    ))
}
