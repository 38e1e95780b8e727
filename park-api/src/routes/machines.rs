use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_login::permission_required;
use chrono::Local;
use serde::Deserialize;
use tracing::instrument;

use crate::{
    auth::{AuthBackend, AuthUser},
    domain::{MachineFilter, MachineId, MachineRecord, PeriodKey, Role},
    routes::ApiError,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(add_machine))
        .route("/export", get(export_machines))
        .route_layer(permission_required!(AuthBackend, Role::Admin))
        .route("/", get(get_machines))
        .route("/:machine_id/complete", post(complete_machine))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMachineBody {
    machine_number: String,
}

#[instrument(name = "POST /machines", skip(app_state, body), fields(machine_number = %body.machine_number))]
async fn add_machine(
    State(app_state): State<AppState>,
    Json(body): Json<AddMachineBody>,
) -> Result<Json<MachineRecord>, ApiError> {
    let record = app_state
        .tracker
        .create(&body.machine_number, Local::now().date_naive())
        .await?;

    tracing::info!("Added machine {}", record.machine_id);

    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct ListMachinesQuery {
    filter: Option<MachineFilter>,
}

#[instrument(name = "GET /machines", skip(auth_user, app_state))]
async fn get_machines(
    auth_user: AuthUser,
    State(app_state): State<AppState>,
    Query(query): Query<ListMachinesQuery>,
) -> Result<Json<Vec<MachineRecord>>, ApiError> {
    let filter = query.filter.unwrap_or(MachineFilter::Pending);
    if filter == MachineFilter::All && auth_user.role != Role::Admin {
        return Err(ApiError::forbidden("Only admins may list all machines"));
    }

    let records = app_state
        .tracker
        .list(filter, Local::now().date_naive())
        .await?;

    Ok(Json(records))
}

#[instrument(name = "POST /machines/:machine_id/complete", skip(app_state))]
async fn complete_machine(
    State(app_state): State<AppState>,
    Path(machine_id): Path<String>,
) -> Result<Json<MachineRecord>, ApiError> {
    let record = app_state
        .tracker
        .complete(&MachineId::from(machine_id), Local::now().date_naive())
        .await?;

    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    year: Option<i32>,
    week: Option<u32>,
}

#[instrument(name = "GET /machines/export", skip(app_state))]
async fn export_machines(
    State(app_state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let period = match (query.year, query.week) {
        (Some(year), Some(week)) => {
            if !(1..=53).contains(&week) {
                return Err(ApiError::bad_request(format!(
                    "{} is not a valid ISO week",
                    week
                )));
            }
            Some(PeriodKey::new(year, week))
        }
        (None, None) => None,
        _ => {
            return Err(ApiError::bad_request(
                "year and week must be given together",
            ))
        }
    };

    let csv = app_state
        .tracker
        .export(period, Local::now().date_naive())
        .await?;

    let filename = match period {
        Some(period) => format!("machines-{}.csv", period),
        None => "machines.csv".to_string(),
    };
    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];

    Ok((headers, csv))
}
