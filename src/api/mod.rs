mod cli;
mod report;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use cli::{Cli, Command, SolveArgs, exit_code, run_solve};
pub use report::{CSV_HEADER, render_csv, render_text};

use crate::config::{ConfigError, parse_scenario};
use crate::core::{
    Objective, PlanError, PlanOptions, ScenarioModel, TaxBump, run_plan_with_defaults,
};

/// Caller-facing knobs shared by the CLI flags and the HTTP payload.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlanRequest {
    pub spend: Option<f64>,
    pub roth: Option<f64>,
    pub time_limit: Option<f64>,
    pub bump_tax: Option<f64>,
    pub bump_start: Option<usize>,
    pub sepp: bool,
}

impl PlanRequest {
    pub fn options(&self) -> Result<PlanOptions, ConfigError> {
        let mut options = PlanOptions {
            sepp_enabled: self.sepp,
            ..PlanOptions::default()
        };

        if let Some(spending) = self.spend {
            if !spending.is_finite() || spending < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "spend must be >= 0 (found {spending})"
                )));
            }
            options.objective = Objective::MinimizeTax { spending };
        }
        if let Some(target) = self.roth {
            if !target.is_finite() || target < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "roth target must be >= 0 (found {target})"
                )));
            }
            options.roth_target = Some(target);
        }
        if let Some(seconds) = self.time_limit {
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "time limit must be > 0 seconds (found {seconds})"
                )));
            }
            options.time_limit = Duration::from_secs_f64(seconds);
        }
        options.tax_bump = match (self.bump_tax, self.bump_start) {
            (None, None) => None,
            (Some(percent), Some(after_year)) => Some(TaxBump {
                percent,
                after_year,
            }),
            _ => {
                return Err(ConfigError::Invalid(
                    "tax bump needs both a percent and a start year".to_string(),
                ));
            }
        };
        Ok(options)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlanPayload {
    scenario: Option<String>,
    spend: Option<f64>,
    roth: Option<f64>,
    time_limit: Option<f64>,
    bump_tax: Option<f64>,
    bump_start: Option<usize>,
    sepp: Option<bool>,
}

#[derive(Debug)]
struct ApiRequest {
    scenario: ScenarioModel,
    options: PlanOptions,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "fire-plan HTTP API listening");

    axum::serve(listener, app).await
}

fn router() -> Router {
    Router::new()
        .route("/api/plan", post(plan_handler))
        .fallback(not_found_handler)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn plan_handler(Json(payload): Json<PlanPayload>) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let solved = tokio::task::spawn_blocking(move || {
        run_plan_with_defaults(&request.scenario, &request.options)
    })
    .await;

    match solved {
        Ok(Ok(report)) => json_response(StatusCode::OK, report),
        Ok(Err(e)) => {
            warn!(error = %e, "plan request failed");
            error_response(status_for(&e), &e.to_string())
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("planner task failed: {e}"),
        ),
    }
}

fn status_for(err: &PlanError) -> StatusCode {
    match err {
        PlanError::Config(_) | PlanError::Scenario(_) => StatusCode::BAD_REQUEST,
        PlanError::Solver(_) | PlanError::ModelingLimit(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, ConfigError> {
    let payload = serde_json::from_str::<PlanPayload>(json)
        .map_err(|e| ConfigError::Invalid(format!("Invalid API JSON payload: {e}")))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: PlanPayload) -> Result<ApiRequest, ConfigError> {
    let Some(text) = payload.scenario else {
        return Err(ConfigError::Invalid(
            "scenario (TOML text) is required".to_string(),
        ));
    };
    let options = PlanRequest {
        spend: payload.spend,
        roth: payload.roth,
        time_limit: payload.time_limit,
        bump_tax: payload.bump_tax,
        bump_start: payload.bump_start,
        sepp: payload.sepp.unwrap_or(false),
    }
    .options()?;
    let scenario = parse_scenario(&text)?;
    Ok(ApiRequest { scenario, options })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FailureStatus, ScenarioError, SolverFailure};

    #[test]
    fn api_request_from_json_parses_camel_case_keys() {
        let json = r#"{
            "scenario": "startage = 65\n[IRA]\nbal = 500000\n",
            "spend": 40000,
            "timeLimit": 12.5,
            "bumpTax": 3,
            "bumpStart": 10,
            "sepp": true
        }"#;
        let request = api_request_from_json(json).expect("valid payload");
        assert_eq!(request.scenario.ira.balance, 500_000.0);
        assert_eq!(
            request.options.objective,
            Objective::MinimizeTax { spending: 40_000.0 }
        );
        assert_eq!(request.options.time_limit, Duration::from_secs_f64(12.5));
        assert_eq!(
            request.options.tax_bump,
            Some(TaxBump {
                percent: 3.0,
                after_year: 10
            })
        );
        assert!(request.options.sepp_enabled);
    }

    #[test]
    fn api_request_requires_scenario_text() {
        let err = api_request_from_json(r#"{"spend": 1000}"#).expect_err("missing scenario");
        assert!(err.to_string().contains("scenario"));
    }

    #[test]
    fn api_request_rejects_half_a_tax_bump() {
        let json = r#"{"scenario": "startage = 65\n", "bumpTax": 2}"#;
        let err = api_request_from_json(json).expect_err("incomplete bump");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn api_request_surfaces_scenario_errors() {
        let json = r#"{"scenario": "startage = 65\n[expense.a]\namount = 1\nage = \"x\"\n"}"#;
        let err = api_request_from_json(json).expect_err("bad age");
        assert!(matches!(err, ConfigError::BadAge(_)));
    }

    #[test]
    fn plan_request_defaults_to_max_spending() {
        let options = PlanRequest::default().options().expect("defaults are valid");
        assert_eq!(options, PlanOptions::default());
    }

    #[test]
    fn plan_request_rejects_bad_numbers() {
        let negative = PlanRequest {
            spend: Some(-1.0),
            ..PlanRequest::default()
        };
        assert!(negative.options().is_err());
        let zero_time = PlanRequest {
            time_limit: Some(0.0),
            ..PlanRequest::default()
        };
        assert!(zero_time.options().is_err());
    }

    #[test]
    fn error_statuses_follow_error_kind() {
        let solver = PlanError::Solver(SolverFailure {
            status: FailureStatus::Infeasible,
            message: "infeasible".to_string(),
        });
        assert_eq!(status_for(&solver), StatusCode::UNPROCESSABLE_ENTITY);
        let scenario = PlanError::Scenario(ScenarioError::EmptyPlan {
            retire_age: 70,
            end_age: 70,
        });
        assert_eq!(status_for(&scenario), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn json_responses_disable_caching() {
        let response = error_response(StatusCode::BAD_REQUEST, "nope");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
    }

    #[test]
    fn router_builds() {
        let _ = router();
    }
}
