// ABOUTME: Submission (POST /) and health (GET /healthz) HTTP endpoints, built on axum
// ABOUTME: Validation mirrors the upstream govalidator rule set field-for-field

use crate::errors::GatewayError;
use crate::models::Sms;
use crate::route::DispatchOutcome;
use crate::server::Server;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    server: Arc<Server>,
    checked_once: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(server: Arc<Server>) -> Self {
        Self {
            server,
            checked_once: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the periodic health tick; after the first tick, `/healthz`
    /// leaves the "spinning up" grace period and reports the real state.
    pub fn spawn_health_ticker(&self) {
        let checked_once = self.checked_once.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                checked_once.store(true, Ordering::Release);
            }
        });
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(send_sms))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SendSmsForm {
    from: String,
    to: String,
    data: String,
    message_id: String,
    route_id: String,
}

fn validate(form: &SendSmsForm) -> Result<(), HashMap<String, Vec<String>>> {
    let mut errors: HashMap<String, Vec<String>> = HashMap::new();

    if form.from.is_empty() {
        errors
            .entry("from".into())
            .or_default()
            .push("Sender of message is required".into());
    } else if form.from.chars().count() > 20 {
        errors
            .entry("from".into())
            .or_default()
            .push("The maximum size of sender is 20 chars long".into());
    }

    if form.to.is_empty() {
        errors
            .entry("to".into())
            .or_default()
            .push("A phone number is required".into());
    } else {
        let digits = form.to.chars().count();
        if !form.to.chars().all(|c| c.is_ascii_digit()) || !(12..=14).contains(&digits) {
            errors
                .entry("to".into())
                .or_default()
                .push("Give a valid MSISDN e.g. 254723549100".into());
        }
    }

    if form.data.is_empty() {
        errors
            .entry("data".into())
            .or_default()
            .push("A message to send to the receiver is required".into());
    } else if form.data.chars().count() > 1000 {
        errors
            .entry("data".into())
            .or_default()
            .push("The maximum size of message is 1000 chars long".into());
    }

    if form.message_id.is_empty() {
        errors
            .entry("message_id".into())
            .or_default()
            .push("What is the reference id for this message?".into());
    } else if form.message_id.chars().count() > 30 {
        errors
            .entry("message_id".into())
            .or_default()
            .push("The maximum size of message_id is 30 chars long".into());
    }

    if form.route_id.is_empty() {
        errors
            .entry("route_id".into())
            .or_default()
            .push("What is the route to use for this message?".into());
    } else if form.route_id.chars().count() > 30 {
        errors
            .entry("route_id".into())
            .or_default()
            .push("The maximum size of route_id is 30 chars long".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

async fn send_sms(
    State(state): State<AppState>,
    Form(form): Form<SendSmsForm>,
) -> Result<Response, GatewayError> {
    validate(&form).map_err(GatewayError::Validation)?;

    let route = state
        .server
        .get(&form.route_id)
        .ok_or_else(|| GatewayError::NoActiveRoute("No active routes were found".to_string()))?;

    let sms = Sms {
        from: form.from,
        to: form.to,
        data: form.data,
        message_id: form.message_id,
        route_id: form.route_id,
        smsc_id: String::new(),
        smsc_status: String::new(),
        smsc_extra: String::new(),
    };

    let outcome = route.submit(sms).await?;

    let body = match outcome {
        DispatchOutcome::Queued => axum::body::Body::from("Queued"),
        DispatchOutcome::Acked(ack) => {
            axum::body::Body::from(serde_json::to_vec(&ack).map_err(|_| GatewayError::Decode)?)
        }
    };

    Ok((
        StatusCode::CREATED,
        [("content-type", "application/json; charset=UTF-8")],
        body,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    message: Option<&'static str>,
}

async fn healthz(State(state): State<AppState>) -> Response {
    if !state.checked_once.load(Ordering::Acquire) {
        return (
            StatusCode::OK,
            Json(HealthBody {
                status: "ok",
                message: Some("Healthcheck spinning up"),
            }),
        )
            .into_response();
    }

    if state.server.is_active() {
        (
            StatusCode::OK,
            Json(HealthBody {
                status: "ok",
                message: None,
            }),
        )
            .into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HealthBody {
                status: "failed",
                message: None,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_required_fields() {
        let form = SendSmsForm {
            from: "".to_string(),
            to: "".to_string(),
            data: "".to_string(),
            message_id: "".to_string(),
            route_id: "".to_string(),
        };
        let errors = validate(&form).unwrap_err();
        assert!(errors.contains_key("from"));
        assert!(errors.contains_key("to"));
        assert!(errors.contains_key("data"));
        assert!(errors.contains_key("message_id"));
        assert!(errors.contains_key("route_id"));
    }

    #[test]
    fn validate_rejects_non_digit_or_out_of_range_msisdn() {
        let mut form = valid_form();
        form.to = "abc".to_string();
        assert!(validate(&form).unwrap_err().contains_key("to"));

        let mut form = valid_form();
        form.to = "12345".to_string();
        assert!(validate(&form).unwrap_err().contains_key("to"));
    }

    #[test]
    fn validate_accepts_well_formed_submission() {
        assert!(validate(&valid_form()).is_ok());
    }

    fn valid_form() -> SendSmsForm {
        SendSmsForm {
            from: "MyBrand".to_string(),
            to: "254723549100".to_string(),
            data: "hello".to_string(),
            message_id: "abc-123".to_string(),
            route_id: "r1".to_string(),
        }
    }
}
