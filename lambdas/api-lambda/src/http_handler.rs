use gradebook_shared::{
    cors::CorsPolicy,
    demo, marks, performance,
    error::ServiceError,
    subjects,
    types::{
        CreateMarksRequest, CreateUserRequest, LoginRequest, LoginResponse, MessageResponse, Role,
        SubjectRequest, UpdateMarksRequest,
    },
    users, AppState,
};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

type Reply = (StatusCode, Value);

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not found")]
    NoRoute,

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("response encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NoRoute => StatusCode::NOT_FOUND,
            ApiError::Service(ServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Service(ServiceError::Conflict(_)) => StatusCode::BAD_REQUEST,
            ApiError::Service(ServiceError::Unauthorized) => StatusCode::UNAUTHORIZED,
            ApiError::Service(ServiceError::Store(_))
            | ApiError::Service(ServiceError::PasswordHash(_))
            | ApiError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Server-side failures are logged in full and reported generically.
    fn detail(&self) -> String {
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

/// CORS headers resolved once per request.
struct Cors {
    allow_origin: Option<String>,
    vary: bool,
}

impl Cors {
    fn for_request(policy: &CorsPolicy, event: &Request) -> Self {
        let origin = event.headers().get("Origin").and_then(|v| v.to_str().ok());
        Self {
            allow_origin: policy.allow_origin(origin),
            vary: matches!(policy, CorsPolicy::AllowList(_)) || origin.is_some(),
        }
    }

    fn apply(&self, mut builder: lambda_http::http::response::Builder) -> lambda_http::http::response::Builder {
        if let Some(origin) = &self.allow_origin {
            builder = builder
                .header("Access-Control-Allow-Origin", origin.as_str())
                .header("Access-Control-Allow-Credentials", "true");
        }
        if self.vary {
            builder = builder.header("Vary", "Origin");
        }
        builder
    }

    fn json(&self, status: StatusCode, body: &Value) -> Result<Response<Body>, Error> {
        Ok(self
            .apply(Response::builder())
            .status(status)
            .header("Content-Type", "application/json")
            .body(body.to_string().into())
            .map_err(Box::new)?)
    }

    fn preflight(&self) -> Result<Response<Body>, Error> {
        Ok(self
            .apply(Response::builder())
            .status(StatusCode::NO_CONTENT)
            .header("Access-Control-Allow-Methods", "GET,POST,PUT,DELETE,OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type,Authorization")
            .body(Body::Empty)
            .map_err(Box::new)?)
    }
}

/// Main Lambda handler - routes `/api/...` requests to the record service
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let cors = Cors::for_request(&state.cors, &event);
    tracing::info!("Gradebook API invoked - Method: {} Path: {}", event.method(), event.uri().path());

    if event.method() == Method::OPTIONS {
        return cors.preflight();
    }

    match route(&event, &state).await {
        Ok((status, body)) => cors.json(status, &body),
        Err(err) => {
            let status = err.status();
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!("{} {} failed: {}", event.method(), event.uri().path(), err);
            } else {
                tracing::warn!("{} {} rejected ({}): {}", event.method(), event.uri().path(), status, err);
            }
            cors.json(status, &serde_json::json!({ "detail": err.detail() }))
        }
    }
}

async fn route(event: &Request, state: &AppState) -> Result<Reply, ApiError> {
    let Some(path) = event.uri().path().strip_prefix("/api") else {
        return Err(ApiError::NoRoute);
    };
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let store = state.store.as_ref();
    let body = event.body();

    match (event.method(), parts.as_slice()) {
        // --- AUTH ---
        (&Method::POST, ["auth", "login"]) => {
            let user = users::login(store, parse::<LoginRequest>(body)?).await?;
            ok(&LoginResponse {
                user,
                message: "Login successful".to_string(),
            })
        }

        // --- USERS ---
        (&Method::POST, ["users"]) => {
            let user = users::create_user(store, parse::<CreateUserRequest>(body)?).await?;
            created(&user)
        }
        (&Method::GET, ["users"]) => {
            let role = query_param(event, "role")
                .map(|role| role.parse::<Role>().map_err(ApiError::BadRequest))
                .transpose()?;
            ok(&users::list_users(store, role).await?)
        }
        (&Method::GET, ["users", user_id]) => ok(&users::get_user(store, user_id).await?),

        // --- SUBJECTS ---
        (&Method::POST, ["subjects"]) => {
            let subject = subjects::create_subject(store, parse::<SubjectRequest>(body)?).await?;
            created(&subject)
        }
        (&Method::GET, ["subjects"]) => {
            let semester = semester_param(event)?;
            ok(&subjects::list_subjects(store, semester).await?)
        }
        (&Method::PUT, ["subjects", subject_id]) => {
            let req = parse::<SubjectRequest>(body)?;
            ok(&subjects::update_subject(store, subject_id, req).await?)
        }
        (&Method::DELETE, ["subjects", subject_id]) => {
            subjects::delete_subject(store, subject_id).await?;
            ok(&MessageResponse::new("Subject deleted successfully"))
        }

        // --- MARKS ---
        (&Method::POST, ["marks"]) => {
            let marks = marks::create_marks(store, parse::<CreateMarksRequest>(body)?).await?;
            created(&marks)
        }
        (&Method::GET, ["marks"]) => {
            let student_id = query_param(event, "student_id");
            let semester = semester_param(event)?;
            ok(&marks::list_marks(store, student_id.as_deref(), semester).await?)
        }
        (&Method::PUT, ["marks", marks_id]) => {
            let req = parse::<UpdateMarksRequest>(body)?;
            ok(&marks::update_marks(store, marks_id, req).await?)
        }
        (&Method::DELETE, ["marks", marks_id]) => {
            marks::delete_marks(store, marks_id).await?;
            ok(&MessageResponse::new("Marks deleted successfully"))
        }

        // --- REPORTS ---
        (&Method::GET, ["performance", student_id]) => {
            ok(&performance::student_performance(store, student_id).await?)
        }
        (&Method::GET, ["detailed-marks", student_id]) => {
            ok(&performance::detailed_marks(store, student_id).await?)
        }
        (&Method::GET, ["class-averages", semester]) => {
            let semester = semester
                .parse::<u32>()
                .map_err(|e| ApiError::BadRequest(format!("Invalid semester: {}", e)))?;
            ok(&performance::class_averages(store, semester).await?)
        }

        // --- DEMO DATA ---
        (&Method::POST, ["init-demo-data"]) => {
            let outcome = demo::seed_demo_data(store).await?;
            ok(&MessageResponse::new(outcome.message()))
        }

        _ => Err(ApiError::NoRoute),
    }
}

fn ok<T: Serialize>(value: &T) -> Result<Reply, ApiError> {
    Ok((StatusCode::OK, serde_json::to_value(value)?))
}

fn created<T: Serialize>(value: &T) -> Result<Reply, ApiError> {
    Ok((StatusCode::CREATED, serde_json::to_value(value)?))
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Malformed payload: {}", e)))
}

/// Reads a query parameter from the API Gateway context, falling back to the
/// raw query string for locally constructed requests.
fn query_param(event: &Request, name: &str) -> Option<String> {
    if let Some(params) = event.query_string_parameters_ref() {
        return params.first(name).map(str::to_string);
    }
    event.uri().query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    })
}

fn semester_param(event: &Request) -> Result<Option<u32>, ApiError> {
    query_param(event, "semester")
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|e| ApiError::BadRequest(format!("Invalid semester: {}", e)))
        })
        .transpose()
}
