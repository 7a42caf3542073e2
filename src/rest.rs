//! HTTP API layer using Axum
//!
//! One handler per (resource, verb) pair, route paths keep their trailing
//! slashes:
//! - Courses and lessons: public reads, owner/moderator-gated writes.
//! - Users, subscriptions, payments: authenticated only.
//! - Checkout flow against the payment provider plus the success/cancel
//!   redirect endpoints.
//!
//! Identity is an extractor, not middleware: every handler receives the
//! requester (or anonymity) explicitly and runs the policy check itself.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{
    create_access_token, create_refresh_token, hash_password, validate_token, verify_password,
    ACCESS_TOKEN_TYPE, REFRESH_TOKEN_TYPE,
};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{Course, Lesson, Payment, PaymentMethod, User};
use crate::policy::{decide, Action, Decision};
use crate::serializers::{
    course_out, lesson_out, payment_out, user_out, AccessOut, CheckoutOut, CourseIn,
    CoursePayload, CustomerOut, LessonIn, LoginIn, MessageOut, PaymentIn, RefreshIn, RegisterIn,
    SubscriptionToggleIn, TokenPairOut, UserUpdateIn,
};
use crate::storage::{Storage, StorageError};
use crate::stripe::PaymentGateway;
use crate::validators::validate_youtube_link;

const COURSE_NOT_FOUND: &str = "Курс не найден";
const LESSON_NOT_FOUND: &str = "Урок не найден";
const USER_NOT_FOUND: &str = "Пользователь не найден";
const PAYMENT_NOT_FOUND: &str = "Платеж не найден";

/// Shared app state for the handlers.
#[derive(Clone)]
pub struct AppState {
    storage: Storage,
    gateway: Arc<dyn PaymentGateway>,
    config: Config,
}

/// The authenticated requester, or `None` for anonymous requests.
///
/// A missing Authorization header is anonymity; a present but invalid
/// bearer token is rejected outright.
pub struct Identity(pub Option<User>);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(header_value) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        else {
            return Ok(Identity(None));
        };
        let Some(token) = header_value.strip_prefix("Bearer ") else {
            return Ok(Identity(None));
        };

        let claims = validate_token(token, ACCESS_TOKEN_TYPE, state.config.jwt_secret.as_bytes())
            .map_err(|_| ApiError::TokenInvalid)?;
        let user_id: u64 = claims.sub.parse().map_err(|_| ApiError::TokenInvalid)?;
        let user = state
            .storage
            .get_user(user_id)?
            .ok_or(ApiError::TokenInvalid)?;
        if user.is_blocked {
            return Err(ApiError::Forbidden);
        }
        Ok(Identity(Some(user)))
    }
}

fn require_user(identity: Identity) -> Result<User, ApiError> {
    identity.0.ok_or(ApiError::Unauthorized)
}

/// Policy check translated to the HTTP outcome: anonymous denials read as
/// 401, authenticated ones as 403.
fn authorize(actor: Option<&User>, action: Action, owner: Option<u64>) -> Result<(), ApiError> {
    match decide(actor, action, owner) {
        Decision::Allow => Ok(()),
        Decision::Deny => match actor {
            Some(_) => Err(ApiError::Forbidden),
            None => Err(ApiError::Unauthorized),
        },
    }
}

pub fn create_router(
    storage: Storage,
    gateway: Arc<dyn PaymentGateway>,
    config: Config,
) -> Router {
    let state = Arc::new(AppState {
        storage,
        gateway,
        config,
    });

    Router::new()
        .route("/health", get(health_handler))
        .route("/register/", post(register_handler))
        .route("/login/", post(login_handler))
        .route("/token/refresh/", post(refresh_handler))
        .route(
            "/user/:id/",
            get(retrieve_user_handler)
                .put(update_user_handler)
                .delete(delete_user_handler),
        )
        .route(
            "/courses/",
            get(list_courses_handler).post(create_course_handler),
        )
        .route(
            "/courses/:id/",
            get(retrieve_course_handler)
                .put(update_course_handler)
                .delete(delete_course_handler),
        )
        .route("/courses/:id/checkout/", post(checkout_handler))
        .route("/lesson/create/", post(create_lesson_handler))
        .route("/lesson/", get(list_lessons_handler))
        .route("/lesson/:id/", get(retrieve_lesson_handler))
        .route("/lesson/update/:id/", put(update_lesson_handler))
        .route("/lesson/delete/:id/", delete(delete_lesson_handler))
        .route("/subscription/", post(subscription_toggle_handler))
        .route("/stripe/customer/", post(create_customer_handler))
        .route("/payment/create/", post(create_payment_handler))
        .route("/payment/", get(list_payments_handler))
        .route("/payment/success/", get(payment_success_handler))
        .route("/payment/cancel/", get(payment_cancel_handler))
        .route("/payment/:id/", get(retrieve_payment_handler))
        .route("/payment/update/:id/", put(update_payment_handler))
        .route("/payment/delete/:id/", delete(delete_payment_handler))
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// --- Auth ---

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterIn>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Не указан email"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Не указан пароль"));
    }

    let user = User {
        id: 0,
        email: payload.email,
        username: payload.username,
        password_hash: hash_password(&payload.password)?,
        phone: payload.phone,
        city: payload.city,
        avatar: None,
        is_confirmed: false,
        is_blocked: false,
        is_superuser: false,
        groups: vec![],
        stripe_customer_id: None,
        date_joined: Utc::now(),
    };
    let created = state.storage.create_user(user).map_err(|err| match err {
        StorageError::Conflict(_) => {
            ApiError::validation("Пользователь с таким email уже существует")
        }
        other => other.into(),
    })?;
    info!(user_id = created.id, "user registered");
    Ok((StatusCode::CREATED, Json(user_out(&created))))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginIn>,
) -> Result<Json<TokenPairOut>, ApiError> {
    let user = state
        .storage
        .get_user_by_email(&payload.email)?
        .ok_or(ApiError::InvalidCredentials)?;
    if user.is_blocked {
        return Err(ApiError::InvalidCredentials);
    }
    if !verify_password(&payload.password, &user.password_hash).unwrap_or(false) {
        return Err(ApiError::InvalidCredentials);
    }

    let secret = state.config.jwt_secret.as_bytes();
    Ok(Json(TokenPairOut {
        access: create_access_token(&user, secret)?,
        refresh: create_refresh_token(&user, secret)?,
    }))
}

async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshIn>,
) -> Result<Json<AccessOut>, ApiError> {
    let secret = state.config.jwt_secret.as_bytes();
    let claims = validate_token(&payload.refresh, REFRESH_TOKEN_TYPE, secret)
        .map_err(|_| ApiError::TokenInvalid)?;
    let user_id: u64 = claims.sub.parse().map_err(|_| ApiError::TokenInvalid)?;
    let user = state
        .storage
        .get_user(user_id)?
        .ok_or(ApiError::TokenInvalid)?;
    if user.is_blocked {
        return Err(ApiError::TokenInvalid);
    }
    Ok(Json(AccessOut {
        access: create_access_token(&user, secret)?,
    }))
}

// --- Users ---

async fn retrieve_user_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = require_user(identity)?;
    authorize(Some(&actor), Action::Retrieve, Some(id))?;
    let user = state
        .storage
        .get_user(id)?
        .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;
    Ok(Json(user_out(&user)))
}

async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
    Json(payload): Json<UserUpdateIn>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = require_user(identity)?;
    let mut user = state
        .storage
        .get_user(id)?
        .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;
    authorize(Some(&actor), Action::Update, Some(id))?;

    // Account flags are staff-level, group membership is superuser-level.
    if (payload.is_confirmed.is_some() || payload.is_blocked.is_some())
        && !(actor.is_superuser || actor.is_moderator())
    {
        return Err(ApiError::Forbidden);
    }
    if payload.groups.is_some() && !actor.is_superuser {
        return Err(ApiError::Forbidden);
    }

    if let Some(email) = payload.email {
        user.email = email;
    }
    if let Some(username) = payload.username {
        user.username = username;
    }
    if let Some(password) = payload.password {
        user.password_hash = hash_password(&password)?;
    }
    if let Some(phone) = payload.phone {
        user.phone = Some(phone);
    }
    if let Some(city) = payload.city {
        user.city = Some(city);
    }
    if let Some(avatar) = payload.avatar {
        user.avatar = Some(avatar);
    }
    if let Some(is_confirmed) = payload.is_confirmed {
        user.is_confirmed = is_confirmed;
    }
    if let Some(is_blocked) = payload.is_blocked {
        user.is_blocked = is_blocked;
    }
    if let Some(groups) = payload.groups {
        user.groups = groups;
    }

    state.storage.update_user(&user).map_err(|err| match err {
        StorageError::Conflict(_) => {
            ApiError::validation("Пользователь с таким email уже существует")
        }
        other => other.into(),
    })?;
    Ok(Json(user_out(&user)))
}

async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let actor = require_user(identity)?;
    state
        .storage
        .get_user(id)?
        .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;
    authorize(Some(&actor), Action::Delete, Some(id))?;
    state.storage.delete_user(id)?;
    info!(user_id = id, deleted_by = actor.id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Courses ---

async fn list_courses_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    authorize(identity.0.as_ref(), Action::List, None)?;
    let viewer = identity.0.as_ref();
    let mut body = Vec::new();
    for course in state.storage.list_courses()? {
        body.push(course_out(&state.storage, &course, viewer)?);
    }
    Ok(Json(body))
}

async fn retrieve_course_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(identity.0.as_ref(), Action::Retrieve, None)?;
    let course = state
        .storage
        .get_course(id)?
        .ok_or_else(|| ApiError::not_found(COURSE_NOT_FOUND))?;
    Ok(Json(course_out(
        &state.storage,
        &course,
        identity.0.as_ref(),
    )?))
}

fn build_course(input: CourseIn, owner: u64) -> Result<Course, ApiError> {
    if input.price < 0 {
        return Err(ApiError::validation(
            "Стоимость курса не может быть отрицательной",
        ));
    }
    Ok(Course {
        id: 0,
        title: input.title,
        price: input.price,
        preview: input.preview,
        description: input.description,
        owner,
        stripe_product_id: None,
        stripe_price_id: None,
        stripe_price_amount: None,
    })
}

/// `POST /courses/` accepts a single course object or an array of them.
async fn create_course_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<CoursePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = require_user(identity)?;
    authorize(Some(&actor), Action::Create, None)?;

    let body = match payload {
        CoursePayload::One(input) => {
            let created = state.storage.create_course(build_course(input, actor.id)?)?;
            info!(course_id = created.id, owner = actor.id, "course created");
            serde_json::to_value(course_out(&state.storage, &created, Some(&actor))?)?
        }
        CoursePayload::Many(inputs) => {
            let mut created_out = Vec::with_capacity(inputs.len());
            for input in inputs {
                let created = state.storage.create_course(build_course(input, actor.id)?)?;
                created_out.push(course_out(&state.storage, &created, Some(&actor))?);
            }
            info!(count = created_out.len(), owner = actor.id, "courses created");
            serde_json::to_value(created_out)?
        }
    };
    Ok((StatusCode::CREATED, Json(body)))
}

async fn update_course_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
    Json(payload): Json<CourseIn>,
) -> Result<impl IntoResponse, ApiError> {
    let mut course = state
        .storage
        .get_course(id)?
        .ok_or_else(|| ApiError::not_found(COURSE_NOT_FOUND))?;
    authorize(identity.0.as_ref(), Action::Update, Some(course.owner))?;
    if payload.price < 0 {
        return Err(ApiError::validation(
            "Стоимость курса не может быть отрицательной",
        ));
    }

    course.title = payload.title;
    course.price = payload.price;
    course.preview = payload.preview;
    course.description = payload.description;
    // Provider linkage stays; a price drift is detected at checkout time.
    state.storage.update_course(&course)?;
    Ok(Json(course_out(
        &state.storage,
        &course,
        identity.0.as_ref(),
    )?))
}

async fn delete_course_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let course = state
        .storage
        .get_course(id)?
        .ok_or_else(|| ApiError::not_found(COURSE_NOT_FOUND))?;
    authorize(identity.0.as_ref(), Action::Delete, Some(course.owner))?;
    state.storage.delete_course(id)?;
    info!(course_id = id, "course deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Lessons ---

async fn list_lessons_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    authorize(identity.0.as_ref(), Action::List, None)?;
    let body: Vec<_> = state.storage.list_lessons()?.iter().map(lesson_out).collect();
    Ok(Json(body))
}

async fn retrieve_lesson_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(identity.0.as_ref(), Action::Retrieve, None)?;
    let lesson = state
        .storage
        .get_lesson(id)?
        .ok_or_else(|| ApiError::not_found(LESSON_NOT_FOUND))?;
    Ok(Json(lesson_out(&lesson)))
}

fn validate_lesson_input(state: &AppState, input: &LessonIn) -> Result<(), ApiError> {
    if let Some(url) = input.video_url.as_deref() {
        validate_youtube_link(url).map_err(ApiError::Validation)?;
    }
    if state.storage.get_course(input.course)?.is_none() {
        return Err(ApiError::validation(format!(
            "Курс с id {} не существует",
            input.course
        )));
    }
    Ok(())
}

async fn create_lesson_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<LessonIn>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = require_user(identity)?;
    authorize(Some(&actor), Action::Create, None)?;
    validate_lesson_input(&state, &payload)?;

    let lesson = state.storage.create_lesson(Lesson {
        id: 0,
        title: payload.title,
        description: payload.description,
        preview: payload.preview,
        video_url: payload.video_url,
        course: payload.course,
        owner: actor.id,
    })?;
    info!(lesson_id = lesson.id, course_id = lesson.course, "lesson created");
    Ok((StatusCode::CREATED, Json(lesson_out(&lesson))))
}

async fn update_lesson_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
    Json(payload): Json<LessonIn>,
) -> Result<impl IntoResponse, ApiError> {
    let mut lesson = state
        .storage
        .get_lesson(id)?
        .ok_or_else(|| ApiError::not_found(LESSON_NOT_FOUND))?;
    authorize(identity.0.as_ref(), Action::Update, Some(lesson.owner))?;
    validate_lesson_input(&state, &payload)?;

    lesson.title = payload.title;
    lesson.description = payload.description;
    lesson.preview = payload.preview;
    lesson.video_url = payload.video_url;
    lesson.course = payload.course;
    state.storage.update_lesson(&lesson)?;
    Ok(Json(lesson_out(&lesson)))
}

async fn delete_lesson_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let lesson = state
        .storage
        .get_lesson(id)?
        .ok_or_else(|| ApiError::not_found(LESSON_NOT_FOUND))?;
    authorize(identity.0.as_ref(), Action::Delete, Some(lesson.owner))?;
    state.storage.delete_lesson(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Subscriptions ---

/// Toggle: first call subscribes, second call for the same pair
/// unsubscribes. Deliberately not idempotent.
async fn subscription_toggle_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<SubscriptionToggleIn>,
) -> Result<Json<MessageOut>, ApiError> {
    let actor = require_user(identity)?;
    let course_id = payload
        .course_id
        .ok_or_else(|| ApiError::validation("Не указан course_id"))?;
    let course = state
        .storage
        .get_course(course_id)?
        .ok_or_else(|| ApiError::not_found(COURSE_NOT_FOUND))?;

    let message = if state
        .storage
        .find_subscription(actor.id, course.id)?
        .is_some()
    {
        state.storage.delete_subscription(actor.id, course.id)?;
        info!(user_id = actor.id, course_id = course.id, "subscription removed");
        "Подписка удалена"
    } else {
        // A concurrent toggle for the same pair loses the compare-and-swap
        // here and surfaces as an integrity error.
        state.storage.create_subscription(actor.id, course.id)?;
        info!(user_id = actor.id, course_id = course.id, "subscription added");
        "Подписка добавлена"
    };
    Ok(Json(MessageOut {
        message: message.to_string(),
    }))
}

// --- Payments: provider checkout flow ---

/// Runs the create-product / create-price / create-session sequence for a
/// paid course and persists the resulting Payment. Failures abort mid-way
/// with no rollback of already-created provider objects.
async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = require_user(identity)?;
    let mut course = state
        .storage
        .get_course(id)?
        .ok_or_else(|| ApiError::not_found(COURSE_NOT_FOUND))?;
    if course.price <= 0 {
        return Err(ApiError::validation(
            "Курс бесплатный, оплата не требуется",
        ));
    }

    let product_id = match course.stripe_product_id.clone() {
        Some(existing) => existing,
        None => {
            let created = state
                .gateway
                .create_product(&course.title, &course.description)
                .await?;
            course.stripe_product_id = Some(created.clone());
            state.storage.update_course(&course)?;
            created
        }
    };

    // Reuse the cached price only while the course amount still matches it.
    let price_id = match (&course.stripe_price_id, course.stripe_price_amount) {
        (Some(existing), Some(amount)) if amount == course.price => existing.clone(),
        _ => {
            let created = state.gateway.create_price(&product_id, course.price).await?;
            course.stripe_price_id = Some(created.clone());
            course.stripe_price_amount = Some(course.price);
            state.storage.update_course(&course)?;
            created
        }
    };

    let success_url = format!(
        "{}/payment/success/?session_id={{CHECKOUT_SESSION_ID}}",
        state.config.public_base_url
    );
    let cancel_url = format!("{}/payment/cancel/", state.config.public_base_url);
    let metadata = vec![
        ("user_id".to_string(), actor.id.to_string()),
        ("course_id".to_string(), course.id.to_string()),
    ];
    let session = state
        .gateway
        .create_checkout_session(&price_id, &success_url, &cancel_url, &metadata)
        .await?;
    let payment_url = session
        .url
        .clone()
        .ok_or(crate::stripe::GatewayError::MissingField("url"))?;

    let payment = state.storage.create_payment(Payment {
        id: 0,
        user: actor.id,
        amount: course.price,
        payment_method: PaymentMethod::Transfer,
        course: Some(course.id),
        payment_date: Utc::now().date_naive(),
        stripe_product_id: Some(product_id),
        stripe_price_id: Some(price_id),
        stripe_session_id: Some(session.id.clone()),
        payment_url: Some(payment_url.clone()),
    })?;
    info!(
        payment_id = payment.id,
        user_id = actor.id,
        course_id = course.id,
        session_id = %session.id,
        "checkout session created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CheckoutOut {
            payment_id: payment.id,
            session_id: session.id,
            payment_url,
        }),
    ))
}

#[derive(Deserialize)]
struct SuccessQuery {
    session_id: Option<String>,
}

/// Provider redirect target after a completed payment. Re-fetches the
/// session, reads our metadata back and activates the subscription.
async fn payment_success_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SuccessQuery>,
) -> Result<Json<MessageOut>, ApiError> {
    let session_id = query
        .session_id
        .ok_or_else(|| ApiError::validation("Не указан session_id"))?;
    let session = state.gateway.retrieve_session(&session_id).await?;

    let user_id: u64 = session
        .metadata
        .get("user_id")
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| ApiError::validation("Сессия не содержит user_id"))?;
    let course_id: u64 = session
        .metadata
        .get("course_id")
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| ApiError::validation("Сессия не содержит course_id"))?;

    state
        .storage
        .get_user(user_id)?
        .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;
    state
        .storage
        .get_course(course_id)?
        .ok_or_else(|| ApiError::not_found(COURSE_NOT_FOUND))?;

    // Replayed confirmations land on the uniqueness constraint; the payment
    // already went through, so report success either way.
    match state.storage.create_subscription(user_id, course_id) {
        Ok(_) => {}
        Err(StorageError::Conflict(_)) => {
            warn!(%session_id, user_id, course_id, "confirmation replayed, subscription exists");
        }
        Err(other) => return Err(other.into()),
    }
    info!(
        %session_id,
        user_id,
        course_id,
        payment_status = session.payment_status.as_deref().unwrap_or("unknown"),
        "payment confirmed"
    );
    Ok(Json(MessageOut {
        message: "Оплата прошла успешно".to_string(),
    }))
}

async fn payment_cancel_handler() -> Json<MessageOut> {
    Json(MessageOut {
        message: "Платеж отменен".to_string(),
    })
}

/// Creates a provider customer for the current user once and caches its id.
async fn create_customer_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<CustomerOut>, ApiError> {
    let mut actor = require_user(identity)?;
    if let Some(existing) = actor.stripe_customer_id {
        return Ok(Json(CustomerOut {
            customer_id: existing,
        }));
    }
    let customer_id = state
        .gateway
        .create_customer(&actor.email, &actor.username)
        .await?;
    actor.stripe_customer_id = Some(customer_id.clone());
    state.storage.update_user(&actor)?;
    info!(user_id = actor.id, %customer_id, "provider customer created");
    Ok(Json(CustomerOut { customer_id }))
}

// --- Payments: manual CRUD ---

/// Non-owners without moderator rights see someone else's payment as
/// missing rather than forbidden.
fn scoped_payment(state: &AppState, actor: &User, id: u64) -> Result<Payment, ApiError> {
    let payment = state
        .storage
        .get_payment(id)?
        .ok_or_else(|| ApiError::not_found(PAYMENT_NOT_FOUND))?;
    if payment.user != actor.id && !actor.is_moderator() && !actor.is_superuser {
        return Err(ApiError::not_found(PAYMENT_NOT_FOUND));
    }
    Ok(payment)
}

async fn create_payment_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<PaymentIn>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = require_user(identity)?;
    authorize(Some(&actor), Action::Create, None)?;

    let payment_method: PaymentMethod = payload
        .payment_method
        .parse()
        .map_err(ApiError::Validation)?;
    if payload.amount <= 0 {
        return Err(ApiError::validation("Сумма оплаты должна быть положительной"));
    }

    let user_id = match payload.user {
        Some(other) if other != actor.id => {
            if !actor.is_superuser {
                return Err(ApiError::Forbidden);
            }
            if state.storage.get_user(other)?.is_none() {
                return Err(ApiError::validation(format!(
                    "Пользователь с id {other} не существует"
                )));
            }
            other
        }
        _ => actor.id,
    };
    if let Some(course_id) = payload.course {
        if state.storage.get_course(course_id)?.is_none() {
            return Err(ApiError::validation(format!(
                "Курс с id {course_id} не существует"
            )));
        }
    }

    let payment = state.storage.create_payment(Payment {
        id: 0,
        user: user_id,
        amount: payload.amount,
        payment_method,
        course: payload.course,
        payment_date: payload.payment_date.unwrap_or_else(|| Utc::now().date_naive()),
        stripe_product_id: None,
        stripe_price_id: None,
        stripe_session_id: None,
        payment_url: None,
    })?;
    Ok((StatusCode::CREATED, Json(payment_out(&payment))))
}

async fn list_payments_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    let actor = require_user(identity)?;
    let payments = if actor.is_superuser || actor.is_moderator() {
        state.storage.list_payments()?
    } else {
        state.storage.list_payments_for_user(actor.id)?
    };
    let body: Vec<_> = payments.iter().map(payment_out).collect();
    Ok(Json(body))
}

async fn retrieve_payment_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = require_user(identity)?;
    let payment = scoped_payment(&state, &actor, id)?;
    Ok(Json(payment_out(&payment)))
}

async fn update_payment_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
    Json(payload): Json<PaymentIn>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = require_user(identity)?;
    let mut payment = scoped_payment(&state, &actor, id)?;
    authorize(Some(&actor), Action::Update, Some(payment.user))?;

    payment.payment_method = payload
        .payment_method
        .parse()
        .map_err(ApiError::Validation)?;
    if payload.amount <= 0 {
        return Err(ApiError::validation("Сумма оплаты должна быть положительной"));
    }
    payment.amount = payload.amount;
    if let Some(course_id) = payload.course {
        if state.storage.get_course(course_id)?.is_none() {
            return Err(ApiError::validation(format!(
                "Курс с id {course_id} не существует"
            )));
        }
    }
    payment.course = payload.course;
    if let Some(date) = payload.payment_date {
        payment.payment_date = date;
    }

    state.storage.update_payment(&payment)?;
    Ok(Json(payment_out(&payment)))
}

async fn delete_payment_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let actor = require_user(identity)?;
    let payment = scoped_payment(&state, &actor, id)?;
    authorize(Some(&actor), Action::Delete, Some(payment.user))?;
    state.storage.delete_payment(id)?;
    Ok(StatusCode::NO_CONTENT)
}
