//! Wire-format DTOs and record -> JSON mapping
//!
//! Inbound structs deserialize request bodies; outbound structs are what
//! handlers return. The course representation carries two computed fields,
//! the lesson count and whether the requesting user is subscribed, so the
//! builders here take the store and the viewer identity.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Course, Lesson, Payment, PaymentMethod, User};
use crate::storage::{Storage, StorageError};

// --- Inbound ---

#[derive(Deserialize)]
pub struct CourseIn {
    pub title: String,
    #[serde(default)]
    pub price: i64,
    pub preview: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// `POST /courses/` takes either one course or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum CoursePayload {
    Many(Vec<CourseIn>),
    One(CourseIn),
}

#[derive(Deserialize)]
pub struct LessonIn {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub preview: Option<String>,
    pub video_url: Option<String>,
    pub course: u64,
}

#[derive(Deserialize)]
pub struct SubscriptionToggleIn {
    /// Optional so a missing field reads as 400, not a body-parse reject.
    pub course_id: Option<u64>,
}

#[derive(Deserialize)]
pub struct RegisterIn {
    pub email: String,
    pub username: String,
    pub password: String,
    pub phone: Option<String>,
    pub city: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginIn {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshIn {
    pub refresh: String,
}

/// Partial user update; absent fields keep their stored values.
#[derive(Deserialize, Default)]
pub struct UserUpdateIn {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub avatar: Option<String>,
    pub is_confirmed: Option<bool>,
    pub is_blocked: Option<bool>,
    pub groups: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct PaymentIn {
    pub amount: i64,
    /// "cash" | "transfer"
    pub payment_method: String,
    pub course: Option<u64>,
    /// Defaults to today.
    pub payment_date: Option<NaiveDate>,
    /// Pay on behalf of another user; superuser only.
    pub user: Option<u64>,
}

// --- Outbound ---

#[derive(Serialize)]
pub struct CourseOut {
    pub id: u64,
    pub title: String,
    pub price: i64,
    pub preview: Option<String>,
    pub description: String,
    pub owner: u64,
    pub number_of_lessons: usize,
    pub is_subscribed: bool,
}

#[derive(Serialize)]
pub struct LessonOut {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub preview: Option<String>,
    pub video_url: Option<String>,
    pub course: u64,
    pub owner: u64,
}

#[derive(Serialize)]
pub struct UserOut {
    pub id: u64,
    pub email: String,
    pub username: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub avatar: Option<String>,
    pub is_confirmed: bool,
    pub is_blocked: bool,
    pub is_superuser: bool,
    pub groups: Vec<String>,
    pub stripe_customer_id: Option<String>,
    pub date_joined: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct PaymentOut {
    pub id: u64,
    pub user: u64,
    pub amount: i64,
    pub payment_method: PaymentMethod,
    pub course: Option<u64>,
    pub payment_date: NaiveDate,
    pub stripe_product_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_session_id: Option<String>,
    pub payment_url: Option<String>,
}

#[derive(Serialize)]
pub struct TokenPairOut {
    pub access: String,
    pub refresh: String,
}

#[derive(Serialize)]
pub struct AccessOut {
    pub access: String,
}

#[derive(Serialize)]
pub struct MessageOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct CheckoutOut {
    pub payment_id: u64,
    pub session_id: String,
    pub payment_url: String,
}

#[derive(Serialize)]
pub struct CustomerOut {
    pub customer_id: String,
}

// --- Mapping ---

/// Course representation with its computed fields. `viewer` is the
/// authenticated requester, if any; anonymous viewers are never subscribed.
pub fn course_out(
    storage: &Storage,
    course: &Course,
    viewer: Option<&User>,
) -> Result<CourseOut, StorageError> {
    let number_of_lessons = storage.count_lessons(course.id)?;
    let is_subscribed = match viewer {
        Some(user) => storage.find_subscription(user.id, course.id)?.is_some(),
        None => false,
    };
    Ok(CourseOut {
        id: course.id,
        title: course.title.clone(),
        price: course.price,
        preview: course.preview.clone(),
        description: course.description.clone(),
        owner: course.owner,
        number_of_lessons,
        is_subscribed,
    })
}

pub fn lesson_out(lesson: &Lesson) -> LessonOut {
    LessonOut {
        id: lesson.id,
        title: lesson.title.clone(),
        description: lesson.description.clone(),
        preview: lesson.preview.clone(),
        video_url: lesson.video_url.clone(),
        course: lesson.course,
        owner: lesson.owner,
    }
}

pub fn user_out(user: &User) -> UserOut {
    UserOut {
        id: user.id,
        email: user.email.clone(),
        username: user.username.clone(),
        phone: user.phone.clone(),
        city: user.city.clone(),
        avatar: user.avatar.clone(),
        is_confirmed: user.is_confirmed,
        is_blocked: user.is_blocked,
        is_superuser: user.is_superuser,
        groups: user.groups.clone(),
        stripe_customer_id: user.stripe_customer_id.clone(),
        date_joined: user.date_joined,
    }
}

pub fn payment_out(payment: &Payment) -> PaymentOut {
    PaymentOut {
        id: payment.id,
        user: payment.user,
        amount: payment.amount,
        payment_method: payment.payment_method,
        course: payment.course,
        payment_date: payment.payment_date,
        stripe_product_id: payment.stripe_product_id.clone(),
        stripe_price_id: payment.stripe_price_id.clone(),
        stripe_session_id: payment.stripe_session_id.clone(),
        payment_url: payment.payment_url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_storage(tag: &str) -> (Storage, std::path::PathBuf) {
        let dir =
            std::env::temp_dir().join(format!("coursehub_ser_{tag}_{}", uuid::Uuid::new_v4()));
        let storage = Storage::open(dir.to_str().unwrap()).expect("open storage");
        (storage, dir)
    }

    #[test]
    fn test_course_out_computed_fields() {
        let (storage, dir) = temp_storage("computed");

        let owner = storage
            .create_user(User {
                id: 0,
                email: "o@test.com".to_string(),
                username: "o".to_string(),
                password_hash: "x".to_string(),
                phone: None,
                city: None,
                avatar: None,
                is_confirmed: false,
                is_blocked: false,
                is_superuser: false,
                groups: vec![],
                stripe_customer_id: None,
                date_joined: Utc::now(),
            })
            .unwrap();
        let course = storage
            .create_course(Course {
                id: 0,
                title: "Курс".to_string(),
                price: 0,
                preview: None,
                description: String::new(),
                owner: owner.id,
                stripe_product_id: None,
                stripe_price_id: None,
                stripe_price_amount: None,
            })
            .unwrap();
        for n in 0..3 {
            storage
                .create_lesson(Lesson {
                    id: 0,
                    title: format!("Урок {n}"),
                    description: String::new(),
                    preview: None,
                    video_url: None,
                    course: course.id,
                    owner: owner.id,
                })
                .unwrap();
        }
        storage.create_subscription(owner.id, course.id).unwrap();

        let for_owner = course_out(&storage, &course, Some(&owner)).unwrap();
        assert_eq!(for_owner.number_of_lessons, 3);
        assert!(for_owner.is_subscribed);

        let for_anonymous = course_out(&storage, &course, None).unwrap();
        assert!(!for_anonymous.is_subscribed);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_user_out_has_no_password_hash() {
        let user = User {
            id: 1,
            email: "u@test.com".to_string(),
            username: "u".to_string(),
            password_hash: "secret-hash".to_string(),
            phone: None,
            city: None,
            avatar: None,
            is_confirmed: true,
            is_blocked: false,
            is_superuser: false,
            groups: vec!["moderators".to_string()],
            stripe_customer_id: None,
            date_joined: Utc::now(),
        };
        let value = serde_json::to_value(user_out(&user)).unwrap();
        assert!(value.get("password_hash").is_none());
        assert!(value.get("password").is_none());
        assert_eq!(value["email"], "u@test.com");
    }

    #[test]
    fn test_course_payload_accepts_object_and_array() {
        let one: CoursePayload = serde_json::from_str(r#"{"title": "Solo"}"#).unwrap();
        assert!(matches!(one, CoursePayload::One(_)));

        let many: CoursePayload =
            serde_json::from_str(r#"[{"title": "A"}, {"title": "B", "price": 900}]"#).unwrap();
        match many {
            CoursePayload::Many(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[1].price, 900);
            }
            CoursePayload::One(_) => panic!("array parsed as single object"),
        }
    }

    #[test]
    fn test_payment_method_wire_format() {
        assert_eq!(
            serde_json::to_value(PaymentMethod::Cash).unwrap(),
            serde_json::json!("cash")
        );
        assert_eq!(
            "transfer".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::Transfer
        );
        assert!("card".parse::<PaymentMethod>().is_err());
    }
}
