//! Entity store on Sled.
//!
//! One tree per entity kind plus an email index for user lookup. Records are
//! Serde-serialized JSON values keyed by big-endian u64 ids, so reverse
//! iteration lists newest-first (the API's `-id` ordering). Foreign-key
//! cleanup is explicit: deleting a course removes its lessons and
//! subscriptions, deleting a user removes everything the user owns.
//!
//! The (user, course) subscription pair is keyed by the concatenated ids and
//! inserted with compare-and-swap; that CAS is the store-level uniqueness
//! constraint the toggle race in the handlers relies on.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use thiserror::Error;
use tracing::debug;

use chrono::Utc;

use crate::models::{Course, Lesson, Payment, Subscription, User};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Unique-constraint violation (duplicate email, duplicate subscription).
    #[error("{0}")]
    Conflict(String),
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct Storage {
    db: Db,
    users: Tree,
    /// email bytes -> user id; the uniqueness index for registration.
    users_by_email: Tree,
    courses: Tree,
    lessons: Tree,
    /// key = user id ++ course id (16 bytes); uniqueness of the pair is
    /// structural.
    subscriptions: Tree,
    payments: Tree,
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn pair_key(user_id: u64, course_id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&user_id.to_be_bytes());
    key[8..].copy_from_slice(&course_id.to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

impl Storage {
    /// Open or create the Sled database at the given path and its entity
    /// trees.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let users = db.open_tree("users")?;
        let users_by_email = db.open_tree("users_by_email")?;
        let courses = db.open_tree("courses")?;
        let lessons = db.open_tree("lessons")?;
        let subscriptions = db.open_tree("subscriptions")?;
        let payments = db.open_tree("payments")?;
        Ok(Self {
            db,
            users,
            users_by_email,
            courses,
            lessons,
            subscriptions,
            payments,
        })
    }

    fn next_id(&self) -> Result<u64, StorageError> {
        Ok(self.db.generate_id()?)
    }

    /// Newest-first scan of a whole tree.
    fn scan_rev<T: DeserializeOwned>(tree: &Tree) -> Result<Vec<T>, StorageError> {
        let mut records = Vec::new();
        for item in tree.iter().rev() {
            let (_, value) = item?;
            records.push(decode(&value)?);
        }
        Ok(records)
    }

    // --- Users ---

    /// Insert a new user, assigning its id. Fails with `Conflict` when the
    /// email is already registered.
    pub fn create_user(&self, mut user: User) -> Result<User, StorageError> {
        user.id = self.next_id()?;
        self.users_by_email
            .compare_and_swap(
                user.email.as_bytes(),
                None as Option<&[u8]>,
                Some(&id_key(user.id)),
            )?
            .map_err(|_| email_conflict(&user.email))?;
        self.users.insert(id_key(user.id), encode(&user)?)?;
        debug!(user_id = user.id, "user created");
        Ok(user)
    }

    pub fn get_user(&self, id: u64) -> Result<Option<User>, StorageError> {
        match self.users.get(id_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let Some(id_bytes) = self.users_by_email.get(email.as_bytes())? else {
            return Ok(None);
        };
        let mut id = [0u8; 8];
        id.copy_from_slice(&id_bytes);
        self.get_user(u64::from_be_bytes(id))
    }

    /// Full-record update; re-points the email index when the email changed.
    pub fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let existing = self
            .get_user(user.id)?
            .ok_or(StorageError::NotFound("user"))?;
        if existing.email != user.email {
            self.users_by_email
                .compare_and_swap(
                    user.email.as_bytes(),
                    None as Option<&[u8]>,
                    Some(&id_key(user.id)),
                )?
                .map_err(|_| email_conflict(&user.email))?;
            self.users_by_email.remove(existing.email.as_bytes())?;
        }
        self.users.insert(id_key(user.id), encode(user)?)?;
        Ok(())
    }

    /// Remove a user and everything hanging off it: owned courses (with
    /// their lessons and subscriptions), owned lessons on other courses,
    /// own subscriptions and payments.
    pub fn delete_user(&self, id: u64) -> Result<(), StorageError> {
        let user = self.get_user(id)?.ok_or(StorageError::NotFound("user"))?;

        let owned_courses: Vec<u64> = self
            .list_courses()?
            .into_iter()
            .filter(|c| c.owner == id)
            .map(|c| c.id)
            .collect();
        for course_id in owned_courses {
            self.delete_course(course_id)?;
        }

        for lesson in self.list_lessons()? {
            if lesson.owner == id {
                self.lessons.remove(id_key(lesson.id))?;
            }
        }

        let mut stale_subscriptions = Vec::new();
        for item in self.subscriptions.iter() {
            let (key, value) = item?;
            let subscription: Subscription = decode(&value)?;
            if subscription.user == id {
                stale_subscriptions.push(key);
            }
        }
        for key in stale_subscriptions {
            self.subscriptions.remove(key)?;
        }

        for payment in self.list_payments()? {
            if payment.user == id {
                self.payments.remove(id_key(payment.id))?;
            }
        }

        self.users_by_email.remove(user.email.as_bytes())?;
        self.users.remove(id_key(id))?;
        debug!(user_id = id, "user deleted with owned records");
        Ok(())
    }

    // --- Courses ---

    pub fn create_course(&self, mut course: Course) -> Result<Course, StorageError> {
        course.id = self.next_id()?;
        self.courses.insert(id_key(course.id), encode(&course)?)?;
        Ok(course)
    }

    pub fn get_course(&self, id: u64) -> Result<Option<Course>, StorageError> {
        match self.courses.get(id_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_courses(&self) -> Result<Vec<Course>, StorageError> {
        Self::scan_rev(&self.courses)
    }

    pub fn update_course(&self, course: &Course) -> Result<(), StorageError> {
        if self.courses.get(id_key(course.id))?.is_none() {
            return Err(StorageError::NotFound("course"));
        }
        self.courses.insert(id_key(course.id), encode(course)?)?;
        Ok(())
    }

    /// Delete a course and cascade to its lessons and subscriptions.
    pub fn delete_course(&self, id: u64) -> Result<(), StorageError> {
        if self.courses.get(id_key(id))?.is_none() {
            return Err(StorageError::NotFound("course"));
        }

        for lesson in self.list_lessons()? {
            if lesson.course == id {
                self.lessons.remove(id_key(lesson.id))?;
            }
        }

        let mut stale_subscriptions = Vec::new();
        for item in self.subscriptions.iter() {
            let (key, value) = item?;
            let subscription: Subscription = decode(&value)?;
            if subscription.course == id {
                stale_subscriptions.push(key);
            }
        }
        for key in stale_subscriptions {
            self.subscriptions.remove(key)?;
        }

        self.courses.remove(id_key(id))?;
        debug!(course_id = id, "course deleted with lessons and subscriptions");
        Ok(())
    }

    // --- Lessons ---

    pub fn create_lesson(&self, mut lesson: Lesson) -> Result<Lesson, StorageError> {
        lesson.id = self.next_id()?;
        self.lessons.insert(id_key(lesson.id), encode(&lesson)?)?;
        Ok(lesson)
    }

    pub fn get_lesson(&self, id: u64) -> Result<Option<Lesson>, StorageError> {
        match self.lessons.get(id_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_lessons(&self) -> Result<Vec<Lesson>, StorageError> {
        Self::scan_rev(&self.lessons)
    }

    pub fn update_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        if self.lessons.get(id_key(lesson.id))?.is_none() {
            return Err(StorageError::NotFound("lesson"));
        }
        self.lessons.insert(id_key(lesson.id), encode(lesson)?)?;
        Ok(())
    }

    pub fn delete_lesson(&self, id: u64) -> Result<(), StorageError> {
        if self.lessons.remove(id_key(id))?.is_none() {
            return Err(StorageError::NotFound("lesson"));
        }
        Ok(())
    }

    /// Lesson count for a course (the serializer's computed field).
    pub fn count_lessons(&self, course_id: u64) -> Result<usize, StorageError> {
        let mut count = 0;
        for item in self.lessons.iter() {
            let (_, value) = item?;
            let lesson: Lesson = decode(&value)?;
            if lesson.course == course_id {
                count += 1;
            }
        }
        Ok(count)
    }

    // --- Subscriptions ---

    pub fn find_subscription(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<Option<Subscription>, StorageError> {
        match self.subscriptions.get(pair_key(user_id, course_id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert an active subscription for the pair. The compare-and-swap is
    /// the uniqueness constraint: a concurrent insert for the same pair
    /// makes the loser fail with `Conflict`.
    pub fn create_subscription(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<Subscription, StorageError> {
        let subscription = Subscription {
            user: user_id,
            course: course_id,
            subscription_date: Utc::now(),
            is_active: true,
        };
        self.subscriptions
            .compare_and_swap(
                pair_key(user_id, course_id),
                None as Option<&[u8]>,
                Some(encode(&subscription)?),
            )?
            .map_err(|_| {
                StorageError::Conflict(format!(
                    "subscription already exists for user {user_id} and course {course_id}"
                ))
            })?;
        Ok(subscription)
    }

    /// Remove the subscription for the pair; `false` when none existed.
    pub fn delete_subscription(&self, user_id: u64, course_id: u64) -> Result<bool, StorageError> {
        Ok(self
            .subscriptions
            .remove(pair_key(user_id, course_id))?
            .is_some())
    }

    pub fn count_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    // --- Payments ---

    pub fn create_payment(&self, mut payment: Payment) -> Result<Payment, StorageError> {
        payment.id = self.next_id()?;
        self.payments.insert(id_key(payment.id), encode(&payment)?)?;
        Ok(payment)
    }

    pub fn get_payment(&self, id: u64) -> Result<Option<Payment>, StorageError> {
        match self.payments.get(id_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_payments(&self) -> Result<Vec<Payment>, StorageError> {
        Self::scan_rev(&self.payments)
    }

    pub fn list_payments_for_user(&self, user_id: u64) -> Result<Vec<Payment>, StorageError> {
        Ok(self
            .list_payments()?
            .into_iter()
            .filter(|p| p.user == user_id)
            .collect())
    }

    pub fn update_payment(&self, payment: &Payment) -> Result<(), StorageError> {
        if self.payments.get(id_key(payment.id))?.is_none() {
            return Err(StorageError::NotFound("payment"));
        }
        self.payments.insert(id_key(payment.id), encode(payment)?)?;
        Ok(())
    }

    pub fn delete_payment(&self, id: u64) -> Result<(), StorageError> {
        if self.payments.remove(id_key(id))?.is_none() {
            return Err(StorageError::NotFound("payment"));
        }
        Ok(())
    }
}

fn email_conflict(email: &str) -> StorageError {
    StorageError::Conflict(format!("email already registered: {email}"))
}
