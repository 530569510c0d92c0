use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Public view of a user. Never carries credentials.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub roll_number: Option<String>, // students only
    pub semester: Option<u32>,       // students only
}

/// Shape persisted in the users collection.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoredUser {
    #[serde(flatten)]
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub roll_number: Option<String>,
    pub semester: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub message: String,
}

// ========== SUBJECT ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
    pub semester: u32,
    pub credits: NonZeroU32,
}

/// Body of both create and full-replace update.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubjectRequest {
    pub name: String,
    pub code: String,
    pub semester: u32,
    pub credits: NonZeroU32,
}

// ========== MARKS ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Marks {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub internal1: f64,
    pub internal2: f64,
    pub internal3: f64,
    pub final_exam: f64,
    pub total: f64,
    pub semester: u32, // copied from the request, not looked up from the subject
}

#[derive(Debug, Deserialize, Clone)]
pub struct CreateMarksRequest {
    pub student_id: String,
    pub subject_id: String,
    pub internal1: f64,
    pub internal2: f64,
    pub internal3: f64,
    pub final_exam: f64,
    pub semester: u32,
}

/// Scores only. Any `total` in the payload is ignored.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpdateMarksRequest {
    pub internal1: f64,
    pub internal2: f64,
    pub internal3: f64,
    pub final_exam: f64,
}

/// A marks record joined with its subject at read time.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DetailedMarks {
    #[serde(flatten)]
    pub marks: Marks,
    pub subject_name: String,
    pub subject_code: String,
    pub credits: NonZeroU32,
    pub percentage: f64,
    pub grade_point: u8,
}

// ========== PERFORMANCE ==========
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SemesterPerformance {
    pub semester: u32,
    pub sgpa: f64,
    pub credits: u32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Performance {
    pub semesters: Vec<SemesterPerformance>,
    pub cgpa: f64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
