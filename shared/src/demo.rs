//! Demo data for a fresh deployment: one teacher, three semester-1 students
//! and four semester-1 subjects.

use std::num::NonZeroU32;

use crate::error::ServiceError;
use crate::store::{Collection, Filter, RecordStore};
use crate::subjects::create_subject;
use crate::types::{Role, SubjectRequest, User};
use crate::users::insert_user;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded,
    AlreadyPresent,
}

impl SeedOutcome {
    pub fn message(self) -> &'static str {
        match self {
            SeedOutcome::Seeded => "Demo data initialized successfully",
            SeedOutcome::AlreadyPresent => "Demo data already exists",
        }
    }
}

const TEACHER: (&str, &str) = ("Dr. Kumar", "teacher@aiml.edu");
const TEACHER_PASSWORD: &str = "teacher";

const STUDENTS: [(&str, &str, &str); 3] = [
    ("Rahul Sharma", "rahul@student.edu", "AIML001"),
    ("Priya Patel", "priya@student.edu", "AIML002"),
    ("Amit Kumar", "amit@student.edu", "AIML003"),
];
const STUDENT_PASSWORD: &str = "student";

const SUBJECTS: [(&str, &str, u32); 4] = [
    ("Machine Learning Fundamentals", "AIML101", 4),
    ("Python Programming", "AIML102", 4),
    ("Mathematics for AI", "AIML103", 3),
    ("Data Structures", "AIML104", 4),
];

fn new_user(name: &str, email: &str, role: Role, roll_number: Option<&str>) -> User {
    User {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: email.to_string(),
        role,
        roll_number: roll_number.map(str::to_string),
        semester: roll_number.map(|_| 1),
    }
}

/// No-op if any user exists at all.
pub async fn seed_demo_data(store: &dyn RecordStore) -> Result<SeedOutcome, ServiceError> {
    if store.count(Collection::Users, &Filter::all()).await? > 0 {
        tracing::info!("Users present, skipping demo data");
        return Ok(SeedOutcome::AlreadyPresent);
    }

    let (name, email) = TEACHER;
    insert_user(store, new_user(name, email, Role::Teacher, None), TEACHER_PASSWORD).await?;

    for (name, email, roll_number) in STUDENTS {
        insert_user(
            store,
            new_user(name, email, Role::Student, Some(roll_number)),
            STUDENT_PASSWORD,
        )
        .await?;
    }

    for (name, code, credits) in SUBJECTS {
        let Some(credits) = NonZeroU32::new(credits) else {
            continue;
        };
        create_subject(
            store,
            SubjectRequest {
                name: name.to_string(),
                code: code.to_string(),
                semester: 1,
                credits,
            },
        )
        .await?;
    }

    tracing::info!("Demo data initialized");
    Ok(SeedOutcome::Seeded)
}
