use crate::error::ServiceError;
use crate::passwords::{hash_password, verify_password};
use crate::store::{
    from_document, from_documents, to_document, Collection, Filter, RecordStore, MAX_PAGE_SIZE,
};
use crate::types::{CreateUserRequest, LoginRequest, Role, StoredUser, User};

/// Create a user with a fresh id. The password is stored only as a hash.
pub async fn create_user(
    store: &dyn RecordStore,
    req: CreateUserRequest,
) -> Result<User, ServiceError> {
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        email: req.email,
        role: req.role,
        roll_number: req.roll_number,
        semester: req.semester,
    };
    insert_user(store, user, &req.password).await
}

pub(crate) async fn insert_user(
    store: &dyn RecordStore,
    user: User,
    password: &str,
) -> Result<User, ServiceError> {
    let stored = StoredUser {
        password_hash: hash_password(password)?,
        user,
    };
    store
        .insert(Collection::Users, to_document(&stored)?)
        .await?;

    tracing::info!("Created {} {}", stored.user.role.as_str(), stored.user.id);
    Ok(stored.user)
}

pub async fn list_users(
    store: &dyn RecordStore,
    role: Option<Role>,
) -> Result<Vec<User>, ServiceError> {
    let filter = Filter::all().and_opt("role", role.map(Role::as_str));
    let docs = store.find(Collection::Users, &filter, MAX_PAGE_SIZE).await?;
    let users: Vec<StoredUser> = from_documents(Collection::Users, docs)?;
    Ok(users.into_iter().map(|stored| stored.user).collect())
}

pub async fn get_user(store: &dyn RecordStore, user_id: &str) -> Result<User, ServiceError> {
    let doc = store
        .get(Collection::Users, user_id)
        .await?
        .ok_or(ServiceError::NotFound("User"))?;
    let stored: StoredUser = from_document(Collection::Users, doc)?;
    Ok(stored.user)
}

/// Look the user up by email and check the password against the stored hash.
pub async fn login(store: &dyn RecordStore, req: LoginRequest) -> Result<User, ServiceError> {
    let doc = store
        .find_one(Collection::Users, &Filter::eq("email", req.email.as_str()))
        .await?
        .ok_or(ServiceError::NotFound("User"))?;
    let stored: StoredUser = from_document(Collection::Users, doc)?;

    if !verify_password(&req.password, &stored.password_hash)? {
        tracing::warn!("Rejected login for user {}", stored.user.id);
        return Err(ServiceError::Unauthorized);
    }

    Ok(stored.user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn student(name: &str, email: &str) -> CreateUserRequest {
        CreateUserRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: "secret".to_string(),
            role: Role::Student,
            roll_number: Some("AIML010".to_string()),
            semester: Some(2),
        }
    }

    #[tokio::test]
    async fn created_user_is_fetchable_without_credentials() {
        let store = MemoryStore::new();
        let created = create_user(&store, student("Asha", "asha@student.edu"))
            .await
            .expect("create");

        let fetched = get_user(&store, &created.id).await.expect("get");
        assert_eq!(fetched, created);

        let json = serde_json::to_value(&fetched).expect("json");
        assert!(json.get("password").is_none());
        assert!(json.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = MemoryStore::new();
        let err = get_user(&store, "missing").await.expect_err("missing");
        assert!(matches!(err, ServiceError::NotFound("User")));
    }

    #[tokio::test]
    async fn role_filter_limits_listing() {
        let store = MemoryStore::new();
        create_user(&store, student("Asha", "asha@student.edu"))
            .await
            .expect("create");
        let mut teacher = student("Dr. Rao", "rao@aiml.edu");
        teacher.role = Role::Teacher;
        teacher.roll_number = None;
        teacher.semester = None;
        create_user(&store, teacher).await.expect("create");

        assert_eq!(list_users(&store, None).await.expect("list").len(), 2);
        let teachers = list_users(&store, Some(Role::Teacher)).await.expect("list");
        assert_eq!(teachers.len(), 1);
        assert_eq!(teachers[0].name, "Dr. Rao");
    }

    #[tokio::test]
    async fn login_distinguishes_unknown_email_and_wrong_password() {
        let store = MemoryStore::new();
        let created = create_user(&store, student("Asha", "asha@student.edu"))
            .await
            .expect("create");

        let user = login(
            &store,
            LoginRequest {
                email: "asha@student.edu".to_string(),
                password: "secret".to_string(),
            },
        )
        .await
        .expect("login");
        assert_eq!(user.id, created.id);

        let wrong = login(
            &store,
            LoginRequest {
                email: "asha@student.edu".to_string(),
                password: "nope".to_string(),
            },
        )
        .await
        .expect_err("wrong password");
        assert!(matches!(wrong, ServiceError::Unauthorized));

        let unknown = login(
            &store,
            LoginRequest {
                email: "ghost@student.edu".to_string(),
                password: "secret".to_string(),
            },
        )
        .await
        .expect_err("unknown email");
        assert!(matches!(unknown, ServiceError::NotFound("User")));
    }
}
