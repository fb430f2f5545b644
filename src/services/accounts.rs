use crate::{
    auth::AuthService,
    entities::user,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Fields a shopper may never change through the profile endpoint.
const SENSITIVE_FIELDS: [&str; 5] = ["id", "email", "role", "password", "pricingTierId"];

const DEFAULT_ROLE: &str = "customer";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub pricing_tier_id: Option<Uuid>,
}

impl From<user::Model> for Profile {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            pricing_tier_id: model.pricing_tier_id,
        }
    }
}

/// Signup, login and profile management.
#[derive(Clone)]
pub struct AccountService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
    event_sender: Arc<EventSender>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl AccountService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        auth: Arc<AuthService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            auth,
            event_sender,
        }
    }

    #[instrument(skip(self, password))]
    pub async fn signup(&self, email: &str, password: &str) -> Result<Uuid, ServiceError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(ServiceError::ValidationError(
                "Email and password are required".to_string(),
            ));
        }
        if !validator::validate_email(email.as_str()) {
            return Err(ServiceError::ValidationError(
                "Email is not valid".to_string(),
            ));
        }

        let db = &*self.db;
        let exists = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(db)
            .await?
            .is_some();
        if exists {
            return Err(ServiceError::ValidationError(
                "User already exists".to_string(),
            ));
        }

        let password_hash = self.auth.hash_password(password)?;
        let now = Utc::now();
        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            password_hash: Set(password_hash),
            name: Set(None),
            role: Set(DEFAULT_ROLE.to_string()),
            pricing_tier_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(user_id = %user.id, "registered user");
        self.event_sender.send_or_log(Event::UserRegistered(user.id));
        Ok(user.id)
    }

    /// Exchanges credentials for a bearer token. Unknown email and wrong
    /// password are indistinguishable to the caller.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ServiceError> {
        let invalid = || ServiceError::Unauthorized("Invalid credentials".to_string());

        let user = user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&*self.db)
            .await?
            .ok_or_else(invalid)?;

        if !self.auth.verify_password(password, &user.password_hash) {
            warn!(user_id = %user.id, "failed login attempt");
            return Err(invalid());
        }

        Ok(self.auth.generate_token(&user)?)
    }

    async fn find_user(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, user_id: Uuid) -> Result<Profile, ServiceError> {
        self.find_user(user_id).await.map(Profile::from)
    }

    /// Applies a JSON patch to the profile. Only `name` is writable.
    #[instrument(skip(self, patch))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        patch: &Map<String, Value>,
    ) -> Result<Profile, ServiceError> {
        if SENSITIVE_FIELDS.iter().any(|field| patch.contains_key(*field)) {
            return Err(ServiceError::ValidationError(
                "Cannot update sensitive fields".to_string(),
            ));
        }

        let user = self.find_user(user_id).await?;

        let Some(name) = patch.get("name") else {
            return Ok(user.into());
        };
        let name = name
            .as_str()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError("Name must be a non-empty string".to_string())
            })?
            .to_string();

        let mut active: user::ActiveModel = user.into();
        active.name = Set(Some(name));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(%user_id, "updated profile");
        Ok(updated.into())
    }
}
