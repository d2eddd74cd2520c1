use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,                               // generated by BIGSERIAL
    pub name: String,
    pub email: String,                         // UNIQUE (users_email_key)
    pub password_hash: String,                 // Argon2 PHC string, never exposed
    pub registered_at: Option<OffsetDateTime>, // set by DEFAULT now(), never updated
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Values for a row that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}
