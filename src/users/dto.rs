use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::users::repo_types::User;

/// Request body for `POST /users`.
///
/// Every field is optional at the type level so a missing key reaches
/// [`CreateUserRequest::validate`] instead of failing inside the extractor.
#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    pub nome: Option<String>,
    pub email: Option<String>,
    pub senha: Option<String>,
    pub endereco: Option<String>,
    pub telefone: Option<String>,
}

/// A create request whose required fields are present and non-empty.
#[derive(Debug)]
pub struct ValidCreateUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl CreateUserRequest {
    /// Returns `None` when `nome`, `email` or `senha` is absent or empty.
    pub fn validate(self) -> Option<ValidCreateUser> {
        let required = |v: Option<String>| v.filter(|s| !s.is_empty());
        Some(ValidCreateUser {
            name: required(self.nome)?,
            email: required(self.email)?,
            password: required(self.senha)?,
            address: self.endereco,
            phone: self.telefone,
        })
    }
}

/// Request body for `PUT|PATCH /users/{id}`.
///
/// For the double options, `None` means the key was absent (keep), `Some(None)`
/// an explicit `null`. A `null` clears `endereco`/`telefone`; `nome` and `email`
/// are NOT NULL and must stay non-empty.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub nome: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub email: Option<Option<String>>,
    pub senha: Option<String>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub endereco: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub telefone: Option<Option<String>>,
}

fn deserialize_double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateUserRequest {
    /// Decodes a non-empty JSON object. Unknown keys are ignored.
    pub fn from_body(body: serde_json::Map<String, serde_json::Value>) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::Value::Object(body))
    }

    /// `false` if `nome` or `email` is sent as `null` or `""`.
    pub fn keeps_required_fields(&self) -> bool {
        let filled = |v: &Option<Option<String>>| match v {
            None => true,
            Some(Some(s)) => !s.is_empty(),
            Some(None) => false,
        };
        filled(&self.nome) && filled(&self.email)
    }

    /// The new plaintext password, if one was sent. An empty string means "keep".
    pub fn new_password(&self) -> Option<&str> {
        self.senha.as_deref().filter(|s| !s.is_empty())
    }

    /// Copies every present field except the password onto `user`.
    pub fn apply_to(self, user: &mut User) {
        if let Some(Some(name)) = self.nome {
            user.name = name;
        }
        if let Some(Some(email)) = self.email {
            user.email = email;
        }
        if let Some(address) = self.endereco {
            user.address = address;
        }
        if let Some(phone) = self.telefone {
            user.phone = phone;
        }
    }
}

/// External representation of a user. The password hash is never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: i64,
    pub nome: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub data_cadastro: Option<OffsetDateTime>,
    pub endereco: Option<String>,
    pub telefone: Option<String>,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            nome: u.name.clone(),
            email: u.email.clone(),
            data_cadastro: u.registered_at,
            endereco: u.address.clone(),
            telefone: u.phone.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn user() -> User {
        User {
            id: 7,
            name: "Ana".into(),
            email: "a@x.com".into(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
            registered_at: Some(datetime!(2024-03-01 12:30:00 UTC)),
            address: Some("Rua A, 1".into()),
            phone: None,
        }
    }

    #[test]
    fn public_user_hides_password_and_formats_timestamp() {
        let json = serde_json::to_value(PublicUser::from(&user())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "nome": "Ana",
                "email": "a@x.com",
                "data_cadastro": "2024-03-01T12:30:00Z",
                "endereco": "Rua A, 1",
                "telefone": null,
            })
        );
        let text = json.to_string();
        assert!(!text.contains("senha"));
        assert!(!text.contains("argon2"));
    }

    #[test]
    fn public_user_renders_missing_timestamp_as_null() {
        let mut u = user();
        u.registered_at = None;
        let json = serde_json::to_value(PublicUser::from(&u)).unwrap();
        assert!(json["data_cadastro"].is_null());
    }

    #[test]
    fn create_validation_requires_non_empty_fields() {
        let ok: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "nome": "Ana", "email": "a@x.com", "senha": "s3cret", "telefone": "123"
        }))
        .unwrap();
        let valid = ok.validate().expect("complete request");
        assert_eq!(valid.name, "Ana");
        assert_eq!(valid.phone.as_deref(), Some("123"));
        assert!(valid.address.is_none());

        let missing: CreateUserRequest =
            serde_json::from_value(serde_json::json!({ "nome": "Ana", "email": "a@x.com" }))
                .unwrap();
        assert!(missing.validate().is_none());

        let empty: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "nome": "Ana", "email": "a@x.com", "senha": ""
        }))
        .unwrap();
        assert!(empty.validate().is_none());
    }

    fn update(body: serde_json::Value) -> UpdateUserRequest {
        let serde_json::Value::Object(map) = body else {
            panic!("test body must be an object");
        };
        UpdateUserRequest::from_body(map).unwrap()
    }

    #[test]
    fn update_applies_only_present_fields() {
        let req = update(serde_json::json!({ "nome": "X" }));
        assert!(req.keeps_required_fields());
        assert!(req.new_password().is_none());

        let mut u = user();
        req.apply_to(&mut u);
        assert_eq!(u.name, "X");
        assert_eq!(u.email, "a@x.com");
        assert_eq!(u.address.as_deref(), Some("Rua A, 1"));
        assert!(u.phone.is_none());
    }

    #[test]
    fn update_null_clears_optional_fields() {
        let req = update(serde_json::json!({ "endereco": null }));
        assert_eq!(req.endereco, Some(None));
        assert!(req.telefone.is_none());

        let mut u = user();
        u.phone = Some("555".into());
        req.apply_to(&mut u);
        assert!(u.address.is_none());
        assert_eq!(u.phone.as_deref(), Some("555"));
    }

    #[test]
    fn update_ignores_unknown_keys() {
        let req = update(serde_json::json!({ "foo": 1 }));
        let mut u = user();
        req.apply_to(&mut u);
        assert_eq!(u.name, "Ana");
        assert_eq!(u.address.as_deref(), Some("Rua A, 1"));
    }

    #[test]
    fn update_rejects_blank_name_or_email() {
        for body in [
            serde_json::json!({ "nome": "" }),
            serde_json::json!({ "nome": null }),
            serde_json::json!({ "email": "" }),
            serde_json::json!({ "email": null }),
        ] {
            assert!(!update(body).keeps_required_fields());
        }
    }

    #[test]
    fn update_treats_empty_password_as_keep() {
        let req = update(serde_json::json!({ "senha": "" }));
        assert!(req.new_password().is_none());
        let req = update(serde_json::json!({ "senha": null }));
        assert!(req.new_password().is_none());
        let req = update(serde_json::json!({ "senha": "n3w" }));
        assert_eq!(req.new_password(), Some("n3w"));
    }
}
